//! Rule evaluation and alert lifecycle.
//!
//! The evaluator turns the live stream into edge-triggered signals; the
//! manager turns signals into alert instances with cooldown and resolution
//! semantics. Events leave through non-blocking channel seams so nothing
//! here performs I/O while holding a lock.

pub mod emit;
pub mod evaluator;
pub mod manager;

pub use emit::{AlertDispatcher, AlertEmitter};
pub use evaluator::RuleEvaluator;
pub use manager::AlertManager;
