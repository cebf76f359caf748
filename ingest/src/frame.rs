use gosight_model::{LogPayload, MetricPayload, ProcessSnapshot};
use serde::{Deserialize, Serialize};

/// One line on the agent stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WireFrame {
    Metrics(MetricPayload),
    Logs(LogPayload),
    Processes(ProcessSnapshot),
}

impl WireFrame {
    /// Parse one stream line.
    pub fn decode(line: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WireFrame::Metrics(_) => "metrics",
            WireFrame::Logs(_) => "logs",
            WireFrame::Processes(_) => "processes",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_parse_by_type_tag() {
        let line = r#"{"type":"metrics","payload":{"endpoint_id":"ep-1","metrics":[{"name":"uptime","value":1.0}]}}"#;
        let frame = WireFrame::decode(line).unwrap();
        match frame {
            WireFrame::Metrics(payload) => {
                assert_eq!(payload.endpoint_id, "ep-1");
                assert_eq!(payload.metrics.len(), 1);
            }
            other => panic!("unexpected frame: {}", other.kind()),
        }

        let line = r#"{"type":"logs","payload":{"endpoint_id":"ep-1","logs":[{"message":"hi"}]}}"#;
        assert!(matches!(
            serde_json::from_str::<WireFrame>(line).unwrap(),
            WireFrame::Logs(_)
        ));
    }

    #[test]
    fn unknown_type_is_an_error() {
        assert!(WireFrame::decode(r#"{"type":"traces","payload":{}}"#).is_err());
    }
}
