use crate::domain::payment::GatewayEvent;
use crate::error::{CoreError, Result};
use std::io::{BufRead, BufReader, Read};

/// Reads gateway events stored one JSON document per line.
///
/// Blank lines are skipped. A line that fails to parse yields an error and
/// reading carries on with the next one.
pub struct EventReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> EventReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    /// Lazily parses the events, one `Result` per non-blank line.
    pub fn events(self) -> impl Iterator<Item = Result<GatewayEvent>> {
        self.reader
            .lines()
            .enumerate()
            .filter_map(|(index, line)| match line {
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => Some(serde_json::from_str(&line).map_err(|e| {
                    CoreError::MalformedEvent(format!("line {}: {e}", index + 1))
                })),
                Err(e) => Some(Err(CoreError::from(e))),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_events_and_skips_blank_lines() {
        let data = r#"{"id":"evt_1","type":"checkout-completed","data":{"metadata":{"courseId":"1","studentId":"2","amount":"10"}}}

{"id":"evt_2","type":"payment-failed"}
"#;
        let events: Vec<Result<GatewayEvent>> = EventReader::new(data.as_bytes()).events().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().id, "evt_1");
        assert_eq!(events[1].as_ref().unwrap().kind, "payment-failed");
    }

    #[test]
    fn test_malformed_line_does_not_stop_the_feed() {
        let data = "{not json}\n{\"id\":\"evt_3\",\"type\":\"charge-failed\"}\n";
        let events: Vec<Result<GatewayEvent>> = EventReader::new(data.as_bytes()).events().collect();
        assert!(matches!(&events[0], Err(CoreError::MalformedEvent(msg)) if msg.starts_with("line 1")));
        assert_eq!(events[1].as_ref().unwrap().id, "evt_3");
    }
}
