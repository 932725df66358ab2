//! Request message handed to a worker on its stdin.
//!
//! One JSON object, newline-terminated. The orchestrator closes stdin right
//! after writing it.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// A worker's read-only view of its partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRequest<'a> {
    /// Partition ordinal, echoed back for sanity checking.
    pub partition: usize,
    /// The partition's slice of the input array.
    pub values: Cow<'a, [i32]>,
    /// Artificial delay before scanning (test hook for the timeout path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

impl<'a> WorkRequest<'a> {
    /// Borrow `values` without copying them.
    pub fn new(partition: usize, values: &'a [i32]) -> Self {
        Self {
            partition,
            values: Cow::Borrowed(values),
            delay_ms: None,
        }
    }

    pub fn with_delay_ms(mut self, delay_ms: Option<u64>) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Serialize to JSON line (with newline).
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut json = serde_json::to_string(self)?;
        json.push('\n');
        Ok(json)
    }
}

impl WorkRequest<'static> {
    /// Deserialize from JSON line.
    pub fn from_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_line_format() {
        let values = [3, -1, 8];
        let line = WorkRequest::new(2, &values).to_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.trim(), r#"{"partition":2,"values":[3,-1,8]}"#);
    }

    #[test]
    fn test_request_parse() {
        let parsed =
            WorkRequest::from_line(r#"{"partition":1,"values":[5,6],"delay_ms":250}"#).unwrap();
        assert_eq!(parsed.partition, 1);
        assert_eq!(parsed.values.as_ref(), &[5, 6]);
        assert_eq!(parsed.delay_ms, Some(250));
    }

    #[test]
    fn test_request_rejects_garbage() {
        assert!(WorkRequest::from_line("not json").is_err());
        assert!(WorkRequest::from_line(r#"{"partition":1}"#).is_err());
    }
}
