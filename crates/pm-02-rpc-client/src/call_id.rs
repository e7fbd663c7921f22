//! Call identifier for log correlation.
//!
//! Uses UUID v7 so ids sort by creation time. The id never goes on the wire;
//! it only ties together the log lines of one client call.

use std::fmt;
use uuid::Uuid;

/// Identifier of one client call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallId(Uuid);

impl CallId {
    /// Generate a new call ID (UUID v7)
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_call_ids_are_unique() {
        let id1 = CallId::new();
        let id2 = CallId::new();
        assert_ne!(id1, id2);
        assert_eq!(id1.as_uuid().get_version_num(), 7);
    }

    #[test]
    fn test_call_id_display() {
        assert_eq!(CallId::new().to_string().len(), 36);
    }
}
