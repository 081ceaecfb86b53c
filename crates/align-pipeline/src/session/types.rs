//! Bookkeeping records stored alongside a session: metadata, the operation
//! log and exported results.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, or 0 if the clock is before it.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Identity and timestamps of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// `ProblemType::name()` of the owning session.
    pub problem_type: String,
    /// `ProblemType::schema_version()` at creation time.
    pub schema_version: u32,
    pub created_at: u64,
    pub last_modified: u64,
    pub description: Option<String>,
}

impl SessionMetadata {
    pub fn new(problem_type: impl Into<String>, schema_version: u32) -> Self {
        let now = current_timestamp();
        Self {
            problem_type: problem_type.into(),
            schema_version,
            created_at: now,
            last_modified: now,
            description: None,
        }
    }

    pub fn with_description(
        problem_type: impl Into<String>,
        schema_version: u32,
        description: impl Into<String>,
    ) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::new(problem_type, schema_version)
        }
    }

    /// Bump `last_modified`.
    pub fn touch(&mut self) {
        self.last_modified = current_timestamp();
    }
}

/// One entry of the operation log.
///
/// The log is an audit trail of step outcomes; it is never replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: u64,
    /// Step name such as `"match"`, `"initialize"` or `"refine"`.
    pub operation: String,
    pub success: bool,
    /// Summary on success, error message on failure.
    pub notes: Option<String>,
}

impl LogEntry {
    fn make(operation: impl Into<String>, success: bool, notes: Option<String>) -> Self {
        Self {
            timestamp: current_timestamp(),
            operation: operation.into(),
            success,
            notes,
        }
    }

    pub fn success(operation: impl Into<String>) -> Self {
        Self::make(operation, true, None)
    }

    pub fn success_with_notes(operation: impl Into<String>, notes: impl Into<String>) -> Self {
        Self::make(operation, true, Some(notes.into()))
    }

    pub fn failure(operation: impl Into<String>, error: impl Into<String>) -> Self {
        Self::make(operation, false, Some(error.into()))
    }
}

/// A stored export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord<E> {
    pub timestamp: u64,
    pub export: E,
    pub notes: Option<String>,
}

impl<E> ExportRecord<E> {
    pub fn new(export: E) -> Self {
        Self {
            timestamp: current_timestamp(),
            export,
            notes: None,
        }
    }

    pub fn with_notes(export: E, notes: impl Into<String>) -> Self {
        Self {
            timestamp: current_timestamp(),
            export,
            notes: Some(notes.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_never_moves_backwards() {
        let mut meta = SessionMetadata::new("rig_align", 1);
        let created = meta.created_at;
        meta.touch();
        assert!(meta.last_modified >= created);
        assert!(meta.description.is_none());
    }

    #[test]
    fn log_entries_record_outcome() {
        let ok = LogEntry::success_with_notes("match", "12 valid");
        assert!(ok.success);
        assert_eq!(ok.notes.as_deref(), Some("12 valid"));

        let failed = LogEntry::failure("refine", "not initialized");
        assert!(!failed.success);
        assert_eq!(failed.operation, "refine");
    }

    #[test]
    fn export_record_roundtrip() {
        let record = ExportRecord::with_notes(vec![1.0, 2.0], "first pass");
        let json = serde_json::to_string(&record).unwrap();
        let restored: ExportRecord<Vec<f64>> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, record);
    }
}
