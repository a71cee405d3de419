//! Batch stream message encoding (§3 Stream Message — batch variant)

use std::collections::HashMap;
use std::path::PathBuf;

/// Fields carried by one batch stream message. Immutable once appended;
/// encoded to/from the stream substrate's `HashMap<String, String>` field
/// map since the substrate speaks only string fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchMessage {
    pub job_id: String,
    pub repository: String,
    /// 1-based.
    pub batch_number: u32,
    pub total_batches: u32,
    pub files: Vec<PathBuf>,
    pub created_at: i64,
}

impl BatchMessage {
    pub fn into_fields(self) -> HashMap<String, String> {
        let files: Vec<String> = self
            .files
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect();
        HashMap::from([
            ("job_id".to_string(), self.job_id),
            ("repository".to_string(), self.repository),
            ("batch_number".to_string(), self.batch_number.to_string()),
            ("total_batches".to_string(), self.total_batches.to_string()),
            (
                "files".to_string(),
                serde_json::to_string(&files).unwrap_or_default(),
            ),
            ("created_at".to_string(), self.created_at.to_string()),
        ])
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        let job_id = fields.get("job_id")?.clone();
        let repository = fields.get("repository")?.clone();
        let batch_number = fields.get("batch_number")?.parse().ok()?;
        let total_batches = fields.get("total_batches")?.parse().ok()?;
        let files: Vec<String> = serde_json::from_str(fields.get("files")?).ok()?;
        let files = files.into_iter().map(PathBuf::from).collect();
        let created_at = fields.get("created_at")?.parse().ok()?;
        Some(Self {
            job_id,
            repository,
            batch_number,
            total_batches,
            files,
            created_at,
        })
    }

    /// `--files` argv value for the Isolated Worker CLI contract (§6).
    pub fn files_arg(&self) -> String {
        self.files
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_field_map() {
        let message = BatchMessage {
            job_id: "job-1".to_string(),
            repository: "acme/widgets".to_string(),
            batch_number: 2,
            total_batches: 3,
            files: vec![PathBuf::from("src/a.rs"), PathBuf::from("src/b.rs")],
            created_at: 1_700_000_000,
        };

        let fields = message.clone().into_fields();
        let decoded = BatchMessage::from_fields(&fields).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn files_arg_is_comma_joined() {
        let message = BatchMessage {
            job_id: "job-1".to_string(),
            repository: "r".to_string(),
            batch_number: 1,
            total_batches: 1,
            files: vec![PathBuf::from("a.rs"), PathBuf::from("b.rs")],
            created_at: 0,
        };
        assert_eq!(message.files_arg(), "a.rs,b.rs");
    }

    #[test]
    fn missing_field_fails_to_decode() {
        let fields = HashMap::from([("job_id".to_string(), "job-1".to_string())]);
        assert!(BatchMessage::from_fields(&fields).is_none());
    }
}
