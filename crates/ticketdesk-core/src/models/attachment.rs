use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

/// File attached to a ticket. The bytes live behind `url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct Attachment {
    pub id: String,
    pub ticket_id: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
}

impl Attachment {
    /// Human-readable size, e.g. "1.4 MB"
    pub fn size_display(&self) -> String {
        const KB: f64 = 1024.0;
        const MB: f64 = KB * 1024.0;

        let bytes = self.size_bytes as f64;
        if bytes < KB {
            format!("{} B", self.size_bytes)
        } else if bytes < MB {
            format!("{:.1} KB", bytes / KB)
        } else {
            format!("{:.1} MB", bytes / MB)
        }
    }
}
