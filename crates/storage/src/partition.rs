use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Lineage identity for one write: which task/run/schema/source produced
/// the records, and when. Every bronze row and trash document is stamped
/// with this.
#[derive(Debug, Clone)]
pub struct WriteContext {
    pub source_id: String,
    pub schema_id: Uuid,
    pub task_id: Uuid,
    pub run_id: Uuid,
    pub ingested_at: DateTime<Utc>,
}

impl WriteContext {
    /// `<source_id>/<yyyy>/<mm>/<dd>/<task_id>/` (schema §4.8/§6).
    pub fn bronze_prefix(&self) -> String {
        format!(
            "{}/{:04}/{:02}/{:02}/{}",
            self.source_id,
            self.ingested_at.format("%Y"),
            self.ingested_at.format("%m"),
            self.ingested_at.format("%d"),
            self.task_id,
        )
    }

    /// `rejected/<yyyy>/<mm>/<dd>/<task_id>.json` (schema §6).
    pub fn trash_rejected_path(&self) -> String {
        format!(
            "rejected/{}/{}.json",
            self.ingested_at.format("%Y/%m/%d"),
            self.task_id,
        )
    }

    /// `debug/<yyyy>/<mm>/<dd>/<task_id>/` (schema §6).
    pub fn trash_debug_prefix(&self) -> String {
        format!("debug/{}/{}", self.ingested_at.format("%Y/%m/%d"), self.task_id)
    }
}
