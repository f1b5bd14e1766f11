/// Job identifiers are opaque server-assigned strings (UUIDs in practice).
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
