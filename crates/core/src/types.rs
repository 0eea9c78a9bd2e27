/// Stable identifier of a coordinated resource (document, record, node).
pub type ResourceId = String;

/// Identifier of an authenticated actor (user or session).
pub type ActorId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
