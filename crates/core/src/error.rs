/// Domain errors surfaced to the transport layer.
///
/// `Conflict` and `NotFound` are produced only when a caller converts a
/// negative outcome (denied lock, foreign owner) into an error for display;
/// the managers themselves report those as plain outcomes.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}
