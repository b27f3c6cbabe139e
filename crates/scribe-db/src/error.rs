use thiserror::Error;

/// Store failures a caller can act on. Travels inside `anyhow::Error`;
/// use `downcast_ref::<StoreError>()` to recover it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),
}
