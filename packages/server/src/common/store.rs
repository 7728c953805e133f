use thiserror::Error;

/// Persistence failures shared by the order and drone stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Compare-and-swap on `revision` lost to a concurrent writer.
    #[error("{entity} {id} was modified concurrently (expected revision {expected})")]
    Conflict {
        entity: &'static str,
        id: String,
        expected: i64,
    },

    #[error("corrupt {entity} record: {message}")]
    Corrupt {
        entity: &'static str,
        message: String,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Optimistic write attempts before an operator action gives up with 409.
pub const MAX_CAS_ATTEMPTS: usize = 3;
