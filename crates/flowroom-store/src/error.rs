/// Errors raised by shared state backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("room not found: {0}")]
  RoomNotFound(String),

  /// The backend could not be reached or refused to serve the request.
  #[error("store unavailable: {0}")]
  Unavailable(String),

  /// A concurrent writer kept winning and the update was given up.
  #[error("write conflict on room {0}")]
  Conflict(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("migration error: {0}")]
  Migration(#[from] sqlx::migrate::MigrateError),

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),
}

impl StoreError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, StoreError::RoomNotFound(_))
  }
}
