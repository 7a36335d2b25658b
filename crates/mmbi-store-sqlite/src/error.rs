//! Error type for `mmbi-store-sqlite`.

use mmbi_core::DomainFailure;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] mmbi_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown {column} value in database: {value:?}")]
  UnknownDiscriminant { column: &'static str, value: String },

  #[error("upsert change #{0} carries no document")]
  MissingDocument(i64),
}

impl DomainFailure for Error {
  fn into_domain(self) -> Result<mmbi_core::Error, Self> {
    match self {
      Error::Core(e) => Ok(e),
      other => Err(other),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
