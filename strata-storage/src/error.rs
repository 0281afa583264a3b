use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("visit {visit} does not exist for origin {origin}")]
    UnknownVisit { origin: String, visit: u64 },

    #[error("origin {0} does not exist")]
    UnknownOrigin(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}
