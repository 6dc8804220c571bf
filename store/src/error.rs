/// Failure talking to the store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("invalid store address: {0}")]
    Address(#[from] url::ParseError),
    #[error("store request failed")]
    Request(#[from] reqwest::Error),
    #[error("store answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("store rejected statement: {0}")]
    Statement(String),
}

impl StoreError {
    /// The store reports existing databases and policies as statement errors.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::Statement(message) if message.contains("already exists"))
    }
}

/// Creating the database or retention policy failed. Fatal at startup.
#[derive(thiserror::Error, Debug)]
#[error("schema setup failed on {statement:?}")]
pub struct SchemaSetupError {
    pub statement: String,
    #[source]
    pub source: StoreError,
}

/// One batch could not be written. The batch is gone, the pipeline continues.
#[derive(thiserror::Error, Debug)]
#[error("failed to write {points} points to {database}")]
pub struct WriteError {
    pub database: String,
    pub points: usize,
    #[source]
    pub source: StoreError,
}
