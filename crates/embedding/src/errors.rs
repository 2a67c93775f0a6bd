use hygiene_datastore::DocumentFailure;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Document store error: {}", _0)]
    Datastore(#[from] hygiene_datastore::Error),

    #[error("Materialization aborted: {}", _0)]
    Aborted(DocumentFailure),

    #[error("Could not read documents: {}", _0)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON at line {line}: {source}")]
    InvalidJson {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
