use crate::batch::DocumentFailure;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("sqlite error: {}", _0)]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {}", _0)]
    Json(#[from] serde_json::Error),

    #[error("Could not render statement template: {}", _0)]
    Template(#[from] tera::Error),

    #[error("{0:?} is not a valid collection name")]
    InvalidCollectionName(String),

    #[error("{0:?} is not a valid field path")]
    InvalidPath(String),

    #[error("{0:?} is not a valid ObjectId")]
    InvalidObjectId(String),

    #[error("Validator pattern {pattern:?} does not compile: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Filter on {path} can't compare against {value}")]
    UnsupportedFilterValue {
        path: String,
        value: serde_json::Value,
    },

    /// Indexes can reach through one level of arrays, not more.
    #[error("Cannot index {path}: {prefix} holds arrays")]
    UnsupportedIndex { path: String, prefix: String },

    #[error("Batch aborted: {}", _0)]
    BatchAborted(DocumentFailure),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
