use crate::time::Timestamp;

/// Everything that can go wrong while driving a [`crate::State`].
///
/// Mirrors the taxonomy of the store: ingestion errors carry the offending
/// event identifier, declaration errors carry the offending stream name, and
/// structural queries on data-less controllers surface rather than silently
/// returning a default.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StatefulError {
    #[error("event is missing required key '{key}'")]
    InvalidEvent { key: String },

    #[error("stream '{name}' depends on unknown stream '{dependency}'")]
    UnknownDependency { name: String, dependency: String },

    #[error("value for stream '{stream}' at {date:?} cannot be cast to {dtype:?}: {value}")]
    TypeMismatch {
        stream: String,
        date: Timestamp,
        dtype: crate::dtype::Dtype,
        value: String,
    },

    #[error("insertion at {date:?} into stream '{stream}' collided after duplicate-key resolution")]
    DuplicateKey { stream: String, date: Timestamp },

    #[error("structural query '{what}' has no meaning on a space with no data streams")]
    EmptyQuery { what: &'static str },

    #[error("attempted to mutate read-only projection '{what}'")]
    OutOfScopeMutation { what: &'static str },
}

pub type StatefulResult<T> = std::result::Result<T, StatefulError>;
