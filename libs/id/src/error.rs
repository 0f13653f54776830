use thiserror::Error;

/// Why a string is not a valid `{prefix}_{ulid}` id.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("id is empty")]
    Empty,

    /// Well formed, but minted for another id type.
    #[error("id has prefix '{actual}', expected '{expected}'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    #[error("id has no '_' between prefix and ULID")]
    MissingSeparator,

    #[error("id has a malformed ULID: {0}")]
    InvalidUlid(String),
}

impl IdError {
    pub fn is_prefix_error(&self) -> bool {
        matches!(self, IdError::InvalidPrefix { .. })
    }
}
