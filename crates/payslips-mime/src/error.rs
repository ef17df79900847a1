//! Error types for MIME operations.

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid MIME header.
    #[error("Invalid MIME header: {0}")]
    InvalidHeader(String),

    /// Invalid content type.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// Invalid encoding.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// Charset label not known to the decoder.
    #[error("Unknown charset: {0}")]
    UnknownCharset(String),

    /// Missing boundary in multipart message.
    #[error("Missing boundary in multipart message")]
    MissingBoundary,

    /// Invalid multipart structure.
    #[error("Invalid multipart structure: {0}")]
    InvalidMultipart(String),
}

impl Error {
    /// Returns true for charset problems.
    ///
    /// These concern a single part only; the rest of the message can still
    /// be read.
    #[must_use]
    pub const fn is_charset(&self) -> bool {
        matches!(self, Self::UnknownCharset(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_charset() {
        assert!(Error::UnknownCharset("x-klingon".to_string()).is_charset());
        assert!(!Error::MissingBoundary.is_charset());
        assert!(!Error::InvalidEncoding("bad".to_string()).is_charset());
    }
}
