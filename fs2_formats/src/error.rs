use thiserror::Error;

/// Failures raised while decoding archive manifests, scene containers and
/// image headers.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("{format} signature mismatch")]
    BadMagic { format: &'static str },
    #[error("{what} truncated: needed {needed} bytes, found {available}")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },
    #[error("malformed table layout: {0}")]
    TableLayout(String),
    #[error("decompression failed: {0}")]
    Decompress(String),
    #[error("cipher setup failed: {0}")]
    Cipher(String),
}

impl FormatError {
    pub(crate) fn truncated(what: &'static str, needed: usize, available: usize) -> Self {
        FormatError::Truncated {
            what,
            needed,
            available,
        }
    }

    pub(crate) fn layout(message: impl Into<String>) -> Self {
        FormatError::TableLayout(message.into())
    }
}

impl From<std::io::Error> for FormatError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => FormatError::layout("unexpected end of data"),
            _ => FormatError::layout(err.to_string()),
        }
    }
}
