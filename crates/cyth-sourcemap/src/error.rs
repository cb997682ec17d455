use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceMapError {
    #[error("invalid base64 digit {character:?} in segment {segment}")]
    InvalidDigit { character: char, segment: usize },

    #[error("segment {segment} ends in the middle of a value")]
    Truncated { segment: usize },

    #[error("value in segment {segment} does not fit in 32 bits")]
    Overflow { segment: usize },

    #[error("segment {segment} has more than five fields")]
    TrailingFields { segment: usize },

    #[error("function index {0} is not in the descriptor's function table")]
    UnknownFunction(u32),

    #[error("malformed debug descriptor: {0}")]
    Descriptor(#[from] serde_json::Error),
}
