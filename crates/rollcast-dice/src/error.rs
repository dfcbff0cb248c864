//! Dice spec error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiceError {
    #[error("empty dice spec")]
    EmptySpec,

    #[error("malformed dice term: {0:?}")]
    MalformedTerm(String),

    #[error("invalid die count: {0:?}")]
    InvalidCount(String),

    #[error("unsupported face count: {0} (supported: 4, 6, 8, 10, 12, 20, 100)")]
    UnsupportedFaces(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_empty_spec() {
        assert_eq!(DiceError::EmptySpec.to_string(), "empty dice spec");
    }

    #[test]
    fn test_display_malformed_term() {
        let err = DiceError::MalformedTerm("2x6".into());
        assert_eq!(err.to_string(), "malformed dice term: \"2x6\"");
    }

    #[test]
    fn test_display_invalid_count() {
        let err = DiceError::InvalidCount("0".into());
        assert_eq!(err.to_string(), "invalid die count: \"0\"");
    }

    #[test]
    fn test_display_unsupported_faces() {
        let err = DiceError::UnsupportedFaces(7);
        assert!(err.to_string().starts_with("unsupported face count: 7"));
    }

    #[test]
    fn test_debug_formatting() {
        let err = DiceError::UnsupportedFaces(3);
        let debug = format!("{:?}", err);
        assert!(debug.contains("UnsupportedFaces"));
    }
}
