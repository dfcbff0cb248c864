//! Script errors.

use thiserror::Error;

/// Errors from compiling or evaluating an extension script.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script '{name}' failed to compile: {reason}")]
    Compile { name: String, reason: String },

    #[error("script '{name}' failed: {reason}")]
    Runtime { name: String, reason: String },

    #[error("script '{name}' exceeded the instruction limit")]
    InstructionLimit { name: String },

    #[error("value conversion failed: {0}")]
    Convert(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScriptError::Compile {
            name: "greet".to_string(),
            reason: "unexpected symbol".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "script 'greet' failed to compile: unexpected symbol"
        );

        let err = ScriptError::InstructionLimit {
            name: "spin".to_string(),
        };
        assert!(err.to_string().contains("instruction limit"));
    }
}
