//! OBS client error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ObsError {
    #[error("connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("request {request_type} timed out after {secs}s")]
    Timeout { request_type: String, secs: u64 },

    #[error("request {request_type} failed (code {code}): {comment}")]
    Request {
        request_type: String,
        code: i64,
        comment: String,
    },

    #[error("invalid color value: {0:?}")]
    InvalidColor(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_connect() {
        let err = ObsError::Connect {
            url: "ws://localhost:4455".into(),
            reason: "refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "connection to ws://localhost:4455 failed: refused"
        );
    }

    #[test]
    fn test_display_request() {
        let err = ObsError::Request {
            request_type: "CreateInput".into(),
            code: 600,
            comment: "no such scene".into(),
        };
        assert_eq!(
            err.to_string(),
            "request CreateInput failed (code 600): no such scene"
        );
    }

    #[test]
    fn test_display_timeout() {
        let err = ObsError::Timeout {
            request_type: "GetVideoSettings".into(),
            secs: 10,
        };
        assert_eq!(
            err.to_string(),
            "request GetVideoSettings timed out after 10s"
        );
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<String>("not json{{{").unwrap_err();
        let err: ObsError = json_err.into();
        assert!(matches!(err, ObsError::Serialization(_)));
    }

    #[test]
    fn test_display_invalid_color() {
        let err = ObsError::InvalidColor("zzz".into());
        assert_eq!(err.to_string(), "invalid color value: \"zzz\"");
    }
}
