//! Integration tests for error handling

use passthru_core::error::{PassthruError, ResultExt, SinkError};
use passthru_core::Result;

#[test]
fn test_error_display() {
    assert_eq!(
        PassthruError::uninitialized("no sink").to_string(),
        "Encoder not initialized: no sink"
    );
    assert_eq!(
        PassthruError::invalid("zero width").to_string(),
        "Invalid parameter: zero width"
    );
    assert_eq!(
        PassthruError::from(SinkError::SendFailed("closed pipe".into())).to_string(),
        "Output sink error: send failed: closed pipe"
    );
}

#[test]
fn test_user_hints() {
    assert!(PassthruError::uninitialized("x").user_hint().is_some());
    assert!(PassthruError::invalid("x").user_hint().is_some());
    assert!(PassthruError::EmptyPayload.user_hint().is_some());
    assert!(PassthruError::UnknownCodec("theora".into()).user_hint().is_some());
    assert!(PassthruError::config("x").user_hint().is_some());
    assert!(PassthruError::Sink(SinkError::Closed).user_hint().is_none());
}

#[test]
fn test_context_chaining() {
    fn failing() -> Result<()> {
        Err(PassthruError::invalid("zero height"))
    }

    let err = failing().context("configuring layer 2").unwrap_err();
    assert_eq!(
        err.to_string(),
        "configuring layer 2: Invalid parameter: zero height"
    );
    assert!(err.requires_reinit());
    assert_eq!(
        err.user_hint(),
        Some("Codec settings need a non-zero width and height")
    );
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_io_error_converts() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: PassthruError = io.into();
    assert!(matches!(err, PassthruError::Io(_)));
    assert!(!err.requires_reinit());
}
