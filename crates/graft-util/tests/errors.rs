use graft_util::errors::GraftError;

#[test]
fn test_io_error_display() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
    let err = GraftError::from(io_err);
    assert!(err.to_string().contains("I/O error"), "got: {err}");
}

#[test]
fn test_config_error_display() {
    let err = GraftError::Config {
        message: "bad syntax".to_string(),
    };
    assert_eq!(err.to_string(), "Config error: bad syntax");
}

#[test]
fn test_invalid_version_display() {
    let err = GraftError::InvalidVersion {
        input: "1.x".to_string(),
        reason: "non-numeric part 'x'".to_string(),
    };
    assert_eq!(err.to_string(), "Invalid version '1.x': non-numeric part 'x'");
}

#[test]
fn test_invalid_range_display() {
    let err = GraftError::InvalidRange {
        input: "[2.0,1.0]".to_string(),
        reason: "minimum is greater than maximum".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "Invalid version range '[2.0,1.0]': minimum is greater than maximum"
    );
}

#[test]
fn test_invalid_framework_display() {
    let err = GraftError::InvalidFramework {
        input: "???".to_string(),
    };
    assert_eq!(err.to_string(), "Invalid target framework '???'");
}

#[test]
fn test_resolution_error_display() {
    let err = GraftError::Resolution {
        message: "1 unresolved range".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "Dependency resolution failed: 1 unresolved range"
    );
}

#[test]
fn test_provider_error_display() {
    let err = GraftError::Provider {
        message: "timeout".to_string(),
    };
    assert_eq!(err.to_string(), "Metadata provider error: timeout");
}

#[test]
fn test_cancelled_display() {
    assert_eq!(GraftError::Cancelled.to_string(), "Resolution cancelled");
}

#[test]
fn test_generic_error_display() {
    let err = GraftError::Generic {
        message: "something broke".to_string(),
    };
    assert_eq!(err.to_string(), "something broke");
}

#[test]
fn test_io_error_from_conversion() {
    let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let graft_err: GraftError = io_err.into();
    assert!(matches!(graft_err, GraftError::Io(_)));
}
