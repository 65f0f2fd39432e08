//! Unit tests for the error taxonomy.

use browser_warden::AppError;

#[test]
fn display_prefixes_match_variants() {
    assert_eq!(
        AppError::NotFound("session x".into()).to_string(),
        "not found: session x"
    );
    assert_eq!(
        AppError::NotConnected("session y".into()).to_string(),
        "not connected: session y"
    );
    assert_eq!(
        AppError::Automation("bad selector".into()).to_string(),
        "automation: bad selector"
    );
    assert_eq!(
        AppError::Provision("image build".into()).to_string(),
        "provision: image build"
    );
    assert_eq!(
        AppError::Transport("disk full".into()).to_string(),
        "transport: disk full"
    );
}

#[test]
fn io_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: AppError = io.into();
    assert!(matches!(err, AppError::Io(_)));
}

#[test]
fn toml_errors_convert_to_config() {
    let bad: Result<toml::Value, _> = toml::from_str("= nope");
    let err: AppError = bad.expect_err("invalid toml").into();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn errors_implement_std_error() {
    fn assert_error<E: std::error::Error>(_err: &E) {}
    assert_error(&AppError::Io("disk".into()));
}
