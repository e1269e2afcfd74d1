//! Unit tests for `AppError` display format.

use quectel_at::AppError;

#[test]
fn display_is_prefixed_with_kind() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Transport("gone".into()), "transport: gone"),
        (AppError::NotOpen, "not open: link is closed"),
        (AppError::Busy("AT".into()), "busy: AT"),
        (AppError::InvalidCommand("empty".into()), "invalid command: empty"),
        (AppError::Command("timeout".into()), "command: timeout"),
        (AppError::Io("denied".into()), "io: denied"),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn messages_have_no_trailing_period() {
    let err = AppError::Transport("cannot open /dev/ttyUSB9: no such file".into());
    let s = err.to_string();
    assert!(!s.ends_with('.'), "error message must not end with a period: {s}");
}

#[test]
fn io_error_converts_to_io_variant() {
    let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");

    let err = AppError::from(io);

    assert!(matches!(err, AppError::Io(ref msg) if msg == "pipe closed"));
}

#[test]
fn toml_error_converts_to_config_variant() {
    let parse = toml::from_str::<toml::Value>("key = ").expect_err("invalid toml");

    let err = AppError::from(parse);

    assert!(err.to_string().starts_with("config: invalid config:"));
}

#[test]
fn app_error_is_a_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    assert_error(&AppError::NotOpen);
}
