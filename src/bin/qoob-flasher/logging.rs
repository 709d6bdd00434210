pub fn init_tracing() {
    // Logging is opt-in via RUST_LOG or QOOB_FLASHER_LOG. The
    // subscriber writes to stderr; stdout carries the `--json` stream.

    let explicit = std::env::var_os("QOOB_FLASHER_LOG").is_some();
    let filter = std::env::var("RUST_LOG").ok();
    if !explicit && !filter.as_deref().is_some_and(|s| !s.trim().is_empty()) {
        return;
    }

    let filter = filter.unwrap_or_else(|| "info".to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
