/// Install a stderr `tracing` subscriber.
///
/// Filter comes from `RUST_LOG`, defaulting to debug for this crate and info
/// elsewhere. Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledgerchat_core=debug,info".into()),
        )
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_twice_is_harmless() {
        super::init_logging();
        super::init_logging();
        tracing::debug!("logging initialized");
    }
}
