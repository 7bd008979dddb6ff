use env_logger::{Builder, Env};

/// Maps a `-v` count to a default filter: info, debug, then trace.
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Installs the global logger for the binary.
///
/// `RUST_LOG` takes precedence; `default_filter` applies when it is unset.
/// A second call is a no-op.
pub fn init(default_filter: &str) {
    let env = Env::default().default_filter_or(default_filter);
    let _ = Builder::from_env(env)
        .format_timestamp_secs()
        .format_module_path(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(level_for(0), "info");
        assert_eq!(level_for(1), "debug");
        assert_eq!(level_for(5), "trace");
        init("warn");
        init("debug");
    }
}
