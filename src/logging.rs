use tracing_subscriber::{fmt, EnvFilter};

/// Filter directives for a config `logLevel`
///
/// Our own events follow the configured level; dependencies are held at
/// warning or above so GUI and HTTP internals do not flood the console.
pub fn directives(log_level: u8) -> String {
    let ours = match log_level {
        0 => "debug",
        1 => "info",
        2 => "warn",
        _ => "error",
    };
    let theirs = if log_level >= 3 { "error" } else { "warn" };
    format!("{},{}={}", theirs, env!("CARGO_CRATE_NAME"), ours)
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the config.
pub fn init(log_level: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives(log_level)));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_map_to_directives() {
        assert_eq!(directives(0), "warn,tbashow=debug");
        assert_eq!(directives(1), "warn,tbashow=info");
        assert_eq!(directives(2), "warn,tbashow=warn");
        assert_eq!(directives(3), "error,tbashow=error");
    }
}
