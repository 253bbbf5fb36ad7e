//! Logging setup for binaries built on Mapwire.

use mapwire_session::DebugFlags;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Builds the filter: `RUST_LOG` if set, else `info`, plus a `debug`
/// directive for each enabled debug target.
pub fn env_filter(debug: &DebugFlags) -> EnvFilter {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    for target in debug_targets(debug) {
        if let Ok(directive) = format!("{target}=debug").parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Installs a stdout subscriber filtered by [`env_filter`].
///
/// Returns `false` if a global subscriber was already set.
pub fn init_tracing(debug: &DebugFlags) -> bool {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter(debug))
        .try_init()
        .is_ok()
}

fn debug_targets(debug: &DebugFlags) -> Vec<&'static str> {
    let mut targets = Vec::new();
    if debug.io {
        targets.push("mapwire::io");
    }
    if debug.messages {
        targets.push("mapwire::messages");
    }
    if debug.auth {
        targets.push("mapwire::auth");
    }
    if debug.events {
        targets.push("mapwire::events");
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_targets_follow_flags() {
        let flags: DebugFlags = "io,auth".parse().unwrap();
        assert_eq!(debug_targets(&flags), vec!["mapwire::io", "mapwire::auth"]);
        assert!(debug_targets(&DebugFlags::default()).is_empty());
        assert_eq!(debug_targets(&DebugFlags::all()).len(), 4);
    }

    #[test]
    fn test_env_filter_mentions_enabled_targets() {
        let filter = env_filter(&"messages".parse().unwrap());
        assert!(filter.to_string().contains("mapwire::messages=debug"));
    }
}
