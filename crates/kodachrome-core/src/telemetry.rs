//! Global tracing subscriber setup.
//!
//! [`init_tracing`] installs one subscriber per process: an `EnvFilter`
//! (from `RUST_LOG`, else built from the requested level) feeding either the
//! human-readable or the JSON formatter. Later calls are no-ops.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose `info` output is gateway chatter rather than bot activity.
const QUIET_TARGETS: &[&str] = &["serenity", "h2", "hyper", "rustls", "tungstenite"];

/// Install the global subscriber.
///
/// `json` selects newline-delimited JSON lines; `level` applies when
/// `RUST_LOG` is unset.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let (human, structured) = if json {
        (None, Some(fmt::layer().with_target(false).json()))
    } else {
        (Some(fmt::layer().with_target(false)), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(human)
        .with(structured)
        .try_init()
        .ok();
}

/// Filter directives used without `RUST_LOG`: `level` everywhere, `warn` for
/// the noisy dependency targets.
pub fn default_directives(level: Level) -> String {
    let mut directives = vec![level.as_str().to_ascii_lowercase()];
    directives.extend(QUIET_TARGETS.iter().map(|t| format!("{t}=warn")));
    directives.join(",")
}
