//! Logging and metrics for the authentication gateway.

pub mod metrics;

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
///
/// Events use explicit `gateway.*` and `common.*` targets; `auth_gateway`
/// covers spans named after the module path.
pub const DEFAULT_LOG_FILTER: &str = "gateway=info,auth_gateway=info,common=info";

/// Install the global tracing subscriber.
///
/// Honours `RUST_LOG`, falling back to [`DEFAULT_LOG_FILTER`]. With `json`
/// set, events are written as JSON lines.
///
/// # Errors
///
/// Returns `TryInitError` if a global subscriber is already installed.
pub fn init_tracing(json: bool) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
    );

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    }
}
