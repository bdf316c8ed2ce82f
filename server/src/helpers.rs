use std::env;
use tracing::Level;
use tracing_subscriber::{filter::Targets, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Flags that may be written with a single dash like `-upstream`.
const SINGLE_DASH_FLAGS: [&str; 5] = ["address", "upstream", "timeout", "verbose", "config"];

/**
 * Sets `RUST_BACKTRACE=full` as default so we always get a full stacktrace
 * on an error.
 */
pub(crate) fn set_full_stacktrace_as_default() {
    let key = "RUST_BACKTRACE";
    if env::var(key).is_ok() {
        return;
    }
    env::set_var(key, "1");
}

pub(crate) fn enable_logging(verbose: bool) {
    let value = env::var("RUST_LOG").unwrap_or_default();

    if !value.is_empty() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
        tracing::info!("Used RUST_LOG={} env variable to set logging output.", value);
        if verbose {
            tracing::warn!("RUST_LOG= is set. Ignore --verbose flag.")
        }
        return;
    }

    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = Targets::new()
        .with_target("prodoh", level)
        .with_target("hyper", Level::WARN)
        .with_target("reqwest", Level::WARN)
        .with_target("rustls", Level::WARN);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    if verbose {
        tracing::info!("Verbose mode enabled.");
    }
}

/**
 * Rewrites `-upstream url` and `-timeout=3` into their double dash form
 * so clap accepts them. Values like `-1` stay untouched.
 */
pub(crate) fn normalize_single_dash_flags(args: impl IntoIterator<Item = String>) -> Vec<String> {
    args.into_iter()
        .map(|arg| {
            let Some(flag) = arg.strip_prefix('-') else {
                return arg;
            };
            if flag.starts_with('-') {
                return arg;
            }
            let name = flag.split('=').next().unwrap_or_default();
            if SINGLE_DASH_FLAGS.contains(&name) {
                format!("-{arg}")
            } else {
                arg
            }
        })
        .collect()
}

/// Waits until the process receives SIGINT or SIGTERM.
pub(crate) async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::warn!("Unable to listen for SIGTERM. {e}");
                wait_on_ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = wait_on_ctrl_c() => {},
            _ = sigterm.recv() => {
                tracing::debug!("Received SIGTERM.");
            }
        }
    }

    #[cfg(not(unix))]
    wait_on_ctrl_c().await;
}

async fn wait_on_ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Unable to listen for shutdown signal Ctrl+C: {}", err);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(args: &[&str]) -> Vec<String> {
        normalize_single_dash_flags(args.iter().map(|a| a.to_string()))
    }

    #[test]
    fn single_dash_flags_get_a_second_dash() {
        assert_eq!(
            normalize(&["prodoh", "-address", ":53", "-upstream=https://dns.google/resolve"]),
            vec!["prodoh", "--address", ":53", "--upstream=https://dns.google/resolve"]
        );
    }

    #[test]
    fn other_arguments_stay() {
        assert_eq!(
            normalize(&["prodoh", "--timeout", "-1", "-v", "-h"]),
            vec!["prodoh", "--timeout", "-1", "-v", "-h"]
        );
    }

    #[test]
    fn single_dash_timeout_with_negative_value() {
        assert_eq!(normalize(&["-timeout", "-1"]), vec!["--timeout", "-1"]);
    }
}
