//! Initialisation du logging
//!
//! Le niveau vient de `RUST_LOG` s'il est défini, sinon de
//! `host.logger.min_level` dans la configuration.

use lbconfig::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const DEFAULT_LEVEL: &str = "info";

/// Convertit un niveau de la configuration (`INFO`, `debug`, ...) en directive
fn level_directive(level: &str) -> &'static str {
    match level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARN" | "WARNING" => "warn",
        "ERROR" => "error",
        "OFF" => "off",
        _ => DEFAULT_LEVEL,
    }
}

fn build_filter(config: &Config) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config
            .get_log_min_level()
            .map(|l| level_directive(&l))
            .unwrap_or(DEFAULT_LEVEL);
        EnvFilter::new(level)
    })
}

/// Installe le subscriber global
///
/// Sans effet si un subscriber est déjà installé (tests, application hôte).
pub fn init_logging(config: &Config) {
    let filter = build_filter(config);
    let enable_console = config.get_log_enable_console().unwrap_or(true);

    let subscriber = Registry::default().with(filter);
    let result = if enable_console {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true),
            )
            .try_init()
    } else {
        subscriber.try_init()
    };

    if result.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
}
