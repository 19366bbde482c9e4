// Copyright 2025 Cowboy AI, LLC.

//! Log subscriber setup for the server binary
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies to the
//! whole process.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingSettings;

/// Filter honouring `RUST_LOG`, falling back to `settings.level`
pub fn filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level))
}

/// Install the global subscriber
///
/// Fails if a subscriber is already installed.
pub fn init(settings: &LoggingSettings) -> Result<()> {
    let registry = tracing_subscriber::registry().with(filter(settings));
    if settings.json {
        registry
            .with(fmt::layer().json().with_current_span(false).with_target(true))
            .try_init()?;
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()?;
    }
    Ok(())
}
