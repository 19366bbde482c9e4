// Copyright 2025 Cowboy AI, LLC.

//! Configuration
//!
//! Service settings come from a TOML file, then environment overrides for
//! topic subjects, then command-line flags. Tenant and world metadata is
//! held separately in a [`TenantConfigStore`].

pub mod args;
pub mod settings;
pub mod tenant;

pub use args::Args;
pub use settings::{
    AppConfig, BusSettings, ConfigError, DatabaseSettings, LoggingSettings, RegistrySettings,
    SagaSettings, ServerSettings, SweepSettings,
};
pub use tenant::{RateType, Rates, TenantConfig, TenantConfigStore, WorldConfig};
