// Copyright 2025 Cowboy AI, LLC.

//! Periodic expiry sweeps
//!
//! A [`Sweeper`] knows how often it wants to run and what one pass does.
//! [`spawn_sweeper`] drives it on a tokio interval until the shutdown
//! channel flips. A failing pass is logged and the next tick runs as usual.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::errors::DomainResult;
use crate::tenant::Tenant;

/// One periodic sweep
#[async_trait]
pub trait Sweeper: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Time between passes
    fn interval(&self) -> Duration;

    /// Run one pass as of `now`; returns how many items were swept
    async fn run(&self, now: DateTime<Utc>) -> DomainResult<usize>;
}

/// Source of the tenants a table-backed sweeper visits
pub trait TenantSource: Send + Sync {
    /// Tenants to sweep
    fn tenants(&self) -> Vec<Tenant>;
}

impl TenantSource for Vec<Tenant> {
    fn tenants(&self) -> Vec<Tenant> {
        self.clone()
    }
}

/// Drive `sweeper` until `shutdown` becomes `true` or its sender is dropped
pub fn spawn_sweeper(
    sweeper: Arc<dyn Sweeper>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = sweeper.name();
        let mut ticker = tokio::time::interval(sweeper.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        info!(
            sweeper = name,
            interval_ms = sweeper.interval().as_millis() as u64,
            "Sweeper started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match sweeper.run(Utc::now()).await {
                        Ok(0) => {}
                        Ok(swept) => debug!(sweeper = name, swept, "Sweep finished"),
                        Err(err) => error!(
                            sweeper = name,
                            category = %err.category(),
                            error = %err,
                            "Sweep failed"
                        ),
                    }
                }
            }
        }
        info!(sweeper = name, "Sweeper stopped");
    })
}
