// Copyright 2025 Cowboy AI, LLC.

//! Reference data decoration
//!
//! A [`Decorator`] answers one batched lookup for the assets of the
//! reference types it serves. The [`DecoratorPipeline`] runs every
//! decorator over a list of assets; a failed lookup, or a missing entry,
//! leaves the affected assets undecorated and is only logged.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use super::asset::{Asset, ReferenceData, ReferenceType};
use crate::errors::DomainResult;
use crate::tenant::Tenant;

/// Batched source of reference data for some reference types
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Decorator: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Whether assets of `reference_type` go through this decorator
    fn serves(&self, reference_type: ReferenceType) -> bool;

    /// Data for each of `reference_ids`; ids it has nothing for are omitted
    async fn lookup(
        &self,
        tenant: &Tenant,
        reference_ids: Vec<u32>,
    ) -> DomainResult<HashMap<u32, ReferenceData>>;
}

/// Ordered list of decorators
#[derive(Clone, Default)]
pub struct DecoratorPipeline {
    decorators: Vec<Arc<dyn Decorator>>,
}

impl DecoratorPipeline {
    /// Pipeline without decorators
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a decorator
    pub fn with(mut self, decorator: Arc<dyn Decorator>) -> Self {
        self.decorators.push(decorator);
        self
    }

    /// Number of decorators
    pub fn len(&self) -> usize {
        self.decorators.len()
    }

    /// Whether there are no decorators
    pub fn is_empty(&self) -> bool {
        self.decorators.is_empty()
    }

    /// Decorate `assets` in place of the originals
    pub async fn decorate(&self, tenant: &Tenant, mut assets: Vec<Asset>) -> Vec<Asset> {
        for decorator in &self.decorators {
            let mut reference_ids: Vec<u32> = assets
                .iter()
                .filter(|a| decorator.serves(a.reference_type))
                .map(|a| a.reference_id)
                .collect();
            if reference_ids.is_empty() {
                continue;
            }
            reference_ids.sort_unstable();
            reference_ids.dedup();

            let found = match decorator.lookup(tenant, reference_ids).await {
                Ok(found) => found,
                Err(err) => {
                    warn!(
                        tenant_id = %tenant.id,
                        decorator = decorator.name(),
                        category = %err.category(),
                        error = %err,
                        "Decoration failed, using undecorated assets"
                    );
                    continue;
                }
            };
            for asset in assets.iter_mut().filter(|a| decorator.serves(a.reference_type)) {
                match found.get(&asset.reference_id) {
                    Some(data) if data.reference_type() == asset.reference_type => {
                        asset.reference_data = Some(data.clone())
                    }
                    Some(data) => warn!(
                        asset_id = asset.id,
                        expected = %asset.reference_type,
                        found = %data.reference_type(),
                        decorator = decorator.name(),
                        "Decorator returned mismatched reference data"
                    ),
                    None => warn!(
                        asset_id = asset.id,
                        reference_id = asset.reference_id,
                        decorator = decorator.name(),
                        "No reference data, using undecorated asset"
                    ),
                }
            }
        }
        assets
    }
}

/// [`Decorator`] answering from a fixed table
pub struct TableDecorator {
    name: &'static str,
    serves: Vec<ReferenceType>,
    table: HashMap<u32, ReferenceData>,
}

impl TableDecorator {
    /// Decorator `name` for `serves`, initially empty
    pub fn new(name: &'static str, serves: Vec<ReferenceType>) -> Self {
        Self {
            name,
            serves,
            table: HashMap::new(),
        }
    }

    /// Add an entry
    pub fn with_entry(mut self, reference_id: u32, data: ReferenceData) -> Self {
        self.table.insert(reference_id, data);
        self
    }
}

#[async_trait]
impl Decorator for TableDecorator {
    fn name(&self) -> &'static str {
        self.name
    }

    fn serves(&self, reference_type: ReferenceType) -> bool {
        self.serves.contains(&reference_type)
    }

    async fn lookup(
        &self,
        _tenant: &Tenant,
        reference_ids: Vec<u32>,
    ) -> DomainResult<HashMap<u32, ReferenceData>> {
        Ok(reference_ids
            .into_iter()
            .filter_map(|id| self.table.get(&id).map(|d| (id, d.clone())))
            .collect())
    }
}
