// Copyright 2025 Cowboy AI, LLC.

//! Tenant-scoped in-memory table
//!
//! [`TenantTable`] behaves like one relational table: every row carries its
//! tenant, a numeric primary key and created/updated/deleted timestamps.
//! Every read takes the caller's tenant and skips soft-deleted rows, so
//! there is no way to observe another tenant's data through it.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};
use crate::tenant::Tenant;

/// One stored row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row<E> {
    /// Owning tenant
    pub tenant: Tenant,
    /// Primary key
    pub id: u32,
    /// Insert time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
    /// Soft deletion time
    pub deleted_at: Option<DateTime<Utc>>,
    /// Entity columns
    pub entity: E,
}

impl<E> Row<E> {
    /// Tenant id column
    pub fn tenant_id(&self) -> Uuid {
        self.tenant.id
    }

    /// Whether the row is visible to queries
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// In-memory table of `E` rows keyed by `(tenant_id, id)`
pub struct TenantTable<E> {
    name: &'static str,
    sequence: AtomicU32,
    rows: RwLock<BTreeMap<(Uuid, u32), Row<E>>>,
}

impl<E: Clone> TenantTable<E> {
    /// Empty table; `name` labels not-found errors
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            sequence: AtomicU32::new(1),
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    /// Table name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Insert a row whose entity is built from the allocated primary key
    pub fn insert<F>(&self, tenant: &Tenant, build: F) -> DomainResult<Row<E>>
    where
        F: FnOnce(u32) -> DomainResult<E>,
    {
        let id = self.sequence.fetch_add(1, Ordering::SeqCst);
        let entity = build(id)?;
        let now = Utc::now();
        let row = Row {
            tenant: tenant.clone(),
            id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            entity,
        };
        self.rows.write().insert((tenant.id, id), row.clone());
        Ok(row)
    }

    /// Live row by primary key
    pub fn get(&self, tenant: &Tenant, id: u32) -> DomainResult<Row<E>> {
        self.rows
            .read()
            .get(&(tenant.id, id))
            .filter(|r| r.is_live())
            .cloned()
            .ok_or_else(|| DomainError::not_found(self.name, id))
    }

    /// Live rows of `tenant` matching `predicate`, in primary key order
    pub fn find<P>(&self, tenant: &Tenant, predicate: P) -> Vec<Row<E>>
    where
        P: Fn(&E) -> bool,
    {
        self.rows
            .read()
            .range((tenant.id, 0)..=(tenant.id, u32::MAX))
            .map(|(_, r)| r)
            .filter(|r| r.is_live() && predicate(&r.entity))
            .cloned()
            .collect()
    }

    /// Live rows of every tenant matching `predicate`
    ///
    /// Only sweepers use this; request paths always go through [`TenantTable::find`].
    pub fn scan<P>(&self, predicate: P) -> Vec<Row<E>>
    where
        P: Fn(&E) -> bool,
    {
        self.rows
            .read()
            .values()
            .filter(|r| r.is_live() && predicate(&r.entity))
            .cloned()
            .collect()
    }

    /// Mutate a live row
    pub fn update<F>(&self, tenant: &Tenant, id: u32, update: F) -> DomainResult<Row<E>>
    where
        F: FnOnce(&mut E) -> DomainResult<()>,
    {
        let mut rows = self.rows.write();
        let row = rows
            .get_mut(&(tenant.id, id))
            .filter(|r| r.is_live())
            .ok_or_else(|| DomainError::not_found(self.name, id))?;
        let mut entity = row.entity.clone();
        update(&mut entity)?;
        row.entity = entity;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    /// Soft delete a live row
    pub fn soft_delete(&self, tenant: &Tenant, id: u32) -> DomainResult<Row<E>> {
        let mut rows = self.rows.write();
        let row = rows
            .get_mut(&(tenant.id, id))
            .filter(|r| r.is_live())
            .ok_or_else(|| DomainError::not_found(self.name, id))?;
        let now = Utc::now();
        row.deleted_at = Some(now);
        row.updated_at = now;
        Ok(row.clone())
    }

    /// Soft delete every live row of `tenant` matching `predicate`
    pub fn soft_delete_where<P>(&self, tenant: &Tenant, predicate: P) -> Vec<Row<E>>
    where
        P: Fn(&E) -> bool,
    {
        let now = Utc::now();
        let mut rows = self.rows.write();
        rows.range_mut((tenant.id, 0)..=(tenant.id, u32::MAX))
            .map(|(_, r)| r)
            .filter(|r| r.is_live() && predicate(&r.entity))
            .map(|r| {
                r.deleted_at = Some(now);
                r.updated_at = now;
                r.clone()
            })
            .collect()
    }

    /// Physically remove every row of `tenant` matching `predicate`, live or not
    pub fn purge_where<P>(&self, tenant: &Tenant, predicate: P) -> usize
    where
        P: Fn(&E) -> bool,
    {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|(tenant_id, _), r| *tenant_id != tenant.id || !predicate(&r.entity));
        before - rows.len()
    }

    /// Live row count for `tenant`
    pub fn count(&self, tenant: &Tenant) -> usize {
        self.find(tenant, |_| true).len()
    }
}
