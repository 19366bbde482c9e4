// Copyright 2025 Cowboy AI, LLC.

//! Login history
//!
//! Each login attempt is recorded with the address and hardware id it came
//! from, which is what administrators search when deciding on a ban.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row as _};
use std::sync::Arc;
use tracing::debug;

use crate::errors::{DomainError, DomainResult};
use crate::field::AccountId;
use crate::persistence::{RetryPolicy, TenantTable};
use crate::tenant::Tenant;

/// One recorded login attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRecord {
    /// Primary key
    pub id: u32,
    /// Account that attempted the login
    pub account_id: AccountId,
    /// Account name as typed
    pub account_name: String,
    /// Client address
    pub ip_address: String,
    /// Client hardware id
    pub hwid: String,
    /// Whether the login succeeded
    pub success: bool,
    /// Why the login failed, empty on success
    pub failure_reason: String,
    /// When the attempt happened
    pub created_at: DateTime<Utc>,
}

/// Attempt to be recorded
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoginAttempt {
    /// Account that attempted the login
    pub account_id: AccountId,
    /// Account name as typed
    pub account_name: String,
    /// Client address
    pub ip_address: String,
    /// Client hardware id
    pub hwid: String,
    /// Whether the login succeeded
    pub success: bool,
    /// Why the login failed
    pub failure_reason: String,
}

impl LoginAttempt {
    fn validate(&self) -> DomainResult<()> {
        if self.account_name.trim().is_empty() {
            return Err(DomainError::validation("account name is required"));
        }
        if self.success && !self.failure_reason.is_empty() {
            return Err(DomainError::validation(
                "a successful login has no failure reason",
            ));
        }
        Ok(())
    }

    fn into_record(self, id: u32, created_at: DateTime<Utc>) -> LoginRecord {
        LoginRecord {
            id,
            account_id: self.account_id,
            account_name: self.account_name,
            ip_address: self.ip_address,
            hwid: self.hwid,
            success: self.success,
            failure_reason: self.failure_reason,
            created_at,
        }
    }
}

/// Which column a history search matches on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryFilter {
    /// Every record of the tenant
    All,
    /// Records of one account
    Account(AccountId),
    /// Records from one address
    Ip(String),
    /// Records from one hardware id
    Hwid(String),
}

impl HistoryFilter {
    fn matches(&self, record: &LoginRecord) -> bool {
        match self {
            HistoryFilter::All => true,
            HistoryFilter::Account(id) => record.account_id == *id,
            HistoryFilter::Ip(ip) => &record.ip_address == ip,
            HistoryFilter::Hwid(hwid) => &record.hwid == hwid,
        }
    }
}

/// Tenant-scoped login history persistence
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append an attempt
    async fn record(&self, tenant: &Tenant, attempt: LoginAttempt) -> DomainResult<LoginRecord>;

    /// Records matching `filter`, newest first
    async fn search(
        &self,
        tenant: &Tenant,
        filter: &HistoryFilter,
    ) -> DomainResult<Vec<LoginRecord>>;

    /// Physically remove records created before `cutoff`; returns how many
    async fn purge_before(&self, tenant: &Tenant, cutoff: DateTime<Utc>) -> DomainResult<u64>;
}

/// [`HistoryStore`] over a [`TenantTable`]
pub struct InMemoryHistoryStore {
    table: TenantTable<LoginRecord>,
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self {
            table: TenantTable::new("login_history"),
        }
    }
}

impl InMemoryHistoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record with an explicit timestamp
    pub fn record_at(
        &self,
        tenant: &Tenant,
        attempt: LoginAttempt,
        at: DateTime<Utc>,
    ) -> DomainResult<LoginRecord> {
        attempt.validate()?;
        Ok(self
            .table
            .insert(tenant, |id| Ok(attempt.into_record(id, at)))?
            .entity)
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn record(&self, tenant: &Tenant, attempt: LoginAttempt) -> DomainResult<LoginRecord> {
        self.record_at(tenant, attempt, Utc::now())
    }

    async fn search(
        &self,
        tenant: &Tenant,
        filter: &HistoryFilter,
    ) -> DomainResult<Vec<LoginRecord>> {
        let mut records: Vec<LoginRecord> = self
            .table
            .find(tenant, |r| filter.matches(r))
            .into_iter()
            .map(|r| r.entity)
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    async fn purge_before(&self, tenant: &Tenant, cutoff: DateTime<Utc>) -> DomainResult<u64> {
        Ok(self.table.purge_where(tenant, |r| r.created_at < cutoff) as u64)
    }
}

/// [`HistoryStore`] backed by the `login_history` table
#[derive(Clone)]
pub struct PgHistoryStore {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgHistoryStore {
    /// Store over `pool`
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }

    fn from_row(row: &PgRow) -> DomainResult<LoginRecord> {
        let id: i32 = row.try_get("id")?;
        let account_id: i32 = row.try_get("account_id")?;
        Ok(LoginRecord {
            id: id as u32,
            account_id: account_id as AccountId,
            account_name: row.try_get("account_name")?,
            ip_address: row.try_get("ip_address")?,
            hwid: row.try_get("hwid")?,
            success: row.try_get("success")?,
            failure_reason: row.try_get("failure_reason")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

const HISTORY_COLUMNS: &str =
    "id, account_id, account_name, ip_address, hwid, success, failure_reason, created_at";

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn record(&self, tenant: &Tenant, attempt: LoginAttempt) -> DomainResult<LoginRecord> {
        attempt.validate()?;
        let sql = format!(
            "INSERT INTO login_history \
             (tenant_id, account_id, account_name, ip_address, hwid, success, failure_reason) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {HISTORY_COLUMNS}"
        );
        let (sql, attempt) = (sql.as_str(), &attempt);
        let row = self
            .retry
            .run("login_history.record", || async move {
                Ok(sqlx::query(sql)
                    .bind(tenant.id)
                    .bind(attempt.account_id as i32)
                    .bind(&attempt.account_name)
                    .bind(&attempt.ip_address)
                    .bind(&attempt.hwid)
                    .bind(attempt.success)
                    .bind(&attempt.failure_reason)
                    .fetch_one(&self.pool)
                    .await?)
            })
            .await?;
        Self::from_row(&row)
    }

    async fn search(
        &self,
        tenant: &Tenant,
        filter: &HistoryFilter,
    ) -> DomainResult<Vec<LoginRecord>> {
        let clause = match filter {
            HistoryFilter::All => "",
            HistoryFilter::Account(_) => " AND account_id = $2",
            HistoryFilter::Ip(_) => " AND ip_address = $2",
            HistoryFilter::Hwid(_) => " AND hwid = $2",
        };
        let sql = format!(
            "SELECT {HISTORY_COLUMNS} FROM login_history WHERE tenant_id = $1{clause} \
             ORDER BY created_at DESC, id DESC"
        );
        let sql = sql.as_str();
        let rows = self
            .retry
            .run("login_history.search", || async move {
                let query = sqlx::query(sql).bind(tenant.id);
                let query = match filter {
                    HistoryFilter::All => query,
                    HistoryFilter::Account(id) => query.bind(*id as i32),
                    HistoryFilter::Ip(value) | HistoryFilter::Hwid(value) => {
                        query.bind(value.as_str())
                    }
                };
                Ok(query.fetch_all(&self.pool).await?)
            })
            .await?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn purge_before(&self, tenant: &Tenant, cutoff: DateTime<Utc>) -> DomainResult<u64> {
        let result = self
            .retry
            .run("login_history.purge", || async move {
                Ok(sqlx::query("DELETE FROM login_history WHERE tenant_id = $1 AND created_at < $2")
                    .bind(tenant.id)
                    .bind(cutoff)
                    .execute(&self.pool)
                    .await?)
            })
            .await?;
        Ok(result.rows_affected())
    }
}

/// Login history operations for one process
#[derive(Clone)]
pub struct HistoryProcessor {
    store: Arc<dyn HistoryStore>,
}

impl HistoryProcessor {
    /// Processor over `store`
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Record one attempt
    pub async fn record(
        &self,
        tenant: &Tenant,
        attempt: LoginAttempt,
    ) -> DomainResult<LoginRecord> {
        let record = self.store.record(tenant, attempt).await?;
        debug!(
            tenant_id = %tenant.id,
            account_id = record.account_id,
            success = record.success,
            "Recorded login attempt"
        );
        Ok(record)
    }

    /// Attempts of one account
    pub async fn by_account(
        &self,
        tenant: &Tenant,
        account_id: AccountId,
    ) -> DomainResult<Vec<LoginRecord>> {
        self.store.search(tenant, &HistoryFilter::Account(account_id)).await
    }

    /// Attempts from one address
    pub async fn by_ip(&self, tenant: &Tenant, ip: &str) -> DomainResult<Vec<LoginRecord>> {
        self.store.search(tenant, &HistoryFilter::Ip(ip.to_string())).await
    }

    /// Attempts from one hardware id
    pub async fn by_hwid(&self, tenant: &Tenant, hwid: &str) -> DomainResult<Vec<LoginRecord>> {
        self.store.search(tenant, &HistoryFilter::Hwid(hwid.to_string())).await
    }

    /// Every attempt of the tenant
    pub async fn by_tenant(&self, tenant: &Tenant) -> DomainResult<Vec<LoginRecord>> {
        self.store.search(tenant, &HistoryFilter::All).await
    }

    /// Drop attempts older than `retention_days`
    pub async fn purge_older_than(
        &self,
        tenant: &Tenant,
        retention_days: u32,
    ) -> DomainResult<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        let purged = self.store.purge_before(tenant, cutoff).await?;
        debug!(tenant_id = %tenant.id, purged, retention_days, "Purged login history");
        Ok(purged)
    }
}
