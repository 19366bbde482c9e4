// Copyright 2025 Cowboy AI, LLC.

//! Postgres connection and schema
//!
//! Every table carries `tenant_id` and every statement issued by the
//! stores filters on it. Tree-shaped data (saga steps, conversation
//! graphs) is stored as JSONB.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

use crate::errors::DomainResult;

/// Tables created by [`ensure_schema`]
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS bans (
        tenant_id UUID NOT NULL,
        id SERIAL PRIMARY KEY,
        ban_type SMALLINT NOT NULL,
        value TEXT NOT NULL,
        reason TEXT NOT NULL DEFAULT '',
        reason_code SMALLINT NOT NULL DEFAULT 0,
        permanent BOOLEAN NOT NULL DEFAULT FALSE,
        expires_at TIMESTAMPTZ,
        issued_by TEXT NOT NULL DEFAULT '',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        deleted_at TIMESTAMPTZ
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_bans_lookup ON bans (tenant_id, ban_type, value) \
     WHERE deleted_at IS NULL",
    r#"
    CREATE TABLE IF NOT EXISTS login_history (
        tenant_id UUID NOT NULL,
        id SERIAL PRIMARY KEY,
        account_id INTEGER NOT NULL,
        account_name TEXT NOT NULL,
        ip_address TEXT NOT NULL DEFAULT '',
        hwid TEXT NOT NULL DEFAULT '',
        success BOOLEAN NOT NULL,
        failure_reason TEXT NOT NULL DEFAULT '',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_login_history_account ON login_history (tenant_id, account_id)",
    r#"
    CREATE TABLE IF NOT EXISTS sagas (
        tenant_id UUID NOT NULL,
        transaction_id UUID PRIMARY KEY,
        saga_type TEXT NOT NULL,
        initiated_by TEXT NOT NULL,
        status TEXT NOT NULL,
        steps JSONB NOT NULL,
        version BIGINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS map_visits (
        tenant_id UUID NOT NULL,
        character_id INTEGER NOT NULL,
        map_id INTEGER NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (tenant_id, character_id, map_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS conversations (
        tenant_id UUID NOT NULL,
        id SERIAL PRIMARY KEY,
        npc_id INTEGER NOT NULL,
        data JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        deleted_at TIMESTAMPTZ
    )
    "#,
];

/// Open a connection pool
pub async fn connect(url: &str, max_connections: u32) -> DomainResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?;
    info!(max_connections, "Connected to Postgres");
    Ok(pool)
}

/// Create missing tables and indexes
pub async fn ensure_schema(pool: &PgPool) -> DomainResult<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_table_is_tenant_scoped() {
        for statement in SCHEMA.iter().filter(|s| s.contains("CREATE TABLE")) {
            assert!(statement.contains("tenant_id UUID NOT NULL"), "{statement}");
        }
    }
}
