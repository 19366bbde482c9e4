// Copyright 2025 Cowboy AI, LLC.

//! Tenant identity and the per-call context
//!
//! A [`Tenant`] is the isolation boundary: every row, registry entry and
//! event key is scoped by its id. A [`Context`] carries the tenant plus an
//! optional deadline through every operation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};

/// Header carrying the tenant id
pub const TENANT_ID_HEADER: &str = "TENANT_ID";
/// Header carrying the tenant region
pub const REGION_HEADER: &str = "REGION";
/// Header carrying the client major version
pub const MAJOR_VERSION_HEADER: &str = "MAJOR_VERSION";
/// Header carrying the client minor version
pub const MINOR_VERSION_HEADER: &str = "MINOR_VERSION";

/// An isolation boundary provisioned outside this crate
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    /// Tenant id
    pub id: Uuid,
    /// Service region, e.g. "GMS"
    pub region: String,
    /// Client major version
    pub major_version: u16,
    /// Client minor version
    pub minor_version: u16,
}

impl Tenant {
    /// Create a tenant, rejecting a nil id or empty region
    pub fn new(
        id: Uuid,
        region: impl Into<String>,
        major_version: u16,
        minor_version: u16,
    ) -> DomainResult<Self> {
        let region = region.into();
        if id.is_nil() {
            return Err(DomainError::validation("tenant id must not be nil"));
        }
        if region.trim().is_empty() {
            return Err(DomainError::validation("tenant region is required"));
        }
        Ok(Self {
            id,
            region,
            major_version,
            minor_version,
        })
    }

    /// Parse a tenant from header lookups
    ///
    /// `lookup` returns the raw value of a header name, if present.
    pub fn from_headers<'a, F>(lookup: F) -> DomainResult<Self>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let required = |name: &str| -> DomainResult<&'a str> {
            lookup(name)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| DomainError::validation(format!("missing header {name}")))
        };

        let id = Uuid::parse_str(required(TENANT_ID_HEADER)?)
            .map_err(|e| DomainError::validation(format!("invalid {TENANT_ID_HEADER}: {e}")))?;
        let region = required(REGION_HEADER)?;
        let major = required(MAJOR_VERSION_HEADER)?
            .parse::<u16>()
            .map_err(|e| DomainError::validation(format!("invalid {MAJOR_VERSION_HEADER}: {e}")))?;
        let minor = required(MINOR_VERSION_HEADER)?
            .parse::<u16>()
            .map_err(|e| DomainError::validation(format!("invalid {MINOR_VERSION_HEADER}: {e}")))?;

        Tenant::new(id, region, major, minor)
    }

    /// Header name/value pairs describing this tenant
    pub fn headers(&self) -> [(&'static str, String); 4] {
        [
            (TENANT_ID_HEADER, self.id.to_string()),
            (REGION_HEADER, self.region.clone()),
            (MAJOR_VERSION_HEADER, self.major_version.to_string()),
            (MINOR_VERSION_HEADER, self.minor_version.to_string()),
        ]
    }
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} v{}.{})",
            self.id, self.region, self.major_version, self.minor_version
        )
    }
}

/// Ambient value threaded through every operation
#[derive(Debug, Clone)]
pub struct Context {
    tenant: Tenant,
    deadline: Option<Instant>,
}

impl Context {
    /// A context without deadline
    pub fn new(tenant: Tenant) -> Self {
        Self {
            tenant,
            deadline: None,
        }
    }

    /// A context that expires after `timeout`
    pub fn with_timeout(tenant: Tenant, timeout: Duration) -> Self {
        Self {
            tenant,
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Same tenant, different deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The tenant this call runs for
    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    /// The deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails with [`DomainError::Cancelled`] once the deadline has passed
    pub fn check(&self) -> DomainResult<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(DomainError::Cancelled(format!(
                "deadline elapsed for tenant {}",
                self.tenant.id
            ))),
            _ => Ok(()),
        }
    }

    /// Run `fut` bounded by the remaining deadline
    pub async fn run<T, F>(&self, fut: F) -> DomainResult<T>
    where
        F: std::future::Future<Output = DomainResult<T>>,
    {
        self.check()?;
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| DomainError::Cancelled("deadline elapsed".to_string()))?,
            None => fut.await,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A fresh tenant with a random id
    pub fn tenant() -> Tenant {
        Tenant {
            id: Uuid::new_v4(),
            region: "GMS".to_string(),
            major_version: 83,
            minor_version: 1,
        }
    }

    /// A context for a fresh tenant
    pub fn context() -> Context {
        Context::new(tenant())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn header_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_headers() {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let headers = header_map(&[
            (TENANT_ID_HEADER, &id_str),
            (REGION_HEADER, "GMS"),
            (MAJOR_VERSION_HEADER, "83"),
            (MINOR_VERSION_HEADER, "1"),
        ]);

        let tenant = Tenant::from_headers(|k| headers.get(k).map(String::as_str)).unwrap();
        assert_eq!(tenant.id, id);
        assert_eq!(tenant.region, "GMS");
        assert_eq!(tenant.major_version, 83);
        assert_eq!(tenant.minor_version, 1);
    }

    #[test]
    fn test_from_headers_missing_region() {
        let id_str = Uuid::new_v4().to_string();
        let headers = header_map(&[
            (TENANT_ID_HEADER, &id_str),
            (MAJOR_VERSION_HEADER, "83"),
            (MINOR_VERSION_HEADER, "1"),
        ]);

        let err = Tenant::from_headers(|k| headers.get(k).map(String::as_str)).unwrap_err();
        assert!(err.is_validation_error());
        assert!(err.to_string().contains(REGION_HEADER));
    }

    #[test]
    fn test_from_headers_bad_version() {
        let id_str = Uuid::new_v4().to_string();
        let headers = header_map(&[
            (TENANT_ID_HEADER, &id_str),
            (REGION_HEADER, "GMS"),
            (MAJOR_VERSION_HEADER, "eighty"),
            (MINOR_VERSION_HEADER, "1"),
        ]);

        assert!(Tenant::from_headers(|k| headers.get(k).map(String::as_str)).is_err());
    }

    #[test]
    fn test_nil_tenant_rejected() {
        assert!(Tenant::new(Uuid::nil(), "GMS", 83, 1).is_err());
    }

    #[tokio::test]
    async fn test_context_deadline() {
        let ctx = Context::with_timeout(test_support::tenant(), Duration::from_millis(0));
        tokio::time::sleep(Duration::from_millis(1)).await;
        let err = ctx.check().unwrap_err();
        assert!(matches!(err, DomainError::Cancelled(_)));

        let ctx = Context::new(test_support::tenant());
        assert!(ctx.check().is_ok());
    }

    #[tokio::test]
    async fn test_context_run_times_out() {
        let ctx = Context::with_timeout(test_support::tenant(), Duration::from_millis(10));
        let result: DomainResult<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(DomainError::Cancelled(_))));
    }
}
