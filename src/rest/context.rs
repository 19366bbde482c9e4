// Copyright 2025 Cowboy AI, LLC.

//! Tenant extraction from request headers

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::time::Duration;

use super::jsonapi::ApiError;
use crate::tenant::{Context, Tenant};

/// Deadline applied to every request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-request [`Context`] built from the tenant headers
///
/// A missing or malformed header rejects the request with 400.
#[derive(Debug, Clone)]
pub struct TenantContext(pub Context);

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let tenant = Tenant::from_headers(|name| headers.get(name).and_then(|v| v.to_str().ok()))?;
        Ok(Self(Context::with_timeout(tenant, REQUEST_TIMEOUT)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::{
        MAJOR_VERSION_HEADER, MINOR_VERSION_HEADER, REGION_HEADER, TENANT_ID_HEADER,
    };
    use axum::http::{Request, StatusCode};
    use axum::response::IntoResponse;
    use uuid::Uuid;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/bans");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_extracts_tenant() {
        let id = Uuid::new_v4().to_string();
        let mut parts = parts(&[
            (TENANT_ID_HEADER, &id),
            (REGION_HEADER, "GMS"),
            (MAJOR_VERSION_HEADER, "83"),
            (MINOR_VERSION_HEADER, "1"),
        ]);
        let TenantContext(ctx) = TenantContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.tenant().id.to_string(), id);
        assert_eq!(ctx.tenant().major_version, 83);
        assert!(ctx.deadline().is_some());
    }

    #[tokio::test]
    async fn test_missing_header_is_bad_request() {
        let id = Uuid::new_v4().to_string();
        let mut parts = parts(&[(TENANT_ID_HEADER, &id), (REGION_HEADER, "GMS")]);
        let err = TenantContext::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
