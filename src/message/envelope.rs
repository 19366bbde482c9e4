// Copyright 2025 Cowboy AI, LLC.

//! Wire envelope and partition keys

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};
use crate::tenant::Tenant;

/// Partition key for a numeric domain id
///
/// The same id always yields the same key, so retries land on the same
/// partition and per-entity ordering holds.
pub fn create_key(id: u64) -> String {
    id.to_string()
}

/// Partition key for a uuid domain id (saga transaction ids)
pub fn uuid_key(id: &Uuid) -> String {
    id.hyphenated().to_string()
}

/// Typed command or event record carried on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<B> {
    /// Correlates every record produced by one logical operation
    pub transaction_id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Partition key
    pub key: String,
    /// Event or command discriminator
    #[serde(rename = "type")]
    pub kind: String,
    /// Discriminator-dependent body
    pub body: B,
}

impl<B> Envelope<B> {
    /// Build an envelope for `tenant`
    pub fn new(
        transaction_id: Uuid,
        tenant: &Tenant,
        key: impl Into<String>,
        kind: impl Into<String>,
        body: B,
    ) -> Self {
        Self {
            transaction_id,
            tenant_id: tenant.id,
            key: key.into(),
            kind: kind.into(),
            body,
        }
    }
}

impl<B: Serialize> Envelope<B> {
    /// Serialize into a bus message with tenant headers attached
    pub fn to_message(&self, tenant: &Tenant) -> DomainResult<Message> {
        if tenant.id != self.tenant_id {
            return Err(DomainError::InvariantViolation(format!(
                "envelope for tenant {} staged under tenant {}",
                self.tenant_id, tenant.id
            )));
        }
        let payload = serde_json::to_vec(self)?;
        Ok(Message {
            key: self.key.clone(),
            headers: tenant
                .headers()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            payload: Bytes::from(payload),
        })
    }
}

impl Envelope<serde_json::Value> {
    /// Decode the untyped body into `T`
    pub fn decode_body<T: DeserializeOwned>(&self) -> DomainResult<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

/// A realized record ready for a publisher
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Partition key
    pub key: String,
    /// Transport headers
    pub headers: Vec<(String, String)>,
    /// Serialized [`Envelope`]
    pub payload: Bytes,
}

impl Message {
    /// Header value by name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Decode the payload as an envelope
    pub fn decode<B: DeserializeOwned>(&self) -> DomainResult<Envelope<B>> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Tenant described by the headers
    pub fn tenant(&self) -> DomainResult<Tenant> {
        Tenant::from_headers(|name| self.header(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::test_support;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_shape() {
        let tenant = test_support::tenant();
        let tx = Uuid::new_v4();
        let env = Envelope::new(
            tx,
            &tenant,
            create_key(12345),
            "CHARACTER_ENTER",
            json!({"characterId": 12345}),
        );

        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["transactionId"], json!(tx.to_string()));
        assert_eq!(value["tenantId"], json!(tenant.id.to_string()));
        assert_eq!(value["key"], json!("12345"));
        assert_eq!(value["type"], json!("CHARACTER_ENTER"));
        assert_eq!(value["body"]["characterId"], json!(12345));
    }

    #[test]
    fn test_message_carries_tenant_headers() {
        let tenant = test_support::tenant();
        let env = Envelope::new(Uuid::new_v4(), &tenant, "1", "X", json!({}));
        let message = env.to_message(&tenant).unwrap();

        assert_eq!(message.key, "1");
        assert_eq!(message.tenant().unwrap(), tenant);
        let decoded: Envelope<serde_json::Value> = message.decode().unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn test_cross_tenant_staging_is_rejected() {
        let owner = test_support::tenant();
        let other = test_support::tenant();
        let env = Envelope::new(Uuid::new_v4(), &owner, "1", "X", json!({}));
        let err = env.to_message(&other).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    proptest! {
        #[test]
        fn key_is_deterministic(id in any::<u64>()) {
            prop_assert_eq!(create_key(id), create_key(id));
            prop_assert_eq!(create_key(id).parse::<u64>().unwrap(), id);
        }
    }
}
