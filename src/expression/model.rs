// Copyright 2025 Cowboy AI, LLC.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::{DomainError, DomainResult};
use crate::field::{CharacterId, Field};
use crate::registry::Expiring;
use crate::tenant::Tenant;

/// A facial expression a character is currently showing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expression {
    #[serde(skip)]
    tenant: Tenant,
    character_id: CharacterId,
    #[serde(flatten)]
    field: Field,
    expression: u32,
    expiration: DateTime<Utc>,
}

impl Expression {
    /// Owning tenant
    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    /// Character showing the expression
    pub fn character_id(&self) -> CharacterId {
        self.character_id
    }

    /// Where the character is
    pub fn field(&self) -> Field {
        self.field
    }

    /// Expression id
    pub fn expression(&self) -> u32 {
        self.expression
    }

    /// When the expression reverts
    pub fn expiration(&self) -> DateTime<Utc> {
        self.expiration
    }
}

impl Expiring for Expression {
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        Some(self.expiration)
    }
}

/// Builder for [`Expression`]
#[derive(Debug, Clone)]
pub struct ExpressionBuilder {
    tenant: Tenant,
    character_id: CharacterId,
    field: Field,
    expression: u32,
    expiration: Option<DateTime<Utc>>,
}

impl ExpressionBuilder {
    /// Start an expression for `tenant`
    pub fn new(tenant: Tenant) -> Self {
        Self {
            tenant,
            character_id: 0,
            field: Field::new(0, 0, 0),
            expression: 0,
            expiration: None,
        }
    }

    /// Character id
    pub fn character_id(mut self, id: CharacterId) -> Self {
        self.character_id = id;
        self
    }

    /// World, channel, map and instance in one go
    pub fn location(mut self, field: Field) -> Self {
        self.field = field;
        self
    }

    /// Expression id
    pub fn expression(mut self, expression: u32) -> Self {
        self.expression = expression;
        self
    }

    /// Reversion time
    pub fn expiration(mut self, at: DateTime<Utc>) -> Self {
        self.expiration = Some(at);
        self
    }

    /// Validate and build
    pub fn build(self) -> DomainResult<Expression> {
        if self.character_id == 0 {
            return Err(DomainError::validation("character id is required"));
        }
        let expiration = self
            .expiration
            .ok_or_else(|| DomainError::validation("expiration is required"))?;
        Ok(Expression {
            tenant: self.tenant,
            character_id: self.character_id,
            field: self.field,
            expression: self.expression,
            expiration,
        })
    }
}
