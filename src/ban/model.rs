// Copyright 2025 Cowboy AI, LLC.

//! Ban value object and builder

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use super::cidr::parse_cidr;
use crate::errors::{DomainError, DomainResult};

/// What a ban matches against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum BanType {
    /// Client address or CIDR range
    Ip,
    /// Hardware id
    Hwid,
    /// Account id in decimal
    Account,
}

impl BanType {
    /// Every type in check priority order
    pub const ALL: [BanType; 3] = [BanType::Ip, BanType::Hwid, BanType::Account];
}

impl From<BanType> for u8 {
    fn from(value: BanType) -> Self {
        match value {
            BanType::Ip => 0,
            BanType::Hwid => 1,
            BanType::Account => 2,
        }
    }
}

impl TryFrom<u8> for BanType {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BanType::Ip),
            1 => Ok(BanType::Hwid),
            2 => Ok(BanType::Account),
            other => Err(DomainError::validation(format!("unknown ban type {other}"))),
        }
    }
}

impl fmt::Display for BanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BanType::Ip => write!(f, "IP"),
            BanType::Hwid => write!(f, "HWID"),
            BanType::Account => write!(f, "ACCOUNT"),
        }
    }
}

/// An issued ban
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ban {
    id: u32,
    ban_type: BanType,
    value: String,
    reason: String,
    reason_code: u8,
    permanent: bool,
    expires_at: Option<DateTime<Utc>>,
    issued_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Ban {
    /// Primary key
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Match category
    pub fn ban_type(&self) -> BanType {
        self.ban_type
    }

    /// Address, range, hardware id or account id
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Free-text reason
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Client-facing reason code
    pub fn reason_code(&self) -> u8 {
        self.reason_code
    }

    /// Never expires
    pub fn permanent(&self) -> bool {
        self.permanent
    }

    /// Expiration of a temporary ban
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Issuing administrator
    pub fn issued_by(&self) -> &str {
        &self.issued_by
    }

    /// Creation time
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last update time
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Permanent, or expiring strictly after `now`
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.permanent || self.expires_at.is_some_and(|at| at > now)
    }

    /// Builder seeded with this ban's values
    pub fn to_builder(&self) -> BanBuilder {
        BanBuilder {
            id: Some(self.id),
            ban_type: Some(self.ban_type),
            value: self.value.clone(),
            reason: self.reason.clone(),
            reason_code: self.reason_code,
            permanent: self.permanent,
            expires_at: self.expires_at,
            issued_by: self.issued_by.clone(),
            created_at: Some(self.created_at),
            updated_at: Some(self.updated_at),
        }
    }
}

/// Validating builder for [`Ban`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BanBuilder {
    id: Option<u32>,
    ban_type: Option<BanType>,
    value: String,
    reason: String,
    reason_code: u8,
    permanent: bool,
    expires_at: Option<DateTime<Utc>>,
    issued_by: String,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl BanBuilder {
    /// Start a ban of `ban_type` against `value`
    pub fn new(ban_type: BanType, value: impl Into<String>) -> Self {
        Self {
            ban_type: Some(ban_type),
            value: value.into(),
            ..Self::default()
        }
    }

    /// Primary key
    pub fn id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    /// Free-text reason
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Client-facing reason code
    pub fn reason_code(mut self, code: u8) -> Self {
        self.reason_code = code;
        self
    }

    /// Never expires
    pub fn permanent(mut self, permanent: bool) -> Self {
        self.permanent = permanent;
        self
    }

    /// Expiration of a temporary ban
    pub fn expires_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = at;
        self
    }

    /// Issuing administrator
    pub fn issued_by(mut self, issuer: impl Into<String>) -> Self {
        self.issued_by = issuer.into();
        self
    }

    /// Creation time
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Last update time
    pub fn updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }

    /// Check every field without assigning an id
    pub fn validate(&self) -> DomainResult<BanType> {
        let ban_type = self
            .ban_type
            .ok_or_else(|| DomainError::validation("ban type is required"))?;
        let value = self.value.trim();
        if value.is_empty() {
            return Err(DomainError::validation("ban value is required"));
        }
        match ban_type {
            BanType::Ip => {
                if value.parse::<IpAddr>().is_err() && parse_cidr(value).is_none() {
                    return Err(DomainError::validation(format!(
                        "'{value}' is neither an address nor a CIDR range"
                    )));
                }
            }
            BanType::Account => {
                let id = value.parse::<u32>().map_err(|_| {
                    DomainError::validation(format!("'{value}' is not an account id"))
                })?;
                if id == 0 {
                    return Err(DomainError::validation("account id must be positive"));
                }
            }
            BanType::Hwid => {}
        }
        if !self.permanent && self.expires_at.is_none() {
            return Err(DomainError::validation(
                "a temporary ban needs an expiration",
            ));
        }
        Ok(ban_type)
    }

    /// Build the value object
    pub fn build(self) -> DomainResult<Ban> {
        let ban_type = self.validate()?;
        let id = self
            .id
            .ok_or_else(|| DomainError::validation("ban id is required"))?;
        let now = Utc::now();
        let created_at = self.created_at.unwrap_or(now);
        Ok(Ban {
            id,
            ban_type,
            value: self.value.trim().to_string(),
            reason: self.reason,
            reason_code: self.reason_code,
            permanent: self.permanent,
            expires_at: if self.permanent { None } else { self.expires_at },
            issued_by: self.issued_by,
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use test_case::test_case;

    #[test_case(BanType::Ip, "10.0.0.1" ; "ip address")]
    #[test_case(BanType::Ip, "10.0.0.0/8" ; "ip range")]
    #[test_case(BanType::Hwid, "ABC123" ; "hardware id")]
    #[test_case(BanType::Account, "42" ; "account")]
    fn test_valid_values(ban_type: BanType, value: &str) {
        let ban = BanBuilder::new(ban_type, value)
            .id(1)
            .permanent(true)
            .build()
            .unwrap();
        assert_eq!(ban.value(), value);
    }

    #[test_case(BanType::Ip, "not-an-ip" ; "garbage ip")]
    #[test_case(BanType::Ip, "10.0.0.0/33" ; "prefix too long")]
    #[test_case(BanType::Account, "abc" ; "non numeric account")]
    #[test_case(BanType::Account, "0" ; "zero account")]
    #[test_case(BanType::Hwid, "  " ; "blank hwid")]
    fn test_invalid_values(ban_type: BanType, value: &str) {
        let err = BanBuilder::new(ban_type, value)
            .id(1)
            .permanent(true)
            .build()
            .unwrap_err();
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_temporary_ban_needs_expiration() {
        let err = BanBuilder::new(BanType::Hwid, "H").id(1).build().unwrap_err();
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_activity() {
        let now = Utc::now();
        let expired = BanBuilder::new(BanType::Hwid, "H")
            .id(1)
            .expires_at(Some(now - Duration::hours(1)))
            .build()
            .unwrap();
        let live = expired
            .to_builder()
            .expires_at(Some(now + Duration::hours(1)))
            .build()
            .unwrap();
        assert!(!expired.is_active(now));
        assert!(live.is_active(now));
    }

    #[test]
    fn test_builder_round_trip() {
        let ban = BanBuilder::new(BanType::Account, "42")
            .id(7)
            .reason("botting")
            .reason_code(3)
            .permanent(true)
            .issued_by("gm")
            .build()
            .unwrap();
        assert_eq!(ban.to_builder().build().unwrap(), ban);
    }

    #[test]
    fn test_type_wire_values() {
        assert_eq!(serde_json::to_value(BanType::Hwid).unwrap(), serde_json::json!(1));
        let parsed: BanType = serde_json::from_value(serde_json::json!(2)).unwrap();
        assert_eq!(parsed, BanType::Account);
        assert!(serde_json::from_value::<BanType>(serde_json::json!(9)).is_err());
    }
}
