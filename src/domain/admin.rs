//! Administrative domain records: confirmation tokens and the audit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Single-use capability granting one admin one destructive action on one
/// resource. Only the SHA-256 hash of the raw token is ever persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationToken {
    pub id: Uuid,
    pub admin_id: String,
    pub token_hash: String,
    pub action: String,
    pub resource_id: String,
    pub used: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Insert shape for a confirmation token.
#[derive(Debug, Clone)]
pub struct NewConfirmationToken {
    pub admin_id: String,
    pub token_hash: String,
    pub action: String,
    pub resource_id: String,
    pub expires_at: DateTime<Utc>,
}

impl NewConfirmationToken {
    pub fn into_token(self) -> ConfirmationToken {
        ConfirmationToken {
            id: Uuid::new_v4(),
            admin_id: self.admin_id,
            token_hash: self.token_hash,
            action: self.action,
            resource_id: self.resource_id,
            used: false,
            expires_at: self.expires_at,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(AuditOutcome::Success),
            "failed" => Ok(AuditOutcome::Failed),
            other => Err(format!("unknown audit outcome '{}'", other)),
        }
    }
}

/// One administrative action attempt, success or failure. Appended for every
/// guarded operation and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub admin_id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub outcome: AuditOutcome,
    pub metadata: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Persisted audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogRecord {
    pub id: Uuid,
    pub admin_id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub outcome: AuditOutcome,
    pub metadata: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogRecord {
    pub fn from_entry(entry: AuditLogEntry) -> Self {
        Self {
            id: Uuid::new_v4(),
            admin_id: entry.admin_id,
            action: entry.action,
            resource_type: entry.resource_type,
            resource_id: entry.resource_id,
            outcome: entry.outcome,
            metadata: entry.metadata,
            error_message: entry.error_message,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            created_at: Utc::now(),
        }
    }
}

/// Audit query filter; `limit` is capped by the service.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub action: Option<String>,
    pub admin_id: Option<String>,
    pub limit: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_token_is_unused() {
        let token = NewConfirmationToken {
            admin_id: "admin-1".to_string(),
            token_hash: "abc123".to_string(),
            action: "force_resolve".to_string(),
            resource_id: "tx-1".to_string(),
            expires_at: Utc::now() + Duration::minutes(15),
        }
        .into_token();

        assert!(!token.used);
        assert_eq!(token.action, "force_resolve");
        assert!(token.expires_at > token.created_at);
    }

    #[test]
    fn test_audit_outcome_round_trip() {
        assert_eq!(
            "success".parse::<AuditOutcome>().unwrap(),
            AuditOutcome::Success
        );
        assert_eq!(
            "failed".parse::<AuditOutcome>().unwrap(),
            AuditOutcome::Failed
        );
        assert!("partial".parse::<AuditOutcome>().is_err());
    }
}
