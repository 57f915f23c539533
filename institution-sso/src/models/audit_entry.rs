//! User audit log entries written ahead of every SSO mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit actions recorded by SSO linking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditAction {
    LinkInstitutionSso,
    UnlinkInstitutionSso,
    UnlinkInstitutionSsoNotMigrated,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::LinkInstitutionSso => "link-institution-sso",
            AuditAction::UnlinkInstitutionSso => "unlink-institution-sso",
            AuditAction::UnlinkInstitutionSsoNotMigrated => "unlink-institution-sso-not-migrated",
        }
    }

    /// Actions that automated jobs perform without a human initiator.
    pub fn allows_system_initiator(&self) -> bool {
        matches!(self, AuditAction::UnlinkInstitutionSsoNotMigrated)
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who triggered a mutation and from where.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogInfo {
    pub initiator_id: Option<String>,
    pub ip_address: Option<String>,
}

impl AuditLogInfo {
    pub fn new(initiator_id: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            initiator_id: Some(initiator_id.into()),
            ip_address: Some(ip_address.into()),
        }
    }

    /// Info for a scheduled job: no initiator, only a placeholder address.
    pub fn system(ip_address: impl Into<String>) -> Self {
        Self {
            initiator_id: None,
            ip_address: Some(ip_address.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub operation: AuditAction,
    pub initiator_id: Option<String>,
    pub ip_address: Option<String>,
    pub info: serde_json::Value,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        user_id: impl Into<String>,
        operation: AuditAction,
        initiator_id: Option<String>,
        ip_address: Option<String>,
        info: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            operation,
            initiator_id,
            ip_address,
            info,
            timestamp: Utc::now(),
        }
    }
}
