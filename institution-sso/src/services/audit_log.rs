use async_trait::async_trait;
use mongodb::{Collection, Database};

use crate::models::{AuditAction, AuditEntry};
use super::database::AUDIT_LOG_COLLECTION;
use super::error::AuditLogError;

/// Append-only per-user audit log. A write must succeed before the
/// mutation it describes is performed.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn add_entry(
        &self,
        user_id: &str,
        action: AuditAction,
        initiator_id: Option<&str>,
        ip_address: Option<&str>,
        info: serde_json::Value,
    ) -> Result<(), AuditLogError>;
}

/// Check the who/where of an entry before anything is written.
pub fn validate_entry(
    action: AuditAction,
    initiator_id: Option<&str>,
    ip_address: Option<&str>,
) -> Result<(), AuditLogError> {
    if ip_address.is_none_or(|ip| ip.trim().is_empty()) {
        return Err(AuditLogError::InvalidEntry(format!(
            "missing ipAddress for {}",
            action
        )));
    }

    if initiator_id.is_none_or(|id| id.trim().is_empty()) && !action.allows_system_initiator() {
        return Err(AuditLogError::InvalidEntry(format!(
            "missing initiatorId for {}",
            action
        )));
    }

    Ok(())
}

#[derive(Clone)]
pub struct MongoAuditLog {
    entries: Collection<AuditEntry>,
}

impl MongoAuditLog {
    pub fn new(db: &Database) -> Self {
        Self {
            entries: db.collection(AUDIT_LOG_COLLECTION),
        }
    }
}

#[async_trait]
impl AuditLog for MongoAuditLog {
    async fn add_entry(
        &self,
        user_id: &str,
        action: AuditAction,
        initiator_id: Option<&str>,
        ip_address: Option<&str>,
        info: serde_json::Value,
    ) -> Result<(), AuditLogError> {
        validate_entry(action, initiator_id, ip_address)?;

        let entry = AuditEntry::new(
            user_id,
            action,
            initiator_id.map(str::to_string),
            ip_address.map(str::to_string),
            info,
        );

        self.entries.insert_one(&entry, None).await.map_err(|e| {
            tracing::error!(user_id = %user_id, operation = %action, "Failed to write audit log entry: {}", e);
            AuditLogError::Database(e)
        })?;

        tracing::info!(
            user_id = %user_id,
            operation = %action,
            entry_id = %entry.id,
            "Audit log entry written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_ip_address_is_rejected() {
        let err = validate_entry(AuditAction::LinkInstitutionSso, Some("u1"), None).unwrap_err();
        assert!(matches!(err, AuditLogError::InvalidEntry(_)));
        assert!(err.to_string().contains("ipAddress"));
    }

    #[test]
    fn test_missing_initiator_is_rejected_for_user_actions() {
        let err = validate_entry(AuditAction::UnlinkInstitutionSso, None, Some("0:0:0:0"))
            .unwrap_err();
        assert!(err.to_string().contains("initiatorId"));
    }

    #[test]
    fn test_system_initiator_allowed_for_not_migrated_unlink() {
        assert!(
            validate_entry(AuditAction::UnlinkInstitutionSsoNotMigrated, None, Some("N/A"))
                .is_ok()
        );
    }

    #[test]
    fn test_complete_entry_is_accepted() {
        assert!(validate_entry(AuditAction::LinkInstitutionSso, Some("u1"), Some("0:0:0:0")).is_ok());
    }
}
