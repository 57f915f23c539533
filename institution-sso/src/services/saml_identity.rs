//! Linking, unlinking and migration of institutional SSO identities.
//!
//! Every mutation is preceded by exactly one audit log write; if that write
//! fails nothing else happens. Security alerts go out after the store update
//! and are best effort unless the manager is built with strict notifications.

use mongodb::bson::{Document, doc};
use mongodb::options::ReturnDocument;
use serde_json::json;
use std::sync::Arc;

use crate::models::{
    AuditAction, AuditLogInfo, LinkData, LinkFields, ProviderId, User, user_id_bson,
};
use super::audit_log::AuditLog;
use super::database::UserStore;
use super::directory::AffiliationDirectory;
use super::error::{SsoError, StoreError};
use super::full_emails::FullEmailAssembler;
use super::notification::{NotificationChannel, SecurityAlert};
use super::user_getter::UserGetter;

/// Placeholder address recorded for automated, request-less operations.
pub const SYSTEM_IP_ADDRESS: &str = "N/A";

/// Replace the external id of an existing identity in place.
#[derive(Debug, Clone)]
pub struct IdentifierMigration {
    pub user_id: String,
    pub external_user_id: String,
    pub provider_id: ProviderId,
    pub has_entitlement: bool,
    pub institution_email: String,
    pub provider_name: Option<String>,
    pub user_id_attribute: String,
}

pub struct SamlIdentityManager {
    users: UserGetter,
    full_emails: FullEmailAssembler,
    audit_log: Arc<dyn AuditLog>,
    directory: Arc<dyn AffiliationDirectory>,
    notifications: Arc<dyn NotificationChannel>,
    strict_notifications: bool,
}

impl SamlIdentityManager {
    pub fn new(
        users: UserGetter,
        full_emails: FullEmailAssembler,
        audit_log: Arc<dyn AuditLog>,
        directory: Arc<dyn AffiliationDirectory>,
        notifications: Arc<dyn NotificationChannel>,
    ) -> Self {
        Self {
            users,
            full_emails,
            audit_log,
            directory,
            notifications,
            strict_notifications: false,
        }
    }

    /// Surface security alert failures as errors instead of logging them.
    pub fn with_strict_notifications(mut self, strict: bool) -> Self {
        self.strict_notifications = strict;
        self
    }

    fn store(&self) -> &Arc<dyn UserStore> {
        self.users.store()
    }

    /// The account bound to `(provider_id, external_user_id)`, if any.
    pub async fn get_user(
        &self,
        provider_id: Option<&ProviderId>,
        external_user_id: Option<&str>,
        user_id_attribute: Option<&str>,
    ) -> Result<Option<User>, SsoError> {
        let provider = provider_id.filter(|id| !id.is_empty());
        let external = external_user_id.filter(|id| !id.trim().is_empty());
        let attribute = user_id_attribute.filter(|attr| !attr.trim().is_empty());

        let (Some(provider), Some(external), Some(_)) = (provider, external, attribute) else {
            return Err(SsoError::invalid_arguments(
                provider_id.map(ProviderId::as_str),
                external_user_id,
                user_id_attribute,
            ));
        };

        Ok(self
            .store()
            .find_one(
                doc! {
                    "samlIdentifiers": {
                        "$elemMatch": {
                            "providerId": provider.as_str(),
                            "externalUserId": external,
                        }
                    }
                },
                None,
            )
            .await?)
    }

    #[tracing::instrument(skip(self, link_data, audit), fields(provider_id = ?link_data.provider_id))]
    pub async fn link_accounts(
        &self,
        user_id: &str,
        link_data: &LinkData,
        audit: &AuditLogInfo,
    ) -> Result<(), SsoError> {
        let result = self.link(user_id, link_data, audit).await;
        record_outcome("institution_sso_link_total", &result);
        result
    }

    async fn link(
        &self,
        user_id: &str,
        link_data: &LinkData,
        audit: &AuditLogInfo,
    ) -> Result<(), SsoError> {
        let Some(fields) = link_data.required_fields() else {
            return Err(SsoError::MissingLinkData(
                link_data.missing_fields().join(", "),
            ));
        };

        if self
            .get_user(
                Some(fields.provider_id),
                Some(fields.external_user_id),
                Some(fields.user_id_attribute),
            )
            .await?
            .is_some()
        {
            return Err(SsoError::SamlAlreadyLinked);
        }

        self.ensure_can_add_identifier(user_id, fields.institution_email)
            .await?;
        self.ensure_email_affiliated(user_id, &fields).await?;
        self.ensure_no_conflicting_identity(user_id, &fields).await?;

        self.audit_log
            .add_entry(
                user_id,
                AuditAction::LinkInstitutionSso,
                audit.initiator_id.as_deref(),
                audit.ip_address.as_deref(),
                json!({
                    "institutionEmail": fields.institution_email,
                    "providerId": fields.provider_id,
                    "providerName": fields.provider_name,
                    "userIdAttribute": fields.user_id_attribute,
                    "externalUserId": fields.external_user_id,
                }),
            )
            .await?;

        let user = self.add_identifier(user_id, &fields).await?;

        if fields.has_entitlement {
            self.directory
                .add_entitlement(user_id, fields.institution_email)
                .await?;
        }

        tracing::info!(
            user_id = %user_id,
            provider_id = %fields.provider_id,
            "Institution SSO identity linked"
        );

        let institution = institution_label(fields.provider_name);
        self.notify(SecurityAlert {
            to: user.email.clone(),
            action: "institutional SSO account linked".to_string(),
            action_described: format!(
                "an institutional SSO account at {} was linked to your account {}",
                institution, user.email
            ),
            message: vec![format!(
                "Linked: {} ({}) to {}",
                institution, fields.institution_email, user.email
            )],
        })
        .await
    }

    /// Reject an email owned by another account, distinguishing emails that
    /// are already SSO-linked over there.
    async fn ensure_can_add_identifier(
        &self,
        user_id: &str,
        institution_email: &str,
    ) -> Result<(), SsoError> {
        let Some(owner) = self.users.get_user_by_any_email(institution_email).await? else {
            return Ok(());
        };
        if owner.is_same_user(user_id) {
            return Ok(());
        }

        let linked_elsewhere = owner
            .find_email(institution_email)
            .is_some_and(|email| email.saml_provider_id.is_some());
        if linked_elsewhere {
            Err(SsoError::SamlIdentityExists)
        } else {
            Err(SsoError::EmailExists)
        }
    }

    async fn ensure_email_affiliated(
        &self,
        user_id: &str,
        fields: &LinkFields<'_>,
    ) -> Result<(), SsoError> {
        let full_emails = self.full_emails.get_user_full_emails(user_id).await?;
        let affiliated = full_emails
            .iter()
            .find(|email| email.email == fields.institution_email && email.affiliation.is_some());

        match affiliated.and_then(|email| email.institution_id()) {
            None => Err(SsoError::SamlEmailNotAffiliated),
            Some(institution_id) if institution_id != fields.provider_id => {
                Err(SsoError::SamlEmailAffiliatedWithAnotherInstitution)
            }
            Some(_) => Ok(()),
        }
    }

    async fn ensure_no_conflicting_identity(
        &self,
        user_id: &str,
        fields: &LinkFields<'_>,
    ) -> Result<(), SsoError> {
        let user = self
            .users
            .get_user_by_id(user_id, Some(doc! { "samlIdentifiers": 1 }))
            .await?
            .ok_or_else(|| SsoError::NotFound(format!("user {}", user_id)))?;

        match user.identifier_for(fields.provider_id) {
            Some(existing) if existing.external_user_id != fields.external_user_id => {
                Err(SsoError::SamlIdentityExists)
            }
            _ => Ok(()),
        }
    }

    async fn add_identifier(&self, user_id: &str, fields: &LinkFields<'_>) -> Result<User, SsoError> {
        let filter = doc! {
            "_id": user_id_bson(user_id),
            "emails.email": fields.institution_email,
            "samlIdentifiers.providerId": { "$ne": fields.provider_id.as_str() },
        };
        let update = doc! {
            "$push": {
                "samlIdentifiers": {
                    "providerId": fields.provider_id.as_str(),
                    "externalUserId": fields.external_user_id,
                    "userIdAttribute": fields.user_id_attribute,
                    "hasEntitlement": fields.has_entitlement,
                }
            },
            "$set": {
                "emails.$.samlProviderId": fields.provider_id.as_str(),
            },
        };

        match self
            .store()
            .find_one_and_update(filter, update, ReturnDocument::After)
            .await
        {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(SsoError::NotFound(format!(
                "user {} with email {} and no identity for provider {}",
                user_id, fields.institution_email, fields.provider_id
            ))),
            Err(StoreError::DuplicateKey(message)) => {
                tracing::warn!(user_id = %user_id, "SSO identity claimed concurrently: {}", message);
                Err(SsoError::SamlIdentityExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip(self, primary_email, audit))]
    pub async fn unlink_accounts(
        &self,
        user_id: &str,
        institution_email: &str,
        primary_email: &str,
        provider_id: &ProviderId,
        provider_name: Option<&str>,
        audit: &AuditLogInfo,
    ) -> Result<(), SsoError> {
        let result = self
            .unlink(
                user_id,
                institution_email,
                primary_email,
                provider_id,
                provider_name,
                audit,
            )
            .await;
        record_outcome("institution_sso_unlink_total", &result);
        result
    }

    async fn unlink(
        &self,
        user_id: &str,
        institution_email: &str,
        primary_email: &str,
        provider_id: &ProviderId,
        provider_name: Option<&str>,
        audit: &AuditLogInfo,
    ) -> Result<(), SsoError> {
        self.audit_log
            .add_entry(
                user_id,
                AuditAction::UnlinkInstitutionSso,
                audit.initiator_id.as_deref(),
                audit.ip_address.as_deref(),
                json!({
                    "institutionEmail": institution_email,
                    "providerId": provider_id,
                    "providerName": provider_name,
                }),
            )
            .await?;

        let outcome = self
            .store()
            .update_one(
                doc! { "_id": user_id_bson(user_id) },
                unlink_update(provider_id),
                Some(unlink_array_filters(provider_id)),
            )
            .await?;

        tracing::info!(
            user_id = %user_id,
            provider_id = %provider_id,
            modified = outcome.modified_count,
            "Institution SSO identity unlinked"
        );

        let institution = institution_label(provider_name);
        self.notify(SecurityAlert {
            to: primary_email.to_string(),
            action: "institutional SSO account no longer linked".to_string(),
            action_described: format!(
                "an institutional SSO account at {} was unlinked from your account {}",
                institution, primary_email
            ),
            message: vec![format!(
                "No longer linked: {} ({})",
                institution, institution_email
            )],
        })
        .await
    }

    /// Point an existing identity at a new external id. The caller has already
    /// validated the migration; no audit entry or entitlement change is made.
    #[tracing::instrument(skip(self, migration, _audit), fields(user_id = %migration.user_id, provider_id = %migration.provider_id))]
    pub async fn migrate_identifier(
        &self,
        migration: &IdentifierMigration,
        _audit: &AuditLogInfo,
    ) -> Result<(), SsoError> {
        let outcome = self
            .store()
            .update_one(
                doc! {
                    "_id": user_id_bson(&migration.user_id),
                    "samlIdentifiers.providerId": migration.provider_id.as_str(),
                },
                doc! {
                    "$set": {
                        "samlIdentifiers.$.externalUserId": migration.external_user_id.as_str(),
                        "samlIdentifiers.$.userIdAttribute": migration.user_id_attribute.as_str(),
                    }
                },
                None,
            )
            .await?;

        if outcome.matched_count == 0 {
            metrics::counter!("institution_sso_migrate_total", "outcome" => "not_found").increment(1);
            return Err(SsoError::NotFound(format!(
                "user {} with identity for provider {}",
                migration.user_id, migration.provider_id
            )));
        }

        metrics::counter!("institution_sso_migrate_total", "outcome" => "success").increment(1);
        tracing::info!(
            user_id = %migration.user_id,
            provider_id = %migration.provider_id,
            institution_email = %migration.institution_email,
            has_entitlement = migration.has_entitlement,
            "Institution SSO identifier migrated"
        );
        Ok(())
    }

    /// Remove a legacy linkage that was never migrated to the current
    /// identifier scheme. The store update comes first so the linked email
    /// can be read from the pre-update document.
    #[tracing::instrument(skip(self, audit))]
    pub async fn unlink_not_migrated(
        &self,
        user_id: &str,
        provider_id: &ProviderId,
        provider_name: Option<&str>,
        audit: &AuditLogInfo,
    ) -> Result<(), SsoError> {
        let result = self
            .remove_unmigrated(user_id, provider_id, provider_name, audit)
            .await;
        record_outcome("institution_sso_unlink_not_migrated_total", &result);
        result
    }

    async fn remove_unmigrated(
        &self,
        user_id: &str,
        provider_id: &ProviderId,
        provider_name: Option<&str>,
        audit: &AuditLogInfo,
    ) -> Result<(), SsoError> {
        let before = self
            .store()
            .find_one_and_update(
                doc! {
                    "_id": user_id_bson(user_id),
                    "emails.samlProviderId": provider_id.as_str(),
                },
                doc! {
                    "$pull": { "samlIdentifiers": { "providerId": provider_id.as_str() } },
                    "$unset": { "emails.$.samlProviderId": 1 },
                },
                ReturnDocument::Before,
            )
            .await?
            .ok_or_else(|| {
                SsoError::NotFound(format!(
                    "user {} with email linked to provider {}",
                    user_id, provider_id
                ))
            })?;

        let linked_email = before
            .email_linked_to(provider_id)
            .map(|email| email.email.clone());

        self.audit_log
            .add_entry(
                user_id,
                AuditAction::UnlinkInstitutionSsoNotMigrated,
                audit.initiator_id.as_deref(),
                audit.ip_address.as_deref(),
                json!({
                    "providerId": provider_id,
                    "providerName": provider_name,
                }),
            )
            .await?;

        if let Some(email) = linked_email {
            self.directory.remove_entitlement(user_id, &email).await?;
        }

        tracing::info!(
            user_id = %user_id,
            provider_id = %provider_id,
            "Unmigrated institution SSO linkage removed"
        );
        Ok(())
    }

    async fn notify(&self, alert: SecurityAlert) -> Result<(), SsoError> {
        match self.notifications.send_security_alert(&alert).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(action = %alert.action, error = %e, "Failed to send security alert");
                metrics::counter!("institution_sso_notification_failures_total").increment(1);
                if self.strict_notifications {
                    Err(e.into())
                } else {
                    Ok(())
                }
            }
        }
    }
}

fn unlink_update(provider_id: &ProviderId) -> Document {
    doc! {
        "$pull": { "samlIdentifiers": { "providerId": provider_id.as_str() } },
        "$unset": { "emails.$[linked].samlProviderId": "" },
    }
}

/// Selects the email carrying the link to `provider_id`, whatever address the
/// caller named.
fn unlink_array_filters(provider_id: &ProviderId) -> Vec<Document> {
    vec![doc! { "linked.samlProviderId": provider_id.as_str() }]
}

fn institution_label(provider_name: Option<&str>) -> &str {
    provider_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or("your institution")
}

fn record_outcome(counter: &'static str, result: &Result<(), SsoError>) {
    let outcome = match result {
        Ok(()) => "success",
        Err(e) => e.kind(),
    };
    metrics::counter!(counter, "outcome" => outcome).increment(1);
}
