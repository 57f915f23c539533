//! Batch removal of SSO linkages that were never migrated to a provider's
//! current user id attribute.

use mongodb::bson::doc;

use crate::models::{AuditLogInfo, ProviderId, User};
use crate::services::{SYSTEM_IP_ADDRESS, SamlIdentityManager, SsoError, UserGetter};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UnlinkReport {
    pub candidates: usize,
    pub unlinked: usize,
    pub failed: usize,
}

/// Users whose identity for `provider_id` does not use `current_attribute`.
pub fn select_unmigrated<'a>(
    users: &'a [User],
    provider_id: &ProviderId,
    current_attribute: &str,
) -> Vec<&'a User> {
    users
        .iter()
        .filter(|user| user.email_linked_to(provider_id).is_some())
        .filter(|user| {
            user.identifier_for(provider_id)
                .is_none_or(|identifier| identifier.user_id_attribute.as_deref() != Some(current_attribute))
        })
        .collect()
}

/// Unlink every unmigrated user of a provider. A failure on one user is
/// logged and counted; the batch carries on.
pub async fn unlink_not_migrated(
    users: &UserGetter,
    identities: &SamlIdentityManager,
    provider_id: &ProviderId,
    provider_name: Option<&str>,
    current_attribute: &str,
) -> Result<UnlinkReport, SsoError> {
    let linked = users
        .store()
        .find(doc! { "emails.samlProviderId": provider_id.as_str() })
        .await?;
    let candidates = select_unmigrated(&linked, provider_id, current_attribute);

    let mut report = UnlinkReport {
        candidates: candidates.len(),
        ..Default::default()
    };
    tracing::info!(
        provider_id = %provider_id,
        linked = linked.len(),
        candidates = report.candidates,
        "Unlinking unmigrated SSO identities"
    );

    let audit = AuditLogInfo::system(SYSTEM_IP_ADDRESS);
    for user in candidates {
        let user_id = user.id_string();
        match identities
            .unlink_not_migrated(&user_id, provider_id, provider_name, &audit)
            .await
        {
            Ok(()) => report.unlinked += 1,
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Failed to unlink unmigrated identity");
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        provider_id = %provider_id,
        unlinked = report.unlinked,
        failed = report.failed,
        "Finished unlinking unmigrated SSO identities"
    );
    Ok(report)
}
