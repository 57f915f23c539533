use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Institution, ProviderId, SamlIdentifier};

/// One stored email enriched with directory affiliation and SSO linkage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FullEmail {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reversed_hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Serialised as `null` rather than omitted when the email was never confirmed.
    pub last_confirmed_at: Option<DateTime<Utc>>,
    pub default: bool,
    pub email_has_institution_licence: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<EmailAffiliation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saml_provider_id: Option<ProviderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saml_identifier: Option<SamlIdentifier>,
}

impl FullEmail {
    pub fn institution_id(&self) -> Option<&ProviderId> {
        self.affiliation
            .as_ref()
            .and_then(|affiliation| affiliation.institution.id.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmailAffiliation {
    pub institution: Institution,
    pub department: Option<String>,
    pub role: Option<String>,
    pub inferred: Option<bool>,
    pub licence: Option<String>,
    pub last_day_to_reconfirm: Option<String>,
    pub past_reconfirm_date: Option<bool>,
    pub portal: Option<serde_json::Value>,
    #[serde(flatten)]
    pub window: ReconfirmationWindow,
}

/// Outcome of reconciling the local reconfirmation deadline with the directory's.
///
/// Both partial verdicts are kept next to the merged decision, and the
/// directory's raw values are mirrored untouched in the `cached_*` fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReconfirmationWindow {
    pub in_reconfirm_notification_period: bool,
    pub local_deadline_due: bool,
    pub directory_deadline_due: bool,
    pub cached_confirmed_at: Option<String>,
    pub cached_reconfirmed_at: Option<String>,
    pub cached_entitlement: Option<bool>,
    pub cached_last_day_to_reconfirm: Option<String>,
    pub cached_past_reconfirm_date: Option<bool>,
}
