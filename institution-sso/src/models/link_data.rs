use serde::{Deserialize, Serialize};

use super::ProviderId;

/// Data asserted by an institution's identity provider when a user links.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkData {
    pub external_user_id: Option<String>,
    pub institution_email: Option<String>,
    #[serde(alias = "universityId")]
    pub provider_id: Option<ProviderId>,
    #[serde(alias = "universityName")]
    pub provider_name: Option<String>,
    pub user_id_attribute: Option<String>,
    #[serde(default)]
    pub has_entitlement: bool,
}

/// Borrowed view of [`LinkData`] once every required field is present.
#[derive(Debug, Clone, Copy)]
pub struct LinkFields<'a> {
    pub external_user_id: &'a str,
    pub institution_email: &'a str,
    pub provider_id: &'a ProviderId,
    pub provider_name: Option<&'a str>,
    pub user_id_attribute: &'a str,
    pub has_entitlement: bool,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl LinkData {
    /// `None` when any of the four required fields is absent or blank.
    pub fn required_fields(&self) -> Option<LinkFields<'_>> {
        Some(LinkFields {
            external_user_id: present(&self.external_user_id)?,
            institution_email: present(&self.institution_email)?.trim(),
            provider_id: self.provider_id.as_ref().filter(|id| !id.is_empty())?,
            provider_name: present(&self.provider_name),
            user_id_attribute: present(&self.user_id_attribute)?,
            has_entitlement: self.has_entitlement,
        })
    }

    /// Names of the required fields that are absent or blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if present(&self.external_user_id).is_none() {
            missing.push("externalUserId");
        }
        if present(&self.institution_email).is_none() {
            missing.push("institutionEmail");
        }
        if self.provider_id.as_ref().is_none_or(|id| id.is_empty()) {
            missing.push("providerId");
        }
        if present(&self.user_id_attribute).is_none() {
            missing.push("userIdAttribute");
        }
        missing
    }
}
