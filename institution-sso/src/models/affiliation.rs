//! Affiliation records as served by the institution directory.

use serde::{Deserialize, Serialize};

use super::ProviderId;

/// Licence tier the directory reports for unpaid affiliations.
pub const FREE_LICENCE: &str = "free";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AffiliationRecord {
    pub email: String,
    #[serde(default)]
    pub institution: Institution,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub licence: Option<String>,
    #[serde(default)]
    pub entitlement: Option<bool>,
    #[serde(default)]
    pub inferred: Option<bool>,
    /// Kept as sent; parsed only when the reconfirmation window is computed.
    #[serde(default)]
    pub last_day_to_reconfirm: Option<String>,
    #[serde(default)]
    pub past_reconfirm_date: Option<bool>,
    #[serde(default)]
    pub cached_confirmed_at: Option<String>,
    #[serde(default)]
    pub cached_reconfirmed_at: Option<String>,
    #[serde(default)]
    pub portal: Option<serde_json::Value>,
}

impl AffiliationRecord {
    pub fn new(email: impl Into<String>, institution: Institution) -> Self {
        Self {
            email: email.into(),
            institution,
            ..Default::default()
        }
    }

    pub fn has_paid_licence(&self) -> bool {
        matches!(self.licence.as_deref(), Some(l) if !l.is_empty() && l != FREE_LICENCE)
    }

    pub fn belongs_to(&self, provider_id: &ProviderId) -> bool {
        self.institution.id.as_ref() == Some(provider_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Institution {
    #[serde(default)]
    pub id: Option<ProviderId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_university: bool,
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub sso_enabled: bool,
    #[serde(default)]
    pub max_confirmation_months: Option<u32>,
}

impl Institution {
    pub fn new(id: impl Into<ProviderId>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            is_university: true,
            confirmed: true,
            ..Default::default()
        }
    }

    pub fn with_sso(mut self) -> Self {
        self.sso_enabled = true;
        self
    }

    pub fn with_max_confirmation_months(mut self, months: u32) -> Self {
        self.max_confirmation_months = Some(months);
        self
    }
}
