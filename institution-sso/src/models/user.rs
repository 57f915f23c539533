//! User account document, restricted to the fields SSO linking touches.

use chrono::{DateTime, Utc};
use mongodb::bson::{Bson, oid::ObjectId};
use serde::{Deserialize, Serialize};

use super::ProviderId;

/// Convert an externally supplied user id into its stored `_id` form.
///
/// Hex strings that parse as an ObjectId are stored as such; anything else is
/// kept as a plain string id.
pub fn user_id_bson(user_id: &str) -> Bson {
    match ObjectId::parse_str(user_id) {
        Ok(oid) => Bson::ObjectId(oid),
        Err(_) => Bson::String(user_id.to_string()),
    }
}

/// String form of a stored `_id`, the inverse of [`user_id_bson`].
pub fn user_id_string(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Bson,
    #[serde(default)]
    pub email: String,
    /// `None` when the stored document has no `emails` field at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emails: Option<Vec<UserEmail>>,
    #[serde(default)]
    pub saml_identifiers: Vec<SamlIdentifier>,
}

impl User {
    pub fn new(user_id: &str, email: impl Into<String>) -> Self {
        let email = email.into();
        Self {
            id: user_id_bson(user_id),
            emails: Some(vec![UserEmail::new(email.clone())]),
            email,
            saml_identifiers: Vec::new(),
        }
    }

    pub fn id_string(&self) -> String {
        user_id_string(&self.id)
    }

    pub fn is_same_user(&self, user_id: &str) -> bool {
        self.id_string() == user_id
    }

    pub fn find_email(&self, email: &str) -> Option<&UserEmail> {
        self.emails
            .as_deref()
            .and_then(|emails| emails.iter().find(|e| e.email == email))
    }

    pub fn identifier_for(&self, provider_id: &ProviderId) -> Option<&SamlIdentifier> {
        self.saml_identifiers
            .iter()
            .find(|identifier| &identifier.provider_id == provider_id)
    }

    /// The email currently carrying `samlProviderId == provider_id`.
    pub fn email_linked_to(&self, provider_id: &ProviderId) -> Option<&UserEmail> {
        self.emails.as_deref().and_then(|emails| {
            emails
                .iter()
                .find(|e| e.saml_provider_id.as_ref() == Some(provider_id))
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserEmail {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reversed_hostname: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_chrono_datetime_as_bson_datetime"
    )]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_chrono_datetime_as_bson_datetime"
    )]
    pub reconfirmed_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_chrono_datetime_as_bson_datetime"
    )]
    pub last_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saml_provider_id: Option<ProviderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation_unchecked: Option<bool>,
}

impl UserEmail {
    pub fn new(email: impl Into<String>) -> Self {
        let email = email.into();
        Self {
            reversed_hostname: reversed_hostname(&email),
            email,
            ..Default::default()
        }
    }

    pub fn confirmed(mut self, at: DateTime<Utc>) -> Self {
        self.confirmed_at = Some(at);
        self.last_confirmed_at = Some(at);
        self
    }

    pub fn reconfirmed(mut self, at: DateTime<Utc>) -> Self {
        self.reconfirmed_at = Some(at);
        self.last_confirmed_at = Some(at);
        self
    }

    pub fn linked_to(mut self, provider_id: impl Into<ProviderId>) -> Self {
        self.saml_provider_id = Some(provider_id.into());
        self
    }
}

/// Hostname of an email reversed character by character, as stored for
/// hostname-prefix lookups (`foo.bar` becomes `rab.oof`).
pub fn reversed_hostname(email: &str) -> Option<String> {
    email
        .rsplit_once('@')
        .map(|(_, host)| host.chars().rev().collect())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SamlIdentifier {
    pub provider_id: ProviderId,
    pub external_user_id: String,
    /// Absent on identities linked before the attribute was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id_attribute: Option<String>,
    #[serde(default)]
    pub has_entitlement: bool,
}

impl SamlIdentifier {
    pub fn new(
        provider_id: impl Into<ProviderId>,
        external_user_id: impl Into<String>,
        user_id_attribute: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            external_user_id: external_user_id.into(),
            user_id_attribute: Some(user_id_attribute.into()),
            has_entitlement: false,
        }
    }
}

// Helper module for optional DateTime<Utc> as BSON DateTime
mod opt_chrono_datetime_as_bson_datetime {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => {
                let bson_dt = bson::DateTime::from_chrono(*dt);
                bson_dt.serialize(serializer)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<bson::DateTime> = Option::deserialize(deserializer)?;
        Ok(opt.map(|dt| dt.to_chrono()))
    }
}
