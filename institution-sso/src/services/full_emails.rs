//! The "all emails with affiliation and SSO status" view of an account.

use mongodb::bson::doc;
use std::sync::Arc;

use crate::models::{AffiliationRecord, EmailAffiliation, FullEmail, User, UserEmail};
use super::directory::AffiliationDirectory;
use super::error::SsoError;
use super::reconfirmation::AffiliationWindowCalculator;
use super::request_context;
use super::user_getter::UserGetter;

#[derive(Clone)]
pub struct FullEmailAssembler {
    users: UserGetter,
    directory: Arc<dyn AffiliationDirectory>,
    calculator: AffiliationWindowCalculator,
}

impl FullEmailAssembler {
    pub fn new(
        users: UserGetter,
        directory: Arc<dyn AffiliationDirectory>,
        calculator: AffiliationWindowCalculator,
    ) -> Self {
        Self {
            users,
            directory,
            calculator,
        }
    }

    /// Every stored email of the user, in stored order, decorated with the
    /// directory affiliation and the matching SSO identity. Memoised per user
    /// inside a [`request_context::scope`].
    #[tracing::instrument(skip(self))]
    pub async fn get_user_full_emails(&self, user_id: &str) -> Result<Vec<FullEmail>, SsoError> {
        if let Some(cached) = request_context::cached_full_emails(user_id) {
            tracing::debug!(user_id = %user_id, "Full emails served from request cache");
            return Ok(cached);
        }

        let user = self
            .users
            .get_user_by_id(
                user_id,
                Some(doc! { "email": 1, "emails": 1, "samlIdentifiers": 1 }),
            )
            .await?
            .ok_or_else(|| SsoError::NotFound(format!("user {}", user_id)))?;

        let Some(emails) = user.emails.as_deref() else {
            request_context::cache_full_emails(user_id, &[]);
            return Ok(Vec::new());
        };

        let affiliations = self.directory.get_user_affiliations(user_id).await?;

        let full_emails: Vec<FullEmail> = emails
            .iter()
            .map(|email| self.decorate(&user, email, &affiliations))
            .collect();

        request_context::cache_full_emails(user_id, &full_emails);
        Ok(full_emails)
    }

    fn decorate(
        &self,
        user: &User,
        email: &UserEmail,
        affiliations: &[AffiliationRecord],
    ) -> FullEmail {
        let affiliation = affiliations.iter().find(|a| a.email == email.email);

        let saml_identifier = email
            .saml_provider_id
            .as_ref()
            .and_then(|provider_id| user.identifier_for(provider_id))
            .cloned();

        FullEmail {
            email: email.email.clone(),
            reversed_hostname: email.reversed_hostname.clone(),
            confirmed_at: email.confirmed_at,
            last_confirmed_at: email.last_confirmed_at,
            default: email.email == user.email,
            email_has_institution_licence: affiliation.is_some_and(|a| a.has_paid_licence()),
            affiliation: affiliation.map(|a| self.email_affiliation(email, a)),
            saml_provider_id: saml_identifier.as_ref().map(|i| i.provider_id.clone()),
            saml_identifier,
        }
    }

    fn email_affiliation(&self, email: &UserEmail, record: &AffiliationRecord) -> EmailAffiliation {
        let is_sso_linked_email = email
            .saml_provider_id
            .as_ref()
            .is_some_and(|provider_id| record.belongs_to(provider_id));

        EmailAffiliation {
            institution: record.institution.clone(),
            department: record.department.clone(),
            role: record.role.clone(),
            inferred: record.inferred,
            licence: record.licence.clone(),
            last_day_to_reconfirm: record.last_day_to_reconfirm.clone(),
            past_reconfirm_date: record.past_reconfirm_date,
            portal: record.portal.clone(),
            window: self.calculator.compute(email, record, is_sso_linked_email),
        }
    }
}
