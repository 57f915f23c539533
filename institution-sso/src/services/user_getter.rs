use mongodb::bson::{Document, doc};
use std::sync::Arc;

use crate::models::{User, UserEmail, user_id_bson};
use super::database::UserStore;
use super::error::SsoError;

/// Read-side account lookups shared by the linker and the full-email view.
#[derive(Clone)]
pub struct UserGetter {
    users: Arc<dyn UserStore>,
}

impl UserGetter {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    pub async fn get_user_by_id(
        &self,
        user_id: &str,
        projection: Option<Document>,
    ) -> Result<Option<User>, SsoError> {
        Ok(self
            .users
            .find_one(doc! { "_id": user_id_bson(user_id) }, projection)
            .await?)
    }

    /// Look a user up by any of their emails, falling back to the primary
    /// `email` field for accounts that predate the `emails` array.
    pub async fn get_user_by_any_email(&self, email: &str) -> Result<Option<User>, SsoError> {
        let email = email.trim();

        let by_secondary = self
            .users
            .find_one(
                doc! { "emails": { "$exists": true }, "emails.email": email },
                None,
            )
            .await?;
        if by_secondary.is_some() {
            return Ok(by_secondary);
        }

        Ok(self.users.find_one(doc! { "email": email }, None).await?)
    }

    pub async fn get_user_confirmed_emails(
        &self,
        user_id: &str,
    ) -> Result<Vec<UserEmail>, SsoError> {
        let user = self
            .get_user_by_id(user_id, Some(doc! { "emails": 1 }))
            .await?
            .ok_or_else(|| SsoError::NotFound(format!("user {}", user_id)))?;

        Ok(user
            .emails
            .unwrap_or_default()
            .into_iter()
            .filter(|email| email.confirmed_at.is_some())
            .collect())
    }
}
