//! Client for the external institution/affiliation directory.

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use backoff::future::retry;
use serde::Serialize;
use service_core::observability::TracedClientExt;
use std::time::Duration;

use crate::config::DirectoryConfig;
use crate::models::AffiliationRecord;
use super::error::DirectoryError;

const MAX_ATTEMPTS: u32 = 3;

#[async_trait]
pub trait AffiliationDirectory: Send + Sync {
    async fn get_user_affiliations(
        &self,
        user_id: &str,
    ) -> Result<Vec<AffiliationRecord>, DirectoryError>;

    async fn add_entitlement(&self, user_id: &str, email: &str) -> Result<(), DirectoryError>;

    async fn remove_entitlement(&self, user_id: &str, email: &str) -> Result<(), DirectoryError>;
}

#[derive(Serialize)]
struct EntitlementRequest<'a> {
    email: &'a str,
}

pub struct DirectoryClient {
    http: reqwest::Client,
    config: DirectoryConfig,
}

impl DirectoryClient {
    pub fn new(config: DirectoryConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn is_configured(&self) -> bool {
        !self.config.url.trim().is_empty()
    }

    fn endpoint(&self, user_id: &str, suffix: &str) -> String {
        format!(
            "{}/api/v2/users/{}/affiliations{}",
            self.config.url.trim_end_matches('/'),
            user_id,
            suffix
        )
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    async fn fetch_affiliations(
        &self,
        url: &str,
    ) -> Result<Vec<AffiliationRecord>, DirectoryError> {
        let response = self
            .http
            .traced_get(url)
            .basic_auth(&self.config.user, &self.config.password)
            .timeout(self.timeout())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    async fn post_entitlement(
        &self,
        user_id: &str,
        email: &str,
        suffix: &str,
    ) -> Result<(), DirectoryError> {
        if !self.is_configured() {
            tracing::debug!(user_id = %user_id, "Directory not configured, skipping entitlement update");
            return Ok(());
        }

        let response = self
            .http
            .traced_post(&self.endpoint(user_id, suffix))
            .basic_auth(&self.config.user, &self.config.password)
            .timeout(self.timeout())
            .json(&EntitlementRequest { email })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                user_id = %user_id,
                status = status.as_u16(),
                "Directory rejected entitlement update"
            );
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Client errors will not improve on retry.
fn is_retryable(err: &DirectoryError) -> bool {
    match err {
        DirectoryError::Status { status, .. } => *status >= 500,
        DirectoryError::Request(_) => true,
    }
}

#[async_trait]
impl AffiliationDirectory for DirectoryClient {
    async fn get_user_affiliations(
        &self,
        user_id: &str,
    ) -> Result<Vec<AffiliationRecord>, DirectoryError> {
        if !self.is_configured() {
            return Ok(Vec::new());
        }

        let url = self.endpoint(user_id, "");
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(self.config.retry_interval_ms),
            current_interval: Duration::from_millis(self.config.retry_interval_ms),
            max_elapsed_time: Some(self.timeout() * MAX_ATTEMPTS),
            ..Default::default()
        };

        let mut attempt = 0u32;
        let result = retry(backoff, || {
            attempt += 1;
            let current = attempt;
            let url = url.as_str();
            async move {
                self.fetch_affiliations(url).await.map_err(|e| {
                    if current < MAX_ATTEMPTS && is_retryable(&e) {
                        tracing::warn!(
                            user_id = %user_id,
                            attempt = current,
                            error = %e,
                            "Directory affiliation request failed, retrying"
                        );
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await;

        match result {
            Ok(affiliations) => {
                metrics::counter!("institution_sso_directory_requests_total", "status" => "success")
                    .increment(1);
                Ok(affiliations)
            }
            Err(e) => {
                metrics::counter!("institution_sso_directory_requests_total", "status" => "error")
                    .increment(1);
                tracing::error!(user_id = %user_id, error = %e, "Failed to fetch affiliations");
                Err(e)
            }
        }
    }

    async fn add_entitlement(&self, user_id: &str, email: &str) -> Result<(), DirectoryError> {
        self.post_entitlement(user_id, email, "/add_entitlement").await
    }

    async fn remove_entitlement(&self, user_id: &str, email: &str) -> Result<(), DirectoryError> {
        self.post_entitlement(user_id, email, "/remove_entitlement")
            .await
    }
}
