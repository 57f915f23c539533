//! Wiring of the production collaborators from configuration.

use std::sync::Arc;

use service_core::error::AppError;

use crate::config::{SmtpConfig, SsoConfig};
use crate::services::{
    AffiliationDirectory, AffiliationWindowCalculator, DirectoryClient, FullEmailAssembler,
    LogNotificationChannel, MongoAuditLog, NotificationChannel, SamlIdentityManager,
    SmtpNotificationChannel, SsoDb, UserGetter,
};

pub struct Application {
    pub db: SsoDb,
    pub users: UserGetter,
    pub full_emails: FullEmailAssembler,
    pub identities: SamlIdentityManager,
}

impl Application {
    pub async fn build(config: &SsoConfig) -> Result<Self, AppError> {
        let db = SsoDb::connect(&config.mongodb.uri, &config.mongodb.database).await?;
        db.initialize_indexes().await?;

        let users = UserGetter::new(Arc::new(db.clone()));
        let directory: Arc<dyn AffiliationDirectory> =
            Arc::new(DirectoryClient::new(config.directory.clone()));
        let full_emails = FullEmailAssembler::new(
            users.clone(),
            directory.clone(),
            AffiliationWindowCalculator::new(config.reconfirm_notification_days),
        );

        let identities = SamlIdentityManager::new(
            users.clone(),
            full_emails.clone(),
            Arc::new(MongoAuditLog::new(db.database())),
            directory,
            notification_channel(&config.smtp)?,
        )
        .with_strict_notifications(config.strict_notifications);

        tracing::info!(
            directory_configured = !config.directory.url.is_empty(),
            smtp_enabled = config.smtp.enabled,
            reconfirm_notification_days = ?config.reconfirm_notification_days,
            "Institution SSO services initialized"
        );

        Ok(Self {
            db,
            users,
            full_emails,
            identities,
        })
    }
}

pub fn notification_channel(config: &SmtpConfig) -> Result<Arc<dyn NotificationChannel>, AppError> {
    if !config.enabled {
        tracing::info!("SMTP disabled, security alerts will only be logged");
        return Ok(Arc::new(LogNotificationChannel));
    }

    let channel = SmtpNotificationChannel::new(config.clone())
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;
    Ok(Arc::new(channel))
}
