use service_core::error::AppError;
use thiserror::Error;

/// Failures of the account store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A unique index rejected the write.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),
}

/// Failures talking to the institution directory.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Directory request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Directory returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Failures writing an audit entry. These reach the caller unchanged.
#[derive(Error, Debug)]
pub enum AuditLogError {
    #[error("Invalid audit log entry: {0}")]
    InvalidEntry(String),

    #[error("Audit log unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),
}

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Email error: {0}")]
    Transport(String),
}

const ABSENT: &str = "<missing>";

#[derive(Error, Debug)]
pub enum SsoError {
    #[error(
        "invalid arguments: providerId: {provider_id}, externalUserId: {external_user_id}, userIdAttribute: {user_id_attribute}"
    )]
    InvalidArguments {
        provider_id: String,
        external_user_id: String,
        user_id_attribute: String,
    },

    #[error("missing data when linking institution SSO: {0}")]
    MissingLinkData(String),

    #[error("Email already exists on another account")]
    EmailExists,

    #[error("Institution email is not affiliated with any institution")]
    SamlEmailNotAffiliated,

    #[error("Institution email is affiliated with another institution")]
    SamlEmailAffiliatedWithAnotherInstitution,

    #[error("Institution identity is already linked to another account")]
    SamlIdentityExists,

    #[error("Account is already linked to this institution identity")]
    SamlAlreadyLinked,

    #[error(transparent)]
    AuditLog(#[from] AuditLogError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Notification(#[from] NotificationError),
}

impl SsoError {
    pub fn invalid_arguments(
        provider_id: Option<&str>,
        external_user_id: Option<&str>,
        user_id_attribute: Option<&str>,
    ) -> Self {
        let describe = |value: Option<&str>| value.unwrap_or(ABSENT).to_string();
        SsoError::InvalidArguments {
            provider_id: describe(provider_id),
            external_user_id: describe(external_user_id),
            user_id_attribute: describe(user_id_attribute),
        }
    }

    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SsoError::InvalidArguments { .. } => "invalid_arguments",
            SsoError::MissingLinkData(_) => "missing_link_data",
            SsoError::EmailExists => "email_exists",
            SsoError::SamlEmailNotAffiliated => "email_not_affiliated",
            SsoError::SamlEmailAffiliatedWithAnotherInstitution => "email_affiliated_elsewhere",
            SsoError::SamlIdentityExists => "identity_exists",
            SsoError::SamlAlreadyLinked => "already_linked",
            SsoError::AuditLog(_) => "audit_log",
            SsoError::NotFound(_) => "not_found",
            SsoError::Store(_) => "store",
            SsoError::Directory(_) => "directory",
            SsoError::Notification(_) => "notification",
        }
    }
}

impl From<SsoError> for AppError {
    fn from(err: SsoError) -> Self {
        match err {
            SsoError::InvalidArguments { .. } | SsoError::MissingLinkData(_) => {
                AppError::BadRequest(anyhow::anyhow!(err.to_string()))
            }
            SsoError::SamlEmailNotAffiliated
            | SsoError::SamlEmailAffiliatedWithAnotherInstitution => {
                AppError::BadRequest(anyhow::anyhow!(err.to_string()))
            }
            SsoError::EmailExists
            | SsoError::SamlIdentityExists
            | SsoError::SamlAlreadyLinked => AppError::Conflict(anyhow::anyhow!(err.to_string())),
            SsoError::NotFound(what) => AppError::NotFound(anyhow::anyhow!(what)),
            SsoError::AuditLog(AuditLogError::Database(e)) => AppError::from(e),
            SsoError::AuditLog(e) => AppError::InternalError(anyhow::Error::new(e)),
            SsoError::Store(StoreError::Database(e)) => AppError::from(e),
            SsoError::Store(e) => AppError::Conflict(anyhow::Error::new(e)),
            SsoError::Directory(e) => AppError::BadGateway(e.to_string()),
            SsoError::Notification(e) => AppError::EmailError(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_arguments_message_lists_every_argument() {
        let err = SsoError::invalid_arguments(None, Some("id123"), Some("someAttr"));
        assert_eq!(
            err.to_string(),
            "invalid arguments: providerId: <missing>, externalUserId: id123, userIdAttribute: someAttr"
        );
    }

    #[test]
    fn test_audit_error_is_transparent() {
        let err = SsoError::from(AuditLogError::Unavailable("oops".to_string()));
        assert_eq!(err.to_string(), "Audit log unavailable: oops");
    }

    #[test]
    fn test_conflicts_map_to_conflict() {
        assert!(matches!(
            AppError::from(SsoError::SamlAlreadyLinked),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            AppError::from(SsoError::EmailExists),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            AppError::from(SsoError::NotFound("user u1".to_string())),
            AppError::NotFound(_)
        ));
    }
}
