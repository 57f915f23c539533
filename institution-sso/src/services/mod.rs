pub mod audit_log;
pub mod database;
pub mod directory;
pub mod entitlement;
pub mod error;
pub mod full_emails;
pub mod notification;
pub mod reconfirmation;
pub mod request_context;
pub mod saml_identity;
pub mod user_getter;

pub use audit_log::{AuditLog, MongoAuditLog};
pub use database::{SsoDb, UpdateOutcome, UserStore};
pub use directory::{AffiliationDirectory, DirectoryClient};
pub use entitlement::{
    EntitlementMatch, EntitlementValue, entitlement_attribute_matches, match_entitlement,
};
pub use error::{AuditLogError, DirectoryError, NotificationError, SsoError, StoreError};
pub use full_emails::FullEmailAssembler;
pub use notification::{
    LogNotificationChannel, NotificationChannel, SecurityAlert, SmtpNotificationChannel,
};
pub use reconfirmation::{AffiliationWindowCalculator, compute_window, compute_window_at};
pub use saml_identity::{IdentifierMigration, SYSTEM_IP_ADDRESS, SamlIdentityManager};
pub use user_getter::UserGetter;
