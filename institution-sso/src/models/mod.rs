pub mod affiliation;
pub mod audit_entry;
pub mod full_email;
pub mod link_data;
pub mod provider_id;
pub mod user;

pub use affiliation::{AffiliationRecord, FREE_LICENCE, Institution};
pub use audit_entry::{AuditAction, AuditEntry, AuditLogInfo};
pub use full_email::{EmailAffiliation, FullEmail, ReconfirmationWindow};
pub use link_data::{LinkData, LinkFields};
pub use provider_id::ProviderId;
pub use user::{SamlIdentifier, User, UserEmail, user_id_bson, user_id_string};
