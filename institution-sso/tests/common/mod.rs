#![allow(dead_code)]

use async_trait::async_trait;
use institution_sso::models::{AffiliationRecord, AuditAction, AuditLogInfo, Institution, User};
use institution_sso::services::audit_log::validate_entry;
use institution_sso::services::{
    AffiliationDirectory, AffiliationWindowCalculator, AuditLog, AuditLogError, DirectoryError,
    FullEmailAssembler, NotificationChannel, NotificationError, SamlIdentityManager,
    SecurityAlert, StoreError, UpdateOutcome, UserGetter, UserStore,
};
use mongodb::bson::{self, Bson, Document};
use mongodb::options::ReturnDocument;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const IP_ADDRESS: &str = "0:0:0:0";
pub const INITIATOR_ID: &str = "6005c75b12cbcaf771f4a105";
pub const NOTIFICATION_DAYS: i64 = 14;

pub fn audit_info() -> AuditLogInfo {
    AuditLogInfo::new(INITIATOR_ID, IP_ADDRESS)
}

pub fn university(id: u32) -> Institution {
    Institution::new(id, format!("University {}", id)).with_max_confirmation_months(12)
}

pub fn sso_university(id: u32) -> Institution {
    university(id).with_sso()
}

/// Values reachable at a dotted path, descending into arrays like MongoDB does.
fn values_at(value: &Bson, path: &[&str]) -> Vec<Bson> {
    if let Bson::Array(items) = value {
        return items.iter().flat_map(|item| values_at(item, path)).collect();
    }
    match path.split_first() {
        None => vec![value.clone()],
        Some((head, rest)) => match value {
            Bson::Document(doc) => doc
                .get(*head)
                .map(|inner| values_at(inner, rest))
                .unwrap_or_default(),
            _ => Vec::new(),
        },
    }
}

/// Minimal filter evaluation: equality, `$exists`, `$ne` and `$elemMatch`.
pub fn matches_filter(doc: &Document, filter: &Document) -> bool {
    let root = Bson::Document(doc.clone());
    filter.iter().all(|(key, condition)| {
        let path: Vec<&str> = key.split('.').collect();
        let values = values_at(&root, &path);
        match condition {
            Bson::Document(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                ops.iter().all(|(op, arg)| match op.as_str() {
                    "$exists" => arg.as_bool().unwrap_or(true) == !values.is_empty(),
                    "$ne" => values.iter().all(|v| v != arg),
                    "$elemMatch" => match arg {
                        Bson::Document(sub) => values.iter().any(|v| match v {
                            Bson::Document(element) => matches_filter(element, sub),
                            _ => false,
                        }),
                        _ => false,
                    },
                    other => panic!("unsupported operator in test store: {}", other),
                })
            }
            expected => values.iter().any(|v| v == expected),
        }
    })
}

#[derive(Debug, Clone)]
pub struct RecordedUpdate {
    pub filter: Document,
    pub update: Document,
    pub array_filters: Option<Vec<Document>>,
    pub returned_before: Option<bool>,
}

#[derive(Default)]
pub struct MockUserStore {
    users: Mutex<Vec<User>>,
    pub queries: Mutex<Vec<Document>>,
    pub projections: Mutex<Vec<Option<Document>>>,
    pub updates: Mutex<Vec<RecordedUpdate>>,
    pub duplicate_key_on_write: AtomicBool,
}

impl MockUserStore {
    pub fn with_users(users: Vec<User>) -> Self {
        Self {
            users: Mutex::new(users),
            ..Default::default()
        }
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    pub fn recorded_updates(&self) -> Vec<RecordedUpdate> {
        self.updates.lock().unwrap().clone()
    }

    fn matching(&self, filter: &Document) -> Vec<User> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .filter(|user| {
                let doc = bson::to_document(user).expect("user serializes");
                matches_filter(&doc, filter)
            })
            .cloned()
            .collect()
    }

    fn duplicate_key(&self) -> Result<(), StoreError> {
        if self.duplicate_key_on_write.load(Ordering::SeqCst) {
            return Err(StoreError::DuplicateKey(
                "E11000 duplicate key error collection: users".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MockUserStore {
    async fn find_one(
        &self,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Option<User>, StoreError> {
        let found = self.matching(&filter).into_iter().next();
        self.queries.lock().unwrap().push(filter);
        self.projections.lock().unwrap().push(projection);
        Ok(found)
    }

    async fn find(&self, filter: Document) -> Result<Vec<User>, StoreError> {
        let found = self.matching(&filter);
        self.queries.lock().unwrap().push(filter);
        Ok(found)
    }

    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        array_filters: Option<Vec<Document>>,
    ) -> Result<UpdateOutcome, StoreError> {
        let matched = self.matching(&filter).len().min(1) as u64;
        self.updates.lock().unwrap().push(RecordedUpdate {
            filter,
            update,
            array_filters,
            returned_before: None,
        });
        self.duplicate_key()?;
        Ok(UpdateOutcome {
            matched_count: matched,
            modified_count: matched,
        })
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        return_document: ReturnDocument,
    ) -> Result<Option<User>, StoreError> {
        let found = self.matching(&filter).into_iter().next();
        self.updates.lock().unwrap().push(RecordedUpdate {
            filter,
            update,
            array_filters: None,
            returned_before: Some(matches!(return_document, ReturnDocument::Before)),
        });
        self.duplicate_key()?;
        Ok(found)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitlementCall {
    Add { user_id: String, email: String },
    Remove { user_id: String, email: String },
}

#[derive(Default)]
pub struct MockDirectory {
    affiliations: Mutex<HashMap<String, Vec<AffiliationRecord>>>,
    pub affiliation_requests: AtomicUsize,
    pub entitlement_calls: Mutex<Vec<EntitlementCall>>,
}

impl MockDirectory {
    pub fn set_affiliations(&self, user_id: &str, records: Vec<AffiliationRecord>) {
        self.affiliations
            .lock()
            .unwrap()
            .insert(user_id.to_string(), records);
    }

    pub fn requests(&self) -> usize {
        self.affiliation_requests.load(Ordering::SeqCst)
    }

    pub fn entitlement_calls(&self) -> Vec<EntitlementCall> {
        self.entitlement_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AffiliationDirectory for MockDirectory {
    async fn get_user_affiliations(
        &self,
        user_id: &str,
    ) -> Result<Vec<AffiliationRecord>, DirectoryError> {
        self.affiliation_requests.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .affiliations
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_entitlement(&self, user_id: &str, email: &str) -> Result<(), DirectoryError> {
        self.entitlement_calls.lock().unwrap().push(EntitlementCall::Add {
            user_id: user_id.to_string(),
            email: email.to_string(),
        });
        Ok(())
    }

    async fn remove_entitlement(&self, user_id: &str, email: &str) -> Result<(), DirectoryError> {
        self.entitlement_calls
            .lock()
            .unwrap()
            .push(EntitlementCall::Remove {
                user_id: user_id.to_string(),
                email: email.to_string(),
            });
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RecordedEntry {
    pub user_id: String,
    pub action: AuditAction,
    pub initiator_id: Option<String>,
    pub ip_address: Option<String>,
    pub info: serde_json::Value,
}

#[derive(Default)]
pub struct MockAuditLog {
    pub entries: Mutex<Vec<RecordedEntry>>,
    pub reject: AtomicBool,
}

impl MockAuditLog {
    pub fn entries(&self) -> Vec<RecordedEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditLog for MockAuditLog {
    async fn add_entry(
        &self,
        user_id: &str,
        action: AuditAction,
        initiator_id: Option<&str>,
        ip_address: Option<&str>,
        info: serde_json::Value,
    ) -> Result<(), AuditLogError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(AuditLogError::Unavailable("oops".to_string()));
        }
        validate_entry(action, initiator_id, ip_address)?;
        self.entries.lock().unwrap().push(RecordedEntry {
            user_id: user_id.to_string(),
            action,
            initiator_id: initiator_id.map(str::to_string),
            ip_address: ip_address.map(str::to_string),
            info,
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct MockNotifications {
    pub sent: Mutex<Vec<SecurityAlert>>,
    pub fail: AtomicBool,
}

impl MockNotifications {
    pub fn sent(&self) -> Vec<SecurityAlert> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationChannel for MockNotifications {
    async fn send_security_alert(&self, alert: &SecurityAlert) -> Result<(), NotificationError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport("connection refused".to_string()));
        }
        self.sent.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

pub struct TestContext {
    pub store: Arc<MockUserStore>,
    pub directory: Arc<MockDirectory>,
    pub audit_log: Arc<MockAuditLog>,
    pub notifications: Arc<MockNotifications>,
    pub users: UserGetter,
    pub full_emails: FullEmailAssembler,
    pub manager: SamlIdentityManager,
}

impl TestContext {
    pub fn new(users: Vec<User>) -> Self {
        Self::build(users, false)
    }

    pub fn strict(users: Vec<User>) -> Self {
        Self::build(users, true)
    }

    fn build(users: Vec<User>, strict: bool) -> Self {
        let store = Arc::new(MockUserStore::with_users(users));
        let directory = Arc::new(MockDirectory::default());
        let audit_log = Arc::new(MockAuditLog::default());
        let notifications = Arc::new(MockNotifications::default());

        let getter = UserGetter::new(store.clone());
        let full_emails = FullEmailAssembler::new(
            getter.clone(),
            directory.clone(),
            AffiliationWindowCalculator::new(Some(NOTIFICATION_DAYS)),
        );
        let manager = SamlIdentityManager::new(
            getter.clone(),
            full_emails.clone(),
            audit_log.clone(),
            directory.clone(),
            notifications.clone(),
        )
        .with_strict_notifications(strict);

        Self {
            store,
            directory,
            audit_log,
            notifications,
            users: getter,
            full_emails,
            manager,
        }
    }

    /// Nothing was written, audited or sent.
    pub fn assert_untouched(&self) {
        assert_eq!(self.store.update_count(), 0, "unexpected store update");
        assert!(self.audit_log.entries().is_empty(), "unexpected audit entry");
        assert!(self.notifications.sent().is_empty(), "unexpected notification");
    }
}
