use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    Client as MongoClient, Collection, Database, IndexModel,
    bson::{Document, doc},
    error::{ErrorKind, WriteFailure},
    options::{
        FindOneAndUpdateOptions, FindOneOptions, IndexOptions, ReturnDocument, UpdateOptions,
    },
};
use service_core::error::AppError;

use crate::models::User;
use super::error::StoreError;

pub const USERS_COLLECTION: &str = "users";
pub const AUDIT_LOG_COLLECTION: &str = "userAuditLogEntries";

const DUPLICATE_KEY_CODE: i32 = 11000;

/// Counts reported by a single-document update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Account store. Filters and updates are raw documents so callers control
/// the exact update shape written to the collection.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_one(
        &self,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Option<User>, StoreError>;

    async fn find(&self, filter: Document) -> Result<Vec<User>, StoreError>;

    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        array_filters: Option<Vec<Document>>,
    ) -> Result<UpdateOutcome, StoreError>;

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        return_document: ReturnDocument,
    ) -> Result<Option<User>, StoreError>;
}

#[derive(Clone)]
pub struct SsoDb {
    client: MongoClient,
    db: Database,
}

impl SsoDb {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!(database = %database, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for institution-sso");

        // Backs the (providerId, externalUserId) uniqueness across all accounts
        let identity_index = IndexModel::builder()
            .keys(doc! {
                "samlIdentifiers.providerId": 1,
                "samlIdentifiers.externalUserId": 1,
            })
            .options(
                IndexOptions::builder()
                    .name("saml_identity_unique_idx".to_string())
                    .unique(true)
                    .partial_filter_expression(doc! {
                        "samlIdentifiers.externalUserId": { "$exists": true }
                    })
                    .build(),
            )
            .build();

        self.users()
            .create_index(identity_index, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create SAML identity index: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;

        let emails_index = IndexModel::builder()
            .keys(doc! { "emails.email": 1 })
            .options(
                IndexOptions::builder()
                    .name("emails_email_idx".to_string())
                    .build(),
            )
            .build();

        self.users()
            .create_index(emails_index, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create emails.email index: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;

        let audit_user_index = IndexModel::builder()
            .keys(doc! { "userId": 1, "timestamp": -1 })
            .options(
                IndexOptions::builder()
                    .name("audit_user_timestamp_idx".to_string())
                    .build(),
            )
            .build();

        self.db
            .collection::<Document>(AUDIT_LOG_COLLECTION)
            .create_index(audit_user_index, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create audit log index: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;

        tracing::info!("Successfully created all MongoDB indexes");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;
        Ok(())
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn users(&self) -> Collection<User> {
        self.db.collection(USERS_COLLECTION)
    }
}

/// Map a driver error, singling out unique index violations.
fn store_error(e: mongodb::error::Error) -> StoreError {
    let duplicate = match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) => we.code == DUPLICATE_KEY_CODE,
        ErrorKind::Command(ce) => ce.code == DUPLICATE_KEY_CODE,
        _ => false,
    };
    if duplicate {
        StoreError::DuplicateKey(e.to_string())
    } else {
        StoreError::Database(e)
    }
}

#[async_trait]
impl UserStore for SsoDb {
    async fn find_one(
        &self,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Option<User>, StoreError> {
        let mut options = FindOneOptions::default();
        options.projection = projection;

        self.users().find_one(filter, options).await.map_err(|e| {
            tracing::error!("Failed to find user: {}", e);
            store_error(e)
        })
    }

    async fn find(&self, filter: Document) -> Result<Vec<User>, StoreError> {
        let cursor = self.users().find(filter, None).await.map_err(|e| {
            tracing::error!("Failed to query users: {}", e);
            store_error(e)
        })?;

        cursor.try_collect().await.map_err(|e| {
            tracing::error!("Failed to collect users: {}", e);
            store_error(e)
        })
    }

    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        array_filters: Option<Vec<Document>>,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut options = UpdateOptions::default();
        options.array_filters = array_filters;

        let result = self
            .users()
            .update_one(filter, update, options)
            .await
            .map_err(|e| {
                tracing::error!("Failed to update user: {}", e);
                store_error(e)
            })?;

        Ok(UpdateOutcome {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
        })
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        return_document: ReturnDocument,
    ) -> Result<Option<User>, StoreError> {
        let mut options = FindOneAndUpdateOptions::default();
        options.return_document = Some(return_document);

        self.users()
            .find_one_and_update(filter, update, options)
            .await
            .map_err(|e| {
                tracing::error!("Failed to find and update user: {}", e);
                store_error(e)
            })
    }
}
