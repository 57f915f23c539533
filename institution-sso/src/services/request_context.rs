//! Request-scoped memoisation of assembled full-email views.
//!
//! Entries live only for the duration of one [`scope`]; outside a scope
//! nothing is cached.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;

use crate::models::FullEmail;

tokio::task_local! {
    static FULL_EMAILS: RefCell<HashMap<String, Vec<FullEmail>>>;
}

/// Run `fut` with a fresh, empty request cache.
pub async fn scope<F>(fut: F) -> F::Output
where
    F: Future,
{
    FULL_EMAILS.scope(RefCell::new(HashMap::new()), fut).await
}

pub fn cached_full_emails(user_id: &str) -> Option<Vec<FullEmail>> {
    FULL_EMAILS
        .try_with(|cache| cache.borrow().get(user_id).cloned())
        .ok()
        .flatten()
}

/// Returns false when called outside a request scope.
pub fn cache_full_emails(user_id: &str, emails: &[FullEmail]) -> bool {
    FULL_EMAILS
        .try_with(|cache| {
            cache
                .borrow_mut()
                .insert(user_id.to_string(), emails.to_vec());
        })
        .is_ok()
}
