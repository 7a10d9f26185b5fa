//! The term store capability and its in-memory implementation.

use crate::errors::{AppError, AppResult};
use crate::models::{AppSettings, NewTerm, Term, TermUpdate};
use crate::session::{Subscription, SubscriptionManager, TermsCallback};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

pub trait TermStore: Send + Sync {
    /// Pushes the whole collection now and after every change until the
    /// returned handle is dropped.
    fn subscribe(&self, callback: TermsCallback) -> Subscription;

    fn fetch_all(&self) -> AppResult<Vec<Term>>;

    /// Returns the id assigned to the new record.
    fn insert(&self, term: &NewTerm) -> AppResult<String>;

    fn update(&self, id: &str, update: &TermUpdate) -> AppResult<Term>;

    /// Deleting an unknown id succeeds.
    fn delete(&self, id: &str) -> AppResult<()>;

    fn get_settings(&self) -> AppResult<AppSettings>;

    fn update_settings(&self, update: serde_json::Value) -> AppResult<AppSettings>;

    /// Re-publishes when something outside this handle changed the
    /// collection. Returns whether a push happened.
    fn poll_external_changes(&self) -> AppResult<bool> {
        Ok(false)
    }
}

/// Registers the callback, then reads and delivers the initial snapshot, so a
/// write landing in between still reaches it. A failed read is logged and
/// delivered as an empty collection.
pub(crate) fn open_subscription(
    subscriptions: &SubscriptionManager,
    callback: TermsCallback,
    read_snapshot: impl FnOnce() -> AppResult<Vec<Term>>,
) -> Subscription {
    let subscription = subscriptions.open(callback.clone());
    match read_snapshot() {
        Ok(terms) => callback(terms),
        Err(error) => {
            tracing::error!(error = %error, "error subscribing to terms");
            callback(Vec::new());
        }
    }
    subscription
}

pub(crate) fn publish_snapshot(subscriptions: &SubscriptionManager, snapshot: AppResult<Vec<Term>>) {
    match snapshot {
        Ok(terms) => subscriptions.publish(&terms),
        Err(error) => {
            tracing::error!(error = %error, "error refreshing term subscribers");
            subscriptions.publish(&[]);
        }
    }
}

pub(crate) fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}

pub(crate) fn merged_settings(current: &AppSettings, update: serde_json::Value) -> AppResult<AppSettings> {
    let mut merged = serde_json::to_value(current)?;
    merge_json(&mut merged, update);
    let settings: AppSettings = serde_json::from_value(merged)?;
    Ok(settings)
}

/// Process-local store. Nothing survives the process; used for `--memory`
/// sessions and as the fake behind tests.
#[derive(Default)]
pub struct MemoryTermStore {
    terms: Mutex<Vec<Term>>,
    settings: Mutex<AppSettings>,
    subscriptions: SubscriptionManager,
    rejected_names: Mutex<HashSet<String>>,
    reads_failing: AtomicBool,
}

impl MemoryTermStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_terms(terms: Vec<Term>) -> Self {
        Self {
            terms: Mutex::new(terms),
            ..Self::default()
        }
    }

    /// Inserts whose trimmed name matches one of `names` fail with a store error.
    pub fn reject_inserts_named<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rejected = lock(&self.rejected_names);
        rejected.extend(names.into_iter().map(Into::into));
    }

    pub fn set_reads_failing(&self, failing: bool) {
        self.reads_failing.store(failing, Ordering::SeqCst);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.subscriber_count()
    }

    fn publish(&self) {
        publish_snapshot(&self.subscriptions, self.fetch_all());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl TermStore for MemoryTermStore {
    fn subscribe(&self, callback: TermsCallback) -> Subscription {
        open_subscription(&self.subscriptions, callback, || self.fetch_all())
    }

    fn fetch_all(&self) -> AppResult<Vec<Term>> {
        if self.reads_failing.load(Ordering::SeqCst) {
            return Err(AppError::Store("term collection unavailable".to_string()));
        }
        Ok(lock(&self.terms).clone())
    }

    fn insert(&self, term: &NewTerm) -> AppResult<String> {
        let term = term.normalized()?;
        if lock(&self.rejected_names).contains(&term.term) {
            return Err(AppError::Store(format!("insert rejected for {}", term.term)));
        }

        let id = Uuid::new_v4().to_string();
        lock(&self.terms).push(Term {
            id: id.clone(),
            term: term.term,
            definition: term.definition,
            tags: term.tags,
            created_at: Utc::now().timestamp_millis(),
        });
        self.publish();
        Ok(id)
    }

    fn update(&self, id: &str, update: &TermUpdate) -> AppResult<Term> {
        let updated = {
            let mut terms = lock(&self.terms);
            let Some(current) = terms.iter_mut().find(|term| term.id == id) else {
                return Err(AppError::NotFound(format!("term {}", id)));
            };
            let next = update.apply_to(current)?;
            *current = next.clone();
            next
        };
        self.publish();
        Ok(updated)
    }

    fn delete(&self, id: &str) -> AppResult<()> {
        let removed = {
            let mut terms = lock(&self.terms);
            let before = terms.len();
            terms.retain(|term| term.id != id);
            before != terms.len()
        };
        if removed {
            self.publish();
        }
        Ok(())
    }

    fn get_settings(&self) -> AppResult<AppSettings> {
        Ok(lock(&self.settings).clone())
    }

    fn update_settings(&self, update: serde_json::Value) -> AppResult<AppSettings> {
        let mut settings = lock(&self.settings);
        let next = merged_settings(&settings, update)?;
        *settings = next.clone();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::{open_subscription, publish_snapshot, MemoryTermStore, TermStore};
    use crate::errors::AppError;
    use crate::models::{NewTerm, TagLogic, Term, TermUpdate};
    use crate::session::{SubscriptionManager, TermsCallback};
    use std::sync::{Arc, Mutex};

    fn sample_term(name: &str) -> Term {
        Term {
            id: format!("id-{name}"),
            term: name.to_string(),
            definition: String::new(),
            tags: vec![],
            created_at: 1,
        }
    }

    #[test]
    fn insert_trims_and_assigns_identity() {
        let store = MemoryTermStore::new();
        let id = store
            .insert(&NewTerm::new("  Agent ", " acts ", vec![" ai ".to_string(), "".to_string()]))
            .expect("insert");

        let terms = store.fetch_all().expect("fetch");
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].id, id);
        assert_eq!(terms[0].term, "Agent");
        assert_eq!(terms[0].definition, "acts");
        assert_eq!(terms[0].tags, vec!["ai"]);
        assert!(terms[0].created_at > 0);
    }

    #[test]
    fn subscribers_get_initial_and_change_pushes() {
        let store = MemoryTermStore::new();
        let pushes = Arc::new(Mutex::new(Vec::new()));
        let subscription = {
            let pushes = pushes.clone();
            store.subscribe(Arc::new(move |terms| {
                pushes.lock().expect("pushes").push(terms.len());
            }))
        };

        let id = store.insert(&NewTerm::new("one", "", vec![])).expect("insert");
        store.delete(&id).expect("delete");
        drop(subscription);
        store.insert(&NewTerm::new("two", "", vec![])).expect("insert");

        assert_eq!(*pushes.lock().expect("pushes"), vec![0, 1, 0]);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn write_during_initial_read_reaches_new_subscriber() {
        let manager = SubscriptionManager::new();
        let pushes = Arc::new(Mutex::new(Vec::new()));
        let callback: TermsCallback = {
            let pushes = pushes.clone();
            Arc::new(move |terms: Vec<Term>| {
                pushes.lock().expect("pushes").push(terms.len());
            })
        };

        let _subscription = open_subscription(&manager, callback, || {
            publish_snapshot(&manager, Ok(vec![sample_term("concurrent"), sample_term("write")]));
            Ok(vec![sample_term("concurrent"), sample_term("write")])
        });
        assert_eq!(*pushes.lock().expect("pushes"), vec![2, 2]);
    }

    #[test]
    fn failed_reads_push_an_empty_collection() {
        let store = MemoryTermStore::new();
        store.insert(&NewTerm::new("one", "", vec![])).expect("insert");
        store.set_reads_failing(true);

        let pushes = Arc::new(Mutex::new(Vec::new()));
        let _subscription = {
            let pushes = pushes.clone();
            store.subscribe(Arc::new(move |terms| {
                pushes.lock().expect("pushes").push(terms.len());
            }))
        };
        assert_eq!(*pushes.lock().expect("pushes"), vec![0]);
        assert!(store.fetch_all().is_err());
    }

    #[test]
    fn delete_is_idempotent() {
        let store = MemoryTermStore::new();
        store.delete("missing").expect("delete missing");
        let id = store.insert(&NewTerm::new("one", "", vec![])).expect("insert");
        store.delete(&id).expect("delete");
        store.delete(&id).expect("delete again");
        assert!(store.fetch_all().expect("fetch").is_empty());
    }

    #[test]
    fn update_unknown_id_is_not_found() {
        let store = MemoryTermStore::new();
        let err = store
            .update("missing", &TermUpdate::default())
            .expect_err("missing id");
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn rejected_names_fail_insert() {
        let store = MemoryTermStore::new();
        store.reject_inserts_named(["Broken"]);
        let err = store
            .insert(&NewTerm::new(" Broken ", "", vec![]))
            .expect_err("rejected");
        assert!(matches!(err, AppError::Store(_)));
    }

    #[test]
    fn settings_merge_patches() {
        let store = MemoryTermStore::new();
        let settings = store
            .update_settings(serde_json::json!({ "defaultTagLogic": "and" }))
            .expect("update");
        assert_eq!(settings.default_tag_logic, TagLogic::And);
        assert!(settings.confirm_deletes);
    }
}
