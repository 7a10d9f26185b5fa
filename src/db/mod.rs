use crate::errors::{AppError, AppResult};
use crate::models::{AppSettings, NewTerm, Term, TermUpdate};
use crate::session::{Subscription, SubscriptionManager, TermsCallback};
use crate::store::{merged_settings, open_subscription, publish_snapshot, TermStore};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");

const TERM_COLUMNS: &str = "id, term, definition, tags_json, created_at";

pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    subscriptions: SubscriptionManager,
    data_version: AtomicI64,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("db_path", &self.db_path)
            .field("subscribers", &self.subscriptions.subscriber_count())
            .finish()
    }
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        let db = Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
            subscriptions: SubscriptionManager::new(),
            data_version: AtomicI64::new(0),
        };
        db.ensure_default_settings()?;
        let version = db.read_data_version()?;
        db.data_version.store(version, Ordering::SeqCst);

        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    fn get_term(&self, id: &str) -> AppResult<Option<Term>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {TERM_COLUMNS} FROM terms WHERE id = ?1"),
            [id],
            parse_term_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    fn ensure_default_settings(&self) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO settings (key, value_json, updated_at) VALUES ('app', ?1, ?2)",
            params![
                serde_json::to_string(&AppSettings::default())?,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Changes only when another connection commits to the file.
    fn read_data_version(&self) -> AppResult<i64> {
        let conn = self.conn()?;
        let version = conn.query_row("PRAGMA data_version", [], |row| row.get::<_, i64>(0))?;
        Ok(version)
    }

    fn notify_subscribers(&self) {
        publish_snapshot(&self.subscriptions, self.fetch_all());
    }
}

impl TermStore for Database {
    fn subscribe(&self, callback: TermsCallback) -> Subscription {
        open_subscription(&self.subscriptions, callback, || self.fetch_all())
    }

    fn fetch_all(&self) -> AppResult<Vec<Term>> {
        let conn = self.conn()?;
        let mut statement =
            conn.prepare(&format!("SELECT {TERM_COLUMNS} FROM terms ORDER BY created_at ASC, rowid ASC"))?;
        let terms = statement
            .query_map([], parse_term_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(terms)
    }

    fn insert(&self, term: &NewTerm) -> AppResult<String> {
        let term = term.normalized()?;
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().timestamp_millis();
        {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO terms (id, term, definition, tags_json, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    term.term,
                    term.definition,
                    serde_json::to_string(&term.tags)?,
                    created_at
                ],
            )?;
        }
        tracing::debug!(term_id = %id, term = %term.term, "term inserted");

        self.notify_subscribers();
        Ok(id)
    }

    fn update(&self, id: &str, update: &TermUpdate) -> AppResult<Term> {
        let Some(current) = self.get_term(id)? else {
            return Err(AppError::NotFound(format!("term {}", id)));
        };
        let next = update.apply_to(&current)?;
        {
            let conn = self.conn()?;
            conn.execute(
                "UPDATE terms SET term = ?1, definition = ?2, tags_json = ?3 WHERE id = ?4",
                params![next.term, next.definition, serde_json::to_string(&next.tags)?, id],
            )?;
        }

        self.notify_subscribers();
        Ok(next)
    }

    fn delete(&self, id: &str) -> AppResult<()> {
        let removed = {
            let conn = self.conn()?;
            conn.execute("DELETE FROM terms WHERE id = ?1", [id])?
        };
        if removed > 0 {
            tracing::debug!(term_id = %id, "term deleted");
            self.notify_subscribers();
        }
        Ok(())
    }

    fn get_settings(&self) -> AppResult<AppSettings> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                "SELECT value_json FROM settings WHERE key = 'app'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(serde_json::from_str::<AppSettings>(&raw).unwrap_or_default()),
            None => Ok(AppSettings::default()),
        }
    }

    fn update_settings(&self, update: serde_json::Value) -> AppResult<AppSettings> {
        let current = self.get_settings()?;
        let settings = merged_settings(&current, update)?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO settings (key, value_json, updated_at)
             VALUES ('app', ?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
            params![serde_json::to_string(&settings)?, Utc::now().to_rfc3339()],
        )?;

        Ok(settings)
    }

    fn poll_external_changes(&self) -> AppResult<bool> {
        let version = self.read_data_version()?;
        if self.data_version.swap(version, Ordering::SeqCst) == version {
            return Ok(false);
        }
        tracing::debug!(data_version = version, "external change detected");
        self.notify_subscribers();
        Ok(true)
    }
}

fn parse_term_row(row: &Row<'_>) -> rusqlite::Result<Term> {
    let tags_json: String = row.get(3)?;
    Ok(Term {
        id: row.get(0)?,
        term: row.get(1)?,
        definition: row.get(2)?,
        tags: parse_tags(&tags_json)?,
        created_at: row.get(4)?,
    })
}

fn parse_tags(raw: &str) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str::<Vec<String>>(raw).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(error))
    })
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::errors::AppError;
    use crate::models::{NewTerm, TagLogic, TermUpdate};
    use crate::store::TermStore;
    use std::sync::{Arc, Mutex};

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("glossary.db")).expect("db");
        (dir, db)
    }

    #[test]
    fn database_can_insert_and_read_term() {
        let (_dir, db) = open();
        let id = db
            .insert(&NewTerm::new(" Vector ", " a list ", vec!["math".to_string(), " ".to_string()]))
            .expect("insert term");

        let terms = db.fetch_all().expect("fetch");
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].id, id);
        assert_eq!(terms[0].term, "Vector");
        assert_eq!(terms[0].definition, "a list");
        assert_eq!(terms[0].tags, vec!["math"]);
    }

    #[test]
    fn database_rejects_blank_names() {
        let (_dir, db) = open();
        let err = db
            .insert(&NewTerm::new("  ", "", vec![]))
            .expect_err("blank name");
        assert!(matches!(err, AppError::Validation(_)));
        assert!(db.fetch_all().expect("fetch").is_empty());
    }

    #[test]
    fn terms_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("glossary.db");
        {
            let db = Database::new(&path).expect("db");
            db.insert(&NewTerm::new("Kept", "", vec![])).expect("insert");
        }
        let reopened = Database::new(&path).expect("reopen");
        let terms = reopened.fetch_all().expect("fetch");
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].term, "Kept");
    }

    #[test]
    fn update_rewrites_selected_fields() {
        let (_dir, db) = open();
        let id = db
            .insert(&NewTerm::new("Tensor", "old", vec!["math".to_string()]))
            .expect("insert");

        let updated = db
            .update(
                &id,
                &TermUpdate {
                    tags: Some(vec![" ml ".to_string(), "".to_string()]),
                    ..TermUpdate::default()
                },
            )
            .expect("update");
        assert_eq!(updated.definition, "old");
        assert_eq!(updated.tags, vec!["ml"]);

        let stored = db.fetch_all().expect("fetch");
        assert_eq!(stored[0].tags, vec!["ml"]);

        let err = db.update("missing", &TermUpdate::default()).expect_err("missing");
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn delete_pushes_to_subscribers() {
        let (_dir, db) = open();
        let id = db.insert(&NewTerm::new("Gone", "", vec![])).expect("insert");

        let pushes = Arc::new(Mutex::new(Vec::new()));
        let _subscription = {
            let pushes = pushes.clone();
            db.subscribe(Arc::new(move |terms| {
                pushes.lock().expect("pushes").push(terms.len());
            }))
        };

        db.delete(&id).expect("delete");
        db.delete(&id).expect("delete again");
        assert_eq!(*pushes.lock().expect("pushes"), vec![1, 0]);
    }

    #[test]
    fn writes_from_another_connection_are_detected() {
        let (dir, db) = open();
        assert!(!db.poll_external_changes().expect("poll"));

        let pushes = Arc::new(Mutex::new(Vec::new()));
        let _subscription = {
            let pushes = pushes.clone();
            db.subscribe(Arc::new(move |terms| {
                pushes.lock().expect("pushes").push(terms.len());
            }))
        };

        let other = Database::new(&dir.path().join("glossary.db")).expect("second handle");
        other.insert(&NewTerm::new("Remote", "", vec![])).expect("insert");

        assert!(db.poll_external_changes().expect("poll"));
        assert!(!db.poll_external_changes().expect("poll again"));
        assert_eq!(*pushes.lock().expect("pushes"), vec![0, 1]);
    }

    #[test]
    fn settings_roundtrip_through_table() {
        let (_dir, db) = open();
        assert_eq!(db.get_settings().expect("settings").default_tag_logic, TagLogic::Or);

        db.update_settings(serde_json::json!({ "defaultTagLogic": "and", "confirmDeletes": false }))
            .expect("update settings");
        let settings = db.get_settings().expect("settings");
        assert_eq!(settings.default_tag_logic, TagLogic::And);
        assert!(!settings.confirm_deletes);
    }
}
