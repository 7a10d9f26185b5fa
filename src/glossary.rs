use crate::config::{AppConfig, StoreBackend};
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::filter::{apply_filters, counts_for};
use crate::importer;
use crate::models::{
    AppSettings, Confirmation, FilterState, ImportStage, ImportSummary, NewTerm, ResultCounts, Term, TermUpdate,
};
use crate::store::{MemoryTermStore, TermStore};
use crate::view::GlossaryView;
use std::path::Path;
use std::sync::Arc;

/// Entry point for every user action. Owns no network or file handle beyond
/// the injected store.
#[derive(Clone)]
pub struct Glossary {
    store: Arc<dyn TermStore>,
}

impl Glossary {
    pub fn new(store: Arc<dyn TermStore>) -> Self {
        Self { store }
    }

    pub fn open(config: &AppConfig) -> AppResult<Self> {
        let store: Arc<dyn TermStore> = match config.backend() {
            StoreBackend::Sqlite => {
                let db_path = config.database_path();
                tracing::info!(path = %db_path.to_string_lossy(), "opening glossary database");
                Arc::new(Database::new(&db_path)?)
            }
            StoreBackend::Memory => {
                tracing::info!("using in-memory glossary store");
                Arc::new(MemoryTermStore::new())
            }
        };
        Ok(Self::new(store))
    }

    pub fn store(&self) -> &Arc<dyn TermStore> {
        &self.store
    }

    pub fn mount_view(&self) -> GlossaryView {
        GlossaryView::mount(self.store.as_ref())
    }

    /// One-shot read followed by the filter pipeline.
    pub fn list(&self, filters: &FilterState) -> AppResult<(Vec<Term>, ResultCounts)> {
        let terms = self.store.fetch_all()?;
        let visible = apply_filters(&terms, filters);
        let counts = counts_for(&visible, &terms);
        Ok((visible, counts))
    }

    pub fn add_term(&self, term: NewTerm) -> AppResult<String> {
        self.store.insert(&term).inspect_err(|error| {
            tracing::error!(term = %term.term, error = %error, "error adding term");
        })
    }

    pub fn update_term(&self, id: &str, update: TermUpdate) -> AppResult<Term> {
        if update.is_empty() {
            return Err(AppError::Validation("nothing to update".to_string()));
        }
        self.store.update(id, &update).inspect_err(|error| {
            tracing::error!(term_id = %id, error = %error, "error updating term");
        })
    }

    /// Destructive; the store is only called once the user has confirmed.
    pub fn delete_term(&self, id: &str, confirmation: Confirmation) -> AppResult<()> {
        if confirmation != Confirmation::Confirmed {
            return Err(AppError::ConfirmationRequired(format!("delete of term {} was not confirmed", id)));
        }
        self.store.delete(id).inspect_err(|error| {
            tracing::error!(term_id = %id, error = %error, "error deleting term");
        })
    }

    pub fn import_rows(&self, rows: &[Vec<String>]) -> AppResult<ImportSummary> {
        importer::import_rows(self.store.as_ref(), rows)
    }

    pub fn import_csv_text(&self, text: &str, on_stage: &mut dyn FnMut(ImportStage)) -> AppResult<ImportSummary> {
        importer::import_csv_text(self.store.as_ref(), text, on_stage)
    }

    /// Reads the whole file, then imports it.
    pub async fn import_csv_file(
        &self,
        path: &Path,
        on_stage: &mut dyn FnMut(ImportStage),
    ) -> AppResult<ImportSummary> {
        on_stage(ImportStage::Reading);
        let text = tokio::fs::read_to_string(path).await.map_err(|error| {
            tracing::error!(path = %path.to_string_lossy(), error = %error, "error reading import file");
            AppError::Io("Failed to read file. Please try again.".to_string())
        })?;
        self.import_csv_text(&text, on_stage)
    }

    pub fn settings(&self) -> AppResult<AppSettings> {
        self.store.get_settings()
    }

    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<AppSettings> {
        self.store.update_settings(update)
    }

    /// Filter state seeded from the persisted default tag logic.
    pub fn default_filters(&self) -> AppResult<FilterState> {
        Ok(FilterState::new(self.settings()?.default_tag_logic))
    }
}
