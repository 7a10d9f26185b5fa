//! CSV bulk import with case-insensitive duplicate suppression.
//!
//! Rows are `term, definition, tags` with no header. The tags cell is itself
//! comma-delimited. Rows that are short, nameless, already present, or that
//! the store refuses are counted as skipped; the batch always runs to the end.

use crate::errors::{AppError, AppResult};
use crate::models::{split_tags, ImportStage, ImportSummary, NewTerm};
use crate::store::TermStore;
use std::collections::HashSet;

const MIN_COLUMNS: usize = 3;

pub const NO_VALID_ROWS_MESSAGE: &str = "No valid terms found in CSV. Expected format: term,definition,tags";

/// Rows that survived shape validation, plus the count of those that did not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRows {
    pub candidates: Vec<NewTerm>,
    pub invalid: usize,
}

pub fn parse_rows(rows: &[Vec<String>]) -> ParsedRows {
    let mut parsed = ParsedRows::default();
    for row in rows {
        match parse_row(row) {
            Some(candidate) => parsed.candidates.push(candidate),
            None => parsed.invalid += 1,
        }
    }
    parsed
}

fn parse_row(row: &[String]) -> Option<NewTerm> {
    if row.len() < MIN_COLUMNS {
        return None;
    }
    let term = row[0].trim();
    if term.is_empty() {
        return None;
    }
    Some(NewTerm {
        term: term.to_string(),
        definition: row[1].trim().to_string(),
        tags: split_tags(&row[2]),
    })
}

/// Reads headerless CSV text into raw records. Empty lines are skipped and
/// records may have any number of fields. A line holding only whitespace is
/// kept as a one-field record, so it counts as a skipped row.
pub fn read_csv_rows(text: &str) -> AppResult<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|error| {
            tracing::warn!(error = %error, "csv parse error");
            AppError::Csv("Failed to parse CSV file. Please check the format.".to_string())
        })?;
        if record.len() == 1 && record.get(0) == Some("") {
            continue;
        }
        rows.push(record.iter().map(ToString::to_string).collect());
    }
    Ok(rows)
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Accumulator threaded through the insert loop.
#[derive(Debug, Default)]
struct ImportLedger {
    known_names: HashSet<String>,
    summary: ImportSummary,
}

impl ImportLedger {
    fn seeded(existing: impl IntoIterator<Item = String>, invalid: usize) -> Self {
        Self {
            known_names: existing.into_iter().map(|name| name_key(&name)).collect(),
            summary: ImportSummary {
                added: 0,
                skipped: invalid,
            },
        }
    }

    fn record(mut self, store: &dyn TermStore, candidate: &NewTerm) -> Self {
        let key = name_key(&candidate.term);
        if self.known_names.contains(&key) {
            tracing::debug!(term = %candidate.term, "skipping duplicate term");
            self.summary.skipped += 1;
            return self;
        }

        match store.insert(candidate) {
            Ok(_) => {
                self.summary.added += 1;
                self.known_names.insert(key);
            }
            Err(error) => {
                tracing::warn!(term = %candidate.term, error = %error, "error adding term from csv");
                self.summary.skipped += 1;
            }
        }
        self
    }
}

/// Inserts the valid, non-duplicate rows one at a time.
///
/// The current collection is read once up front. A failure of that read is
/// returned before anything is written; insert failures only count as skipped.
pub fn import_rows(store: &dyn TermStore, rows: &[Vec<String>]) -> AppResult<ImportSummary> {
    let parsed = parse_rows(rows);
    import_candidates(store, &parsed)
}

pub fn import_candidates(store: &dyn TermStore, parsed: &ParsedRows) -> AppResult<ImportSummary> {
    let existing = store.fetch_all()?;
    let ledger = ImportLedger::seeded(existing.into_iter().map(|term| term.term), parsed.invalid);

    let ledger = parsed
        .candidates
        .iter()
        .fold(ledger, |ledger, candidate| ledger.record(store, candidate));

    tracing::info!(
        added = ledger.summary.added,
        skipped = ledger.summary.skipped,
        "term import finished"
    );
    Ok(ledger.summary)
}

/// Parses CSV text and imports it, reporting progress stages to `on_stage`.
/// Text without a single valid row is rejected before the store is touched.
pub fn import_csv_text(
    store: &dyn TermStore,
    text: &str,
    on_stage: &mut dyn FnMut(ImportStage),
) -> AppResult<ImportSummary> {
    on_stage(ImportStage::Parsing);
    let rows = read_csv_rows(text)?;
    let parsed = parse_rows(&rows);
    if parsed.candidates.is_empty() {
        return Err(AppError::Validation(NO_VALID_ROWS_MESSAGE.to_string()));
    }

    on_stage(ImportStage::Uploading {
        candidates: parsed.candidates.len(),
    });
    let summary = import_candidates(store, &parsed)?;
    on_stage(ImportStage::Complete { summary });
    Ok(summary)
}
