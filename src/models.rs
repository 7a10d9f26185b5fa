use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    pub id: String,
    pub term: String,
    pub definition: String,
    pub tags: Vec<String>,
    /// Milliseconds since the Unix epoch, assigned by the store.
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewTerm {
    pub term: String,
    pub definition: String,
    pub tags: Vec<String>,
}

impl NewTerm {
    pub fn new(term: impl Into<String>, definition: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            term: term.into(),
            definition: definition.into(),
            tags,
        }
    }

    /// Applies the storage rules: trimmed name and definition, trimmed
    /// non-empty tags. Fails when the name is blank.
    pub fn normalized(&self) -> AppResult<NewTerm> {
        Ok(NewTerm {
            term: normalize_term_name(&self.term)?,
            definition: self.definition.trim().to_string(),
            tags: normalize_tags(&self.tags),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TermUpdate {
    pub term: Option<String>,
    pub definition: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl TermUpdate {
    pub fn is_empty(&self) -> bool {
        self.term.is_none() && self.definition.is_none() && self.tags.is_none()
    }

    pub fn apply_to(&self, current: &Term) -> AppResult<Term> {
        let mut next = current.clone();
        if let Some(term) = &self.term {
            next.term = normalize_term_name(term)?;
        }
        if let Some(definition) = &self.definition {
            next.definition = definition.trim().to_string();
        }
        if let Some(tags) = &self.tags {
            next.tags = normalize_tags(tags);
        }
        Ok(next)
    }
}

fn normalize_term_name(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("term name must not be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Splits a comma-delimited tag cell. Order and repeats are kept.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TagLogic {
    /// Term must carry every selected tag.
    And,
    /// Term must carry at least one selected tag.
    #[default]
    Or,
}

impl TagLogic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// Ephemeral filter inputs. Every change produces a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterState {
    pub search: String,
    pub selected_tags: BTreeSet<String>,
    pub tag_logic: TagLogic,
    pub letter: Option<char>,
}

impl FilterState {
    pub fn new(tag_logic: TagLogic) -> Self {
        Self {
            tag_logic,
            ..Self::default()
        }
    }

    pub fn with_search(&self, search: impl Into<String>) -> Self {
        Self {
            search: search.into(),
            ..self.clone()
        }
    }

    pub fn with_tag_toggled(&self, tag: &str) -> Self {
        let mut selected_tags = self.selected_tags.clone();
        if !selected_tags.remove(tag) {
            selected_tags.insert(tag.to_string());
        }
        Self {
            selected_tags,
            ..self.clone()
        }
    }

    pub fn with_logic(&self, tag_logic: TagLogic) -> Self {
        Self {
            tag_logic,
            ..self.clone()
        }
    }

    /// Selecting the current letter again clears the selection.
    pub fn with_letter_toggled(&self, letter: char) -> Self {
        let letter = letter.to_ascii_uppercase();
        let next = if self.letter == Some(letter) { None } else { Some(letter) };
        Self {
            letter: next,
            ..self.clone()
        }
    }

    pub fn cleared(&self) -> Self {
        Self::new(self.tag_logic)
    }

    pub fn is_active(&self) -> bool {
        !self.search.trim().is_empty() || !self.selected_tags.is_empty() || self.letter.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub added: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "stage")]
pub enum ImportStage {
    Reading,
    Parsing,
    Uploading { candidates: usize },
    Complete { summary: ImportSummary },
}

impl ImportStage {
    pub fn percent(&self) -> u8 {
        match self {
            Self::Reading => 10,
            Self::Parsing => 30,
            Self::Uploading { .. } => 50,
            Self::Complete { .. } => 100,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Reading => "Reading file...".to_string(),
            Self::Parsing => "Processing rows...".to_string(),
            Self::Uploading { candidates } => format!("Uploading {} terms...", candidates),
            Self::Complete { .. } => "Upload complete!".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultCounts {
    pub shown: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LetterSlot {
    pub letter: char,
    pub enabled: bool,
}

/// Explicit user consent for destructive actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppSettings {
    pub default_tag_logic: TagLogic,
    pub confirm_deletes: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            default_tag_logic: TagLogic::Or,
            confirm_deletes: true,
        }
    }
}
