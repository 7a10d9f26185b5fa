use crate::errors::{AppError, AppResult};
use crate::models::{FilterState, TagLogic};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

const DATABASE_FILE: &str = "glossary.sqlite";

#[derive(Parser, Debug)]
#[command(name = "glossary")]
#[command(about = "Searchable, filterable glossary with CSV import")]
#[command(version)]
pub struct AppConfig {
    /// Directory holding the database and logs
    #[arg(long, global = true, default_value = ".glossary", env = "GLOSSARY_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Keep terms in memory only (nothing is persisted)
    #[arg(long, global = true)]
    pub memory: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

impl AppConfig {
    pub fn backend(&self) -> StoreBackend {
        if self.memory {
            StoreBackend::Memory
        } else {
            StoreBackend::Sqlite
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the filtered term list
    List(FilterArgs),
    /// Show every tag in use
    Tags,
    /// Show which letters have terms
    Letters,
    /// Add a single term
    Add {
        term: String,
        #[arg(long, default_value = "")]
        definition: String,
        /// Comma-separated tags
        #[arg(long, default_value = "")]
        tags: String,
    },
    /// Change fields of an existing term
    Edit {
        id: String,
        #[arg(long)]
        term: Option<String>,
        #[arg(long)]
        definition: Option<String>,
        /// Comma-separated tags, replaces the current list
        #[arg(long)]
        tags: Option<String>,
    },
    /// Delete a term
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Import terms from a headerless CSV file (term,definition,tags)
    Import { file: PathBuf },
    /// Reprint the filtered list whenever the collection changes
    Watch(FilterArgs),
    /// Show or change persisted settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    Show,
    /// Merge a JSON patch, e.g. '{"defaultTagLogic":"and"}'
    Set { patch: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogicArg {
    And,
    Or,
}

impl From<LogicArg> for TagLogic {
    fn from(value: LogicArg) -> Self {
        match value {
            LogicArg::And => TagLogic::And,
            LogicArg::Or => TagLogic::Or,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Case-insensitive match against term names
    #[arg(long, default_value = "")]
    pub search: String,

    /// Tag to filter by; repeat for several
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// How selected tags combine (defaults to the persisted setting)
    #[arg(long, value_enum)]
    pub logic: Option<LogicArg>,

    /// Only terms starting with this letter
    #[arg(long)]
    pub letter: Option<char>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

impl FilterArgs {
    pub fn to_filter_state(&self, base: FilterState) -> AppResult<FilterState> {
        let mut filters = base.with_search(self.search.clone());
        if let Some(logic) = self.logic {
            filters = filters.with_logic(logic.into());
        }
        for tag in &self.tags {
            if !filters.selected_tags.contains(tag) {
                filters = filters.with_tag_toggled(tag);
            }
        }
        if let Some(letter) = self.letter {
            if !letter.is_ascii_alphabetic() {
                return Err(AppError::Validation(format!("'{}' is not a letter A-Z", letter)));
            }
            filters = filters.with_letter_toggled(letter);
        }
        Ok(filters)
    }
}
