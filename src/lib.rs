pub mod config;
pub mod db;
pub mod errors;
pub mod filter;
pub mod glossary;
pub mod importer;
pub mod models;
pub mod session;
pub mod store;
pub mod view;

use crate::config::{AppConfig, Command, FilterArgs, SettingsCommand};
use crate::errors::{AppError, AppResult};
use crate::glossary::Glossary;
use crate::models::{split_tags, Confirmation, FilterState, ImportStage, NewTerm, ResultCounts, Term, TermUpdate};
use crate::session::channel_callback;
use std::io::Write;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

const WATCH_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

pub async fn run(config: AppConfig) -> AppResult<()> {
    let glossary = Glossary::open(&config)?;

    match config.command {
        Command::List(args) => list_terms(&glossary, &args),
        Command::Tags => list_tags(&glossary),
        Command::Letters => list_letters(&glossary),
        Command::Add {
            term,
            definition,
            tags,
        } => {
            let id = glossary.add_term(NewTerm::new(term, definition, split_tags(&tags)))?;
            println!("{}", id);
            Ok(())
        }
        Command::Edit {
            id,
            term,
            definition,
            tags,
        } => {
            let update = TermUpdate {
                term,
                definition,
                tags: tags.as_deref().map(split_tags),
            };
            let updated = glossary.update_term(&id, update)?;
            print_term(&updated);
            Ok(())
        }
        Command::Delete { id, yes } => delete_term(&glossary, &id, yes),
        Command::Import { file } => import_file(&glossary, &file).await,
        Command::Watch(args) => watch_terms(&glossary, &args).await,
        Command::Settings(SettingsCommand::Show) => {
            println!("{}", serde_json::to_string_pretty(&glossary.settings()?)?);
            Ok(())
        }
        Command::Settings(SettingsCommand::Set { patch }) => {
            let patch: serde_json::Value = serde_json::from_str(&patch)
                .map_err(|error| AppError::Validation(format!("settings patch is not JSON: {}", error)))?;
            println!("{}", serde_json::to_string_pretty(&glossary.update_settings(patch)?)?);
            Ok(())
        }
    }
}

fn list_terms(glossary: &Glossary, args: &FilterArgs) -> AppResult<()> {
    let filters = args.to_filter_state(glossary.default_filters()?)?;
    let (terms, counts) = glossary.list(&filters)?;
    print_listing(&terms, counts, args.json)
}

fn list_tags(glossary: &Glossary) -> AppResult<()> {
    let terms = glossary.store().fetch_all()?;
    for tag in filter::tag_universe(&terms) {
        println!("{}", tag);
    }
    Ok(())
}

fn list_letters(glossary: &Glossary) -> AppResult<()> {
    let terms = glossary.store().fetch_all()?;
    let line = filter::letter_index(&terms)
        .into_iter()
        .map(|slot| if slot.enabled { slot.letter.to_string() } else { "·".to_string() })
        .collect::<Vec<_>>()
        .join(" ");
    println!("{}", line);
    Ok(())
}

fn delete_term(glossary: &Glossary, id: &str, yes: bool) -> AppResult<()> {
    let terms = glossary.store().fetch_all()?;
    let Some(term) = terms.iter().find(|term| term.id == id) else {
        return Err(AppError::NotFound(format!("term {}", id)));
    };

    let confirmation = if yes || !glossary.settings()?.confirm_deletes {
        Confirmation::Confirmed
    } else {
        prompt_confirmation(&format!("Delete \"{}\"? [y/N] ", term.term))?
    };

    match glossary.delete_term(id, confirmation) {
        Ok(()) => {
            println!("Deleted \"{}\"", term.term);
            Ok(())
        }
        Err(AppError::ConfirmationRequired(_)) => {
            println!("Kept \"{}\"", term.term);
            Ok(())
        }
        Err(error) => Err(error),
    }
}

fn prompt_confirmation(question: &str) -> AppResult<Confirmation> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{}", question)?;
    stdout.flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(parse_confirmation(&answer))
}

fn parse_confirmation(answer: &str) -> Confirmation {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Confirmation::Confirmed,
        _ => Confirmation::Declined,
    }
}

async fn import_file(glossary: &Glossary, path: &Path) -> AppResult<()> {
    let mut report = |stage: ImportStage| {
        eprintln!("[{:>3}%] {}", stage.percent(), stage.label());
    };
    let summary = glossary.import_csv_file(path, &mut report).await?;

    println!("{} new terms added", summary.added);
    if summary.skipped > 0 {
        println!("{} terms skipped (duplicates or invalid)", summary.skipped);
    }
    Ok(())
}

async fn watch_terms(glossary: &Glossary, args: &FilterArgs) -> AppResult<()> {
    let filters = args.to_filter_state(glossary.default_filters()?)?;
    let (callback, mut pushes) = channel_callback();
    let subscription = glossary.store().subscribe(callback);
    tracing::info!(subscription_id = %subscription.id(), "watching glossary");

    let mut interval = tokio::time::interval(WATCH_POLL_INTERVAL);
    loop {
        tokio::select! {
            pushed = pushes.recv() => {
                let Some(terms) = pushed else {
                    break;
                };
                render_push(&terms, &filters, args.json)?;
            }
            _ = interval.tick() => {
                if let Err(error) = glossary.store().poll_external_changes() {
                    tracing::warn!(error = %error, "change poll failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    subscription.unsubscribe();
    Ok(())
}

fn render_push(terms: &[Term], filters: &FilterState, json: bool) -> AppResult<()> {
    let visible = filter::apply_filters(terms, filters);
    let counts = filter::counts_for(&visible, terms);
    if !json {
        println!("----");
    }
    print_listing(&visible, counts, json)
}

fn print_listing(terms: &[Term], counts: ResultCounts, json: bool) -> AppResult<()> {
    if json {
        let payload = serde_json::json!({ "terms": terms, "counts": counts });
        println!("{}", serde_json::to_string(&payload)?);
        return Ok(());
    }

    println!("Showing {} of {} terms", counts.shown, counts.total);
    if terms.is_empty() {
        println!("No terms match your filters");
        return Ok(());
    }
    for term in terms {
        print_term(term);
    }
    Ok(())
}

fn print_term(term: &Term) {
    println!();
    println!("{}", term.term);
    if !term.definition.is_empty() {
        println!("    {}", term.definition);
    }
    if !term.tags.is_empty() {
        println!("    [{}]", term.tags.join("] ["));
    }
    println!("    id: {}", term.id);
}

pub fn init_tracing(log_dir: &Path) -> AppResult<()> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "glossary.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::parse_confirmation;
    use crate::models::Confirmation;

    #[test]
    fn only_explicit_yes_confirms() {
        assert_eq!(parse_confirmation("y\n"), Confirmation::Confirmed);
        assert_eq!(parse_confirmation(" YES "), Confirmation::Confirmed);
        assert_eq!(parse_confirmation("\n"), Confirmation::Declined);
        assert_eq!(parse_confirmation("no"), Confirmation::Declined);
    }

    #[test]
    fn tracing_writes_into_log_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log_dir = dir.path().join("logs");
        let _ = super::init_tracing(&log_dir);
        assert!(log_dir.is_dir());
    }
}
