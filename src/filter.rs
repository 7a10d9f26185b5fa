//! Filter pipeline and the derivations the navigation controls are built from.
//!
//! Everything here is a pure function of the term collection and a
//! [`FilterState`]; the input slice is never mutated.

use crate::models::{FilterState, LetterSlot, ResultCounts, TagLogic, Term};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Search, tag filter, letter filter, then a stable collated sort.
pub fn apply_filters(terms: &[Term], filters: &FilterState) -> Vec<Term> {
    let mut filtered: Vec<Term> = terms
        .iter()
        .filter(|term| matches_search(term, &filters.search))
        .filter(|term| matches_tags(term, &filters.selected_tags, filters.tag_logic))
        .filter(|term| matches_letter(term, filters.letter))
        .cloned()
        .collect();

    sort_terms(&mut filtered);
    filtered
}

pub fn matches_search(term: &Term, search: &str) -> bool {
    if search.trim().is_empty() {
        return true;
    }
    term.term.to_lowercase().contains(&search.to_lowercase())
}

pub fn matches_tags(term: &Term, selected: &BTreeSet<String>, logic: TagLogic) -> bool {
    if selected.is_empty() {
        return true;
    }
    let term_tags: HashSet<String> = term.tags.iter().map(|tag| tag.to_lowercase()).collect();
    let mut wanted = selected.iter().map(|tag| tag.to_lowercase());
    match logic {
        TagLogic::And => wanted.all(|tag| term_tags.contains(&tag)),
        TagLogic::Or => wanted.any(|tag| term_tags.contains(&tag)),
    }
}

pub fn matches_letter(term: &Term, letter: Option<char>) -> bool {
    let Some(letter) = letter else {
        return true;
    };
    initial_letter(&term.term) == Some(letter)
}

/// Upper-cased first character when it is `A`..=`Z`.
pub fn initial_letter(name: &str) -> Option<char> {
    let first = name.chars().next()?;
    let mut upper = first.to_uppercase();
    let letter = upper.next()?;
    if upper.next().is_some() || !letter.is_ascii_uppercase() {
        return None;
    }
    Some(letter)
}

/// Stable sort by name ignoring case and accents.
pub fn sort_terms(terms: &mut [Term]) {
    terms.sort_by_cached_key(|term| collation_key(&term.term));
}

pub fn compare_names(left: &str, right: &str) -> Ordering {
    collation_key(left).cmp(&collation_key(right))
}

/// Base-letter key: accents stripped, letters NFD leaves whole (`ø`, `æ`, `ß`)
/// folded to their ASCII spelling, then lower-cased.
fn collation_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len());
    for ch in name.nfd().filter(|ch| !is_combining_mark(*ch)) {
        match base_letters(ch) {
            Some(folded) => key.push_str(&folded.to_ascii_lowercase()),
            None => key.extend(ch.to_lowercase()),
        }
    }
    key
}

fn base_letters(ch: char) -> Option<&'static str> {
    if ch.is_ascii() || !ch.is_alphabetic() {
        return None;
    }
    deunicode::deunicode_char(ch)
        .filter(|folded| !folded.is_empty() && folded.bytes().all(|byte| byte.is_ascii_alphabetic()))
}

/// Distinct tags exactly as stored, in code-point order. `AI` and `ai` stay
/// separate options.
pub fn tag_universe(terms: &[Term]) -> Vec<String> {
    terms
        .iter()
        .flat_map(|term| term.tags.iter())
        .filter(|tag| !tag.trim().is_empty())
        .map(|tag| tag.as_str())
        .collect::<BTreeSet<&str>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

pub fn available_letters(terms: &[Term]) -> BTreeSet<char> {
    terms
        .iter()
        .filter_map(|term| initial_letter(&term.term))
        .collect()
}

pub fn letter_index(terms: &[Term]) -> Vec<LetterSlot> {
    let available = available_letters(terms);
    ('A'..='Z')
        .map(|letter| LetterSlot {
            letter,
            enabled: available.contains(&letter),
        })
        .collect()
}

pub fn result_counts(terms: &[Term], filters: &FilterState) -> ResultCounts {
    counts_for(&apply_filters(terms, filters), terms)
}

/// Counts for a listing that was already run through [`apply_filters`].
pub fn counts_for(visible: &[Term], terms: &[Term]) -> ResultCounts {
    ResultCounts {
        shown: visible.len(),
        total: terms.len(),
    }
}
