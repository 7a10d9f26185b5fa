use crate::filter::{apply_filters, available_letters, letter_index, result_counts, tag_universe};
use crate::models::{FilterState, LetterSlot, ResultCounts, Term};
use crate::session::Subscription;
use crate::store::TermStore;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// The term collection as last pushed by the store, plus everything the
/// navigation controls derive from it. Dropping the view unsubscribes.
pub struct GlossaryView {
    terms: Arc<Mutex<Vec<Term>>>,
    subscription: Subscription,
}

impl GlossaryView {
    pub fn mount(store: &dyn TermStore) -> Self {
        let terms = Arc::new(Mutex::new(Vec::new()));
        let subscription = {
            let terms = terms.clone();
            store.subscribe(Arc::new(move |pushed: Vec<Term>| {
                *lock_terms(&terms) = pushed;
            }))
        };
        tracing::debug!(subscription_id = %subscription.id(), "glossary view mounted");
        Self { terms, subscription }
    }

    pub fn unmount(self) {
        tracing::debug!(subscription_id = %self.subscription.id(), "glossary view unmounted");
    }

    pub fn terms(&self) -> Vec<Term> {
        lock_terms(&self.terms).clone()
    }

    pub fn visible(&self, filters: &FilterState) -> Vec<Term> {
        apply_filters(&lock_terms(&self.terms), filters)
    }

    pub fn tag_universe(&self) -> Vec<String> {
        tag_universe(&lock_terms(&self.terms))
    }

    pub fn available_letters(&self) -> BTreeSet<char> {
        available_letters(&lock_terms(&self.terms))
    }

    pub fn letter_index(&self) -> Vec<LetterSlot> {
        letter_index(&lock_terms(&self.terms))
    }

    pub fn counts(&self, filters: &FilterState) -> ResultCounts {
        result_counts(&lock_terms(&self.terms), filters)
    }
}

fn lock_terms(terms: &Mutex<Vec<Term>>) -> MutexGuard<'_, Vec<Term>> {
    match terms.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::GlossaryView;
    use crate::models::{FilterState, NewTerm, TagLogic};
    use crate::store::{MemoryTermStore, TermStore};

    #[test]
    fn view_tracks_store_changes() {
        let store = MemoryTermStore::new();
        let view = GlossaryView::mount(&store);
        assert!(view.terms().is_empty());

        let id = store
            .insert(&NewTerm::new("Agent", "", vec!["ai".to_string()]))
            .expect("insert");
        store.insert(&NewTerm::new("Bias", "", vec!["AI".to_string()])).expect("insert");
        assert_eq!(view.terms().len(), 2);
        assert_eq!(view.tag_universe(), vec!["AI", "ai"]);

        let filters = FilterState::new(TagLogic::Or).with_tag_toggled("ai");
        assert_eq!(view.visible(&filters).len(), 2);

        store.delete(&id).expect("delete");
        let visible = view.visible(&filters);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].term, "Bias");
        assert_eq!(view.counts(&filters).total, 1);
    }

    #[test]
    fn dropping_the_view_releases_the_subscription() {
        let store = MemoryTermStore::new();
        let view = GlossaryView::mount(&store);
        assert_eq!(store.subscriber_count(), 1);
        view.unmount();
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn letters_follow_the_collection() {
        let store = MemoryTermStore::new();
        let view = GlossaryView::mount(&store);
        store.insert(&NewTerm::new("zeta", "", vec![])).expect("insert");
        store.insert(&NewTerm::new("#hash", "", vec![])).expect("insert");

        assert_eq!(view.available_letters().into_iter().collect::<Vec<_>>(), vec!['Z']);
        let enabled: Vec<char> = view
            .letter_index()
            .into_iter()
            .filter(|slot| slot.enabled)
            .map(|slot| slot.letter)
            .collect();
        assert_eq!(enabled, vec!['Z']);
    }
}
