//! run-scoped ancestry memo
//!
//! Keys are locators, values the chain starting at that locator. Entries are only ever
//! added: once a locator has a chain it keeps it for the rest of the run.
use crate::locator::{AncestorChain, Locator, LocatorKind};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct AncestryCache {
    entries: Mutex<HashMap<Locator, AncestorChain>>,
}

impl AncestryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a cache from `locator-string -> ancestry-path` entries
    ///
    /// Entries with an empty side, an unparsable key or a malformed path are skipped.
    pub fn seeded<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let cache = Self::new();
        for (item, path) in entries {
            if item.is_empty() || path.is_empty() {
                continue;
            }

            let key = match Locator::from_seed_key(item) {
                Ok(key) => key,
                Err(err) => {
                    tracing::warn!(key = item, %err, "skipping ancestry seed entry");
                    continue;
                }
            };

            let mut chain = match AncestorChain::parse_path(path) {
                Ok(chain) => chain,
                Err(err) => {
                    tracing::warn!(key = item, %err, "skipping ancestry seed entry");
                    continue;
                }
            };

            // the chain includes the key itself, unless key and path start with two
            // spellings of the same project (id and number), then the path wins
            let both_projects = key.kind() == LocatorKind::Project
                && chain
                    .first()
                    .is_some_and(|first| first.kind() == LocatorKind::Project);
            if chain.first() != Some(&key) && !both_projects {
                chain.prepend(key.clone());
            }

            cache.store(&key, &chain);
        }
        cache
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Locator, AncestorChain>> {
        // values are write-once and idempotent, a poisoned map is still consistent
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, locator: &Locator) -> Option<AncestorChain> {
        let hit = self.lock().get(locator).cloned();
        tracing::trace!(%locator, hit = hit.is_some(), "ancestry cache lookup");
        hit
    }

    /// Stores `chain` for `key` and every suffix of `chain` for the locator it starts with
    ///
    /// Existing entries are never overwritten.
    pub fn store(&self, key: &Locator, chain: &AncestorChain) {
        if chain.is_empty() {
            return;
        }

        let mut entries = self.lock();
        entries
            .entry(key.clone())
            .or_insert_with(|| chain.clone());

        for (index, locator) in chain.locators().iter().enumerate() {
            entries
                .entry(locator.clone())
                .or_insert_with(|| chain.suffix(index));
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sorted copy of all entries, as plain strings
    pub fn snapshot(&self) -> BTreeMap<String, Vec<String>> {
        self.lock()
            .iter()
            .map(|(key, chain)| (key.to_string(), chain.to_strings()))
            .collect()
    }
}
