//! In-memory prefix index over company names.
//!
//! Derived from the company catalog: rebuilt on startup, extended on onboarding,
//! pruned on deletion. Never authoritative.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use divscan_core::normalize_name;

use crate::DividendError;

#[derive(Debug, Default)]
struct TrieNode {
    children: BTreeMap<char, TrieNode>,
    /// Display name of the entry whose normalized form ends here.
    terminal: Option<String>,
}

impl TrieNode {
    fn collect(&self, limit: usize, out: &mut Vec<String>) {
        if out.len() >= limit {
            return;
        }
        if let Some(name) = &self.terminal {
            out.push(name.clone());
        }
        for child in self.children.values() {
            if out.len() >= limit {
                return;
            }
            child.collect(limit, out);
        }
    }

    /// Returns true when the entry was found and removed.
    fn remove(&mut self, key: &[char]) -> bool {
        let Some((first, rest)) = key.split_first() else {
            return self.terminal.take().is_some();
        };
        let Some(child) = self.children.get_mut(first) else {
            return false;
        };
        let removed = child.remove(rest);
        if removed && child.terminal.is_none() && child.children.is_empty() {
            self.children.remove(first);
        }
        removed
    }
}

/// Character trie keyed on normalized names. Child maps are ordered, so matches
/// come out in lexicographic order of their normalized form.
#[derive(Debug, Default)]
pub struct Trie {
    root: TrieNode,
    len: usize,
}

impl Trie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `name`; returns false when its normalized form is empty or already present.
    pub fn insert(&mut self, name: &str) -> bool {
        let key = normalize_name(name);
        if key.is_empty() {
            return false;
        }
        let mut node = &mut self.root;
        for ch in key.chars() {
            node = node.children.entry(ch).or_default();
        }
        if node.terminal.is_some() {
            return false;
        }
        node.terminal = Some(name.trim().to_string());
        self.len += 1;
        true
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let key = normalize_name(name).chars().collect::<Vec<_>>();
        if key.is_empty() {
            return false;
        }
        let removed = self.root.remove(&key);
        if removed {
            self.len -= 1;
        }
        removed
    }

    /// Up to `limit` names under an already-normalized prefix.
    pub fn matches(&self, normalized_prefix: &str, limit: usize) -> Vec<String> {
        let mut node = &self.root;
        for ch in normalized_prefix.chars() {
            match node.children.get(&ch) {
                Some(child) => node = child,
                None => return Vec::new(),
            }
        }
        let mut out = Vec::new();
        node.collect(limit, &mut out);
        out
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Thread-safe autocomplete index. Rebuilds construct a fresh trie and swap it in,
/// so readers see either the previous or the new contents.
#[derive(Debug, Default)]
pub struct AutocompleteIndex {
    trie: RwLock<Trie>,
}

impl AutocompleteIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Trie> {
        self.trie.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Trie> {
        self.trie.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, name: &str) -> bool {
        self.write().insert(name)
    }

    pub fn remove(&self, name: &str) -> bool {
        self.write().remove(name)
    }

    pub fn query(&self, prefix: &str, limit: usize) -> Result<Vec<String>, DividendError> {
        let prefix = normalize_name(prefix);
        if prefix.is_empty() {
            return Err(DividendError::InvalidArgument(
                "autocomplete prefix must not be empty".to_string(),
            ));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }
        Ok(self.read().matches(&prefix, limit))
    }

    /// Replace the whole index with `names`; returns the number of distinct entries.
    pub fn rebuild<I, S>(&self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut fresh = Trie::new();
        for name in names {
            fresh.insert(name.as_ref());
        }
        let len = fresh.len();
        *self.write() = fresh;
        len
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(names: &[&str]) -> AutocompleteIndex {
        let index = AutocompleteIndex::new();
        index.rebuild(names.iter().copied());
        index
    }

    #[test]
    fn prefix_query_is_case_and_whitespace_insensitive() {
        let index = index_with(&["Coca-Cola", "Colgate-Palmolive", "Costco Wholesale", "PepsiCo"]);
        assert_eq!(index.query("co", 10).unwrap(), vec!["Coca-Cola", "Colgate-Palmolive", "Costco Wholesale"]);
        assert_eq!(index.query("  COSTCO   W", 10).unwrap(), vec!["Costco Wholesale"]);
        assert!(index.query("xyz", 10).unwrap().is_empty());
    }

    #[test]
    fn every_prefix_of_an_inserted_name_finds_it() {
        let names = ["Apple Inc", "Applied Materials", "AbbVie", "Coca-Cola", "Caterpillar"];
        let index = index_with(&names);
        for name in names {
            let normalized = normalize_name(name);
            for end in 1..=normalized.chars().count() {
                let prefix = normalized.chars().take(end).collect::<String>();
                let hits = index.query(&prefix, names.len()).unwrap();
                assert!(hits.iter().any(|h| h == name), "{prefix:?} did not find {name}");
            }
        }
    }

    #[test]
    fn results_are_lexicographic_bounded_and_repeatable() {
        let index = index_with(&["Abc Two", "abc", "Abc One", "Abd"]);
        let first = index.query("ab", 3).unwrap();
        assert_eq!(first, vec!["abc", "Abc One", "Abc Two"]);
        assert_eq!(index.query("ab", 3).unwrap(), first);
        assert_eq!(index.query("ab", 1).unwrap(), vec!["abc"]);
        assert!(index.query("ab", 0).unwrap().is_empty());
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let index = index_with(&["Coca-Cola"]);
        assert!(matches!(index.query("", 5), Err(DividendError::InvalidArgument(_))));
        assert!(matches!(index.query("   ", 5), Err(DividendError::InvalidArgument(_))));
    }

    #[test]
    fn reinserting_a_name_is_a_no_op() {
        let index = AutocompleteIndex::new();
        assert!(index.insert("Coca-Cola"));
        assert!(!index.insert("  coca-cola "));
        assert!(!index.insert("   "));
        assert_eq!(index.len(), 1);
        assert_eq!(index.query("coca", 10).unwrap(), vec!["Coca-Cola"]);
    }

    #[test]
    fn remove_prunes_only_the_named_entry() {
        let index = index_with(&["Coca", "Coca-Cola"]);
        assert!(index.remove("COCA-COLA"));
        assert!(!index.remove("Coca-Cola"));
        assert_eq!(index.query("coca", 10).unwrap(), vec!["Coca"]);
        assert!(index.remove("coca"));
        assert!(index.is_empty());
        assert!(index.query("c", 10).unwrap().is_empty());
    }

    #[test]
    fn rebuild_discards_previous_entries() {
        let index = index_with(&["Coca-Cola", "PepsiCo"]);
        assert_eq!(index.rebuild(["Apple", "apple", "Microsoft"]), 2);
        assert!(index.query("coca", 10).unwrap().is_empty());
        assert_eq!(index.query("a", 10).unwrap(), vec!["Apple"]);
    }
}
