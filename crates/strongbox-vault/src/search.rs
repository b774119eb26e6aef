//! Entry search over a [`Tree`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::Entry;
use crate::tree::Tree;

/// Which attributes a query is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchScope {
    pub titles: bool,
    pub usernames: bool,
    pub passwords: bool,
    pub urls: bool,
    pub notes: bool,
    /// Every attribute that is not a standard key.
    pub custom_attributes: bool,
}

impl SearchScope {
    /// Every attribute, passwords included.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            titles: true,
            usernames: true,
            passwords: true,
            urls: true,
            notes: true,
            custom_attributes: true,
        }
    }

    #[must_use]
    pub const fn titles_only() -> Self {
        Self {
            titles: true,
            usernames: false,
            passwords: false,
            urls: false,
            notes: false,
            custom_attributes: false,
        }
    }
}

impl Default for SearchScope {
    /// Everything except passwords.
    fn default() -> Self {
        Self {
            passwords: false,
            ..Self::all()
        }
    }
}

/// Special filters applied on top of the text query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    /// Only entries whose non-empty password is shared with another entry.
    pub duplicate_passwords: bool,
    /// Only entries whose expiry lies at or before now.
    pub expired: bool,
}

impl SearchFilters {
    const fn any(self) -> bool {
        self.duplicate_passwords || self.expired
    }
}

/// Everything that determines a search result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchContext {
    pub query: String,
    pub scope: SearchScope,
    pub case_sensitive: bool,
    pub include_trashed: bool,
    pub filters: SearchFilters,
}

impl SearchContext {
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Whether the context can match anything at all.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.query.is_empty() || self.filters.any()
    }
}

/// Matching entries, in tree traversal order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    entries: Vec<Uuid>,
}

impl SearchResult {
    #[must_use]
    pub fn entries(&self) -> &[Uuid] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, uuid: Uuid) -> bool {
        self.entries.contains(&uuid)
    }
}

/// Run `context` against `tree`. `trash` is the active trash group, if
/// any; entries inside it are skipped unless the context includes them.
#[must_use]
pub fn search(
    tree: &Tree,
    context: &SearchContext,
    trash: Option<Uuid>,
    now: DateTime<Utc>,
) -> SearchResult {
    if !context.is_active() {
        return SearchResult::default();
    }

    let candidates: Vec<&Entry> = tree
        .all_entries()
        .into_iter()
        .filter(|e| context.include_trashed || !tree.is_trashed(e.uuid, trash))
        .collect();

    let password_counts = if context.filters.duplicate_passwords {
        count_passwords(&candidates)
    } else {
        HashMap::new()
    };

    let needle = if context.case_sensitive {
        context.query.clone()
    } else {
        context.query.to_lowercase()
    };

    let entries = candidates
        .into_iter()
        .filter(|e| {
            if context.filters.expired && !e.times.is_expired(now) {
                return false;
            }
            if context.filters.duplicate_passwords
                && password_counts.get(e.password()).copied().unwrap_or(0) < 2
            {
                return false;
            }
            needle.is_empty() || matches_query(e, &needle, context)
        })
        .map(|e| e.uuid)
        .collect();

    SearchResult { entries }
}

fn count_passwords<'a>(entries: &[&'a Entry]) -> HashMap<&'a str, usize> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for entry in entries {
        let password = entry.password();
        if !password.is_empty() {
            let count = counts.entry(password).or_insert(0);
            *count = count.saturating_add(1);
        }
    }
    counts
}

fn matches_query(entry: &Entry, needle: &str, context: &SearchContext) -> bool {
    let hit = |value: &str| {
        if context.case_sensitive {
            value.contains(needle)
        } else {
            value.to_lowercase().contains(needle)
        }
    };
    let scope = context.scope;

    (scope.titles && hit(entry.title()))
        || (scope.usernames && hit(entry.username()))
        || (scope.passwords && hit(entry.password()))
        || (scope.urls && hit(entry.url()))
        || (scope.notes && hit(entry.notes()))
        || (scope.custom_attributes && entry.custom_attributes().any(|a| hit(&a.value)))
}
