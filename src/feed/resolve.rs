// src/feed/resolve.rs
//! New-item detection against a per-source cursor.
//!
//! Pages arrive newest-first and carry no ids or timestamps, so the only
//! anchor is the fingerprint of the last item we managed to post. Everything
//! above it on the current page is new. When the anchor has fallen off the
//! page (or the page was reshuffled) we cannot tell how much we missed, so only
//! a capped slice of the newest items is released.

use std::collections::HashSet;

use super::item::{Fingerprint, Item};

/// Per-source knobs for [`resolve_new_items`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvePolicy {
    /// Max items released when the cursor is not on the page.
    pub fallback_cap: usize,
    /// Max items released on the very first run. `None` = whole page.
    pub initial_limit: Option<usize>,
}

impl ResolvePolicy {
    pub const DEFAULT_FALLBACK_CAP: usize = 10;

    pub fn with_fallback_cap(cap: usize) -> Self {
        Self {
            fallback_cap: cap,
            ..Self::default()
        }
    }
}

impl Default for ResolvePolicy {
    fn default() -> Self {
        Self {
            fallback_cap: Self::DEFAULT_FALLBACK_CAP,
            initial_limit: None,
        }
    }
}

/// Which branch of the protocol produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Nothing fetched.
    Empty,
    /// No cursor stored yet for this source.
    FirstRun,
    /// Cursor found on the page at this index.
    Incremental { cursor_index: usize },
    /// Cursor not on the page; the fallback cap applied.
    CursorLost,
}

/// Locate the branch without building the result.
pub fn classify(items: &[Item], cursor: Option<&Fingerprint>) -> Resolution {
    if items.is_empty() {
        return Resolution::Empty;
    }
    let Some(cursor) = cursor else {
        return Resolution::FirstRun;
    };
    match items.iter().position(|it| &it.fingerprint() == cursor) {
        Some(cursor_index) => Resolution::Incremental { cursor_index },
        None => Resolution::CursorLost,
    }
}

/// Items to post, oldest-first.
///
/// Pure: the same input always yields the same output. Duplicate fingerprints
/// inside the released window collapse onto their newest occurrence.
pub fn resolve_new_items(
    items: &[Item],
    cursor: Option<&Fingerprint>,
    policy: &ResolvePolicy,
) -> Vec<Item> {
    resolve_with_reason(items, cursor, policy).0
}

/// Same as [`resolve_new_items`] but also reports the branch taken.
pub fn resolve_with_reason(
    items: &[Item],
    cursor: Option<&Fingerprint>,
    policy: &ResolvePolicy,
) -> (Vec<Item>, Resolution) {
    let resolution = classify(items, cursor);
    let window: &[Item] = match resolution {
        Resolution::Empty => &[],
        Resolution::FirstRun => {
            let n = policy.initial_limit.unwrap_or(items.len());
            &items[..n.min(items.len())]
        }
        Resolution::Incremental { cursor_index } => &items[..cursor_index],
        Resolution::CursorLost => &items[..policy.fallback_cap.min(items.len())],
    };

    let mut seen: HashSet<Fingerprint> = HashSet::with_capacity(window.len());
    let mut fresh: Vec<Item> = window
        .iter()
        .filter(|it| seen.insert(it.fingerprint()))
        .cloned()
        .collect();
    fresh.reverse();
    (fresh, resolution)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn it(slug: &str) -> Item {
        Item::new("src").with_slug(slug).with_coupon("C")
    }

    fn slugs(v: &[Item]) -> Vec<&str> {
        v.iter().map(|i| i.slug.as_deref().unwrap_or("")).collect()
    }

    #[test]
    fn empty_page_yields_nothing() {
        let fp = it("a").fingerprint();
        let p = ResolvePolicy::default();
        assert!(resolve_new_items(&[], None, &p).is_empty());
        assert!(resolve_new_items(&[], Some(&fp), &p).is_empty());
    }

    #[test]
    fn first_run_flushes_page_oldest_first() {
        let page = vec![it("a"), it("b"), it("c"), it("d")];
        let out = resolve_new_items(&page, None, &ResolvePolicy::default());
        assert_eq!(slugs(&out), vec!["d", "c", "b", "a"]);
    }

    #[test]
    fn first_run_respects_initial_limit() {
        let page = vec![it("a"), it("b"), it("c")];
        let p = ResolvePolicy {
            fallback_cap: 10,
            initial_limit: Some(2),
        };
        assert_eq!(slugs(&resolve_new_items(&page, None, &p)), vec!["b", "a"]);
    }

    #[test]
    fn cursor_at_top_means_nothing_new() {
        let page = vec![it("a"), it("b")];
        let fp = page[0].fingerprint();
        let (out, why) = resolve_with_reason(&page, Some(&fp), &ResolvePolicy::default());
        assert!(out.is_empty());
        assert_eq!(why, Resolution::Incremental { cursor_index: 0 });
    }

    #[test]
    fn cursor_at_bottom_releases_everything_above() {
        let page = vec![it("a"), it("b"), it("c")];
        let fp = page[2].fingerprint();
        let out = resolve_new_items(&page, Some(&fp), &ResolvePolicy::default());
        assert_eq!(slugs(&out), vec!["b", "a"]);
    }

    #[test]
    fn lost_cursor_is_capped_to_newest() {
        let page: Vec<Item> = (0..25).map(|i| it(&format!("n{i}"))).collect();
        let gone = it("gone").fingerprint();
        let (out, why) = resolve_with_reason(&page, Some(&gone), &ResolvePolicy::with_fallback_cap(3));
        assert_eq!(why, Resolution::CursorLost);
        assert_eq!(slugs(&out), vec!["n2", "n1", "n0"]);
    }

    #[test]
    fn duplicates_keep_first_occurrence_and_stop_at_first_match() {
        // a, b, a, cursor, cursor
        let page = vec![it("a"), it("b"), it("a"), it("k"), it("k")];
        let fp = it("k").fingerprint();
        let out = resolve_new_items(&page, Some(&fp), &ResolvePolicy::default());
        assert_eq!(slugs(&out), vec!["b", "a"]);
    }

    #[test]
    fn zero_cap_releases_nothing_when_lost() {
        let page = vec![it("a")];
        let gone = it("z").fingerprint();
        assert!(resolve_new_items(&page, Some(&gone), &ResolvePolicy::with_fallback_cap(0)).is_empty());
    }
}
