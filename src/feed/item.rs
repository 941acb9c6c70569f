// src/feed/item.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of one coupon offer: `source|slug:coupon`.
///
/// Only the source id, course slug and coupon code take part. Titles and
/// descriptions are regenerated by the aggregators between polls and must not
/// change identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an already-derived fingerprint string (e.g. read back from disk).
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive a fingerprint. Missing parts become empty strings.
pub fn fingerprint(source_id: &str, slug: Option<&str>, coupon_code: Option<&str>) -> Fingerprint {
    Fingerprint(format!(
        "{}|{}:{}",
        source_id,
        slug.unwrap_or_default(),
        coupon_code.unwrap_or_default()
    ))
}

/// One scraped course offer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub source_id: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
    /// Set by the source's free-course heuristic; display only.
    #[serde(default)]
    pub is_free: bool,
}

impl Item {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            ..Self::default()
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn with_coupon(mut self, code: impl Into<String>) -> Self {
        self.coupon_code = Some(code.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = Some(url.into());
        self
    }

    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint(
            &self.source_id,
            self.slug.as_deref(),
            self.coupon_code.as_deref(),
        )
    }

    /// Title for display, falling back to the slug in title case.
    pub fn display_title(&self) -> String {
        if let Some(t) = self.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            return t.to_string();
        }
        match self.slug.as_deref() {
            Some(slug) if !slug.is_empty() => title_case_slug(slug),
            _ => "Untitled Course".to_string(),
        }
    }
}

/// `learn-rust-fast` -> `Learn Rust Fast`
pub fn title_case_slug(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
