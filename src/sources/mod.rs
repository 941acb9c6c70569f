// src/sources/mod.rs
//! Source adapters. Each one only turns a remote listing into newest-first
//! [`Item`](crate::feed::Item)s; identity and new-item logic live in `feed`.

pub mod couponscorpion;
pub mod discudemy;
pub mod http;
pub mod realdiscount;

use std::time::Duration;

use scraper::{ElementRef, Selector};

use crate::error::{RelayError, Result};
use crate::feed::SourceFeed;
use http::HttpSettings;

pub use couponscorpion::CouponScorpionFeed;
pub use discudemy::DiscUdemyFeed;
pub use realdiscount::RealDiscountFeed;

pub const REALDISCOUNT: &str = "realdiscount";
pub const COUPONSCORPION: &str = "couponscorpion";
pub const DISCUDEMY: &str = "discudemy";

/// Default priority order of a cycle.
pub const DEFAULT_ORDER: [&str; 3] = [REALDISCOUNT, COUPONSCORPION, DISCUDEMY];

/// Settings shared by all adapters.
#[derive(Debug, Clone)]
pub struct AdapterOptions {
    pub base_url: String,
    pub http: HttpSettings,
    /// Politeness delay between requests to the same site.
    pub request_delay: Duration,
    /// Treat a Udemy link without a coupon parameter as a free course when the
    /// source also signals "free". Heuristic, not a fact from the site.
    pub missing_coupon_means_free: bool,
    /// Cap on posts followed per listing page set (couponscorpion).
    pub max_posts: usize,
}

impl AdapterOptions {
    pub fn for_source(id: &str) -> Self {
        Self {
            base_url: default_base_url(id).unwrap_or_default().to_string(),
            http: HttpSettings::default(),
            request_delay: Duration::from_millis(800),
            missing_coupon_means_free: true,
            max_posts: 12,
        }
    }

    pub(crate) fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

pub fn default_base_url(id: &str) -> Option<&'static str> {
    match id {
        REALDISCOUNT => Some("https://www.real.discount"),
        COUPONSCORPION => Some("https://couponscorpion.com"),
        DISCUDEMY => Some("https://www.discudemy.com"),
        _ => None,
    }
}

pub fn is_known_source(id: &str) -> bool {
    default_base_url(id).is_some()
}

/// Build the adapter registered under `id`.
pub fn build_feed(id: &str, opts: AdapterOptions) -> Result<Box<dyn SourceFeed>> {
    let feed: Box<dyn SourceFeed> = match id {
        REALDISCOUNT => Box::new(RealDiscountFeed::new(opts)?),
        COUPONSCORPION => Box::new(CouponScorpionFeed::new(opts)?),
        DISCUDEMY => Box::new(DiscUdemyFeed::new(opts)?),
        other => return Err(RelayError::config(format!("unknown source '{other}'"))),
    };
    Ok(feed)
}

/// Compile a literal CSS selector. Only used for selectors written in this crate.
pub(crate) fn selector(css: &'static str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css}: {e:?}"))
}

pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
