// src/sources/discudemy.rs
//! discudemy.com: listing card -> detail page -> "go" page -> Udemy link.
//! Plain HTTP only; pages that need a browser to render are skipped.

use std::collections::HashSet;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use super::http::{absolutize, parse_udemy_link, HttpFetcher};
use super::{element_text, pause, selector, AdapterOptions, DISCUDEMY};
use crate::error::{RelayError, Result};
use crate::feed::{Item, SourceFeed};

static CARD_HEADER: Lazy<Selector> = Lazy::new(|| selector("a.card-header[href]"));
static TAKE_COURSE: Lazy<Selector> = Lazy::new(|| selector("a.discBtn[href]"));
static GO_UDEMY: Lazy<Selector> =
    Lazy::new(|| selector("div.ui.segment a[href*='udemy.com/course']"));

pub struct DiscUdemyFeed {
    http: HttpFetcher,
    opts: AdapterOptions,
}

/// One card from the listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Card {
    pub detail_url: String,
    pub title: Option<String>,
}

impl DiscUdemyFeed {
    pub fn new(opts: AdapterOptions) -> Result<Self> {
        Ok(Self {
            http: HttpFetcher::new(opts.http.clone())?,
            opts,
        })
    }

    fn listing_url(&self, page: usize) -> String {
        format!("{}/all/{page}", self.opts.base())
    }

    /// Walk detail page -> go page. `Ok(None)` when the card has no usable coupon.
    async fn resolve_card(&self, card: &Card) -> Result<Option<Item>> {
        let detail = self.http.get_text(&card.detail_url).await?;
        let Some(go_link) = find_take_course(&detail, &card.detail_url) else {
            tracing::debug!(source = DISCUDEMY, url = %card.detail_url, "no take-course button");
            return Ok(None);
        };

        pause(self.opts.request_delay).await;
        let go_page = self.http.get_text(&go_link).await?;
        let Some(udemy_url) = find_udemy_link(&go_page, &go_link) else {
            tracing::debug!(source = DISCUDEMY, url = %go_link, "no udemy link on go page");
            return Ok(None);
        };
        Ok(build_item(card, &udemy_url))
    }
}

#[async_trait]
impl SourceFeed for DiscUdemyFeed {
    fn id(&self) -> &str {
        DISCUDEMY
    }

    async fn fetch(&self, page_limit: usize) -> Result<Vec<Item>> {
        let pages = page_limit.max(1);
        let mut cards = Vec::new();
        let mut seen = HashSet::new();

        // Stop at the first failed listing page; page 1 is mandatory.
        for page in 1..=pages {
            let url = self.listing_url(page);
            match self.http.get_text(&url).await {
                Ok(html) => {
                    for card in parse_listing(&html, &url, self.opts.base()) {
                        if seen.insert(card.detail_url.clone()) {
                            cards.push(card);
                        }
                    }
                }
                Err(e) if page == 1 => {
                    return Err(RelayError::fetch(DISCUDEMY, format!("listing page 1: {e}")));
                }
                Err(e) => {
                    tracing::warn!(source = DISCUDEMY, page, error = %e, "listing page failed, keeping earlier pages");
                    break;
                }
            }
        }

        // Cards without a coupon are dropped; an unreachable card could be
        // the cursor item, so it fails the whole fetch.
        let mut items = Vec::with_capacity(cards.len());
        for card in &cards {
            pause(self.opts.request_delay).await;
            let resolved = self.resolve_card(card).await.map_err(|e| {
                RelayError::fetch(DISCUDEMY, format!("card {}: {e}", card.detail_url))
            })?;
            items.extend(resolved);
        }
        tracing::debug!(source = DISCUDEMY, cards = cards.len(), items = items.len(), "scrape complete");
        Ok(items)
    }
}

/// Detail links on a listing page, in page order. Links outside the site and
/// direct `/go/` links are ignored.
pub(crate) fn parse_listing(html: &str, page_url: &str, site_base: &str) -> Vec<Card> {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    doc.select(&CARD_HEADER)
        .filter_map(|a| {
            let url = absolutize(page_url, a.value().attr("href")?)?;
            let title = Some(element_text(a)).filter(|t| !t.is_empty());
            Some(Card {
                detail_url: url,
                title,
            })
        })
        .filter(|c| c.detail_url.starts_with(site_base) && !c.detail_url.contains("/go/"))
        .filter(|c| seen.insert(c.detail_url.clone()))
        .collect()
}

pub(crate) fn find_take_course(html: &str, page_url: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let href = doc.select(&TAKE_COURSE).find_map(|a| a.value().attr("href"))?;
    absolutize(page_url, href)
}

pub(crate) fn find_udemy_link(html: &str, page_url: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let href = doc.select(&GO_UDEMY).find_map(|a| a.value().attr("href"))?;
    absolutize(page_url, href)
}

/// Items without both a slug and a coupon code are dropped.
pub(crate) fn build_item(card: &Card, udemy_url: &str) -> Option<Item> {
    let link = parse_udemy_link(udemy_url)?;
    let slug = link.slug.filter(|s| !s.is_empty())?;
    let code = link.coupon_code.filter(|c| !c.is_empty())?;

    let mut item = Item::new(DISCUDEMY).with_slug(slug).with_coupon(code);
    item.title = card.title.clone();
    item.target_url = Some(udemy_url.to_string());
    Some(item)
}
