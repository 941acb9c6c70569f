// src/sources/realdiscount.rs
//! real.discount exposes a JSON listing API, so only the optional offer-page
//! lookup touches HTML.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;

use super::http::{absolutize, parse_udemy_link, HttpFetcher};
use super::{pause, selector, AdapterOptions, REALDISCOUNT};
use crate::error::{RelayError, Result};
use crate::feed::{Item, SourceFeed};

static UDEMY_ANCHOR: Lazy<Selector> = Lazy::new(|| selector("a[href*='udemy.com/course']"));

pub struct RealDiscountFeed {
    http: HttpFetcher,
    opts: AdapterOptions,
}

/// One API record before the optional offer-page lookup.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ApiCourse {
    pub item: Item,
    pub offer_url: Option<String>,
}

impl RealDiscountFeed {
    pub fn new(opts: AdapterOptions) -> Result<Self> {
        Ok(Self {
            http: HttpFetcher::new(opts.http.clone())?,
            opts,
        })
    }

    fn page_url(&self, page: usize) -> String {
        format!("{}/api-web/all-courses/?page={page}", self.opts.base())
    }

    /// Follow an offer page and pick the first Udemy course link on it.
    async fn udemy_link_from_offer(&self, offer_url: &str) -> Option<String> {
        match self.http.get_text(offer_url).await {
            Ok(html) => find_udemy_anchor(&html, offer_url),
            Err(e) => {
                tracing::warn!(source = REALDISCOUNT, %offer_url, error = %e, "offer page lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl SourceFeed for RealDiscountFeed {
    fn id(&self) -> &str {
        REALDISCOUNT
    }

    async fn fetch(&self, page_limit: usize) -> Result<Vec<Item>> {
        let pages = page_limit.max(1);
        let mut courses = Vec::new();

        // Pages are newest-first: a gap would hide the newest items, so stop
        // at the first failure and fail outright if page 1 is missing.
        for page in 1..=pages {
            let url = self.page_url(page);
            match self.http.get_json::<Value>(&url).await {
                Ok(doc) => courses.extend(parse_api_page(&doc, self.opts.missing_coupon_means_free)),
                Err(e) if page == 1 => {
                    return Err(RelayError::fetch(REALDISCOUNT, format!("API page 1: {e}")));
                }
                Err(e) => {
                    tracing::warn!(source = REALDISCOUNT, page, error = %e, "API page failed, keeping earlier pages");
                    break;
                }
            }
            if page < pages {
                pause(self.opts.request_delay).await;
            }
        }

        let mut items = Vec::with_capacity(courses.len());
        for ApiCourse { mut item, offer_url } in courses {
            if item.target_url.is_none() {
                if let Some(offer) = offer_url.as_deref() {
                    let link = self.udemy_link_from_offer(offer).await;
                    if let Some(link) = link.as_deref() {
                        adopt_udemy_link(&mut item, link);
                    }
                    item.target_url = Some(link.unwrap_or_else(|| offer.to_string()));
                    pause(self.opts.request_delay).await;
                }
            }
            items.push(item);
        }
        tracing::debug!(source = REALDISCOUNT, count = items.len(), "API scrape complete");
        Ok(items)
    }
}

/// Map one API page (`{"results": [...]}` or `{"data": [...]}`) to courses.
pub(crate) fn parse_api_page(doc: &Value, missing_coupon_means_free: bool) -> Vec<ApiCourse> {
    let records = doc
        .get("results")
        .and_then(Value::as_array)
        .filter(|a| !a.is_empty())
        .or_else(|| doc.get("data").and_then(Value::as_array));
    let Some(records) = records else {
        return Vec::new();
    };
    records
        .iter()
        .filter_map(|r| parse_api_record(r, missing_coupon_means_free))
        .collect()
}

fn parse_api_record(r: &Value, missing_coupon_means_free: bool) -> Option<ApiCourse> {
    if !r.is_object() {
        return None;
    }
    let title = str_field(r, &["title", "name"]).map(|t| t.trim().to_string());
    let slug = str_field(r, &["slug", "id"]).or_else(|| {
        title
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase().replace(' ', "-"))
    });
    let is_free = r.get("price").map(is_zero_price).unwrap_or(false);
    let coupon = str_field(r, &["coupon", "couponCode"]);

    let mut item = Item::new(REALDISCOUNT);
    item.slug = slug;
    item.title = title;
    item.image_url = str_field(r, &["thumbnail", "image"]);
    item.description = str_field(r, &["description"]).map(|d| d.trim().to_string());
    item.is_free = is_free;
    item.coupon_code = match coupon {
        Some(c) => Some(c),
        None if is_free && missing_coupon_means_free => Some("FREE".to_string()),
        None => None,
    };

    let vendor = str_field(r, &["external_link", "vendor_url"]);
    if let Some(link) = vendor.as_deref() {
        adopt_udemy_link(&mut item, link);
    }
    item.target_url = vendor;

    Some(ApiCourse {
        item,
        offer_url: str_field(r, &["offer_url", "url"]),
    })
}

/// Fill a missing coupon from the course link's query string.
fn adopt_udemy_link(item: &mut Item, link: &str) {
    if item.coupon_code.is_some() {
        return;
    }
    if let Some(code) = parse_udemy_link(link).and_then(|l| l.coupon_code) {
        item.coupon_code = Some(code);
    }
}

pub(crate) fn find_udemy_anchor(html: &str, page_url: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let href = doc
        .select(&UDEMY_ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .next()?;
    absolutize(page_url, href)
}

/// First non-empty string (or number rendered as string) among `keys`.
fn str_field(v: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match v.get(*k)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn is_zero_price(v: &Value) -> bool {
    match v {
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.trim().trim_start_matches('$').parse::<f64>().ok() == Some(0.0),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_api_records_in_order() {
        let doc = json!({
            "results": [
                {"title": " Python Pro ", "slug": "python-pro", "thumbnail": "https://i/1.jpg",
                 "external_link": "https://www.udemy.com/course/python-pro/?couponCode=PY1",
                 "price": 12.99},
                {"name": "Free Thing", "id": 42, "price": 0, "offer_url": "https://www.real.discount/offer/42"},
                "garbage"
            ]
        });
        let out = parse_api_page(&doc, true);
        assert_eq!(out.len(), 2);

        let first = &out[0].item;
        assert_eq!(first.title.as_deref(), Some("Python Pro"));
        assert_eq!(first.coupon_code.as_deref(), Some("PY1"));
        assert_eq!(first.fingerprint().as_str(), "realdiscount|python-pro:PY1");
        assert!(out[0].offer_url.is_none());

        let second = &out[1];
        assert_eq!(second.item.slug.as_deref(), Some("42"));
        assert!(second.item.is_free);
        assert_eq!(second.item.coupon_code.as_deref(), Some("FREE"));
        assert!(second.item.target_url.is_none());
        assert_eq!(second.offer_url.as_deref(), Some("https://www.real.discount/offer/42"));
    }

    #[test]
    fn free_heuristic_can_be_disabled() {
        let doc = json!({"data": [{"title": "Zero Cost", "price": "0"}]});
        let out = parse_api_page(&doc, false);
        assert_eq!(out[0].item.slug.as_deref(), Some("zero-cost"));
        assert!(out[0].item.is_free);
        assert!(out[0].item.coupon_code.is_none());
    }

    #[test]
    fn unknown_shape_is_empty() {
        assert!(parse_api_page(&json!({"count": 0}), true).is_empty());
    }

    #[test]
    fn offer_page_anchor() {
        let html = r#"<html><body><a href="/x">x</a>
            <a class="btn" href="https://www.udemy.com/course/go-deep/?couponCode=G0">Get</a></body></html>"#;
        assert_eq!(
            find_udemy_anchor(html, "https://www.real.discount/offer/1").as_deref(),
            Some("https://www.udemy.com/course/go-deep/?couponCode=G0")
        );
        assert!(find_udemy_anchor("<p>none</p>", "https://www.real.discount/").is_none());
    }
}
