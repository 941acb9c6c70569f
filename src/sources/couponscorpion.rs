// src/sources/couponscorpion.rs
//! couponscorpion.com: WordPress category listing, one post page per course.

use std::collections::HashSet;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use super::http::{absolutize, last_path_segment, parse_udemy_link, HttpFetcher};
use super::{element_text, pause, selector, AdapterOptions, COUPONSCORPION};
use crate::error::{RelayError, Result};
use crate::feed::{Item, SourceFeed};

const CATEGORY_PATH: &str = "/category/udemy-free-100-discount/";

static ARTICLE: Lazy<Selector> = Lazy::new(|| selector("article"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static HEADING: Lazy<Selector> = Lazy::new(|| selector("h1, h2, h3"));
static OG_IMAGE: Lazy<Selector> = Lazy::new(|| selector("meta[property='og:image']"));
static FIGURE_IMG: Lazy<Selector> = Lazy::new(|| selector("figure img[src]"));
static CONTENT: Lazy<Selector> = Lazy::new(|| selector("div.entry-content"));
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| selector("p"));
static COUPON_BUTTONS: Lazy<[Selector; 3]> = Lazy::new(|| {
    [
        selector("a.btn_offer_block[href]"),
        selector("a[href*='/scripts/udemy']"),
        selector("a[href*='udemy.com/course']"),
    ]
});
static ZERO_PRICE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$0(\.0+)?(\D|$)").unwrap_or_else(|e| panic!("zero price regex: {e}")));

pub struct CouponScorpionFeed {
    http: HttpFetcher,
    opts: AdapterOptions,
}

/// Fields scraped from one post page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PostPage {
    pub title: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub coupon_link: Option<String>,
    pub shows_zero_price: bool,
}

impl CouponScorpionFeed {
    pub fn new(opts: AdapterOptions) -> Result<Self> {
        Ok(Self {
            http: HttpFetcher::new(opts.http.clone())?,
            opts,
        })
    }

    fn listing_url(&self, page: usize) -> String {
        if page <= 1 {
            format!("{}{CATEGORY_PATH}", self.opts.base())
        } else {
            format!("{}{CATEGORY_PATH}page/{page}/", self.opts.base())
        }
    }

    async fn fetch_post(&self, post_url: &str) -> Result<Item> {
        let html = self.http.get_text(post_url).await?;
        let page = parse_post_page(&html, post_url);

        // Non-Udemy buttons are redirectors; follow once to the final target.
        let udemy_url = match page.coupon_link.as_deref() {
            Some(link) if parse_udemy_link(link).is_some() => Some(link.to_string()),
            Some(link) => {
                pause(self.opts.request_delay).await;
                match self.http.get_text_with_url(link).await {
                    Ok((_, final_url)) => Some(final_url),
                    Err(e) => {
                        tracing::warn!(source = COUPONSCORPION, %link, error = %e, "could not follow coupon link");
                        Some(link.to_string())
                    }
                }
            }
            None => {
                tracing::warn!(source = COUPONSCORPION, %post_url, "no coupon link found");
                None
            }
        };

        Ok(build_item(post_url, page, udemy_url.as_deref(), self.opts.missing_coupon_means_free))
    }
}

#[async_trait]
impl SourceFeed for CouponScorpionFeed {
    fn id(&self) -> &str {
        COUPONSCORPION
    }

    async fn fetch(&self, page_limit: usize) -> Result<Vec<Item>> {
        let pages = page_limit.max(1);
        let mut posts: Vec<String> = Vec::new();
        let mut seen = HashSet::new();

        // Stop at the first failed listing page; page 1 is mandatory.
        for page in 1..=pages {
            let url = self.listing_url(page);
            match self.http.get_text(&url).await {
                Ok(html) => {
                    for post in parse_listing(&html, &url) {
                        if seen.insert(post.clone()) {
                            posts.push(post);
                        }
                    }
                }
                Err(e) if page == 1 => {
                    return Err(RelayError::fetch(COUPONSCORPION, format!("listing page 1: {e}")));
                }
                Err(e) => {
                    tracing::warn!(source = COUPONSCORPION, page, error = %e, "listing page failed, keeping earlier pages");
                    break;
                }
            }
        }
        posts.truncate(self.opts.max_posts.max(1));
        tracing::debug!(source = COUPONSCORPION, posts = posts.len(), "listing parsed");

        // A missing post could be the cursor item, so one failure fails the fetch.
        let mut items = Vec::with_capacity(posts.len());
        for post in &posts {
            pause(self.opts.request_delay).await;
            let item = self
                .fetch_post(post)
                .await
                .map_err(|e| RelayError::fetch(COUPONSCORPION, format!("post {post}: {e}")))?;
            items.push(item);
        }
        Ok(items)
    }
}

/// Post URLs in listing order, one per `<article>`, deduplicated.
pub(crate) fn parse_listing(html: &str, page_url: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    doc.select(&ARTICLE)
        .filter_map(|article| article.select(&ANCHOR).next())
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| absolutize(page_url, href))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

pub(crate) fn parse_post_page(html: &str, post_url: &str) -> PostPage {
    let doc = Html::parse_document(html);

    let title = doc
        .select(&HEADING)
        .map(element_text)
        .find(|t| !t.is_empty());

    let image_url = doc
        .select(&OG_IMAGE)
        .filter_map(|m| m.value().attr("content"))
        .find(|c| !c.trim().is_empty())
        .or_else(|| doc.select(&FIGURE_IMG).find_map(|i| i.value().attr("src")))
        .map(|s| s.trim().to_string());

    let content = doc
        .select(&CONTENT)
        .next()
        .or_else(|| doc.select(&ARTICLE).next());

    let description = content
        .and_then(|c| c.select(&PARAGRAPH).next())
        .map(element_text)
        .filter(|t| !t.is_empty());

    let in_content = content.and_then(|c| {
        COUPON_BUTTONS
            .iter()
            .find_map(|sel| c.select(sel).find_map(|a| a.value().attr("href")))
    });
    let coupon_link = in_content
        .or_else(|| {
            doc.select(&ANCHOR).find_map(|a| {
                let href = a.value().attr("href")?;
                let text = element_text(a).to_lowercase();
                let hit = text.contains("get coupon")
                    || href.contains("/scripts/udemy")
                    || href.contains("udemy.com/course");
                hit.then_some(href)
            })
        })
        .and_then(|href| absolutize(post_url, href));

    let page_text = doc.root_element().text().collect::<String>();
    PostPage {
        title,
        image_url,
        description,
        coupon_link,
        shows_zero_price: ZERO_PRICE.is_match(&page_text),
    }
}

/// Combine a parsed post page and its resolved course link into an item.
pub(crate) fn build_item(
    post_url: &str,
    page: PostPage,
    udemy_url: Option<&str>,
    missing_coupon_means_free: bool,
) -> Item {
    let mut item = Item::new(COUPONSCORPION);
    item.title = page.title;
    item.image_url = page.image_url;
    item.description = page.description;

    if let Some(link) = udemy_url.and_then(parse_udemy_link) {
        item.slug = link.slug;
        match link.coupon_code {
            Some(code) => item.coupon_code = Some(code),
            None => {
                let looks_free = page.shows_zero_price || link.url.to_lowercase().contains("free");
                if missing_coupon_means_free && looks_free {
                    item.coupon_code = Some("FREE".to_string());
                    item.is_free = true;
                }
            }
        }
    }

    if item.slug.is_none() {
        item.slug = last_path_segment(post_url);
    }
    item.target_url = Some(udemy_url.unwrap_or(post_url).to_string());
    item
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <article class="col_item offer_grid"><a href="/development/rust-masterclass/">Rust</a></article>
          <article class="col_item"><a href="https://couponscorpion.com/it/docker-basics/">Docker</a>
             <a href="/tag/x/">tag</a></article>
          <article><span>no link</span></article>
          <article><a href="/development/rust-masterclass/">dup</a></article>
        </body></html>"#;

    const POST: &str = r#"
        <html><head><meta property="og:image" content="https://couponscorpion.com/img/rust.jpg"></head>
        <body><h1> Rust   Masterclass </h1>
          <div class="entry-content">
            <p>Learn Rust from scratch.</p>
            <p>Price: $0 today</p>
            <a class="btn_offer_block" href="/scripts/udemy/out.php?go=abc">GET COUPON CODE</a>
          </div>
        </body></html>"#;

    #[test]
    fn listing_keeps_order_and_dedups() {
        let urls = parse_listing(LISTING, "https://couponscorpion.com/category/udemy-free-100-discount/");
        assert_eq!(
            urls,
            vec![
                "https://couponscorpion.com/development/rust-masterclass/".to_string(),
                "https://couponscorpion.com/it/docker-basics/".to_string(),
            ]
        );
    }

    #[test]
    fn post_page_fields() {
        let p = parse_post_page(POST, "https://couponscorpion.com/development/rust-masterclass/");
        assert_eq!(p.title.as_deref(), Some("Rust Masterclass"));
        assert_eq!(p.image_url.as_deref(), Some("https://couponscorpion.com/img/rust.jpg"));
        assert_eq!(p.description.as_deref(), Some("Learn Rust from scratch."));
        assert_eq!(
            p.coupon_link.as_deref(),
            Some("https://couponscorpion.com/scripts/udemy/out.php?go=abc")
        );
        assert!(p.shows_zero_price);
    }

    #[test]
    fn item_with_coupon() {
        let post = "https://couponscorpion.com/development/rust-masterclass/";
        let page = parse_post_page(POST, post);
        let it = build_item(
            post,
            page,
            Some("https://www.udemy.com/course/rust-masterclass/?couponCode=SCORP"),
            true,
        );
        assert_eq!(it.fingerprint().as_str(), "couponscorpion|rust-masterclass:SCORP");
        assert!(!it.is_free);
    }

    #[test]
    fn missing_coupon_heuristic_is_configurable() {
        let post = "https://couponscorpion.com/development/rust-masterclass/";
        let link = Some("https://www.udemy.com/course/rust-masterclass/");

        let on = build_item(post, parse_post_page(POST, post), link, true);
        assert_eq!(on.coupon_code.as_deref(), Some("FREE"));
        assert!(on.is_free);

        let off = build_item(post, parse_post_page(POST, post), link, false);
        assert!(off.coupon_code.is_none());
        assert!(!off.is_free);
    }

    #[test]
    fn slug_falls_back_to_post_url() {
        let post = "https://couponscorpion.com/development/python-bootcamp/";
        let it = build_item(post, PostPage::default(), None, true);
        assert_eq!(it.slug.as_deref(), Some("python-bootcamp"));
        assert_eq!(it.target_url.as_deref(), Some(post));
        assert_eq!(it.display_title(), "Python Bootcamp");
    }
}
