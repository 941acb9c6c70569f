use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::Notifier;
use crate::error::{RelayError, Result};
use crate::feed::Item;
use crate::sources::http::backoff_delay;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const DESCRIPTION_LIMIT: usize = 220;
const BUTTON_TEXT: &str = "🎓 Get Free Course";

#[derive(Clone)]
pub struct TelegramNotifier {
    api_base: String,
    token: String,
    chat_id: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
    backoff: Duration,
}

impl TelegramNotifier {
    pub fn new(token: String, chat_id: String) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token,
            chat_id,
            client: Client::new(),
            timeout: Duration::from_secs(15),
            max_retries: 3,
            backoff: Duration::from_secs(1),
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    /// Base delay before the second attempt; doubles on each retry.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    fn build_request(&self, item: &Item) -> (String, SendPayload) {
        let link = item.target_url.clone().unwrap_or_default();
        let reply_markup = (!link.is_empty()).then(|| InlineKeyboard::single(BUTTON_TEXT, &link));
        let caption = build_caption(item);

        match item.image_url.as_deref().filter(|u| is_http_url(u)) {
            Some(photo) => (
                self.endpoint("sendPhoto"),
                SendPayload {
                    chat_id: self.chat_id.clone(),
                    photo: Some(photo.to_string()),
                    caption: Some(caption),
                    text: None,
                    parse_mode: "HTML",
                    reply_markup,
                },
            ),
            None => {
                let text = if link.is_empty() {
                    caption
                } else {
                    format!("{caption}\n\n{}", html_escape::encode_text(&link))
                };
                (
                    self.endpoint("sendMessage"),
                    SendPayload {
                        chat_id: self.chat_id.clone(),
                        photo: None,
                        caption: None,
                        text: Some(text),
                        parse_mode: "HTML",
                        reply_markup,
                    },
                )
            }
        }
    }

    async fn send_once(&self, url: &str, payload: &SendPayload) -> std::result::Result<(), String> {
        let rsp = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e.without_url()))?;

        let status = rsp.status();
        let body: ApiResponse = rsp
            .json()
            .await
            .map_err(|e| format!("HTTP {status}, unreadable body: {}", e.without_url()))?;
        if status.is_success() && body.ok {
            Ok(())
        } else {
            Err(format!(
                "HTTP {status}, ok={}, description={}",
                body.ok,
                body.description.unwrap_or_default()
            ))
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn post(&self, item: &Item) -> Result<()> {
        let (url, payload) = self.build_request(item);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            match self.send_once(&url, &payload).await {
                Ok(()) => {
                    tracing::info!(source = %item.source_id, title = %item.display_title(), "posted");
                    return Ok(());
                }
                Err(reason) => {
                    tracing::warn!(
                        source = %item.source_id,
                        attempt,
                        max = self.max_retries,
                        %reason,
                        "telegram send attempt failed"
                    );
                    if attempt >= self.max_retries {
                        return Err(RelayError::post(&item.source_id, reason));
                    }
                    tokio::time::sleep(backoff_delay(self.backoff, attempt)).await;
                }
            }
        }
    }
}

/// HTML caption: bold title, badge line, trimmed description.
pub fn build_caption(item: &Item) -> String {
    let title = html_escape::encode_text(&item.display_title()).into_owned();

    let coupon = item.coupon_code.as_deref().unwrap_or_default();
    let badge = if item.is_free || coupon.eq_ignore_ascii_case("FREE") {
        "🆓 FREE COURSE".to_string()
    } else if !coupon.is_empty() {
        format!("🎟 Coupon: <code>{}</code>", html_escape::encode_text(coupon))
    } else {
        "⏰ LIMITED TIME".to_string()
    };

    let mut caption = format!("<b>{title}</b>\n\n{badge}");
    let desc = item.description.as_deref().map(str::trim).unwrap_or_default();
    if !desc.is_empty() {
        caption.push_str("\n\n");
        caption.push_str(&html_escape::encode_text(&truncate_chars(desc, DESCRIPTION_LIMIT)));
    }
    caption
}

fn truncate_chars(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    let mut out: String = s.chars().take(limit.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

#[derive(Debug, Serialize)]
struct SendPayload {
    chat_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboard>,
}

#[derive(Debug, Serialize)]
struct InlineKeyboard {
    inline_keyboard: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    fn single(text: &str, url: &str) -> Self {
        Self {
            inline_keyboard: vec![vec![InlineButton {
                text: text.to_string(),
                url: url.to_string(),
            }]],
        }
    }
}

#[derive(Debug, Serialize)]
struct InlineButton {
    text: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}
