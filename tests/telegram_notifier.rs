// tests/telegram_notifier.rs
//
// TelegramNotifier against an in-process fake Bot API on 127.0.0.1:0.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};

use udemy_coupon_relay::notify::{Notifier, TelegramNotifier};
use udemy_coupon_relay::Item;

#[derive(Clone, Default)]
struct FakeBot {
    /// (method, body) of every request seen.
    seen: Arc<Mutex<Vec<(String, Value)>>>,
    /// Scripted replies; once exhausted every call succeeds.
    replies: Arc<Mutex<VecDeque<(StatusCode, Value)>>>,
}

impl FakeBot {
    fn scripted(replies: Vec<(StatusCode, Value)>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            ..Self::default()
        }
    }

    fn seen(&self) -> Vec<(String, Value)> {
        self.seen.lock().unwrap().clone()
    }

    fn reply(&self, method: &str, body: Value) -> (StatusCode, Json<Value>) {
        self.seen.lock().unwrap().push((method.to_string(), body));
        let (status, payload) = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((StatusCode::OK, json!({"ok": true, "result": {}})));
        (status, Json(payload))
    }
}

async fn send_message(State(bot): State<FakeBot>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    bot.reply("sendMessage", body)
}

async fn send_photo(State(bot): State<FakeBot>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    bot.reply("sendPhoto", body)
}

async fn serve(bot: FakeBot) -> String {
    let app = Router::new()
        .route("/botTEST/sendMessage", post(send_message))
        .route("/botTEST/sendPhoto", post(send_photo))
        .with_state(bot);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn notifier(base: &str, retries: u8) -> TelegramNotifier {
    TelegramNotifier::new("TEST".into(), "@udemy_deals".into())
        .with_api_base(base)
        .with_timeout(5)
        .with_retries(retries)
        .with_backoff(Duration::from_millis(10))
}

fn course() -> Item {
    Item::new("discudemy")
        .with_slug("rust-basics")
        .with_coupon("NOV25")
        .with_title("Rust Basics")
        .with_target_url("https://www.udemy.com/course/rust-basics/?couponCode=NOV25")
}

#[tokio::test]
async fn text_item_goes_to_send_message_with_button() {
    let bot = FakeBot::default();
    let base = serve(bot.clone()).await;

    notifier(&base, 3).post(&course()).await.expect("posted");

    let seen = bot.seen();
    assert_eq!(seen.len(), 1);
    let (method, body) = &seen[0];
    assert_eq!(method, "sendMessage");
    assert_eq!(body["chat_id"], "@udemy_deals");
    assert_eq!(body["parse_mode"], "HTML");
    let text = body["text"].as_str().unwrap();
    assert!(text.starts_with("<b>Rust Basics</b>"));
    assert!(text.contains("couponCode=NOV25"));
    let button = &body["reply_markup"]["inline_keyboard"][0][0];
    assert_eq!(button["text"], "🎓 Get Free Course");
    assert_eq!(
        button["url"],
        "https://www.udemy.com/course/rust-basics/?couponCode=NOV25"
    );
}

#[tokio::test]
async fn image_item_goes_to_send_photo() {
    let bot = FakeBot::default();
    let base = serve(bot.clone()).await;

    let mut it = course();
    it.image_url = Some("https://img.example/rust.jpg".into());
    notifier(&base, 1).post(&it).await.expect("posted");

    let (method, body) = &bot.seen()[0];
    assert_eq!(method, "sendPhoto");
    assert_eq!(body["photo"], "https://img.example/rust.jpg");
    assert!(body["caption"].as_str().unwrap().contains("<code>NOV25</code>"));
    assert!(body.get("text").is_none());
}

#[tokio::test]
async fn ok_false_is_retried_then_succeeds() {
    let bot = FakeBot::scripted(vec![
        (StatusCode::OK, json!({"ok": false, "description": "flood"})),
        (StatusCode::TOO_MANY_REQUESTS, json!({"ok": false, "description": "retry later"})),
    ]);
    let base = serve(bot.clone()).await;

    notifier(&base, 3).post(&course()).await.expect("third attempt succeeds");
    assert_eq!(bot.seen().len(), 3);
}

#[tokio::test]
async fn exhausted_retries_are_a_post_error() {
    let bot = FakeBot::scripted(vec![
        (StatusCode::BAD_REQUEST, json!({"ok": false, "description": "chat not found"})),
        (StatusCode::BAD_REQUEST, json!({"ok": false, "description": "chat not found"})),
    ]);
    let base = serve(bot.clone()).await;

    let err = notifier(&base, 2).post(&course()).await.unwrap_err();
    assert_eq!(err.kind(), "post");
    assert!(err.to_string().contains("chat not found"));
    assert_eq!(bot.seen().len(), 2);
}
