use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ParseMode};

use crate::subscriptions::Subscription;
use crate::utils::html_escape;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends an HTML message to the chat.
    async fn notify(&self, chat_id: i64, text: String) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[async_trait]
impl Notifier for Bot {
    async fn notify(&self, chat_id: i64, text: String) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }
}

pub fn new_chapter_message(subscription: &Subscription) -> String {
    let url_escaped = html_escape(&subscription.last_chapter_url);
    let name_escaped = html_escape(&subscription.manga_name);
    format!(
        "Here is a new chapter for <b>{}</b>\n<a href=\"{}\">{}</a>",
        name_escaped, url_escaped, url_escaped,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn message_embeds_escaped_name_and_url() {
        let now = Utc::now();
        let subscription = Subscription {
            id: Uuid::now_v7(),
            chat_id: 1,
            user_id: 1,
            user_name: "Gus".to_string(),
            manga_name: "Kaguya-sama: Love Is War <3".to_string(),
            manga_url: "https://example.com/kaguya".to_string(),
            last_chapter_url: "https://example.com/kaguya?c=281&lang=en".to_string(),
            manga_feed: 2,
            created_at: now,
            updated_at: now,
        };

        let text = new_chapter_message(&subscription);
        assert!(text.contains("Kaguya-sama: Love Is War &lt;3"));
        assert!(text.contains("https://example.com/kaguya?c=281&amp;lang=en"));
    }
}
