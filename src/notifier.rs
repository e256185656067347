use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::error;

/// C-adjacent collaborator: the chat backend the scheduler pushes
/// notifications to. Abstracted so the scheduler's tests don't need a live
/// bot token (spec.md §6).
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str, html: bool) -> bool;
}

pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(token: &str) -> Self {
        Self { bot: Bot::new(token) }
    }
}

#[async_trait]
impl ChatNotifier for TelegramNotifier {
    async fn send_message(&self, chat_id: i64, text: &str, html: bool) -> bool {
        let mut request = self.bot.send_message(ChatId(chat_id), text);
        if html {
            request = request.parse_mode(ParseMode::Html);
        }
        match request.await {
            Ok(_) => true,
            Err(e) => {
                error!(chat_id, error = %e, "failed to deliver chat message");
                false
            }
        }
    }
}

#[cfg(test)]
pub struct RecordingNotifier {
    pub sent: std::sync::Mutex<Vec<(i64, String)>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self { sent: std::sync::Mutex::new(Vec::new()) }
    }
}

#[cfg(test)]
#[async_trait]
impl ChatNotifier for RecordingNotifier {
    async fn send_message(&self, chat_id: i64, text: &str, _html: bool) -> bool {
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_notifier_captures_sent_messages() {
        let notifier = RecordingNotifier::new();
        assert!(notifier.send_message(42, "hello", false).await);
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.as_slice(), &[(42, "hello".to_string())]);
    }
}
