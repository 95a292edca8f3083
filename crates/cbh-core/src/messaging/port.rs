use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::InlineKeyboard,
    Result,
};

/// Outbound side of the chat transport.
///
/// Text is always Telegram-flavoured HTML; callers escape user content with
/// [`crate::formatting::escape_html`].
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;

    /// Plain text, no parse mode. Used when HTML delivery is rejected.
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()>;

    /// Message with inline callback buttons.
    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    /// Message with a reply keyboard; pressing a button sends its label as text.
    async fn send_choice_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        choices: &[&str],
    ) -> Result<MessageRef>;

    async fn answer_callback_query(&self, callback_id: &str) -> Result<()>;
}
