//! Telegram adapter (teloxide).
//!
//! Implements the `cbh-core` [`MessagingPort`] and [`ImageSource`] over the
//! Telegram Bot API and hosts the long-polling dispatcher.

use std::path::Path;

use async_trait::async_trait;

use teloxide::{
    net::Download,
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup, ParseMode},
    DownloadError, RequestError,
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use cbh_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::{AdapterError, Error},
    messaging::{port::MessagingPort, types::InlineKeyboard},
    ports::ImageSource,
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }

    fn sent(chat_id: ChatId, msg: &Message) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
            })
            .await?;
        Ok(Self::sent(chat_id, &msg))
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| self.bot.send_message(Self::tg_chat(chat_id), text.to_string()))
            .await?;
        Ok(Self::sent(chat_id, &msg))
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .edit_message_text(
                    Self::tg_chat(msg.chat_id),
                    Self::tg_msg_id(msg.message_id),
                    html.to_string(),
                )
                .parse_mode(ParseMode::Html)
        })
        .await?;
        Ok(())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
            .buttons
            .into_iter()
            .map(|b| vec![InlineKeyboardButton::callback(b.label, b.callback_data)])
            .collect();
        let markup = InlineKeyboardMarkup::new(rows);

        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
                    .reply_markup(markup.clone())
            })
            .await?;
        Ok(Self::sent(chat_id, &msg))
    }

    async fn send_choice_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        choices: &[&str],
    ) -> Result<MessageRef> {
        let rows: Vec<Vec<KeyboardButton>> = choices
            .iter()
            .map(|c| vec![KeyboardButton::new(*c)])
            .collect();
        let markup = KeyboardMarkup::new(rows);

        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
                    .reply_markup(markup.clone())
            })
            .await?;
        Ok(Self::sent(chat_id, &msg))
    }

    async fn answer_callback_query(&self, callback_id: &str) -> Result<()> {
        self.with_retry(|| self.bot.answer_callback_query(callback_id.to_string()))
            .await?;
        Ok(())
    }
}

/// Downloads photos through the Bot API file endpoint.
#[derive(Clone)]
pub struct TelegramImages {
    bot: Bot,
}

impl TelegramImages {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn request_error(e: RequestError) -> AdapterError {
    match e {
        RequestError::Network(e) => AdapterError::from_transport(e.is_timeout(), e),
        other => AdapterError::TransportFailure(other.to_string()),
    }
}

fn download_error(e: DownloadError) -> AdapterError {
    match e {
        DownloadError::Network(e) => AdapterError::from_transport(e.is_timeout(), e),
        other => AdapterError::TransportFailure(format!("download image: {other}")),
    }
}

#[async_trait]
impl ImageSource for TelegramImages {
    async fn download(&self, file_id: &str, dest: &Path) -> std::result::Result<(), AdapterError> {
        let file = self
            .bot
            .get_file(file_id.to_string())
            .await
            .map_err(request_error)?;

        let mut dst = tokio::fs::File::create(dest)
            .await
            .map_err(|e| AdapterError::TransportFailure(format!("create image file: {e}")))?;
        self.bot
            .download_file(&file.path, &mut dst)
            .await
            .map_err(download_error)?;
        Ok(())
    }
}
