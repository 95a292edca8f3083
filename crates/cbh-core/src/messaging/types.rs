use crate::domain::{ChatId, MessageRef, UserId};

/// Who sent an event and where to reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventOrigin {
    pub chat_id: ChatId,
    pub user_id: UserId,
}

/// Transport-agnostic incoming event.
///
/// Telegram-specific fields stay in the Telegram adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IncomingEvent {
    Command(Command),
    Callback(CallbackQuery),
    Photo(PhotoMessage),
    Text(TextMessage),
}

impl IncomingEvent {
    pub fn origin(&self) -> &EventOrigin {
        match self {
            IncomingEvent::Command(c) => &c.origin,
            IncomingEvent::Callback(c) => &c.origin,
            IncomingEvent::Photo(p) => &p.origin,
            IncomingEvent::Text(t) => &t.origin,
        }
    }

    /// Short tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            IncomingEvent::Command(_) => "command",
            IncomingEvent::Callback(_) => "callback",
            IncomingEvent::Photo(_) => "photo",
            IncomingEvent::Text(_) => "text",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub origin: EventOrigin,
    /// Lowercased command name without the leading `/` or `@botname`.
    pub name: String,
    pub args: String,
}

impl Command {
    /// Parse `/cmd@botname arg1 ...`; returns `None` for non-command text.
    pub fn parse(origin: EventOrigin, text: &str) -> Option<Self> {
        let text = text.trim();
        if !text.starts_with('/') {
            return None;
        }
        let mut parts = text.splitn(2, char::is_whitespace);
        let first = parts.next().unwrap_or("");
        let args = parts.next().unwrap_or("").trim().to_string();

        let name = first
            .trim_start_matches('/')
            .split('@')
            .next()
            .unwrap_or("")
            .to_lowercase();

        Some(Self { origin, name, args })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackQuery {
    pub origin: EventOrigin,
    pub callback_id: String,
    pub data: String,
    /// Message carrying the pressed button (edited in place when present).
    pub message: Option<MessageRef>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhotoMessage {
    pub origin: EventOrigin,
    /// Largest available size; used to download.
    pub file_id: String,
    /// Stable across bots and re-uploads; used to name transient files.
    pub file_unique_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMessage {
    pub origin: EventOrigin,
    pub text: String,
}

/// Inline keyboard (callback buttons), one button per row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    pub fn new(buttons: Vec<InlineButton>) -> Self {
        Self { buttons }
    }
}
