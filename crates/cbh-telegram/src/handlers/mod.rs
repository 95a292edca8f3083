//! Telegram update handlers.
//!
//! Each handler converts the teloxide update into a core [`IncomingEvent`]
//! and hands it to the [`CommandRouter`](cbh_core::router::CommandRouter).
//! Telegram-specific fields never leave this module.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};
use tracing::{debug, error};

use cbh_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    messaging::types::{
        self as events, Command, EventOrigin, IncomingEvent, PhotoMessage, TextMessage,
    },
};

use crate::router::AppState;

fn origin(chat: &teloxide::types::Chat, user: &teloxide::types::User) -> EventOrigin {
    EventOrigin {
        chat_id: ChatId(chat.id.0),
        user_id: UserId(user.id.0 as i64),
    }
}

/// Map a Telegram message to a core event; `None` for unsupported content.
pub fn event_from_message(msg: &Message) -> Option<IncomingEvent> {
    let user = msg.from()?;
    let origin = origin(&msg.chat, user);

    if let Some(photos) = msg.photo() {
        // Sizes are ordered smallest to largest.
        let best = photos.last()?;
        return Some(IncomingEvent::Photo(PhotoMessage {
            origin,
            file_id: best.file.id.clone(),
            file_unique_id: best.file.unique_id.clone(),
        }));
    }

    let text = msg.text()?;
    if text.trim_start().starts_with('/') {
        return Command::parse(origin, text).map(IncomingEvent::Command);
    }
    Some(IncomingEvent::Text(TextMessage {
        origin,
        text: text.to_string(),
    }))
}

pub fn event_from_callback(q: &CallbackQuery) -> Option<IncomingEvent> {
    let msg = q.message.as_ref()?;
    Some(IncomingEvent::Callback(events::CallbackQuery {
        origin: origin(&msg.chat, &q.from),
        callback_id: q.id.clone(),
        data: q.data.clone().unwrap_or_default(),
        message: Some(MessageRef {
            chat_id: ChatId(msg.chat.id.0),
            message_id: MessageId(msg.id.0),
        }),
    }))
}

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let Some(event) = event_from_callback(&q) else {
        // Nowhere to reply; just stop the client spinner.
        let _ = bot.answer_callback_query(q.id).await;
        return Ok(());
    };
    dispatch(event, &state).await;
    Ok(())
}

pub async fn handle_message(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(event) = event_from_message(&msg) else {
        debug!(chat = msg.chat.id.0, "ignoring unsupported message");
        return Ok(());
    };

    if let IncomingEvent::Photo(p) = &event {
        let _guard = state.user_locks.lock_user(p.origin.user_id).await;
        dispatch(event, &state).await;
        return Ok(());
    }

    dispatch(event, &state).await;
    Ok(())
}

async fn dispatch(event: IncomingEvent, state: &AppState) {
    let user_id = event.origin().user_id;
    let kind = event.kind();
    if let Err(e) = state
        .router
        .dispatch(event, state.messenger.as_ref(), state.images.as_ref())
        .await
    {
        error!(user = %user_id, kind, error = %e, "failed to deliver reply");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user() -> serde_json::Value {
        json!({ "id": 42, "is_bot": false, "first_name": "Ann", "username": "ann" })
    }

    fn message(extra: serde_json::Value) -> Message {
        let mut v = json!({
            "message_id": 7,
            "date": 1_700_000_000,
            "chat": { "id": 4200, "type": "private", "first_name": "Ann" },
            "from": user(),
        });
        if let (Some(obj), Some(extra)) = (v.as_object_mut(), extra.as_object()) {
            for (k, val) in extra {
                obj.insert(k.clone(), val.clone());
            }
        }
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn command_text_becomes_command_event() {
        let msg = message(json!({ "text": "/price@cbh_bot xauusd" }));
        let Some(IncomingEvent::Command(c)) = event_from_message(&msg) else {
            panic!("expected command");
        };
        assert_eq!(c.name, "price");
        assert_eq!(c.args, "xauusd");
        assert_eq!(c.origin.chat_id, ChatId(4200));
        assert_eq!(c.origin.user_id, UserId(42));
    }

    #[test]
    fn plain_text_becomes_text_event() {
        let msg = message(json!({ "text": "中文" }));
        assert_eq!(
            event_from_message(&msg),
            Some(IncomingEvent::Text(TextMessage {
                origin: EventOrigin {
                    chat_id: ChatId(4200),
                    user_id: UserId(42),
                },
                text: "中文".into(),
            }))
        );
    }

    #[test]
    fn photo_uses_largest_size() {
        let msg = message(json!({
            "caption": "H4",
            "photo": [
                { "file_id": "small", "file_unique_id": "us", "width": 90, "height": 60, "file_size": 1000 },
                { "file_id": "large", "file_unique_id": "ul", "width": 1280, "height": 853, "file_size": 90000 }
            ]
        }));
        let Some(IncomingEvent::Photo(p)) = event_from_message(&msg) else {
            panic!("expected photo");
        };
        assert_eq!(p.file_id, "large");
        assert_eq!(p.file_unique_id, "ul");
    }

    #[test]
    fn callback_keeps_button_message() {
        let q: CallbackQuery = serde_json::from_value(json!({
            "id": "cb-9",
            "from": user(),
            "chat_instance": "ci",
            "data": "price_XAUUSD",
            "message": {
                "message_id": 55,
                "date": 1_700_000_000,
                "chat": { "id": 4200, "type": "private", "first_name": "Ann" },
                "text": "Choose a symbol to quote:"
            }
        }))
        .unwrap();

        let Some(IncomingEvent::Callback(cb)) = event_from_callback(&q) else {
            panic!("expected callback");
        };
        assert_eq!(cb.callback_id, "cb-9");
        assert_eq!(cb.data, "price_XAUUSD");
        assert_eq!(
            cb.message,
            Some(MessageRef {
                chat_id: ChatId(4200),
                message_id: MessageId(55),
            })
        );
        assert_eq!(cb.origin.user_id, UserId(42));
    }
}
