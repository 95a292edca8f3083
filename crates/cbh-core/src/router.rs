//! Event classification and dispatch.
//!
//! [`classify`] is a pure function from an [`IncomingEvent`] to exactly one
//! [`Route`]. [`CommandRouter::dispatch`] runs the handler for that route.
//! The router keeps no per-event state; sessions and quota live in their
//! stores, which are injected at construction.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::{
    analysis::{AnalysisFailure, AnalysisOrchestrator, PhotoSubmission},
    domain::{ChatId, Language, MessageRef},
    errors::Error,
    formatting::markdown_to_html,
    messaging::{
        port::MessagingPort,
        types::{CallbackQuery, Command, IncomingEvent, InlineButton, InlineKeyboard},
    },
    ports::{ImageSource, QuoteSource},
    session::{SessionStore, LANGUAGE_CHOICES},
    texts, Result,
};

/// Callback payload tag for quote buttons (`price_<SYMBOL>`).
pub const QUOTE_CALLBACK_TAG: &str = "price";
const CALLBACK_DELIMITER: char = '_';
const MAX_SYMBOL_LEN: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Start,
    Help,
    ShowCommands,
    RequestQuoteMenu,
    QuoteSymbolSelected { symbol: String },
    RequestAnalysis,
    PhotoReceived,
    LanguageMenu,
    LanguageSelected { choice: String },
    UsageQuery,
    Unrecognized(Unrecognized),
}

/// Why an event did not match any handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Unrecognized {
    Command(String),
    InvalidSymbol,
    Callback,
    Text,
}

type CommandRoute = fn(&str) -> Route;

const COMMANDS: &[(&str, CommandRoute)] = &[
    ("start", |_| Route::Start),
    ("help", |_| Route::Help),
    ("commands", |_| Route::ShowCommands),
    ("price", price_route),
    ("analyze", |_| Route::RequestAnalysis),
    ("language", |_| Route::LanguageMenu),
    ("user", |_| Route::UsageQuery),
    ("usage", |_| Route::UsageQuery),
];

fn price_route(args: &str) -> Route {
    let arg = args.split_whitespace().next().unwrap_or("");
    if arg.is_empty() {
        return Route::RequestQuoteMenu;
    }
    match normalize_symbol(arg) {
        Some(symbol) => Route::QuoteSymbolSelected { symbol },
        None => Route::Unrecognized(Unrecognized::InvalidSymbol),
    }
}

/// Uppercase and validate a ticker-like symbol.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let s = raw.trim().to_uppercase();
    let ok = !s.is_empty()
        && s.len() <= MAX_SYMBOL_LEN
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
    ok.then_some(s)
}

pub fn encode_quote_callback(symbol: &str) -> String {
    format!("{QUOTE_CALLBACK_TAG}{CALLBACK_DELIMITER}{symbol}")
}

/// Decode `price_<SYMBOL>` into the symbol.
pub fn decode_quote_callback(data: &str) -> Result<String> {
    let (tag, symbol) = data
        .split_once(CALLBACK_DELIMITER)
        .ok_or_else(|| Error::Payload(format!("missing delimiter in {data:?}")))?;
    if tag != QUOTE_CALLBACK_TAG {
        return Err(Error::Payload(format!("unknown callback tag {tag:?}")));
    }
    normalize_symbol(symbol).ok_or_else(|| Error::Payload(format!("invalid symbol {symbol:?}")))
}

pub fn classify(event: &IncomingEvent) -> Route {
    match event {
        IncomingEvent::Command(Command { name, args, .. }) => COMMANDS
            .iter()
            .find(|(n, _)| *n == name.as_str())
            .map(|(_, route)| route(args))
            .unwrap_or_else(|| Route::Unrecognized(Unrecognized::Command(name.clone()))),
        IncomingEvent::Callback(CallbackQuery { data, .. }) => match decode_quote_callback(data) {
            Ok(symbol) => Route::QuoteSymbolSelected { symbol },
            Err(e) => {
                debug!(error = %e, "ignoring callback payload");
                Route::Unrecognized(Unrecognized::Callback)
            }
        },
        IncomingEvent::Photo(_) => Route::PhotoReceived,
        IncomingEvent::Text(t) => {
            // Keyboard presses arrive verbatim; anything else is free text.
            if LANGUAGE_CHOICES.iter().any(|(label, _)| *label == t.text) {
                Route::LanguageSelected {
                    choice: t.text.clone(),
                }
            } else {
                Route::Unrecognized(Unrecognized::Text)
            }
        }
    }
}

pub struct CommandRouter {
    sessions: Arc<SessionStore>,
    quotes: Option<Arc<dyn QuoteSource>>,
    analysis: Arc<AnalysisOrchestrator>,
    quote_symbols: Vec<String>,
}

impl CommandRouter {
    pub fn new(
        sessions: Arc<SessionStore>,
        quotes: Option<Arc<dyn QuoteSource>>,
        analysis: Arc<AnalysisOrchestrator>,
        quote_symbols: Vec<String>,
    ) -> Self {
        Self {
            sessions,
            quotes,
            analysis,
            quote_symbols,
        }
    }

    /// Classify and handle one event. Returns the route taken.
    ///
    /// Errors are transport failures only; every domain failure is turned
    /// into a user-facing message here.
    pub async fn dispatch(
        &self,
        event: IncomingEvent,
        messenger: &dyn MessagingPort,
        images: &dyn ImageSource,
    ) -> Result<Route> {
        let route = classify(&event);
        let origin = event.origin().clone();
        let chat_id = origin.chat_id;
        let user_id = origin.user_id;
        info!(user = %user_id, kind = event.kind(), route = ?route, "dispatching event");

        // Callbacks are always acknowledged so the client stops its spinner.
        let mut placeholder: Option<MessageRef> = None;
        if let IncomingEvent::Callback(q) = &event {
            if let Err(e) = messenger.answer_callback_query(&q.callback_id).await {
                warn!(user = %user_id, error = %e, "failed to answer callback query");
            }
            placeholder = q.message;
        }

        let lang = self.sessions.get_language(user_id).await;

        match &route {
            Route::Start => {
                messenger.send_html(chat_id, &texts::welcome(lang)).await?;
            }
            Route::Help => {
                messenger.send_html(chat_id, &texts::help(lang)).await?;
            }
            Route::ShowCommands => {
                messenger.send_html(chat_id, &texts::commands()).await?;
            }
            Route::RequestQuoteMenu => {
                let buttons = self
                    .quote_symbols
                    .iter()
                    .map(|s| InlineButton {
                        label: texts::symbol_label(s),
                        callback_data: encode_quote_callback(s),
                    })
                    .collect();
                messenger
                    .send_inline_keyboard(
                        chat_id,
                        &texts::quote_menu(lang),
                        InlineKeyboard::new(buttons),
                    )
                    .await?;
            }
            Route::QuoteSymbolSelected { symbol } => {
                self.handle_quote(messenger, chat_id, placeholder, lang, symbol)
                    .await?;
            }
            Route::RequestAnalysis => {
                messenger
                    .send_html(chat_id, &texts::analyze_prompt(lang))
                    .await?;
            }
            Route::PhotoReceived => {
                if let IncomingEvent::Photo(p) = &event {
                    let submission = PhotoSubmission {
                        user_id,
                        file_id: p.file_id.clone(),
                        file_unique_id: p.file_unique_id.clone(),
                    };
                    self.handle_photo(messenger, images, chat_id, lang, &submission)
                        .await?;
                }
            }
            Route::LanguageMenu => {
                let labels: Vec<&str> = LANGUAGE_CHOICES.iter().map(|(l, _)| *l).collect();
                messenger
                    .send_choice_keyboard(chat_id, &texts::language_menu(lang), &labels)
                    .await?;
            }
            Route::LanguageSelected { choice } => {
                let new_lang = self.sessions.set_language(user_id, choice).await;
                info!(user = %user_id, language = new_lang.code(), "language updated");
                messenger
                    .send_html(chat_id, &texts::language_set(new_lang))
                    .await?;
            }
            Route::UsageQuery => {
                let text = match self.analysis.ledger().usage(user_id).await {
                    Ok(usage) => texts::usage(lang, usage),
                    Err(e) => {
                        warn!(user = %user_id, operation = "usage_query", error = %e, "usage lookup failed");
                        texts::usage_unavailable(lang)
                    }
                };
                messenger.send_html(chat_id, &text).await?;
            }
            Route::Unrecognized(Unrecognized::Command(name)) => {
                messenger
                    .send_html(chat_id, &texts::unknown_command(lang, name))
                    .await?;
            }
            Route::Unrecognized(Unrecognized::InvalidSymbol) => {
                messenger
                    .send_html(chat_id, &texts::invalid_symbol(lang))
                    .await?;
            }
            Route::Unrecognized(Unrecognized::Callback | Unrecognized::Text) => {}
        }

        Ok(route)
    }

    async fn handle_quote(
        &self,
        messenger: &dyn MessagingPort,
        chat_id: ChatId,
        placeholder: Option<MessageRef>,
        lang: Language,
        symbol: &str,
    ) -> Result<()> {
        let fetching = texts::quote_fetching(lang, symbol);
        let placeholder = match placeholder {
            Some(msg) => match messenger.edit_html(msg, &fetching).await {
                Ok(()) => Some(msg),
                Err(_) => messenger.send_html(chat_id, &fetching).await.ok(),
            },
            None => messenger.send_html(chat_id, &fetching).await.ok(),
        };

        let text = match &self.quotes {
            None => texts::quotes_unavailable(lang),
            Some(quotes) => match quotes.fetch(symbol).await {
                Ok(q) => texts::quote(lang, &q),
                Err(e) => {
                    error!(chat = chat_id.0, symbol, operation = "fetch_quote", error = %e, "quote fetch failed");
                    texts::quote_failed(lang, e.kind())
                }
            },
        };

        replace_or_send(messenger, chat_id, placeholder, &text, None).await
    }

    async fn handle_photo(
        &self,
        messenger: &dyn MessagingPort,
        images: &dyn ImageSource,
        chat_id: ChatId,
        lang: Language,
        submission: &PhotoSubmission,
    ) -> Result<()> {
        let placeholder = messenger
            .send_html(chat_id, &texts::analyzing(lang))
            .await
            .ok();

        let report = self.analysis.analyze(submission, lang, images).await;
        let text = match &report {
            Ok(report) => markdown_to_html(report),
            Err(failure) => {
                info!(user = %submission.user_id, outcome = failure.kind(), "no report delivered");
                match failure {
                    AnalysisFailure::QuotaExceeded(_) => {
                        texts::quota_exceeded(lang, self.analysis.ledger().limit())
                    }
                    AnalysisFailure::ConfigurationMissing => texts::analysis_unavailable(lang),
                    AnalysisFailure::Upstream(e) => texts::analysis_failed(lang, e.kind()),
                }
            }
        };

        // The quota slot is already spent; the raw report is better than nothing.
        let plain = report.as_deref().ok();
        replace_or_send(messenger, chat_id, placeholder, &text, plain).await
    }
}

/// Edit the "in progress" message when there is one, else send a new message.
///
/// When `plain` is given and the HTML is rejected, it is delivered without
/// markup instead.
async fn replace_or_send(
    messenger: &dyn MessagingPort,
    chat_id: ChatId,
    placeholder: Option<MessageRef>,
    html: &str,
    plain: Option<&str>,
) -> Result<()> {
    if let Some(msg) = placeholder {
        match messenger.edit_html(msg, html).await {
            Ok(()) => return Ok(()),
            Err(e) => warn!(chat = chat_id.0, error = %e, "placeholder edit failed; sending new message"),
        }
    }
    match (messenger.send_html(chat_id, html).await, plain) {
        (Ok(_), _) => Ok(()),
        (Err(e), Some(plain)) => {
            warn!(chat = chat_id.0, error = %e, "html reply rejected; sending plain text");
            messenger.send_text(chat_id, plain).await?;
            Ok(())
        }
        (Err(e), None) => Err(e),
    }
}
