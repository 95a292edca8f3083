//! Core domain + application logic for the CBH trading assistant bot.
//!
//! This crate is framework-agnostic. Telegram, OpenAI, FMP and Supabase
//! live behind ports (traits) implemented in adapter crates.

pub mod analysis;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod ports;
pub mod prompts;
pub mod quota;
pub mod router;
pub mod session;
pub mod texts;
pub mod utils;

pub use errors::{Error, Result};
