use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use cbh_core::{
    config::Config, domain::UserId, messaging::port::MessagingPort, ports::ImageSource,
    router::CommandRouter,
};

use crate::handlers;
use crate::{TelegramImages, TelegramMessenger};

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<CommandRouter>,
    pub messenger: Arc<dyn MessagingPort>,
    pub images: Arc<dyn ImageSource>,
    pub user_locks: Arc<UserLocks>,
}

/// One async lock per user.
///
/// Photo analysis for the same user runs one at a time so the quota gate and
/// the placeholder edits of two uploads never interleave.
#[derive(Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub async fn lock_user(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(user_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub async fn run_polling(cfg: Arc<Config>, router: Arc<CommandRouter>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "bot started"),
        Err(e) => warn!(error = %e, "get_me failed; continuing with polling"),
    }

    let state = Arc::new(AppState {
        router,
        messenger: Arc::new(TelegramMessenger::new(bot.clone())),
        images: Arc::new(TelegramImages::new(bot.clone())),
        user_locks: Arc::new(UserLocks::default()),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    info!("dispatcher stopped");
    Ok(())
}
