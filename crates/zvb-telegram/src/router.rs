use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::{info, warn};

use zvb_core::{
    bot::{AdminBot, Backends},
    config::Config,
    messaging::port::MessagingPort,
};

use crate::handlers;
use crate::TelegramMessenger;

/// Long-poll Telegram until ctrl-c, then cancel and drain background jobs.
pub async fn run_polling(cfg: Arc<Config>, backends: Backends) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot.bot_token.clone());

    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "bot started"),
        Err(e) => warn!(error = %e, "get_me failed, continuing"),
    }
    info!(
        config_dir = %cfg.paths.dir.display(),
        api = %cfg.api.base_url,
        mode = cfg.bot.mode.as_str(),
        admin_id = cfg.bot.admin_id,
        "configuration loaded"
    );

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let app = Arc::new(AdminBot::new(cfg, messenger, backends));

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![app.clone()])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    app.shutdown();
    app.wait_idle().await;
    info!("bot stopped");
    Ok(())
}
