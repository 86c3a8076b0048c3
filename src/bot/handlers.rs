//! Обработчики команд монтажников и администраторов.

#[path = "handlers/callbacks/mod.rs"]
mod callbacks;
#[path = "handlers/commands/mod.rs"]
mod commands;
#[path = "handlers/connection_form.rs"]
mod connection_form;
#[path = "handlers/format.rs"]
mod format;
#[path = "handlers/menu.rs"]
mod menu;
#[path = "handlers/shared.rs"]
mod shared;
#[path = "handlers/state.rs"]
mod state;

pub use state::BotState;

use shared::HandlerResult;
use state::{RequestContext, Role};
use teloxide::dispatching::DpHandlerDescription;
use teloxide::dptree;
use teloxide::prelude::*;

fn is_stranger(ctx: RequestContext) -> bool {
    ctx.role == Role::Stranger
}

async fn deny_message(bot: Bot, msg: Message, ctx: RequestContext) -> HandlerResult {
    tracing::info!(user_id = ?ctx.user_id, "Access denied");
    let text = match ctx.user_id {
        Some(id) => format!(
            "⛔ Нет доступа. Передайте администратору ваш Telegram ID: {}",
            id
        ),
        None => "⛔ Нет доступа.".to_string(),
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn deny_callback(bot: Bot, q: CallbackQuery) -> HandlerResult {
    bot.answer_callback_query(q.id.clone())
        .text("Нет доступа")
        .show_alert(true)
        .await?;
    Ok(())
}

pub fn schema() -> dptree::Handler<
    'static,
    Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>,
    DpHandlerDescription,
> {
    let gate = dptree::filter(is_stranger)
        .branch(Update::filter_message().endpoint(deny_message))
        .branch(Update::filter_callback_query().endpoint(deny_callback));

    let message_handler = Update::filter_message()
        .branch(commands::handler())
        .endpoint(menu::handle_menu_buttons);

    dptree::entry()
        .map(RequestContext::from_update)
        .branch(gate)
        .branch(message_handler)
        .branch(callbacks::handler())
}
