use super::commands::{cmd_help, show_employees, show_report_targets, submit_connection_form};
use super::connection_form::FORM_TEMPLATE;
use super::shared::{HandlerResult, command_args};
use super::state::{BotState, RequestContext};
use crate::bot::keyboards::{BTN_EMPLOYEES, BTN_HELP, BTN_NEW_CONNECTION, BTN_REPORT, main_menu};
use teloxide::prelude::*;

/// Фото с подписью `/connection ...`: анкета из подписи, самое крупное фото в карточку.
async fn handle_photo_form(
    bot: &Bot,
    msg: &Message,
    state: &BotState,
    ctx: &RequestContext,
) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
    let Some(caption) = msg.caption() else {
        return Ok(false);
    };
    if !caption.trim_start().starts_with("/connection") {
        return Ok(false);
    }
    let photo = msg
        .photo()
        .and_then(|sizes| sizes.last())
        .map(|size| size.file.id.to_string());
    submit_connection_form(bot, msg.chat.id, state, ctx, command_args(caption), photo).await?;
    Ok(true)
}

pub async fn handle_menu_buttons(
    bot: Bot,
    msg: Message,
    state: BotState,
    ctx: RequestContext,
) -> HandlerResult {
    if handle_photo_form(&bot, &msg, &state, &ctx).await? {
        return Ok(());
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };

    match text {
        BTN_NEW_CONNECTION => {
            bot.send_message(msg.chat.id, FORM_TEMPLATE).await?;
        }
        BTN_REPORT => {
            show_report_targets(&bot, msg.chat.id, &state).await?;
        }
        BTN_EMPLOYEES => {
            show_employees(&bot, msg.chat.id, &state).await?;
        }
        BTN_HELP => {
            cmd_help(bot, msg.clone(), ctx).await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Не понял запрос. Используйте кнопки меню ниже.")
                .reply_markup(main_menu())
                .await?;
        }
    }
    Ok(())
}
