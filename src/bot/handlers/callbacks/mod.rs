use super::format::render_ledger_error;
use super::shared::{
    HandlerResult, ReportTarget, callback_message_target, callback_prefix_filter, parse_callback_id,
    require_admin_callback, send_report,
};
use super::state::{BotState, RequestContext};
use crate::bot::keyboards::{REPORT_PERIODS, report_period_keyboard};
use crate::db::ReportPeriod;
use anyhow::anyhow;
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::InlineKeyboardMarkup;

pub fn handler() -> teloxide::dispatching::UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    Update::filter_callback_query()
        .branch(dptree::filter_map(callback_prefix_filter("rep:")).endpoint(callback_report_target))
        .branch(dptree::filter_map(callback_prefix_filter("period:")).endpoint(callback_report_period))
        .branch(
            dptree::filter_map(callback_prefix_filter("emp_delete:")).endpoint(callback_delete_employee),
        )
        .branch(
            dptree::filter_map(callback_prefix_filter("emp_delete_cancel")).endpoint(callback_delete_cancel),
        )
}

/// `period:<all|id>:<дней>`; допускаются только дни из меню.
fn parse_period_payload(data: &str) -> Result<(ReportTarget, i64), anyhow::Error> {
    let payload = data
        .strip_prefix("period:")
        .ok_or_else(|| anyhow!("Некорректный callback payload"))?;
    let (target, days) = payload
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("Не указан период"))?;
    let target = ReportTarget::parse(target).ok_or_else(|| anyhow!("Некорректная цель отчёта"))?;
    let days = days
        .parse::<i64>()
        .ok()
        .filter(|days| REPORT_PERIODS.contains(days))
        .ok_or_else(|| anyhow!("Некорректный период"))?;
    Ok((target, days))
}

async fn callback_report_target(bot: Bot, q: CallbackQuery) -> HandlerResult {
    let data = q.data.as_deref().unwrap_or("");
    let target = data.strip_prefix("rep:").unwrap_or("");
    if ReportTarget::parse(target).is_none() {
        return Err(anyhow!("Некорректная цель отчёта: {}", target).into());
    }
    bot.answer_callback_query(q.id.clone()).await?;

    if let Some((chat_id, message_id)) = callback_message_target(&q) {
        bot.edit_message_text(chat_id, message_id, "За какой период?")
            .reply_markup(report_period_keyboard(target))
            .await?;
    }
    Ok(())
}

async fn callback_report_period(bot: Bot, q: CallbackQuery, state: BotState) -> HandlerResult {
    let data = q.data.as_deref().unwrap_or("");
    let (target, days) = parse_period_payload(data)?;
    tracing::info!(user_id = q.from.id.0, report_target = ?target, days = days, "Report requested");

    let Some((chat_id, message_id)) = callback_message_target(&q) else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };
    match target.build(&state, ReportPeriod::last_days(days)).await {
        Ok(report) => {
            bot.answer_callback_query(q.id.clone()).text("Формирую отчёт").await?;
            bot.edit_message_text(chat_id, message_id, format!("📊 Отчёт за {} дней", days))
                .reply_markup(InlineKeyboardMarkup::default())
                .await?;
            send_report(&bot, chat_id, &report).await
        }
        Err(err) => {
            bot.answer_callback_query(q.id.clone())
                .text(render_ledger_error(&err))
                .show_alert(true)
                .await?;
            Ok(())
        }
    }
}

async fn callback_delete_employee(
    bot: Bot,
    q: CallbackQuery,
    state: BotState,
    ctx: RequestContext,
) -> HandlerResult {
    let Some(admin_id) = require_admin_callback(&bot, &q, &ctx).await? else {
        return Ok(());
    };
    let data = q.data.as_deref().unwrap_or("");
    let employee_id = parse_callback_id(data, "emp_delete:")?;

    let text = match state.db.delete_employee(employee_id).await {
        Ok(true) => {
            tracing::info!(admin_id = admin_id, employee_id = employee_id, "Employee deleted");
            bot.answer_callback_query(q.id.clone()).text("Удалено").await?;
            format!("🗑 Сотрудник #{} удалён", employee_id)
        }
        Ok(false) => {
            bot.answer_callback_query(q.id.clone())
                .text("Сотрудник уже удалён")
                .await?;
            format!("Сотрудник #{} не найден", employee_id)
        }
        Err(err) => {
            bot.answer_callback_query(q.id.clone())
                .text(render_ledger_error(&err))
                .show_alert(true)
                .await?;
            return Ok(());
        }
    };

    if let Some((chat_id, message_id)) = callback_message_target(&q) {
        bot.edit_message_text(chat_id, message_id, text)
            .reply_markup(InlineKeyboardMarkup::default())
            .await?;
    }
    Ok(())
}

async fn callback_delete_cancel(bot: Bot, q: CallbackQuery) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).text("Отменено").await?;
    if let Some((chat_id, message_id)) = callback_message_target(&q) {
        bot.edit_message_text(chat_id, message_id, "Удаление отменено")
            .reply_markup(InlineKeyboardMarkup::default())
            .await?;
    }
    Ok(())
}
