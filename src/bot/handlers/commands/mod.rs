use super::connection_form::{FORM_TEMPLATE, parse_connection_form, parse_count, parse_meters};
use super::format::{
    help_text, render_connection_card, render_employee_list, render_movements, render_stock,
};
use super::shared::{
    HandlerResult, ReportTarget, command_args, notify_reports_channel, reply_ledger_error,
    require_admin, send_report,
};
use super::state::{BotState, RequestContext};
use crate::bot::keyboards::{delete_confirm_keyboard, main_menu, report_target_keyboard};
use crate::db::{EquipmentKind, LedgerError, ReportPeriod};
use chrono::NaiveDate;
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "snake_case")]
pub enum BotCommand {
    #[command(description = "Начать работу")]
    Start,
    #[command(description = "Справка")]
    Help,
    #[command(description = "Сотрудники и остатки кабеля")]
    Employees,
    #[command(description = "Остатки сотрудника")]
    Stock,
    #[command(description = "Модели оборудования в наличии")]
    InStock,
    #[command(description = "Записать подключение")]
    Connection,
    #[command(description = "Карточка подключения")]
    ConnectionInfo,
    #[command(description = "Движения сотрудника за 30 дней")]
    Movements,
    #[command(description = "Отчёт")]
    Report,
    #[command(description = "Добавить сотрудника (админ)")]
    AddEmployee,
    #[command(description = "Удалить сотрудника (админ)")]
    DeleteEmployee,
    #[command(description = "Выдать или списать кабель (админ)")]
    Material,
    #[command(description = "Выдать или списать оборудование (админ)")]
    Equipment,
}

pub fn handler() -> teloxide::dispatching::UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    teloxide::filter_command::<BotCommand, _>()
        .branch(dptree::case![BotCommand::Start].endpoint(cmd_start))
        .branch(dptree::case![BotCommand::Help].endpoint(cmd_help))
        .branch(dptree::case![BotCommand::Employees].endpoint(cmd_employees))
        .branch(dptree::case![BotCommand::Stock].endpoint(cmd_stock))
        .branch(dptree::case![BotCommand::InStock].endpoint(cmd_in_stock))
        .branch(dptree::case![BotCommand::Connection].endpoint(cmd_connection))
        .branch(dptree::case![BotCommand::ConnectionInfo].endpoint(cmd_connection_info))
        .branch(dptree::case![BotCommand::Movements].endpoint(cmd_movements))
        .branch(dptree::case![BotCommand::Report].endpoint(cmd_report))
        .branch(dptree::case![BotCommand::AddEmployee].endpoint(cmd_add_employee))
        .branch(dptree::case![BotCommand::DeleteEmployee].endpoint(cmd_delete_employee))
        .branch(dptree::case![BotCommand::Material].endpoint(cmd_material))
        .branch(dptree::case![BotCommand::Equipment].endpoint(cmd_equipment))
}

async fn cmd_start(bot: Bot, msg: Message, ctx: RequestContext) -> HandlerResult {
    tracing::info!(user_id = ?ctx.user_id, role = ?ctx.role, "Received /start command");
    bot.send_message(
        msg.chat.id,
        "Бот учёта материалов и подключений. Используйте кнопки ниже или /help.",
    )
    .reply_markup(main_menu())
    .await?;
    Ok(())
}

pub async fn cmd_help(bot: Bot, msg: Message, ctx: RequestContext) -> HandlerResult {
    bot.send_message(msg.chat.id, help_text(ctx.is_admin()))
        .reply_markup(main_menu())
        .await?;
    Ok(())
}

pub async fn show_employees(bot: &Bot, chat_id: ChatId, state: &BotState) -> HandlerResult {
    match state.db.get_all_employees().await {
        Ok(employees) => {
            bot.send_message(
                chat_id,
                render_employee_list(&employees, state.config.list_page_size),
            )
            .await?;
            Ok(())
        }
        Err(err) => reply_ledger_error(bot, chat_id, err).await,
    }
}

async fn cmd_employees(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    show_employees(&bot, msg.chat.id, &state).await
}

async fn cmd_stock(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    let Ok(employee_id) = command_args(msg.text().unwrap_or("")).parse::<i64>() else {
        bot.send_message(msg.chat.id, "Использование: /stock <id сотрудника>")
            .await?;
        return Ok(());
    };
    let employee = match state.db.get_employee_by_id(employee_id).await {
        Ok(Some(employee)) => employee,
        Ok(None) => {
            return reply_ledger_error(&bot, msg.chat.id, LedgerError::employee_not_found(employee_id))
                .await;
        }
        Err(err) => return reply_ledger_error(&bot, msg.chat.id, err).await,
    };

    let mut holdings = Vec::with_capacity(EquipmentKind::ALL.len());
    for kind in EquipmentKind::ALL {
        match state.db.get_employee_equipment(kind, employee_id).await {
            Ok(items) => holdings.push((kind, items)),
            Err(err) => return reply_ledger_error(&bot, msg.chat.id, err).await,
        }
    }
    bot.send_message(msg.chat.id, render_stock(&employee, &holdings))
        .await?;
    Ok(())
}

async fn cmd_in_stock(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    let Some(kind) = EquipmentKind::parse_user_input(command_args(msg.text().unwrap_or(""))) else {
        bot.send_message(msg.chat.id, "Использование: /in_stock <router|snr|onu|media>")
            .await?;
        return Ok(());
    };
    let names = match state.db.list_equipment_names_in_stock(kind).await {
        Ok(names) => names,
        Err(err) => return reply_ledger_error(&bot, msg.chat.id, err).await,
    };
    let text = if names.is_empty() {
        format!("{}: на руках у сотрудников ничего нет", kind.label())
    } else {
        format!("{} в наличии:\n• {}", kind.label(), names.join("\n• "))
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Создаёт подключение по тексту анкеты. `extra_photo` добавляется к фото из анкеты.
pub async fn submit_connection_form(
    bot: &Bot,
    chat_id: ChatId,
    state: &BotState,
    ctx: &RequestContext,
    form: &str,
    extra_photo: Option<String>,
) -> HandlerResult {
    if form.trim().is_empty() {
        bot.send_message(chat_id, FORM_TEMPLATE).await?;
        return Ok(());
    }
    let mut new = match parse_connection_form(form) {
        Ok(new) => new,
        Err(err) => {
            bot.send_message(chat_id, format!("❌ {}\n\nШаблон: /connection", err))
                .await?;
            return Ok(());
        }
    };
    new.photo_file_ids.extend(extra_photo);

    let connection_id = match state.db.create_connection(ctx.actor(), new).await {
        Ok(id) => id,
        Err(err) => return reply_ledger_error(bot, chat_id, err).await,
    };
    let card = match state.db.get_connection_by_id(connection_id).await {
        Ok(Some(details)) => render_connection_card(&details),
        Ok(None) => format!("Подключение #{} записано", connection_id),
        Err(err) => return reply_ledger_error(bot, chat_id, err).await,
    };
    bot.send_message(chat_id, format!("✅ Записано\n\n{}", card))
        .reply_markup(main_menu())
        .await?;
    notify_reports_channel(bot, state, &card).await;
    Ok(())
}

async fn cmd_connection(bot: Bot, msg: Message, state: BotState, ctx: RequestContext) -> HandlerResult {
    let form = command_args(msg.text().unwrap_or(""));
    submit_connection_form(&bot, msg.chat.id, &state, &ctx, form, None).await
}

async fn cmd_connection_info(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    let Ok(connection_id) = command_args(msg.text().unwrap_or("")).parse::<i64>() else {
        bot.send_message(msg.chat.id, "Использование: /connection_info <id подключения>")
            .await?;
        return Ok(());
    };
    match state.db.get_connection_by_id(connection_id).await {
        Ok(Some(details)) => {
            bot.send_message(msg.chat.id, render_connection_card(&details))
                .await?;
            Ok(())
        }
        Ok(None) => {
            reply_ledger_error(&bot, msg.chat.id, LedgerError::connection_not_found(connection_id))
                .await
        }
        Err(err) => reply_ledger_error(&bot, msg.chat.id, err).await,
    }
}

const MOVEMENTS_DAYS: i64 = 30;

async fn cmd_movements(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    let Ok(employee_id) = command_args(msg.text().unwrap_or("")).parse::<i64>() else {
        bot.send_message(msg.chat.id, "Использование: /movements <id сотрудника>")
            .await?;
        return Ok(());
    };
    let employee = match state.db.get_employee_by_id(employee_id).await {
        Ok(Some(employee)) => employee,
        Ok(None) => {
            return reply_ledger_error(&bot, msg.chat.id, LedgerError::employee_not_found(employee_id))
                .await;
        }
        Err(err) => return reply_ledger_error(&bot, msg.chat.id, err).await,
    };
    let period = ReportPeriod::last_days(MOVEMENTS_DAYS);
    match state.db.get_employee_movements(employee_id, period).await {
        Ok(movements) => {
            bot.send_message(
                msg.chat.id,
                render_movements(&employee, MOVEMENTS_DAYS, &movements, state.config.list_page_size),
            )
            .await?;
            Ok(())
        }
        Err(err) => reply_ledger_error(&bot, msg.chat.id, err).await,
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%d.%m.%Y").ok()
}

pub async fn show_report_targets(bot: &Bot, chat_id: ChatId, state: &BotState) -> HandlerResult {
    match state.db.get_all_employees().await {
        Ok(employees) => {
            bot.send_message(chat_id, "По кому строить отчёт?")
                .reply_markup(report_target_keyboard(&employees))
                .await?;
            Ok(())
        }
        Err(err) => reply_ledger_error(bot, chat_id, err).await,
    }
}

async fn cmd_report(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    let args: Vec<&str> = command_args(msg.text().unwrap_or(""))
        .split_whitespace()
        .collect();
    if args.is_empty() {
        return show_report_targets(&bot, msg.chat.id, &state).await;
    }

    let parsed = match args.as_slice() {
        [target, from, to] => ReportTarget::parse(target).zip(parse_date(from).zip(parse_date(to))),
        _ => None,
    };
    let Some((target, (from, to))) = parsed else {
        bot.send_message(
            msg.chat.id,
            "Использование: /report <id|all> <дд.мм.гггг> <дд.мм.гггг>",
        )
        .await?;
        return Ok(());
    };
    tracing::info!(report_target = ?target, from = %from, to = %to, "Custom report requested");

    let report = match ReportPeriod::custom(from, to) {
        Ok(period) => target.build(&state, period).await,
        Err(err) => Err(err),
    };
    match report {
        Ok(report) => send_report(&bot, msg.chat.id, &report).await,
        Err(err) => reply_ledger_error(&bot, msg.chat.id, err).await,
    }
}

async fn cmd_add_employee(bot: Bot, msg: Message, state: BotState, ctx: RequestContext) -> HandlerResult {
    if !require_admin(&bot, &msg, &ctx).await? {
        return Ok(());
    }
    let full_name = command_args(msg.text().unwrap_or(""));
    if full_name.is_empty() {
        bot.send_message(msg.chat.id, "Использование: /add_employee <ФИО>")
            .await?;
        return Ok(());
    }
    match state.db.add_employee(full_name).await {
        Ok(id) => {
            tracing::info!(admin_id = ctx.actor(), employee_id = id, "Employee added");
            bot.send_message(msg.chat.id, format!("✅ Сотрудник «{}» добавлен, id {}", full_name, id))
                .await?;
            Ok(())
        }
        Err(err) => reply_ledger_error(&bot, msg.chat.id, err).await,
    }
}

async fn cmd_delete_employee(bot: Bot, msg: Message, state: BotState, ctx: RequestContext) -> HandlerResult {
    if !require_admin(&bot, &msg, &ctx).await? {
        return Ok(());
    }
    let Ok(employee_id) = command_args(msg.text().unwrap_or("")).parse::<i64>() else {
        bot.send_message(msg.chat.id, "Использование: /delete_employee <id>")
            .await?;
        return Ok(());
    };
    match state.db.get_employee_by_id(employee_id).await {
        Ok(Some(employee)) => {
            bot.send_message(
                msg.chat.id,
                format!(
                    "Удалить сотрудника «{}»?\n\
                     Его остатки и история движений будут удалены, подключения сохранятся.",
                    employee.full_name
                ),
            )
            .reply_markup(delete_confirm_keyboard(employee_id))
            .await?;
            Ok(())
        }
        Ok(None) => {
            reply_ledger_error(&bot, msg.chat.id, LedgerError::employee_not_found(employee_id)).await
        }
        Err(err) => reply_ledger_error(&bot, msg.chat.id, err).await,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Add,
    Deduct,
}

fn parse_direction(raw: &str) -> Option<Direction> {
    match raw.to_lowercase().as_str() {
        "add" | "выдать" | "+" => Some(Direction::Add),
        "deduct" | "списать" | "-" => Some(Direction::Deduct),
        _ => None,
    }
}

const MATERIAL_USAGE: &str = "Использование: /material <add|deduct> <id> <волс, м> <витая пара, м>";

async fn cmd_material(bot: Bot, msg: Message, state: BotState, ctx: RequestContext) -> HandlerResult {
    if !require_admin(&bot, &msg, &ctx).await? {
        return Ok(());
    }
    let args: Vec<&str> = command_args(msg.text().unwrap_or(""))
        .split_whitespace()
        .collect();
    let [direction, employee_id, fiber, twisted] = args.as_slice() else {
        bot.send_message(msg.chat.id, MATERIAL_USAGE).await?;
        return Ok(());
    };
    let (Some(direction), Ok(employee_id)) = (parse_direction(direction), employee_id.parse::<i64>())
    else {
        bot.send_message(msg.chat.id, MATERIAL_USAGE).await?;
        return Ok(());
    };
    let amounts = parse_meters("волс", fiber).and_then(|f| parse_meters("витая пара", twisted).map(|t| (f, t)));
    let (fiber, twisted) = match amounts {
        Ok(amounts) => amounts,
        Err(err) => {
            bot.send_message(msg.chat.id, format!("❌ {}", err)).await?;
            return Ok(());
        }
    };

    let actor = Some(ctx.actor());
    let result = match direction {
        Direction::Add => state.db.add_material(actor, employee_id, fiber, twisted).await,
        Direction::Deduct => {
            state
                .db
                .deduct_material(actor, employee_id, fiber, twisted, None)
                .await
        }
    };
    if let Err(err) = result {
        return reply_ledger_error(&bot, msg.chat.id, err).await;
    }
    match state.db.get_employee_balance(employee_id).await {
        Ok((fiber_left, twisted_left)) => {
            bot.send_message(
                msg.chat.id,
                format!(
                    "✅ Готово. Остаток: ВОЛС {:.2} м, витая пара {:.2} м",
                    fiber_left, twisted_left
                ),
            )
            .await?;
            Ok(())
        }
        Err(err) => reply_ledger_error(&bot, msg.chat.id, err).await,
    }
}

const EQUIPMENT_USAGE: &str =
    "Использование: /equipment <add|deduct> <router|snr|onu|media> <id> <кол-во> <модель>";

async fn cmd_equipment(bot: Bot, msg: Message, state: BotState, ctx: RequestContext) -> HandlerResult {
    if !require_admin(&bot, &msg, &ctx).await? {
        return Ok(());
    }
    let args = command_args(msg.text().unwrap_or(""));
    let mut parts = args.splitn(5, char::is_whitespace).map(str::trim);
    let parsed = (
        parts.next().and_then(parse_direction),
        parts.next().and_then(EquipmentKind::parse_user_input),
        parts.next().and_then(|raw| raw.parse::<i64>().ok()),
        parts.next(),
        parts.next().filter(|model| !model.is_empty()),
    );
    let (Some(direction), Some(kind), Some(employee_id), Some(quantity), Some(model)) = parsed else {
        bot.send_message(msg.chat.id, EQUIPMENT_USAGE).await?;
        return Ok(());
    };
    let quantity = match parse_count("кол-во", quantity) {
        Ok(quantity) => quantity,
        Err(err) => {
            bot.send_message(msg.chat.id, format!("❌ {}", err)).await?;
            return Ok(());
        }
    };

    let actor = Some(ctx.actor());
    let result = match direction {
        Direction::Add => {
            state
                .db
                .add_equipment(actor, kind, employee_id, model, quantity)
                .await
        }
        Direction::Deduct => {
            state
                .db
                .deduct_equipment(actor, kind, employee_id, model, quantity, None)
                .await
        }
    };
    match result {
        Ok(left) => {
            bot.send_message(
                msg.chat.id,
                format!("✅ Готово. {} «{}»: {} шт. на руках", kind.label(), model, left),
            )
            .await?;
            Ok(())
        }
        Err(err) => reply_ledger_error(&bot, msg.chat.id, err).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names_are_snake_case() {
        let descriptions = BotCommand::descriptions().to_string();
        assert!(descriptions.contains("/in_stock"));
        assert!(descriptions.contains("/connection_info"));
        assert!(descriptions.contains("/add_employee"));
    }

    #[test]
    fn directions_and_dates() {
        assert_eq!(parse_direction("ADD"), Some(Direction::Add));
        assert_eq!(parse_direction("списать"), Some(Direction::Deduct));
        assert_eq!(parse_direction("move"), None);
        assert_eq!(parse_date("01.02.2026"), NaiveDate::from_ymd_opt(2026, 2, 1));
        assert_eq!(parse_date("2026-02-01"), None);
    }
}
