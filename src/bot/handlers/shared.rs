use super::format::{render_ledger_error, render_report_caption};
use super::state::{BotState, RequestContext};
use crate::bot::keyboards::REPORT_TARGET_ALL;
use crate::db::{LedgerError, Report, ReportPeriod};
use anyhow::anyhow;
use teloxide::prelude::*;
use teloxide::types::InputFile;

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Аргументы команды: всё после первого слова, включая переводы строк.
pub fn command_args(text: &str) -> &str {
    text.trim_start()
        .split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim())
        .unwrap_or("")
}

pub fn parse_callback_id(data: &str, prefix: &str) -> Result<i64, anyhow::Error> {
    data.strip_prefix(prefix)
        .ok_or_else(|| anyhow!("Некорректный callback payload"))?
        .parse::<i64>()
        .map_err(|_| anyhow!("Некорректный id в callback"))
}

pub fn callback_message_target(q: &CallbackQuery) -> Option<(ChatId, teloxide::types::MessageId)> {
    q.message.as_ref().map(|msg| (msg.chat().id, msg.id()))
}

pub fn callback_prefix_filter(prefix: &'static str) -> impl Fn(CallbackQuery) -> Option<CallbackQuery> {
    move |q: CallbackQuery| {
        if q.data.as_deref().is_some_and(|payload| payload.starts_with(prefix)) {
            Some(q)
        } else {
            None
        }
    }
}

/// Отвечает отказом, если команду прислал не администратор.
pub async fn require_admin(bot: &Bot, msg: &Message, ctx: &RequestContext) -> Result<bool, anyhow::Error> {
    if ctx.is_admin() {
        return Ok(true);
    }
    tracing::info!(user_id = ?ctx.user_id, "Admin command rejected");
    bot.send_message(msg.chat.id, "⛔ Команда доступна только администраторам")
        .await?;
    Ok(false)
}

pub async fn require_admin_callback(
    bot: &Bot,
    q: &CallbackQuery,
    ctx: &RequestContext,
) -> Result<Option<i64>, anyhow::Error> {
    if !ctx.is_admin() {
        bot.answer_callback_query(q.id.clone())
            .text("Недостаточно прав")
            .show_alert(true)
            .await?;
        return Ok(None);
    }
    Ok(Some(ctx.actor()))
}

/// Ошибки учёта показываются пользователю, прочие пробрасываются диспетчеру.
pub async fn reply_ledger_error(bot: &Bot, chat_id: ChatId, err: LedgerError) -> HandlerResult {
    if let LedgerError::TransactionFailure(source) = &err {
        tracing::error!(error = %source, "Storage failure");
    }
    bot.send_message(chat_id, render_ledger_error(&err)).await?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportTarget {
    All,
    Employee(i64),
}

impl ReportTarget {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case(REPORT_TARGET_ALL) {
            return Some(Self::All);
        }
        raw.parse::<i64>().ok().map(Self::Employee)
    }

    pub async fn build(self, state: &BotState, period: ReportPeriod) -> Result<Report, LedgerError> {
        match self {
            Self::All => state.db.get_global_report(period).await,
            Self::Employee(id) => state.db.get_employee_report(id, period).await,
        }
    }
}

pub async fn send_report(bot: &Bot, chat_id: ChatId, report: &Report) -> HandlerResult {
    let caption = render_report_caption(report);
    if report.is_empty() {
        bot.send_message(chat_id, format!("{}\n\nЗа период нет данных.", caption))
            .await?;
        return Ok(());
    }
    let bytes = crate::report::render(report)?;
    let file = InputFile::memory(bytes).file_name(crate::report::file_name(report));
    bot.send_document(chat_id, file).caption(caption).await?;
    Ok(())
}

/// Дублирует сообщение в канал отчётов. Ошибка отправки не прерывает обработку.
pub async fn notify_reports_channel(bot: &Bot, state: &BotState, text: &str) {
    let Some(channel_id) = state.config.reports_channel_id else {
        return;
    };
    if let Err(error) = bot.send_message(ChatId(channel_id), text.to_string()).await {
        tracing::warn!(
            channel_id = channel_id,
            error = %error,
            "Не удалось отправить сообщение в канал отчётов"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_args_keep_multiline_body() {
        assert_eq!(command_args("/stock 5"), "5");
        assert_eq!(command_args("/connection\naddress: x\nexecutors: 1"), "address: x\nexecutors: 1");
        assert_eq!(command_args("/help"), "");
    }

    #[test]
    fn report_targets() {
        assert_eq!(ReportTarget::parse("all"), Some(ReportTarget::All));
        assert_eq!(ReportTarget::parse("ALL"), Some(ReportTarget::All));
        assert_eq!(ReportTarget::parse("4"), Some(ReportTarget::Employee(4)));
        assert_eq!(ReportTarget::parse("Иванов"), None);
    }

    #[test]
    fn callback_ids() {
        assert_eq!(parse_callback_id("emp_delete:12", "emp_delete:").unwrap(), 12);
        assert!(parse_callback_id("emp_delete:x", "emp_delete:").is_err());
        assert!(parse_callback_id("other:1", "emp_delete:").is_err());
    }
}
