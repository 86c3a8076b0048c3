use crate::db::{
    ConnectionDetails, Employee, EquipmentHolding, EquipmentKind, LedgerError, MovementEntry, Report,
};
use chrono::{DateTime, Local, Utc};

pub fn format_timestamp(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.with_timezone(&Local).format("%d.%m.%Y %H:%M").to_string())
        .unwrap_or_else(|| format!("Некорректный timestamp: {}", ts))
}

pub fn format_meters(value: f64) -> String {
    format!("{:.2}", value).replace('.', ",")
}

fn yes_no(value: bool) -> &'static str {
    if value { "да" } else { "нет" }
}

pub fn render_employee_list(employees: &[Employee], limit: usize) -> String {
    if employees.is_empty() {
        return "Сотрудников пока нет. Добавьте: /add_employee <ФИО>".to_string();
    }
    let shown = limit.max(1);
    let mut lines = vec![format!("👥 Сотрудники ({}):", employees.len())];
    for employee in employees.iter().take(shown) {
        lines.push(format!(
            "#{} {} | ВОЛС {} м | витая пара {} м",
            employee.id,
            employee.full_name,
            format_meters(employee.fiber_balance),
            format_meters(employee.twisted_pair_balance),
        ));
    }
    if employees.len() > shown {
        lines.push(format!("…и ещё {}", employees.len() - shown));
    }
    lines.join("\n")
}

pub fn render_stock(employee: &Employee, holdings: &[(EquipmentKind, Vec<EquipmentHolding>)]) -> String {
    let mut text = format!(
        "📦 {} (#{})\n\nВОЛС: {} м\nВитая пара: {} м",
        employee.full_name,
        employee.id,
        format_meters(employee.fiber_balance),
        format_meters(employee.twisted_pair_balance),
    );
    for (kind, items) in holdings {
        text.push_str(&format!("\n\n{}:", kind.label()));
        if items.is_empty() {
            text.push_str(" нет");
        }
        for item in items {
            text.push_str(&format!("\n• {} — {} шт.", item.item_name, item.quantity));
        }
    }
    text
}

pub fn render_connection_card(details: &ConnectionDetails) -> String {
    let c = &details.connection;
    let executors = details
        .executors
        .iter()
        .map(|e| e.full_name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let mut text = format!(
        "🔌 Подключение #{}\n\
         Тип: {}\n\
         Адрес: {}\n\
         Порт: {}\n\
         Исполнители: {}\n\
         ВОЛС: {} м\n\
         Витая пара: {} м",
        c.id,
        c.connection_type.label(),
        c.address,
        c.port,
        if executors.is_empty() { "—" } else { executors.as_str() },
        format_meters(c.fiber_meters),
        format_meters(c.twisted_pair_meters),
    );
    if c.router_model != "-" {
        text.push_str(&format!("\nРоутер: {} x{}", c.router_model, c.router_quantity));
    }
    if c.snr_box_model != "-" {
        text.push_str(&format!("\nSNR бокс: {}", c.snr_box_model));
    }
    if c.onu_model != "-" {
        text.push_str(&format!("\nONU: {} x{}", c.onu_model, c.onu_quantity));
    }
    if c.media_converter_model != "-" {
        text.push_str(&format!(
            "\nМедиаконвертер: {} x{}",
            c.media_converter_model, c.media_converter_quantity
        ));
    }
    text.push_str(&format!(
        "\nДоговор: {}\nДоступ к роутеру: {}\nБот: {}\nФото: {}\nСоздано: {}",
        yes_no(c.contract_signed),
        yes_no(c.router_access),
        yes_no(c.telegram_bot_connected),
        details.photos.len(),
        format_timestamp(c.created_at),
    ));
    text
}

pub fn render_report_caption(report: &Report) -> String {
    let who = report
        .employee_name
        .as_deref()
        .unwrap_or("все сотрудники");
    let stats = &report.stats;
    format!(
        "📊 Отчёт: {}\nПериод: {}\n\
         Подключений: {}\n\
         ВОЛС: {} м (по долям {} м)\n\
         Витая пара: {} м (по долям {} м)",
        who,
        report.period.label(),
        stats.total_connections,
        format_meters(stats.total_connection_fiber_meters),
        format_meters(stats.total_fiber_meters),
        format_meters(stats.total_connection_twisted_pair_meters),
        format_meters(stats.total_twisted_pair_meters),
    )
}

pub fn render_movements(employee: &Employee, days: i64, movements: &[MovementEntry], limit: usize) -> String {
    if movements.is_empty() {
        return format!("{}: движений за {} дней нет", employee.full_name, days);
    }
    let mut lines = vec![format!(
        "🧾 {}: движения за {} дней ({})",
        employee.full_name,
        days,
        movements.len()
    )];
    let skipped = movements.len().saturating_sub(limit.max(1));
    for entry in &movements[skipped..] {
        let connection = entry
            .connection_id
            .map(|id| format!(" · подкл. #{}", id))
            .unwrap_or_default();
        lines.push(format!(
            "{} {} {:+} → {}{}",
            format_timestamp(entry.created_at),
            entry.item_name,
            entry.signed_delta(),
            entry.balance_after,
            connection,
        ));
    }
    if skipped > 0 {
        lines.insert(1, format!("…показаны последние {}", movements.len() - skipped));
    }
    lines.join("\n")
}

/// Текст ошибки учёта для пользователя.
pub fn render_ledger_error(err: &LedgerError) -> String {
    match err {
        LedgerError::TransactionFailure(_) => {
            "❌ Ошибка базы данных, изменения отменены. Попробуйте позже.".to_string()
        }
        other => format!("❌ {}", other),
    }
}

pub fn help_text(is_admin: bool) -> String {
    let mut text = String::from(
        "Команды:
/employees — сотрудники и их остатки кабеля
/stock <id> — остатки сотрудника
/in_stock <router|snr|onu|media> — модели в наличии
/connection — записать подключение (без анкеты пришлёт шаблон)
/connection_info <id> — карточка подключения
/movements <id> — движения сотрудника за 30 дней
/report — отчёт за 7 или 30 дней
/report <id|all> <дд.мм.гггг> <дд.мм.гггг> — отчёт за период",
    );
    if is_admin {
        text.push_str(
            "

Для администраторов:
/add_employee <ФИО> — добавить сотрудника
/delete_employee <id> — удалить сотрудника
/material <add|deduct> <id> <волс> <витая пара> — кабель
/equipment <add|deduct> <вид> <id> <кол-во> <модель> — оборудование",
        );
    }
    text
}
