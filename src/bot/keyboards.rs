//! Клавиатуры бота: inline и постоянные reply-кнопки.

use crate::db::Employee;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};

pub const BTN_EMPLOYEES: &str = "👥 Сотрудники";
pub const BTN_NEW_CONNECTION: &str = "🔌 Новое подключение";
pub const BTN_REPORT: &str = "📊 Отчёт";
pub const BTN_HELP: &str = "❓ Справка";

pub const REPORT_TARGET_ALL: &str = "all";
pub const REPORT_PERIODS: [i64; 2] = [7, 30];

pub fn main_menu() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![
            KeyboardButton::new(BTN_NEW_CONNECTION),
            KeyboardButton::new(BTN_REPORT),
        ],
        vec![
            KeyboardButton::new(BTN_EMPLOYEES),
            KeyboardButton::new(BTN_HELP),
        ],
    ])
    .resize_keyboard()
    .persistent()
}

/// Выбор, по кому строить отчёт: общий или по одному сотруднику.
pub fn report_target_keyboard(employees: &[Employee]) -> InlineKeyboardMarkup {
    let mut kb = InlineKeyboardMarkup::default().append_row(vec![InlineKeyboardButton::callback(
        "👥 Все сотрудники",
        format!("rep:{}", REPORT_TARGET_ALL),
    )]);
    for chunk in employees.chunks(2) {
        kb = kb.append_row(
            chunk
                .iter()
                .map(|employee| {
                    InlineKeyboardButton::callback(
                        employee.full_name.clone(),
                        format!("rep:{}", employee.id),
                    )
                })
                .collect::<Vec<_>>(),
        );
    }
    kb
}

pub fn report_period_keyboard(target: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default().append_row(
        REPORT_PERIODS
            .iter()
            .map(|days| {
                InlineKeyboardButton::callback(
                    format!("📅 {} дней", days),
                    format!("period:{}:{}", target, days),
                )
            })
            .collect::<Vec<_>>(),
    )
}

pub fn delete_confirm_keyboard(employee_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default().append_row(vec![
        InlineKeyboardButton::callback("🗑 Удалить", format!("emp_delete:{}", employee_id)),
        InlineKeyboardButton::callback("Отмена", "emp_delete_cancel"),
    ])
}
