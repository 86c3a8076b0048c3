use super::models::{CableKind, EquipmentKind};
use thiserror::Error;

/// Ошибки учёта. Тексты показываются монтажнику как есть.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Сотрудник «{name}» уже существует")]
    DuplicateEntity { name: String },

    #[error("{entity} #{id} не найден")]
    EntityNotFound { entity: &'static str, id: i64 },

    #[error(
        "Недостаточно материала «{label}» у сотрудника {employee_name}: нужно {requested:.2} м, в наличии {available:.2} м (не хватает {short:.2} м)",
        label = .cable.label(),
        short = .requested - .available
    )]
    InsufficientBalance {
        employee_id: i64,
        employee_name: String,
        cable: CableKind,
        requested: f64,
        available: f64,
    },

    #[error(
        "Недостаточно оборудования «{label}: {item_name}» у сотрудника {employee_name}: нужно {requested} шт., в наличии {available} шт.",
        label = .kind.label()
    )]
    InsufficientStock {
        employee_id: i64,
        employee_name: String,
        kind: EquipmentKind,
        item_name: String,
        requested: i64,
        available: i64,
    },

    #[error("Некорректные данные: {0}")]
    InvalidInput(String),

    #[error("Ошибка при работе с БД: {0}")]
    TransactionFailure(#[from] sqlx::Error),
}

impl LedgerError {
    pub fn employee_not_found(id: i64) -> Self {
        Self::EntityNotFound {
            entity: "Сотрудник",
            id,
        }
    }

    pub fn connection_not_found(id: i64) -> Self {
        Self::EntityNotFound {
            entity: "Подключение",
            id,
        }
    }

    /// Отказ в списании, а не сбой хранилища.
    pub fn is_shortage(&self) -> bool {
        matches!(
            self,
            Self::InsufficientBalance { .. } | Self::InsufficientStock { .. }
        )
    }
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_shortage_names_employee_and_amount() {
        let err = LedgerError::InsufficientBalance {
            employee_id: 3,
            employee_name: "Петров П.П.".to_string(),
            cable: CableKind::Fiber,
            requested: 50.0,
            available: 20.5,
        };
        let text = err.to_string();
        assert!(text.contains("Петров П.П."));
        assert!(text.contains("ВОЛС"));
        assert!(text.contains("29.50"));
        assert!(err.is_shortage());
    }

    #[test]
    fn stock_shortage_names_model() {
        let err = LedgerError::InsufficientStock {
            employee_id: 1,
            employee_name: "Иванов".to_string(),
            kind: EquipmentKind::Onu,
            item_name: "HG8245".to_string(),
            requested: 2,
            available: 1,
        };
        let text = err.to_string();
        assert!(text.contains("ONU: HG8245"));
        assert!(text.contains("нужно 2 шт."));
    }
}
