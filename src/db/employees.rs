//! Сотрудники (МОЛ) и их балансы кабеля.

use super::error::is_unique_violation;
use super::models::Employee;
use super::{LedgerError, UnitOfWork, current_unix_timestamp};
use sqlx::sqlite::SqlitePool;

pub(crate) struct EmployeeRepository {
    pool: SqlitePool,
}

impl EmployeeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, full_name: &str) -> Result<i64, LedgerError> {
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return Err(LedgerError::InvalidInput(
                "ФИО сотрудника не может быть пустым".to_string(),
            ));
        }
        let now = current_unix_timestamp()?;

        let result = sqlx::query("INSERT INTO employees (full_name, created_at) VALUES (?, ?)")
            .bind(full_name)
            .bind(now)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) => {
                let id = done.last_insert_rowid();
                tracing::info!(employee_id = id, full_name = full_name, "Employee added");
                Ok(id)
            }
            Err(err) if is_unique_violation(&err) => {
                tracing::warn!(full_name = full_name, "Employee already exists");
                Err(LedgerError::DuplicateEntity {
                    name: full_name.to_string(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Удаляет сотрудника. Остатки оборудования, журнал движений и связи с
    /// подключениями удаляются каскадом, сами подключения остаются.
    pub async fn delete(&self, employee_id: i64) -> Result<bool, LedgerError> {
        let result = sqlx::query("DELETE FROM employees WHERE id = ?")
            .bind(employee_id)
            .execute(&self.pool)
            .await?;
        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!(employee_id = employee_id, "Employee deleted");
        }
        Ok(deleted)
    }

    pub async fn get_all(&self) -> Result<Vec<Employee>, LedgerError> {
        let rows = sqlx::query_as::<_, Employee>(
            "SELECT id, full_name, fiber_balance, twisted_pair_balance, created_at
             FROM employees
             ORDER BY full_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_by_id(&self, employee_id: i64) -> Result<Option<Employee>, LedgerError> {
        let row = sqlx::query_as::<_, Employee>(
            "SELECT id, full_name, fiber_balance, twisted_pair_balance, created_at
             FROM employees
             WHERE id = ?",
        )
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Баланс (ВОЛС, витая пара) в метрах.
    pub async fn get_balance(&self, employee_id: i64) -> Result<(f64, f64), LedgerError> {
        sqlx::query_as::<_, (f64, f64)>(
            "SELECT fiber_balance, twisted_pair_balance FROM employees WHERE id = ?",
        )
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| LedgerError::employee_not_found(employee_id))
    }
}

/// ФИО сотрудника внутри открытой транзакции, `EntityNotFound` если его нет.
pub(crate) async fn require_employee(
    uow: &mut UnitOfWork,
    employee_id: i64,
) -> Result<String, LedgerError> {
    sqlx::query_scalar::<_, String>("SELECT full_name FROM employees WHERE id = ?")
        .bind(employee_id)
        .fetch_optional(uow.conn())
        .await?
        .ok_or_else(|| LedgerError::employee_not_found(employee_id))
}
