//! Поштучные остатки оборудования. Один репозиторий на вид, таблица задаётся
//! [`EquipmentKind::table`].

use super::employees::require_employee;
use super::models::{EquipmentHolding, EquipmentKind, ItemKind, Operation};
use super::movements::{MovementLog, NewMovement};
use super::{LedgerError, UnitOfWork, current_unix_timestamp};
use sqlx::sqlite::SqlitePool;

pub(crate) struct EquipmentRepository {
    pool: SqlitePool,
    kind: EquipmentKind,
    movements: MovementLog,
}

impl EquipmentRepository {
    pub fn new(pool: SqlitePool, kind: EquipmentKind, movements: MovementLog) -> Self {
        Self {
            pool,
            kind,
            movements,
        }
    }

    fn validate(&self, item_name: &str, quantity: i64) -> Result<(), LedgerError> {
        if item_name.trim().is_empty() {
            return Err(LedgerError::InvalidInput(format!(
                "{}: не указана модель",
                self.kind.label()
            )));
        }
        if quantity <= 0 {
            return Err(LedgerError::InvalidInput(format!(
                "{}: количество должно быть больше нуля, получено {}",
                self.kind.label(),
                quantity
            )));
        }
        Ok(())
    }

    /// Добавляет оборудование, возвращает новый остаток по модели.
    pub async fn add(
        &self,
        uow: &mut UnitOfWork,
        employee_id: i64,
        item_name: &str,
        quantity: i64,
    ) -> Result<i64, LedgerError> {
        let item_name = item_name.trim();
        self.validate(item_name, quantity)?;
        require_employee(uow, employee_id).await?;
        let now = current_unix_timestamp()?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "INSERT INTO {} (employee_id, item_name, quantity, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(employee_id, item_name) DO UPDATE SET quantity = quantity + excluded.quantity
             RETURNING quantity",
            self.kind.table()
        ))
        .bind(employee_id)
        .bind(item_name)
        .bind(quantity)
        .bind(now)
        .fetch_one(uow.conn())
        .await?;

        self.movements
            .record(
                uow,
                NewMovement {
                    employee_id,
                    operation: Operation::Add,
                    item: ItemKind::Equipment(self.kind),
                    item_name,
                    quantity: quantity as f64,
                    balance_after: total as f64,
                    connection_id: None,
                },
            )
            .await?;

        tracing::info!(
            employee_id = employee_id,
            kind = self.kind.as_str(),
            item_name = item_name,
            quantity = quantity,
            total = total,
            "Equipment added"
        );
        Ok(total)
    }

    /// Списывает оборудование, возвращает остаток. Строка с нулём удаляется.
    pub async fn deduct(
        &self,
        uow: &mut UnitOfWork,
        employee_id: i64,
        item_name: &str,
        quantity: i64,
        connection_id: Option<i64>,
    ) -> Result<i64, LedgerError> {
        let item_name = item_name.trim();
        self.validate(item_name, quantity)?;
        let employee_name = require_employee(uow, employee_id).await?;

        let available = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT quantity FROM {} WHERE employee_id = ? AND item_name = ?",
            self.kind.table()
        ))
        .bind(employee_id)
        .bind(item_name)
        .fetch_optional(uow.conn())
        .await?
        .unwrap_or(0);

        if available < quantity {
            tracing::warn!(
                employee_id = employee_id,
                kind = self.kind.as_str(),
                item_name = item_name,
                requested = quantity,
                available = available,
                "Недостаточно оборудования"
            );
            return Err(LedgerError::InsufficientStock {
                employee_id,
                employee_name,
                kind: self.kind,
                item_name: item_name.to_string(),
                requested: quantity,
                available,
            });
        }

        let left = available - quantity;
        if left == 0 {
            sqlx::query(&format!(
                "DELETE FROM {} WHERE employee_id = ? AND item_name = ?",
                self.kind.table()
            ))
            .bind(employee_id)
            .bind(item_name)
            .execute(uow.conn())
            .await?;
        } else {
            sqlx::query(&format!(
                "UPDATE {} SET quantity = ? WHERE employee_id = ? AND item_name = ?",
                self.kind.table()
            ))
            .bind(left)
            .bind(employee_id)
            .bind(item_name)
            .execute(uow.conn())
            .await?;
        }

        self.movements
            .record(
                uow,
                NewMovement {
                    employee_id,
                    operation: Operation::Deduct,
                    item: ItemKind::Equipment(self.kind),
                    item_name,
                    quantity: quantity as f64,
                    balance_after: left as f64,
                    connection_id,
                },
            )
            .await?;

        tracing::info!(
            employee_id = employee_id,
            kind = self.kind.as_str(),
            item_name = item_name,
            quantity = quantity,
            left = left,
            connection_id = ?connection_id,
            "Equipment deducted"
        );
        Ok(left)
    }

    /// 0, если у сотрудника нет такой модели.
    pub async fn get_quantity(&self, employee_id: i64, item_name: &str) -> Result<i64, LedgerError> {
        let quantity = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT quantity FROM {} WHERE employee_id = ? AND item_name = ?",
            self.kind.table()
        ))
        .bind(employee_id)
        .bind(item_name.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(quantity.unwrap_or(0))
    }

    pub async fn get_holdings(&self, employee_id: i64) -> Result<Vec<EquipmentHolding>, LedgerError> {
        let rows = sqlx::query_as::<_, EquipmentHolding>(&format!(
            "SELECT id, employee_id, item_name, quantity, created_at
             FROM {}
             WHERE employee_id = ? AND quantity > 0
             ORDER BY item_name",
            self.kind.table()
        ))
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Модели, которые есть на руках хотя бы у одного сотрудника.
    pub async fn list_names_in_stock(&self) -> Result<Vec<String>, LedgerError> {
        let names = sqlx::query_scalar::<_, String>(&format!(
            "SELECT DISTINCT item_name FROM {} WHERE quantity > 0 ORDER BY item_name",
            self.kind.table()
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }
}
