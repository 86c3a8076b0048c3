//! Журнал движений материалов и оборудования.
//!
//! `MovementLog` передаётся в каждый репозиторий остатков при создании и
//! остаётся единственным местом, которое пишет в `material_movement_log`.

use super::models::{EquipmentKind, ItemKind, MovementEntry, MovementRow, Operation};
use super::reports::ReportPeriod;
use super::{LedgerError, UnitOfWork, current_unix_timestamp};
use sqlx::FromRow;
use sqlx::sqlite::SqlitePool;

#[derive(Debug)]
pub(crate) struct NewMovement<'a> {
    pub employee_id: i64,
    pub operation: Operation,
    pub item: ItemKind,
    pub item_name: &'a str,
    pub quantity: f64,
    pub balance_after: f64,
    pub connection_id: Option<i64>,
}

/// Сумма списаний оборудования по одному подключению.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct SpentRow {
    pub connection_id: i64,
    #[sqlx(try_from = "String")]
    pub item_type: ItemKind,
    pub item_name: String,
    pub quantity: f64,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MovementLog;

impl MovementLog {
    pub fn new() -> Self {
        Self
    }

    /// Пишет запись в рамках переданной транзакции.
    pub async fn record(
        &self,
        uow: &mut UnitOfWork,
        movement: NewMovement<'_>,
    ) -> Result<i64, LedgerError> {
        let now = current_unix_timestamp()?;
        let actor = uow.actor();
        let result = sqlx::query(
            "INSERT INTO material_movement_log
             (employee_id, operation_type, item_type, item_name, quantity, balance_after, connection_id, created_by, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(movement.employee_id)
        .bind(movement.operation.as_str())
        .bind(movement.item.as_str())
        .bind(movement.item_name)
        .bind(movement.quantity)
        .bind(movement.balance_after)
        .bind(movement.connection_id)
        .bind(actor)
        .bind(now)
        .execute(uow.conn())
        .await?;

        tracing::debug!(
            employee_id = movement.employee_id,
            operation = movement.operation.as_str(),
            item = movement.item.as_str(),
            item_name = movement.item_name,
            quantity = movement.quantity,
            balance_after = movement.balance_after,
            connection_id = ?movement.connection_id,
            "Movement logged"
        );
        Ok(result.last_insert_rowid())
    }

    pub async fn employee_movements(
        &self,
        pool: &SqlitePool,
        employee_id: i64,
        period: ReportPeriod,
    ) -> Result<Vec<MovementEntry>, LedgerError> {
        let rows = sqlx::query_as::<_, MovementRow>(
            "SELECT id, employee_id, operation_type, item_type, item_name, quantity, balance_after, connection_id, created_by, created_at
             FROM material_movement_log
             WHERE employee_id = ? AND created_at >= ? AND created_at <= ?
             ORDER BY created_at, id",
        )
        .bind(employee_id)
        .bind(period.start)
        .bind(period.end)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(MovementEntry::from).collect())
    }

    /// Фактически списанное оборудование по подключениям, созданным за период.
    pub async fn equipment_spent(
        &self,
        pool: &SqlitePool,
        period: ReportPeriod,
    ) -> Result<Vec<SpentRow>, LedgerError> {
        let kinds = EquipmentKind::ALL.map(|kind| format!("'{}'", kind.as_str()));
        let rows = sqlx::query_as::<_, SpentRow>(&format!(
            "SELECT m.connection_id AS connection_id, m.item_type AS item_type, m.item_name AS item_name, SUM(m.quantity) AS quantity
             FROM material_movement_log m
             JOIN connections c ON c.id = m.connection_id
             WHERE m.operation_type = ?
               AND m.item_type IN ({})
               AND c.created_at >= ? AND c.created_at <= ?
             GROUP BY m.connection_id, m.item_type, m.item_name
             ORDER BY m.connection_id, m.item_type, m.item_name",
            kinds.join(", ")
        ))
        .bind(Operation::Deduct.as_str())
        .bind(period.start)
        .bind(period.end)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }
}
