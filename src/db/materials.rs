//! Балансы кабеля (ВОЛС и витая пара) на сотрудниках.

use super::models::{CableKind, ItemKind, Operation};
use super::movements::{MovementLog, NewMovement};
use super::{LedgerError, UnitOfWork};

const EPSILON: f64 = 1e-9;

/// Округление метража до сантиметров, половина к чётному.
pub(crate) fn round_cents(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

fn validate_meters(fiber: f64, twisted: f64) -> Result<(), LedgerError> {
    for (cable, value) in [(CableKind::Fiber, fiber), (CableKind::TwistedPair, twisted)] {
        if !value.is_finite() || value < 0.0 {
            return Err(LedgerError::InvalidInput(format!(
                "{}: некорректный метраж {}",
                cable.label(),
                value
            )));
        }
    }
    Ok(())
}

pub(crate) struct MaterialRepository {
    movements: MovementLog,
}

impl MaterialRepository {
    pub fn new(movements: MovementLog) -> Self {
        Self { movements }
    }

    async fn balances(
        &self,
        uow: &mut UnitOfWork,
        employee_id: i64,
    ) -> Result<(String, f64, f64), LedgerError> {
        sqlx::query_as::<_, (String, f64, f64)>(
            "SELECT full_name, fiber_balance, twisted_pair_balance FROM employees WHERE id = ?",
        )
        .bind(employee_id)
        .fetch_optional(uow.conn())
        .await?
        .ok_or_else(|| LedgerError::employee_not_found(employee_id))
    }

    async fn store(
        &self,
        uow: &mut UnitOfWork,
        employee_id: i64,
        fiber_balance: f64,
        twisted_pair_balance: f64,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            "UPDATE employees SET fiber_balance = ?, twisted_pair_balance = ? WHERE id = ?",
        )
        .bind(fiber_balance)
        .bind(twisted_pair_balance)
        .bind(employee_id)
        .execute(uow.conn())
        .await?;
        Ok(())
    }

    async fn log_changes(
        &self,
        uow: &mut UnitOfWork,
        employee_id: i64,
        operation: Operation,
        changes: [(CableKind, f64, f64); 2],
        connection_id: Option<i64>,
    ) -> Result<(), LedgerError> {
        for (cable, quantity, balance_after) in changes {
            if quantity == 0.0 {
                continue;
            }
            self.movements
                .record(
                    uow,
                    NewMovement {
                        employee_id,
                        operation,
                        item: ItemKind::Cable(cable),
                        item_name: cable.label(),
                        quantity,
                        balance_after,
                        connection_id,
                    },
                )
                .await?;
        }
        Ok(())
    }

    /// Начисляет кабель сотруднику. Метраж округляется до сантиметров один раз,
    /// в остаток и в журнал попадает одно и то же значение. Нулевые компоненты
    /// не журналируются.
    pub async fn add(
        &self,
        uow: &mut UnitOfWork,
        employee_id: i64,
        fiber: f64,
        twisted: f64,
    ) -> Result<(), LedgerError> {
        validate_meters(fiber, twisted)?;
        let (fiber, twisted) = (round_cents(fiber), round_cents(twisted));
        let (_, fiber_balance, twisted_balance) = self.balances(uow, employee_id).await?;

        let fiber_after = round_cents(fiber_balance + fiber);
        let twisted_after = round_cents(twisted_balance + twisted);
        self.store(uow, employee_id, fiber_after, twisted_after)
            .await?;
        self.log_changes(
            uow,
            employee_id,
            Operation::Add,
            [
                (CableKind::Fiber, fiber, fiber_after),
                (CableKind::TwistedPair, twisted, twisted_after),
            ],
            None,
        )
        .await?;

        tracing::info!(
            employee_id = employee_id,
            fiber = fiber,
            twisted_pair = twisted,
            "Material added"
        );
        Ok(())
    }

    /// Списывает кабель. При нехватке любого компонента ничего не меняет.
    pub async fn deduct(
        &self,
        uow: &mut UnitOfWork,
        employee_id: i64,
        fiber: f64,
        twisted: f64,
        connection_id: Option<i64>,
    ) -> Result<(), LedgerError> {
        validate_meters(fiber, twisted)?;
        let (fiber, twisted) = (round_cents(fiber), round_cents(twisted));
        let (full_name, fiber_balance, twisted_balance) =
            self.balances(uow, employee_id).await?;

        for (cable, requested, available) in [
            (CableKind::Fiber, fiber, fiber_balance),
            (CableKind::TwistedPair, twisted, twisted_balance),
        ] {
            if requested > available + EPSILON {
                tracing::warn!(
                    employee_id = employee_id,
                    cable = cable.as_str(),
                    requested = requested,
                    available = available,
                    "Недостаточно материала"
                );
                return Err(LedgerError::InsufficientBalance {
                    employee_id,
                    employee_name: full_name,
                    cable,
                    requested,
                    available,
                });
            }
        }

        let fiber_after = round_cents(fiber_balance - fiber).max(0.0);
        let twisted_after = round_cents(twisted_balance - twisted).max(0.0);
        self.store(uow, employee_id, fiber_after, twisted_after)
            .await?;
        self.log_changes(
            uow,
            employee_id,
            Operation::Deduct,
            [
                (CableKind::Fiber, fiber, fiber_after),
                (CableKind::TwistedPair, twisted, twisted_after),
            ],
            connection_id,
        )
        .await?;

        tracing::info!(
            employee_id = employee_id,
            fiber = fiber,
            twisted_pair = twisted,
            connection_id = ?connection_id,
            "Material deducted"
        );
        Ok(())
    }
}
