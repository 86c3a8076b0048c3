//! SQLite-слой учёта материалов и оборудования монтажников.
//!
//! `Db` собирает репозитории над одним пулом. Любая мутация остатков идёт
//! через [`UnitOfWork`]: репозитории никогда не коммитят сами, границы
//! транзакции задаёт вызывающий код.

mod connections;
mod employees;
mod equipment;
pub mod error;
mod ledger;
mod materials;
pub mod models;
mod movements;
pub mod reports;
mod schema;

pub use error::LedgerError;
pub use ledger::{EquipmentCharge, NewConnection, round_share};
pub use models::{
    Amount, CableKind, Connection, ConnectionDetails, ConnectionType, Employee, EquipmentHolding,
    EquipmentKind, ExecutorRef, ItemKind, MovementEntry, Operation,
};
pub use reports::{EquipmentSpent, Report, ReportConnection, ReportPeriod, ReportStats};

use connections::ConnectionRepository;
use employees::EmployeeRepository;
use equipment::EquipmentRepository;
use materials::MaterialRepository;
use movements::MovementLog;
use reports::ReportRepository;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(15);

pub(crate) fn current_unix_timestamp() -> Result<i64, LedgerError> {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .map_err(|err| {
            LedgerError::InvalidInput(format!("Системное время меньше UNIX_EPOCH: {}", err))
        })
}

/// Явная единица работы: одна транзакция и автор изменений.
///
/// Если `UnitOfWork` уничтожается без `commit`, sqlx откатывает транзакцию.
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
    actor: Option<i64>,
}

impl UnitOfWork {
    pub fn actor(&self) -> Option<i64> {
        self.actor
    }

    pub(crate) fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    pub async fn commit(self) -> Result<(), LedgerError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), LedgerError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

pub struct Db {
    pool: SqlitePool,
    employees: EmployeeRepository,
    materials: MaterialRepository,
    routers: EquipmentRepository,
    snr_boxes: EquipmentRepository,
    onu: EquipmentRepository,
    media_converters: EquipmentRepository,
    connections: ConnectionRepository,
    reports: ReportRepository,
}

impl Db {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| anyhow::anyhow!("Не удалось создать директорию для БД: {}", e))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePool::connect_with(opts)
            .await
            .map_err(|e| anyhow::anyhow!("Не удалось подключиться к SQLite: {}", e))?;

        let db = Self::with_pool(pool);
        schema::migrate(&db.pool).await?;
        Ok(db)
    }

    /// База в памяти на одном соединении: все запросы видят одни и те же данные.
    #[cfg_attr(not(test), allow(dead_code))]
    pub async fn open_in_memory() -> Result<Self, anyhow::Error> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;
        let db = Self::with_pool(pool);
        schema::migrate(&db.pool).await?;
        Ok(db)
    }

    fn with_pool(pool: SqlitePool) -> Self {
        let movements = MovementLog::new();
        Self {
            employees: EmployeeRepository::new(pool.clone()),
            materials: MaterialRepository::new(movements.clone()),
            routers: EquipmentRepository::new(
                pool.clone(),
                EquipmentKind::Router,
                movements.clone(),
            ),
            snr_boxes: EquipmentRepository::new(
                pool.clone(),
                EquipmentKind::SnrBox,
                movements.clone(),
            ),
            onu: EquipmentRepository::new(pool.clone(), EquipmentKind::Onu, movements.clone()),
            media_converters: EquipmentRepository::new(
                pool.clone(),
                EquipmentKind::MediaConverter,
                movements.clone(),
            ),
            connections: ConnectionRepository::new(pool.clone()),
            reports: ReportRepository::new(pool.clone(), movements),
            pool,
        }
    }

    /// Открывает транзакцию от имени `actor` (Telegram ID автора изменений).
    ///
    /// `BEGIN IMMEDIATE`: блокировка записи берётся сразу, конкурирующие
    /// записи ждут в пределах busy timeout.
    pub async fn begin(&self, actor: Option<i64>) -> Result<UnitOfWork, LedgerError> {
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        Ok(UnitOfWork { tx, actor })
    }

    fn equipment(&self, kind: EquipmentKind) -> &EquipmentRepository {
        match kind {
            EquipmentKind::Router => &self.routers,
            EquipmentKind::SnrBox => &self.snr_boxes,
            EquipmentKind::Onu => &self.onu,
            EquipmentKind::MediaConverter => &self.media_converters,
        }
    }

    // ==================== Сотрудники ====================

    pub async fn add_employee(&self, full_name: &str) -> Result<i64, LedgerError> {
        self.employees.create(full_name).await
    }

    pub async fn delete_employee(&self, employee_id: i64) -> Result<bool, LedgerError> {
        self.employees.delete(employee_id).await
    }

    pub async fn get_all_employees(&self) -> Result<Vec<Employee>, LedgerError> {
        self.employees.get_all().await
    }

    pub async fn get_employee_by_id(&self, employee_id: i64) -> Result<Option<Employee>, LedgerError> {
        self.employees.get_by_id(employee_id).await
    }

    pub async fn get_employee_balance(&self, employee_id: i64) -> Result<(f64, f64), LedgerError> {
        self.employees.get_balance(employee_id).await
    }

    // ==================== Материалы ====================

    pub async fn add_material(
        &self,
        actor: Option<i64>,
        employee_id: i64,
        fiber_meters: f64,
        twisted_pair_meters: f64,
    ) -> Result<(), LedgerError> {
        let mut uow = self.begin(actor).await?;
        self.materials
            .add(&mut uow, employee_id, fiber_meters, twisted_pair_meters)
            .await?;
        uow.commit().await
    }

    pub async fn deduct_material(
        &self,
        actor: Option<i64>,
        employee_id: i64,
        fiber_meters: f64,
        twisted_pair_meters: f64,
        connection_id: Option<i64>,
    ) -> Result<(), LedgerError> {
        let mut uow = self.begin(actor).await?;
        self.materials
            .deduct(
                &mut uow,
                employee_id,
                fiber_meters,
                twisted_pair_meters,
                connection_id,
            )
            .await?;
        uow.commit().await
    }

    // ==================== Оборудование ====================

    pub async fn add_equipment(
        &self,
        actor: Option<i64>,
        kind: EquipmentKind,
        employee_id: i64,
        item_name: &str,
        quantity: i64,
    ) -> Result<i64, LedgerError> {
        let mut uow = self.begin(actor).await?;
        let total = self
            .equipment(kind)
            .add(&mut uow, employee_id, item_name, quantity)
            .await?;
        uow.commit().await?;
        Ok(total)
    }

    pub async fn deduct_equipment(
        &self,
        actor: Option<i64>,
        kind: EquipmentKind,
        employee_id: i64,
        item_name: &str,
        quantity: i64,
        connection_id: Option<i64>,
    ) -> Result<i64, LedgerError> {
        let mut uow = self.begin(actor).await?;
        let left = self
            .equipment(kind)
            .deduct(&mut uow, employee_id, item_name, quantity, connection_id)
            .await?;
        uow.commit().await?;
        Ok(left)
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub async fn get_equipment_quantity(
        &self,
        kind: EquipmentKind,
        employee_id: i64,
        item_name: &str,
    ) -> Result<i64, LedgerError> {
        self.equipment(kind).get_quantity(employee_id, item_name).await
    }

    pub async fn get_employee_equipment(
        &self,
        kind: EquipmentKind,
        employee_id: i64,
    ) -> Result<Vec<EquipmentHolding>, LedgerError> {
        self.equipment(kind).get_holdings(employee_id).await
    }

    pub async fn list_equipment_names_in_stock(
        &self,
        kind: EquipmentKind,
    ) -> Result<Vec<String>, LedgerError> {
        self.equipment(kind).list_names_in_stock().await
    }

    // ==================== Подключения ====================

    pub async fn get_connection_by_id(
        &self,
        connection_id: i64,
    ) -> Result<Option<ConnectionDetails>, LedgerError> {
        self.connections.get_by_id(connection_id).await
    }

    pub async fn count_connections(&self) -> Result<i64, LedgerError> {
        self.connections.count().await
    }

    // ==================== Отчёты ====================

    pub async fn get_employee_report(
        &self,
        employee_id: i64,
        period: ReportPeriod,
    ) -> Result<Report, LedgerError> {
        self.reports.employee_report(employee_id, period).await
    }

    pub async fn get_global_report(&self, period: ReportPeriod) -> Result<Report, LedgerError> {
        self.reports.global_report(period).await
    }

    pub async fn get_employee_movements(
        &self,
        employee_id: i64,
        period: ReportPeriod,
    ) -> Result<Vec<MovementEntry>, LedgerError> {
        self.reports.employee_movements(employee_id, period).await
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    pub async fn test_db() -> Db {
        Db::open_in_memory().await.expect("in-memory db")
    }

    pub async fn count_movements(db: &Db) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM material_movement_log")
            .fetch_one(&db.pool)
            .await
            .unwrap()
    }

    pub async fn count_connection_rows(db: &Db) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM connections")
            .fetch_one(&db.pool)
            .await
            .unwrap()
    }

    pub async fn all_movements(db: &Db) -> Vec<MovementEntry> {
        sqlx::query_as::<_, models::MovementRow>(
            "SELECT id, employee_id, operation_type, item_type, item_name, quantity, balance_after, connection_id, created_by, created_at
             FROM material_movement_log ORDER BY id",
        )
        .fetch_all(&db.pool)
        .await
        .unwrap()
        .into_iter()
        .map(MovementEntry::from)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn employee_lifecycle() {
        let db = test_db().await;
        let id = db.add_employee("Иванов Иван Иванович").await.unwrap();
        let employee = db.get_employee_by_id(id).await.unwrap().unwrap();
        assert_eq!(employee.full_name, "Иванов Иван Иванович");
        assert_eq!(employee.fiber_balance, 0.0);

        let duplicate = db.add_employee("Иванов Иван Иванович").await;
        assert!(matches!(duplicate, Err(LedgerError::DuplicateEntity { .. })));

        assert!(db.delete_employee(id).await.unwrap());
        assert!(db.get_employee_by_id(id).await.unwrap().is_none());
        assert!(!db.delete_employee(id).await.unwrap());
    }

    #[tokio::test]
    async fn dropped_unit_of_work_rolls_back() {
        let db = test_db().await;
        let id = db.add_employee("Монтажник").await.unwrap();
        {
            let mut uow = db.begin(Some(1)).await.unwrap();
            db.materials.add(&mut uow, id, 10.0, 0.0).await.unwrap();
        }
        assert_eq!(db.get_employee_balance(id).await.unwrap(), (0.0, 0.0));
        assert_eq!(count_movements(&db).await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_deductions_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Db::open(dir.path().join("ledger.db")).await.unwrap());
        let id = db.add_employee("Монтажник").await.unwrap();
        db.add_material(Some(1), id, 1000.0, 0.0).await.unwrap();

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let db = Arc::clone(&db);
                tokio::spawn(async move { db.deduct_material(Some(2), id, 1.0, 0.0, None).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(db.get_employee_balance(id).await.unwrap(), (980.0, 0.0));
        assert_eq!(count_movements(&db).await, 21);
    }

    #[tokio::test]
    async fn composed_operations_commit_together() {
        let db = test_db().await;
        let id = db.add_employee("Монтажник").await.unwrap();
        let mut uow = db.begin(Some(7)).await.unwrap();
        db.materials.add(&mut uow, id, 100.0, 50.0).await.unwrap();
        db.routers.add(&mut uow, id, "Keenetic", 2).await.unwrap();
        uow.commit().await.unwrap();

        assert_eq!(db.get_employee_balance(id).await.unwrap(), (100.0, 50.0));
        assert_eq!(
            db.get_equipment_quantity(EquipmentKind::Router, id, "Keenetic")
                .await
                .unwrap(),
            2
        );
        let movements = all_movements(&db).await;
        assert_eq!(movements.len(), 3);
        assert!(movements.iter().all(|m| m.created_by == Some(7)));
    }
}
