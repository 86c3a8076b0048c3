//! Отчёты по подключениям за период.
//!
//! Доля исполнителя считается от метража подключения, а списанное
//! оборудование восстанавливается по журналу движений, а не по полям
//! карточки подключения.

use super::ledger::round_share;
use super::models::{Connection, EquipmentKind, ItemKind, MovementEntry};
use super::movements::MovementLog;
use super::LedgerError;
use chrono::{Duration, Local, NaiveDate, TimeZone};
use sqlx::FromRow;
use sqlx::sqlite::SqlitePool;
use std::collections::{BTreeMap, HashMap};

/// Интервал отчёта, границы включительно, unix-секунды.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportPeriod {
    pub start: i64,
    pub end: i64,
}

impl ReportPeriod {
    /// Последние `days` суток до текущего момента.
    pub fn last_days(days: i64) -> Self {
        let now = Local::now();
        Self {
            start: (now - Duration::days(days)).timestamp(),
            end: now.timestamp(),
        }
    }

    /// С начала дня `from` до конца дня `to` по местному времени.
    pub fn custom(from: NaiveDate, to: NaiveDate) -> Result<Self, LedgerError> {
        Self::custom_at(from, to, Local::now().date_naive())
    }

    fn custom_at(from: NaiveDate, to: NaiveDate, today: NaiveDate) -> Result<Self, LedgerError> {
        if from > today || to > today {
            return Err(LedgerError::InvalidInput(
                "Дата не может быть в будущем".to_string(),
            ));
        }
        if to < from {
            return Err(LedgerError::InvalidInput(
                "Дата окончания раньше даты начала".to_string(),
            ));
        }
        let start = from
            .and_hms_opt(0, 0, 0)
            .and_then(|dt| Local.from_local_datetime(&dt).earliest());
        let end = to
            .and_hms_opt(23, 59, 59)
            .and_then(|dt| Local.from_local_datetime(&dt).latest());
        match (start, end) {
            (Some(start), Some(end)) => Ok(Self {
                start: start.timestamp(),
                end: end.timestamp(),
            }),
            _ => Err(LedgerError::InvalidInput(
                "Некорректные границы периода".to_string(),
            )),
        }
    }

    /// «dd.mm.yyyy - dd.mm.yyyy» в местном времени.
    pub fn label(&self) -> String {
        let format = |ts: i64| {
            Local
                .timestamp_opt(ts, 0)
                .single()
                .map(|dt| dt.format("%d.%m.%Y").to_string())
                .unwrap_or_else(|| ts.to_string())
        };
        format!("{} - {}", format(self.start), format(self.end))
    }
}

/// Оборудование, фактически списанное на подключение.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquipmentSpent {
    pub kind: EquipmentKind,
    pub item_name: String,
    pub quantity: i64,
}

#[derive(Debug, Clone)]
pub struct ReportConnection {
    pub connection: Connection,
    pub employee_count: i64,
    /// Доля одного исполнителя, округлённая до сантиметров.
    pub employee_fiber_meters: f64,
    pub employee_twisted_pair_meters: f64,
    pub executors: Vec<String>,
    pub equipment: Vec<EquipmentSpent>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportStats {
    pub total_connections: i64,
    /// Сумма долей: по сотруднику его доли, в общем отчёте доля на число исполнителей.
    pub total_fiber_meters: f64,
    pub total_twisted_pair_meters: f64,
    /// Сумма метража по карточкам подключений без деления.
    pub total_connection_fiber_meters: f64,
    pub total_connection_twisted_pair_meters: f64,
    pub equipment_totals: BTreeMap<(EquipmentKind, String), i64>,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub period: ReportPeriod,
    /// `None` для общего отчёта.
    pub employee_name: Option<String>,
    pub connections: Vec<ReportConnection>,
    pub stats: ReportStats,
    pub movements: Vec<MovementEntry>,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty() && self.movements.is_empty()
    }
}

#[derive(Debug, FromRow)]
struct ConnectionRow {
    #[sqlx(flatten)]
    connection: Connection,
    employee_count: i64,
}

#[derive(Debug, FromRow)]
struct ExecutorNameRow {
    connection_id: i64,
    full_name: String,
}

pub(crate) struct ReportRepository {
    pool: SqlitePool,
    movements: MovementLog,
}

impl ReportRepository {
    pub fn new(pool: SqlitePool, movements: MovementLog) -> Self {
        Self { pool, movements }
    }

    pub async fn employee_report(
        &self,
        employee_id: i64,
        period: ReportPeriod,
    ) -> Result<Report, LedgerError> {
        let employee_name =
            sqlx::query_scalar::<_, String>("SELECT full_name FROM employees WHERE id = ?")
                .bind(employee_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| LedgerError::employee_not_found(employee_id))?;

        let rows = sqlx::query_as::<_, ConnectionRow>(
            "SELECT c.*,
                    (SELECT COUNT(*) FROM connection_employees x WHERE x.connection_id = c.id) AS employee_count
             FROM connections c
             WHERE c.id IN (SELECT connection_id FROM connection_employees WHERE employee_id = ?)
               AND c.created_at >= ? AND c.created_at <= ?
             ORDER BY c.created_at DESC, c.id DESC",
        )
        .bind(employee_id)
        .bind(period.start)
        .bind(period.end)
        .fetch_all(&self.pool)
        .await?;

        let connections = self.annotate(rows, period).await?;
        let stats = summarize(&connections, false);
        let movements = self
            .movements
            .employee_movements(&self.pool, employee_id, period)
            .await?;

        tracing::info!(
            employee_id = employee_id,
            connections = stats.total_connections,
            movements = movements.len(),
            "Employee report built"
        );
        Ok(Report {
            period,
            employee_name: Some(employee_name),
            connections,
            stats,
            movements,
        })
    }

    pub async fn global_report(&self, period: ReportPeriod) -> Result<Report, LedgerError> {
        let rows = sqlx::query_as::<_, ConnectionRow>(
            "SELECT c.*,
                    (SELECT COUNT(*) FROM connection_employees x WHERE x.connection_id = c.id) AS employee_count
             FROM connections c
             WHERE c.created_at >= ? AND c.created_at <= ?
             ORDER BY c.created_at DESC, c.id DESC",
        )
        .bind(period.start)
        .bind(period.end)
        .fetch_all(&self.pool)
        .await?;

        let connections = self.annotate(rows, period).await?;
        let stats = summarize(&connections, true);

        tracing::info!(connections = stats.total_connections, "Global report built");
        Ok(Report {
            period,
            employee_name: None,
            connections,
            stats,
            movements: Vec::new(),
        })
    }

    pub async fn employee_movements(
        &self,
        employee_id: i64,
        period: ReportPeriod,
    ) -> Result<Vec<MovementEntry>, LedgerError> {
        self.movements
            .employee_movements(&self.pool, employee_id, period)
            .await
    }

    /// Доли, имена исполнителей и списанное оборудование для каждой строки.
    async fn annotate(
        &self,
        rows: Vec<ConnectionRow>,
        period: ReportPeriod,
    ) -> Result<Vec<ReportConnection>, LedgerError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let names = sqlx::query_as::<_, ExecutorNameRow>(
            "SELECT ce.connection_id, e.full_name
             FROM connection_employees ce
             JOIN employees e ON e.id = ce.employee_id
             JOIN connections c ON c.id = ce.connection_id
             WHERE c.created_at >= ? AND c.created_at <= ?
             ORDER BY e.full_name",
        )
        .bind(period.start)
        .bind(period.end)
        .fetch_all(&self.pool)
        .await?;
        let mut executors: HashMap<i64, Vec<String>> = HashMap::new();
        for row in names {
            executors.entry(row.connection_id).or_default().push(row.full_name);
        }

        let mut equipment: HashMap<i64, Vec<EquipmentSpent>> = HashMap::new();
        for row in self.movements.equipment_spent(&self.pool, period).await? {
            let ItemKind::Equipment(kind) = row.item_type else {
                continue;
            };
            equipment
                .entry(row.connection_id)
                .or_default()
                .push(EquipmentSpent {
                    kind,
                    item_name: row.item_name,
                    quantity: row.quantity.round() as i64,
                });
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let id = row.connection.id;
                let n = row.employee_count.max(0) as usize;
                ReportConnection {
                    employee_fiber_meters: round_share(row.connection.fiber_meters, n),
                    employee_twisted_pair_meters: round_share(
                        row.connection.twisted_pair_meters,
                        n,
                    ),
                    employee_count: row.employee_count,
                    executors: executors.remove(&id).unwrap_or_default(),
                    equipment: equipment.remove(&id).unwrap_or_default(),
                    connection: row.connection,
                }
            })
            .collect())
    }
}

/// Итоги отчёта. В общем отчёте доля умножается на число исполнителей,
/// в отчёте по сотруднику берётся одна его доля.
fn summarize(connections: &[ReportConnection], whole_crew: bool) -> ReportStats {
    let mut stats = ReportStats {
        total_connections: connections.len() as i64,
        ..ReportStats::default()
    };
    for item in connections {
        let crew = if whole_crew {
            item.employee_count.max(1) as f64
        } else {
            1.0
        };
        stats.total_fiber_meters += item.employee_fiber_meters * crew;
        stats.total_twisted_pair_meters += item.employee_twisted_pair_meters * crew;
        stats.total_connection_fiber_meters += item.connection.fiber_meters;
        stats.total_connection_twisted_pair_meters += item.connection.twisted_pair_meters;
        for spent in &item.equipment {
            *stats
                .equipment_totals
                .entry((spent.kind, spent.item_name.clone()))
                .or_default() += spent.quantity;
        }
    }
    stats.total_fiber_meters = round_share(stats.total_fiber_meters, 1);
    stats.total_twisted_pair_meters = round_share(stats.total_twisted_pair_meters, 1);
    stats.total_connection_fiber_meters = round_share(stats.total_connection_fiber_meters, 1);
    stats.total_connection_twisted_pair_meters =
        round_share(stats.total_connection_twisted_pair_meters, 1);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil::*;
    use crate::db::{Db, EquipmentCharge, NewConnection};

    fn everything() -> ReportPeriod {
        ReportPeriod {
            start: 0,
            end: i64::MAX,
        }
    }

    async fn stocked(db: &Db, name: &str) -> i64 {
        let id = db.add_employee(name).await.unwrap();
        db.add_material(Some(1), id, 1000.0, 1000.0).await.unwrap();
        id
    }

    #[test]
    fn custom_period_validation() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();
        let first = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();

        let period = ReportPeriod::custom_at(first, today, today).unwrap();
        assert!(period.start < period.end);
        assert_eq!(period.end - period.start, 10 * 86_400 - 1);

        let single = ReportPeriod::custom_at(today, today, today).unwrap();
        assert_eq!(single.end - single.start, 86_399);

        assert!(ReportPeriod::custom_at(today, first, today).is_err());
        let tomorrow = NaiveDate::from_ymd_opt(2026, 1, 11).unwrap();
        assert!(ReportPeriod::custom_at(first, tomorrow, today).is_err());
    }

    #[test]
    fn last_days_spans_requested_window() {
        let period = ReportPeriod::last_days(7);
        assert_eq!(period.end - period.start, 7 * 86_400);
    }

    #[tokio::test]
    async fn employee_report_uses_shares_and_lists_co_executors() {
        let db = test_db().await;
        let first = stocked(&db, "Иванов").await;
        let second = stocked(&db, "Алексеев").await;
        let outsider = stocked(&db, "Посторонний").await;

        db.create_connection(1, NewConnection::new("ул. Мира, 1", vec![first, second], 100.0, 20.0))
            .await
            .unwrap();
        db.create_connection(1, NewConnection::new("ул. Мира, 2", vec![first], 30.0, 0.0))
            .await
            .unwrap();
        db.create_connection(1, NewConnection::new("ул. Мира, 3", vec![outsider], 5.0, 5.0))
            .await
            .unwrap();

        let report = db.get_employee_report(second, everything()).await.unwrap();
        assert_eq!(report.employee_name.as_deref(), Some("Алексеев"));
        assert_eq!(report.stats.total_connections, 1);
        let row = &report.connections[0];
        assert_eq!(row.employee_fiber_meters, 50.0);
        assert_eq!(row.employee_twisted_pair_meters, 10.0);
        assert_eq!(row.executors, vec!["Алексеев", "Иванов"]);

        let report = db.get_employee_report(first, everything()).await.unwrap();
        assert_eq!(report.stats.total_connections, 2);
        assert_eq!(report.stats.total_fiber_meters, 80.0);
        assert_eq!(report.stats.total_connection_fiber_meters, 130.0);
        assert_eq!(report.stats.total_twisted_pair_meters, 10.0);
        assert_eq!(report.connections[0].connection.address, "ул. Мира, 2");
        assert!(!report.movements.is_empty());
        assert!(report.movements.iter().all(|m| m.employee_id == first));

        assert!(matches!(
            db.get_employee_report(outsider + 100, everything()).await,
            Err(LedgerError::EntityNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn equipment_comes_from_movement_log() {
        let db = test_db().await;
        let id = stocked(&db, "Монтажник").await;
        db.add_equipment(Some(1), EquipmentKind::Onu, id, "HG8245", 5)
            .await
            .unwrap();
        db.add_equipment(Some(1), EquipmentKind::SnrBox, id, "SNR-1", 5)
            .await
            .unwrap();

        let mut new = NewConnection::new("ул. Мира, 4", vec![id], 10.0, 0.0);
        new.onu = EquipmentCharge::new("HG8245", 2);
        new.snr_box = EquipmentCharge::new("SNR-1", 1);
        let connection_id = db.create_connection(1, new).await.unwrap();
        db.deduct_equipment(Some(1), EquipmentKind::Onu, id, "HG8245", 1, Some(connection_id))
            .await
            .unwrap();

        let report = db.get_global_report(everything()).await.unwrap();
        let row = &report.connections[0];
        assert!(row.equipment.contains(&EquipmentSpent {
            kind: EquipmentKind::Onu,
            item_name: "HG8245".to_string(),
            quantity: 3,
        }));
        assert_eq!(
            report
                .stats
                .equipment_totals
                .get(&(EquipmentKind::SnrBox, "SNR-1".to_string())),
            Some(&1)
        );
        assert!(report.movements.is_empty());
    }

    #[tokio::test]
    async fn global_totals_do_not_depend_on_creation_order() {
        async fn build(order: &[usize]) -> ReportStats {
            let db = test_db().await;
            let a = stocked(&db, "А").await;
            let b = stocked(&db, "Б").await;
            let c = stocked(&db, "В").await;
            for kind in [EquipmentKind::Onu, EquipmentKind::MediaConverter] {
                db.add_equipment(Some(1), kind, a, "M", 10).await.unwrap();
            }
            let jobs: Vec<NewConnection> = vec![
                {
                    let mut new = NewConnection::new("1", vec![a, b], 100.0, 20.0);
                    new.onu = EquipmentCharge::new("M", 1);
                    new
                },
                {
                    let mut new = NewConnection::new("2", vec![a, b, c], 10.0, 0.0);
                    new.media_converter = EquipmentCharge::new("M", 2);
                    new
                },
                NewConnection::new("3", vec![c], 7.5, 3.25),
            ];
            for &index in order {
                db.create_connection(1, jobs[index].clone()).await.unwrap();
            }
            db.get_global_report(everything()).await.unwrap().stats
        }

        let forward = build(&[0, 1, 2]).await;
        let backward = build(&[2, 1, 0]).await;
        assert_eq!(forward, backward);
        assert_eq!(forward.total_connections, 3);
        assert_eq!(forward.total_connection_fiber_meters, 117.5);
        assert_eq!(forward.total_fiber_meters, 117.49);
        assert_eq!(forward.equipment_totals.len(), 2);
    }

    #[tokio::test]
    async fn period_filters_connections() {
        let db = test_db().await;
        let id = stocked(&db, "Монтажник").await;
        db.create_connection(1, NewConnection::new("ул. Мира, 5", vec![id], 1.0, 0.0))
            .await
            .unwrap();
        let past = ReportPeriod { start: 0, end: 1 };
        let report = db.get_global_report(past).await.unwrap();
        assert!(report.is_empty());
        assert_eq!(report.stats, ReportStats::default());
    }
}
