//! Карточки подключений: строка, исполнители, фото.

use super::ledger::NewConnection;
use super::models::{Connection, ConnectionDetails, ExecutorRef};
use super::{LedgerError, UnitOfWork, current_unix_timestamp};
use sqlx::sqlite::SqlitePool;

const PHOTO_CATEGORY_GENERAL: &str = "general";

const CONNECTION_COLUMNS: &str = "id, connection_type, address, port, router_model, router_quantity, \
     snr_box_model, onu_model, onu_quantity, media_converter_model, media_converter_quantity, \
     fiber_meters, twisted_pair_meters, contract_signed, router_access, telegram_bot_connected, \
     created_by, created_at";

pub(crate) struct ConnectionRepository {
    pool: SqlitePool,
}

impl ConnectionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, uow: &mut UnitOfWork, new: &NewConnection) -> Result<i64, LedgerError> {
        let now = current_unix_timestamp()?;
        let created_by = uow.actor().unwrap_or_default();
        let result = sqlx::query(
            "INSERT INTO connections
             (connection_type, address, port, router_model, router_quantity, snr_box_model,
              onu_model, onu_quantity, media_converter_model, media_converter_quantity,
              fiber_meters, twisted_pair_meters, contract_signed, router_access,
              telegram_bot_connected, created_by, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new.connection_type.as_str())
        .bind(new.address.trim())
        .bind(new.port.trim())
        .bind(new.router.stored_model())
        .bind(new.router.stored_quantity())
        .bind(new.snr_box.stored_model())
        .bind(new.onu.stored_model())
        .bind(new.onu.stored_quantity())
        .bind(new.media_converter.stored_model())
        .bind(new.media_converter.stored_quantity())
        .bind(new.fiber_meters)
        .bind(new.twisted_pair_meters)
        .bind(new.contract_signed)
        .bind(new.router_access)
        .bind(new.telegram_bot_connected)
        .bind(created_by)
        .bind(now)
        .execute(uow.conn())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn link_executors(
        &self,
        uow: &mut UnitOfWork,
        connection_id: i64,
        executor_ids: &[i64],
    ) -> Result<(), LedgerError> {
        for employee_id in executor_ids {
            sqlx::query(
                "INSERT INTO connection_employees (connection_id, employee_id) VALUES (?, ?)",
            )
            .bind(connection_id)
            .bind(employee_id)
            .execute(uow.conn())
            .await?;
        }
        Ok(())
    }

    pub async fn save_photos(
        &self,
        uow: &mut UnitOfWork,
        connection_id: i64,
        photo_file_ids: &[String],
    ) -> Result<(), LedgerError> {
        for (order, file_id) in photo_file_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO connection_photos (connection_id, photo_file_id, photo_category, photo_order)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(connection_id)
            .bind(file_id)
            .bind(PHOTO_CATEGORY_GENERAL)
            .bind(order as i64)
            .execute(uow.conn())
            .await?;
        }
        Ok(())
    }

    pub async fn get_by_id(&self, connection_id: i64) -> Result<Option<ConnectionDetails>, LedgerError> {
        let connection = sqlx::query_as::<_, Connection>(&format!(
            "SELECT {} FROM connections WHERE id = ?",
            CONNECTION_COLUMNS
        ))
        .bind(connection_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(connection) = connection else {
            return Ok(None);
        };

        let executors = sqlx::query_as::<_, ExecutorRef>(
            "SELECT e.id, e.full_name
             FROM connection_employees ce
             JOIN employees e ON e.id = ce.employee_id
             WHERE ce.connection_id = ?
             ORDER BY e.full_name",
        )
        .bind(connection_id)
        .fetch_all(&self.pool)
        .await?;

        let photos = sqlx::query_scalar::<_, String>(
            "SELECT photo_file_id FROM connection_photos WHERE connection_id = ? ORDER BY photo_order",
        )
        .bind(connection_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(ConnectionDetails {
            connection,
            executors,
            photos,
        }))
    }

    pub async fn count(&self) -> Result<i64, LedgerError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM connections")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
