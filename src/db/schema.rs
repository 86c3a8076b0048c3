//! Версионированные миграции схемы. Применяются при старте, только вперёд.

use sqlx::SqliteConnection;
use sqlx::sqlite::SqlitePool;

const LATEST_VERSION: i64 = 3;

pub(super) async fn migrate(pool: &SqlitePool) -> Result<(), anyhow::Error> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_migrations (version INTEGER PRIMARY KEY)")
        .execute(pool)
        .await
        .map_err(|e| anyhow::anyhow!("Миграция schema_migrations: {}", e))?;

    let current = sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
    )
    .fetch_one(pool)
    .await?;

    if current >= LATEST_VERSION {
        tracing::info!(version = current, "Миграции не требуются");
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for version in (current + 1)..=LATEST_VERSION {
        apply(&mut *tx, version)
            .await
            .map_err(|e| anyhow::anyhow!("Миграция v{}: {}", version, e))?;
        sqlx::query("INSERT INTO schema_migrations (version) VALUES (?)")
            .bind(version)
            .execute(&mut *tx)
            .await?;
        tracing::info!(version = version, "Применена миграция");
    }
    tx.commit().await?;
    tracing::info!(version = LATEST_VERSION, "Схема обновлена");
    Ok(())
}

async fn apply(conn: &mut SqliteConnection, version: i64) -> Result<(), sqlx::Error> {
    match version {
        1 => migration_v1(conn).await,
        2 => migration_v2(conn).await,
        3 => migration_v3(conn).await,
        _ => Ok(()),
    }
}

/// Базовая схема.
async fn migration_v1(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS employees (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            full_name TEXT NOT NULL UNIQUE,
            fiber_balance REAL NOT NULL DEFAULT 0,
            twisted_pair_balance REAL NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS connections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            connection_type TEXT NOT NULL DEFAULT 'mkd',
            address TEXT NOT NULL,
            port TEXT NOT NULL DEFAULT '-',
            router_model TEXT NOT NULL DEFAULT '-',
            router_quantity INTEGER NOT NULL DEFAULT 1,
            snr_box_model TEXT NOT NULL DEFAULT '-',
            fiber_meters REAL NOT NULL,
            twisted_pair_meters REAL NOT NULL,
            contract_signed INTEGER NOT NULL DEFAULT 0,
            router_access INTEGER NOT NULL DEFAULT 0,
            telegram_bot_connected INTEGER NOT NULL DEFAULT 0,
            created_by INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_connections_created_at ON connections(created_at);

        CREATE TABLE IF NOT EXISTS connection_employees (
            connection_id INTEGER NOT NULL,
            employee_id INTEGER NOT NULL,
            PRIMARY KEY (connection_id, employee_id),
            FOREIGN KEY (connection_id) REFERENCES connections(id) ON DELETE CASCADE,
            FOREIGN KEY (employee_id) REFERENCES employees(id) ON DELETE CASCADE
        );
        CREATE INDEX IF NOT EXISTS idx_connection_employees_employee ON connection_employees(employee_id);

        CREATE TABLE IF NOT EXISTS connection_photos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            connection_id INTEGER NOT NULL,
            photo_file_id TEXT NOT NULL,
            photo_category TEXT NOT NULL DEFAULT 'other',
            photo_order INTEGER NOT NULL,
            FOREIGN KEY (connection_id) REFERENCES connections(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS material_movement_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            employee_id INTEGER NOT NULL,
            operation_type TEXT NOT NULL,
            item_type TEXT NOT NULL,
            item_name TEXT NOT NULL,
            quantity REAL NOT NULL,
            balance_after REAL NOT NULL,
            connection_id INTEGER,
            created_by INTEGER,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (employee_id) REFERENCES employees(id) ON DELETE CASCADE,
            FOREIGN KEY (connection_id) REFERENCES connections(id) ON DELETE SET NULL
        );
        CREATE INDEX IF NOT EXISTS idx_material_movement_employee_created
            ON material_movement_log(employee_id, created_at);
        "#,
    )
    .execute(&mut *conn)
    .await?;

    for table in [
        "employee_routers",
        "employee_snr_boxes",
        "employee_onu",
        "employee_media_converters",
    ] {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                employee_id INTEGER NOT NULL,
                item_name TEXT NOT NULL,
                quantity INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                UNIQUE(employee_id, item_name),
                FOREIGN KEY (employee_id) REFERENCES employees(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_employee ON {table}(employee_id);
            "#
        ))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Индекс для выборок журнала по подключению.
async fn migration_v2(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_material_movement_connection ON material_movement_log(connection_id)",
    )
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// ONU и медиаконвертеры в карточке подключения.
async fn migration_v3(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    ensure_column_exists(conn, "connections", "onu_model", "TEXT NOT NULL DEFAULT '-'").await?;
    ensure_column_exists(conn, "connections", "onu_quantity", "INTEGER NOT NULL DEFAULT 0")
        .await?;
    ensure_column_exists(
        conn,
        "connections",
        "media_converter_model",
        "TEXT NOT NULL DEFAULT '-'",
    )
    .await?;
    ensure_column_exists(
        conn,
        "connections",
        "media_converter_quantity",
        "INTEGER NOT NULL DEFAULT 0",
    )
    .await?;
    Ok(())
}

async fn ensure_column_exists(
    conn: &mut SqliteConnection,
    table: &str,
    column: &str,
    sql_type: &str,
) -> Result<(), sqlx::Error> {
    let count = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM pragma_table_info('{}') WHERE name = '{}'",
        table, column
    ))
    .fetch_one(&mut *conn)
    .await?;
    if count == 0 {
        sqlx::query(&format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            table, column, sql_type
        ))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    async fn memory_pool() -> SqlitePool {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .foreign_keys(true);
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = memory_pool().await;
        migrate(&pool).await.unwrap();
        migrate(&pool).await.unwrap();

        let versions = sqlx::query_scalar::<_, i64>("SELECT version FROM schema_migrations ORDER BY version")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(versions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn upgrades_schema_created_before_v3() {
        let pool = memory_pool().await;
        {
            let mut conn = pool.acquire().await.unwrap();
            migration_v1(&mut *conn).await.unwrap();
        }
        sqlx::query("CREATE TABLE schema_migrations (version INTEGER PRIMARY KEY)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO schema_migrations (version) VALUES (1), (2)")
            .execute(&pool)
            .await
            .unwrap();

        migrate(&pool).await.unwrap();

        let columns = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM pragma_table_info('connections') WHERE name IN ('onu_model', 'onu_quantity', 'media_converter_model', 'media_converter_quantity')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(columns, 4);
    }
}
