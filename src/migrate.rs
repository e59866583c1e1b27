use sqlx::SqlitePool;
use tracing::{error, info, warn};

/// Schema version this build expects `PRAGMA user_version` to reach.
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// An additive schema step. Versions are applied in ascending order.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "0001_create_dreams.sql",
    sql: include_str!("../migrations/0001_create_dreams.sql"),
}];

fn preview(sql: &str) -> String {
    let one_line = sql.replace(['\n', '\t'], " ");
    let trimmed = one_line.trim();
    if trimmed.chars().count() > 160 {
        let cut: String = trimmed.chars().take(160).collect();
        format!("{cut}…")
    } else {
        trimmed.to_string()
    }
}

fn statements(raw_sql: &str) -> Vec<String> {
    let cleaned = raw_sql
        .lines()
        .filter(|line| {
            let t = line.trim_start();
            !(t.is_empty() || t.starts_with("--"))
        })
        .collect::<Vec<_>>()
        .join("\n");
    cleaned
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn schema_version(pool: &SqlitePool) -> anyhow::Result<i64> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;
    Ok(version)
}

/// Bring the schema up to [`CURRENT_SCHEMA_VERSION`]. Safe to call on every start.
pub async fn apply_migrations(pool: &SqlitePool) -> anyhow::Result<i64> {
    apply_migration_set(pool, MIGRATIONS).await
}

pub(crate) async fn apply_migration_set(
    pool: &SqlitePool,
    migrations: &[Migration],
) -> anyhow::Result<i64> {
    let mut current = schema_version(pool).await?;
    let target = migrations.iter().map(|m| m.version).max().unwrap_or(0);

    if current > target {
        warn!(
            target: "dream_journal",
            event = "schema_version_ahead",
            stored = current,
            expected = target
        );
        return Ok(current);
    }

    for migration in migrations {
        if migration.version <= current {
            info!(target: "dream_journal", event = "migration_skip", file = %migration.name);
            continue;
        }

        let mut tx = pool.begin().await?;
        for stmt in statements(migration.sql) {
            info!(target: "dream_journal", event = "migration_stmt", file = %migration.name, sql = %preview(&stmt));
            if let Err(e) = sqlx::query(&stmt).execute(&mut *tx).await {
                error!(
                    target: "dream_journal",
                    event = "migration_stmt_error",
                    file = %migration.name,
                    sql = %preview(&stmt),
                    error = %e
                );
                return Err(e.into());
            }
        }
        // PRAGMA arguments cannot be bound.
        sqlx::query(&format!("PRAGMA user_version = {}", migration.version))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        current = migration.version;
        info!(
            target: "dream_journal",
            event = "migration_applied",
            file = %migration.name,
            version = current
        );
    }

    Ok(current)
}
