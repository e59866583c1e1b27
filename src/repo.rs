use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::model::{bool_to_flag, decode_list, encode_list, DreamDraft, DreamEntry};

const SELECT_ALL_SQL: &str = "SELECT id, title, body, date, mood, isLucid, isNightmare, tags, images, interpretation \
     FROM dreams ORDER BY id DESC";
const INSERT_SQL: &str = "INSERT INTO dreams (title, body, date, mood, isLucid, isNightmare, tags, images, interpretation) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";
const UPDATE_SQL: &str = "UPDATE dreams SET title = ?, body = ?, date = ?, mood = ?, isLucid = ?, isNightmare = ?, \
     tags = ?, images = ?, interpretation = ? WHERE id = ?";
const DELETE_SQL: &str = "DELETE FROM dreams WHERE id = ?";
const CLEAR_SQL: &str = "DELETE FROM dreams";

/// Read every row, newest first. Rows that cannot be read at all are skipped.
pub async fn select_all(pool: &SqlitePool) -> Result<Vec<DreamEntry>, sqlx::Error> {
    let rows = sqlx::query(SELECT_ALL_SQL).fetch_all(pool).await?;
    Ok(rows.iter().filter_map(row_to_entry).collect())
}

/// Insert a new row and return the id SQLite assigned.
pub async fn insert(pool: &SqlitePool, draft: &DreamDraft) -> Result<i64, sqlx::Error> {
    let res = sqlx::query(INSERT_SQL)
        .bind(&draft.title)
        .bind(&draft.body)
        .bind(&draft.date)
        .bind(draft.mood)
        .bind(bool_to_flag(draft.is_lucid))
        .bind(bool_to_flag(draft.is_nightmare))
        .bind(encode_list(&draft.tags))
        .bind(encode_list(&draft.images))
        .bind(&draft.interpretation)
        .execute(pool)
        .await?;
    Ok(res.last_insert_rowid())
}

/// Overwrite every field of the row with `entry.id`. Returns rows affected.
pub async fn update(pool: &SqlitePool, entry: &DreamEntry) -> Result<u64, sqlx::Error> {
    let res = sqlx::query(UPDATE_SQL)
        .bind(&entry.title)
        .bind(&entry.body)
        .bind(&entry.date)
        .bind(entry.mood)
        .bind(bool_to_flag(entry.is_lucid))
        .bind(bool_to_flag(entry.is_nightmare))
        .bind(encode_list(&entry.tags))
        .bind(encode_list(&entry.images))
        .bind(&entry.interpretation)
        .bind(entry.id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

pub async fn delete(pool: &SqlitePool, id: i64) -> Result<u64, sqlx::Error> {
    let res = sqlx::query(DELETE_SQL).bind(id).execute(pool).await?;
    Ok(res.rows_affected())
}

pub async fn clear(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let res = sqlx::query(CLEAR_SQL).execute(pool).await?;
    Ok(res.rows_affected())
}

fn row_to_entry(row: &SqliteRow) -> Option<DreamEntry> {
    let id: i64 = match row.try_get("id") {
        Ok(id) => id,
        Err(err) => {
            warn!(target: "dream_journal", event = "row_unreadable", error = %err);
            return None;
        }
    };

    let text = |column: &'static str| -> Option<String> {
        match row.try_get::<Option<String>, _>(column) {
            Ok(value) => value,
            Err(err) => {
                warn!(target: "dream_journal", event = "column_unreadable", column, id, error = %err);
                None
            }
        }
    };
    let int = |column: &'static str| -> i64 {
        match row.try_get::<Option<i64>, _>(column) {
            Ok(value) => value.unwrap_or(0),
            Err(err) => {
                warn!(target: "dream_journal", event = "column_unreadable", column, id, error = %err);
                0
            }
        }
    };

    Some(DreamEntry {
        id,
        title: text("title").unwrap_or_default(),
        body: text("body").unwrap_or_default(),
        date: text("date").unwrap_or_default(),
        mood: int("mood"),
        is_lucid: int("isLucid") != 0,
        is_nightmare: int("isNightmare") != 0,
        tags: decode_list(text("tags").as_deref(), "tags", id),
        images: decode_list(text("images").as_deref(), "images", id),
        interpretation: text("interpretation").unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_pool;
    use crate::migrate::apply_migrations;

    async fn pool() -> SqlitePool {
        let pool = open_memory_pool().await.expect("pool");
        apply_migrations(&pool).await.expect("migrate");
        pool
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids_and_select_is_newest_first() {
        let pool = pool().await;
        let first = insert(&pool, &DreamDraft::titled("first")).await.expect("insert");
        let second = insert(&pool, &DreamDraft::titled("second")).await.expect("insert");
        assert!(second > first);

        let rows = select_all(&pool).await.expect("select");
        let ids: Vec<i64> = rows.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[tokio::test]
    async fn null_columns_read_as_defaults() {
        let pool = pool().await;
        sqlx::query("INSERT INTO dreams (title) VALUES ('sparse')")
            .execute(&pool)
            .await
            .expect("raw insert");
        let rows = select_all(&pool).await.expect("select");
        assert_eq!(rows.len(), 1);
        let entry = &rows[0];
        assert_eq!(entry.body, "");
        assert_eq!(entry.mood, 0);
        assert!(!entry.is_lucid);
        assert!(entry.tags.is_empty());
        assert!(entry.images.is_empty());
        assert_eq!(entry.interpretation, "");
    }

    #[tokio::test]
    async fn update_and_delete_report_rows_affected() {
        let pool = pool().await;
        let id = insert(&pool, &DreamDraft::titled("x")).await.expect("insert");
        let entry = DreamDraft::titled("y").into_entry(id);
        assert_eq!(update(&pool, &entry).await.expect("update"), 1);
        let ghost = DreamDraft::titled("ghost").into_entry(id + 100);
        assert_eq!(update(&pool, &ghost).await.expect("update"), 0);
        assert_eq!(delete(&pool, id).await.expect("delete"), 1);
        assert_eq!(delete(&pool, id).await.expect("delete"), 0);
    }
}
