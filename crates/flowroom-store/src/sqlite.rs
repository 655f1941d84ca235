use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use flowroom_config::RoomDocument;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::Mutex;

use crate::{DocumentUpdate, SharedState, StoreError};

/// SQLite-backed store holding one JSON document per room.
pub struct SqliteStore {
  pool: SqlitePool,
  // SQLite allows a single writer; serialize read-modify-write in-process
  // so transactions don't fail with SQLITE_BUSY on upgrade.
  write_lock: Mutex<()>,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self {
      pool,
      write_lock: Mutex::new(()),
    }
  }

  /// Open (creating if needed) the database at `url` and run migrations.
  pub async fn connect(url: &str) -> Result<Self, StoreError> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
      .max_connections(4)
      .connect_with(options)
      .await?;

    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), StoreError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await?;
    Ok(())
  }

  /// Create or replace the document of a room.
  pub async fn put_document(&self, room_id: &str, document: &RoomDocument) -> Result<(), StoreError> {
    let json = serde_json::to_string(document)?;
    let _guard = self.write_lock.lock().await;

    sqlx::query(
      r#"
      INSERT INTO rooms (room_id, document, updated_at)
      VALUES (?, ?, ?)
      ON CONFLICT(room_id) DO UPDATE SET document = excluded.document, updated_at = excluded.updated_at
      "#,
    )
    .bind(room_id)
    .bind(json)
    .bind(Utc::now())
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  /// List the ids of every stored room.
  pub async fn list_rooms(&self) -> Result<Vec<String>, StoreError> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT room_id FROM rooms ORDER BY room_id")
      .fetch_all(&self.pool)
      .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
  }
}

#[async_trait]
impl SharedState for SqliteStore {
  async fn snapshot(&self, room_id: &str) -> Result<RoomDocument, StoreError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT document FROM rooms WHERE room_id = ?")
      .bind(room_id)
      .fetch_optional(&self.pool)
      .await?;

    let (json,) = row.ok_or_else(|| StoreError::RoomNotFound(room_id.to_string()))?;
    Ok(serde_json::from_str(&json)?)
  }

  async fn mutate(&self, room_id: &str, update: &DocumentUpdate<'_>) -> Result<(), StoreError> {
    let _guard = self.write_lock.lock().await;
    let mut tx = self.pool.begin().await?;

    let row: Option<(String,)> = sqlx::query_as("SELECT document FROM rooms WHERE room_id = ?")
      .bind(room_id)
      .fetch_optional(&mut *tx)
      .await?;

    let (json,) = row.ok_or_else(|| StoreError::RoomNotFound(room_id.to_string()))?;
    let mut document: RoomDocument = serde_json::from_str(&json)?;
    update(&mut document);

    sqlx::query("UPDATE rooms SET document = ?, updated_at = ? WHERE room_id = ?")
      .bind(serde_json::to_string(&document)?)
      .bind(Utc::now())
      .bind(room_id)
      .execute(&mut *tx)
      .await?;

    tx.commit().await?;
    Ok(())
  }
}
