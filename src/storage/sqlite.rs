use super::{EventFilter, EventStore};
use crate::domain::{AgeGroup, Event, PriceType};
use crate::error::{Result, ScraperError};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const SELECT_COLUMNS: &str = "SELECT id, title, description, date_start, date_end, location_name, address, city, \
     latitude, longitude, age_group, categories, price_type, source_url, image_url, last_updated_at FROM events";

/// SQLite-backed event store.
///
/// Instants are stored as unix seconds and categories as a JSON array;
/// the category filter is applied to decoded rows. Statements run on the
/// blocking pool, one at a time.
pub struct SqliteEventStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEventStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!("Opened SQLite event store at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                title           TEXT NOT NULL,
                description     TEXT NOT NULL,
                date_start      INTEGER NOT NULL,
                date_end        INTEGER NOT NULL,
                location_name   TEXT NOT NULL,
                address         TEXT NOT NULL,
                city            TEXT NOT NULL,
                latitude        REAL NOT NULL,
                longitude       REAL NOT NULL,
                age_group       TEXT NOT NULL,
                categories      TEXT NOT NULL,
                price_type      TEXT NOT NULL,
                source_url      TEXT NOT NULL,
                image_url       TEXT,
                last_updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_dedup ON events (title, location_name, date_start);
            CREATE INDEX IF NOT EXISTS idx_events_date_end ON events (date_end);
            "#,
        )?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Runs `f` against the connection on tokio's blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| ScraperError::Storage(format!("sqlite connection lock poisoned: {}", e)))?;
            f(&guard)
        })
        .await
        .map_err(|e| ScraperError::Storage(format!("sqlite task failed: {}", e)))?
    }
}

fn query_events(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, StoredRow::from_row)?;
    let mut events = Vec::new();
    for row in rows {
        events.push(row?.into_event()?);
    }
    Ok(events)
}

/// Column values as SQLite hands them back
struct StoredRow {
    id: i64,
    title: String,
    description: String,
    date_start: i64,
    date_end: i64,
    location_name: String,
    address: String,
    city: String,
    latitude: f64,
    longitude: f64,
    age_group: String,
    categories: String,
    price_type: String,
    source_url: String,
    image_url: Option<String>,
    last_updated_at: i64,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            date_start: row.get(3)?,
            date_end: row.get(4)?,
            location_name: row.get(5)?,
            address: row.get(6)?,
            city: row.get(7)?,
            latitude: row.get(8)?,
            longitude: row.get(9)?,
            age_group: row.get(10)?,
            categories: row.get(11)?,
            price_type: row.get(12)?,
            source_url: row.get(13)?,
            image_url: row.get(14)?,
            last_updated_at: row.get(15)?,
        })
    }

    fn into_event(self) -> Result<Event> {
        Ok(Event {
            id: Some(self.id),
            title: self.title,
            description: self.description,
            date_start: from_unix(self.date_start)?,
            date_end: from_unix(self.date_end)?,
            location_name: self.location_name,
            address: self.address,
            city: self.city,
            latitude: self.latitude,
            longitude: self.longitude,
            age_group: self.age_group.parse::<AgeGroup>()?,
            categories: serde_json::from_str(&self.categories)?,
            price_type: self.price_type.parse::<PriceType>()?,
            source_url: self.source_url,
            image_url: self.image_url,
            last_updated_at: from_unix(self.last_updated_at)?,
        })
    }
}

fn from_unix(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| ScraperError::Storage(format!("timestamp {} out of range", secs)))
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn insert(&self, mut event: Event) -> Result<Event> {
        let categories = serde_json::to_string(&event.categories)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO events (title, description, date_start, date_end, location_name, address, city,
                    latitude, longitude, age_group, categories, price_type, source_url, image_url, last_updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    event.title,
                    event.description,
                    event.date_start.timestamp(),
                    event.date_end.timestamp(),
                    event.location_name,
                    event.address,
                    event.city,
                    event.latitude,
                    event.longitude,
                    event.age_group.as_str(),
                    categories,
                    event.price_type.as_str(),
                    event.source_url,
                    event.image_url,
                    event.last_updated_at.timestamp(),
                ],
            )?;
            let id = conn.last_insert_rowid();
            event.id = Some(id);
            debug!("Created event: {} with id {}", event.title, id);
            Ok(event)
        })
        .await
    }

    async fn all(&self) -> Result<Vec<Event>> {
        self.with_conn(|conn| query_events(conn, &format!("{} ORDER BY date_start, id", SELECT_COLUMNS), &[]))
            .await
    }

    async fn by_filter(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        let events = self.all().await?;
        Ok(events.into_iter().filter(|e| filter.matches(e)).collect())
    }

    async fn by_id(&self, id: i64) -> Result<Option<Event>> {
        self.with_conn(move |conn| {
            conn.query_row(&format!("{} WHERE id = ?1", SELECT_COLUMNS), params![id], StoredRow::from_row)
                .optional()?
                .map(StoredRow::into_event)
                .transpose()
        })
        .await
    }

    async fn exists_exact(&self, title: &str, date_start: DateTime<Utc>, location_name: &str) -> Result<bool> {
        let (title, location_name) = (title.to_string(), location_name.to_string());
        let start = date_start.timestamp();
        self.with_conn(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT id FROM events WHERE title = ?1 AND date_start = ?2 AND location_name = ?3 LIMIT 1",
                    params![title, start, location_name],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn find_by_title_location(&self, title: &str, location_name: &str) -> Result<Option<Event>> {
        let (title, location_name) = (title.to_string(), location_name.to_string());
        self.with_conn(move |conn| {
            let mut events = query_events(
                conn,
                &format!("{} WHERE title = ?1 AND location_name = ?2 ORDER BY id LIMIT 1", SELECT_COLUMNS),
                params![title, location_name],
            )?;
            Ok(events.pop())
        })
        .await
    }

    async fn delete_start_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let cutoff = cutoff.timestamp();
        self.with_conn(move |conn| Ok(conn.execute("DELETE FROM events WHERE date_start < ?1", params![cutoff])?))
            .await
    }

    async fn delete_end_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let cutoff = cutoff.timestamp();
        self.with_conn(move |conn| Ok(conn.execute("DELETE FROM events WHERE date_end < ?1", params![cutoff])?))
            .await
    }

    async fn clear(&self) -> Result<usize> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM events", [])?)).await
    }

    async fn count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
            Ok(n as usize)
        })
        .await
    }
}
