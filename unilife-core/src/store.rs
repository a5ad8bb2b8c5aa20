//! SQLite document store: weather observations, users, courses, faculties
//! and locations.
//!
//! Nested values (course schedules) are kept as JSON text. The connection
//! sits behind a `Mutex` and the lock is only held for synchronous calls,
//! never across `.await` points.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, types::Type};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::model::{Course, Faculty, Location, LocationKey, NewUser, User, WeatherObservation};
use crate::registry::LocationRegistry;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Append/evict collection of forecast observations.
pub trait WeatherStore: Send + Sync {
    /// Remove every observation stored for `key`, returning how many were removed.
    fn delete_all_for(&self, key: &LocationKey) -> Result<usize>;

    /// Store a batch of observations for `key`.
    fn insert_batch(&self, key: &LocationKey, observations: &[WeatherObservation]) -> Result<()>;

    /// Up to `limit` observations for `key`, oldest slot first.
    fn find_recent_for(&self, key: &LocationKey, limit: usize) -> Result<Vec<WeatherObservation>>;
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS weather (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        location_key  TEXT NOT NULL,
        city          TEXT,
        temp          REAL NOT NULL,
        description   TEXT NOT NULL,
        timestamp     INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_weather_key_ts ON weather(location_key, timestamp);

    CREATE TABLE IF NOT EXISTS users (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        email       TEXT NOT NULL UNIQUE,
        username    TEXT UNIQUE,
        name        TEXT NOT NULL DEFAULT '',
        token       TEXT NOT NULL DEFAULT '',
        lat         REAL,
        lng         REAL,
        joined_at   TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_users_token ON users(token);

    CREATE TABLE IF NOT EXISTS courses (
        user_id     INTEGER NOT NULL REFERENCES users(id),
        name        TEXT NOT NULL,
        semester    INTEGER,
        professor   TEXT,
        grade       REAL,
        schedule    TEXT NOT NULL DEFAULT '[]',
        UNIQUE(user_id, name)
    );

    CREATE TABLE IF NOT EXISTS faculties (
        name        TEXT NOT NULL UNIQUE,
        dean        TEXT,
        city        TEXT
    );

    CREATE TABLE IF NOT EXISTS locations (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL,
        lat         REAL,
        lng         REAL
    );";

const USER_COLUMNS: &str = "id, email, username, name, token, lat, lng, joined_at";

/// Storage form of a key. Prefixed so a name can never alias coordinates.
fn storage_key(key: &LocationKey) -> String {
    match key {
        LocationKey::Name(name) => format!("name:{name}"),
        LocationKey::Coordinates { .. } => format!("geo:{key}"),
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let joined_at: String = row.get(7)?;
    let joined_at = DateTime::parse_from_rfc3339(&joined_at)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        name: row.get(3)?,
        token: row.get(4)?,
        lat: row.get(5)?,
        lng: row.get(6)?,
        joined_at,
    })
}

/// SQLite-backed store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// Private in-memory database, used by tests and one-shot commands.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Remove every document from every collection.
    pub fn purge(&self) -> Result<()> {
        self.conn()?.execute_batch(
            "DELETE FROM weather; DELETE FROM courses; DELETE FROM users; \
             DELETE FROM faculties; DELETE FROM locations;",
        )?;
        Ok(())
    }

    pub fn insert_location(&self, name: &str, lat: Option<f64>, lng: Option<f64>) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO locations (name, lat, lng) VALUES (?1, ?2, ?3)",
            params![name, lat, lng],
        )?;
        Ok(())
    }

    /// Insert a user and return its id.
    pub fn insert_user(&self, user: &NewUser) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (email, username, name, token, lat, lng, joined_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.email,
                user.username,
                user.name,
                user.token,
                user.lat,
                user.lng,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
        let rows = stmt.query_map([], user_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    pub fn find_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1 COLLATE NOCASE"),
            params![email],
            user_from_row,
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// The user holding `token`. An empty token never matches.
    pub fn find_user_by_token(&self, token: &str) -> Result<Option<User>> {
        if token.is_empty() {
            return Ok(None);
        }
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE token = ?1"),
            params![token],
            user_from_row,
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn update_user_location(&self, id: i64, lat: f64, lng: f64) -> Result<()> {
        self.conn()?.execute(
            "UPDATE users SET lat = ?1, lng = ?2 WHERE id = ?3",
            params![lat, lng, id],
        )?;
        Ok(())
    }

    pub fn insert_course(&self, course: &Course) -> Result<()> {
        let schedule = serde_json::to_string(&course.schedule)?;
        self.conn()?.execute(
            "INSERT INTO courses (user_id, name, semester, professor, grade, schedule) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                course.user_id,
                course.name,
                course.semester,
                course.professor,
                course.grade,
                schedule
            ],
        )?;
        Ok(())
    }

    pub fn courses_for_user(&self, user_id: i64) -> Result<Vec<Course>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, name, semester, professor, grade, schedule \
             FROM courses WHERE user_id = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            let schedule: String = row.get(5)?;
            let schedule = serde_json::from_str(&schedule).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
            })?;
            Ok(Course {
                user_id: row.get(0)?,
                name: row.get(1)?,
                semester: row.get(2)?,
                professor: row.get(3)?,
                grade: row.get(4)?,
                schedule,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    pub fn insert_faculty(&self, faculty: &Faculty) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO faculties (name, dean, city) VALUES (?1, ?2, ?3)",
            params![faculty.name, faculty.dean, faculty.city],
        )?;
        Ok(())
    }

    pub fn list_faculties(&self) -> Result<Vec<Faculty>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name, dean, city FROM faculties ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(Faculty { name: row.get(0)?, dean: row.get(1)?, city: row.get(2)? })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }
}

impl WeatherStore for SqliteStore {
    fn delete_all_for(&self, key: &LocationKey) -> Result<usize> {
        let deleted = self.conn()?.execute(
            "DELETE FROM weather WHERE location_key = ?1",
            params![storage_key(key)],
        )?;
        Ok(deleted)
    }

    fn insert_batch(&self, key: &LocationKey, observations: &[WeatherObservation]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO weather (location_key, city, temp, description, timestamp) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let stored_key = storage_key(key);
            for obs in observations {
                stmt.execute(params![
                    stored_key,
                    obs.city,
                    obs.temp,
                    obs.description,
                    obs.timestamp.timestamp()
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn find_recent_for(&self, key: &LocationKey, limit: usize) -> Result<Vec<WeatherObservation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT city, temp, description, timestamp FROM weather \
             WHERE location_key = ?1 ORDER BY timestamp ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![storage_key(key), limit as i64], |row| {
            let ts: i64 = row.get(3)?;
            let timestamp = DateTime::from_timestamp(ts, 0).ok_or_else(|| {
                rusqlite::Error::IntegralValueOutOfRange(3, ts)
            })?;
            Ok(WeatherObservation {
                location: Some(key.clone()),
                city: row.get(0)?,
                temp: row.get(1)?,
                description: row.get(2)?,
                timestamp,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }
}

impl LocationRegistry for SqliteStore {
    /// Explicit `locations` rows, or, when there are none, one location per
    /// user with known coordinates. Duplicates are kept; callers dedupe.
    fn list_locations(&self) -> Result<Vec<Location>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name, lat, lng FROM locations ORDER BY id")?;
        let registered = stmt
            .query_map([], |row| {
                let name: String = row.get(0)?;
                Ok(Location::resolve(name, row.get(1)?, row.get(2)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if !registered.is_empty() {
            return Ok(registered);
        }

        let mut stmt = conn.prepare(
            "SELECT lat, lng FROM users WHERE lat IS NOT NULL AND lng IS NOT NULL ORDER BY id",
        )?;
        let implied = stmt
            .query_map([], |row| Ok(Location::at(row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(implied)
    }
}
