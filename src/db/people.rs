//! People records and the SQLite-backed [`IdentitySource`].
//!
//! Any mutation here changes metadata out-of-band from the recognition engine;
//! callers must follow it with [`MetadataCache::invalidate`](crate::cache::MetadataCache::invalidate).

use std::sync::Mutex;

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::cache::IdentitySource;

/// A person as held by the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub owner_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,
    pub is_active: bool,
    pub updated_at: String,
}

impl Person {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Fields accepted when creating or updating a person.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPerson {
    pub owner_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub department: Option<String>,
    pub designation: Option<String>,
}

/// The identity directory, backed by one SQLite connection.
pub struct SqliteDirectory {
    conn: Mutex<Connection>,
}

impl SqliteDirectory {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open the directory database at `path`.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self::new(super::open_database(path)?))
    }

    /// Insert a person, or update and reactivate an existing one.
    pub fn upsert_person(&self, person: &NewPerson) -> Result<()> {
        anyhow::ensure!(!person.owner_id.is_empty(), "owner_id must not be empty");
        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO people (owner_id, first_name, last_name, email, department, designation, is_active, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7) \
             ON CONFLICT(owner_id) DO UPDATE SET \
               first_name = excluded.first_name, last_name = excluded.last_name, \
               email = excluded.email, department = excluded.department, \
               designation = excluded.designation, is_active = 1, updated_at = excluded.updated_at",
            params![
                person.owner_id,
                person.first_name,
                person.last_name,
                person.email,
                person.department,
                person.designation,
                now,
            ],
        )?;
        tracing::info!(owner_id = %person.owner_id, "person upserted");
        Ok(())
    }

    /// Mark a person inactive. Returns `false` if no such person exists.
    pub fn deactivate_person(&self, owner_id: &str) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE people SET is_active = 0, updated_at = ?1 WHERE owner_id = ?2",
            params![now, owner_id],
        )?;
        Ok(rows > 0)
    }

    /// All people, active or not, ordered by owner id.
    pub fn list_people(&self) -> Result<Vec<Person>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{SELECT_PERSON} ORDER BY owner_id"))?;
        let people = stmt
            .query_map([], row_to_person)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(people)
    }

    /// Integrity and row counts of the underlying database.
    pub fn health(&self) -> Result<super::HealthReport> {
        let conn = self.lock()?;
        super::check_database_health(&conn)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))
    }
}

impl IdentitySource for SqliteDirectory {
    fn get_by_id(&self, owner_id: &str) -> Result<Option<Person>> {
        let conn = self.lock()?;
        let person = conn
            .query_row(
                &format!("{SELECT_PERSON} WHERE owner_id = ?1 AND is_active = 1"),
                params![owner_id],
                row_to_person,
            )
            .optional()?;
        Ok(person)
    }
}

const SELECT_PERSON: &str = "SELECT owner_id, first_name, last_name, email, department, \
     designation, is_active, updated_at FROM people";

fn row_to_person(row: &rusqlite::Row<'_>) -> rusqlite::Result<Person> {
    Ok(Person {
        owner_id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        department: row.get(4)?,
        designation: row.get(5)?,
        is_active: row.get::<_, i64>(6)? == 1,
        updated_at: row.get(7)?,
    })
}
