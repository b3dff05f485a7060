use super::ReservationStore;
use crate::error::StoreError;
use crate::models::{DetailMap, IdentityKey, Reservation};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

const SELECT_COLUMNS: &str =
    "SELECT facility, identity_key, date, place, department, event, approval, detail_url
     FROM reservations";

/// SQLite-backed store; details live in a child table with `ON DELETE CASCADE`
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!("Opened reservation store at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS reservations (
            facility     TEXT NOT NULL,
            identity_key TEXT NOT NULL,
            date         TEXT NOT NULL,
            place        TEXT NOT NULL,
            department   TEXT NOT NULL,
            event        TEXT NOT NULL,
            approval     TEXT NOT NULL,
            detail_url   TEXT NOT NULL DEFAULT '',
            updated_at   TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (facility, identity_key)
        );
        CREATE INDEX IF NOT EXISTS idx_reservations_date ON reservations(facility, date);

        CREATE TABLE IF NOT EXISTS reservation_details (
            facility     TEXT NOT NULL,
            identity_key TEXT NOT NULL,
            name         TEXT NOT NULL,
            value        TEXT NOT NULL,
            PRIMARY KEY (facility, identity_key, name),
            FOREIGN KEY (facility, identity_key)
                REFERENCES reservations(facility, identity_key) ON DELETE CASCADE
        );
        ",
    )?;
    Ok(())
}

fn load_details(conn: &Connection, facility: &str, key: &str) -> Result<DetailMap, StoreError> {
    let mut stmt = conn.prepare_cached(
        "SELECT name, value FROM reservation_details WHERE facility = ?1 AND identity_key = ?2",
    )?;
    let rows = stmt
        .query_map(params![facility, key], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<DetailMap, _>>()?;
    Ok(rows)
}

fn load_reservations(
    conn: &Connection,
    filter: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Reservation>, StoreError> {
    let sql = format!(
        "{} WHERE {} ORDER BY date, place, event, identity_key",
        SELECT_COLUMNS, filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut records = stmt
        .query_map(args, |row| {
            Ok(Reservation {
                facility: row.get(0)?,
                key: IdentityKey::new(row.get::<_, String>(1)?),
                date: row.get(2)?,
                place: row.get(3)?,
                department: row.get(4)?,
                event: row.get(5)?,
                approval: row.get(6)?,
                detail_url: row.get(7)?,
                details: DetailMap::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for record in &mut records {
        record.details = load_details(conn, &record.facility, record.key.as_str())?;
    }
    Ok(records)
}

#[async_trait]
impl ReservationStore for SqliteStore {
    async fn get(
        &self,
        facility: &str,
        key: &IdentityKey,
    ) -> Result<Option<Reservation>, StoreError> {
        let conn = self.lock()?;
        let mut found = load_reservations(
            &conn,
            "facility = ?1 AND identity_key = ?2",
            &[&facility, &key.as_str()],
        )?;
        Ok(found.pop())
    }

    async fn put(&self, reservation: &Reservation) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            tx.execute(
                "INSERT INTO reservations
                 (facility, identity_key, date, place, department, event, approval, detail_url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT (facility, identity_key) DO UPDATE SET
                    date = excluded.date,
                    place = excluded.place,
                    department = excluded.department,
                    event = excluded.event,
                    approval = excluded.approval,
                    detail_url = excluded.detail_url,
                    updated_at = datetime('now')",
                params![
                    reservation.facility,
                    reservation.key.as_str(),
                    reservation.date,
                    reservation.place,
                    reservation.department,
                    reservation.event,
                    reservation.approval,
                    reservation.detail_url,
                ],
            )?;

            tx.execute(
                "DELETE FROM reservation_details WHERE facility = ?1 AND identity_key = ?2",
                params![reservation.facility, reservation.key.as_str()],
            )?;

            let mut stmt = tx.prepare(
                "INSERT INTO reservation_details (facility, identity_key, name, value)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (name, value) in &reservation.details {
                stmt.execute(params![
                    reservation.facility,
                    reservation.key.as_str(),
                    name,
                    value
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn delete(&self, facility: &str, key: &IdentityKey) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM reservations WHERE facility = ?1 AND identity_key = ?2",
            params![facility, key.as_str()],
        )?;
        Ok(removed > 0)
    }

    async fn query_by_source(&self, facility: &str) -> Result<Vec<Reservation>, StoreError> {
        let conn = self.lock()?;
        load_reservations(&conn, "facility = ?1", &[&facility])
    }

    async fn query_by_source_and_date(
        &self,
        facility: &str,
        date: &str,
    ) -> Result<Vec<Reservation>, StoreError> {
        let conn = self.lock()?;
        load_reservations(&conn, "facility = ?1 AND date = ?2", &[&facility, &date])
    }

    async fn query_by_source_and_date_before(
        &self,
        facility: &str,
        before: &str,
    ) -> Result<Vec<Reservation>, StoreError> {
        let conn = self.lock()?;
        load_reservations(&conn, "facility = ?1 AND date < ?2", &[&facility, &before])
    }

    async fn details(&self, facility: &str, key: &IdentityKey) -> Result<DetailMap, StoreError> {
        let conn = self.lock()?;
        load_details(&conn, facility, key.as_str())
    }

    async fn facilities(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT facility FROM reservations ORDER BY facility")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }
}
