//! Table definitions and row mapping.

use chrono::{DateTime, Local, NaiveDate};
use presence_core::source::BoxError;
use presence_core::{AttendanceEntry, AttendanceRecord, Camera, Employee, FaceTemplate};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use uuid::Uuid;

pub(crate) const DAY_FORMAT: &str = "%Y-%m-%d";

/// `seq` fixes enrollment order; upserts keep it stable.
const CREATE_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS employees (
        seq             INTEGER PRIMARY KEY AUTOINCREMENT,
        id              TEXT NOT NULL UNIQUE,
        employee_number TEXT NOT NULL UNIQUE,
        name            TEXT NOT NULL,
        email           TEXT,
        position        TEXT,
        department      TEXT,
        active          INTEGER NOT NULL DEFAULT 1,
        template        TEXT
    );

    CREATE TABLE IF NOT EXISTS cameras (
        id       TEXT PRIMARY KEY,
        name     TEXT NOT NULL,
        location TEXT,
        active   INTEGER NOT NULL DEFAULT 1
    );

    CREATE TABLE IF NOT EXISTS attendance (
        id          TEXT PRIMARY KEY,
        employee_id TEXT NOT NULL REFERENCES employees(id),
        camera_id   TEXT NOT NULL REFERENCES cameras(id),
        event_type  TEXT NOT NULL CHECK (event_type IN ('check-in', 'check-out')),
        day         TEXT NOT NULL,
        timestamp   TEXT NOT NULL,
        recorded_at INTEGER NOT NULL,
        confidence  REAL NOT NULL,
        probe_ref   TEXT NOT NULL,
        UNIQUE (employee_id, event_type, day)
    );

    CREATE INDEX IF NOT EXISTS attendance_by_day ON attendance (day, recorded_at);
";

pub(crate) fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.execute_batch(CREATE_TABLES)
}

pub(crate) const EMPLOYEE_COLUMNS: &str =
    "id, employee_number, name, email, position, department, active, template";

pub(crate) const CAMERA_COLUMNS: &str = "id, name, location, active";

/// Attendance joined with its employee and camera; column order matches
/// [`entry_from_row`].
pub(crate) const ENTRY_SELECT: &str = "
    SELECT a.id, a.employee_id, a.camera_id, a.event_type, a.timestamp, a.day,
           a.confidence, a.probe_ref,
           e.id, e.employee_number, e.name, e.email, e.position, e.department,
           e.active, e.template,
           c.id, c.name, c.location, c.active
      FROM attendance a
      JOIN employees e ON e.id = a.employee_id
      JOIN cameras c ON c.id = a.camera_id
";

fn conversion_error(idx: usize, err: impl Into<BoxError>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

/// Map an employee starting at column `offset`.
pub(crate) fn employee_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Employee> {
    let template: Option<String> = row.get(offset + 7)?;
    Ok(Employee {
        id: row.get(offset)?,
        employee_number: row.get(offset + 1)?,
        name: row.get(offset + 2)?,
        email: row.get(offset + 3)?,
        position: row.get(offset + 4)?,
        department: row.get(offset + 5)?,
        active: row.get(offset + 6)?,
        template: template.filter(|t| !t.is_empty()).map(FaceTemplate),
    })
}

pub(crate) fn employee_from_row(row: &Row<'_>) -> rusqlite::Result<Employee> {
    employee_at(row, 0)
}

/// Map a camera starting at column `offset`.
pub(crate) fn camera_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Camera> {
    Ok(Camera {
        id: row.get(offset)?,
        name: row.get(offset + 1)?,
        location: row.get(offset + 2)?,
        active: row.get(offset + 3)?,
    })
}

pub(crate) fn camera_from_row(row: &Row<'_>) -> rusqlite::Result<Camera> {
    camera_at(row, 0)
}

pub(crate) fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<AttendanceEntry> {
    let id: String = row.get(0)?;
    let id = Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?;

    let event_type: String = row.get(3)?;
    let event_type = event_type.parse().map_err(|e: String| conversion_error(3, e))?;

    let timestamp: String = row.get(4)?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|e| conversion_error(4, e))?
        .with_timezone(&Local);

    let day: String = row.get(5)?;
    let day = NaiveDate::parse_from_str(&day, DAY_FORMAT).map_err(|e| conversion_error(5, e))?;

    let confidence: f64 = row.get(6)?;

    let record = AttendanceRecord {
        id,
        employee_id: row.get(1)?,
        camera_id: row.get(2)?,
        event_type,
        timestamp,
        day,
        confidence: confidence as f32,
        probe_ref: row.get(7)?,
    };

    Ok(AttendanceEntry {
        record,
        employee: employee_at(row, 8)?,
        camera: camera_at(row, 16)?,
    })
}
