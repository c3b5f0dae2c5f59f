use crate::schema::{
    self, employee_from_row, entry_from_row, CAMERA_COLUMNS, DAY_FORMAT, EMPLOYEE_COLUMNS,
    ENTRY_SELECT,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use presence_core::{
    AttendanceEntry, Camera, CameraDirectory, CandidateSource, Employee, Ledger, NewAttendance,
    StoreError,
};
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use tokio_rusqlite::Connection;
use uuid::Uuid;

/// SQLite-backed store. Cheap to clone; all clones share one connection
/// thread.
#[derive(Clone)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database file, creating parent directories.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::backend)?;
        }
        let conn = Connection::open(path).await.map_err(StoreError::backend)?;
        tracing::info!(path = %path.display(), "attendance store opened");
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(StoreError::backend)?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| Ok(schema::init(conn)?))
            .await
            .map_err(StoreError::backend)?;
        Ok(Self { conn })
    }

    /// Insert or update an employee row. Used for fixtures and sample data;
    /// enrollment order is preserved across updates.
    pub async fn upsert_employee(&self, employee: Employee) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO employees
                         (id, employee_number, name, email, position, department, active, template)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(id) DO UPDATE SET
                         employee_number = excluded.employee_number,
                         name = excluded.name,
                         email = excluded.email,
                         position = excluded.position,
                         department = excluded.department,
                         active = excluded.active,
                         template = excluded.template",
                    params![
                        employee.id,
                        employee.employee_number,
                        employee.name,
                        employee.email,
                        employee.position,
                        employee.department,
                        employee.active,
                        employee.template.map(|t| t.0),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(StoreError::backend)
    }

    /// Insert or update a camera row. Used for fixtures and sample data.
    pub async fn upsert_camera(&self, camera: Camera) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO cameras (id, name, location, active)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                         name = excluded.name,
                         location = excluded.location,
                         active = excluded.active",
                    params![camera.id, camera.name, camera.location, camera.active],
                )?;
                Ok(())
            })
            .await
            .map_err(StoreError::backend)
    }

    /// Ledger read path, newest first. `day` limits the listing to one
    /// local calendar day.
    pub async fn list_attendance(
        &self,
        day: Option<NaiveDate>,
    ) -> Result<Vec<AttendanceEntry>, StoreError> {
        self.conn
            .call(move |conn| {
                let entries = match day {
                    Some(day) => {
                        let mut stmt = conn.prepare(&format!(
                            "{ENTRY_SELECT} WHERE a.day = ?1 ORDER BY a.recorded_at DESC"
                        ))?;
                        let rows = stmt.query_map([day.format(DAY_FORMAT).to_string()], entry_from_row)?;
                        rows.collect::<Result<Vec<_>, _>>()?
                    }
                    None => {
                        let mut stmt =
                            conn.prepare(&format!("{ENTRY_SELECT} ORDER BY a.recorded_at DESC"))?;
                        let rows = stmt.query_map([], entry_from_row)?;
                        rows.collect::<Result<Vec<_>, _>>()?
                    }
                };
                Ok(entries)
            })
            .await
            .map_err(StoreError::backend)
    }
}

#[async_trait]
impl CandidateSource for Store {
    async fn list_active_with_template(&self) -> Result<Vec<Employee>, StoreError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EMPLOYEE_COLUMNS} FROM employees
                      WHERE active = 1 AND template IS NOT NULL AND template != ''
                      ORDER BY seq"
                ))?;
                let rows = stmt.query_map([], employee_from_row)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(StoreError::backend)
    }
}

#[async_trait]
impl CameraDirectory for Store {
    async fn get(&self, camera_id: &str) -> Result<Option<Camera>, StoreError> {
        let camera_id = camera_id.to_string();
        self.conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {CAMERA_COLUMNS} FROM cameras WHERE id = ?1"),
                        [camera_id],
                        schema::camera_from_row,
                    )
                    .optional()?)
            })
            .await
            .map_err(StoreError::backend)
    }
}

#[async_trait]
impl Ledger for Store {
    async fn try_insert(&self, entry: NewAttendance) -> Result<AttendanceEntry, StoreError> {
        let id = Uuid::new_v4();
        let day = entry.day();
        let employee_id = entry.employee_id.clone();
        let event_type = entry.event_type;

        let written = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                // The conflict clause is the only duplicate check.
                let inserted = tx.execute(
                    "INSERT INTO attendance
                         (id, employee_id, camera_id, event_type, day, timestamp,
                          recorded_at, confidence, probe_ref)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT (employee_id, event_type, day) DO NOTHING",
                    params![
                        id.to_string(),
                        entry.employee_id,
                        entry.camera_id,
                        entry.event_type.as_str(),
                        day.format(DAY_FORMAT).to_string(),
                        entry.timestamp.to_rfc3339(),
                        entry.timestamp.timestamp_millis(),
                        f64::from(entry.confidence),
                        entry.probe_ref,
                    ],
                )?;
                if inserted == 0 {
                    return Ok(None);
                }

                let written = tx.query_row(
                    &format!("{ENTRY_SELECT} WHERE a.id = ?1"),
                    [id.to_string()],
                    entry_from_row,
                )?;
                tx.commit()?;
                Ok(Some(written))
            })
            .await
            .map_err(StoreError::backend)?;

        match written {
            Some(written) => {
                tracing::debug!(
                    record_id = %written.record.id,
                    employee_id = %written.record.employee_id,
                    event_type = %written.record.event_type,
                    %day,
                    "attendance written"
                );
                Ok(written)
            }
            None => Err(StoreError::DuplicateAttendance {
                employee_id,
                event_type,
                day,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Local, TimeZone};
    use presence_core::{EventType, FaceTemplate};

    fn employee(id: &str, number: &str, active: bool, template: Option<&str>) -> Employee {
        Employee {
            id: id.into(),
            employee_number: number.into(),
            name: format!("Employee {number}"),
            email: None,
            position: None,
            department: Some("IT".into()),
            active,
            template: template.map(|t| FaceTemplate(t.into())),
        }
    }

    fn camera(id: &str) -> Camera {
        Camera {
            id: id.into(),
            name: "Lobby".into(),
            location: Some("Main lobby".into()),
            active: true,
        }
    }

    fn at(d: u32, h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, d, h, m, 0).unwrap()
    }

    fn new_attendance(employee_id: &str, event_type: EventType, ts: DateTime<Local>) -> NewAttendance {
        NewAttendance {
            employee_id: employee_id.into(),
            camera_id: "cam-1".into(),
            event_type,
            confidence: 0.91,
            probe_ref: "digest".into(),
            timestamp: ts,
        }
    }

    async fn seeded() -> Store {
        let store = Store::open_in_memory().await.unwrap();
        store.upsert_camera(camera("cam-1")).await.unwrap();
        store
            .upsert_employee(employee("e1", "001", true, Some("[1.0, 0.0]")))
            .await
            .unwrap();
        store
            .upsert_employee(employee("e2", "002", true, Some("[0.0, 1.0]")))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_insert_returns_enriched_entry() {
        let store = seeded().await;
        let written = store
            .try_insert(new_attendance("e1", EventType::CheckIn, at(2, 7, 5)))
            .await
            .unwrap();

        assert_eq!(written.record.employee_id, "e1");
        assert_eq!(written.record.event_type, EventType::CheckIn);
        assert_eq!(written.record.day, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert!((written.record.confidence - 0.91).abs() < 1e-6);
        assert_eq!(written.employee.employee_number, "001");
        assert_eq!(written.camera.name, "Lobby");
    }

    #[tokio::test]
    async fn test_second_insert_same_day_is_duplicate() {
        let store = seeded().await;
        store
            .try_insert(new_attendance("e1", EventType::CheckOut, at(2, 16, 0)))
            .await
            .unwrap();
        let err = store
            .try_insert(new_attendance("e1", EventType::CheckOut, at(2, 18, 30)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DuplicateAttendance { ref employee_id, event_type: EventType::CheckOut, .. }
                if employee_id == "e1"
        ));
        assert_eq!(store.list_attendance(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_other_type_or_day_is_not_duplicate() {
        let store = seeded().await;
        store
            .try_insert(new_attendance("e1", EventType::CheckIn, at(2, 7, 0)))
            .await
            .unwrap();
        store
            .try_insert(new_attendance("e1", EventType::CheckOut, at(2, 17, 0)))
            .await
            .unwrap();
        store
            .try_insert(new_attendance("e1", EventType::CheckIn, at(3, 7, 0)))
            .await
            .unwrap();
        store
            .try_insert(new_attendance("e2", EventType::CheckIn, at(2, 7, 0)))
            .await
            .unwrap();
        assert_eq!(store.list_attendance(None).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_create_exactly_one_record() {
        let store = seeded().await;
        let attempts = (0..16).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .try_insert(new_attendance("e2", EventType::CheckIn, at(2, 6, i)))
                    .await
            })
        });
        let results = futures::future::join_all(attempts).await;

        let ok = results.iter().filter(|r| matches!(r, Ok(Ok(_)))).count();
        let dup = results
            .iter()
            .filter(|r| matches!(r, Ok(Err(StoreError::DuplicateAttendance { .. }))))
            .count();
        assert_eq!(ok, 1);
        assert_eq!(dup, 15);
        assert_eq!(store.list_attendance(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_employee_is_backend_error() {
        let store = seeded().await;
        let err = store
            .try_insert(new_attendance("ghost", EventType::CheckIn, at(2, 7, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[tokio::test]
    async fn test_candidates_are_active_with_template_in_enrollment_order() {
        let store = seeded().await;
        store
            .upsert_employee(employee("e3", "003", false, Some("[1.0, 1.0]")))
            .await
            .unwrap();
        store
            .upsert_employee(employee("e4", "004", true, None))
            .await
            .unwrap();
        // Updating e1 must not move it behind e2.
        store
            .upsert_employee(employee("e1", "001", true, Some("[0.5, 0.5]")))
            .await
            .unwrap();

        let ids: Vec<String> = store
            .list_active_with_template()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["e1", "e2"]);
    }

    #[tokio::test]
    async fn test_camera_lookup() {
        let store = seeded().await;
        assert_eq!(store.get("cam-1").await.unwrap().unwrap().id, "cam-1");
        assert!(store.get("cam-404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_attendance_by_day_newest_first() {
        let store = seeded().await;
        store
            .try_insert(new_attendance("e1", EventType::CheckIn, at(2, 6, 0)))
            .await
            .unwrap();
        store
            .try_insert(new_attendance("e2", EventType::CheckIn, at(2, 7, 10)))
            .await
            .unwrap();
        store
            .try_insert(new_attendance("e1", EventType::CheckIn, at(3, 7, 0)))
            .await
            .unwrap();

        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let today = store.list_attendance(Some(day)).await.unwrap();
        let ids: Vec<&str> = today.iter().map(|e| e.record.employee_id.as_str()).collect();
        assert_eq!(ids, vec!["e2", "e1"]);
    }

    #[tokio::test]
    async fn test_open_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("attendance.db");
        {
            let store = Store::open(&path).await.unwrap();
            store.upsert_camera(camera("cam-1")).await.unwrap();
        }
        let reopened = Store::open(&path).await.unwrap();
        assert!(reopened.get("cam-1").await.unwrap().is_some());
    }
}
