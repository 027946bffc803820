//! Data access for the panel's tables.
//!
//! Each table gets its own repository trait; [`Backend`] bundles them so
//! handlers can hold a single `Arc<dyn Backend>`. [`PgStore`] talks to
//! PostgreSQL, [`MemoryStore`] keeps everything in process.

pub mod memory;
pub mod postgres;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::err::Error;
use crate::models::{AdminAccount, AdminSession, AttendanceRecord, ExamSession, ReportRow, Student};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, Error>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StudentCounts {
    pub total: i64,
    pub submitted: i64,
}

#[async_trait::async_trait]
pub trait StudentStore {
    /// All students, oldest registration first.
    async fn list_students(&self) -> StoreResult<Vec<Student>>;

    /// All students ordered by roll number, as the attendance sheet lists them.
    async fn roster(&self) -> StoreResult<Vec<Student>>;

    async fn get_student(&self, id: Uuid) -> StoreResult<Option<Student>>;

    /// Id of the student holding `roll_no`, if any.
    async fn find_roll_no(&self, roll_no: &str) -> StoreResult<Option<Uuid>>;

    async fn insert_student(&self, student: &Student) -> StoreResult<()>;

    /// Returns `false` when no student has `student.id`.
    async fn update_student(&self, student: &Student) -> StoreResult<bool>;

    /// Deletes the student together with its attendance rows. Returns the ids
    /// of the removed attendance rows, or `None` when no student has `id`.
    async fn delete_student(&self, id: Uuid) -> StoreResult<Option<Vec<Uuid>>>;

    async fn set_form_submitted(
        &self,
        id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> StoreResult<bool>;

    async fn count_students(&self) -> StoreResult<StudentCounts>;
}

#[async_trait::async_trait]
pub trait AttendanceStore {
    async fn attendance_for_date(&self, date: NaiveDate) -> StoreResult<Vec<AttendanceRecord>>;

    /// Inserts every record or none of them.
    async fn insert_attendance(&self, records: &[AttendanceRecord]) -> StoreResult<()>;

    /// Sets the status of each `(student, date)` row in one all-or-nothing
    /// batch. Returns the students that had no row for `date`.
    async fn update_attendance(
        &self,
        date: NaiveDate,
        statuses: &[(Uuid, String)],
    ) -> StoreResult<Vec<Uuid>>;

    /// Every attendance row joined with its student, newest date first.
    async fn attendance_report(&self) -> StoreResult<Vec<ReportRow>>;
}

#[async_trait::async_trait]
pub trait ExamSessionStore {
    /// All exam sessions, latest end date first.
    async fn list_sessions(&self) -> StoreResult<Vec<ExamSession>>;

    async fn get_session(&self, id: Uuid) -> StoreResult<Option<ExamSession>>;

    async fn insert_session(&self, session: &ExamSession) -> StoreResult<()>;

    async fn update_session(&self, session: &ExamSession) -> StoreResult<bool>;

    async fn delete_session(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait::async_trait]
pub trait AdminStore {
    async fn find_admin(&self, email: &str) -> StoreResult<Option<AdminAccount>>;

    async fn insert_admin(&self, admin: &AdminAccount) -> StoreResult<()>;

    async fn find_admin_session(&self, ssid: &str) -> StoreResult<Option<AdminSession>>;

    async fn admin_session_for(&self, admin: Uuid) -> StoreResult<Option<AdminSession>>;

    async fn insert_admin_session(&self, session: &AdminSession) -> StoreResult<()>;

    async fn drop_admin_session(&self, ssid: &str) -> StoreResult<bool>;
}

pub trait Backend:
    StudentStore + AttendanceStore + ExamSessionStore + AdminStore + Send + Sync
{
}

impl<T> Backend for T where
    T: StudentStore + AttendanceStore + ExamSessionStore + AdminStore + Send + Sync
{
}
