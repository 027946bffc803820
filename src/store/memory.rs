use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AdminStore, AttendanceStore, ExamSessionStore, StoreResult, StudentCounts, StudentStore,
};
use crate::err::Error;
use crate::models::{AdminAccount, AdminSession, AttendanceRecord, ExamSession, ReportRow, Student};

#[derive(Default)]
struct Tables {
    students: Vec<Student>,
    attendance: Vec<AttendanceRecord>,
    sessions: Vec<ExamSession>,
    admins: Vec<AdminAccount>,
    admin_sessions: Vec<AdminSession>,
}

/// In-process tables behind one lock. Writes take the lock once, so every
/// operation is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Mirrors the partial unique index on `students.roll_no`.
fn ensure_roll_no_free(tables: &Tables, student: &Student) -> StoreResult<()> {
    if student.roll_no.is_empty() {
        return Ok(());
    }
    let taken = tables
        .students
        .iter()
        .any(|s| s.roll_no == student.roll_no && s.id != student.id);
    if taken {
        return Err(Error::conflict(format!(
            "Roll number `{}` already exists",
            student.roll_no
        )));
    }
    Ok(())
}

/// Mirrors the `attendance_status_present` check.
fn ensure_status(status: &str) -> StoreResult<()> {
    if status.is_empty() {
        return Err(Error::invalid("Attendance status must not be empty"));
    }
    Ok(())
}

#[async_trait::async_trait]
impl StudentStore for MemoryStore {
    async fn list_students(&self) -> StoreResult<Vec<Student>> {
        let tables = self.tables.read().await;
        let mut students = tables.students.clone();
        students.sort_by_key(|s| s.created_at);
        Ok(students)
    }

    async fn roster(&self) -> StoreResult<Vec<Student>> {
        let tables = self.tables.read().await;
        let mut students = tables.students.clone();
        students.sort_by(|a, b| a.roll_no.cmp(&b.roll_no));
        Ok(students)
    }

    async fn get_student(&self, id: Uuid) -> StoreResult<Option<Student>> {
        let tables = self.tables.read().await;
        Ok(tables.students.iter().find(|s| s.id == id).cloned())
    }

    async fn find_roll_no(&self, roll_no: &str) -> StoreResult<Option<Uuid>> {
        let tables = self.tables.read().await;
        Ok(tables
            .students
            .iter()
            .find(|s| s.roll_no == roll_no)
            .map(|s| s.id))
    }

    async fn insert_student(&self, student: &Student) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.students.iter().any(|s| s.id == student.id) {
            return Err(Error::conflict(format!("Student `{}` already exists", student.id)));
        }
        ensure_roll_no_free(&tables, student)?;
        tables.students.push(student.clone());
        Ok(())
    }

    async fn update_student(&self, student: &Student) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        ensure_roll_no_free(&tables, student)?;
        match tables.students.iter_mut().find(|s| s.id == student.id) {
            Some(existing) => {
                *existing = student.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_student(&self, id: Uuid) -> StoreResult<Option<Vec<Uuid>>> {
        let mut tables = self.tables.write().await;
        let before = tables.students.len();
        tables.students.retain(|s| s.id != id);
        if tables.students.len() == before {
            return Ok(None);
        }
        let removed = tables
            .attendance
            .iter()
            .filter(|r| r.student_id == id)
            .map(|r| r.id)
            .collect();
        tables.attendance.retain(|r| r.student_id != id);
        Ok(Some(removed))
    }

    async fn set_form_submitted(
        &self,
        id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.students.iter_mut().find(|s| s.id == id) {
            Some(student) => {
                student.form_submitted_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_students(&self) -> StoreResult<StudentCounts> {
        let tables = self.tables.read().await;
        Ok(StudentCounts {
            total: tables.students.len() as i64,
            submitted: tables
                .students
                .iter()
                .filter(|s| s.form_submitted_at.is_some())
                .count() as i64,
        })
    }
}

#[async_trait::async_trait]
impl AttendanceStore for MemoryStore {
    async fn attendance_for_date(&self, date: NaiveDate) -> StoreResult<Vec<AttendanceRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .attendance
            .iter()
            .filter(|r| r.date == date)
            .cloned()
            .collect())
    }

    async fn insert_attendance(&self, records: &[AttendanceRecord]) -> StoreResult<()> {
        let mut tables = self.tables.write().await;

        let mut keys: HashSet<(Uuid, NaiveDate)> = tables
            .attendance
            .iter()
            .map(|r| (r.student_id, r.date))
            .collect();
        for record in records {
            ensure_status(&record.status)?;
            if !tables.students.iter().any(|s| s.id == record.student_id) {
                return Err(Error::invalid(format!(
                    "Student `{}` does not exist",
                    record.student_id
                )));
            }
            if !keys.insert((record.student_id, record.date)) {
                return Err(Error::conflict(format!(
                    "Attendance for student `{}` on {} already exists",
                    record.student_id, record.date
                )));
            }
        }

        tables.attendance.extend_from_slice(records);
        Ok(())
    }

    async fn update_attendance(
        &self,
        date: NaiveDate,
        statuses: &[(Uuid, String)],
    ) -> StoreResult<Vec<Uuid>> {
        let mut tables = self.tables.write().await;
        for (_, status) in statuses {
            ensure_status(status)?;
        }

        let mut unmatched = Vec::new();
        for (student_id, status) in statuses {
            match tables
                .attendance
                .iter_mut()
                .find(|r| r.student_id == *student_id && r.date == date)
            {
                Some(record) => record.status = status.clone(),
                None => unmatched.push(*student_id),
            }
        }
        Ok(unmatched)
    }

    async fn attendance_report(&self) -> StoreResult<Vec<ReportRow>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<ReportRow> = tables
            .attendance
            .iter()
            .map(|record| {
                let student = tables.students.iter().find(|s| s.id == record.student_id);
                ReportRow {
                    id: record.id,
                    student_id: record.student_id,
                    date: record.date,
                    status: record.status.clone(),
                    roll_no: student.map(|s| s.roll_no.clone()).unwrap_or_default(),
                    full_name: student.map(|s| s.full_name.clone()).unwrap_or_default(),
                    program: student
                        .map(|s| s.program.to_string())
                        .unwrap_or_default(),
                    batch: student.map(|s| s.batch.clone()).unwrap_or_default(),
                    created_at: record.created_at,
                }
            })
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.roll_no.cmp(&b.roll_no)));
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl ExamSessionStore for MemoryStore {
    async fn list_sessions(&self) -> StoreResult<Vec<ExamSession>> {
        let tables = self.tables.read().await;
        let mut sessions = tables.sessions.clone();
        sessions.sort_by(|a, b| b.end_date.cmp(&a.end_date));
        Ok(sessions)
    }

    async fn get_session(&self, id: Uuid) -> StoreResult<Option<ExamSession>> {
        let tables = self.tables.read().await;
        Ok(tables.sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn insert_session(&self, session: &ExamSession) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.sessions.iter().any(|s| s.id == session.id) {
            return Err(Error::conflict(format!("Exam session `{}` already exists", session.id)));
        }
        tables.sessions.push(session.clone());
        Ok(())
    }

    async fn update_session(&self, session: &ExamSession) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => {
                *existing = session.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_session(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|s| s.id != id);
        Ok(tables.sessions.len() < before)
    }
}

#[async_trait::async_trait]
impl AdminStore for MemoryStore {
    async fn find_admin(&self, email: &str) -> StoreResult<Option<AdminAccount>> {
        let tables = self.tables.read().await;
        Ok(tables.admins.iter().find(|a| a.email == email).cloned())
    }

    async fn insert_admin(&self, admin: &AdminAccount) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.admins.iter().any(|a| a.email == admin.email) {
            return Err(Error::conflict(format!("Admin `{}` already exists", admin.email)));
        }
        tables.admins.push(admin.clone());
        Ok(())
    }

    async fn find_admin_session(&self, ssid: &str) -> StoreResult<Option<AdminSession>> {
        let tables = self.tables.read().await;
        Ok(tables.admin_sessions.iter().find(|s| s.ssid == ssid).cloned())
    }

    async fn admin_session_for(&self, admin: Uuid) -> StoreResult<Option<AdminSession>> {
        let tables = self.tables.read().await;
        Ok(tables
            .admin_sessions
            .iter()
            .find(|s| s.belongs_to == admin)
            .cloned())
    }

    async fn insert_admin_session(&self, session: &AdminSession) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.admin_sessions.push(session.clone());
        Ok(())
    }

    async fn drop_admin_session(&self, ssid: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.admin_sessions.len();
        tables.admin_sessions.retain(|s| s.ssid != ssid);
        Ok(tables.admin_sessions.len() < before)
    }
}
