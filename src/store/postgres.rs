use std::convert::TryFrom;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    AdminStore, AttendanceStore, ExamSessionStore, StoreResult, StudentCounts, StudentStore,
};
use crate::err::Error;
use crate::models::{
    AdminAccount, AdminSession, AttendanceRecord, ExamSession, Program, ReportRow, Student,
};

const STUDENT_COLUMNS: &str = "id, full_name, guardian, roll_no, program, batch, gender, \
    national_id, contact, date_of_birth, email, address, form_submitted_at, created_at";

const SESSION_COLUMNS: &str =
    "id, name, end_date, targeted_programs, status, exam_details, assignments, created_at";

#[derive(sqlx::FromRow)]
struct StudentRow {
    id: Uuid,
    full_name: String,
    guardian: String,
    roll_no: String,
    program: String,
    batch: String,
    gender: String,
    national_id: String,
    contact: String,
    date_of_birth: Option<NaiveDate>,
    email: String,
    address: String,
    form_submitted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<StudentRow> for Student {
    type Error = Error;

    fn try_from(row: StudentRow) -> Result<Self, Self::Error> {
        Ok(Student {
            id: row.id,
            full_name: row.full_name,
            guardian: row.guardian,
            roll_no: row.roll_no,
            program: row.program.parse()?,
            batch: row.batch,
            gender: row.gender.parse()?,
            national_id: row.national_id,
            contact: row.contact,
            date_of_birth: row.date_of_birth,
            email: row.email,
            address: row.address,
            form_submitted_at: row.form_submitted_at,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    name: String,
    end_date: NaiveDate,
    targeted_programs: Vec<String>,
    status: String,
    exam_details: Option<String>,
    assignments: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for ExamSession {
    type Error = Error;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(ExamSession {
            id: row.id,
            name: row.name,
            end_date: row.end_date,
            targeted_programs: row
                .targeted_programs
                .iter()
                .map(|p| p.parse::<Program>())
                .collect::<Result<_, _>>()?,
            status: row.status.parse()?,
            exam_details: row.exam_details,
            assignments: row.assignments,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AttendanceRow {
    id: Uuid,
    student_id: Uuid,
    date: NaiveDate,
    status: String,
    created_at: DateTime<Utc>,
}

impl From<AttendanceRow> for AttendanceRecord {
    fn from(row: AttendanceRow) -> Self {
        AttendanceRecord {
            id: row.id,
            student_id: row.student_id,
            date: row.date,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReportRowRecord {
    id: Uuid,
    student_id: Uuid,
    date: NaiveDate,
    status: String,
    roll_no: String,
    full_name: String,
    program: String,
    batch: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AdminRow {
    id: Uuid,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AdminSessionRow {
    ssid: String,
    belongs_to: Uuid,
    expires_at: DateTime<Utc>,
}

impl From<AdminSessionRow> for AdminSession {
    fn from(row: AdminSessionRow) -> Self {
        AdminSession {
            ssid: row.ssid,
            belongs_to: row.belongs_to,
            expires_at: row.expires_at,
        }
    }
}

fn students(rows: Vec<StudentRow>) -> StoreResult<Vec<Student>> {
    rows.into_iter().map(Student::try_from).collect()
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl StudentStore for PgStore {
    async fn list_students(&self) -> StoreResult<Vec<Student>> {
        let rows = sqlx::query_as::<_, StudentRow>(&format!(
            "SELECT {} FROM students ORDER BY created_at ASC",
            STUDENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        students(rows)
    }

    async fn roster(&self) -> StoreResult<Vec<Student>> {
        let rows = sqlx::query_as::<_, StudentRow>(&format!(
            "SELECT {} FROM students ORDER BY roll_no ASC",
            STUDENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        students(rows)
    }

    async fn get_student(&self, id: Uuid) -> StoreResult<Option<Student>> {
        let row = sqlx::query_as::<_, StudentRow>(&format!(
            "SELECT {} FROM students WHERE id = $1 LIMIT 1",
            STUDENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Student::try_from).transpose()
    }

    async fn find_roll_no(&self, roll_no: &str) -> StoreResult<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM students WHERE roll_no = $1 LIMIT 1")
            .bind(roll_no)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn insert_student(&self, student: &Student) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO students ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            STUDENT_COLUMNS
        ))
        .bind(student.id)
        .bind(&student.full_name)
        .bind(&student.guardian)
        .bind(&student.roll_no)
        .bind(student.program.as_str())
        .bind(&student.batch)
        .bind(student.gender.as_str())
        .bind(&student.national_id)
        .bind(&student.contact)
        .bind(student.date_of_birth)
        .bind(&student.email)
        .bind(&student.address)
        .bind(student.form_submitted_at)
        .bind(student.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_student(&self, student: &Student) -> StoreResult<bool> {
        let res = sqlx::query(
            "UPDATE students SET full_name = $2, guardian = $3, roll_no = $4, program = $5, \
             batch = $6, gender = $7, national_id = $8, contact = $9, date_of_birth = $10, \
             email = $11, address = $12, form_submitted_at = $13 WHERE id = $1",
        )
        .bind(student.id)
        .bind(&student.full_name)
        .bind(&student.guardian)
        .bind(&student.roll_no)
        .bind(student.program.as_str())
        .bind(&student.batch)
        .bind(student.gender.as_str())
        .bind(&student.national_id)
        .bind(&student.contact)
        .bind(student.date_of_birth)
        .bind(&student.email)
        .bind(&student.address)
        .bind(student.form_submitted_at)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() >= 1)
    }

    async fn delete_student(&self, id: Uuid) -> StoreResult<Option<Vec<Uuid>>> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query_scalar::<_, Uuid>(
            "DELETE FROM attendance WHERE student_id = $1 RETURNING id",
        )
        .bind(id)
        .fetch_all(&mut tx)
        .await?;
        let res = sqlx::query("DELETE FROM students WHERE id = $1")
            .bind(id)
            .execute(&mut tx)
            .await?;
        if res.rows_affected() == 0 {
            return Ok(None);
        }
        tx.commit().await?;
        Ok(Some(removed))
    }

    async fn set_form_submitted(
        &self,
        id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        let res = sqlx::query("UPDATE students SET form_submitted_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() >= 1)
    }

    async fn count_students(&self) -> StoreResult<StudentCounts> {
        let (total, submitted) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COUNT(form_submitted_at) FROM students",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(StudentCounts { total, submitted })
    }
}

#[async_trait::async_trait]
impl AttendanceStore for PgStore {
    async fn attendance_for_date(&self, date: NaiveDate) -> StoreResult<Vec<AttendanceRecord>> {
        let rows = sqlx::query_as::<_, AttendanceRow>(
            "SELECT id, student_id, date, status, created_at FROM attendance WHERE date = $1",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(AttendanceRecord::from).collect())
    }

    async fn insert_attendance(&self, records: &[AttendanceRecord]) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO attendance (id, student_id, date, status, created_at) ");
        builder.push_values(records, |mut row, record| {
            row.push_bind(record.id)
                .push_bind(record.student_id)
                .push_bind(record.date)
                .push_bind(record.status.clone())
                .push_bind(record.created_at);
        });
        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn update_attendance(
        &self,
        date: NaiveDate,
        statuses: &[(Uuid, String)],
    ) -> StoreResult<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;
        let mut unmatched = Vec::new();
        for (student_id, status) in statuses {
            let res = sqlx::query(
                "UPDATE attendance SET status = $1 WHERE student_id = $2 AND date = $3",
            )
            .bind(status)
            .bind(student_id)
            .bind(date)
            .execute(&mut tx)
            .await?;
            if res.rows_affected() == 0 {
                unmatched.push(*student_id);
            }
        }
        tx.commit().await?;
        Ok(unmatched)
    }

    async fn attendance_report(&self) -> StoreResult<Vec<ReportRow>> {
        let rows = sqlx::query_as::<_, ReportRowRecord>(
            "SELECT a.id, a.student_id, a.date, a.status, a.created_at, \
             COALESCE(s.roll_no, '') AS roll_no, COALESCE(s.full_name, '') AS full_name, \
             COALESCE(s.program, '') AS program, COALESCE(s.batch, '') AS batch \
             FROM attendance a LEFT JOIN students s ON s.id = a.student_id \
             ORDER BY a.date DESC, roll_no ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| ReportRow {
                id: r.id,
                student_id: r.student_id,
                date: r.date,
                status: r.status,
                roll_no: r.roll_no,
                full_name: r.full_name,
                program: r.program,
                batch: r.batch,
                created_at: r.created_at,
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl ExamSessionStore for PgStore {
    async fn list_sessions(&self) -> StoreResult<Vec<ExamSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM exam_sessions ORDER BY end_date DESC",
            SESSION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ExamSession::try_from).collect()
    }

    async fn get_session(&self, id: Uuid) -> StoreResult<Option<ExamSession>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM exam_sessions WHERE id = $1 LIMIT 1",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ExamSession::try_from).transpose()
    }

    async fn insert_session(&self, session: &ExamSession) -> StoreResult<()> {
        let programs: Vec<String> = session
            .targeted_programs
            .iter()
            .map(|p| p.to_string())
            .collect();
        sqlx::query(&format!(
            "INSERT INTO exam_sessions ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            SESSION_COLUMNS
        ))
        .bind(session.id)
        .bind(&session.name)
        .bind(session.end_date)
        .bind(programs)
        .bind(session.status.as_str())
        .bind(&session.exam_details)
        .bind(&session.assignments)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_session(&self, session: &ExamSession) -> StoreResult<bool> {
        let programs: Vec<String> = session
            .targeted_programs
            .iter()
            .map(|p| p.to_string())
            .collect();
        let res = sqlx::query(
            "UPDATE exam_sessions SET name = $2, end_date = $3, targeted_programs = $4, \
             status = $5, exam_details = $6, assignments = $7 WHERE id = $1",
        )
        .bind(session.id)
        .bind(&session.name)
        .bind(session.end_date)
        .bind(programs)
        .bind(session.status.as_str())
        .bind(&session.exam_details)
        .bind(&session.assignments)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() >= 1)
    }

    async fn delete_session(&self, id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM exam_sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() >= 1)
    }
}

#[async_trait::async_trait]
impl AdminStore for PgStore {
    async fn find_admin(&self, email: &str) -> StoreResult<Option<AdminAccount>> {
        let row = sqlx::query_as::<_, AdminRow>(
            "SELECT id, email, password_hash, created_at FROM admins WHERE email = $1 LIMIT 1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| AdminAccount {
            id: r.id,
            email: r.email,
            password_hash: r.password_hash,
            created_at: r.created_at,
        }))
    }

    async fn insert_admin(&self, admin: &AdminAccount) -> StoreResult<()> {
        sqlx::query("INSERT INTO admins VALUES ($1, $2, $3, $4)")
            .bind(admin.id)
            .bind(&admin.email)
            .bind(&admin.password_hash)
            .bind(admin.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_admin_session(&self, ssid: &str) -> StoreResult<Option<AdminSession>> {
        let row = sqlx::query_as::<_, AdminSessionRow>(
            "SELECT ssid, belongs_to, expires_at FROM admin_sessions WHERE ssid = $1 LIMIT 1",
        )
        .bind(ssid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(AdminSession::from))
    }

    async fn admin_session_for(&self, admin: Uuid) -> StoreResult<Option<AdminSession>> {
        let row = sqlx::query_as::<_, AdminSessionRow>(
            "SELECT ssid, belongs_to, expires_at FROM admin_sessions \
             WHERE belongs_to = $1 ORDER BY expires_at DESC LIMIT 1",
        )
        .bind(admin)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(AdminSession::from))
    }

    async fn insert_admin_session(&self, session: &AdminSession) -> StoreResult<()> {
        let res = sqlx::query("INSERT INTO admin_sessions VALUES ($1, $2, $3)")
            .bind(&session.ssid)
            .bind(session.expires_at)
            .bind(session.belongs_to)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() < 1 {
            return Err(Error::InternalError {
                kind: "DatabaseError",
                message: "Could not update session ids!".to_string(),
            });
        }
        Ok(())
    }

    async fn drop_admin_session(&self, ssid: &str) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM admin_sessions WHERE ssid = $1")
            .bind(ssid)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() >= 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::{AttendanceSheet, SheetMode};
    use crate::models::StudentForm;
    use crate::realtime::ChangeFeed;

    fn student(name: &str, roll_no: &str) -> Student {
        StudentForm {
            full_name: name.to_string(),
            ..StudentForm::default()
        }
        .into_student(roll_no.to_string())
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, d).unwrap()
    }

    async fn enrolled(pool: PgPool, names: &[(&str, &str)]) -> (PgStore, Vec<Student>) {
        let store = PgStore { pool };
        let mut students = Vec::new();
        for (name, roll_no) in names {
            let s = student(name, roll_no);
            store.insert_student(&s).await.unwrap();
            students.push(s);
        }
        (store, students)
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn sheet_saves_once_then_edits(pool: PgPool) {
        let (store, students) = enrolled(pool, &[("Ali", "CS2501"), ("Sara", "CS2502")]).await;
        let feed = ChangeFeed::new(16);

        let mut sheet = AttendanceSheet::open(&store, day(6)).await.unwrap();
        assert_eq!(sheet.mode(), SheetMode::Create);
        sheet.set_status(students[0].id, "Present").unwrap();
        let report = sheet.save(&store, &feed).await.unwrap();
        assert_eq!(report.saved_as, SheetMode::Create);
        assert_eq!(report.written, 2);

        let mut sheet = AttendanceSheet::open(&store, day(6)).await.unwrap();
        assert_eq!(sheet.mode(), SheetMode::Edit);
        assert_eq!(sheet.status(students[1].id), Some("-"));
        sheet.set_status(students[1].id, "76%").unwrap();
        let report = sheet.save(&store, &feed).await.unwrap();
        assert_eq!(report.saved_as, SheetMode::Edit);
        assert!(report.unmatched.is_empty());

        let rows = store.attendance_for_date(day(6)).await.unwrap();
        assert_eq!(rows.len(), 2);
        let sara = rows.iter().find(|r| r.student_id == students[1].id).unwrap();
        assert_eq!(sara.status, "76%");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn duplicate_attendance_is_a_conflict(pool: PgPool) {
        let (store, students) = enrolled(pool, &[("Ali", "CS2501"), ("Sara", "CS2502")]).await;
        let (ali, sara) = (students[0].id, students[1].id);
        store
            .insert_attendance(&[AttendanceRecord::new(ali, day(6), "Present".into())])
            .await
            .unwrap();

        let err = store
            .insert_attendance(&[
                AttendanceRecord::new(sara, day(6), "Present".into()),
                AttendanceRecord::new(ali, day(6), "Absent".into()),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));

        let rows = store.attendance_for_date(day(6)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "Present");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn failed_edit_batch_leaves_every_row(pool: PgPool) {
        let (store, students) = enrolled(pool, &[("Ali", "CS2501"), ("Sara", "CS2502")]).await;
        let (ali, sara) = (students[0].id, students[1].id);
        store
            .insert_attendance(&[
                AttendanceRecord::new(ali, day(6), "Present".into()),
                AttendanceRecord::new(sara, day(6), "Present".into()),
            ])
            .await
            .unwrap();

        // The second update trips the non-empty status check.
        let batch = [(ali, "Absent".to_string()), (sara, String::new())];
        let err = store.update_attendance(day(6), &batch).await.unwrap_err();
        assert!(matches!(err, Error::InvalidPayload { .. }));

        let rows = store.attendance_for_date(day(6)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.status == "Present"));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn edit_batch_reports_students_without_rows(pool: PgPool) {
        let (store, students) = enrolled(pool, &[("Ali", "CS2501"), ("Sara", "CS2502")]).await;
        let (ali, sara) = (students[0].id, students[1].id);
        store
            .insert_attendance(&[AttendanceRecord::new(ali, day(6), "Present".into())])
            .await
            .unwrap();

        let batch = [(ali, "Absent".to_string()), (sara, "Present".to_string())];
        let unmatched = store.update_attendance(day(6), &batch).await.unwrap();
        assert_eq!(unmatched, vec![sara]);
        assert_eq!(store.attendance_for_date(day(6)).await.unwrap()[0].status, "Absent");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn deleting_a_student_cascades(pool: PgPool) {
        let (store, students) = enrolled(pool, &[("Ali", "CS2501")]).await;
        let ali = students[0].id;
        let record = AttendanceRecord::new(ali, day(6), "Present".into());
        store.insert_attendance(&[record.clone()]).await.unwrap();

        assert_eq!(store.delete_student(ali).await.unwrap(), Some(vec![record.id]));
        assert!(store.attendance_for_date(day(6)).await.unwrap().is_empty());
        assert!(store.get_student(ali).await.unwrap().is_none());
        assert_eq!(store.delete_student(ali).await.unwrap(), None);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn roll_numbers_are_unique_unless_empty(pool: PgPool) {
        let (store, _) = enrolled(pool, &[("Ali", "CS2545"), ("Zain", ""), ("Hina", "")]).await;

        let err = store
            .insert_student(&student("Sara", "CS2545"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
        assert_eq!(store.count_students().await.unwrap().total, 3);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn listings_follow_their_orderings(pool: PgPool) {
        let (store, students) = enrolled(pool, &[("Sara", "SE2509"), ("Ali", "CS2501")]).await;
        let roster: Vec<String> = store
            .roster()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.roll_no)
            .collect();
        assert_eq!(roster, ["CS2501", "SE2509"]);

        store
            .insert_attendance(&[
                AttendanceRecord::new(students[0].id, day(5), "Present".into()),
                AttendanceRecord::new(students[1].id, day(7), "Absent".into()),
                AttendanceRecord::new(students[0].id, day(7), "Late".into()),
            ])
            .await
            .unwrap();
        let report = store.attendance_report().await.unwrap();
        let order: Vec<(NaiveDate, &str)> = report
            .iter()
            .map(|r| (r.date, r.roll_no.as_str()))
            .collect();
        assert_eq!(
            order,
            [(day(7), "CS2501"), (day(7), "SE2509"), (day(5), "SE2509")]
        );
        assert_eq!(report[0].full_name, "Ali");
    }
}
