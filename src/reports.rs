use axum::extract::Query;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Extension;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AdminGuard;
use crate::models::{ReportRow, Student};
use crate::students::{contains_ci, SearchQuery};
use crate::{proceeds, AppState, Error, Payload};

pub const CSV_HEADER: [&str; 6] = ["Date", "Roll No", "Full Name", "Program", "Batch", "Status"];
pub const CSV_FILENAME: &str = "attendance_report.csv";

/// Report rows whose student name or roll number contains the search text.
pub fn filter_report(rows: Vec<ReportRow>, query: &SearchQuery) -> Vec<ReportRow> {
    match query.needle() {
        Some(needle) => rows
            .into_iter()
            .filter(|r| contains_ci(&r.full_name, &needle) || contains_ci(&r.roll_no, &needle))
            .collect(),
        None => rows,
    }
}

/// Renders report rows as CSV. Fields holding commas, quotes or newlines
/// are quoted.
pub fn export_csv(rows: &[ReportRow]) -> Result<String, Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for row in rows {
        let date = row.date.to_string();
        writer.write_record([
            date.as_str(),
            row.roll_no.as_str(),
            row.full_name.as_str(),
            row.program.as_str(),
            row.batch.as_str(),
            row.status.as_str(),
        ])?;
    }
    let bytes = writer.into_inner().map_err(|err| Error::InternalError {
        kind: "SerializationError",
        message: err.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|err| Error::InternalError {
        kind: "SerializationError",
        message: err.to_string(),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceReport {
    pub records: Vec<ReportRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_students: i64,
    pub forms_submitted: i64,
    pub forms_pending: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormRow {
    pub id: Uuid,
    pub full_name: String,
    pub program: String,
    pub batch: String,
    pub created_at: DateTime<Utc>,
    pub form_submitted_at: Option<DateTime<Utc>>,
    pub submitted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormReview {
    pub submitted: usize,
    pub pending: usize,
    pub rows: Vec<FormRow>,
}

/// Counts cover every student; rows are narrowed by name, program or batch.
pub fn form_review(students: Vec<Student>, query: &SearchQuery) -> FormReview {
    let submitted = students
        .iter()
        .filter(|s| s.form_submitted_at.is_some())
        .count();
    let pending = students.len() - submitted;
    let needle = query.needle();

    let rows = students
        .into_iter()
        .filter(|s| match &needle {
            Some(n) => {
                contains_ci(&s.full_name, n)
                    || contains_ci(s.program.as_str(), n)
                    || contains_ci(&s.batch, n)
            }
            None => true,
        })
        .map(|s| FormRow {
            id: s.id,
            submitted: s.form_submitted_at.is_some(),
            full_name: s.full_name,
            program: s.program.to_string(),
            batch: s.batch,
            created_at: s.created_at,
            form_submitted_at: s.form_submitted_at,
        })
        .collect();

    FormReview {
        submitted,
        pending,
        rows,
    }
}

pub async fn dashboard_stats(state: &AppState) -> Result<DashboardStats, Error> {
    let counts = state.store.count_students().await?;
    Ok(DashboardStats {
        total_students: counts.total,
        forms_submitted: counts.submitted,
        forms_pending: counts.total - counts.submitted,
    })
}

pub async fn dashboard(
    _admin: AdminGuard,
    Extension(state): Extension<AppState>,
) -> Payload<DashboardStats> {
    proceeds(dashboard_stats(&state).await?)
}

pub async fn forms(
    _admin: AdminGuard,
    Query(query): Query<SearchQuery>,
    Extension(state): Extension<AppState>,
) -> Payload<FormReview> {
    let students = state.store.list_students().await?;
    proceeds(form_review(students, &query))
}

pub async fn attendance_report(
    _admin: AdminGuard,
    Query(query): Query<SearchQuery>,
    Extension(state): Extension<AppState>,
) -> Payload<AttendanceReport> {
    let rows = state.store.attendance_report().await?;
    proceeds(AttendanceReport {
        records: filter_report(rows, &query),
    })
}

pub async fn export_report(
    _admin: AdminGuard,
    Query(query): Query<SearchQuery>,
    Extension(state): Extension<AppState>,
) -> Result<impl IntoResponse, Error> {
    let rows = filter_report(state.store.attendance_report().await?, &query);
    let body = export_csv(&rows)?;
    log::debug!("Exported {} attendance rows", rows.len());
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", CSV_FILENAME),
            ),
        ],
        body,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Program, StudentForm};
    use chrono::NaiveDate;

    fn row(date: (i32, u32, u32), roll_no: &str, name: &str, status: &str) -> ReportRow {
        ReportRow {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            status: status.to_string(),
            roll_no: roll_no.to_string(),
            full_name: name.to_string(),
            program: "BSCS".to_string(),
            batch: "2025".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn csv_starts_with_the_header_row() {
        let csv = export_csv(&[row((2025, 10, 6), "CS2545", "Ali Khokhar", "Present")]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Date,Roll No,Full Name,Program,Batch,Status");
        assert_eq!(lines[1], "2025-10-06,CS2545,Ali Khokhar,BSCS,2025,Present");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn commas_in_fields_are_quoted() {
        let csv = export_csv(&[row((2025, 10, 6), "CS2545", "Khokhar, Ali", "Late, 76%")]).unwrap();
        let line = csv.lines().nth(1).unwrap();
        assert_eq!(line, "2025-10-06,CS2545,\"Khokhar, Ali\",BSCS,2025,\"Late, 76%\"");

        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(record.len(), 6);
        assert_eq!(&record[5], "Late, 76%");
    }

    #[test]
    fn report_search_matches_name_or_roll_number() {
        let rows = vec![
            row((2025, 10, 6), "CS2545", "Ali Khokhar", "Present"),
            row((2025, 10, 6), "IT2511", "Sara Ahmed", "-"),
        ];
        let by_roll = SearchQuery {
            search: Some("it25".into()),
        };
        assert_eq!(filter_report(rows.clone(), &by_roll)[0].full_name, "Sara Ahmed");
        let by_name = SearchQuery {
            search: Some("ALI".into()),
        };
        assert_eq!(filter_report(rows, &by_name)[0].roll_no, "CS2545");
    }

    #[test]
    fn form_review_counts_ignore_the_search() {
        let mut submitted = StudentForm {
            full_name: "Ali".into(),
            program: Program::Bscs,
            batch: "2024".into(),
            ..StudentForm::default()
        }
        .into_student("CS2401".into());
        submitted.form_submitted_at = Some(Utc::now());
        let pending = StudentForm {
            full_name: "Sara".into(),
            program: Program::Bba,
            batch: "2025".into(),
            ..StudentForm::default()
        }
        .into_student("A2502".into());

        let review = form_review(
            vec![submitted, pending],
            &SearchQuery {
                search: Some("bba".into()),
            },
        );
        assert_eq!(review.submitted, 1);
        assert_eq!(review.pending, 1);
        assert_eq!(review.rows.len(), 1);
        assert_eq!(review.rows[0].full_name, "Sara");
        assert!(!review.rows[0].submitted);
    }
}
