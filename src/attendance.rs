//! Per-date attendance sheets.
//!
//! Opening a sheet decides between create mode (no rows for the date yet,
//! every roster student starts with an empty status) and edit mode (the
//! stored statuses are loaded). Saving inserts the whole sheet in one batch
//! in create mode and then flips to edit mode; in edit mode every status is
//! written in one all-or-nothing batch keyed by `(student, date)`.

use std::collections::{BTreeMap, HashMap};

use axum::extract::Path;
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AdminGuard;
use crate::models::{AttendanceRecord, Student};
use crate::realtime::{ChangeFeed, Op, Table};
use crate::store::Backend;
use crate::{proceeds, AppState, Error, Payload};

/// Persisted in place of an empty status.
pub const PLACEHOLDER: &str = "-";

pub fn normalize_status(status: &str) -> String {
    let trimmed = status.trim();
    if trimmed.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetMode {
    Create,
    Edit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    /// Mode the save ran in.
    pub saved_as: SheetMode,
    pub written: usize,
    /// Students with a status but no row for the date; only possible in edit mode.
    pub unmatched: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct AttendanceSheet {
    date: NaiveDate,
    mode: SheetMode,
    roster: Vec<Student>,
    statuses: BTreeMap<Uuid, String>,
    record_ids: HashMap<Uuid, Uuid>,
}

impl AttendanceSheet {
    pub fn from_parts(
        date: NaiveDate,
        existing: Vec<AttendanceRecord>,
        roster: Vec<Student>,
    ) -> Self {
        let mut statuses = BTreeMap::new();
        let mut record_ids = HashMap::new();
        let mode = if existing.is_empty() {
            for student in &roster {
                statuses.insert(student.id, String::new());
            }
            SheetMode::Create
        } else {
            for record in existing {
                record_ids.insert(record.student_id, record.id);
                statuses.insert(record.student_id, record.status);
            }
            SheetMode::Edit
        };

        Self {
            date,
            mode,
            roster,
            statuses,
            record_ids,
        }
    }

    pub async fn open(store: &dyn Backend, date: NaiveDate) -> Result<Self, Error> {
        let existing = store.attendance_for_date(date).await?;
        let roster = store.roster().await?;
        Ok(Self::from_parts(date, existing, roster))
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn mode(&self) -> SheetMode {
        self.mode
    }

    pub fn statuses(&self) -> &BTreeMap<Uuid, String> {
        &self.statuses
    }

    pub fn status(&self, student: Uuid) -> Option<&str> {
        self.statuses.get(&student).map(String::as_str)
    }

    /// Records a status for a roster student or for a student that already
    /// has a row on this date.
    pub fn set_status(&mut self, student: Uuid, status: impl Into<String>) -> Result<(), Error> {
        let known = self.statuses.contains_key(&student)
            || self.roster.iter().any(|s| s.id == student);
        if !known {
            return Err(Error::invalid(format!(
                "Student `{}` is not on the sheet for {}",
                student, self.date
            )));
        }
        self.statuses.insert(student, status.into());
        Ok(())
    }

    pub async fn save(
        &mut self,
        store: &dyn Backend,
        feed: &ChangeFeed,
    ) -> Result<SaveReport, Error> {
        let entries: Vec<(Uuid, String)> = self
            .statuses
            .iter()
            .map(|(student, status)| (*student, normalize_status(status)))
            .collect();

        let report = match self.mode {
            SheetMode::Create => {
                let records: Vec<AttendanceRecord> = entries
                    .iter()
                    .map(|(student, status)| {
                        AttendanceRecord::new(*student, self.date, status.clone())
                    })
                    .collect();
                store.insert_attendance(&records).await?;
                for record in &records {
                    self.record_ids.insert(record.student_id, record.id);
                    feed.publish(Table::Attendance, Op::Insert, record.id);
                }
                self.mode = SheetMode::Edit;
                SaveReport {
                    saved_as: SheetMode::Create,
                    written: records.len(),
                    unmatched: Vec::new(),
                }
            }
            SheetMode::Edit => {
                let unmatched = store.update_attendance(self.date, &entries).await?;
                for (student, _) in &entries {
                    if unmatched.contains(student) {
                        continue;
                    }
                    if let Some(record) = self.record_ids.get(student) {
                        feed.publish(Table::Attendance, Op::Update, *record);
                    }
                }
                SaveReport {
                    saved_as: SheetMode::Edit,
                    written: entries.len() - unmatched.len(),
                    unmatched,
                }
            }
        };

        self.statuses = entries.into_iter().collect();
        log::info!(
            "Saved attendance for {} ({:?}): {} written, {} unmatched",
            self.date,
            report.saved_as,
            report.written,
            report.unmatched.len()
        );
        Ok(report)
    }

    pub fn view(&self) -> SheetView {
        let rows = self
            .roster
            .iter()
            .map(|student| SheetRow {
                student_id: student.id,
                roll_no: student.roll_no.clone(),
                full_name: student.full_name.clone(),
                program: student.program.to_string(),
                batch: student.batch.clone(),
                status: self.status(student.id).unwrap_or_default().to_string(),
            })
            .collect();
        SheetView {
            date: self.date,
            mode: self.mode,
            rows,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetRow {
    pub student_id: Uuid,
    pub roll_no: String,
    pub full_name: String,
    pub program: String,
    pub batch: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetView {
    pub date: NaiveDate,
    pub mode: SheetMode,
    pub rows: Vec<SheetRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveSheet {
    pub statuses: HashMap<Uuid, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedSheet {
    pub date: NaiveDate,
    pub mode: SheetMode,
    #[serde(flatten)]
    pub report: SaveReport,
}

pub async fn open_sheet(
    _admin: AdminGuard,
    Path(date): Path<NaiveDate>,
    Extension(state): Extension<AppState>,
) -> Payload<SheetView> {
    let sheet = AttendanceSheet::open(state.store.as_ref(), date).await?;
    proceeds(sheet.view())
}

pub async fn save_sheet(
    _admin: AdminGuard,
    Path(date): Path<NaiveDate>,
    Extension(state): Extension<AppState>,
    Json(body): Json<SaveSheet>,
) -> Payload<SavedSheet> {
    let mut sheet = AttendanceSheet::open(state.store.as_ref(), date).await?;
    for (student, status) in body.statuses {
        sheet.set_status(student, status)?;
    }
    let report = sheet.save(state.store.as_ref(), &state.feed).await?;
    proceeds(SavedSheet {
        date,
        mode: sheet.mode(),
        report,
    })
}
