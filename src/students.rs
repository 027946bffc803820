use axum::extract::{Path, Query};
use axum::{Extension, Json};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AdminGuard;
use crate::models::{Student, StudentForm};
use crate::realtime::{ChangeFeed, Op, Table};
use crate::rollno::{self, RollFormat};
use crate::store::Backend;
use crate::{proceeds, AppState, Error, Payload};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub search: Option<String>,
}

impl SearchQuery {
    /// Lower-cased needle, `None` when the search box is empty.
    pub fn needle(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }
}

pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Management-screen edit. The stored roll number survives unless
/// `rederive_roll_no` asks for a fresh one.
#[derive(Debug, Clone, Deserialize)]
pub struct StudentEdit {
    #[serde(flatten)]
    pub form: StudentForm,
    #[serde(default)]
    pub rederive_roll_no: bool,
}

pub async fn register(
    store: &dyn Backend,
    feed: &ChangeFeed,
    form: StudentForm,
    year: i32,
    format: RollFormat,
) -> Result<Student, Error> {
    form.validate()?;

    let roll_no = rollno::generate(&form.national_id, form.program.as_str(), year, format);
    let holder = if roll_no.is_empty() {
        None
    } else {
        store.find_roll_no(&roll_no).await?
    };
    rollno::ensure_available(&roll_no, holder, None)?;

    let student = form.into_student(roll_no);
    store.insert_student(&student).await?;
    feed.publish(Table::Students, Op::Insert, student.id);
    log::info!("Registered student `{}` as `{}`", student.id, student.roll_no);
    Ok(student)
}

pub async fn edit(
    store: &dyn Backend,
    feed: &ChangeFeed,
    id: Uuid,
    edit: StudentEdit,
    year: i32,
) -> Result<Student, Error> {
    edit.form.validate()?;

    let mut student = store
        .get_student(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Student `{}` does not exist", id)))?;
    edit.form.apply_to(&mut student);

    if edit.rederive_roll_no {
        let roll_no = rollno::generate(
            &student.national_id,
            student.program.as_str(),
            year,
            RollFormat::Truncated,
        );
        let holder = if roll_no.is_empty() {
            None
        } else {
            store.find_roll_no(&roll_no).await?
        };
        rollno::ensure_available(&roll_no, holder, Some(id))?;
        log::info!(
            "Re-derived roll number of `{}`: `{}` -> `{}`",
            id,
            student.roll_no,
            roll_no
        );
        student.roll_no = roll_no;
    }

    if !store.update_student(&student).await? {
        return Err(Error::not_found(format!("Student `{}` does not exist", id)));
    }
    feed.publish(Table::Students, Op::Update, id);
    Ok(student)
}

/// Deletes a student and announces the attendance rows that went with it.
pub async fn remove(store: &dyn Backend, feed: &ChangeFeed, id: Uuid) -> Result<Deleted, Error> {
    let cascaded = store
        .delete_student(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Student `{}` does not exist", id)))?;
    for record in &cascaded {
        feed.publish(Table::Attendance, Op::Delete, *record);
    }
    feed.publish(Table::Students, Op::Delete, id);
    log::info!(
        "Deleted student `{}` with {} attendance rows",
        id,
        cascaded.len()
    );
    Ok(Deleted { id })
}

pub fn filter_by_name(students: Vec<Student>, query: &SearchQuery) -> Vec<Student> {
    match query.needle() {
        Some(needle) => students
            .into_iter()
            .filter(|s| contains_ci(&s.full_name, &needle))
            .collect(),
        None => students,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentList {
    pub students: Vec<Student>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Deleted {
    pub id: Uuid,
}

fn current_year() -> i32 {
    Utc::now().year()
}

pub async fn list_students(
    _admin: AdminGuard,
    Query(query): Query<SearchQuery>,
    Extension(state): Extension<AppState>,
) -> Payload<StudentList> {
    let students = state.store.list_students().await?;
    proceeds(StudentList {
        students: filter_by_name(students, &query),
    })
}

/// Management screen: roll numbers are cut to six characters.
pub async fn create_student(
    _admin: AdminGuard,
    Extension(state): Extension<AppState>,
    Json(form): Json<StudentForm>,
) -> Payload<Student> {
    let student = register(
        state.store.as_ref(),
        &state.feed,
        form,
        current_year(),
        RollFormat::Truncated,
    )
    .await?;
    proceeds(student)
}

/// Registration screen: roll numbers are kept whole.
pub async fn register_student(
    _admin: AdminGuard,
    Extension(state): Extension<AppState>,
    Json(form): Json<StudentForm>,
) -> Payload<Student> {
    let student = register(
        state.store.as_ref(),
        &state.feed,
        form,
        current_year(),
        RollFormat::Full,
    )
    .await?;
    proceeds(student)
}

pub async fn read_student(
    _admin: AdminGuard,
    Path(id): Path<Uuid>,
    Extension(state): Extension<AppState>,
) -> Payload<Student> {
    match state.store.get_student(id).await? {
        Some(student) => proceeds(student),
        None => Err(Error::not_found(format!("Student `{}` does not exist", id))),
    }
}

pub async fn update_student(
    _admin: AdminGuard,
    Path(id): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Json(body): Json<StudentEdit>,
) -> Payload<Student> {
    let student = edit(state.store.as_ref(), &state.feed, id, body, current_year()).await?;
    proceeds(student)
}

pub async fn delete_student(
    _admin: AdminGuard,
    Path(id): Path<Uuid>,
    Extension(state): Extension<AppState>,
) -> Payload<Deleted> {
    proceeds(remove(state.store.as_ref(), &state.feed, id).await?)
}

pub async fn submit_form(
    _admin: AdminGuard,
    Path(id): Path<Uuid>,
    Extension(state): Extension<AppState>,
) -> Payload<Student> {
    mark_form(state, id, true).await
}

pub async fn clear_form(
    _admin: AdminGuard,
    Path(id): Path<Uuid>,
    Extension(state): Extension<AppState>,
) -> Payload<Student> {
    mark_form(state, id, false).await
}

async fn mark_form(state: AppState, id: Uuid, submitted: bool) -> Payload<Student> {
    let at = if submitted { Some(Utc::now()) } else { None };
    if !state.store.set_form_submitted(id, at).await? {
        return Err(Error::not_found(format!("Student `{}` does not exist", id)));
    }
    state.feed.publish(Table::Students, Op::Update, id);
    match state.store.get_student(id).await? {
        Some(student) => proceeds(student),
        None => Err(Error::not_found(format!("Student `{}` does not exist", id))),
    }
}
