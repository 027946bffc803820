use axum::extract::{Path, Query};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AdminGuard;
use crate::models::{ExamSession, ExamSessionForm, SessionStatus};
use crate::realtime::{Op, Table};
use crate::students::contains_ci;
use crate::{proceeds, AppState, Error, Payload};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionQuery {
    #[serde(default)]
    pub search: Option<String>,
    /// Exact status, or `All`.
    #[serde(default)]
    pub status: Option<String>,
}

impl SessionQuery {
    fn status(&self) -> Result<Option<SessionStatus>, Error> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("All") => Ok(None),
            Some(status) => status.parse().map(Some),
        }
    }
}

pub fn filter_sessions(
    sessions: Vec<ExamSession>,
    query: &SessionQuery,
) -> Result<Vec<ExamSession>, Error> {
    let status = query.status()?;
    let needle = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    Ok(sessions
        .into_iter()
        .filter(|s| status.map_or(true, |status| s.status == status))
        .filter(|s| needle.as_deref().map_or(true, |n| contains_ci(&s.name, n)))
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionList {
    pub sessions: Vec<ExamSession>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDeleted {
    pub id: Uuid,
}

pub async fn list_sessions(
    _admin: AdminGuard,
    Query(query): Query<SessionQuery>,
    Extension(state): Extension<AppState>,
) -> Payload<SessionList> {
    let sessions = state.store.list_sessions().await?;
    proceeds(SessionList {
        sessions: filter_sessions(sessions, &query)?,
    })
}

pub async fn create_session(
    _admin: AdminGuard,
    Extension(state): Extension<AppState>,
    Json(form): Json<ExamSessionForm>,
) -> Payload<ExamSession> {
    form.validate()?;
    let session = form.into_session();
    state.store.insert_session(&session).await?;
    state.feed.publish(Table::ExamSessions, Op::Insert, session.id);
    log::info!("Created exam session `{}` ({})", session.name, session.id);
    proceeds(session)
}

pub async fn read_session(
    _admin: AdminGuard,
    Path(id): Path<Uuid>,
    Extension(state): Extension<AppState>,
) -> Payload<ExamSession> {
    match state.store.get_session(id).await? {
        Some(session) => proceeds(session),
        None => Err(Error::not_found("Session not found")),
    }
}

pub async fn update_session(
    _admin: AdminGuard,
    Path(id): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Json(form): Json<ExamSessionForm>,
) -> Payload<ExamSession> {
    form.validate()?;
    let mut session = match state.store.get_session(id).await? {
        Some(session) => session,
        None => return Err(Error::not_found("Session not found")),
    };
    form.apply_to(&mut session);
    if !state.store.update_session(&session).await? {
        return Err(Error::not_found("Session not found"));
    }
    state.feed.publish(Table::ExamSessions, Op::Update, id);
    proceeds(session)
}

pub async fn delete_session(
    _admin: AdminGuard,
    Path(id): Path<Uuid>,
    Extension(state): Extension<AppState>,
) -> Payload<SessionDeleted> {
    if !state.store.delete_session(id).await? {
        return Err(Error::not_found("Session not found"));
    }
    state.feed.publish(Table::ExamSessions, Op::Delete, id);
    log::info!("Deleted exam session `{}`", id);
    proceeds(SessionDeleted { id })
}
