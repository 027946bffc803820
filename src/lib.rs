pub mod attendance;
pub mod auth;
pub mod config;
pub mod err;
pub mod models;
pub mod panels;
pub mod realtime;
pub mod reports;
pub mod rollno;
pub mod sessions;
pub mod store;
pub mod students;

use std::sync::Arc;

use axum::handler::Handler;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Serialize;

use crate::config::Config;
use crate::err::{Fine, Maybe};
use crate::realtime::ChangeFeed;
use crate::store::Backend;

pub use crate::err::Error;

pub type Payload<T> = axum::response::Result<Json<Maybe<T>>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Json(Fine(value)))
}

/// Everything a handler needs, shared through an `Extension` layer.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Backend>,
    pub feed: ChangeFeed,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn Backend>, config: Config) -> Self {
        Self {
            feed: ChangeFeed::new(config.realtime_buffer),
            store,
            config: Arc::new(config),
        }
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

async fn health() -> Payload<Health> {
    proceeds(Health { status: "ok" })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/login", post(auth::login_admin))
        .route("/auth/logout", post(auth::logout_admin))
        .route("/dashboard", get(reports::dashboard))
        .route(
            "/students",
            get(students::list_students).post(students::create_student),
        )
        .route("/register", post(students::register_student))
        .route(
            "/students/:id",
            get(students::read_student)
                .put(students::update_student)
                .delete(students::delete_student),
        )
        .route(
            "/students/:id/form",
            post(students::submit_form).delete(students::clear_form),
        )
        .route("/forms", get(reports::forms))
        .route(
            "/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route(
            "/sessions/:id",
            get(sessions::read_session)
                .put(sessions::update_session)
                .delete(sessions::delete_session),
        )
        .route("/attendance/report", get(reports::attendance_report))
        .route("/attendance/report/export", get(reports::export_report))
        .route(
            "/attendance/:date",
            get(attendance::open_sheet).put(attendance::save_sheet),
        )
        .route("/panels", get(panels::index))
        .route("/panels/:panel", get(panels::show))
        .route("/realtime/:table", get(realtime::subscribe))
        .fallback(err::handler404.into_service())
        .layer(Extension(state))
}
