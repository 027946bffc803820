//! The navigation shell's panels and the data each one renders.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use axum::extract::Path;
use axum::Extension;
use chrono::Utc;
use serde::Serialize;

use crate::attendance::{AttendanceSheet, SheetView};
use crate::auth::AdminGuard;
use crate::reports::{self, AttendanceReport, DashboardStats, FormReview};
use crate::sessions::SessionList;
use crate::students::{SearchQuery, StudentList};
use crate::{proceeds, AppState, Error, Payload};

/// How long the shell shows its loading placeholder when switching panels.
pub const SWITCH_DELAY: Duration = Duration::from_millis(900);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Panel {
    Dashboard,
    Students,
    Session,
    Form,
    Attendance,
    Reports,
}

impl Panel {
    /// Navigation order.
    pub const ALL: [Panel; 6] = [
        Panel::Dashboard,
        Panel::Students,
        Panel::Session,
        Panel::Form,
        Panel::Attendance,
        Panel::Reports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Panel::Dashboard => "dashboard",
            Panel::Students => "students",
            Panel::Session => "session",
            Panel::Form => "form",
            Panel::Attendance => "attendance",
            Panel::Reports => "reports",
        }
    }
}

impl Default for Panel {
    fn default() -> Self {
        Panel::Dashboard
    }
}

impl fmt::Display for Panel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Panel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Panel::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| Error::not_found(format!("No panel named `{}`", s)))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "panel", rename_all = "snake_case")]
pub enum PanelData {
    Dashboard(DashboardStats),
    Students(StudentList),
    Session(SessionList),
    Form(FormReview),
    Attendance(SheetView),
    Reports(AttendanceReport),
}

pub async fn load(state: &AppState, panel: Panel) -> Result<PanelData, Error> {
    let store = state.store.as_ref();
    Ok(match panel {
        Panel::Dashboard => PanelData::Dashboard(reports::dashboard_stats(state).await?),
        Panel::Students => PanelData::Students(StudentList {
            students: store.list_students().await?,
        }),
        Panel::Session => PanelData::Session(SessionList {
            sessions: store.list_sessions().await?,
        }),
        Panel::Form => PanelData::Form(reports::form_review(
            store.list_students().await?,
            &SearchQuery::default(),
        )),
        Panel::Attendance => {
            let today = Utc::now().date_naive();
            PanelData::Attendance(AttendanceSheet::open(store, today).await?.view())
        }
        Panel::Reports => PanelData::Reports(AttendanceReport {
            records: store.attendance_report().await?,
        }),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct PanelIndex {
    pub panels: Vec<Panel>,
    pub default: Panel,
    pub switch_delay_ms: u64,
}

pub async fn index(_admin: AdminGuard) -> Payload<PanelIndex> {
    proceeds(PanelIndex {
        panels: Panel::ALL.to_vec(),
        default: Panel::default(),
        switch_delay_ms: SWITCH_DELAY.as_millis() as u64,
    })
}

pub async fn show(
    _admin: AdminGuard,
    Path(panel): Path<String>,
    Extension(state): Extension<AppState>,
) -> Payload<PanelData> {
    let panel: Panel = panel.parse()?;
    log::debug!("Loading panel `{}`", panel);
    proceeds(load(&state, panel).await?)
}
