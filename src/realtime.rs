use std::fmt;
use std::str::FromStr;

use axum::extract::Path;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Extension;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

use crate::auth::AdminGuard;
use crate::err::Error;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Students,
    Attendance,
    ExamSessions,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Students => "students",
            Table::Attendance => "attendance",
            Table::ExamSessions => "exam_sessions",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "students" => Ok(Table::Students),
            "attendance" => Ok(Table::Attendance),
            "exam_sessions" => Ok(Table::ExamSessions),
            other => Err(Error::not_found(format!("No change feed for table `{}`", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub table: Table,
    pub op: Op,
    pub id: Uuid,
}

/// Fan-out of row changes to every open subscription.
///
/// Publishing never blocks; a subscriber that falls more than the channel
/// capacity behind skips the events it missed.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<Change>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, table: Table, op: Op, id: Uuid) {
        // Err only means nobody is listening.
        let _ = self.sender.send(Change { table, op, id });
    }

    pub fn subscribe(&self, table: Table) -> impl Stream<Item = Change> {
        BroadcastStream::new(self.sender.subscribe()).filter_map(move |change| match change {
            Ok(change) if change.table == table => Some(change),
            Ok(_) => None,
            Err(lagged) => {
                log::warn!("Change feed subscriber for `{}` lagged: {}", table, lagged);
                None
            }
        })
    }
}

pub async fn subscribe(
    _admin: AdminGuard,
    Path(table): Path<String>,
    Extension(state): Extension<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, serde_json::Error>>>, Error> {
    let table: Table = table.parse()?;
    log::debug!("Opening change feed for `{}`", table);

    let events = state.feed.subscribe(table).map(|change| {
        let op = match change.op {
            Op::Insert => "insert",
            Op::Update => "update",
            Op::Delete => "delete",
        };
        Event::default().event(op).json_data(change)
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
