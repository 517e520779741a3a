use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::path::Path;

use crate::utils::InsightCacheError;

/// Column a task sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "TODO",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Done => "DONE",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task on the board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, with = "due_date", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDateTime>,
    /// Higher number = higher priority
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub ai_generated: bool,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            status,
            tags: Vec::new(),
            due_date: None,
            priority: 0,
            ai_generated: false,
        }
    }

    pub fn with_tags<S: Into<String>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn due(mut self, due_date: NaiveDateTime) -> Self {
        self.due_date = Some(due_date);
        self
    }

    /// Past its due date and not done
    pub fn is_overdue(&self, now: NaiveDateTime) -> bool {
        self.status != TaskStatus::Done && self.due_date.is_some_and(|due| due < now)
    }
}

/// Counts behind the dashboard header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSummary {
    pub total: usize,
    pub todo: usize,
    pub in_progress: usize,
    pub done: usize,
    pub overdue: usize,
    /// Whole percent, 0 for an empty board
    pub completion_rate: u32,
}

impl BoardSummary {
    pub fn of(tasks: &[Task], now: NaiveDateTime) -> Self {
        let count = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count();
        let total = tasks.len();
        let done = count(TaskStatus::Done);
        let completion_rate = if total > 0 {
            ((done as f64 / total as f64) * 100.0).round() as u32
        } else {
            0
        };

        Self {
            total,
            todo: count(TaskStatus::Todo),
            in_progress: count(TaskStatus::InProgress),
            done,
            overdue: tasks.iter().filter(|t| t.is_overdue(now)).count(),
            completion_rate,
        }
    }
}

/// Fields the board insight depends on
pub fn insight_projection(task: &Task) -> Value {
    json!({ "id": task.id, "status": task.status, "title": task.title })
}

/// Fields the mood message depends on, as of `now`
///
/// Overdue state is included because it picks the message's tone, so a task
/// passing its due date invalidates the message without any edit.
pub fn mood_projection(task: &Task, now: NaiveDateTime) -> Value {
    json!({
        "id": task.id,
        "status": task.status,
        "dueDate": task.due_date.map(|d| d.format(due_date::FORMAT).to_string()),
        "overdue": task.is_overdue(now),
    })
}

/// Read a board from a JSON file: either a bare array or `{"tasks": [...]}`
pub fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TaskFile {
        Bare(Vec<Task>),
        Wrapped { tasks: Vec<Task> },
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read task file {}", path.display()))?;
    let parsed: TaskFile = serde_json::from_str(&raw).map_err(|e| {
        InsightCacheError::TaskFileError(format!("{}: {}", path.display(), e))
    })?;

    Ok(match parsed {
        TaskFile::Bare(tasks) | TaskFile::Wrapped { tasks } => tasks,
    })
}

/// Due dates as written by the board UI (`YYYY-MM-DDTHH:MM`)
mod due_date {
    use super::*;
    use serde::{de, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M";

    const ACCEPTED: &[&str] = &[FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        ACCEPTED
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
    }

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(due) => serializer.serialize_some(&due.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref() {
            None | Some("") => Ok(None),
            Some(text) => parse(text)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid due date '{}'", text))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn at(raw: &str) -> NaiveDateTime {
        due_date::parse(raw).unwrap()
    }

    #[test]
    fn test_task_json_matches_board_format() {
        let raw = r#"{
            "id": "t1",
            "title": "Ship release",
            "status": "IN_PROGRESS",
            "tags": ["work"],
            "dueDate": "2026-10-01T09:30",
            "priority": 2
        }"#;
        let task: Task = serde_json::from_str(raw).unwrap();

        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.due_date, Some(at("2026-10-01T09:30:00")));
        assert_eq!(task.description, "");

        let back = serde_json::to_value(&task).unwrap();
        assert_eq!(back["dueDate"], json!("2026-10-01T09:30"));
        assert_eq!(back["aiGenerated"], json!(false));
    }

    #[test]
    fn test_due_date_formats() {
        assert!(due_date::parse("2026-10-01").is_some());
        assert!(due_date::parse("2026-10-01T09:30:15.250").is_some());
        assert!(due_date::parse("next tuesday").is_none());

        let task: Task =
            serde_json::from_str(r#"{"id":"t","title":"x","status":"TODO","dueDate":""}"#).unwrap();
        assert_eq!(task.due_date, None);
    }

    #[test]
    fn test_summary_counts() {
        let now = at("2026-10-19T12:00");
        let tasks = vec![
            Task::new("1", "Late", TaskStatus::Todo).due(at("2026-10-18T12:00")),
            Task::new("2", "Late but done", TaskStatus::Done).due(at("2026-10-18T12:00")),
            Task::new("3", "Upcoming", TaskStatus::InProgress).due(at("2026-10-20T12:00")),
        ];

        let summary = BoardSummary::of(&tasks, now);
        assert_eq!(
            summary,
            BoardSummary {
                total: 3,
                todo: 1,
                in_progress: 1,
                done: 1,
                overdue: 1,
                completion_rate: 33,
            }
        );
        assert_eq!(BoardSummary::of(&[], now).completion_rate, 0);
    }

    #[test]
    fn test_projections_ignore_unrelated_fields() {
        let now = at("2026-10-19T12:00");
        let base = Task::new("1", "Write docs", TaskStatus::Todo);
        let mut edited = base.clone();
        edited.description = "longer description".to_string();
        edited.priority = 9;

        assert_eq!(insight_projection(&base), insight_projection(&edited));
        assert_eq!(mood_projection(&base, now), mood_projection(&edited, now));

        edited.title = "Write better docs".to_string();
        assert_ne!(insight_projection(&base), insight_projection(&edited));
        assert_eq!(mood_projection(&base, now), mood_projection(&edited, now));
    }

    #[test]
    fn test_mood_projection_changes_when_task_becomes_overdue() {
        let task = Task::new("1", "File taxes", TaskStatus::Todo).due(at("2026-10-19T12:00"));
        let before = mood_projection(&task, at("2026-10-19T11:59"));
        let after = mood_projection(&task, at("2026-10-19T12:01"));

        assert_eq!(before["overdue"], json!(false));
        assert_eq!(after["overdue"], json!(true));
        assert_ne!(before, after);

        let done = Task::new("1", "File taxes", TaskStatus::Done).due(at("2026-10-19T12:00"));
        assert_eq!(
            mood_projection(&done, at("2026-10-19T11:59")),
            mood_projection(&done, at("2026-10-19T12:01"))
        );
    }

    #[test]
    fn test_load_tasks_accepts_both_layouts() {
        let temp_dir = TempDir::new().unwrap();
        let bare = temp_dir.path().join("bare.json");
        let wrapped = temp_dir.path().join("wrapped.json");
        std::fs::write(&bare, r#"[{"id":"1","title":"a","status":"TODO"}]"#).unwrap();
        std::fs::write(&wrapped, r#"{"tasks":[{"id":"1","title":"a","status":"TODO"}]}"#)
            .unwrap();

        assert_eq!(load_tasks(&bare).unwrap(), load_tasks(&wrapped).unwrap());
    }

    #[test]
    fn test_load_tasks_reports_bad_status() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.json");
        std::fs::write(&path, r#"[{"id":"1","title":"a","status":"LATER"}]"#).unwrap();

        let err = load_tasks(&path).unwrap_err();
        assert!(err.to_string().contains("Task file error"));
    }
}
