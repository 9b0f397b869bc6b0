use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::schema::{Row, SampleTuples, TableStructure};

pub const MSG_SCHEMA_NOT_READY: &str = "请先生成数据库结构";
pub const MSG_EMPTY_STATEMENT: &str = "SQL语句不能为空";
pub const MSG_INVALID_SQL: &str = "SQL语句不合法，请检查语法";
pub const MSG_EXECUTED: &str = "执行成功";

/// What the engine reports for one statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineResponse {
    pub success: bool,
    pub data: Option<Vec<Row>>,
    pub message: Option<String>,
}

impl EngineResponse {
    #[must_use]
    pub fn rows(rows: Vec<Row>, message: Option<String>) -> Self {
        Self {
            success: true,
            data: Some(rows),
            message,
        }
    }

    #[must_use]
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
        }
    }

    #[must_use]
    pub fn failed(message: Option<String>) -> Self {
        Self {
            success: false,
            data: None,
            message,
        }
    }
}

/// Raised by an engine instead of reporting `success = false`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineError {
    message: String,
}

impl EngineError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

pub trait QueryEngine: fmt::Debug {
    fn execute_query(&self, sql: &str) -> Result<EngineResponse, EngineError>;
}

/// Builds an engine from the producer's structure and sample rows.
pub trait EngineFactory {
    fn build(
        &self,
        structure: &TableStructure,
        tuples: &SampleTuples,
    ) -> Result<Box<dyn QueryEngine>, EngineError>;
}

pub trait ResultStore {
    fn set_rows(&self, rows: Vec<Row>);

    fn clear(&self) {
        self.set_rows(Vec::new());
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharedResultStore(Rc<RefCell<Vec<Row>>>);

impl SharedResultStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn rows(&self) -> Vec<Row> {
        self.0.borrow().clone()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

impl ResultStore for SharedResultStore {
    fn set_rows(&self, rows: Vec<Row>) {
        *self.0.borrow_mut() = rows;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    #[must_use]
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Fire-and-forget toast channel.
pub trait NotificationSink {
    fn notify(&self, notification: Notification);
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Success {
        rows: Option<Vec<Row>>,
        message: Option<String>,
    },
    ValidationFailure {
        message: String,
    },
    EngineFailure {
        message: String,
    },
}

impl QueryOutcome {
    #[must_use]
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Success { .. } => OutcomeKind::Success,
            Self::ValidationFailure { .. } => OutcomeKind::ValidationFailure,
            Self::EngineFailure { .. } => OutcomeKind::EngineFailure,
        }
    }

    /// The single notification this outcome surfaces.
    #[must_use]
    pub fn notification(&self) -> Notification {
        match self {
            Self::Success { message, .. } => Notification::new(
                NotificationLevel::Success,
                message.clone().unwrap_or_else(|| MSG_EXECUTED.to_string()),
            ),
            Self::ValidationFailure { message } => {
                Notification::new(NotificationLevel::Warning, message.clone())
            }
            Self::EngineFailure { message } => {
                Notification::new(NotificationLevel::Error, message.clone())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    ValidationFailure,
    EngineFailure,
}

pub type ExecuteCallback = Box<dyn FnMut(&[Row])>;

/// Turns one text snapshot into one outcome, one result projection and one
/// notification.
pub struct ExecutionDispatcher<R: ResultStore, N: NotificationSink> {
    results: R,
    notifications: N,
    on_execute: Option<ExecuteCallback>,
}

impl<R: ResultStore + fmt::Debug, N: NotificationSink + fmt::Debug> fmt::Debug
    for ExecutionDispatcher<R, N>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionDispatcher")
            .field("results", &self.results)
            .field("notifications", &self.notifications)
            .field("has_on_execute", &self.on_execute.is_some())
            .finish()
    }
}

impl<R: ResultStore, N: NotificationSink> ExecutionDispatcher<R, N> {
    #[must_use]
    pub fn new(results: R, notifications: N, on_execute: Option<ExecuteCallback>) -> Self {
        Self {
            results,
            notifications,
            on_execute,
        }
    }

    #[must_use]
    pub fn results(&self) -> &R {
        &self.results
    }

    pub fn dispatch(&mut self, engine: Option<&dyn QueryEngine>, sql: &str) -> QueryOutcome {
        let outcome = self.evaluate(engine, sql);

        match &outcome {
            QueryOutcome::Success {
                rows: Some(rows), ..
            } => {
                self.results.set_rows(rows.clone());
                if let Some(on_execute) = self.on_execute.as_mut() {
                    on_execute(rows);
                }
            }
            QueryOutcome::Success { rows: None, .. }
            | QueryOutcome::ValidationFailure { .. }
            | QueryOutcome::EngineFailure { .. } => self.results.clear(),
        }

        self.notifications.notify(outcome.notification());
        outcome
    }

    fn evaluate(&self, engine: Option<&dyn QueryEngine>, sql: &str) -> QueryOutcome {
        let Some(engine) = engine else {
            tracing::debug!("execution requested before the schema was ready");
            return QueryOutcome::ValidationFailure {
                message: MSG_SCHEMA_NOT_READY.to_string(),
            };
        };

        if sql.trim().is_empty() {
            tracing::debug!("execution requested with an empty statement");
            return QueryOutcome::ValidationFailure {
                message: MSG_EMPTY_STATEMENT.to_string(),
            };
        }

        tracing::debug!(sql_preview = %sql.chars().take(100).collect::<String>(), "executing query");
        match engine.execute_query(sql) {
            Ok(EngineResponse {
                success: true,
                data,
                message,
            }) => {
                tracing::debug!(rows = data.as_ref().map(Vec::len), "query succeeded");
                QueryOutcome::Success {
                    rows: data,
                    message,
                }
            }
            Ok(EngineResponse { message, .. }) => QueryOutcome::EngineFailure {
                message: message
                    .filter(|message| !message.is_empty())
                    .unwrap_or_else(|| MSG_INVALID_SQL.to_string()),
            },
            Err(error) => {
                tracing::error!(%error, "query engine raised");
                QueryOutcome::EngineFailure {
                    message: MSG_INVALID_SQL.to_string(),
                }
            }
        }
    }
}
