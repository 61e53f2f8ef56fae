//! The uniform task contract (§3 `Task`, §4.7).

use crate::task::error::{TaskError, TaskErrorKind};
use crate::task::schema::{validate, ParameterSchema};
use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// One timestamped entry in a task's history trail (§3).
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub at: Instant,
    pub message: String,
}

/// Handed to a running task body so it can append history entries without
/// otherwise touching the owning [`Task`]'s execution state.
#[derive(Debug)]
pub struct TaskContext<'a> {
    history: &'a Mutex<Vec<HistoryEntry>>,
}

impl TaskContext<'_> {
    pub async fn log(&self, message: impl Into<String>) {
        self.history.lock().await.push(HistoryEntry {
            at: Instant::now(),
            message: message.into(),
        });
    }
}

/// The task-specific behavior a concrete task type provides; `Task` wraps
/// one of these and supplies the uniform validate/execute/history/result
/// machinery around it (§9 "Deep inheritance": composition, not a base
/// class hierarchy).
#[async_trait]
pub trait TaskBody: Send + Sync {
    fn name(&self) -> &str;

    fn type_tag(&self) -> &str {
        "task"
    }

    fn priority(&self) -> u8 {
        5
    }

    fn timeout(&self) -> Duration;

    fn schema(&self) -> Vec<ParameterSchema> {
        Vec::new()
    }

    async fn run(&self, ctx: &TaskContext<'_>, params: &Value) -> Result<Value, TaskError>;
}

/// A single unit of work, executed at most once (§3).
pub struct Task {
    body: Box<dyn TaskBody>,
    history: Mutex<Vec<HistoryEntry>>,
    param_errors: Mutex<Vec<String>>,
    error_kind: Mutex<Option<TaskErrorKind>>,
    result: Mutex<Option<Value>>,
    executed: Mutex<bool>,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.body.name())
            .finish_non_exhaustive()
    }
}

impl Task {
    #[must_use]
    pub fn new(body: Box<dyn TaskBody>) -> Self {
        Self {
            body,
            history: Mutex::new(Vec::new()),
            param_errors: Mutex::new(Vec::new()),
            error_kind: Mutex::new(None),
            result: Mutex::new(None),
            executed: Mutex::new(false),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.body.name()
    }

    #[must_use]
    pub fn type_tag(&self) -> &str {
        self.body.type_tag()
    }

    #[must_use]
    pub fn priority(&self) -> u8 {
        self.body.priority()
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.body.timeout()
    }

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().await.clone()
    }

    pub async fn add_history_entry(&self, message: impl Into<String>) {
        self.history.lock().await.push(HistoryEntry {
            at: Instant::now(),
            message: message.into(),
        });
    }

    pub async fn param_errors(&self) -> Vec<String> {
        self.param_errors.lock().await.clone()
    }

    pub async fn result(&self) -> Option<Value> {
        self.result.lock().await.clone()
    }

    pub async fn error_kind(&self) -> Option<TaskErrorKind> {
        *self.error_kind.lock().await
    }

    /// §4.7 `validateParams`: total validation producing either a
    /// canonicalized object or the complete error list.
    pub fn validate_params(&self, params: &Value) -> Result<Value, Vec<String>> {
        validate(&self.body.schema(), params)
    }

    /// Runs validation, records history, invokes the task body under its
    /// declared timeout, and converts any failure into a typed
    /// [`TaskError`] plus a history entry (§4.7 `execute`).
    pub async fn execute(&self, params: Value) -> Result<Value, TaskError> {
        {
            let mut executed = self.executed.lock().await;
            if *executed {
                return Err(TaskError::new(
                    TaskErrorKind::SystemError,
                    "task already executed",
                ));
            }
            *executed = true;
        }

        let canonical = match self.validate_params(&params) {
            Ok(canonical) => canonical,
            Err(errors) => {
                *self.param_errors.lock().await = errors.clone();
                *self.error_kind.lock().await = Some(TaskErrorKind::InvalidParameter);
                self.add_history_entry(format!("validation failed: {}", errors.join("; ")))
                    .await;
                return Err(TaskError::new(
                    TaskErrorKind::InvalidParameter,
                    errors.join("; "),
                ));
            }
        };

        self.add_history_entry(format!("executing {}", self.body.name())).await;
        let ctx = TaskContext {
            history: &self.history,
        };

        let outcome = tokio::time::timeout(self.timeout(), self.body.run(&ctx, &canonical)).await;

        match outcome {
            Ok(Ok(value)) => {
                *self.result.lock().await = Some(value.clone());
                self.add_history_entry("completed").await;
                Ok(value)
            }
            Ok(Err(task_error)) => {
                *self.error_kind.lock().await = Some(task_error.kind);
                self.add_history_entry(format!("failed: {}", task_error.message))
                    .await;
                Err(task_error)
            }
            Err(_) => {
                let task_error = TaskError::new(TaskErrorKind::TimeoutError, "task timed out");
                *self.error_kind.lock().await = Some(TaskErrorKind::TimeoutError);
                self.add_history_entry("timed out").await;
                Err(task_error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTask;

    #[async_trait]
    impl TaskBody for EchoTask {
        fn name(&self) -> &str {
            "echo"
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }

        fn schema(&self) -> Vec<ParameterSchema> {
            vec![ParameterSchema::new("value", crate::task::schema::ParamType::String).required()]
        }

        async fn run(&self, ctx: &TaskContext<'_>, params: &Value) -> Result<Value, TaskError> {
            ctx.log("echoing").await;
            Ok(params.clone())
        }
    }

    struct SlowTask;

    #[async_trait]
    impl TaskBody for SlowTask {
        fn name(&self) -> &str {
            "slow"
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(10)
        }

        async fn run(&self, _ctx: &TaskContext<'_>, _params: &Value) -> Result<Value, TaskError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn succeeds_and_populates_result() {
        let task = Task::new(Box::new(EchoTask));
        let result = task.execute(json!({ "value": "hi" })).await.unwrap();
        assert_eq!(result, json!({ "value": "hi" }));
        assert!(task.error_kind().await.is_none());
        assert!(task.result().await.is_some());
    }

    #[tokio::test]
    async fn missing_required_param_is_invalid_parameter() {
        let task = Task::new(Box::new(EchoTask));
        let error = task.execute(json!({})).await.unwrap_err();
        assert_eq!(error.kind, TaskErrorKind::InvalidParameter);
        assert!(task.result().await.is_none());
    }

    #[tokio::test]
    async fn second_execute_is_rejected() {
        let task = Task::new(Box::new(EchoTask));
        task.execute(json!({ "value": "hi" })).await.unwrap();
        let error = task.execute(json!({ "value": "hi" })).await.unwrap_err();
        assert_eq!(error.kind, TaskErrorKind::SystemError);
    }

    #[tokio::test]
    async fn timeout_surfaces_as_timeout_error() {
        let task = Task::new(Box::new(SlowTask));
        let error = task.execute(json!({})).await.unwrap_err();
        assert_eq!(error.kind, TaskErrorKind::TimeoutError);
    }
}
