//! The task factory/registry (§3 `TaskFactory registry`, §4.9).

use crate::task::error::{TaskError, TaskErrorKind};
use crate::task::task::Task;
use std::collections::HashMap;

type Constructor = Box<dyn Fn() -> Task + Send + Sync>;

/// Process-wide name -> constructor map, populated once at startup and
/// read-only thereafter (§4.9, §5 "Global mutable state").
pub struct TaskFactory {
    constructors: HashMap<String, Constructor>,
}

impl std::fmt::Debug for TaskFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskFactory")
            .field("registered", &self.constructors.len())
            .finish()
    }
}

impl TaskFactory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registers `name` with a fresh-instance constructor. Duplicate
    /// registration is a programmer error and fails loudly, leaving the
    /// registry untouched (§8 invariant 9).
    pub fn register(
        &mut self,
        name: impl Into<String>,
        constructor: impl Fn() -> Task + Send + Sync + 'static,
    ) -> Result<(), TaskError> {
        let name = name.into();
        if self.constructors.contains_key(&name) {
            return Err(TaskError::new(
                TaskErrorKind::SystemError,
                format!("task '{name}' is already registered"),
            ));
        }
        self.constructors.insert(name, Box::new(constructor));
        Ok(())
    }

    /// Returns a fresh, uninitialized [`Task`] instance for `name`, or
    /// `None` if no such task was registered.
    #[must_use]
    pub fn create(&self, name: &str) -> Option<Task> {
        self.constructors.get(name).map(|constructor| constructor())
    }

    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }
}

impl Default for TaskFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::schema::ParameterSchema;
    use crate::task::task::TaskContext;
    use crate::task::task::TaskBody;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::time::Duration;

    struct NoopTask;

    #[async_trait]
    impl TaskBody for NoopTask {
        fn name(&self) -> &str {
            "noop"
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }
        fn schema(&self) -> Vec<ParameterSchema> {
            Vec::new()
        }
        async fn run(&self, _ctx: &TaskContext<'_>, _params: &Value) -> Result<Value, TaskError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn duplicate_registration_leaves_registry_untouched() {
        let mut factory = TaskFactory::new();
        factory.register("noop", || Task::new(Box::new(NoopTask))).unwrap();
        let error = factory
            .register("noop", || Task::new(Box::new(NoopTask)))
            .unwrap_err();
        assert_eq!(error.kind, TaskErrorKind::SystemError);
        assert!(factory.is_registered("noop"));
    }

    #[test]
    fn create_returns_fresh_instance() {
        let mut factory = TaskFactory::new();
        factory.register("noop", || Task::new(Box::new(NoopTask))).unwrap();
        assert!(factory.create("noop").is_some());
        assert!(factory.create("missing").is_none());
    }
}
