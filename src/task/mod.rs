//! The task runtime (§3, §4.7-§4.9): a uniform execution contract around
//! PHD2 façade calls, plus the multi-step workflows built on top of it.

mod error;
mod factory;
mod registry;
mod schema;
#[allow(clippy::module_inception)]
mod task;

pub mod simple_tasks;
pub mod workflows;

pub use error::{TaskError, TaskErrorKind};
pub use factory::TaskFactory;
pub use registry::build_registry;
pub use schema::{validate, ParamType, ParameterSchema};
pub use task::{HistoryEntry, Task, TaskBody, TaskContext};
