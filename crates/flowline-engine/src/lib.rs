//! Workflow execution engine.
//!
//! A workflow's tasks run strictly one after another. Each LLM task gets a
//! prompt built from its config and the previous task's output, and its
//! result becomes the input of the next task. A task whose invocation fails
//! outright stops the run; the report still carries everything gathered so
//! far.

pub mod executor;
pub mod prompt;

pub use executor::{ExecutionSettings, WorkflowExecutor};
pub use prompt::build_prompt;
