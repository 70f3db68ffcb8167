//! # Journey Actions
//!
//! A declarative workflow engine for browser test automation. Workflows
//! describe user journeys in a small line grammar; the engine compiles them
//! against an action registry and runs them through a browser backend.
//!
//! ## Features
//!
//! - **Compiled workflows** - A purity lint and registry validation run before anything executes
//! - **Semantic actions** - Business keywords expand into atomic steps at run time
//! - **Tiered locators** - Logical element keys resolve through primary, secondary, and tertiary strategies
//! - **Phase policy** - `strict` phases stop at the first failure, `recover` phases tolerate a budget
//! - **Recovery and teardown** - Failures run recovery once; teardown always runs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use journey_actions::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = r#"
//! workflow: smoke
//!   phase: open
//!     step page.goto url="https://example.com"
//!     assert url contains="example"
//!   end phase
//! end workflow
//! "#;
//!
//!     let registry = ActionRegistry::with_builtins().seal();
//!     let workflow = Compiler::new(&registry).compile(source, "smoke.journey")?;
//!
//!     let backend = PlaywrightBridge::start(&PlaywrightConfig::default()).await?;
//!     let expander = Arc::new(SemanticExpander::new(Arc::clone(&registry)));
//!     let mut executor = Executor::new(registry, expander, Box::new(backend));
//!
//!     let result = executor.run(&workflow).await?;
//!     println!("Workflow completed: success={}", result.success());
//!     executor.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod engine;
pub mod workflow;

// Re-export main types
pub use bridge::{BackendError, BrowserBackend, ElementHandle, PlaywrightBridge, QueryOutcome};
pub use engine::{
    install_adapters, ActionRegistry, Adapter, CancelHandle, DeclarativeAdapter, Executor,
    ExecutorError, SemanticExpander, StepResult, WorkflowResult,
};
pub use workflow::{
    CompileError, Compiler, EngineConfig, ExecutionContext, LoadError, LocatorPack, Step,
    Workflow, WorkflowLoader,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bridge::{BrowserBackend, PlaywrightBridge};
    pub use crate::engine::{
        install_adapters, ActionRegistry, ActionSpec, Adapter, CancelHandle, DeclarativeAdapter,
        Executor, ExecutorError, ScreenshotCollector, SemanticExpander, WorkflowResult,
    };
    pub use crate::workflow::{
        Compiler, EngineConfig, LoadError, LocatorPack, LocatorSpec, PlaywrightConfig, Strategy,
        Workflow, WorkflowLoader,
    };
}
