//! Built-in atomic actions
//!
//! Each primitive maps to one backend capability (plus a bounded wait where
//! the primitive is a wait). Targets arrive already resolved by the
//! executor; parameters arrive with placeholders already substituted.
//!
//! - `browser` - navigation, element interaction, waits, screenshots
//! - `assert` - expectations, never retried

pub mod assert;
pub mod browser;

use serde_json::Value;
use std::time::Duration;

use crate::bridge::{BrowserBackend, ElementHandle};
use crate::engine::error::StepError;
use crate::engine::registry::{ActionSpec, TargetUse};
use crate::engine::result::Outputs;
use crate::engine::wait::PollPolicy;
use crate::workflow::context::ExecutionContext;
use crate::workflow::job::Params;

/// Closed set of built-in primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Goto,
    Click,
    Fill,
    Text,
    WaitVisible,
    WaitHidden,
    WaitNavigation,
    Screenshot,
    CtxSet,
    AssertVisible,
    AssertHidden,
    AssertText,
    AssertUrl,
    AssertEquals,
}

pub fn builtin_specs() -> Vec<ActionSpec> {
    use Primitive::*;
    vec![
        ActionSpec::atomic("page.goto", Goto)
            .with_params(&["url"])
            .with_description("Navigate the page to a URL"),
        ActionSpec::atomic("element.click", Click)
            .with_target(TargetUse::Required)
            .with_description("Click an element"),
        ActionSpec::atomic("element.fill", Fill)
            .with_target(TargetUse::Required)
            .with_params(&["value"])
            .with_description("Replace an input's value"),
        ActionSpec::atomic("element.text", Text)
            .with_target(TargetUse::Required)
            .with_description("Read an element's text into output 'text'"),
        ActionSpec::atomic("wait.visible", WaitVisible)
            .with_target(TargetUse::Required)
            .with_description("Wait until an element is visible"),
        ActionSpec::atomic("wait.hidden", WaitHidden)
            .with_target(TargetUse::AbsentOk)
            .with_description("Wait until an element is hidden or absent"),
        ActionSpec::atomic("wait.navigation", WaitNavigation)
            .with_description("Wait for the current navigation to settle"),
        ActionSpec::atomic("browser.screenshot", Screenshot)
            .with_description("Capture a screenshot into output 'evidence'"),
        ActionSpec::atomic("ctx.set", CtxSet)
            .with_params(&["key", "value"])
            .with_description("Store a value in the execution context"),
        ActionSpec::atomic("assert.visible", AssertVisible)
            .with_target(TargetUse::Required)
            .with_description("Element is visible"),
        ActionSpec::atomic("assert.hidden", AssertHidden)
            .with_target(TargetUse::AbsentOk)
            .with_description("Element is hidden or absent"),
        ActionSpec::atomic("assert.text", AssertText)
            .with_target(TargetUse::Required)
            .with_params(&["text"])
            .with_description("Element text contains 'text'"),
        ActionSpec::atomic("assert.url", AssertUrl)
            .with_params(&["contains"])
            .with_description("Current URL contains 'contains'"),
        ActionSpec::atomic("assert.equals", AssertEquals)
            .with_params(&["actual", "expected"])
            .with_description("Two resolved values are equal"),
    ]
}

/// Everything a primitive needs besides the backend and context
pub struct ActionInput<'a> {
    pub keyword: &'a str,
    pub target: Option<&'a ElementHandle>,
    pub params: &'a Params,
    /// Bound for primitives that wait on a condition
    pub wait_timeout: Duration,
    pub poll: &'a PollPolicy,
}

impl<'a> ActionInput<'a> {
    pub fn param(&self, name: &str) -> Result<&'a Value, StepError> {
        self.params
            .get(name)
            .ok_or_else(|| StepError::InvalidParameter(format!("{}: missing '{}'", self.keyword, name)))
    }

    /// Parameter rendered as text
    pub fn param_str(&self, name: &str) -> Result<String, StepError> {
        Ok(render(self.param(name)?))
    }

    pub fn handle(&self) -> Result<&'a ElementHandle, StepError> {
        self.target
            .ok_or_else(|| StepError::InvalidParameter(format!("{}: no target", self.keyword)))
    }
}

pub(crate) fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub async fn execute(
    primitive: Primitive,
    backend: &mut dyn BrowserBackend,
    input: ActionInput<'_>,
    context: &mut ExecutionContext,
) -> Result<Outputs, StepError> {
    use Primitive::*;
    match primitive {
        Goto | Click | Fill | Text | WaitVisible | WaitHidden | WaitNavigation | Screenshot => {
            browser::execute(primitive, backend, &input).await
        }
        CtxSet => {
            let key = input.param_str("key")?;
            context.set(&key, input.param("value")?.clone());
            Ok(Outputs::new())
        }
        AssertVisible | AssertHidden | AssertText | AssertUrl | AssertEquals => {
            assert::execute(primitive, backend, &input).await
        }
    }
}
