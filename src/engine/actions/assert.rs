//! Assertion primitives
//!
//! Assertions evaluate once against the current page state. A false
//! expectation is a `StepError::Assertion`, which the retry policy never
//! retries.

use serde_json::Value;

use super::{render, ActionInput, Primitive};
use crate::bridge::{BrowserBackend, WaitCondition};
use crate::engine::error::StepError;
use crate::engine::result::Outputs;

pub async fn execute(
    primitive: Primitive,
    backend: &mut dyn BrowserBackend,
    input: &ActionInput<'_>,
) -> Result<Outputs, StepError> {
    let keyword = input.keyword;

    match primitive {
        Primitive::AssertVisible => {
            let handle = input.handle()?;
            let visible = backend
                .probe(&WaitCondition::Visible(handle.clone()))
                .await
                .map_err(|e| StepError::action(keyword, e))?;
            if !visible {
                return Err(StepError::Assertion(format!(
                    "Element {} is not visible",
                    handle
                )));
            }
        }
        Primitive::AssertHidden => {
            if let Some(handle) = input.target {
                let hidden = backend
                    .probe(&WaitCondition::Hidden(handle.clone()))
                    .await
                    .map_err(|e| StepError::action(keyword, e))?;
                if !hidden {
                    return Err(StepError::Assertion(format!(
                        "Element {} is visible",
                        handle
                    )));
                }
            }
        }
        Primitive::AssertText => {
            let expected = input.param_str("text")?;
            let actual = backend
                .text(input.handle()?)
                .await
                .map_err(|e| StepError::action(keyword, e))?;
            if !actual.trim().contains(expected.trim()) {
                return Err(StepError::Assertion(format!(
                    "Expected text containing '{}', got '{}'",
                    expected, actual
                )));
            }
        }
        Primitive::AssertUrl => {
            let fragment = input.param_str("contains")?;
            let url = backend
                .current_url()
                .await
                .map_err(|e| StepError::action(keyword, e))?;
            if !url.contains(&fragment) {
                return Err(StepError::Assertion(format!(
                    "Expected URL containing '{}', got '{}'",
                    fragment, url
                )));
            }
        }
        Primitive::AssertEquals => {
            let actual = input.param("actual")?;
            let expected = input.param("expected")?;
            if !loosely_equal(actual, expected) {
                return Err(StepError::Assertion(format!(
                    "Expected {}, got {}",
                    expected, actual
                )));
            }
        }
        other => {
            return Err(StepError::Config(format!(
                "{:?} is not an assertion primitive",
                other
            )))
        }
    }

    Ok(Outputs::new())
}

/// Equal as values, or equal once both are rendered as text (`3` == `"3"`)
fn loosely_equal(a: &Value, b: &Value) -> bool {
    a == b || render(a) == render(b)
}
