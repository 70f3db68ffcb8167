//! Navigation, interaction, wait, and screenshot primitives

use serde_json::Value;

use super::{ActionInput, Primitive};
use crate::bridge::{BrowserBackend, WaitCondition};
use crate::engine::error::StepError;
use crate::engine::result::Outputs;
use crate::engine::wait::{wait_for, WaitError};

pub async fn execute(
    primitive: Primitive,
    backend: &mut dyn BrowserBackend,
    input: &ActionInput<'_>,
) -> Result<Outputs, StepError> {
    let keyword = input.keyword;
    let mut outputs = Outputs::new();

    match primitive {
        Primitive::Goto => {
            let url = input.param_str("url")?;
            backend
                .navigate(&url)
                .await
                .map_err(|e| StepError::action(keyword, e))?;
        }
        Primitive::Click => {
            backend
                .click(input.handle()?)
                .await
                .map_err(|e| StepError::action(keyword, e))?;
        }
        Primitive::Fill => {
            let value = input.param_str("value")?;
            backend
                .fill(input.handle()?, &value)
                .await
                .map_err(|e| StepError::action(keyword, e))?;
        }
        Primitive::Text => {
            let text = backend
                .text(input.handle()?)
                .await
                .map_err(|e| StepError::action(keyword, e))?;
            outputs.insert("text".to_string(), Value::String(text));
        }
        Primitive::WaitVisible => {
            let condition = WaitCondition::Visible(input.handle()?.clone());
            wait(backend, &condition, input).await?;
        }
        Primitive::WaitHidden => {
            // No target means the element could not be found at all
            if let Some(handle) = input.target {
                let condition = WaitCondition::Hidden(handle.clone());
                wait(backend, &condition, input).await?;
            }
        }
        Primitive::WaitNavigation => {
            wait(backend, &WaitCondition::NavigationComplete, input).await?;
        }
        Primitive::Screenshot => {
            let evidence = backend
                .screenshot()
                .await
                .map_err(|e| StepError::action(keyword, e))?;
            outputs.insert("evidence".to_string(), Value::String(evidence));
        }
        other => {
            return Err(StepError::Config(format!(
                "{:?} is not a browser primitive",
                other
            )))
        }
    }

    Ok(outputs)
}

async fn wait(
    backend: &mut dyn BrowserBackend,
    condition: &WaitCondition,
    input: &ActionInput<'_>,
) -> Result<(), StepError> {
    wait_for(backend, condition, input.wait_timeout, input.poll)
        .await
        .map_err(|e| match e {
            WaitError::Timeout { .. } => StepError::Timeout(input.wait_timeout),
            WaitError::Backend(error) => StepError::action(input.keyword, error),
        })
}
