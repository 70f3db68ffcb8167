//! Playwright Bridge - Communication with Playwright via JSON-RPC

use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::rpc::{self, RequestSender};
use super::{
    BackendError, BrowserBackend, ElementHandle, EvidenceHandle, QueryOutcome, WaitCondition,
};
use crate::workflow::{PlaywrightConfig, Strategy};

pub struct PlaywrightBridge {
    request_tx: RequestSender,
    browser_id: String,
    page_id: String,
    screenshot_dir: String,
    screenshot_seq: u64,
    #[allow(dead_code)]
    child: Child,
}

impl PlaywrightBridge {
    /// Spawn the Playwright server, launch a browser and open one page
    pub async fn start(config: &PlaywrightConfig) -> Result<Self, BackendError> {
        let node = which::which("node")
            .map_err(|e| BackendError::StartupFailed(format!("node not found on PATH: {}", e)))?;

        let mut child = Command::new(node)
            .arg(&config.server_script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BackendError::StartupFailed(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BackendError::StartupFailed("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::StartupFailed("child stdout unavailable".into()))?;

        let (request_tx, request_rx) = mpsc::channel(100);
        rpc::spawn_communication_task(request_rx, stdin, stdout);

        let launched = rpc::send_request(
            &request_tx,
            "browser.launch",
            json!({
                "browserType": format!("{:?}", config.browser).to_lowercase(),
                "headless": config.headless,
            }),
        )
        .await?;
        let browser_id = string_field(&launched, "browserId")?;

        let page = rpc::send_request(&request_tx, "page.new", json!({ "browserId": browser_id }))
            .await?;
        let page_id = string_field(&page, "pageId")?;

        info!(
            "Playwright backend ready (browser: {}, page: {})",
            browser_id, page_id
        );

        Ok(Self {
            request_tx,
            browser_id,
            page_id,
            screenshot_dir: config.screenshot_dir.clone(),
            screenshot_seq: 0,
            child,
        })
    }

    async fn request(&self, method: &str, mut params: Value) -> Result<Value, BackendError> {
        if let Value::Object(map) = &mut params {
            map.insert("pageId".to_string(), Value::String(self.page_id.clone()));
        }
        debug!("playwright <- {}", method);
        rpc::send_request(&self.request_tx, method, params).await
    }
}

fn string_field(value: &Value, field: &str) -> Result<String, BackendError> {
    value[field]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| BackendError::ServerError(format!("No {} returned", field)))
}

#[async_trait]
impl BrowserBackend for PlaywrightBridge {
    async fn navigate(&mut self, url: &str) -> Result<(), BackendError> {
        self.request("page.goto", json!({ "url": url })).await?;
        Ok(())
    }

    async fn query_element(&mut self, strategy: &Strategy) -> Result<QueryOutcome, BackendError> {
        let result = self
            .request(
                "element.query",
                json!({ "strategy": serde_json::to_value(strategy)? }),
            )
            .await?;
        let count = result["count"].as_u64().unwrap_or(0) as usize;
        match count {
            0 => Ok(QueryOutcome::None),
            1 => Ok(QueryOutcome::One(ElementHandle::new(string_field(
                &result, "handle",
            )?))),
            n => Ok(QueryOutcome::Many(n)),
        }
    }

    async fn is_interactable(&mut self, handle: &ElementHandle) -> Result<bool, BackendError> {
        let result = self
            .request("element.isInteractable", json!({ "handle": handle.as_str() }))
            .await?;
        Ok(result["interactable"].as_bool().unwrap_or(false))
    }

    async fn click(&mut self, handle: &ElementHandle) -> Result<(), BackendError> {
        self.request("element.click", json!({ "handle": handle.as_str() }))
            .await?;
        Ok(())
    }

    async fn fill(&mut self, handle: &ElementHandle, text: &str) -> Result<(), BackendError> {
        self.request(
            "element.fill",
            json!({ "handle": handle.as_str(), "value": text }),
        )
        .await?;
        Ok(())
    }

    async fn text(&mut self, handle: &ElementHandle) -> Result<String, BackendError> {
        let result = self
            .request("element.textContent", json!({ "handle": handle.as_str() }))
            .await?;
        string_field(&result, "text")
    }

    async fn current_url(&mut self) -> Result<String, BackendError> {
        let result = self.request("page.url", json!({})).await?;
        string_field(&result, "url")
    }

    async fn probe(&mut self, condition: &WaitCondition) -> Result<bool, BackendError> {
        let result = match condition {
            WaitCondition::Visible(handle) => {
                self.request("element.isVisible", json!({ "handle": handle.as_str() }))
                    .await?["visible"]
                    .as_bool()
            }
            WaitCondition::Hidden(handle) => self
                .request("element.isVisible", json!({ "handle": handle.as_str() }))
                .await?["visible"]
                .as_bool()
                .map(|visible| !visible),
            WaitCondition::NavigationComplete => {
                self.request("page.loadState", json!({})).await?["complete"].as_bool()
            }
            WaitCondition::UrlContains(fragment) => {
                let url = self.current_url().await?;
                Some(url.contains(fragment.as_str()))
            }
        };
        Ok(result.unwrap_or(false))
    }

    async fn screenshot(&mut self) -> Result<EvidenceHandle, BackendError> {
        self.screenshot_seq += 1;
        let path = format!(
            "{}/{}-{}.png",
            self.screenshot_dir, self.page_id, self.screenshot_seq
        );
        self.request("page.screenshot", json!({ "path": path, "fullPage": true }))
            .await?;
        Ok(path)
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        rpc::send_request(
            &self.request_tx,
            "browser.close",
            json!({ "browserId": self.browser_id }),
        )
        .await?;
        Ok(())
    }
}
