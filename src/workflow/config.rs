//! Engine configuration
//!
//! Policy and environment handed to the compiler and executor, loaded from
//! a YAML file. Every section is optional:
//!
//! ```yaml
//! timeouts:
//!   step_ms: 15000
//!   primary_ms: 2000
//!   profiles:
//!     long: 60000
//!
//! retry:
//!   max_attempts: 3
//!   initial_backoff_ms: 250
//!   transient_errors: [timeout, blocked, stale, not_interactable]
//!
//! phases:
//!   default_mode: strict
//!   recover_tolerance: 0
//!
//! variables:
//!   base_url: https://staging.example.com
//!
//! adapters:
//!   - adapters/projects.yaml
//!
//! playwright:
//!   browser: chromium
//!   headless: true
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use super::job::PhaseMode;
use super::loader::LoadError;
use crate::bridge::BackendErrorKind;

// ============================================================================
// Timeouts
// ============================================================================

/// Timeout policy. Workflow text never carries literal durations; steps may
/// only pick one of the named `profiles`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default bound for one step attempt
    pub step_ms: u64,

    /// Polling window for the primary locator tier
    pub primary_ms: u64,

    /// Polling window for each secondary strategy
    pub secondary_ms: u64,

    /// Polling window for the tertiary strategy
    pub tertiary_ms: u64,

    /// First poll interval for wait conditions
    pub poll_ms: u64,

    /// Poll interval ceiling
    pub max_poll_ms: u64,

    /// Named step timeouts (`timeout=long`)
    pub profiles: HashMap<String, u64>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            step_ms: 15_000,
            primary_ms: 2_000,
            secondary_ms: 1_000,
            tertiary_ms: 1_000,
            poll_ms: 50,
            max_poll_ms: 500,
            profiles: HashMap::new(),
        }
    }
}

impl TimeoutConfig {
    /// Step timeout for an optional profile name
    pub fn step_timeout(&self, profile: Option<&str>) -> Option<Duration> {
        match profile {
            None => Some(Duration::from_millis(self.step_ms)),
            Some(name) => self.profiles.get(name).map(|ms| Duration::from_millis(*ms)),
        }
    }
}

// ============================================================================
// Retry
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempt bound for steps without `retry=N`
    pub max_attempts: u32,

    pub initial_backoff_ms: u64,

    pub multiplier: f64,

    pub max_backoff_ms: u64,

    /// Give optional steps the full attempt bound instead of one attempt
    pub retry_optional_steps: bool,

    /// Backend error kinds treated as transient
    pub transient_errors: Vec<BackendErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            multiplier: 2.0,
            max_backoff_ms: 2_000,
            retry_optional_steps: false,
            transient_errors: vec![
                BackendErrorKind::Timeout,
                BackendErrorKind::Blocked,
                BackendErrorKind::Stale,
                BackendErrorKind::NotInteractable,
            ],
        }
    }
}

impl RetryConfig {
    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let ms = self.initial_backoff_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        Duration::from_millis(ms.min(self.max_backoff_ms as f64) as u64)
    }

    pub fn is_transient(&self, kind: BackendErrorKind) -> bool {
        self.transient_errors.contains(&kind)
    }
}

// ============================================================================
// Phases
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PhaseConfig {
    /// Mode for phases that do not declare one
    pub default_mode: PhaseMode,

    /// Non-optional failures a recover-mode phase absorbs before failing
    pub recover_tolerance: usize,

    /// Keep running later phases after a phase fails
    pub continue_past_phase_failure: bool,
}

// ============================================================================
// Playwright
// ============================================================================

/// Browser types supported
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BrowserType {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

/// Playwright bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaywrightConfig {
    #[serde(default)]
    pub browser: BrowserType,

    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Node script implementing the JSON-RPC server
    #[serde(default = "default_server_script")]
    pub server_script: String,

    /// Where screenshots are written
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: String,
}

fn default_headless() -> bool {
    true
}

fn default_server_script() -> String {
    "playwright-server/index.js".to_string()
}

fn default_screenshot_dir() -> String {
    ".journey-actions/evidence".to_string()
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: BrowserType::default(),
            headless: default_headless(),
            server_script: default_server_script(),
            screenshot_dir: default_screenshot_dir(),
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub timeouts: TimeoutConfig,

    pub retry: RetryConfig,

    pub phases: PhaseConfig,

    /// Static template values
    pub variables: HashMap<String, Value>,

    /// Locator pack YAML files
    pub locator_packs: Vec<String>,

    /// Declarative adapter YAML files
    pub adapters: Vec<String>,

    pub playwright: PlaywrightConfig,
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|e| LoadError::Yaml {
            file: path.display().to_string(),
            error: e,
        })
    }

    /// Resolve relative adapter and pack paths against the config file's
    /// directory
    pub fn rebase_paths(&mut self, base: &Path) {
        for path in self.locator_packs.iter_mut().chain(self.adapters.iter_mut()) {
            if Path::new(path.as_str()).is_relative() {
                *path = base.join(path.as_str()).display().to_string();
            }
        }
    }
}
