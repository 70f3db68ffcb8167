#![allow(dead_code)]

use async_trait::async_trait;
use journey_actions::bridge::{
    BackendError, BrowserBackend, ElementHandle, EvidenceHandle, QueryOutcome, WaitCondition,
};
use journey_actions::engine::{ActionRegistry, CancelHandle, Executor, SemanticExpander};
use journey_actions::workflow::{
    Compiler, EngineConfig, LocatorPack, LocatorSpec, Strategy, Workflow,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

pub fn write_workflow(dir: &Path, filename: &str, content: &str) {
    fs::write(dir.join(filename), content).expect("Failed to write workflow file");
}

pub fn simple_workflow(name: &str) -> String {
    format!(
        r#"
workflow: {}
  phase: main
    step page.goto url="https://example.com"
  end phase
end workflow
"#,
        name
    )
}

/// Everything a scripted backend records, shared with the test
#[derive(Debug, Default)]
pub struct BackendState {
    scripts: HashMap<Strategy, VecDeque<QueryOutcome>>,
    pub queries: HashMap<Strategy, usize>,
    pub clicks: Vec<String>,
    pub fills: Vec<(String, String)>,
    pub navigations: Vec<String>,
    pub texts: HashMap<String, String>,
    pub hidden: HashSet<String>,
    pub blocked: HashSet<String>,
    pub screenshots: usize,
    pub url: String,
    cancel_on: Option<(String, CancelHandle)>,
}

/// Browser backend driven by per-strategy outcome scripts. Each query pops
/// the next scripted outcome; the last one repeats. Unscripted strategies
/// match nothing.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    state: Arc<Mutex<BackendState>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        let backend = Self::default();
        backend.state.lock().unwrap().url = "about:blank".to_string();
        backend
    }

    /// Strategy always matches exactly one element with handle `handle`
    pub fn element(self, strategy: Strategy, handle: &str) -> Self {
        self.script(strategy, vec![QueryOutcome::One(ElementHandle::new(handle))])
    }

    pub fn script(self, strategy: Strategy, outcomes: Vec<QueryOutcome>) -> Self {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(strategy, outcomes.into());
        self
    }

    pub fn with_text(self, handle: &str, text: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .texts
            .insert(handle.to_string(), text.to_string());
        self
    }

    pub fn hidden(self, handle: &str) -> Self {
        self.state.lock().unwrap().hidden.insert(handle.to_string());
        self
    }

    /// Clicks on `handle` fail with a transient "blocked" error
    pub fn blocked(self, handle: &str) -> Self {
        self.state.lock().unwrap().blocked.insert(handle.to_string());
        self
    }

    /// Navigating to `url` cancels the run through `handle`
    pub fn cancel_on_navigate(&self, url: &str, handle: CancelHandle) {
        self.state().cancel_on = Some((url.to_string(), handle));
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, BackendState> {
        self.state.lock().unwrap()
    }

    pub fn queries(&self, strategy: &Strategy) -> usize {
        self.state().queries.get(strategy).copied().unwrap_or(0)
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state().clicks.clone()
    }
}

#[async_trait]
impl BrowserBackend for ScriptedBackend {
    async fn navigate(&mut self, url: &str) -> Result<(), BackendError> {
        let mut state = self.state();
        state.navigations.push(url.to_string());
        state.url = url.to_string();
        if let Some((trigger, handle)) = &state.cancel_on {
            if trigger == url {
                handle.cancel();
            }
        }
        Ok(())
    }

    async fn query_element(&mut self, strategy: &Strategy) -> Result<QueryOutcome, BackendError> {
        let mut state = self.state();
        *state.queries.entry(strategy.clone()).or_insert(0) += 1;
        let outcome = match state.scripts.get_mut(strategy) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap_or(QueryOutcome::None),
            Some(script) => script.front().cloned().unwrap_or(QueryOutcome::None),
            None => QueryOutcome::None,
        };
        Ok(outcome)
    }

    async fn is_interactable(&mut self, _handle: &ElementHandle) -> Result<bool, BackendError> {
        Ok(true)
    }

    async fn click(&mut self, handle: &ElementHandle) -> Result<(), BackendError> {
        let mut state = self.state();
        if state.blocked.contains(handle.as_str()) {
            return Err(BackendError::Blocked(format!("overlay covers {}", handle)));
        }
        state.clicks.push(handle.as_str().to_string());
        Ok(())
    }

    async fn fill(&mut self, handle: &ElementHandle, text: &str) -> Result<(), BackendError> {
        self.state()
            .fills
            .push((handle.as_str().to_string(), text.to_string()));
        Ok(())
    }

    async fn text(&mut self, handle: &ElementHandle) -> Result<String, BackendError> {
        Ok(self
            .state()
            .texts
            .get(handle.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn current_url(&mut self) -> Result<String, BackendError> {
        Ok(self.state().url.clone())
    }

    async fn probe(&mut self, condition: &WaitCondition) -> Result<bool, BackendError> {
        let state = self.state();
        Ok(match condition {
            WaitCondition::Visible(handle) => !state.hidden.contains(handle.as_str()),
            WaitCondition::Hidden(handle) => state.hidden.contains(handle.as_str()),
            WaitCondition::NavigationComplete => true,
            WaitCondition::UrlContains(fragment) => state.url.contains(fragment.as_str()),
        })
    }

    async fn screenshot(&mut self) -> Result<EvidenceHandle, BackendError> {
        let mut state = self.state();
        state.screenshots += 1;
        Ok(format!("shot-{}", state.screenshots))
    }
}

pub fn test_id(id: &str) -> Strategy {
    Strategy::TestId(id.to_string())
}

pub fn primary(id: &str) -> LocatorSpec {
    LocatorSpec {
        primary: Some(test_id(id)),
        ..Default::default()
    }
}

/// Config with zero-length locator windows, no backoff, and a `short`
/// timeout profile
pub fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.timeouts.primary_ms = 0;
    config.timeouts.secondary_ms = 0;
    config.timeouts.tertiary_ms = 0;
    config.timeouts.poll_ms = 1;
    config.timeouts.max_poll_ms = 1;
    config.timeouts.step_ms = 2_000;
    config.timeouts.profiles.insert("short".to_string(), 50);
    config.retry.initial_backoff_ms = 0;
    config
}

pub fn compile(source: &str) -> Workflow {
    let registry = ActionRegistry::with_builtins();
    Compiler::new(&registry)
        .with_timeout_profiles(["short".to_string()])
        .compile(source, "test.journey")
        .expect("workflow should compile")
}

pub fn executor_with(
    backend: ScriptedBackend,
    pack: LocatorPack,
    expander: impl FnOnce(&mut SemanticExpander),
) -> Executor {
    let registry = ActionRegistry::with_builtins().seal();
    let mut semantic = SemanticExpander::new(Arc::clone(&registry));
    expander(&mut semantic);
    Executor::new(registry, Arc::new(semantic), Box::new(backend))
        .with_config(fast_config())
        .with_pack(pack)
}

pub fn executor(backend: ScriptedBackend, pack: LocatorPack) -> Executor {
    executor_with(backend, pack, |_| {})
}
