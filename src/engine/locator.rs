//! Tiered locator resolution
//!
//! Maps a logical element key to a live handle by walking the key's tiers
//! in order and stopping at the first success:
//!
//! 1. primary: polled for the primary window; must match exactly one
//!    interactable element
//! 2. secondary: each strategy in declaration order, same acceptance rule;
//!    success is reported with a low-severity diagnostic
//! 3. tertiary: must be proven unique; more than one match is rejected
//!    outright, success is reported with a high-severity diagnostic
//!
//! Every call updates the run's [`LocatorMetrics`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::bridge::{BrowserBackend, ElementHandle, QueryOutcome};
use crate::engine::wait::{PollPolicy, Poller};
use crate::workflow::config::TimeoutConfig;
use crate::workflow::locators::{LocatorPack, Strategy, Tier};

/// Per-run resolution counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorMetrics {
    pub primary: u64,
    pub secondary: u64,
    pub tertiary: u64,
    pub failures: u64,
    /// Resolution calls, successful or not
    pub attempts: u64,
}

impl LocatorMetrics {
    pub fn hits(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Primary => self.primary,
            Tier::Secondary => self.secondary,
            Tier::Tertiary => self.tertiary,
        }
    }

    fn record(&mut self, tier: Tier) {
        match tier {
            Tier::Primary => self.primary += 1,
            Tier::Secondary => self.secondary += 1,
            Tier::Tertiary => self.tertiary += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    High,
}

/// Something a human should look at after the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

/// A successful resolution
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub handle: ElementHandle,
    pub tier: Tier,
    pub strategy: Strategy,
    pub diagnostic: Option<Diagnostic>,
}

/// No tier produced a usable target
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error(
    "Could not resolve '{logical_key}' (tiers tried: [{}]): {last_error}",
    format_tiers(.attempted_tiers)
)]
pub struct ResolutionFailure {
    pub logical_key: String,
    pub attempted_tiers: Vec<Tier>,
    pub last_error: String,
    /// Every attempted strategy came back empty, or matched one element
    /// that was not interactable. Ambiguous matches and backend errors
    /// clear it.
    pub absent: bool,
    /// A single non-interactable match seen while resolving
    pub inert: Option<ElementHandle>,
}

impl ResolutionFailure {
    /// Failure before any tier was tried (unknown pack or key)
    pub fn unattempted(logical_key: &str, last_error: impl Into<String>) -> Self {
        Self {
            logical_key: logical_key.to_string(),
            attempted_tiers: Vec::new(),
            last_error: last_error.into(),
            absent: false,
            inert: None,
        }
    }
}

/// Why one strategy produced no usable element
#[derive(Debug)]
enum Miss {
    NoMatch,
    Inert(ElementHandle),
    Ambiguous(usize),
    Backend(String),
}

impl Miss {
    fn describe(&self) -> String {
        match self {
            Miss::NoMatch => "no match".to_string(),
            Miss::Inert(_) => "element is not interactable".to_string(),
            Miss::Ambiguous(n) => format!("ambiguous: {} matches, expected exactly one", n),
            Miss::Backend(e) => e.clone(),
        }
    }
}

/// Tracks whether a failed resolution still means "not on the page"
#[derive(Debug)]
struct Absence {
    absent: bool,
    inert: Option<ElementHandle>,
}

impl Absence {
    fn new() -> Self {
        Self {
            absent: true,
            inert: None,
        }
    }

    fn observe(&mut self, miss: Miss) -> String {
        let message = miss.describe();
        match miss {
            Miss::NoMatch => {}
            Miss::Inert(handle) => {
                self.inert.get_or_insert(handle);
            }
            Miss::Ambiguous(_) | Miss::Backend(_) => self.absent = false,
        }
        message
    }
}

fn format_tiers(tiers: &[Tier]) -> String {
    tiers
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Polling windows per tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverPolicy {
    pub primary: Duration,
    pub secondary: Duration,
    pub tertiary: Duration,
    pub poll: PollPolicy,
}

impl Default for ResolverPolicy {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

impl From<&TimeoutConfig> for ResolverPolicy {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            primary: Duration::from_millis(config.primary_ms),
            secondary: Duration::from_millis(config.secondary_ms),
            tertiary: Duration::from_millis(config.tertiary_ms),
            poll: PollPolicy::from(config),
        }
    }
}

/// Resolves logical keys against registered locator packs
#[derive(Debug, Clone, Default)]
pub struct LocatorResolver {
    packs: HashMap<String, LocatorPack>,
    policy: ResolverPolicy,
}

impl LocatorResolver {
    pub fn new(policy: ResolverPolicy) -> Self {
        Self {
            packs: HashMap::new(),
            policy,
        }
    }

    /// Register a pack. A pack with an existing id is merged into it.
    pub fn add_pack(&mut self, pack: LocatorPack) {
        match self.packs.get_mut(&pack.id) {
            Some(existing) => existing.merge(pack),
            None => {
                self.packs.insert(pack.id.clone(), pack);
            }
        }
    }

    pub fn has_pack(&self, id: &str) -> bool {
        self.packs.contains_key(id)
    }

    pub fn pack_ids(&self) -> Vec<&str> {
        let mut ids: Vec<_> = self.packs.keys().map(|k| k.as_str()).collect();
        ids.sort();
        ids
    }

    pub fn policy(&self) -> &ResolverPolicy {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: ResolverPolicy) {
        self.policy = policy;
    }

    pub async fn resolve(
        &self,
        backend: &mut dyn BrowserBackend,
        pack_id: &str,
        logical_key: &str,
        metrics: &mut LocatorMetrics,
    ) -> Result<Resolved, ResolutionFailure> {
        metrics.attempts += 1;
        let result = self.resolve_tiers(backend, pack_id, logical_key).await;
        match &result {
            Ok(resolved) => {
                metrics.record(resolved.tier);
                match &resolved.diagnostic {
                    Some(d) if d.severity == Severity::High => error!("{}", d.message),
                    Some(d) => warn!("{}", d.message),
                    None => debug!("Resolved '{}' via {}", logical_key, resolved.strategy),
                }
            }
            Err(failure) => {
                metrics.failures += 1;
                debug!("{}", failure);
            }
        }
        result
    }

    async fn resolve_tiers(
        &self,
        backend: &mut dyn BrowserBackend,
        pack_id: &str,
        logical_key: &str,
    ) -> Result<Resolved, ResolutionFailure> {
        let pack = self.packs.get(pack_id).ok_or_else(|| {
            ResolutionFailure::unattempted(
                logical_key,
                format!("locator pack '{}' is not loaded", pack_id),
            )
        })?;
        let spec = pack.get(logical_key).ok_or_else(|| {
            ResolutionFailure::unattempted(
                logical_key,
                format!("no locator for '{}' in pack '{}'", logical_key, pack_id),
            )
        })?;
        if spec.is_empty() {
            return Err(ResolutionFailure::unattempted(
                logical_key,
                format!("locator '{}' declares no strategies", logical_key),
            ));
        }

        let mut attempted = Vec::new();
        let mut last_error = String::new();
        let mut absence = Absence::new();

        if let Some(strategy) = &spec.primary {
            attempted.push(Tier::Primary);
            match self.try_strategy(backend, strategy, self.policy.primary).await {
                Ok(handle) => {
                    return Ok(Resolved {
                        handle,
                        tier: Tier::Primary,
                        strategy: strategy.clone(),
                        diagnostic: None,
                    })
                }
                Err(miss) => {
                    last_error = format!("primary {}: {}", strategy, absence.observe(miss))
                }
            }
        }

        if !spec.secondary.is_empty() {
            attempted.push(Tier::Secondary);
            for strategy in &spec.secondary {
                match self.try_strategy(backend, strategy, self.policy.secondary).await {
                    Ok(handle) => {
                        let message = format!(
                            "'{}' resolved via secondary strategy {} ({}); harden the primary locator",
                            logical_key, strategy, last_error
                        );
                        return Ok(Resolved {
                            handle,
                            tier: Tier::Secondary,
                            strategy: strategy.clone(),
                            diagnostic: Some(Diagnostic {
                                severity: Severity::Low,
                                message,
                            }),
                        });
                    }
                    Err(miss) => {
                        last_error = format!("secondary {}: {}", strategy, absence.observe(miss))
                    }
                }
            }
        }

        if let Some(strategy) = &spec.tertiary {
            attempted.push(Tier::Tertiary);
            match self.try_unique(backend, strategy, self.policy.tertiary).await {
                Ok(handle) => {
                    let message = format!(
                        "'{}' resolved via tertiary text strategy {} ({}); locator needs remediation",
                        logical_key, strategy, last_error
                    );
                    return Ok(Resolved {
                        handle,
                        tier: Tier::Tertiary,
                        strategy: strategy.clone(),
                        diagnostic: Some(Diagnostic {
                            severity: Severity::High,
                            message,
                        }),
                    });
                }
                Err(miss) => {
                    last_error = format!("tertiary {}: {}", strategy, absence.observe(miss))
                }
            }
        }

        Err(ResolutionFailure {
            logical_key: logical_key.to_string(),
            absent: absence.absent && !attempted.is_empty(),
            inert: absence.inert,
            attempted_tiers: attempted,
            last_error,
        })
    }

    /// Poll one strategy until it yields exactly one interactable element
    async fn try_strategy(
        &self,
        backend: &mut dyn BrowserBackend,
        strategy: &Strategy,
        window: Duration,
    ) -> Result<ElementHandle, Miss> {
        let mut poller = Poller::new(window, &self.policy.poll);
        loop {
            let last = match backend.query_element(strategy).await {
                Ok(QueryOutcome::One(handle)) => match backend.is_interactable(&handle).await {
                    Ok(true) => return Ok(handle),
                    Ok(false) => Miss::Inert(handle),
                    Err(e) => Miss::Backend(e.to_string()),
                },
                Ok(QueryOutcome::None) => Miss::NoMatch,
                Ok(QueryOutcome::Many(n)) => Miss::Ambiguous(n),
                Err(e) => Miss::Backend(e.to_string()),
            };
            if !poller.tick().await {
                return Err(last);
            }
        }
    }

    /// Like `try_strategy`, but an ambiguous match fails immediately
    async fn try_unique(
        &self,
        backend: &mut dyn BrowserBackend,
        strategy: &Strategy,
        window: Duration,
    ) -> Result<ElementHandle, Miss> {
        let mut poller = Poller::new(window, &self.policy.poll);
        loop {
            let last = match backend.query_element(strategy).await {
                Ok(QueryOutcome::One(handle)) => return Ok(handle),
                Ok(QueryOutcome::Many(n)) => return Err(Miss::Ambiguous(n)),
                Ok(QueryOutcome::None) => Miss::NoMatch,
                Err(e) => Miss::Backend(e.to_string()),
            };
            if !poller.tick().await {
                return Err(last);
            }
        }
    }
}
