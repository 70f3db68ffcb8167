//! Workflow compiler
//!
//! Turns line-oriented workflow text into a [`Workflow`] tree:
//!
//! ```text
//! workflow: Create project
//!   tags: smoke, projects
//!   locators: acme
//!   var project_name = "Quarterly report"
//!
//!   setup:
//!     step page.goto url="{{base_url}}/projects"
//!   end setup
//!
//!   phase: Create mode=recover tolerance=1
//!     do create_project name=$project_name
//!     step element.click target=projects.refresh optional
//!     assert visible target=projects.list retry=3
//!   end phase
//!
//!   recovery:
//!     step browser.screenshot
//!   end recovery
//! end workflow
//! ```
//!
//! Compilation is all-or-nothing: the purity lint runs first, then the
//! structure is parsed, then every `step`/`assert` keyword is checked
//! against the action registry. Semantic (`do`) keywords are left to the
//! expander at execution time. Placeholders are recorded, not resolved.

use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

use super::expressions::{placeholders, value_placeholders};
use super::job::{OnPhaseFailure, Params, Phase, PhaseMode, SourceRef, Step, StepKind, Workflow};
use super::lint::lint;
use crate::engine::registry::ActionRegistry;

static META_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(workflow|tags|locators|success|on_phase_failure|phase):\s*(.*)$").unwrap()
});

static VAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^var\s+([A-Za-z_]\w*)\s*=\s*(.+)$").unwrap());

static KEY_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z_][\w]*$").unwrap());

/// Reserved parameter names that configure the step rather than the action
const RESERVED_PARAMS: &[&str] = &["target", "id", "timeout", "retry"];

/// Compilation failure, always carrying where it happened
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{source_ref}: {message}")]
pub struct CompileError {
    pub message: String,
    pub source_ref: SourceRef,
}

impl CompileError {
    fn new(source_ref: SourceRef, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source_ref,
        }
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Pair(String, Value),
}

/// The verb that starts an action line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Step,
    Assert,
    Do,
}

/// A tokenized `step` / `assert` / `do` line
#[derive(Debug, Clone, PartialEq)]
pub struct ActionLine {
    pub verb: Verb,
    pub keyword: String,
    pub params: Vec<(String, Value)>,
    pub flags: Vec<String>,
}

/// Type a bare (unquoted) token
fn parse_bare(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(i) = raw.parse::<i64>() {
                Value::Number(i.into())
            } else if let Some(n) = raw
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .and_then(serde_json::Number::from_f64)
            {
                Value::Number(n)
            } else {
                Value::String(raw.to_string())
            }
        }
    }
}

fn read_quoted(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<String, String> {
    let mut out = String::new();
    loop {
        match chars.next() {
            Some('"') => return Ok(out),
            Some('\\') => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(c) => out.push(c),
                None => return Err("unterminated escape".to_string()),
            },
            Some(c) => out.push(c),
            None => return Err("unterminated quoted string".to_string()),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' {
            chars.next();
            tokens.push(Token::Word(read_quoted(&mut chars)?));
            continue;
        }

        let mut word = String::new();
        let mut pair_key: Option<String> = None;
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            if c == '=' && pair_key.is_none() && KEY_REGEX.is_match(&word) {
                chars.next();
                pair_key = Some(std::mem::take(&mut word));
                if chars.peek() == Some(&'"') {
                    chars.next();
                    let quoted = read_quoted(&mut chars)?;
                    tokens.push(Token::Pair(
                        pair_key.take().unwrap_or_default(),
                        Value::String(quoted),
                    ));
                    break;
                }
                continue;
            }
            word.push(c);
            chars.next();
        }

        match pair_key {
            Some(key) => tokens.push(Token::Pair(key, parse_bare(&word))),
            None if !word.is_empty() => tokens.push(Token::Word(word)),
            None => {}
        }
    }

    Ok(tokens)
}

/// Tokenize an action line. Returns `Ok(None)` for lines that are not
/// action lines at all.
pub fn tokenize_action_line(raw: &str) -> Result<Option<ActionLine>, String> {
    let line = raw.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some(("step", rest)) => (Verb::Step, rest),
        Some(("assert", rest)) => (Verb::Assert, rest),
        Some(("do", rest)) => (Verb::Do, rest),
        None if matches!(line, "step" | "assert" | "do") => {
            return Err(format!("'{}' requires an action keyword", line))
        }
        _ => return Ok(None),
    };

    let mut tokens = tokenize(rest)?.into_iter();
    let keyword = match tokens.next() {
        Some(Token::Word(keyword)) => keyword,
        Some(Token::Pair(key, _)) => {
            return Err(format!("expected an action keyword, found parameter '{}'", key))
        }
        None => return Err("missing action keyword".to_string()),
    };

    let mut params = Vec::new();
    let mut flags = Vec::new();
    for token in tokens {
        match token {
            Token::Pair(key, value) => params.push((key, value)),
            Token::Word(flag) => flags.push(flag),
        }
    }

    Ok(Some(ActionLine {
        verb,
        keyword,
        params,
        flags,
    }))
}

/// Split a `var <name> = <value>` line. Returns `None` for other lines.
pub fn split_var_line(raw: &str) -> Option<(String, Result<Value, String>)> {
    let cap = VAR_REGEX.captures(raw.trim())?;
    Some((cap[1].to_string(), parse_single_value(&cap[2])))
}

// ============================================================================
// Compiler
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Setup,
    Recovery,
    Teardown,
}

impl Block {
    fn name(&self) -> &'static str {
        match self {
            Block::Setup => "setup",
            Block::Recovery => "recovery",
            Block::Teardown => "teardown",
        }
    }
}

enum Open {
    Phase(Phase),
    Block(Block, Vec<Step>, SourceRef),
}

struct WorkflowBuilder {
    workflow: Workflow,
    lines: Vec<String>,
    seen_blocks: HashSet<&'static str>,
    open: Option<Open>,
}

/// Compiles workflow text against a sealed action registry
pub struct Compiler<'r> {
    registry: &'r ActionRegistry,
    timeout_profiles: Option<HashSet<String>>,
    lint: bool,
}

impl<'r> Compiler<'r> {
    pub fn new(registry: &'r ActionRegistry) -> Self {
        Self {
            registry,
            timeout_profiles: None,
            lint: true,
        }
    }

    /// Validate `timeout=` overrides against these profile names
    pub fn with_timeout_profiles(mut self, profiles: impl IntoIterator<Item = String>) -> Self {
        self.timeout_profiles = Some(profiles.into_iter().collect());
        self
    }

    /// Skip the purity lint (for tooling that reports lint separately)
    pub fn without_lint(mut self) -> Self {
        self.lint = false;
        self
    }

    /// Compile text containing exactly one workflow
    pub fn compile(&self, source: &str, file: &str) -> Result<Workflow, CompileError> {
        let mut workflows = self.compile_all(source, file)?;
        match workflows.len() {
            0 => Err(CompileError::new(
                SourceRef::new(file, 1),
                "no workflow found (expected 'workflow: <name>')",
            )),
            1 => Ok(workflows.remove(0)),
            _ => Err(CompileError::new(
                workflows[1].source.clone(),
                format!(
                    "expected exactly one workflow, found {}; use compile_all",
                    workflows.len()
                ),
            )),
        }
    }

    /// Compile every workflow in the text
    pub fn compile_all(&self, source: &str, file: &str) -> Result<Vec<Workflow>, CompileError> {
        if self.lint {
            if let Some(violation) = lint(source, file).into_iter().next() {
                return Err(CompileError::new(
                    violation.source,
                    format!("[{}] {}", violation.rule, violation.message),
                ));
            }
        }

        let mut workflows = Vec::new();
        let mut current: Option<WorkflowBuilder> = None;

        for (idx, raw) in source.lines().enumerate() {
            let at = SourceRef::new(file, idx + 1);
            let line = raw.trim();

            if let Some(builder) = current.as_mut() {
                builder.lines.push(raw.to_string());
            }

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line == "end workflow" {
                let builder = current
                    .take()
                    .ok_or_else(|| CompileError::new(at.clone(), "'end workflow' without 'workflow:'"))?;
                workflows.push(self.finish(builder, &at)?);
                continue;
            }

            let Some(builder) = current.as_mut() else {
                match META_REGEX.captures(line) {
                    Some(cap) if &cap[1] == "workflow" => {
                        let name = unquote(cap[2].trim());
                        if name.is_empty() {
                            return Err(CompileError::new(at, "workflow name is required"));
                        }
                        current = Some(WorkflowBuilder::new(name, at, raw));
                        continue;
                    }
                    _ => {
                        return Err(CompileError::new(
                            at,
                            format!("statement outside of a workflow: '{}'", line),
                        ))
                    }
                }
            };

            self.compile_line(builder, line, at)?;
        }

        if let Some(builder) = current {
            return Err(CompileError::new(
                builder.workflow.source.clone(),
                format!("workflow '{}' is missing 'end workflow'", builder.workflow.name),
            ));
        }

        Ok(workflows)
    }

    fn compile_line(
        &self,
        builder: &mut WorkflowBuilder,
        line: &str,
        at: SourceRef,
    ) -> Result<(), CompileError> {
        // Action lines
        if let Some(action) = tokenize_action_line(line).map_err(|e| CompileError::new(at.clone(), e))? {
            let step = self.compile_step(action, at.clone())?;
            return match builder.open.as_mut() {
                Some(Open::Phase(phase)) => {
                    phase.steps.push(step);
                    Ok(())
                }
                Some(Open::Block(_, steps, _)) => {
                    steps.push(step);
                    Ok(())
                }
                None => Err(CompileError::new(
                    at,
                    "action outside of a phase or setup/recovery/teardown block",
                )),
            };
        }

        // Block terminators
        if let Some(what) = line.strip_prefix("end ") {
            let what = what.trim();
            return match (builder.open.take(), what) {
                (Some(Open::Phase(phase)), "phase") => {
                    if phase.steps.is_empty() {
                        return Err(CompileError::new(
                            phase.source.clone(),
                            format!("phase '{}' has no steps", phase.name),
                        ));
                    }
                    builder.workflow.phases.push(phase);
                    Ok(())
                }
                (Some(Open::Block(block, steps, _)), name) if name == block.name() => {
                    match block {
                        Block::Setup => builder.workflow.setup = steps,
                        Block::Recovery => builder.workflow.recovery = steps,
                        Block::Teardown => builder.workflow.teardown = steps,
                    }
                    Ok(())
                }
                (Some(open), _) => {
                    let expected = match &open {
                        Open::Phase(_) => "phase",
                        Open::Block(block, _, _) => block.name(),
                    };
                    Err(CompileError::new(
                        at,
                        format!("'end {}' does not close the open '{}' block", what, expected),
                    ))
                }
                (None, _) => Err(CompileError::new(at, format!("'end {}' without a matching block", what))),
            };
        }

        if let Some(open) = &builder.open {
            let name = match open {
                Open::Phase(phase) => phase.name.clone(),
                Open::Block(block, _, _) => block.name().to_string(),
            };
            return Err(CompileError::new(
                at,
                format!("unexpected statement inside '{}': '{}' (missing 'end'?)", name, line),
            ));
        }

        // Action blocks
        for block in [Block::Setup, Block::Recovery, Block::Teardown] {
            if line == format!("{}:", block.name()) {
                if !builder.seen_blocks.insert(block.name()) {
                    return Err(CompileError::new(
                        at,
                        format!("duplicate '{}' block", block.name()),
                    ));
                }
                builder.open = Some(Open::Block(block, Vec::new(), at));
                return Ok(());
            }
        }

        // Variables
        if let Some((name, value)) = split_var_line(line) {
            let value = value.map_err(|e| CompileError::new(at.clone(), e))?;
            if builder.workflow.variables.insert(name.clone(), value).is_some() {
                return Err(CompileError::new(at, format!("variable '{}' declared twice", name)));
            }
            return Ok(());
        }

        // Metadata and phases
        let cap = META_REGEX
            .captures(line)
            .ok_or_else(|| CompileError::new(at.clone(), format!("unrecognized statement: '{}'", line)))?;
        let value = cap[2].trim();
        match &cap[1] {
            "workflow" => Err(CompileError::new(
                at,
                "nested 'workflow:' (missing 'end workflow'?)",
            )),
            "tags" => {
                builder.workflow.tags = value
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
                Ok(())
            }
            "locators" => {
                builder.workflow.locator_pack = Some(unquote(value));
                Ok(())
            }
            "success" => {
                builder.workflow.success_criteria = Some(unquote(value));
                Ok(())
            }
            "on_phase_failure" => {
                let policy: OnPhaseFailure =
                    value.parse().map_err(|e: String| CompileError::new(at, e))?;
                builder.workflow.on_phase_failure = Some(policy);
                Ok(())
            }
            "phase" => {
                let phase = parse_phase_header(value, &at)?;
                if builder.workflow.phases.iter().any(|p| p.name == phase.name) {
                    return Err(CompileError::new(
                        at,
                        format!("duplicate phase name '{}'", phase.name),
                    ));
                }
                builder.open = Some(Open::Phase(phase));
                Ok(())
            }
            other => Err(CompileError::new(at, format!("unknown metadata '{}'", other))),
        }
    }

    fn compile_step(&self, action: ActionLine, at: SourceRef) -> Result<Step, CompileError> {
        let keyword = match action.verb {
            Verb::Assert if !action.keyword.starts_with("assert.") => {
                format!("assert.{}", action.keyword)
            }
            _ => action.keyword.clone(),
        };

        let kind = match action.verb {
            Verb::Do => StepKind::Semantic,
            Verb::Step | Verb::Assert => {
                let spec = self
                    .registry
                    .get(&keyword)
                    .map_err(|e| CompileError::new(at.clone(), e.to_string()))?;
                match spec.plugin_name() {
                    Some(plugin) => StepKind::Plugin {
                        plugin: plugin.to_string(),
                    },
                    None => StepKind::Atomic,
                }
            }
        };

        let mut params = Params::new();
        let mut target = None;
        let mut id = None;
        let mut timeout = None;
        let mut retry = None;

        for (key, value) in action.params {
            if RESERVED_PARAMS.contains(&key.as_str()) {
                match key.as_str() {
                    "target" => target = Some(expect_string(&key, value, &at)?),
                    "id" => id = Some(expect_string(&key, value, &at)?),
                    "timeout" => {
                        let profile = expect_string(&key, value, &at)?;
                        if let Some(profiles) = &self.timeout_profiles {
                            if !profiles.contains(&profile) {
                                return Err(CompileError::new(
                                    at,
                                    format!("unknown timeout profile '{}'", profile),
                                ));
                            }
                        }
                        timeout = Some(profile);
                    }
                    "retry" => {
                        let attempts = value
                            .as_u64()
                            .filter(|n| *n >= 1 && *n <= u32::MAX as u64)
                            .ok_or_else(|| {
                                CompileError::new(
                                    at.clone(),
                                    format!("retry must be a positive integer, got {}", value),
                                )
                            })?;
                        retry = Some(attempts as u32);
                    }
                    _ => {}
                }
                continue;
            }
            if params.insert(key.clone(), value).is_some() {
                return Err(CompileError::new(
                    at,
                    format!("parameter '{}' given twice", key),
                ));
            }
        }

        let mut optional = false;
        for flag in &action.flags {
            match flag.as_str() {
                "optional" => optional = true,
                other => {
                    return Err(CompileError::new(
                        at,
                        format!("unexpected token '{}' (parameters are key=value)", other),
                    ))
                }
            }
        }

        if !matches!(kind, StepKind::Semantic) {
            let spec = self
                .registry
                .get(&keyword)
                .map_err(|e| CompileError::new(at.clone(), e.to_string()))?;
            if spec.requires_target() && target.is_none() {
                return Err(CompileError::new(
                    at,
                    format!("'{}' requires target=<locator key>", keyword),
                ));
            }
            if !spec.accepts_target() && target.is_some() {
                return Err(CompileError::new(
                    at,
                    format!("'{}' does not take a target", keyword),
                ));
            }
            for required in &spec.required_params {
                if !params.contains_key(required) {
                    return Err(CompileError::new(
                        at,
                        format!("'{}' is missing required parameter '{}'", keyword, required),
                    ));
                }
            }
        }

        let referenced = params
            .values()
            .flat_map(value_placeholders)
            .chain(target.iter().flat_map(|t| placeholders(t)))
            .collect();

        Ok(Step {
            kind,
            keyword,
            params,
            target,
            id,
            timeout,
            retry,
            optional,
            placeholders: referenced,
            source: at,
        })
    }

    fn finish(&self, builder: WorkflowBuilder, at: &SourceRef) -> Result<Workflow, CompileError> {
        if let Some(open) = builder.open {
            let (what, source) = match open {
                Open::Phase(phase) => (format!("phase '{}'", phase.name), phase.source),
                Open::Block(block, _, source) => (format!("'{}' block", block.name()), source),
            };
            return Err(CompileError::new(
                source,
                format!("{} is not closed before 'end workflow' ({})", what, at),
            ));
        }

        let mut workflow = builder.workflow;
        if workflow.phases.is_empty() {
            return Err(CompileError::new(
                workflow.source.clone(),
                format!("workflow '{}' declares no phases", workflow.name),
            ));
        }

        let mut hasher = Sha256::new();
        hasher.update(builder.lines.join("\n").as_bytes());
        workflow.digest = hex::encode(hasher.finalize());

        debug!(
            "Compiled workflow '{}' ({} phases, {} steps)",
            workflow.name,
            workflow.phases.len(),
            workflow.steps().count()
        );
        Ok(workflow)
    }
}

impl WorkflowBuilder {
    fn new(name: String, at: SourceRef, raw: &str) -> Self {
        Self {
            workflow: Workflow {
                name,
                tags: Vec::new(),
                locator_pack: None,
                variables: Params::new(),
                success_criteria: None,
                on_phase_failure: None,
                setup: Vec::new(),
                phases: Vec::new(),
                recovery: Vec::new(),
                teardown: Vec::new(),
                source: at,
                digest: String::new(),
            },
            lines: vec![raw.to_string()],
            seen_blocks: HashSet::new(),
            open: None,
        }
    }
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

fn expect_string(key: &str, value: Value, at: &SourceRef) -> Result<String, CompileError> {
    match value {
        Value::String(s) if !s.is_empty() => Ok(s),
        other => Err(CompileError::new(
            at.clone(),
            format!("'{}' must be a name, got {}", key, other),
        )),
    }
}

fn parse_single_value(raw: &str) -> Result<Value, String> {
    let tokens = tokenize(raw.trim())?;
    match tokens.as_slice() {
        [Token::Word(word)] if raw.trim().starts_with('"') => Ok(Value::String(word.clone())),
        [Token::Word(word)] => Ok(parse_bare(word)),
        _ => Err(format!(
            "variable value must be a single token or a quoted string, got '{}'",
            raw.trim()
        )),
    }
}

fn parse_phase_header(rest: &str, at: &SourceRef) -> Result<Phase, CompileError> {
    let tokens = tokenize(rest).map_err(|e| CompileError::new(at.clone(), e))?;
    let mut name_parts = Vec::new();
    let mut mode = None;
    let mut tolerance = None;

    for token in tokens {
        match token {
            Token::Word(word) => {
                if mode.is_some() || tolerance.is_some() {
                    return Err(CompileError::new(
                        at.clone(),
                        format!("unexpected '{}' after phase options", word),
                    ));
                }
                name_parts.push(word);
            }
            Token::Pair(key, value) => match key.as_str() {
                "mode" => {
                    let raw = value.as_str().unwrap_or_default();
                    mode = Some(
                        raw.parse::<PhaseMode>()
                            .map_err(|e| CompileError::new(at.clone(), e))?,
                    );
                }
                "tolerance" => {
                    let n = value.as_u64().ok_or_else(|| {
                        CompileError::new(
                            at.clone(),
                            format!("tolerance must be a non-negative integer, got {}", value),
                        )
                    })?;
                    tolerance = Some(n as usize);
                }
                other => {
                    return Err(CompileError::new(
                        at.clone(),
                        format!("unknown phase option '{}'", other),
                    ))
                }
            },
        }
    }

    let name = name_parts.join(" ");
    if name.is_empty() {
        return Err(CompileError::new(at.clone(), "phase name is required"));
    }
    if tolerance.is_some() && mode != Some(PhaseMode::Recover) {
        return Err(CompileError::new(
            at.clone(),
            "tolerance only applies to mode=recover phases",
        ));
    }

    Ok(Phase {
        name,
        mode,
        tolerance,
        steps: Vec::new(),
        source: at.clone(),
    })
}
