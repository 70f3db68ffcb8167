mod common;

use async_trait::async_trait;
use common::*;
use journey_actions::bridge::{BrowserBackend, ElementHandle};
use journey_actions::engine::{
    ActionRegistry, ActionSpec, Executor, Outputs, PluginAction, SemanticExpander, StepError,
};
use journey_actions::workflow::{
    Compiler, ExecutionContext, LocatorPack, OnPhaseFailure, Params, PhaseMode, StepKind,
    WorkflowLoader,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

fn compile_err(source: &str) -> String {
    let registry = ActionRegistry::with_builtins();
    Compiler::new(&registry)
        .with_timeout_profiles(["short".to_string()])
        .compile(source, "test.journey")
        .unwrap_err()
        .to_string()
}

const FULL: &str = r#"
# Project lifecycle
workflow: "Project lifecycle"
  tags: smoke, projects
  locators: app
  success: project is listed
  on_phase_failure: continue
  var project = "Quarterly"
  var budget = 1200

  setup:
    step page.goto url="{{base_url}}/projects"
  end setup

  phase: Create mode=recover tolerance=1
    do create_project name=$project
    step element.click target=projects.refresh optional
    assert visible target=projects.list retry=2
  end phase

  phase: Verify
    assert text target=projects.list text="{{ project }}" timeout=short
    step element.text target=projects.count id=count
  end phase

  recovery:
    step browser.screenshot
  end recovery

  teardown:
    step page.goto url="about:blank"
  end teardown
end workflow
"#;

#[test]
fn test_compile_full_workflow() {
    let workflow = compile(FULL);

    assert_eq!(workflow.name, "Project lifecycle");
    assert_eq!(workflow.tags, vec!["smoke", "projects"]);
    assert!(workflow.has_tag("smoke"));
    assert_eq!(workflow.locator_pack.as_deref(), Some("app"));
    assert_eq!(workflow.success_criteria.as_deref(), Some("project is listed"));
    assert_eq!(workflow.on_phase_failure, Some(OnPhaseFailure::Continue));
    assert_eq!(workflow.variables["project"], json!("Quarterly"));
    assert_eq!(workflow.variables["budget"], json!(1200));
    assert_eq!(workflow.source.line, 3);

    assert_eq!(workflow.setup.len(), 1);
    assert_eq!(workflow.recovery.len(), 1);
    assert_eq!(workflow.teardown.len(), 1);
    assert_eq!(workflow.phases.len(), 2);

    let create = workflow.phase("Create").unwrap();
    assert_eq!(create.mode, Some(PhaseMode::Recover));
    assert_eq!(create.tolerance, Some(1));
    assert_eq!(create.steps[0].kind, StepKind::Semantic);
    assert_eq!(create.steps[0].keyword, "create_project");
    assert!(create.steps[1].optional);
    assert_eq!(create.steps[2].keyword, "assert.visible");
    assert_eq!(create.steps[2].retry, Some(2));

    let verify = workflow.phase("Verify").unwrap();
    assert_eq!(verify.mode, None);
    assert_eq!(verify.steps[0].timeout.as_deref(), Some("short"));
    assert_eq!(verify.steps[0].target.as_deref(), Some("projects.list"));
    assert!(!verify.steps[0].params.contains_key("timeout"));
    assert_eq!(verify.steps[1].id.as_deref(), Some("count"));
}

#[test]
fn test_every_step_has_one_owner() {
    let workflow = compile(FULL);

    let mut seen = HashSet::new();
    let mut phase_steps = 0;
    for phase in &workflow.phases {
        for step in &phase.steps {
            assert!(seen.insert(step.source.line), "step at {} owned twice", step.source);
            assert!(step.source.line > phase.source.line);
            phase_steps += 1;
        }
    }
    let blocks = workflow.setup.len() + workflow.recovery.len() + workflow.teardown.len();
    assert_eq!(workflow.steps().count(), phase_steps + blocks);
}

#[test]
fn test_placeholders_recorded_not_resolved() {
    let workflow = compile(FULL);
    let goto = &workflow.setup[0];
    assert_eq!(goto.params["url"], json!("{{base_url}}/projects"));
    assert_eq!(goto.placeholders, vec!["base_url"]);

    let create = &workflow.phases[0].steps[0];
    assert_eq!(create.params["name"], json!("$project"));
    assert_eq!(create.placeholders, vec!["project"]);
}

#[test]
fn test_digest_tracks_text() {
    let a = compile(FULL);
    let b = compile(FULL);
    let c = compile(&FULL.replace("Quarterly", "Annual"));
    assert_eq!(a.digest, b.digest);
    assert_eq!(a.digest.len(), 64);
    assert_ne!(a.digest, c.digest);
}

#[test]
fn test_literal_element_query_rejected() {
    let err = compile_err(
        r##"
workflow: dirty
  phase: main
    step element.click target=save selector="#save-button"
  end phase
end workflow
"##,
    );
    assert!(err.contains("test.journey:4"), "{}", err);
    assert!(err.contains("literal-element-query"), "{}", err);
}

#[test]
fn test_literal_timeout_rejected() {
    let err = compile_err(
        r#"
workflow: dirty
  phase: main
    step wait.visible target=save timeout=5000
  end phase
end workflow
"#,
    );
    assert!(err.contains("test.journey:4"), "{}", err);
    assert!(err.contains("literal-timeout"), "{}", err);
}

#[test]
fn test_literal_queries_in_variables_rejected() {
    let err = compile_err(
        r#"
workflow: dirty vars
  var sel = "css=button.primary"
  phase: main
    step page.goto url=$sel
  end phase
end workflow
"#,
    );
    assert!(err.contains("test.journey:3"), "{}", err);
    assert!(err.contains("literal-element-query"), "{}", err);

    let err = compile_err(
        r#"
workflow: dirty vars
  var pause = "5000ms"
  phase: main
    step page.goto url="https://example.com"
  end phase
end workflow
"#,
    );
    assert!(err.contains("test.journey:3"), "{}", err);
    assert!(err.contains("literal-timeout"), "{}", err);
}

#[test]
fn test_placeholder_target_recorded() {
    let workflow = compile(
        r#"
workflow: indirect
  locators: app
  var button = "projects.create"
  phase: main
    step element.click target=$button
  end phase
end workflow
"#,
    );
    let step = &workflow.phases[0].steps[0];
    assert_eq!(step.target.as_deref(), Some("$button"));
    assert_eq!(step.placeholders, vec!["button"]);
}

#[test]
fn test_lint_can_be_disabled() {
    let registry = ActionRegistry::with_builtins();
    let source = r##"
workflow: trusted
  phase: main
    step element.click target=save css="#save"
  end phase
end workflow
"##;
    assert!(Compiler::new(&registry).compile(source, "t.journey").is_err());
    assert!(Compiler::new(&registry)
        .without_lint()
        .compile(source, "t.journey")
        .is_ok());
}

#[test]
fn test_unknown_keyword_rejected() {
    let err = compile_err(
        r#"
workflow: unknown
  phase: main
    step page.goto url="https://example.com"
    step element.hover target=menu
  end phase
end workflow
"#,
    );
    assert!(err.contains("test.journey:5"), "{}", err);
    assert!(err.contains("Unknown action keyword: element.hover"), "{}", err);
}

#[test]
fn test_missing_required_parameter() {
    let err = compile_err(
        r#"
workflow: params
  phase: main
    step element.fill target=name
  end phase
end workflow
"#,
    );
    assert!(err.contains("missing required parameter 'value'"), "{}", err);
}

#[test]
fn test_target_rules() {
    let err = compile_err(
        r#"
workflow: targets
  phase: main
    step element.click
  end phase
end workflow
"#,
    );
    assert!(err.contains("requires target"), "{}", err);

    let err = compile_err(
        r#"
workflow: targets
  phase: main
    step page.goto url="https://example.com" target=home
  end phase
end workflow
"#,
    );
    assert!(err.contains("does not take a target"), "{}", err);
}

#[test]
fn test_structural_errors() {
    let err = compile_err("workflow: open\n  phase: main\n    step browser.screenshot\nend workflow\n");
    assert!(err.contains("not closed"), "{}", err);

    let err = compile_err("workflow: empty\n  phase: main\n  end phase\nend workflow\n");
    assert!(err.contains("has no steps"), "{}", err);

    let err = compile_err("workflow: nothing\n  tags: a\nend workflow\n");
    assert!(err.contains("declares no phases"), "{}", err);

    let err = compile_err(
        "workflow: dup\n  phase: main\n    step browser.screenshot\n  end phase\n  phase: main\n    step browser.screenshot\n  end phase\nend workflow\n",
    );
    assert!(err.contains("duplicate phase name"), "{}", err);

    let err = compile_err(
        "workflow: dup\n  phase: main\n    step page.goto url=\"a\" url=\"b\"\n  end phase\nend workflow\n",
    );
    assert!(err.contains("test.journey:3"), "{}", err);
    assert!(err.contains("given twice"), "{}", err);

    let err = compile_err("step browser.screenshot\n");
    assert!(err.contains("outside of a workflow"), "{}", err);
}

#[test]
fn test_timeout_profile_must_exist() {
    let err = compile_err(
        r#"
workflow: profiles
  phase: main
    step wait.visible target=save timeout=glacial
  end phase
end workflow
"#,
    );
    assert!(err.contains("unknown timeout profile 'glacial'"), "{}", err);
}

#[test]
fn test_semantic_actions_not_validated() {
    let workflow = compile(
        r#"
workflow: semantic
  phase: main
    do anything_at_all answer=42
  end phase
end workflow
"#,
    );
    let step = &workflow.phases[0].steps[0];
    assert_eq!(step.kind, StepKind::Semantic);
    assert_eq!(step.params["answer"], json!(42));
}

#[test]
fn test_compile_all_and_single() {
    let source = format!("{}\n{}", simple_workflow("one"), simple_workflow("two"));
    let registry = ActionRegistry::with_builtins();
    let compiler = Compiler::new(&registry);

    let workflows = compiler.compile_all(&source, "many.journey").unwrap();
    assert_eq!(workflows.len(), 2);
    assert!(compiler.compile(&source, "many.journey").is_err());
}

#[test]
fn test_loader_reads_directory() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "b.journey", &simple_workflow("second"));
    write_workflow(dir.path(), "a.journey", &simple_workflow("first"));

    let registry = ActionRegistry::with_builtins();
    let compiler = Compiler::new(&registry);
    let workflows = WorkflowLoader::load_directory(&compiler, dir.path()).unwrap();
    let names: Vec<_> = workflows.iter().map(|w| w.name.as_str()).collect();
    assert_eq!(names, vec!["first", "second"]);
}

struct TagRecord;

#[async_trait]
impl PluginAction for TagRecord {
    async fn invoke(
        &self,
        _backend: &mut dyn BrowserBackend,
        target: Option<&ElementHandle>,
        params: &Params,
        _context: &ExecutionContext,
    ) -> Result<Outputs, StepError> {
        let mut outputs = Outputs::new();
        outputs.insert(
            "tagged".to_string(),
            json!(format!(
                "{}:{}",
                target.map(|t| t.as_str()).unwrap_or("-"),
                params.get("tag").and_then(|t| t.as_str()).unwrap_or_default()
            )),
        );
        Ok(outputs)
    }
}

#[tokio::test]
async fn test_plugin_action_compiles_and_runs() {
    let mut registry = ActionRegistry::with_builtins();
    registry
        .register(ActionSpec::plugin("crm", "tag", Arc::new(TagRecord)).with_params(&["tag"]))
        .unwrap();
    let registry = registry.seal();

    let source = r#"
workflow: plugin
  locators: app
  phase: main
    step plugin.crm.tag target=record tag="vip" id=crm
    assert equals actual=$crm.tagged expected="h-record:vip"
  end phase
end workflow
"#;
    let workflow = Compiler::new(&registry).compile(source, "plugin.journey").unwrap();
    assert_eq!(
        workflow.phases[0].steps[0].kind,
        StepKind::Plugin {
            plugin: "crm".into()
        }
    );

    let backend = ScriptedBackend::new().element(test_id("record"), "h-record");
    let expander = Arc::new(SemanticExpander::new(Arc::clone(&registry)));
    let mut executor = Executor::new(registry, expander, Box::new(backend))
        .with_config(fast_config())
        .with_pack(LocatorPack::new("app").with_element("record", primary("record")));

    let result = executor.run(&workflow).await.unwrap();
    assert!(result.success(), "{:?}", result.root_cause);
    assert_eq!(result.phases[0].steps[0].outputs["tagged"], "h-record:vip");
}
