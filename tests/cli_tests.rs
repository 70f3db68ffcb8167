mod common;

use common::*;
use std::process::Command;

fn cli_command() -> Command {
    Command::new(env!("CARGO_BIN_EXE_journey-actions"))
}

const ADAPTER: &str = r#"
name: projects
pack: app
locators:
  projects.create:
    primary: { test_id: create-project }
  project.name:
    primary: { label: Project name }
actions:
  create_project:
    params: [name]
    steps:
      - keyword: element.click
        target: projects.create
      - keyword: element.fill
        target: project.name
        params: { value: "{{name}}" }
"#;

const SEMANTIC_WORKFLOW: &str = r#"
workflow: create project
  locators: app
  phase: main
    do create_project name="Q3"
    step wait.visible target=projects.create timeout=long
  end phase
end workflow
"#;

#[test]
fn test_cli_help() {
    let output = cli_command().arg("--help").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Compile and run user-journey workflows"));
    assert!(stdout.contains("run"));
    assert!(stdout.contains("validate"));
    assert!(stdout.contains("lint"));
    assert!(stdout.contains("actions"));
}

#[test]
fn test_cli_version() {
    let output = cli_command().arg("--version").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("journey-actions"));
}

#[test]
fn test_cli_run_help() {
    let output = cli_command().args(["run", "--help"]).output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Run a workflow file"));
    assert!(stdout.contains("--config"));
    assert!(stdout.contains("--report"));
}

#[test]
fn test_cli_run_missing_file() {
    let output = cli_command()
        .args(["run", "/nonexistent/flow.journey"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_cli_validate_valid_file() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "smoke.journey", &simple_workflow("smoke"));

    let output = cli_command()
        .args(["validate", dir.path().join("smoke.journey").to_str().unwrap()])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("✓ smoke"));
}

#[test]
fn test_cli_validate_directory() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "a.journey", &simple_workflow("alpha"));
    write_workflow(dir.path(), "b.journey", &simple_workflow("beta"));

    let output = cli_command()
        .args(["validate", dir.path().to_str().unwrap()])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("✓ alpha"));
    assert!(stdout.contains("✓ beta"));
}

#[test]
fn test_cli_validate_compile_error() {
    let dir = create_test_dir();
    write_workflow(
        dir.path(),
        "bad.journey",
        "workflow: bad\n  phase: main\n    step element.hover target=menu\n  end phase\nend workflow\n",
    );

    let output = cli_command()
        .args(["validate", dir.path().join("bad.journey").to_str().unwrap()])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("element.hover"));
}

#[test]
fn test_cli_validate_with_adapter_config() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "projects.yaml", ADAPTER);
    write_workflow(
        dir.path(),
        "journey.yaml",
        "adapters: [projects.yaml]\ntimeouts:\n  profiles:\n    long: 30000\n",
    );
    write_workflow(dir.path(), "create.journey", SEMANTIC_WORKFLOW);

    let output = cli_command()
        .args([
            "validate",
            dir.path().join("create.journey").to_str().unwrap(),
            "--config",
            dir.path().join("journey.yaml").to_str().unwrap(),
        ])
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stdout)
    );
}

#[test]
fn test_cli_validate_reports_unknown_semantic_action() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "projects.yaml", ADAPTER);
    write_workflow(
        dir.path(),
        "journey.yaml",
        "adapters: [projects.yaml]\ntimeouts:\n  profiles:\n    long: 30000\n",
    );
    write_workflow(
        dir.path(),
        "create.journey",
        &SEMANTIC_WORKFLOW.replace("create_project", "archive_project"),
    );

    let output = cli_command()
        .args([
            "validate",
            dir.path().join("create.journey").to_str().unwrap(),
            "--config",
            dir.path().join("journey.yaml").to_str().unwrap(),
        ])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("unknown semantic action 'archive_project'"));
}

#[test]
fn test_cli_lint_clean_and_dirty() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "clean.journey", &simple_workflow("clean"));

    let output = cli_command()
        .args(["lint", dir.path().to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());

    write_workflow(
        dir.path(),
        "dirty.journey",
        "workflow: dirty\n  phase: main\n    step wait.visible target=save timeout=3s\n  end phase\nend workflow\n",
    );
    let output = cli_command()
        .args(["lint", dir.path().to_str().unwrap()])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("dirty.journey:3"));
    assert!(stdout.contains("literal-timeout"));
}

#[test]
fn test_cli_actions_lists_registry() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "projects.yaml", ADAPTER);
    write_workflow(dir.path(), "journey.yaml", "adapters: [projects.yaml]\n");

    let output = cli_command()
        .args([
            "actions",
            "--config",
            dir.path().join("journey.yaml").to_str().unwrap(),
        ])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("element.click"));
    assert!(stdout.contains("assert.text"));
    assert!(stdout.contains("create_project"));
}
