//! Workflow file loader
//!
//! Load and compile `.journey` files, singly or from a directory.

use std::path::{Path, PathBuf};

use super::compiler::{CompileError, Compiler};
use super::lint::{lint, LintViolation};
use super::locators::LocatorPack;
use super::Workflow;

pub const WORKFLOW_EXTENSION: &str = "journey";

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error in {file}: {error}")]
    Yaml {
        file: String,
        error: serde_yaml::Error,
    },

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),
}

pub struct WorkflowLoader;

impl WorkflowLoader {
    /// `.journey` files directly inside `dir`, sorted by name
    pub fn workflow_files(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(WORKFLOW_EXTENSION)
            {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Files for a path that may be a single file or a directory
    pub fn resolve_path(path: &Path) -> Result<Vec<PathBuf>, LoadError> {
        if path.is_dir() {
            Self::workflow_files(path)
        } else {
            Ok(vec![path.to_path_buf()])
        }
    }

    pub fn load_file(compiler: &Compiler<'_>, path: &Path) -> Result<Vec<Workflow>, LoadError> {
        let content = std::fs::read_to_string(path)?;
        Ok(compiler.compile_all(&content, &path.display().to_string())?)
    }

    pub fn load_directory(compiler: &Compiler<'_>, dir: &Path) -> Result<Vec<Workflow>, LoadError> {
        let mut workflows = Vec::new();
        for path in Self::workflow_files(dir)? {
            workflows.extend(Self::load_file(compiler, &path)?);
        }
        Ok(workflows)
    }

    /// Load a locator pack from YAML (`id:` plus an `elements:` map)
    pub fn load_locator_pack(path: &Path) -> Result<LocatorPack, LoadError> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| LoadError::Yaml {
            file: path.display().to_string(),
            error: e,
        })
    }

    /// Lint a file or every workflow file in a directory
    pub fn lint_path(path: &Path) -> Result<Vec<LintViolation>, LoadError> {
        let mut violations = Vec::new();
        for file in Self::resolve_path(path)? {
            let content = std::fs::read_to_string(&file)?;
            violations.extend(lint(&content, &file.display().to_string()));
        }
        Ok(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::registry::ActionRegistry;
    use std::fs;
    use tempfile::tempdir;

    const WORKFLOW: &str = r#"
workflow: open projects
  phase: main
    step page.goto url="https://example.com/projects"
  end phase
end workflow
"#;

    #[test]
    fn test_load_directory() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.journey"), WORKFLOW).unwrap();
        fs::write(
            dir.path().join("b.journey"),
            WORKFLOW.replace("open projects", "second"),
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = ActionRegistry::with_builtins().seal();
        let compiler = Compiler::new(&registry);
        let workflows = WorkflowLoader::load_directory(&compiler, dir.path()).unwrap();

        let names: Vec<_> = workflows.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["open projects", "second"]);
        assert!(workflows[0].source.file.ends_with("a.journey"));
    }

    #[test]
    fn test_load_file_compile_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.journey");
        fs::write(&path, "workflow: broken\n  phase: main\n").unwrap();

        let registry = ActionRegistry::with_builtins().seal();
        let compiler = Compiler::new(&registry);
        let err = WorkflowLoader::load_file(&compiler, &path).unwrap_err();
        assert!(matches!(err, LoadError::Compile(_)));
    }

    #[test]
    fn test_lint_path() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("dirty.journey"),
            "workflow: w\n  phase: p\n    step element.click selector=\"#go\"\n  end phase\nend workflow\n",
        )
        .unwrap();
        let violations = WorkflowLoader::lint_path(dir.path()).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].source.line, 3);
    }

    #[test]
    fn test_load_locator_pack() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("acme.yaml");
        fs::write(
            &path,
            "id: acme\nelements:\n  login.submit:\n    primary: { test_id: login-submit }\n",
        )
        .unwrap();
        let pack = WorkflowLoader::load_locator_pack(&path).unwrap();
        assert_eq!(pack.id, "acme");
        assert!(pack.get("login.submit").is_some());
    }
}
