//! Runner configuration types.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// How generated test files are executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Python interpreter used to launch pytest
    pub python: String,
    /// Working directory for the pytest process
    pub working_dir: PathBuf,
    /// Directory holding generated tests and `conftest.py`
    pub tests_dir: PathBuf,
    /// Directory the evidence hooks write videos, logs and reports into
    pub evidence_dir: PathBuf,
    /// Hard bound on one run
    pub timeout_seconds: u64,
    /// Exported as `PLAYWRIGHT_HEADLESS`
    pub headless: bool,
    /// Appended after the standard pytest flags
    pub extra_args: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::for_workspace(".")
    }
}

impl RunnerConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

    /// Configuration rooted at a workspace holding `tests/` and `evidence/`.
    pub fn for_workspace(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            python: "python".to_string(),
            working_dir: root.to_path_buf(),
            tests_dir: root.join("tests"),
            evidence_dir: root.join("evidence"),
            timeout_seconds: Self::DEFAULT_TIMEOUT_SECS,
            headless: true,
            extra_args: Vec::new(),
        }
    }

    pub fn python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Arguments passed to the interpreter for one test file.
    pub fn pytest_args(&self, test_file: &Path) -> Vec<String> {
        let mut args = vec![
            "-m".to_string(),
            "pytest".to_string(),
            test_file.to_string_lossy().to_string(),
            "-v".to_string(),
            "--tb=long".to_string(),
            "-rA".to_string(),
            "--capture=tee-sys".to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }

    pub fn headless_env(&self) -> (&'static str, &'static str) {
        ("PLAYWRIGHT_HEADLESS", if self.headless { "true" } else { "false" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_layout() {
        let config = RunnerConfig::for_workspace("/srv/qa");
        assert_eq!(config.tests_dir, PathBuf::from("/srv/qa/tests"));
        assert_eq!(config.evidence_dir, PathBuf::from("/srv/qa/evidence"));
        assert_eq!(config.timeout_seconds, 600);
        assert_eq!(config.headless_env(), ("PLAYWRIGHT_HEADLESS", "true"));
    }

    #[test]
    fn test_pytest_args() {
        let config = RunnerConfig::default().extra_arg("-x");
        let args = config.pytest_args(Path::new("tests/test_demo.py"));
        assert_eq!(&args[..3], &["-m", "pytest", "tests/test_demo.py"]);
        assert!(args.contains(&"--capture=tee-sys".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("-x"));
    }
}
