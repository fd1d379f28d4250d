//! # qa_runner
//!
//! Test execution and page inspection for qa-agent.
//!
//! Generated Playwright tests run under pytest as a subprocess, either to
//! completion or streamed line by line. A generated `conftest.py` makes every
//! run leave evidence behind: one video per test, a session log and a JSON
//! report that takes precedence over parsed console output.
//!
//! # Example
//!
//! ```rust,no_run
//! use qa_runner::{PytestRunner, RunnerConfig, TestRunner};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = PytestRunner::new(RunnerConfig::for_workspace(".").headless(true));
//!     let report = runner.run(Path::new("tests/test_example_com.py")).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod conftest;
pub mod error;
pub mod evidence;
pub mod inspector;
pub mod mock;
pub mod output;
pub mod pytest;
pub mod runner;

pub use config::RunnerConfig;
pub use error::{RunnerError, RunnerResult};
pub use evidence::{list_evidence, EvidenceFile, EvidenceListing, HookReport};
pub use inspector::{PageInspector, PlaywrightInspector};
pub use mock::{MockInspector, MockRun, MockRunner};
pub use output::{parse_results, ResultMatcher};
pub use pytest::PytestRunner;
pub use runner::{RunEvent, RunSummary, TestRunner};
