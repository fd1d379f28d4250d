//! # qa_core
//!
//! Core state for the qa-agent pipeline.
//!
//! This crate holds the data model shared by every phase, the per-session
//! phase state machine, and the artifact store that writes page models,
//! test plans, generated tests and execution reports to disk.
//!
//! # Architecture
//!
//! - **Model**: page models, test cases, artifacts, execution reports
//! - **Workflow**: `idle → explored → designed → implemented → verified`
//! - **Sessions**: one workflow per session id, each behind its own lock
//! - **Store**: timestamped, append-only artifact files

pub mod error;
pub mod model;
pub mod session;
pub mod store;
pub mod workflow;

pub use error::{CoreError, CoreResult};
pub use model::{
    CorrectionAttempt, DomElement, DomForm, DomInput, DomSnapshot, Evidence, ExecutionReport,
    Outcome, PageElement, PageMetadata, PageModel, Priority, RawDom, TestArtifact, TestCase,
    TestRecord, TestStatus, TestSuite, TestSummary, TestType, UserFlow,
};
pub use session::{SessionRegistry, SharedWorkflow, DEFAULT_SESSION};
pub use store::{domain_slug, file_timestamp, url_slug, ArtifactStore, StoredFile};
pub use workflow::{Metrics, Phase, Suggestion, Workflow, WorkflowStatus};
