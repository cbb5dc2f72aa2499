//! Step execution engine module
//!
//! This module contains:
//! - `orchestrator` - The run state machine driving build, pairing and tests
//! - `error` - Step error types
//! - `result` - Verdict and run report types
//! - `outputs` - Build output types and the output locator
//! - `pairing` - Test project to application package pairing
//! - `result_log` - NUnit result log reading and failure extraction

pub mod error;
pub mod orchestrator;
pub mod outputs;
pub mod pairing;
pub mod result;
pub mod result_log;

pub use error::StepError;
pub use orchestrator::{
    LoggingObserver, Orchestrator, RunState, APK_PATH_ENV, FULL_RESULTS_KEY, TEST_RESULT_KEY,
};
pub use outputs::{
    locate_output, Artifact, OutputKind, ProjectOutput, ProjectOutputMap, TestProjectOutput,
    TestProjectOutputMap,
};
pub use pairing::{
    lookup_reference, resolve_pairings, PairingError, PairingPlan, ReferenceLookup, TestPairing,
};
pub use result::{PairingResult, RunReport, Verdict};
pub use result_log::{
    clear_result_log, last_failure_message, read_result_log, strip_message_tags, ResultLogError,
};
