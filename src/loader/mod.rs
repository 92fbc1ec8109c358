/// Background decode scheduling
///
/// This module handles:
/// - Describing pending decodes (`LoadJob`)
/// - Admitting them to a bounded pool of workers in submission order
/// - Collapsing duplicate requests for the same file into one decode
/// - Handing results back to the interactive thread (`Completion`)

pub mod job;
pub mod coordinator;

pub use coordinator::LoadCoordinator;
pub use job::{Completion, LoadJob, SubmitOutcome};
