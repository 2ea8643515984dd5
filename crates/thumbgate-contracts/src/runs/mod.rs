pub mod attempt;
pub mod report;
pub mod result;

pub use attempt::{Attempt, AttemptOutcome};
pub use report::{write_report, RunReport};
pub use result::{ErrorKind, PipelineResult};
