//! Domain model.
//!
//! - **ids**: InstanceId / LeaseToken（ULID + phantom type）
//! - **task**: TaskIdentity, Scalar, Parameters
//! - **descriptor**: TaskDescriptor, Schedule
//! - **state / record**: RunStatus と永続化される TaskRun
//! - **outcome**: Outcome, TaskError
//! - **backoff / decision**: BackoffPolicy, Decider, Settlement
//! - **report**: Reporter に渡す ExecutionReport

pub mod backoff;
pub mod decision;
pub mod descriptor;
pub mod ids;
pub mod outcome;
pub mod record;
pub mod report;
pub mod state;
pub mod task;

pub use backoff::BackoffPolicy;
pub use decision::{Decider, Decision, DefaultDecider, Settlement};
pub use descriptor::{DescriptorError, Schedule, TaskDescriptor};
pub use ids::{Id, IdMarker, InstanceId, Lease, LeaseToken, Run};
pub use outcome::{Outcome, TaskError};
pub use record::TaskRun;
pub use report::{Disposition, ExecutionReport, ReportedOutcome};
pub use state::{ParseStatusError, RunStatus};
pub use task::{Parameters, Scalar, TaskIdentity};
