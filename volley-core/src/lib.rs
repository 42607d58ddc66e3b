//! Per-second aggregation of a load generator's result stream.
//!
//! The generator writes one phout line per completed request plus a stat log of
//! active worker counts. [`ResultReader`] merges both into a gap-free series of
//! [`SecondAggregate`]s, [`Session`] drives the generator process around it and
//! fans every second out to listeners and the [`Autostop`] controller.

mod aggregate;
mod autostop;
mod bucket;
mod config;
mod error;
mod gap;
mod instances;
mod publisher;
mod reader;
mod record;
mod schedule;
mod session;
mod supervisor;
mod tail;

pub use aggregate::{OverallStats, SecondAggregate};
pub use autostop::{
    Autostop, Counting, Criterion, InstancesCriterion, InstancesLevel, RC_INSTANCES,
    StopDecision, parse_criterion,
};
pub use bucket::SecondBucketAggregator;
pub use config::{DEFAULT_BUFFERED_SECONDS, GeneratorInfo, Mode, SessionConfig};
pub use error::{Error, Result};
pub use gap::GapFiller;
pub use instances::InstanceCounts;
pub use publisher::{AggregateListener, AggregatePublisher, FnListener, listener_fn};
pub use reader::{MAX_SECONDS_PER_POLL, ResultReader};
pub use record::{LineError, PHOUT_FIELDS, RequestRecord, parse_phout_line};
pub use schedule::{LoadSchedule, ScheduleStep};
pub use session::{RunSummary, Session, SessionStatus};
pub use supervisor::{GeneratorStatus, ProcessSupervisor};
pub use tail::{LineChunker, MAX_CHUNK_BYTES, TailFile};
