pub mod checkpoint;
pub mod config;
pub mod error;
pub mod job;
pub mod protocol;
pub mod results;
pub mod roundrobin;
pub mod runner;
pub mod transport;

pub use checkpoint::CheckpointStore;
pub use error::{FarmError, Result, TransportError};
pub use job::{CommandLine, JobDescriptor, JobId, Manifest};
pub use protocol::{Envelope, EnvelopeResponse, FarmStatus, Message, Rank, COORDINATOR_RANK};
pub use results::ExecutionResult;
pub use transport::{CoordinatorTransport, WorkerTransport};
