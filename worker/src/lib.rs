pub mod client;
pub mod worker;

pub use client::HttpWorkerTransport;
pub use worker::{run_worker, WorkerState, WorkerSummary};
