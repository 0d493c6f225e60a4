pub mod coordinator;
pub mod handlers;
pub mod state;

pub use coordinator::{Coordinator, CoordinatorConfig, RunSummary};
pub use handlers::{build_router, http_transport, AppState, HttpTransport};
