pub mod cpu;
mod error;
mod process;
mod registry;
pub mod retry;
pub mod runner;
mod state;
mod supervisor;

pub use error::{Error, Result};
pub use registry::{serve_ingress, Registry, SupervisorHandle};
pub use retry::Backoff;
pub use state::StateCell;
pub use supervisor::{SupervisorOptions, ADMISSION_CPU_THRESHOLD};
