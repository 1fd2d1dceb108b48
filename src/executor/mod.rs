//! Job execution
//!
//! - GPU workers, one per device, with exclusive generation
//! - The worker pool that balances jobs across devices and retries failures
//! - Job state tracking

mod dispatcher;
mod state;
mod worker;

pub use dispatcher::*;
pub use state::*;
pub use worker::*;
