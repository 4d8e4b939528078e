#![forbid(unsafe_code)]

mod clock;
mod config;
mod error;
mod machine;
mod manager;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LeaseConfig;
pub use error::LeaseError;
pub use manager::{Accepted, LeaseManager};

pub use enroll_core::{LeaseRecord, LeaseStatus, Registrant};
