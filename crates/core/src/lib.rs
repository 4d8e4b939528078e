#![forbid(unsafe_code)]

mod lease;
mod path;
mod registrant;
pub mod time;

pub use lease::*;
pub use path::*;
pub use registrant::*;
