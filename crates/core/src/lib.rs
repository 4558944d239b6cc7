#![forbid(unsafe_code)]

pub mod model;
pub mod registry;
pub mod time;
pub mod timer;

pub use time::Clock;
