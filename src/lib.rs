#![forbid(unsafe_code)]

pub mod client;
pub mod errors;
pub mod imports;
pub mod loader;
pub mod model;

pub use loader::{Loader, TimeWindow};
