pub mod dashboard;
pub mod error;
pub mod store;
pub mod student;
pub mod sync;
pub mod types;
pub mod workflow;

pub use error::{Result, TrajectError};
