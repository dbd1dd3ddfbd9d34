pub mod config;
pub mod error;
pub mod git;
pub mod logging;
pub mod repo;
pub mod ui;
pub mod version;

pub use error::{Result, StratusError};
pub use repo::PackageRepo;
pub use version::PackageVersion;
