//! CLI command implementations

pub mod plan;
pub mod pool;
pub mod provision;

pub use plan::plan;
pub use pool::pool;
pub use provision::provision;
