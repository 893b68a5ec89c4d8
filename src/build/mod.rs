//! Build orchestration: contexts, per-asset results, and the pipeline
//! manager that drives scan, cache check, import, process, and compile.

pub mod context;
pub mod manager;
pub mod result;

pub use context::*;
pub use manager::*;
pub use result::*;
