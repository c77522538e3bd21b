mod dispatch;
mod tracker;
mod unit;

pub use dispatch::{BatchHandle, BatchReport, Dispatcher};
pub use tracker::CompletionTracker;
pub use unit::{BatchStatus, BatchSummary, ComputeFn, UnitResult, UnitStatus, WorkUnit};
