pub mod branchwatch;
pub mod codetrace;
pub mod config;
pub mod system;

#[cfg(test)]
mod testing;

pub use branchwatch::{BranchSink, BranchWatch, Phase};
pub use codetrace::{
    tracer::{AutoStop, Tracer},
    CodeTrace, Direction, HitFilter, HitType,
};
pub use config::TraceConfig;
pub use system::{CoreState, CpuThreadGuard, System};
