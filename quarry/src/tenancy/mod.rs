mod migrate;
mod orphan;
mod reaper;

pub use migrate::Migrator;
pub use orphan::OrphanSweeper;
pub use reaper::{ReapSummary, Reaper};
