mod backfill;
mod observations;
mod retention;
mod rollup;

pub use backfill::*;
pub use observations::*;
pub use retention::*;
pub use rollup::*;
