mod rollup_job;

pub use rollup_job::*;
