mod prune_raw;

pub use prune_raw::*;
