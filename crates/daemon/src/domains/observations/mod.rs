mod fetch_observations;

pub use fetch_observations::*;
