mod error;
pub mod status_routes;
pub mod weather_routes;

pub use error::*;
pub use status_routes::*;
pub use weather_routes::*;
