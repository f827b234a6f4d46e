pub mod db;
mod period;
pub mod routes;
mod startup;
pub mod templates;
mod utils;

pub use db::*;
pub use period::Period;
pub use routes::*;
pub use startup::*;
pub use utils::*;
