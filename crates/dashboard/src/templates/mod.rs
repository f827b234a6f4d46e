pub mod layouts;
pub mod pages;

pub use layouts::PageConfig;
pub use pages::{status::StatusData, status_page};
