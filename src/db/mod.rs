pub mod core;
pub mod firm;
pub mod patent;
pub mod schema;
pub mod stage;

pub use core::Database;
