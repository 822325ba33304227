pub mod category;
pub mod core;
pub mod keywords;

pub use category::Categorizer;
pub use core::Classifier;
