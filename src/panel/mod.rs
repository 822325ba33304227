pub mod aggregate;
pub mod builder;

pub use aggregate::{accumulate, merge_partials, FirmYearAggregate, PartialPanel};
pub use builder::PanelBuilder;
