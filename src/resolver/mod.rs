pub mod matching;
pub mod normalizer;
pub mod registry;

pub use matching::{FirmResolver, JaroWinkler, Similarity, TokenSortJaroWinkler};
pub use normalizer::FirmNormalizer;
pub use registry::FirmIndex;
