pub mod canonicalizer;
pub mod registry;

pub use canonicalizer::{ParishCanonicalizer, ParishResolution};
pub use registry::{LookupStage, ParishMatch, ParishRegistry};
