//! Archive extraction

pub mod encoding;
pub mod extract;

pub use encoding::EncodingCandidates;
pub use extract::{ExtractReport, Extractor};
