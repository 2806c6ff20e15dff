//! Intent detection: free text in, typed and scored actions out.

pub mod classifier;
pub mod extractor;
pub mod patterns;
pub mod tokenizer;
pub mod types;

pub use classifier::ActionDetector;
pub use extractor::{extract, ExtractedContext};
pub use patterns::{ActionPattern, PatternRegistry};
pub use types::*;
