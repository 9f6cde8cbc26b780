//! EPG (Electronic Program Guide) module
//!
//! Contains the XMLTV tree, parser, transformer and writer.

pub mod node;
pub mod parser;
pub mod transform;
pub mod writer;

// Re-export public types
pub use parser::{parse_document, ParseRoute};
pub use transform::{GuideAccumulator, MergeStats};
pub use writer::{write_guide, GeneratorInfo};
