//! Processing pipeline & relationship extractor (C6): the durable
//! document-ingestion state machine, cross-document relationship
//! discovery, and the semantic-search read path.

pub mod process;
pub mod relationships;
pub mod search;

pub use process::{process_document, ProcessOutcome};
pub use relationships::extract_relationships;
pub use search::{search, SearchHit};
