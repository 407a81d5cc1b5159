//! arXiv collaborators: paper discovery over the Atom query API and PDF retrieval.

pub mod atom;
pub mod retrieve;
pub mod source;

pub use atom::parse_feed;
pub use retrieve::PdfRetriever;
pub use source::{search_expression, ArxivSource, DEFAULT_BASE_URL};
