//! Text extraction from retrieved PDFs and Markdown report output.

pub mod extract;
pub mod index;
pub mod markdown;

pub use extract::{clean_text, select_pages, PdfExtractor};
pub use index::{write_index, IndexEntry, SearchSummary, INDEX_FILE};
pub use markdown::{report_file_name, sanitize_filename, MarkdownReporter};
