//! Upstream collaborators: fetching the raw nt archives and merging them
//! into the single FASTA file the pipeline reads.

pub mod downloader;
pub mod merge;

pub use downloader::{retrieve_archives, HttpArchiveSource};
pub use merge::{cleanup_parts, extract_archives, merge_database, DEFAULT_MERGE_TOOL};
