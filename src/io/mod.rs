//! Input/Output operations module.
//!
//! Handles reading and writing FASTA records and writing the k-mer
//! fingerprint table.

pub mod fasta;
pub mod table;

pub use fasta::{FastaStream, FastaWriter, SequenceRecord};
pub use table::TableWriter;
