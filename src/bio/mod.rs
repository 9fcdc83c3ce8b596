//! Bioinformatics utilities module.
//!
//! Groups the record-level logic of the pipeline: annotation keyword
//! matching and k-mer vocabulary/counting.

pub mod annotation;
pub mod kmers;

pub use annotation::{AnnotationFilter, KeywordSet, LinearScan};
pub use kmers::{KmerCounter, KmerVocabulary};

/// Nucleotide alphabet in the declaration order used by the default vocabulary.
///
/// The order is part of the output format: it drives the column order of
/// every fingerprint table.
pub const DEFAULT_ALPHABET: &str = "ATCG";

/// Default k-mer length.
pub const DEFAULT_K: usize = 4;

/// Phrases identifying 18S small-subunit rRNA records.
pub const MARKER_GENE_KEYWORDS: &[&str] = &[
    "18S ribosomal RNA",
    "18S rRNA",
    "SSU rRNA",
    "small subunit ribosomal RNA",
];

/// Phrases identifying eukaryotic lineages in NCBI descriptions.
pub const EUKARYOTIC_KEYWORDS: &[&str] = &[
    "Eukaryota",
    "Metazoa",
    "Chordata",
    "Fungi",
    "Viridiplantae",
];
