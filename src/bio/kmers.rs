//! K-mer vocabulary generation and per-sequence counting.
//!
//! The vocabulary is the full Cartesian power `alphabet^k` in product order
//! (leftmost symbol varies slowest). Its order fixes the column order of the
//! fingerprint table, so it must never depend on hashing or sorting.
//!
//! Counting uses a rolling base-|alphabet| index over the sequence. Because
//! the vocabulary is enumerated in product order, the rolling index of a window
//! *is* its vocabulary position, so windows never need a string lookup.

use crate::error::{PipelineError, Result};
use indexmap::IndexSet;
use itertools::Itertools;

/// Largest vocabulary accepted (4^12 columns).
pub const MAX_VOCABULARY_SIZE: usize = 1 << 24;

const NO_RANK: u8 = u8::MAX;

/// The ordered set of every k-mer over a declared alphabet.
#[derive(Debug, Clone)]
pub struct KmerVocabulary {
    symbols: IndexSet<u8>,
    k: usize,
    kmers: Vec<String>,
    /// Symbol -> position in `symbols`, for both letter cases.
    ranks: [u8; 256],
}

impl KmerVocabulary {
    /// Enumerates `alphabet^k`.
    ///
    /// # Arguments
    ///
    /// * `alphabet` - Symbols in declaration order. Normalized to uppercase.
    /// * `k` - K-mer length, at least 1.
    ///
    /// # Returns
    ///
    /// * `Result<Self>` - `InvalidParameter` for an empty, duplicated or
    ///   non-ASCII alphabet, `k == 0`, or a vocabulary above
    ///   [`MAX_VOCABULARY_SIZE`].
    pub fn generate(alphabet: &str, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(PipelineError::InvalidParameter(
                "k-mer length must be at least 1".to_string(),
            ));
        }
        if alphabet.is_empty() {
            return Err(PipelineError::InvalidParameter(
                "alphabet must not be empty".to_string(),
            ));
        }
        if !alphabet.chars().all(|c| c.is_ascii_graphic()) {
            return Err(PipelineError::InvalidParameter(format!(
                "alphabet {:?} must consist of printable ASCII symbols",
                alphabet
            )));
        }

        let mut symbols = IndexSet::with_capacity(alphabet.len());
        for symbol in alphabet.bytes().map(|b| b.to_ascii_uppercase()) {
            if !symbols.insert(symbol) {
                return Err(PipelineError::InvalidParameter(format!(
                    "alphabet {:?} declares symbol '{}' more than once",
                    alphabet, symbol as char
                )));
            }
        }
        let mut ranks = [NO_RANK; 256];
        for (rank, &symbol) in symbols.iter().enumerate() {
            ranks[symbol as usize] = rank as u8;
            ranks[symbol.to_ascii_lowercase() as usize] = rank as u8;
        }

        let size = u32::try_from(k)
            .ok()
            .and_then(|exp| symbols.len().checked_pow(exp))
            .filter(|&size| size <= MAX_VOCABULARY_SIZE)
            .ok_or_else(|| {
                PipelineError::InvalidParameter(format!(
                    "vocabulary of {} symbols with k={} exceeds {} entries",
                    symbols.len(),
                    k,
                    MAX_VOCABULARY_SIZE
                ))
            })?;

        let mut kmers = Vec::with_capacity(size);
        for product in std::iter::repeat(symbols.iter().copied())
            .take(k)
            .multi_cartesian_product()
        {
            kmers.push(product.into_iter().map(char::from).collect::<String>());
        }
        debug_assert_eq!(kmers.len(), size);

        Ok(KmerVocabulary {
            symbols,
            k,
            kmers,
            ranks,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.kmers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kmers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.kmers.iter().map(String::as_str)
    }

    #[inline]
    fn rank(&self, symbol: u8) -> Option<usize> {
        match self.ranks[symbol as usize] {
            NO_RANK => None,
            rank => Some(rank as usize),
        }
    }
}

/// Counts vocabulary k-mers in individual sequences.
#[derive(Debug, Clone, Copy)]
pub struct KmerCounter<'v> {
    vocabulary: &'v KmerVocabulary,
}

impl<'v> KmerCounter<'v> {
    /// `k` must equal the length the vocabulary was generated with.
    pub fn new(vocabulary: &'v KmerVocabulary, k: usize) -> Result<Self> {
        if vocabulary.is_empty() {
            return Err(PipelineError::InvalidParameter(
                "vocabulary is empty".to_string(),
            ));
        }
        if k == 0 || k != vocabulary.k() {
            return Err(PipelineError::InvalidParameter(format!(
                "k={} does not match vocabulary k={}",
                k,
                vocabulary.k()
            )));
        }
        Ok(KmerCounter { vocabulary })
    }

    /// Count vector for `residues`, indexed by vocabulary position.
    ///
    /// Windows containing a symbol outside the alphabet are skipped. A
    /// sequence shorter than k yields all zeros.
    pub fn count(&self, residues: &[u8]) -> Vec<u64> {
        let vocab = self.vocabulary;
        let mut counts = vec![0u64; vocab.len()];
        if residues.len() < vocab.k {
            return counts;
        }

        let base = vocab.symbols.len();
        let modulus = vocab.len();
        let mut index = 0usize;
        // Length of the in-alphabet run ending at the current symbol.
        let mut run = 0usize;

        for &symbol in residues {
            match vocab.rank(symbol) {
                Some(rank) => {
                    index = (index * base + rank) % modulus;
                    run += 1;
                    if run >= vocab.k {
                        counts[index] += 1;
                    }
                }
                None => {
                    index = 0;
                    run = 0;
                }
            }
        }

        counts
    }
}
