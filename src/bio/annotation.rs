//! Keyword-based classification of record descriptions.
//!
//! Matching is literal, case-sensitive substring containment with no word
//! boundaries: "18S rRNA" also matches inside "118S rRNA-like". Downstream
//! datasets depend on exactly this recall, so it is not normalized.

use log::debug;
use serde::{Deserialize, Serialize};

/// Strategy used to test a description against a set of phrases.
///
/// Callers only see [`KeywordSet::matches_with`]; swapping the linear scan for a
/// multi-pattern automaton only requires another implementation of this trait.
pub trait DescriptionMatcher: Send + Sync {
    fn is_match(&self, keywords: &[String], description: &str) -> bool;
}

/// Checks each keyword in declaration order, stopping at the first hit.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearScan;

impl DescriptionMatcher for LinearScan {
    fn is_match(&self, keywords: &[String], description: &str) -> bool {
        keywords.iter().any(|keyword| description.contains(keyword.as_str()))
    }
}

/// An ordered set of phrases defining one semantic category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordSet {
    pub name: String,
    pub keywords: Vec<String>,
}

impl KeywordSet {
    pub fn new<S: Into<String>>(name: impl Into<String>, keywords: impl IntoIterator<Item = S>) -> Self {
        KeywordSet {
            name: name.into(),
            keywords: keywords.into_iter().map(Into::into).collect(),
        }
    }

    /// True iff at least one keyword occurs in `description`.
    pub fn matches_with<M: DescriptionMatcher + ?Sized>(&self, matcher: &M, description: &str) -> bool {
        matcher.is_match(&self.keywords, description)
    }
}

/// Result of evaluating every set of an [`AnnotationFilter`] on one description.
///
/// Entries are independent predicates in the filter's set order; no set takes
/// precedence over another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership(Vec<bool>);

impl Membership {
    pub fn get(&self, set_index: usize) -> bool {
        self.0.get(set_index).copied().unwrap_or(false)
    }
}

/// Evaluates several independent keyword sets against a description.
pub struct AnnotationFilter {
    sets: Vec<KeywordSet>,
    matcher: Box<dyn DescriptionMatcher>,
}

impl AnnotationFilter {
    pub fn with_matcher(sets: Vec<KeywordSet>, matcher: Box<dyn DescriptionMatcher>) -> Self {
        for set in &sets {
            debug!("Keyword set '{}': {:?}", set.name, set.keywords);
        }
        AnnotationFilter { sets, matcher }
    }

    /// Tests a single set by index; an out-of-range index never matches.
    pub fn matches(&self, set_index: usize, description: &str) -> bool {
        self.sets
            .get(set_index)
            .map_or(false, |set| set.matches_with(self.matcher.as_ref(), description))
    }

    /// Scans the description once per set.
    pub fn evaluate(&self, description: &str) -> Membership {
        Membership(
            self.sets
                .iter()
                .map(|set| set.matches_with(self.matcher.as_ref(), description))
                .collect(),
        )
    }
}
