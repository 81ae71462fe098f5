//! Request analysis and tier selection.
//!
//! The scorer is a pure function of the request text; the classifier wraps it
//! with the routing cache.

/// Cached classification
pub mod classifier;
/// Complexity scoring and tier selection
pub mod complexity;

pub use classifier::Classifier;
pub use complexity::{ClassificationResult, ComplexityScorer, MAX_SCORE, Tier, canonical_text};
