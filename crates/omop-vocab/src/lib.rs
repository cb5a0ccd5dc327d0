#![deny(unsafe_code)]

//! Vocabulary staging: Athena reference loading, fuzzy source-value
//! matching, and the custom vocabulary build.

pub mod builder;
pub mod collect;
pub mod loader;
pub mod matcher;
pub mod store;

pub use crate::builder::{CustomVocabularyBuild, CustomVocabularyBuilder};
pub use crate::collect::{MatchRequest, SourceTerm, collect_mappings};
pub use crate::loader::load_reference_vocabulary;
pub use crate::matcher::FuzzyConceptMatcher;
pub use crate::store::{Resolution, VocabularyStore};
