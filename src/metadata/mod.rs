//! Metadata resolution: registry client, abstract enrichment, BibTeX helpers,
//! and the title resolver that ties them to the cache.

pub mod abstracts;
pub mod bibtex;
pub mod crossref;
mod error;
mod resolver;

pub use abstracts::{AbstractChain, AbstractProvider, CrossrefAbstractProvider, SemanticScholarProvider};
pub use bibtex::BibEntry;
pub use crossref::{CrossrefClient, CrossrefWork};
pub use error::MetadataError;
pub use resolver::{MetadataResolver, Resolution, SEARCH_ROWS};
