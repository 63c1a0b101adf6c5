//! Transient listing structures produced by the namespace lister.

use serde::Serialize;

/// One page of a hierarchical key enumeration.
///
/// `files` holds the direct keys at this level in store order, `prefixes` the
/// distinct child "folders". `continuation_token` is present iff more pages
/// remain.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub files: Vec<String>,
    pub prefixes: Vec<String>,
    pub continuation_token: Option<String>,
}

/// All pages of one level merged together.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct HierarchyListing {
    pub files: Vec<String>,
    pub prefixes: Vec<String>,
}

/// A file key decorated with a time-limited public URL.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct LinkedFile {
    pub file_key: String,
    pub public_url: String,
}

/// Result of a full-tree listing: top-level files plus every file found
/// beneath each top-level prefix, all carrying signed links.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeListing {
    pub files: Vec<LinkedFile>,
    pub prefixes: Vec<String>,
}
