//! Hierarchical listing over the blob store's flat key space.
//!
//! [`NamespaceLister::list_hierarchy`] is a lazy stream of pages. Each poll
//! fetches exactly one page and the next request reuses the continuation
//! token the store returned. Dropping the stream between pages abandons the
//! traversal.

use crate::{
    models::listing::{HierarchyListing, LinkedFile, ListingPage, TreeListing},
    services::{
        blob_store::{BlobStore, BlobStoreError},
        link_issuer::{LinkError, LinkIssuer},
    },
};
use futures::{
    StreamExt, TryStreamExt,
    stream::{self, BoxStream},
};
use std::{collections::HashSet, sync::Arc};
use thiserror::Error;
use tracing::debug;

/// Delimiter that separates hierarchy levels in blob keys.
pub const HIERARCHY_DELIMITER: &str = "/";

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("store listing failed: {0}")]
    Store(#[from] BlobStoreError),
    #[error("store marked a page truncated without a continuation token")]
    MissingContinuation,
    #[error("store returned continuation token `{0}` more than once")]
    StalledCursor(String),
    #[error(transparent)]
    Link(#[from] LinkError),
}

pub type PageStream = BoxStream<'static, Result<ListingPage, ListingError>>;

enum CursorState {
    Start,
    Continue(String),
    Exhausted,
}

struct PageCursor {
    store: Arc<dyn BlobStore>,
    prefix: Option<String>,
    delimiter: Option<&'static str>,
    state: CursorState,
    /// Every token handed out so far in this traversal.
    seen_tokens: HashSet<String>,
}

/// Fetch the page the cursor points at and advance it.
async fn next_page(
    mut cursor: PageCursor,
) -> Result<Option<(ListingPage, PageCursor)>, ListingError> {
    let token = match &cursor.state {
        CursorState::Start => None,
        CursorState::Continue(token) => Some(token.clone()),
        CursorState::Exhausted => return Ok(None),
    };

    let page = cursor
        .store
        .list_page(cursor.prefix.as_deref(), cursor.delimiter, token.as_deref())
        .await?;

    cursor.state = if page.truncated {
        match page.next_token.clone() {
            Some(next) => {
                if !cursor.seen_tokens.insert(next.clone()) {
                    return Err(ListingError::StalledCursor(next));
                }
                CursorState::Continue(next)
            }
            None => return Err(ListingError::MissingContinuation),
        }
    } else {
        CursorState::Exhausted
    };

    debug!(
        "fetched listing page under {:?}: {} files, {} prefixes, more: {}",
        cursor.prefix,
        page.entries.len(),
        page.common_prefixes.len(),
        page.truncated
    );

    let listing = ListingPage {
        files: page.entries,
        prefixes: page.common_prefixes,
        continuation_token: if page.truncated { page.next_token } else { None },
    };
    Ok(Some((listing, cursor)))
}

#[derive(Clone)]
pub struct NamespaceLister {
    store: Arc<dyn BlobStore>,
    links: LinkIssuer,
}

impl NamespaceLister {
    pub fn new(store: Arc<dyn BlobStore>, links: LinkIssuer) -> Self {
        Self { store, links }
    }

    fn pages(&self, prefix: Option<&str>, delimiter: Option<&'static str>) -> PageStream {
        let cursor = PageCursor {
            store: self.store.clone(),
            prefix: prefix.map(str::to_string),
            delimiter,
            state: CursorState::Start,
            seen_tokens: HashSet::new(),
        };
        stream::try_unfold(cursor, next_page).boxed()
    }

    /// Pages of direct files and child prefixes one level below `prefix`.
    pub fn list_hierarchy(&self, prefix: Option<&str>) -> PageStream {
        self.pages(prefix, Some(HIERARCHY_DELIMITER))
    }

    /// Pages of every key under `prefix`, at any depth.
    pub fn list_flat(&self, prefix: Option<&str>) -> PageStream {
        self.pages(prefix, None)
    }

    /// Drain [`list_hierarchy`](Self::list_hierarchy) into a single level.
    pub async fn collect_hierarchy(
        &self,
        prefix: Option<&str>,
    ) -> Result<HierarchyListing, ListingError> {
        let mut listing = HierarchyListing::default();
        let mut pages = self.list_hierarchy(prefix);
        while let Some(page) = pages.try_next().await? {
            listing.files.extend(page.files);
            listing.prefixes.extend(page.prefixes);
        }
        Ok(listing)
    }

    /// Top-level listing plus one flat sub-listing per discovered prefix,
    /// with every file carrying a signed link valid for `link_ttl_secs`.
    ///
    /// Every key of every sub-page is kept.
    pub async fn list_tree(
        &self,
        prefix: Option<&str>,
        link_ttl_secs: i64,
    ) -> Result<TreeListing, ListingError> {
        LinkIssuer::validate_ttl(link_ttl_secs)?;

        let top = self.collect_hierarchy(prefix).await?;
        let mut tree = TreeListing::default();
        for key in top.files {
            tree.files.push(self.linked(key, link_ttl_secs).await?);
        }

        for sub_prefix in &top.prefixes {
            let mut pages = self.list_flat(Some(sub_prefix));
            while let Some(page) = pages.try_next().await? {
                for key in page.files {
                    tree.files.push(self.linked(key, link_ttl_secs).await?);
                }
            }
        }

        tree.prefixes = top.prefixes;
        Ok(tree)
    }

    async fn linked(&self, file_key: String, ttl_secs: i64) -> Result<LinkedFile, ListingError> {
        let public_url = self.links.issue_link(&file_key, ttl_secs).await?;
        Ok(LinkedFile {
            file_key,
            public_url,
        })
    }
}
