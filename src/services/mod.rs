//! Storage collaborators and the gateway that orchestrates them.

pub mod blob_store;
pub mod gateway;
pub mod integrity;
pub mod link_issuer;
pub mod lister;
pub mod local_blob_store;
pub mod metadata_index;
pub mod signing;
pub mod sqlite_index;
