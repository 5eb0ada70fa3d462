//! Backblaze B2 upstream client: wire types and the outbound API calls.

pub mod client;
pub mod models;

pub use client::{B2Api, B2Client, LIST_PAGE_SIZE};
