//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for the broker and health endpoints
//! - **[`models`]**: Request/response data structures, including the total
//!   action parser

pub mod handlers;
pub mod models;
