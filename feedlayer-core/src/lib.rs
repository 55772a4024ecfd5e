//! A thin data-access layer over partitioned cloud document databases.
//!
//! This crate is the core of the feedlayer project and provides:
//!
//! - **Client and connection lifecycle** ([`client`]) - Lazy connect, container resolution, disposal
//! - **Typed query handles** ([`container`]) - Point reads, paged queries, writes and deletes under one partition key
//! - **Backend abstraction** ([`backend`]) - Traits for implementing transports to a document service
//! - **Query and filtering API** ([`query`]) - Raw query text with parameters, structured filters rendered to SQL
//! - **Item traits** ([`item`]) - Core traits for items and partition keys
//! - **Responses and paging** ([`page`]) - Status outcomes, result pages, continuation tokens, request options
//! - **Connection configuration** ([`config`]) - Endpoint, access key and database settings
//! - **Error handling** ([`error`]) - Comprehensive error types and result types
//!
//! # Example
//!
//! ```ignore
//! use feedlayer::{Item, Client};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Product {
//!     pub id: String,
//!     pub category: String,
//!     pub name: String,
//! }
//!
//! impl Item for Product {
//!     fn id(&self) -> &str {
//!         &self.id
//!     }
//!
//!     fn partition_key(&self) -> Option<&str> {
//!         Some(&self.category)
//!     }
//! }
//!
//! let mut books = client.open::<Product>("products", "books").await?;
//! let all = books.get_all("SELECT * FROM c").await?;
//! println!("{} items for {} RU", all.len(), books.request_charge());
//! ```

#[allow(unused_extern_crates)]
extern crate self as feedlayer_core;

pub mod backend;
pub mod client;
pub mod config;
pub mod container;
pub mod error;
pub mod item;
pub mod page;
pub mod query;
