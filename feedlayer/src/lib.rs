//! A thin data-access layer over partitioned cloud document databases.
//!
//! This crate is the primary entry point for users of feedlayer. It re-exports the core
//! types from the sub-crates and gives access to the available backends.
//!
//! # Features
//!
//! - **Typed items** - Define items with Serde and `#[derive(Item)]`
//! - **Partition-scoped handles** - Point reads, upserts, deletes and paged queries under one partition key
//! - **Request charges and continuations** - Every call reports its cost; bounded drains can be resumed
//! - **Structured filters** - Composable filters rendered to parameterized SQL
//! - **Multiple backends** - An in-memory service for tests and a REST backend (requires `rest` feature)
//!
//! # Quick Start
//!
//! ```ignore
//! use feedlayer::{prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Item)]
//! pub struct Product {
//!     pub id: String,
//!     #[item(partition_key)]
//!     pub category: String,
//!     pub price: f64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> FeedResult<()> {
//!     let store = InMemoryStore::builder()
//!         .database("catalog")
//!         .container("products", "/category")
//!         .build();
//!     let client = Client::new(store.connector(), store.connection_config()?);
//!
//!     let mut books = client.open::<Product>("products", "books").await?;
//!     books.save(&Product { id: "p1".into(), category: "books".into(), price: 12.5 }).await?;
//!
//!     let cheap = books.get_all_where(Filter::lt("price", 20)).await?;
//!     println!("{} cheap books for {} RU", cheap.len(), books.request_charge());
//!
//!     client.dispose().await
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-process document service for development and testing
//! - `rest` - HTTP backend for the real service (requires `rest` feature)

pub mod prelude;

pub use feedlayer_core::{backend, client, config, container, error, item, page, query};

pub use feedlayer_core::client::Client;
pub use feedlayer_core::container::{Container, FeedIterator, Query};
pub use feedlayer_core::error::{FeedError, FeedResult};
pub use feedlayer_core::item::Item;
pub use feedlayer_macros::Item;

/// In-memory document service.
pub mod memory {
    pub use feedlayer_memory::{
        ChargeModel, ContainerDefinition, DEFAULT_ACCESS_KEY, DEFAULT_ENDPOINT, DEFAULT_PAGE_SIZE,
        InMemoryConnector, InMemoryStore, InMemoryStoreBuilder,
    };
}

/// REST backend for the hosted document service.
///
/// This module is only available when the `rest` feature is enabled.
#[cfg(feature = "rest")]
pub mod rest {
    pub use feedlayer_rest::{API_VERSION, MasterKey, ResourceType, RestBackend, RestConnector};
}
