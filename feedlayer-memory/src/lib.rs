//! In-memory document service backend for feedlayer.
//!
//! This crate provides a thread-safe, in-process implementation of the `FeedBackend` trait.
//! It emulates a partitioned document service closely enough to develop and test against
//! without a network: containers with partition-key paths, per-operation request charges,
//! paged queries with continuation tokens and the service's status codes.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Partitioned containers** - Items keyed by partition key and ID, optional unique keys
//! - **SQL queries** - A subset of the service's SQL dialect (see [`sql`])
//! - **Service behaviour** - Status codes, request charges, `_ts`/`_etag` system properties
//! - **Connection checks** - Endpoint and access key are verified on connect
//!
//! # Quick Start
//!
//! ```ignore
//! use feedlayer::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = InMemoryStore::builder()
//!         .database("shop")
//!         .container("products", "/category")
//!         .build();
//!
//!     let client = Client::new(store.connector(), store.connection_config()?);
//!     let mut books = client.open::<Product>("products", "books").await?;
//!
//!     books.save(&product).await?;
//!     client.dispose().await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as feedlayer_memory;

mod evaluator;
pub mod sql;
pub mod store;

pub use store::{
    ChargeModel, ContainerDefinition, DEFAULT_ACCESS_KEY, DEFAULT_ENDPOINT, DEFAULT_PAGE_SIZE,
    InMemoryConnector, InMemoryStore, InMemoryStoreBuilder,
};
