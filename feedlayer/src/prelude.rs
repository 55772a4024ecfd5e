//! Convenient re-exports of commonly used types from feedlayer.
//!
//! ```ignore
//! use feedlayer::prelude::*;
//! ```

pub use feedlayer_core::{
    backend::{BackendConnector, ContainerLink, ContainerProperties, FeedBackend},
    client::Client,
    config::ConnectionConfig,
    container::{Container, FeedIterator, Query},
    error::{FeedError, FeedResult},
    item::{Item, ItemExt, PartitionKey},
    page::{FeedOptions, FeedPage, ItemResponse, OperationKind, Outcome},
    query::{Expr, FieldOp, Filter, Select, SelectBuilder, Sort, SortDirection, SqlQuery},
};
pub use feedlayer_macros::Item;
