//! Backend abstraction for the document service.
//!
//! This module defines the traits that separate the [`Client`]/[`Query`] bookkeeping from the
//! transport that actually talks to a service (the in-memory emulator, the REST gateway, or a
//! test double).
//!
//! # Traits
//!
//! - [`FeedBackend`]: one connection to the service; point operations and query pages
//! - [`BackendConnector`]: factory that opens a [`FeedBackend`] from a [`ConnectionConfig`]
//!
//! # Status handling
//!
//! Point operations (`read_item`, `upsert_item`, `create_item`, `delete_item`) return the
//! service's answer as an [`ItemResponse`] whatever its status; the caller decides what a
//! 404 or 409 means for the operation at hand. They fail with an error only when no answer
//! was obtained (transport failure, rejected credentials, unserializable payload).
//!
//! Container reads and query pages fail with an error for any non-success status:
//! [`FeedError::ContainerNotFound`](crate::error::FeedError::ContainerNotFound) for 404 and
//! [`FeedError::Remote`](crate::error::FeedError::Remote) otherwise.
//!
//! [`Client`]: crate::client::Client
//! [`Query`]: crate::container::Query

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, fmt::Debug, sync::Arc};

use crate::{
    config::ConnectionConfig,
    error::FeedResult,
    item::PartitionKey,
    page::{FeedOptions, FeedPage, ItemResponse},
    query::SqlQuery,
};

/// Address of a container inside a database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerLink {
    database: String,
    container: String,
}

impl ContainerLink {
    /// Creates a link to `container` in `database`.
    pub fn new(database: impl Into<String>, container: impl Into<String>) -> Self {
        Self { database: database.into(), container: container.into() }
    }

    /// Returns the database name.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns the container name.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Resource link of an item in this container.
    pub fn item_link(&self, id: &str) -> String {
        format!("{self}/docs/{id}")
    }
}

impl fmt::Display for ContainerLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dbs/{}/colls/{}", self.database, self.container)
    }
}

/// Partition key definition of a container.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PartitionKeyDefinition {
    /// Paths (such as `/category`) the partition key is read from.
    #[serde(default)]
    pub paths: Vec<String>,
}

/// Container metadata returned when a container is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerProperties {
    /// Container name.
    pub id: String,
    /// Partition key definition.
    #[serde(default)]
    pub partition_key: PartitionKeyDefinition,
}

impl ContainerProperties {
    /// Creates properties for a container partitioned on `partition_key_path`.
    pub fn new(id: impl Into<String>, partition_key_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            partition_key: PartitionKeyDefinition { paths: vec![partition_key_path.into()] },
        }
    }

    /// Returns the first partition key path, if the container is partitioned.
    pub fn partition_key_path(&self) -> Option<&str> {
        self.partition_key.paths.first().map(String::as_str)
    }
}

/// One open connection to a document service.
///
/// Implementations must be thread-safe; a single backend is shared by every [`Query`]
/// opened from the same [`Client`].
///
/// [`Client`]: crate::client::Client
/// [`Query`]: crate::container::Query
#[async_trait]
pub trait FeedBackend: Send + Sync + Debug {
    /// Resolves a container and returns its properties.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::ContainerNotFound`](crate::error::FeedError::ContainerNotFound)
    /// if the container or its database does not exist.
    async fn read_container(&self, link: &ContainerLink) -> FeedResult<ContainerProperties>;

    /// Reads one item by ID within a partition.
    async fn read_item(
        &self,
        link: &ContainerLink,
        id: &str,
        partition_key: Option<&PartitionKey>,
    ) -> FeedResult<ItemResponse>;

    /// Inserts or replaces an item.
    ///
    /// With `partition_key` set to `None` the key is taken from the item itself.
    async fn upsert_item(
        &self,
        link: &ContainerLink,
        partition_key: Option<&PartitionKey>,
        item: Value,
    ) -> FeedResult<ItemResponse>;

    /// Inserts an item, answering 409 if one with the same ID exists in the partition.
    async fn create_item(
        &self,
        link: &ContainerLink,
        partition_key: Option<&PartitionKey>,
        item: Value,
    ) -> FeedResult<ItemResponse>;

    /// Deletes one item by ID within a partition.
    async fn delete_item(
        &self,
        link: &ContainerLink,
        id: &str,
        partition_key: Option<&PartitionKey>,
    ) -> FeedResult<ItemResponse>;

    /// Fetches one page of query results.
    ///
    /// The page continues from `options.continuation` and holds at most
    /// `options.max_item_count` items (service default for `-1`).
    async fn query_items(
        &self,
        link: &ContainerLink,
        query: &SqlQuery,
        options: &FeedOptions,
    ) -> FeedResult<FeedPage<Value>>;

    /// Releases the connection. Called at most once per backend by the owning client.
    async fn shutdown(&self) -> FeedResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<B> FeedBackend for Arc<B>
where
    B: FeedBackend,
{
    async fn read_container(&self, link: &ContainerLink) -> FeedResult<ContainerProperties> {
        (**self).read_container(link).await
    }

    async fn read_item(
        &self,
        link: &ContainerLink,
        id: &str,
        partition_key: Option<&PartitionKey>,
    ) -> FeedResult<ItemResponse> {
        (**self)
            .read_item(link, id, partition_key)
            .await
    }

    async fn upsert_item(
        &self,
        link: &ContainerLink,
        partition_key: Option<&PartitionKey>,
        item: Value,
    ) -> FeedResult<ItemResponse> {
        (**self)
            .upsert_item(link, partition_key, item)
            .await
    }

    async fn create_item(
        &self,
        link: &ContainerLink,
        partition_key: Option<&PartitionKey>,
        item: Value,
    ) -> FeedResult<ItemResponse> {
        (**self)
            .create_item(link, partition_key, item)
            .await
    }

    async fn delete_item(
        &self,
        link: &ContainerLink,
        id: &str,
        partition_key: Option<&PartitionKey>,
    ) -> FeedResult<ItemResponse> {
        (**self)
            .delete_item(link, id, partition_key)
            .await
    }

    async fn query_items(
        &self,
        link: &ContainerLink,
        query: &SqlQuery,
        options: &FeedOptions,
    ) -> FeedResult<FeedPage<Value>> {
        (**self)
            .query_items(link, query, options)
            .await
    }

    async fn shutdown(&self) -> FeedResult<()> {
        (**self).shutdown().await
    }
}

/// Opens backends from connection configuration.
///
/// A [`Client`](crate::client::Client) calls [`BackendConnector::connect`] lazily, on its
/// first `open`.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    type Backend: FeedBackend + 'static;

    /// Opens a connection.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Connection`](crate::error::FeedError::Connection) if the endpoint
    /// is unreachable or rejects the access key.
    async fn connect(&self, config: &ConnectionConfig) -> FeedResult<Self::Backend>;
}
