//! Container handles: untyped access, result iteration, and the typed [`Query`].
//!
//! - [`Container`] - a cheap, cloneable reference to a resolved container on a shared
//!   connection; JSON in, JSON out
//! - [`FeedIterator`] - walks the pages of one query, following continuation tokens
//! - [`Query`] - typed operations under one partition key, with request-charge and
//!   continuation bookkeeping

use serde_json::Value;
use std::{fmt, marker::PhantomData, sync::Arc};
use tracing::{debug, warn};

use crate::{
    backend::{ContainerLink, ContainerProperties, FeedBackend},
    client::Connection,
    error::{FeedError, FeedResult},
    item::{Item, ItemExt, PartitionKey},
    page::{FeedOptions, FeedPage, ItemResponse, Outcome},
    query::{Select, SqlQuery},
};

/// A resolved container on a shared connection.
///
/// Cloning is cheap; every clone shares the connection and fails with
/// [`FeedError::Disposed`] once the owning client releases it.
pub struct Container<B: FeedBackend> {
    connection: Arc<Connection<B>>,
    link: ContainerLink,
    properties: Arc<ContainerProperties>,
}

impl<B: FeedBackend> Container<B> {
    pub(crate) fn new(
        connection: Arc<Connection<B>>,
        link: ContainerLink,
        properties: ContainerProperties,
    ) -> Self {
        Self { connection, link, properties: Arc::new(properties) }
    }

    /// Returns the name of this container.
    pub fn name(&self) -> &str {
        self.link.container()
    }

    /// Returns the link of this container.
    pub fn link(&self) -> &ContainerLink {
        &self.link
    }

    /// Returns the properties the container was resolved with.
    pub fn properties(&self) -> &ContainerProperties {
        &self.properties
    }

    /// Returns `true` once the owning client has released the connection.
    pub fn is_released(&self) -> bool {
        self.connection.is_released()
    }

    /// Reads one item as JSON.
    pub async fn read_item(
        &self,
        id: &str,
        partition_key: Option<&PartitionKey>,
    ) -> FeedResult<ItemResponse> {
        self.connection
            .backend()?
            .read_item(&self.link, id, partition_key)
            .await
    }

    /// Upserts one JSON item.
    pub async fn upsert_item(
        &self,
        partition_key: Option<&PartitionKey>,
        item: Value,
    ) -> FeedResult<ItemResponse> {
        self.connection
            .backend()?
            .upsert_item(&self.link, partition_key, item)
            .await
    }

    /// Creates one JSON item.
    pub async fn create_item(
        &self,
        partition_key: Option<&PartitionKey>,
        item: Value,
    ) -> FeedResult<ItemResponse> {
        self.connection
            .backend()?
            .create_item(&self.link, partition_key, item)
            .await
    }

    /// Deletes one item.
    pub async fn delete_item(
        &self,
        id: &str,
        partition_key: Option<&PartitionKey>,
    ) -> FeedResult<ItemResponse> {
        self.connection
            .backend()?
            .delete_item(&self.link, id, partition_key)
            .await
    }

    /// Fetches a single page of query results.
    pub async fn query_page(
        &self,
        query: &SqlQuery,
        options: &FeedOptions,
    ) -> FeedResult<FeedPage<Value>> {
        self.connection
            .backend()?
            .query_items(&self.link, query, options)
            .await
    }

    /// Starts iterating the pages of a query.
    pub fn iter_query(&self, query: SqlQuery, options: FeedOptions) -> FeedIterator<B> {
        FeedIterator::new(self.clone(), query, options)
    }

    pub(crate) fn not_found(&self) -> FeedError {
        FeedError::ContainerNotFound(self.link.container().to_string(), self.link.database().to_string())
    }
}

impl<B: FeedBackend> Clone for Container<B> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            link: self.link.clone(),
            properties: self.properties.clone(),
        }
    }
}

impl<B: FeedBackend> fmt::Debug for Container<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("link", &self.link.to_string())
            .field("properties", &self.properties)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Iterates the result pages of one query.
///
/// Before the first page is read, [`FeedIterator::has_more_results`] is `true`; after that
/// it follows the continuation token of the last page.
#[derive(Debug)]
pub struct FeedIterator<B: FeedBackend> {
    container: Container<B>,
    query: SqlQuery,
    options: FeedOptions,
    started: bool,
}

impl<B: FeedBackend> FeedIterator<B> {
    /// Creates an iterator that starts from `options.continuation`.
    pub fn new(container: Container<B>, query: SqlQuery, options: FeedOptions) -> Self {
        Self { container, query, options, started: false }
    }

    /// Returns `true` while another page may be read.
    pub fn has_more_results(&self) -> bool {
        !self.started || self.options.continuation.is_some()
    }

    /// Returns the continuation token the next page would start from.
    pub fn continuation(&self) -> Option<&str> {
        self.options.continuation.as_deref()
    }

    /// Returns the query being iterated.
    pub fn query(&self) -> &SqlQuery {
        &self.query
    }

    /// Reads the next page and advances the continuation token.
    pub async fn read_next(&mut self) -> FeedResult<FeedPage<Value>> {
        let page = self
            .container
            .query_page(&self.query, &self.options)
            .await?;

        self.started = true;
        self.options.continuation = page.continuation.clone();

        Ok(page)
    }
}

/// Typed operations against one container under one partition key.
///
/// A `Query` tracks the request charge of its last logical call and the continuation
/// token of its last page fetch. Operations take `&mut self`, so one handle never runs two
/// calls at once; open another handle for concurrent work.
///
/// Draining calls ([`Query::get_all`], [`Query::get_all_where`]) resume from the stored
/// continuation token when an earlier drain of the same query (or [`Query::resume_from`])
/// left it there, which lets a drain bounded by [`Query::with_max_items`] be continued by
/// calling it again. Tokens from [`Query::get_one`] and [`Query::get_page`] are never resumed.
pub struct Query<T: Item, B: FeedBackend> {
    container: Container<B>,
    partition_key: String,
    page_size: i32,
    max_items: i64,
    continuation: Option<String>,
    last_query: Option<SqlQuery>,
    request_charge: f64,
    disposed: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Item, B: FeedBackend> Query<T, B> {
    /// Creates a handle on `container` scoped to `partition_key` (empty for none).
    pub fn new(container: Container<B>, partition_key: impl Into<String>) -> Self {
        Self {
            container,
            partition_key: partition_key.into(),
            page_size: -1,
            max_items: -1,
            continuation: None,
            last_query: None,
            request_charge: 0.0,
            disposed: false,
            _marker: PhantomData,
        }
    }

    /// Sets the page-size hint sent with every query page (`-1` for the service default).
    pub fn with_page_size(mut self, page_size: i32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Stops draining calls once they have collected at least `max_items` items
    /// (`-1` for no bound).
    pub fn with_max_items(mut self, max_items: i64) -> Self {
        self.max_items = max_items;
        self
    }

    /// Switches this handle to another item type, keeping container and partition key.
    pub fn with_type<U: Item>(&self) -> Query<U, B> {
        Query::new(self.container.clone(), self.partition_key.clone())
            .with_page_size(self.page_size)
            .with_max_items(self.max_items)
    }

    /// Returns the container this handle is bound to.
    pub fn container(&self) -> &Container<B> {
        &self.container
    }

    /// Returns the partition key (empty for none).
    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    /// Request units consumed by the last logical call.
    pub fn request_charge(&self) -> f64 {
        self.request_charge
    }

    /// Continuation token of the last page fetched, `None` once a query is exhausted.
    pub fn continuation(&self) -> Option<&str> {
        self.continuation.as_deref()
    }

    /// Makes the next draining call of `query` start from `token`.
    pub fn resume_from(&mut self, query: impl Into<SqlQuery>, token: impl Into<String>) {
        self.last_query = Some(query.into());
        self.continuation = Some(token.into());
    }

    /// Forgets the continuation token and request charge.
    pub fn reset(&mut self) {
        self.continuation = None;
        self.last_query = None;
        self.request_charge = 0.0;
    }

    /// The options query pages are requested with, starting from `continuation`.
    pub fn options(&self, continuation: Option<String>) -> FeedOptions {
        FeedOptions::new(PartitionKey::scope(&self.partition_key))
            .with_max_item_count(self.page_size)
            .with_continuation(continuation)
    }

    /// Reads one item by ID under the bound partition key.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::ItemNotFound`] if no such item exists.
    pub async fn get_by_id(&mut self, id: &str) -> FeedResult<T> {
        self.ensure_open()?;
        self.request_charge = 0.0;

        let response = self
            .container
            .read_item(id, self.scope().as_ref())
            .await?;
        self.request_charge = response.request_charge;

        match response.outcome {
            Outcome::Succeeded => match response.resource {
                Some(resource) => T::from_json(resource),
                None => Err(FeedError::Serialization(format!("read of {id} returned no body"))),
            },
            Outcome::NotFound => Err(FeedError::ItemNotFound(id.to_string(), self.container.name().to_string())),
            _ => Err(response.into_remote_error()),
        }
    }

    /// Returns the first item matching `filter`, or `None` if nothing matches.
    ///
    /// Pages are read until one holds an item or the results are exhausted.
    pub async fn get_one(&mut self, filter: impl Into<Select>) -> FeedResult<Option<T>> {
        self.ensure_open()?;
        self.request_charge = 0.0;

        let query = filter.into().to_sql()?;
        let mut iterator = self.container.iter_query(query, self.options(None));

        while iterator.has_more_results() {
            let page = iterator.read_next().await?;
            self.record_page(&page);

            if let Some(first) = page.items.into_iter().next() {
                return Ok(Some(T::from_json(first)?));
            }
        }

        Ok(None)
    }

    /// Runs raw query text and drains every page.
    pub async fn get_all(&mut self, query: impl Into<SqlQuery>) -> FeedResult<Vec<T>> {
        self.drain(query.into()).await
    }

    /// Runs a structured filter or selection and drains every page.
    pub async fn get_all_where(&mut self, select: impl Into<Select>) -> FeedResult<Vec<T>> {
        let query = select.into().to_sql()?;
        self.drain(query).await
    }

    /// Fetches exactly one page of `query`, using `OFFSET @row LIMIT @size` with
    /// `row = (page - 1) * page_size` and `size = page_size`.
    ///
    /// Always starts from the beginning of the results, ignoring any stored continuation.
    pub async fn get_page(
        &mut self,
        query: impl Into<SqlQuery>,
        page: usize,
        page_size: usize,
    ) -> FeedResult<Vec<T>> {
        self.ensure_open()?;
        self.request_charge = 0.0;

        let query = query.into().paged(page, page_size);
        let results = self
            .container
            .query_page(&query, &self.options(None))
            .await?;
        self.record_page(&results);

        results
            .items
            .into_iter()
            .map(T::from_json)
            .collect()
    }

    /// Inserts or replaces `item` under the bound partition key.
    ///
    /// Returns `true` if the item was created or replaced and `false` if the service
    /// reported a conflict (for example a unique-key violation).
    pub async fn save(&mut self, item: &T) -> FeedResult<bool> {
        self.ensure_open()?;
        self.request_charge = 0.0;
        self.check_partition_key(item);

        let response = self
            .container
            .upsert_item(self.scope().as_ref(), item.to_json()?)
            .await?;
        self.request_charge = response.request_charge;

        debug!(
            container = self.container.name(),
            id = item.id(),
            outcome = ?response.outcome,
            request_charge = response.request_charge,
            "saved item"
        );

        match response.outcome {
            Outcome::Created | Outcome::Replaced => Ok(true),
            Outcome::Conflict => Ok(false),
            Outcome::NotFound => Err(self.container.not_found()),
            _ => Err(response.into_remote_error()),
        }
    }

    /// Inserts `item` under the bound partition key.
    ///
    /// Returns `false` if an item with the same ID already exists in the partition.
    pub async fn create(&mut self, item: &T) -> FeedResult<bool> {
        self.ensure_open()?;
        self.request_charge = 0.0;
        self.check_partition_key(item);

        let response = self
            .container
            .create_item(self.scope().as_ref(), item.to_json()?)
            .await?;
        self.request_charge = response.request_charge;

        match response.outcome {
            Outcome::Created => Ok(true),
            Outcome::Conflict => Ok(false),
            Outcome::NotFound => Err(self.container.not_found()),
            _ => Err(response.into_remote_error()),
        }
    }

    /// Deletes the item with `id` under the bound partition key.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::ItemNotFound`] if no such item exists.
    pub async fn delete(&mut self, id: &str) -> FeedResult<()> {
        self.ensure_open()?;
        self.request_charge = 0.0;

        let response = self
            .container
            .delete_item(id, self.scope().as_ref())
            .await?;
        self.request_charge = response.request_charge;

        match response.outcome {
            Outcome::Succeeded => Ok(()),
            Outcome::NotFound => Err(FeedError::ItemNotFound(id.to_string(), self.container.name().to_string())),
            _ => Err(response.into_remote_error()),
        }
    }

    /// Disables this handle. Idempotent.
    ///
    /// Result iterators only live for the duration of a draining call, so none is pending here.
    pub fn dispose(&mut self) {
        self.disposed = true;
    }

    /// Returns `true` once disposed, or once the owning client released the connection.
    pub fn is_disposed(&self) -> bool {
        self.disposed || self.container.is_released()
    }

    async fn drain(&mut self, query: SqlQuery) -> FeedResult<Vec<T>> {
        self.ensure_open()?;
        self.request_charge = 0.0;

        let start = if self.last_query.as_ref() == Some(&query) {
            self.continuation.clone()
        } else {
            None
        };

        self.last_query = Some(query.clone());
        let mut iterator = self.container.iter_query(query, self.options(start));

        let items = self.drain_pending(&mut iterator).await?;
        debug!(
            container = self.container.name(),
            partition_key = %self.partition_key,
            items = items.len(),
            request_charge = self.request_charge,
            has_more = self.continuation.is_some(),
            "drained query"
        );

        Ok(items)
    }

    async fn drain_pending(&mut self, iterator: &mut FeedIterator<B>) -> FeedResult<Vec<T>> {
        let mut items = Vec::new();

        while iterator.has_more_results() {
            let page = iterator.read_next().await?;

            self.request_charge += page.request_charge;
            self.continuation = page.continuation;

            for value in page.items {
                items.push(T::from_json(value)?);
            }

            if self.max_items >= 0 && items.len() as i64 >= self.max_items {
                break;
            }
        }

        Ok(items)
    }

    /// Single-page calls report their continuation but never make a later drain resume
    /// from it.
    fn record_page(&mut self, page: &FeedPage<Value>) {
        self.request_charge += page.request_charge;
        self.continuation = page.continuation.clone();
        self.last_query = None;
    }

    fn scope(&self) -> Option<PartitionKey> {
        PartitionKey::scope(&self.partition_key)
    }

    fn check_partition_key(&self, item: &T) {
        if let Some(own) = item.partition_key() {
            if !self.partition_key.is_empty() && own != self.partition_key {
                warn!(
                    id = item.id(),
                    item_partition_key = own,
                    bound_partition_key = %self.partition_key,
                    "item partition key differs from the handle's partition key"
                );
            }
        }
    }

    fn ensure_open(&self) -> FeedResult<()> {
        if self.disposed {
            return Err(FeedError::Disposed("query"));
        }
        if self.container.is_released() {
            return Err(FeedError::Disposed("client connection"));
        }

        Ok(())
    }
}

impl<T: Item, B: FeedBackend> fmt::Debug for Query<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("container", &self.container.link().to_string())
            .field("partition_key", &self.partition_key)
            .field("page_size", &self.page_size)
            .field("max_items", &self.max_items)
            .field("continuation", &self.continuation)
            .field("request_charge", &self.request_charge)
            .field("disposed", &self.disposed)
            .finish()
    }
}
