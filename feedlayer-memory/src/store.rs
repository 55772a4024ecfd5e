//! In-memory emulation of a partitioned document service.
//!
//! This module provides a backend that keeps databases, containers and items in HashMaps
//! behind async-safe read-write locks, and reproduces the parts of the service contract the
//! client relies on: partition scoping, status codes, request charges and continuation
//! tokens.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::Utc;
use mea::rwlock::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use feedlayer_core::{
    backend::{BackendConnector, ContainerLink, ContainerProperties, FeedBackend},
    config::ConnectionConfig,
    error::{FeedError, FeedResult},
    item::{PartitionKey, value_at_path},
    page::{FeedOptions, FeedPage, ItemResponse, OperationKind},
    query::SqlQuery,
};

use crate::{evaluator, sql};

/// Endpoint the store answers on unless configured otherwise.
pub const DEFAULT_ENDPOINT: &str = "https://localhost:8081/";

/// The publicly documented key of the local service emulator.
pub const DEFAULT_ACCESS_KEY: &str =
    "C2y6yDjf5/R+ob0N8A7Cgv30VRDJIWEHLM+4QDU5DE2nQ9nDuVTqobD4b8mGGyPMbIZnqyMsEcaGQy67XIw/Jw==";

/// Page size used when a query does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Request units charged per operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargeModel {
    /// Point read, found or not.
    pub read: f64,
    /// Upsert, create or delete.
    pub write: f64,
    /// Fixed cost of every query page.
    pub query_page: f64,
    /// Additional cost per item returned on a query page.
    pub query_item: f64,
}

impl Default for ChargeModel {
    fn default() -> Self {
        Self { read: 1.0, write: 5.0, query_page: 2.0, query_item: 0.5 }
    }
}

/// Declares a container: its partition key path and optional unique keys.
///
/// Unique keys are enforced within a logical partition, like the service does.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerDefinition {
    pub name: String,
    pub partition_key_path: String,
    pub unique_keys: Vec<String>,
}

impl ContainerDefinition {
    pub fn new(name: impl Into<String>, partition_key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_key_path: partition_key_path.into(),
            unique_keys: Vec::new(),
        }
    }

    /// Adds a unique key path such as `/email`.
    pub fn with_unique_key(mut self, path: impl Into<String>) -> Self {
        self.unique_keys.push(path.into());
        self
    }
}

#[derive(Debug)]
struct StoredItem {
    partition: String,
    value: Value,
}

/// Items in insertion order, with an index by `(partition, id)`.
#[derive(Debug)]
struct StoredContainer {
    definition: ContainerDefinition,
    items: BTreeMap<u64, StoredItem>,
    index: HashMap<(String, String), u64>,
    next_seq: u64,
}

impl StoredContainer {
    fn new(definition: ContainerDefinition) -> Self {
        Self { definition, items: BTreeMap::new(), index: HashMap::new(), next_seq: 0 }
    }

    fn partition_of(&self, item: &Value) -> String {
        match value_at_path(item, &self.definition.partition_key_path) {
            Some(Value::String(value)) => value.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    fn locate(&self, id: &str, partition_key: Option<&PartitionKey>) -> Option<u64> {
        match partition_key {
            Some(pk) => self
                .index
                .get(&(pk.as_str().to_string(), id.to_string()))
                .copied(),
            None => self
                .items
                .iter()
                .find(|(_, stored)| stored.value.get("id").and_then(Value::as_str) == Some(id))
                .map(|(seq, _)| *seq),
        }
    }

    fn unique_key_collision(&self, partition: &str, id: &str, item: &Value) -> Option<&str> {
        self.definition.unique_keys.iter().find_map(|path| {
            let value = value_at_path(item, path)?;
            self.items
                .values()
                .filter(|stored| stored.partition == partition)
                .filter(|stored| stored.value.get("id").and_then(Value::as_str) != Some(id))
                .any(|stored| value_at_path(&stored.value, path) == Some(value))
                .then_some(path.as_str())
        })
    }
}

type DatabaseMap = HashMap<String, HashMap<String, StoredContainer>>;

#[derive(Debug, Serialize, Deserialize)]
struct ContinuationToken {
    skip: usize,
}

/// Thread-safe in-memory document service.
///
/// `InMemoryStore` is cloneable and uses `Arc`-wrapped internal state; every clone, and every
/// backend handed out by its [`InMemoryConnector`], shares the same data.
///
/// # Example
///
/// ```ignore
/// use feedlayer_memory::InMemoryStore;
///
/// let store = InMemoryStore::builder()
///     .database("shop")
///     .container("products", "/category")
///     .build();
///
/// let client = Client::new(store.connector(), store.connection_config()?);
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    databases: Arc<RwLock<DatabaseMap>>,
    endpoint: String,
    access_key: String,
    default_database: String,
    charges: ChargeModel,
    page_size: usize,
    connections: Arc<AtomicUsize>,
    shutdowns: Arc<AtomicUsize>,
}

impl InMemoryStore {
    /// Creates an empty store on the default endpoint with no databases.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for declaring databases, containers and service behaviour.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Returns a connector that opens backends on this store.
    pub fn connector(&self) -> InMemoryConnector {
        InMemoryConnector { store: self.clone() }
    }

    /// Configuration matching this store's endpoint, key and first database.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Configuration`] if no database was declared.
    pub fn connection_config(&self) -> FeedResult<ConnectionConfig> {
        ConnectionConfig::new(&self.endpoint, self.access_key.clone(), self.default_database.clone())
    }

    /// Adds a container to `database`, creating the database if needed.
    /// An existing container of the same name is left untouched.
    pub async fn create_container(&self, database: &str, definition: ContainerDefinition) {
        self.databases
            .write()
            .await
            .entry(database.to_string())
            .or_default()
            .entry(definition.name.clone())
            .or_insert_with(|| StoredContainer::new(definition));
    }

    /// Removes a container and its items.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::ContainerNotFound`] if it does not exist.
    pub async fn drop_container(&self, database: &str, container: &str) -> FeedResult<()> {
        let mut databases = self.databases.write().await;

        match databases.get_mut(database).and_then(|db| db.remove(container)) {
            Some(_) => Ok(()),
            None => Err(FeedError::ContainerNotFound(container.to_string(), database.to_string())),
        }
    }

    /// Number of items in a container, `None` if it does not exist.
    pub async fn item_count(&self, database: &str, container: &str) -> Option<usize> {
        self.databases
            .read()
            .await
            .get(database)
            .and_then(|db| db.get(container))
            .map(|c| c.items.len())
    }

    /// Number of connections opened through [`InMemoryStore::connector`].
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Number of times a backend on this store was shut down.
    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Returns the charge model requests are billed with.
    pub fn charges(&self) -> ChargeModel {
        self.charges
    }

    fn response(&self, kind: OperationKind, status: u16, charge: f64) -> ItemResponse {
        ItemResponse::new(kind, status)
            .with_request_charge(charge)
            .with_activity_id(Uuid::new_v4())
    }

    fn container_missing(&self, kind: OperationKind, link: &ContainerLink, charge: f64) -> ItemResponse {
        self.response(kind, 404, charge)
            .with_message(format!("container {link} does not exist"))
    }

    async fn write_item(
        &self,
        kind: OperationKind,
        link: &ContainerLink,
        partition_key: Option<&PartitionKey>,
        mut item: Value,
    ) -> FeedResult<ItemResponse> {
        let charge = self.charges.write;
        let mut databases = self.databases.write().await;
        let Some(container) = lookup_mut(&mut databases, link) else {
            return Ok(self.container_missing(kind, link, charge));
        };

        let Some(id) = item.get("id").and_then(Value::as_str).map(str::to_string) else {
            return Ok(self
                .response(kind, 400, charge)
                .with_message("the item must have a string `id` property"));
        };

        let partition = container.partition_of(&item);
        if let Some(pk) = partition_key {
            if pk.as_str() != partition {
                return Ok(self.response(kind, 400, charge).with_message(format!(
                    "partition key {} does not match the value `{partition}` at {} in item {id}",
                    pk.to_header_value(),
                    container.definition.partition_key_path,
                )));
            }
        }

        let key = (partition.clone(), id.clone());
        let existing = container.index.get(&key).copied();

        if kind == OperationKind::Create && existing.is_some() {
            return Ok(self
                .response(kind, 409, charge)
                .with_message(format!("an item with id {id} already exists in the partition")));
        }
        if let Some(path) = container.unique_key_collision(&partition, &id, &item) {
            return Ok(self
                .response(kind, 409, charge)
                .with_message(format!("unique key {path} is already taken in the partition")));
        }

        let etag = format!("\"{}\"", Uuid::new_v4());
        if let Value::Object(map) = &mut item {
            map.insert("_ts".to_string(), Value::from(Utc::now().timestamp()));
            map.insert("_etag".to_string(), Value::String(etag.clone()));
        }

        let stored = StoredItem { partition, value: item.clone() };
        let status = match existing {
            Some(seq) => {
                container.items.insert(seq, stored);
                200
            }
            None => {
                let seq = container.next_seq;
                container.next_seq += 1;
                container.items.insert(seq, stored);
                container.index.insert(key, seq);
                201
            }
        };

        Ok(self
            .response(kind, status, charge)
            .with_resource(item)
            .with_etag(etag))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup<'a>(databases: &'a DatabaseMap, link: &ContainerLink) -> Option<&'a StoredContainer> {
    databases
        .get(link.database())
        .and_then(|db| db.get(link.container()))
}

fn lookup_mut<'a>(databases: &'a mut DatabaseMap, link: &ContainerLink) -> Option<&'a mut StoredContainer> {
    databases
        .get_mut(link.database())
        .and_then(|db| db.get_mut(link.container()))
}

#[async_trait]
impl FeedBackend for InMemoryStore {
    async fn read_container(&self, link: &ContainerLink) -> FeedResult<ContainerProperties> {
        let databases = self.databases.read().await;

        lookup(&databases, link)
            .map(|c| ContainerProperties::new(c.definition.name.clone(), c.definition.partition_key_path.clone()))
            .ok_or_else(|| FeedError::ContainerNotFound(link.container().to_string(), link.database().to_string()))
    }

    async fn read_item(
        &self,
        link: &ContainerLink,
        id: &str,
        partition_key: Option<&PartitionKey>,
    ) -> FeedResult<ItemResponse> {
        let charge = self.charges.read;
        let databases = self.databases.read().await;
        let Some(container) = lookup(&databases, link) else {
            return Ok(self.container_missing(OperationKind::Read, link, charge));
        };

        match container.locate(id, partition_key).and_then(|seq| container.items.get(&seq)) {
            Some(stored) => {
                let mut response = self
                    .response(OperationKind::Read, 200, charge)
                    .with_resource(stored.value.clone());
                if let Some(etag) = stored.value.get("_etag").and_then(Value::as_str) {
                    response = response.with_etag(etag);
                }
                Ok(response)
            }
            None => Ok(self
                .response(OperationKind::Read, 404, charge)
                .with_message(format!("item {id} does not exist"))),
        }
    }

    async fn upsert_item(
        &self,
        link: &ContainerLink,
        partition_key: Option<&PartitionKey>,
        item: Value,
    ) -> FeedResult<ItemResponse> {
        self.write_item(OperationKind::Upsert, link, partition_key, item)
            .await
    }

    async fn create_item(
        &self,
        link: &ContainerLink,
        partition_key: Option<&PartitionKey>,
        item: Value,
    ) -> FeedResult<ItemResponse> {
        self.write_item(OperationKind::Create, link, partition_key, item)
            .await
    }

    async fn delete_item(
        &self,
        link: &ContainerLink,
        id: &str,
        partition_key: Option<&PartitionKey>,
    ) -> FeedResult<ItemResponse> {
        let charge = self.charges.write;
        let mut databases = self.databases.write().await;
        let Some(container) = lookup_mut(&mut databases, link) else {
            return Ok(self.container_missing(OperationKind::Delete, link, charge));
        };

        let Some(seq) = container.locate(id, partition_key) else {
            return Ok(self
                .response(OperationKind::Delete, 404, charge)
                .with_message(format!("item {id} does not exist")));
        };

        if let Some(stored) = container.items.remove(&seq) {
            container.index.remove(&(stored.partition, id.to_string()));
        }

        Ok(self.response(OperationKind::Delete, 204, charge))
    }

    async fn query_items(
        &self,
        link: &ContainerLink,
        query: &SqlQuery,
        options: &FeedOptions,
    ) -> FeedResult<FeedPage<Value>> {
        let statement = sql::parse(query.text())?;

        let skip = match &options.continuation {
            None => 0,
            Some(token) => {
                serde_json::from_str::<ContinuationToken>(token)
                    .map_err(|_| FeedError::remote(400, format!("malformed continuation token {token}")))?
                    .skip
            }
        };
        let page_size = if options.max_item_count > 0 {
            options.max_item_count as usize
        } else {
            self.page_size
        };

        let results = {
            let databases = self.databases.read().await;
            let container = lookup(&databases, link).ok_or_else(|| {
                FeedError::ContainerNotFound(link.container().to_string(), link.database().to_string())
            })?;

            let scoped = container
                .items
                .values()
                .filter(|stored| match &options.partition_key {
                    Some(pk) => stored.partition == pk.as_str(),
                    None => true,
                })
                .map(|stored| &stored.value);

            evaluator::execute(&statement, query, scoped)?
        };

        let total = results.len();
        let items: Vec<Value> = results
            .into_iter()
            .skip(skip)
            .take(page_size)
            .collect();

        let next = skip + items.len();
        let continuation = if next < total {
            Some(serde_json::to_string(&ContinuationToken { skip: next })?)
        } else {
            None
        };
        let charge = self.charges.query_page + self.charges.query_item * items.len() as f64;

        Ok(FeedPage::new(items)
            .with_request_charge(charge)
            .with_continuation(continuation)
            .with_activity_id(Uuid::new_v4()))
    }

    async fn shutdown(&self) -> FeedResult<()> {
        let count = self.shutdowns.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(endpoint = %self.endpoint, shutdowns = count, "in-memory backend shut down");

        Ok(())
    }
}

/// Opens backends on an [`InMemoryStore`], checking endpoint and access key like the service.
#[derive(Debug, Clone)]
pub struct InMemoryConnector {
    store: InMemoryStore,
}

#[async_trait]
impl BackendConnector for InMemoryConnector {
    type Backend = InMemoryStore;

    async fn connect(&self, config: &ConnectionConfig) -> FeedResult<Self::Backend> {
        let endpoint = Url::parse(&self.store.endpoint)?;

        if *config.endpoint() != endpoint {
            return Err(FeedError::Connection(format!(
                "no service is listening on {}",
                config.endpoint()
            )));
        }
        if config.access_key() != self.store.access_key {
            return Err(FeedError::Connection(format!(
                "{} rejected the access key (401 Unauthorized)",
                config.endpoint()
            )));
        }

        let count = self.store.connections.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(endpoint = %endpoint, connections = count, "in-memory backend connected");

        Ok(self.store.clone())
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// Containers are added to the most recently declared database; the first database declared
/// is the one [`InMemoryStore::connection_config`] points at.
///
/// # Example
///
/// ```ignore
/// let store = InMemoryStore::builder()
///     .database("shop")
///     .container("products", "/category")
///     .container_definition(ContainerDefinition::new("users", "/tenant").with_unique_key("/email"))
///     .page_size(25)
///     .build();
/// ```
#[derive(Debug)]
pub struct InMemoryStoreBuilder {
    endpoint: String,
    access_key: String,
    current_database: Option<String>,
    default_database: Option<String>,
    databases: DatabaseMap,
    charges: ChargeModel,
    page_size: usize,
}

impl Default for InMemoryStoreBuilder {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            access_key: DEFAULT_ACCESS_KEY.to_string(),
            current_database: None,
            default_database: None,
            databases: DatabaseMap::new(),
            charges: ChargeModel::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl InMemoryStoreBuilder {
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn access_key(mut self, access_key: impl Into<String>) -> Self {
        self.access_key = access_key.into();
        self
    }

    /// Declares a database and makes it the target of following `container` calls.
    pub fn database(mut self, name: impl Into<String>) -> Self {
        let name = name.into();

        self.databases.entry(name.clone()).or_default();
        self.default_database.get_or_insert_with(|| name.clone());
        self.current_database = Some(name);
        self
    }

    /// Declares a container partitioned on `partition_key_path` in the current database.
    pub fn container(self, name: impl Into<String>, partition_key_path: impl Into<String>) -> Self {
        self.container_definition(ContainerDefinition::new(name, partition_key_path))
    }

    /// Declares a container in the current database, or in `default` if none was declared.
    pub fn container_definition(mut self, definition: ContainerDefinition) -> Self {
        if self.current_database.is_none() {
            self = self.database("default");
        }

        let database = self.current_database.clone().unwrap_or_default();
        self.databases
            .entry(database)
            .or_default()
            .insert(definition.name.clone(), StoredContainer::new(definition));
        self
    }

    pub fn charges(mut self, charges: ChargeModel) -> Self {
        self.charges = charges;
        self
    }

    /// Page size for queries sent without a page-size hint.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Builds and returns a new [`InMemoryStore`].
    pub fn build(self) -> InMemoryStore {
        InMemoryStore {
            databases: Arc::new(RwLock::new(self.databases)),
            endpoint: self.endpoint,
            access_key: self.access_key,
            default_database: self.default_database.unwrap_or_default(),
            charges: self.charges,
            page_size: self.page_size,
            connections: Arc::new(AtomicUsize::new(0)),
            shutdowns: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn link() -> ContainerLink {
        ContainerLink::new("shop", "products")
    }

    fn store() -> InMemoryStore {
        InMemoryStore::builder()
            .database("shop")
            .container_definition(ContainerDefinition::new("products", "/category").with_unique_key("/sku"))
            .page_size(2)
            .build()
    }

    fn product(id: &str, category: &str, sku: &str) -> Value {
        json!({ "id": id, "category": category, "sku": sku })
    }

    #[tokio::test]
    async fn upsert_creates_then_replaces_and_stamps_system_properties() {
        let store = store();
        let books = PartitionKey::new("books");

        let created = store
            .upsert_item(&link(), Some(&books), product("p1", "books", "A"))
            .await
            .unwrap();
        assert_eq!(created.status, 201);
        assert_eq!(created.request_charge, 5.0);
        assert!(created.resource.as_ref().unwrap()["_ts"].is_i64());
        assert!(created.etag.is_some());

        let replaced = store
            .upsert_item(&link(), Some(&books), product("p1", "books", "B"))
            .await
            .unwrap();
        assert_eq!(replaced.status, 200);
        assert_ne!(replaced.etag, created.etag);
        assert_eq!(store.item_count("shop", "products").await, Some(1));
    }

    #[tokio::test]
    async fn rejects_mismatched_partition_keys_and_missing_ids() {
        let store = store();

        let mismatch = store
            .upsert_item(&link(), Some(&PartitionKey::new("games")), product("p1", "books", "A"))
            .await
            .unwrap();
        assert_eq!(mismatch.status, 400);

        let no_id = store
            .upsert_item(&link(), None, json!({ "category": "books" }))
            .await
            .unwrap();
        assert_eq!(no_id.status, 400);
    }

    #[tokio::test]
    async fn create_and_unique_keys_conflict_within_a_partition() {
        let store = store();

        assert_eq!(store.create_item(&link(), None, product("p1", "books", "A")).await.unwrap().status, 201);
        assert_eq!(store.create_item(&link(), None, product("p1", "books", "A")).await.unwrap().status, 409);
        assert_eq!(store.upsert_item(&link(), None, product("p2", "books", "A")).await.unwrap().status, 409);
        assert_eq!(store.upsert_item(&link(), None, product("p2", "games", "A")).await.unwrap().status, 201);
    }

    #[tokio::test]
    async fn same_id_lives_independently_in_each_partition() {
        let store = store();
        store.upsert_item(&link(), None, product("p1", "books", "A")).await.unwrap();
        store.upsert_item(&link(), None, product("p1", "games", "B")).await.unwrap();

        let games = store
            .read_item(&link(), "p1", Some(&PartitionKey::new("games")))
            .await
            .unwrap();
        assert_eq!(games.resource.unwrap()["sku"], "B");

        let deleted = store
            .delete_item(&link(), "p1", Some(&PartitionKey::new("books")))
            .await
            .unwrap();
        assert_eq!(deleted.status, 204);
        assert_eq!(
            store.read_item(&link(), "p1", Some(&PartitionKey::new("books"))).await.unwrap().status,
            404
        );
        assert_eq!(store.item_count("shop", "products").await, Some(1));
    }

    #[tokio::test]
    async fn queries_page_with_continuation_tokens_and_charges() {
        let store = store();
        for (id, sku) in [("p1", "A"), ("p2", "B"), ("p3", "C")] {
            store.upsert_item(&link(), None, product(id, "books", sku)).await.unwrap();
        }
        store.upsert_item(&link(), None, product("g1", "games", "A")).await.unwrap();

        let query = SqlQuery::new("SELECT * FROM c");
        let options = FeedOptions::new(Some(PartitionKey::new("books")));

        let first = store.query_items(&link(), &query, &options).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.request_charge, 3.0);
        assert!(first.has_more_results());

        let second = store
            .query_items(&link(), &query, &options.clone().with_continuation(first.continuation))
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0]["id"], "p3");
        assert_eq!(second.continuation, None);

        let everything = store
            .query_items(&link(), &query, &FeedOptions::default().with_max_item_count(10))
            .await
            .unwrap();
        assert_eq!(everything.items.len(), 4);
    }

    #[tokio::test]
    async fn missing_containers_and_bad_tokens() {
        let store = store();
        let ghost = ContainerLink::new("shop", "ghosts");

        assert!(matches!(store.read_container(&ghost).await, Err(FeedError::ContainerNotFound(..))));
        assert_eq!(store.upsert_item(&ghost, None, product("p1", "x", "A")).await.unwrap().status, 404);
        assert!(matches!(
            store.query_items(&ghost, &SqlQuery::new("SELECT * FROM c"), &FeedOptions::default()).await,
            Err(FeedError::ContainerNotFound(..))
        ));
        assert!(matches!(
            store
                .query_items(
                    &link(),
                    &SqlQuery::new("SELECT * FROM c"),
                    &FeedOptions::default().with_continuation(Some("garbage".into()))
                )
                .await,
            Err(FeedError::Remote { status: 400, .. })
        ));
    }

    #[tokio::test]
    async fn connector_checks_endpoint_and_key() {
        let store = store();
        let config = store.connection_config().unwrap();

        assert!(store.connector().connect(&config).await.is_ok());
        assert_eq!(store.connection_count(), 1);

        let wrong_key = ConnectionConfig::new(DEFAULT_ENDPOINT, "d3Jvbmc=", "shop").unwrap();
        assert!(matches!(store.connector().connect(&wrong_key).await, Err(FeedError::Connection(_))));

        let wrong_endpoint = ConnectionConfig::new("https://db.example.com/", DEFAULT_ACCESS_KEY, "shop").unwrap();
        assert!(matches!(store.connector().connect(&wrong_endpoint).await, Err(FeedError::Connection(_))));
    }
}
