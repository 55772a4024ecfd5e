#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use feedlayer_core::{
    backend::{BackendConnector, ContainerLink, ContainerProperties, FeedBackend},
    config::ConnectionConfig,
    error::{FeedError, FeedResult},
    item::{Item, PartitionKey},
    page::{FeedOptions, FeedPage, ItemResponse},
    query::SqlQuery,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub customer: String,
    pub total: u32,
}

impl Order {
    pub fn new(id: &str, customer: &str, total: u32) -> Self {
        Self { id: id.into(), customer: customer.into(), total }
    }
}

impl Item for Order {
    fn id(&self) -> &str {
        &self.id
    }

    fn partition_key(&self) -> Option<&str> {
        Some(&self.customer)
    }
}

pub fn order_json(id: &str) -> Value {
    json!({ "id": id, "customer": "ada", "total": 10 })
}

/// A page the backend serves, with the charge it reports.
#[derive(Debug, Clone)]
pub struct ScriptedPage {
    pub items: Vec<Value>,
    pub charge: f64,
}

impl ScriptedPage {
    pub fn new(ids: &[&str], charge: f64) -> Self {
        Self { items: ids.iter().map(|id| order_json(id)).collect(), charge }
    }
}

/// Serves a fixed sequence of pages for every query, addressed by continuation token
/// (the token is the index of the next page), and replays queued point responses.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    pages: Mutex<Vec<ScriptedPage>>,
    point_responses: Mutex<VecDeque<ItemResponse>>,
    requests: Mutex<Vec<(SqlQuery, FeedOptions)>>,
    point_calls: Mutex<Vec<(String, Option<PartitionKey>)>>,
    shutdowns: AtomicUsize,
    missing_container: bool,
}

impl ScriptedBackend {
    pub fn new(pages: Vec<ScriptedPage>) -> Self {
        Self { pages: Mutex::new(pages), ..Self::default() }
    }

    pub fn without_container() -> Self {
        Self { missing_container: true, ..Self::default() }
    }

    pub fn push_response(&self, response: ItemResponse) {
        self.point_responses
            .lock()
            .unwrap()
            .push_back(response);
    }

    pub fn requests(&self) -> Vec<(SqlQuery, FeedOptions)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_continuations(&self) -> Vec<Option<String>> {
        self.requests()
            .into_iter()
            .map(|(_, options)| options.continuation)
            .collect()
    }

    pub fn point_calls(&self) -> Vec<(String, Option<PartitionKey>)> {
        self.point_calls.lock().unwrap().clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    fn next_response(&self, operation: &str, partition_key: Option<&PartitionKey>) -> FeedResult<ItemResponse> {
        self.point_calls
            .lock()
            .unwrap()
            .push((operation.to_string(), partition_key.cloned()));

        self.point_responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| FeedError::remote(500, format!("no scripted response for {operation}")))
    }
}

#[async_trait]
impl FeedBackend for ScriptedBackend {
    async fn read_container(&self, link: &ContainerLink) -> FeedResult<ContainerProperties> {
        if self.missing_container {
            return Err(FeedError::ContainerNotFound(
                link.container().to_string(),
                link.database().to_string(),
            ));
        }

        Ok(ContainerProperties::new(link.container(), "/customer"))
    }

    async fn read_item(
        &self,
        _link: &ContainerLink,
        id: &str,
        partition_key: Option<&PartitionKey>,
    ) -> FeedResult<ItemResponse> {
        self.next_response(&format!("read:{id}"), partition_key)
    }

    async fn upsert_item(
        &self,
        _link: &ContainerLink,
        partition_key: Option<&PartitionKey>,
        _item: Value,
    ) -> FeedResult<ItemResponse> {
        self.next_response("upsert", partition_key)
    }

    async fn create_item(
        &self,
        _link: &ContainerLink,
        partition_key: Option<&PartitionKey>,
        _item: Value,
    ) -> FeedResult<ItemResponse> {
        self.next_response("create", partition_key)
    }

    async fn delete_item(
        &self,
        _link: &ContainerLink,
        id: &str,
        partition_key: Option<&PartitionKey>,
    ) -> FeedResult<ItemResponse> {
        self.next_response(&format!("delete:{id}"), partition_key)
    }

    async fn query_items(
        &self,
        _link: &ContainerLink,
        query: &SqlQuery,
        options: &FeedOptions,
    ) -> FeedResult<FeedPage<Value>> {
        self.requests
            .lock()
            .unwrap()
            .push((query.clone(), options.clone()));

        let pages = self.pages.lock().unwrap();
        let index = match &options.continuation {
            None => 0,
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| FeedError::remote(400, format!("bad continuation {token}")))?,
        };

        let Some(page) = pages.get(index) else {
            return Ok(FeedPage::default());
        };
        let continuation = (index + 1 < pages.len()).then(|| (index + 1).to_string());

        Ok(FeedPage::new(page.items.clone())
            .with_request_charge(page.charge)
            .with_continuation(continuation))
    }

    async fn shutdown(&self) -> FeedResult<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out a shared [`ScriptedBackend`], or refuses to connect.
#[derive(Debug, Clone)]
pub struct ScriptedConnector {
    pub backend: Arc<ScriptedBackend>,
    pub refuse: bool,
    pub yield_on_connect: bool,
}

impl ScriptedConnector {
    pub fn new(backend: ScriptedBackend) -> Self {
        Self { backend: Arc::new(backend), refuse: false, yield_on_connect: false }
    }

    /// Suspends inside `connect` before handing out the backend.
    pub fn yielding(mut self) -> Self {
        self.yield_on_connect = true;
        self
    }

    pub fn refusing() -> Self {
        Self { backend: Arc::new(ScriptedBackend::default()), refuse: true, yield_on_connect: false }
    }
}

#[async_trait]
impl BackendConnector for ScriptedConnector {
    type Backend = Arc<ScriptedBackend>;

    async fn connect(&self, config: &ConnectionConfig) -> FeedResult<Self::Backend> {
        if self.refuse {
            return Err(FeedError::Connection(format!("{} refused the connection", config.endpoint())));
        }
        if self.yield_on_connect {
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
        }

        Ok(self.backend.clone())
    }
}

pub fn config() -> ConnectionConfig {
    ConnectionConfig::new("https://localhost:8081/", "a2V5", "shop").unwrap()
}
