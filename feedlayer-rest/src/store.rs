//! Backend speaking the document service's REST protocol.
//!
//! Requests are signed with the account's master key (see [`crate::auth`]) and carry the
//! service's `x-ms-*` headers for partition scoping, paging and upserts. Responses are mapped
//! onto [`ItemResponse`] and [`FeedPage`] using the request-charge, continuation, activity-id
//! and entity-tag headers.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use mea::rwlock::RwLock;
use reqwest::{Client as HttpClient, Method, RequestBuilder, header::HeaderMap};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
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

use crate::auth::{MasterKey, ResourceType, rfc1123};

/// REST API version the requests are written against.
pub const API_VERSION: &str = "2018-12-31";

pub const HEADER_DATE: &str = "x-ms-date";
pub const HEADER_VERSION: &str = "x-ms-version";
pub const HEADER_PARTITION_KEY: &str = "x-ms-documentdb-partitionkey";
pub const HEADER_IS_UPSERT: &str = "x-ms-documentdb-is-upsert";
pub const HEADER_IS_QUERY: &str = "x-ms-documentdb-isquery";
pub const HEADER_CROSS_PARTITION: &str = "x-ms-documentdb-query-enablecrosspartition";
pub const HEADER_MAX_ITEM_COUNT: &str = "x-ms-max-item-count";
pub const HEADER_CONTINUATION: &str = "x-ms-continuation";
pub const HEADER_REQUEST_CHARGE: &str = "x-ms-request-charge";
pub const HEADER_ACTIVITY_ID: &str = "x-ms-activity-id";
pub const HEADER_ETAG: &str = "etag";

const QUERY_CONTENT_TYPE: &str = "application/query+json";

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(rename = "Documents", default)]
    documents: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Connection to a document service endpoint over HTTPS.
#[derive(Debug)]
pub struct RestBackend {
    http: HttpClient,
    endpoint: Url,
    key: MasterKey,
    partition_paths: RwLock<HashMap<String, String>>,
}

impl RestBackend {
    /// Creates a backend on `endpoint` signing requests with `key`.
    pub fn new(http: HttpClient, endpoint: Url, key: MasterKey) -> Self {
        Self { http, endpoint, key, partition_paths: RwLock::new(HashMap::new()) }
    }

    /// Checks that the endpoint answers and accepts the key by reading `database`.
    ///
    /// A missing database is not a connection failure; it surfaces when a container is
    /// opened.
    pub async fn probe(&self, database: &str) -> FeedResult<()> {
        let link = format!("dbs/{database}");
        let response = self
            .request(Method::GET, ResourceType::Database, &link, &["dbs", database])?
            .send()
            .await
            .map_err(transport_error)?;

        match response.status().as_u16() {
            401 | 403 => Err(FeedError::Connection(format!(
                "{} rejected the access key ({})",
                self.endpoint,
                response.status()
            ))),
            _ => Ok(()),
        }
    }

    fn request(
        &self,
        method: Method,
        resource_type: ResourceType,
        resource_link: &str,
        segments: &[&str],
    ) -> FeedResult<RequestBuilder> {
        let date = rfc1123(Utc::now());
        let authorization = self
            .key
            .authorization(method.as_str(), resource_type, resource_link, &date)?;

        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| FeedError::Configuration(format!("{} cannot be used as a base URL", self.endpoint)))?
            .pop_if_empty()
            .extend(segments);

        Ok(self
            .http
            .request(method, url)
            .header("authorization", authorization)
            .header(HEADER_DATE, date)
            .header(HEADER_VERSION, API_VERSION))
    }

    async fn send(&self, builder: RequestBuilder) -> FeedResult<(u16, HeaderMap, Vec<u8>)> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(transport_error)?;

        if status == 401 || status == 403 {
            return Err(FeedError::Connection(format!(
                "{} rejected the request ({status}): {}",
                self.endpoint,
                error_message(&body).unwrap_or_default()
            )));
        }

        Ok((status, headers, body.to_vec()))
    }

    async fn point(
        &self,
        kind: OperationKind,
        method: Method,
        link: &ContainerLink,
        id: &str,
        partition_key: Option<&PartitionKey>,
    ) -> FeedResult<ItemResponse> {
        let item_link = link.item_link(id);
        let mut builder = self.request(
            method,
            ResourceType::Item,
            &item_link,
            &["dbs", link.database(), "colls", link.container(), "docs", id],
        )?;
        if let Some(pk) = partition_key {
            builder = builder.header(HEADER_PARTITION_KEY, pk.to_header_value());
        }

        let (status, headers, body) = self.send(builder).await?;
        Ok(item_response(kind, status, &headers, &body))
    }

    async fn write(
        &self,
        kind: OperationKind,
        link: &ContainerLink,
        partition_key: Option<&PartitionKey>,
        item: Value,
    ) -> FeedResult<ItemResponse> {
        let container_link = link.to_string();
        let partition_key = match partition_key {
            Some(pk) => Some(pk.clone()),
            None => self.partition_key_of(link, &item).await,
        };

        let mut builder = self
            .request(
                Method::POST,
                ResourceType::Item,
                &container_link,
                &["dbs", link.database(), "colls", link.container(), "docs"],
            )?
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&item)?);

        if let Some(pk) = &partition_key {
            builder = builder.header(HEADER_PARTITION_KEY, pk.to_header_value());
        }
        if kind == OperationKind::Upsert {
            builder = builder.header(HEADER_IS_UPSERT, "True");
        }

        let (status, headers, body) = self.send(builder).await?;
        Ok(item_response(kind, status, &headers, &body))
    }

    /// Reads an item's partition key from the container's partition key path, when known.
    async fn partition_key_of(&self, link: &ContainerLink, item: &Value) -> Option<PartitionKey> {
        let paths = self.partition_paths.read().await;
        let path = paths.get(&link.to_string())?;

        match value_at_path(item, path)? {
            Value::String(value) => Some(PartitionKey::new(value.clone())),
            other => {
                warn!(container = %link, path = %path, value = %other, "non-string partition key value is not sent");
                None
            }
        }
    }
}

#[async_trait]
impl FeedBackend for RestBackend {
    async fn read_container(&self, link: &ContainerLink) -> FeedResult<ContainerProperties> {
        let container_link = link.to_string();
        let builder = self.request(
            Method::GET,
            ResourceType::Container,
            &container_link,
            &["dbs", link.database(), "colls", link.container()],
        )?;

        let (status, _, body) = self.send(builder).await?;
        match status {
            200 => {
                let properties: ContainerProperties = serde_json::from_slice(&body)?;
                if let Some(path) = properties.partition_key_path() {
                    self.partition_paths
                        .write()
                        .await
                        .insert(container_link, path.to_string());
                }
                Ok(properties)
            }
            404 => Err(FeedError::ContainerNotFound(link.container().to_string(), link.database().to_string())),
            status => Err(FeedError::remote(status, error_message(&body).unwrap_or_default())),
        }
    }

    async fn read_item(
        &self,
        link: &ContainerLink,
        id: &str,
        partition_key: Option<&PartitionKey>,
    ) -> FeedResult<ItemResponse> {
        self.point(OperationKind::Read, Method::GET, link, id, partition_key)
            .await
    }

    async fn upsert_item(
        &self,
        link: &ContainerLink,
        partition_key: Option<&PartitionKey>,
        item: Value,
    ) -> FeedResult<ItemResponse> {
        self.write(OperationKind::Upsert, link, partition_key, item)
            .await
    }

    async fn create_item(
        &self,
        link: &ContainerLink,
        partition_key: Option<&PartitionKey>,
        item: Value,
    ) -> FeedResult<ItemResponse> {
        self.write(OperationKind::Create, link, partition_key, item)
            .await
    }

    async fn delete_item(
        &self,
        link: &ContainerLink,
        id: &str,
        partition_key: Option<&PartitionKey>,
    ) -> FeedResult<ItemResponse> {
        self.point(OperationKind::Delete, Method::DELETE, link, id, partition_key)
            .await
    }

    async fn query_items(
        &self,
        link: &ContainerLink,
        query: &SqlQuery,
        options: &FeedOptions,
    ) -> FeedResult<FeedPage<Value>> {
        let container_link = link.to_string();
        let mut builder = self
            .request(
                Method::POST,
                ResourceType::Item,
                &container_link,
                &["dbs", link.database(), "colls", link.container(), "docs"],
            )?
            .header(reqwest::header::CONTENT_TYPE, QUERY_CONTENT_TYPE)
            .body(serde_json::to_vec(query)?);

        for (name, value) in query_headers(options) {
            builder = builder.header(name, value);
        }

        let (status, headers, body) = self.send(builder).await?;
        query_page(link, status, &headers, &body)
    }

    async fn shutdown(&self) -> FeedResult<()> {
        self.partition_paths.write().await.clear();
        debug!(endpoint = %self.endpoint, "rest backend released");

        Ok(())
    }
}

/// Headers a query page request is sent with.
pub fn query_headers(options: &FeedOptions) -> Vec<(&'static str, String)> {
    let mut headers = vec![
        (HEADER_IS_QUERY, "True".to_string()),
        (HEADER_MAX_ITEM_COUNT, options.max_item_count.to_string()),
    ];

    match &options.partition_key {
        Some(pk) => headers.push((HEADER_PARTITION_KEY, pk.to_header_value())),
        None => headers.push((HEADER_CROSS_PARTITION, "True".to_string())),
    }
    if let Some(token) = &options.continuation {
        headers.push((HEADER_CONTINUATION, token.clone()));
    }

    headers
}

/// Maps a point-operation response.
pub fn item_response(kind: OperationKind, status: u16, headers: &HeaderMap, body: &[u8]) -> ItemResponse {
    let mut response = ItemResponse::new(kind, status).with_request_charge(request_charge(headers));

    if let Some(activity_id) = activity_id(headers) {
        response = response.with_activity_id(activity_id);
    }
    if let Some(etag) = header_str(headers, HEADER_ETAG) {
        response = response.with_etag(etag);
    }

    if response.outcome.is_success() {
        if let Ok(resource) = serde_json::from_slice::<Value>(body) {
            response = response.with_resource(resource);
        }
    } else if let Some(message) = error_message(body) {
        response = response.with_message(message);
    }

    response
}

/// Maps a query response into a page, or an error for any non-success status.
pub fn query_page(
    link: &ContainerLink,
    status: u16,
    headers: &HeaderMap,
    body: &[u8],
) -> FeedResult<FeedPage<Value>> {
    match status {
        200 => {
            let parsed: QueryResponse = serde_json::from_slice(body)?;
            let mut page = FeedPage::new(parsed.documents)
                .with_request_charge(request_charge(headers))
                .with_continuation(header_str(headers, HEADER_CONTINUATION).map(str::to_string));
            if let Some(activity_id) = activity_id(headers) {
                page = page.with_activity_id(activity_id);
            }
            Ok(page)
        }
        404 => Err(FeedError::ContainerNotFound(link.container().to_string(), link.database().to_string())),
        401 | 403 => Err(FeedError::Connection(format!("query rejected ({status})"))),
        status => Err(FeedError::remote(status, error_message(body).unwrap_or_default())),
    }
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

fn request_charge(headers: &HeaderMap) -> f64 {
    header_str(headers, HEADER_REQUEST_CHARGE)
        .and_then(|value| value.parse().ok())
        .unwrap_or(0.0)
}

fn activity_id(headers: &HeaderMap) -> Option<Uuid> {
    header_str(headers, HEADER_ACTIVITY_ID).and_then(|value| Uuid::parse_str(value).ok())
}

fn error_message(body: &[u8]) -> Option<String> {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody { code, message }) => match (code, message) {
            (Some(code), Some(message)) => Some(format!("{code}: {message}")),
            (code, message) => message.or(code),
        },
        Err(_) => {
            let text = String::from_utf8_lossy(body).trim().to_string();
            (!text.is_empty()).then_some(text)
        }
    }
}

fn transport_error(err: reqwest::Error) -> FeedError {
    FeedError::Connection(err.to_string())
}

/// Opens [`RestBackend`]s from connection configuration.
#[derive(Debug, Clone)]
pub struct RestConnector {
    timeout: Duration,
    accept_invalid_certs: bool,
}

impl RestConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Accepts self-signed certificates, as served by a local emulator.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }
}

impl Default for RestConnector {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(30), accept_invalid_certs: false }
    }
}

#[async_trait]
impl BackendConnector for RestConnector {
    type Backend = RestBackend;

    async fn connect(&self, config: &ConnectionConfig) -> FeedResult<Self::Backend> {
        let key = MasterKey::from_base64(config.access_key())?;

        let user_agent = match config.application_name() {
            Some(name) => format!("feedlayer/{} {name}", env!("CARGO_PKG_VERSION")),
            None => format!("feedlayer/{}", env!("CARGO_PKG_VERSION")),
        };
        let http = HttpClient::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .user_agent(user_agent)
            .build()
            .map_err(|err| FeedError::Configuration(err.to_string()))?;

        let backend = RestBackend::new(http, config.endpoint().clone(), key);
        backend.probe(config.database()).await?;

        debug!(endpoint = %config.endpoint(), database = config.database(), "rest backend connected");
        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn link() -> ContainerLink {
        ContainerLink::new("shop", "products")
    }

    #[test]
    fn scoped_queries_send_the_partition_key() {
        let options = FeedOptions::new(Some(PartitionKey::new("books")))
            .with_max_item_count(50)
            .with_continuation(Some("+RID:abc".into()));

        assert_eq!(
            query_headers(&options),
            vec![
                (HEADER_IS_QUERY, "True".to_string()),
                (HEADER_MAX_ITEM_COUNT, "50".to_string()),
                (HEADER_PARTITION_KEY, r#"["books"]"#.to_string()),
                (HEADER_CONTINUATION, "+RID:abc".to_string()),
            ]
        );
    }

    #[test]
    fn unscoped_queries_fan_out() {
        let sent = query_headers(&FeedOptions::default());

        assert!(sent.contains(&(HEADER_CROSS_PARTITION, "True".to_string())));
        assert!(sent.contains(&(HEADER_MAX_ITEM_COUNT, "-1".to_string())));
        assert!(sent.iter().all(|(name, _)| *name != HEADER_PARTITION_KEY));
    }

    #[test]
    fn maps_query_pages() {
        let activity = Uuid::new_v4().to_string();
        let meta = headers(&[
            (HEADER_REQUEST_CHARGE, "2.79"),
            (HEADER_CONTINUATION, "next-page"),
            (HEADER_ACTIVITY_ID, activity.as_str()),
        ]);
        let body = json!({ "_rid": "x", "Documents": [{ "id": "p1" }, { "id": "p2" }], "_count": 2 });

        let page = query_page(&link(), 200, &meta, body.to_string().as_bytes()).unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.request_charge, 2.79);
        assert_eq!(page.continuation.as_deref(), Some("next-page"));
        assert_eq!(page.activity_id.map(|id| id.to_string()), Some(activity));
    }

    #[test]
    fn maps_query_failures() {
        let empty = HeaderMap::new();

        assert!(matches!(
            query_page(&link(), 404, &empty, b"{}"),
            Err(FeedError::ContainerNotFound(container, db)) if container == "products" && db == "shop"
        ));
        assert!(matches!(query_page(&link(), 403, &empty, b""), Err(FeedError::Connection(_))));

        let body = json!({ "code": "BadRequest", "message": "Syntax error near 'FORM'" }).to_string();
        match query_page(&link(), 400, &empty, body.as_bytes()) {
            Err(FeedError::Remote { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "BadRequest: Syntax error near 'FORM'");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn maps_point_responses() {
        let meta = headers(&[(HEADER_REQUEST_CHARGE, "6.1"), (HEADER_ETAG, "\"0000-1\"")]);
        let created = item_response(OperationKind::Upsert, 201, &meta, br#"{"id":"p1"}"#);

        assert_eq!(created.outcome, feedlayer_core::page::Outcome::Created);
        assert_eq!(created.request_charge, 6.1);
        assert_eq!(created.etag.as_deref(), Some("\"0000-1\""));
        assert_eq!(created.resource, Some(json!({ "id": "p1" })));

        let conflict = item_response(
            OperationKind::Create,
            409,
            &HeaderMap::new(),
            br#"{"code":"Conflict","message":"Entity with the specified id already exists"}"#,
        );
        assert_eq!(conflict.outcome, feedlayer_core::page::Outcome::Conflict);
        assert_eq!(conflict.resource, None);
        assert_eq!(
            conflict.message.as_deref(),
            Some("Conflict: Entity with the specified id already exists")
        );
    }
}
