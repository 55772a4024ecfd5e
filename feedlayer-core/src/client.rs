//! The client: owns the connection and opens query handles on containers.
//!
//! ```ignore
//! use feedlayer::{prelude::*, memory::InMemoryStore};
//!
//! let store = InMemoryStore::builder()
//!     .database("shop")
//!     .container("products", "/category")
//!     .build();
//!
//! let client = Client::new(store.connector(), store.connection_config()?);
//! let mut products = client.open::<Product>("products", "books").await?;
//!
//! products.save(&product).await?;
//! client.dispose().await?;
//! ```

use std::{
    fmt,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use mea::mutex::Mutex as AsyncMutex;
use tracing::debug;

use crate::{
    backend::{BackendConnector, ContainerLink, FeedBackend},
    config::ConnectionConfig,
    container::{Container, Query},
    error::{FeedError, FeedResult},
    item::{Item, ItemExt, PartitionKey},
    page::{FeedOptions, Outcome},
    query::SqlQuery,
};

/// An open connection shared by a client and every container handle it issued.
///
/// Once released, every handle sharing the connection fails with
/// [`FeedError::Disposed`].
#[derive(Debug)]
pub struct Connection<B: FeedBackend> {
    backend: B,
    released: AtomicBool,
}

impl<B: FeedBackend> Connection<B> {
    /// Wraps an open backend.
    pub fn new(backend: B) -> Self {
        Self { backend, released: AtomicBool::new(false) }
    }

    /// Returns the backend, or [`FeedError::Disposed`] once released.
    pub fn backend(&self) -> FeedResult<&B> {
        if self.is_released() {
            return Err(FeedError::Disposed("client connection"));
        }

        Ok(&self.backend)
    }

    /// Returns `true` once the connection has been released.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Releases the connection, shutting the backend down the first time only.
    ///
    /// Returns `true` if this call performed the release.
    pub async fn release(&self) -> FeedResult<bool> {
        if !self.mark_released() {
            return Ok(false);
        }

        self.backend.shutdown().await?;
        Ok(true)
    }

    fn mark_released(&self) -> bool {
        !self.released.swap(true, Ordering::AcqRel)
    }
}

struct ClientState<B: FeedBackend> {
    connection: Option<Arc<Connection<B>>>,
    container: Option<Container<B>>,
    request_charge: f64,
    disposed: bool,
}

/// Client for one database of a document service.
///
/// The connection is opened on the first [`Client::open`] and reused by later opens. Each
/// open replaces the client's current container; handles from earlier opens keep working
/// until the client is disposed.
pub struct Client<C: BackendConnector> {
    config: ConnectionConfig,
    connector: C,
    state: Mutex<ClientState<C::Backend>>,
    connect_gate: AsyncMutex<()>,
}

impl<C: BackendConnector> Client<C> {
    /// Creates a client. No connection is made until the first [`Client::open`].
    pub fn new(connector: C, config: ConnectionConfig) -> Self {
        Self {
            config,
            connector,
            state: Mutex::new(ClientState {
                connection: None,
                container: None,
                request_charge: 0.0,
                disposed: false,
            }),
            connect_gate: AsyncMutex::new(()),
        }
    }

    /// Returns the configuration this client connects with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Opens `container` in the configured database and returns a query handle scoped to
    /// `partition_key` (empty for no partition scoping).
    ///
    /// # Errors
    ///
    /// - [`FeedError::Connection`] if the service cannot be reached or rejects the key
    /// - [`FeedError::ContainerNotFound`] if the container does not exist
    /// - [`FeedError::Disposed`] if the client was disposed
    pub async fn open<T: Item>(
        &self,
        container: &str,
        partition_key: &str,
    ) -> FeedResult<Query<T, C::Backend>> {
        let connection = self.connection().await?;
        let link = ContainerLink::new(self.config.database(), container);
        let properties = connection
            .backend()?
            .read_container(&link)
            .await?;

        debug!(
            container = %link,
            partition_key_path = properties.partition_key_path().unwrap_or(""),
            "opened container"
        );

        let container = Container::new(connection, link, properties);
        self.with_state(|state| {
            if state.disposed {
                return Err(FeedError::Disposed("client"));
            }
            state.container = Some(container.clone());
            Ok(())
        })?;

        Ok(Query::new(container, partition_key))
    }

    /// Returns a new query handle on the current container.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Configuration`] if no container has been opened yet, and
    /// [`FeedError::Disposed`] after disposal.
    pub fn query<T: Item>(&self, partition_key: &str) -> FeedResult<Query<T, C::Backend>> {
        Ok(Query::new(self.current_container()?, partition_key))
    }

    /// Upserts an item into the current container under `partition_key`.
    ///
    /// Returns `true` if the item was created or replaced, `false` on a conflict.
    pub async fn set<T: Item>(&self, item: &T, partition_key: &str) -> FeedResult<bool> {
        let container = self.current_container()?;
        let response = container
            .upsert_item(PartitionKey::scope(partition_key).as_ref(), item.to_json()?)
            .await?;

        self.add_request_charge(response.request_charge);

        match response.outcome {
            Outcome::Created | Outcome::Replaced => Ok(true),
            Outcome::Conflict => Ok(false),
            Outcome::NotFound => Err(container.not_found()),
            _ => Err(response.into_remote_error()),
        }
    }

    /// Runs a scalar count query (such as `SELECT VALUE COUNT(1) FROM c`) across all
    /// partitions of the current container and returns the first value of the first page.
    ///
    /// An empty first page counts as zero.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Serialization`] if the first value is not a non-negative integer.
    pub async fn count(&self, query: impl Into<SqlQuery>) -> FeedResult<u64> {
        let container = self.current_container()?;
        let page = container
            .query_page(&query.into(), &FeedOptions::default())
            .await?;

        self.add_request_charge(page.request_charge);

        match page.items.first() {
            None => Ok(0),
            Some(value) => value.as_u64().ok_or_else(|| {
                FeedError::Serialization(format!("count query returned {value} instead of a number"))
            }),
        }
    }

    /// Total request units consumed by client-level calls ([`Client::set`],
    /// [`Client::count`]).
    pub fn request_charge(&self) -> f64 {
        self.with_state(|state| state.request_charge)
    }

    /// Returns the link of the container most recently opened.
    pub fn current_container_link(&self) -> Option<ContainerLink> {
        self.with_state(|state| state.container.as_ref().map(|c| c.link().clone()))
    }

    /// Releases the connection. Safe to call more than once; only the first call shuts the
    /// backend down.
    pub async fn dispose(&self) -> FeedResult<()> {
        // Waits for a connect in flight so its connection is released here.
        let _gate = self.connect_gate.lock().await;

        let connection = self.with_state(|state| {
            state.disposed = true;
            state.container = None;
            state.connection.take()
        });

        if let Some(connection) = connection {
            if connection.release().await? {
                debug!(database = self.config.database(), "client disposed");
            }
        }

        Ok(())
    }

    /// Returns `true` once [`Client::dispose`] has been called.
    pub fn is_disposed(&self) -> bool {
        self.with_state(|state| state.disposed)
    }

    async fn connection(&self) -> FeedResult<Arc<Connection<C::Backend>>> {
        let _gate = self.connect_gate.lock().await;

        let existing = self.with_state(|state| {
            if state.disposed {
                return Err(FeedError::Disposed("client"));
            }
            Ok(state.connection.clone())
        })?;

        if let Some(connection) = existing {
            return Ok(connection);
        }

        let backend = self.connector.connect(&self.config).await?;
        let connection = Arc::new(Connection::new(backend));

        let disposed = self.with_state(|state| {
            if !state.disposed {
                state.connection = Some(connection.clone());
            }
            state.disposed
        });

        if disposed {
            connection.release().await?;
            return Err(FeedError::Disposed("client"));
        }

        debug!(endpoint = %self.config.endpoint(), database = self.config.database(), "connected");
        Ok(connection)
    }

    fn current_container(&self) -> FeedResult<Container<C::Backend>> {
        self.with_state(|state| {
            if state.disposed {
                return Err(FeedError::Disposed("client"));
            }

            state
                .container
                .clone()
                .ok_or_else(|| FeedError::Configuration("no container has been opened".into()))
        })
    }

    fn add_request_charge(&self, charge: f64) {
        self.with_state(|state| state.request_charge += charge);
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ClientState<C::Backend>) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

impl<C: BackendConnector> fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.config.endpoint().as_str())
            .field("database", &self.config.database())
            .field("container", &self.current_container_link())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl<C: BackendConnector> Drop for Client<C> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);

        if let Some(connection) = state.connection.take() {
            if connection.mark_released() {
                debug!(database = self.config.database(), "client dropped without dispose");
            }
        }
    }
}
