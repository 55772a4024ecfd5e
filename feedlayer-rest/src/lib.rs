//! REST backend for feedlayer.
//!
//! Talks to a document service endpoint over HTTPS using master-key authentication:
//!
//! - [`auth`] - request signing and the `x-ms-date` format
//! - [`store`] - [`RestBackend`] and the [`RestConnector`] that opens it
//!
//! ```ignore
//! use feedlayer::{prelude::*, rest::RestConnector};
//!
//! let config = ConnectionConfig::from_section(&settings, "cosmos")?;
//! let client = Client::new(RestConnector::new(), config);
//! let mut orders = client.open::<Order>("orders", "customer-42").await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as feedlayer_rest;

pub mod auth;
pub mod store;

pub use auth::{MasterKey, ResourceType};
pub use store::{API_VERSION, RestBackend, RestConnector};
