//! Connection configuration.
//!
//! A [`ConnectionConfig`] names the service endpoint, the account access key, and the
//! database every container lookup is resolved against. It is usually read from a section of
//! an application settings document:
//!
//! ```ignore
//! let settings = serde_json::json!({
//!     "cosmos": {
//!         "uri": "https://localhost:8081/",
//!         "key": "C2y6yDjf5/R+ob0N8A7Cgv30VRDJIWEHLM+4QDU5DE2nQ9nDuVTqobD4b8mGGyPMbIZnqyMsEcaGQy67XIw/Jw==",
//!         "db": "catalog"
//!     }
//! });
//!
//! let config = ConnectionConfig::from_section(&settings, "cosmos")?;
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use url::Url;

use crate::error::{FeedError, FeedResult};

/// Endpoint, key and database used to reach a document service.
///
/// The configuration is immutable once built; clone it to derive a variant.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// Base URI of the service account.
    #[serde(alias = "uri")]
    endpoint: Url,
    /// Account access key (base64 master key for the REST backend).
    #[serde(alias = "key")]
    access_key: String,
    /// Name of the database containers are resolved in.
    #[serde(alias = "db", alias = "databaseName")]
    database: String,
    /// Optional application name sent along with every request.
    #[serde(default)]
    application_name: Option<String>,
}

impl ConnectionConfig {
    /// Creates and validates a new configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Configuration`] if the endpoint is not a valid URL or the key or
    /// database name is empty.
    pub fn new(
        endpoint: &str,
        access_key: impl Into<String>,
        database: impl Into<String>,
    ) -> FeedResult<Self> {
        let config = Self {
            endpoint: Url::parse(endpoint)?,
            access_key: access_key.into(),
            database: database.into(),
            application_name: None,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reads the configuration from a named section of a settings document.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Configuration`] if the section is missing, and a
    /// serialization or configuration error if its content is invalid.
    pub fn from_section(settings: &Value, section: &str) -> FeedResult<Self> {
        let section_value = settings
            .get(section)
            .ok_or_else(|| FeedError::Configuration(format!("missing section `{section}`")))?;

        let config: ConnectionConfig = serde_json::from_value(section_value.clone())?;
        config.validate()?;

        Ok(config)
    }

    /// Parses a configuration from a JSON object string.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for malformed JSON and a configuration error for
    /// missing values.
    pub fn from_json_str(json: &str) -> FeedResult<Self> {
        let config: ConnectionConfig = serde_json::from_str(json)?;
        config.validate()?;

        Ok(config)
    }

    /// Sets the application name reported to the service.
    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Returns the service endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Returns the account access key.
    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// Returns the database name.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns the application name, if one was configured.
    pub fn application_name(&self) -> Option<&str> {
        self.application_name.as_deref()
    }

    fn validate(&self) -> FeedResult<()> {
        if self.access_key.trim().is_empty() {
            return Err(FeedError::Configuration("access key must not be empty".into()));
        }
        if self.database.trim().is_empty() {
            return Err(FeedError::Configuration("database name must not be empty".into()));
        }

        Ok(())
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("endpoint", &self.endpoint.as_str())
            .field("access_key", &"..")
            .field("database", &self.database)
            .field("application_name", &self.application_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_aliased_section() {
        let settings = json!({
            "cosmos": { "uri": "https://example.documents.azure.com:443/", "key": "a2V5", "db": "shop" }
        });

        let config = ConnectionConfig::from_section(&settings, "cosmos").unwrap();

        assert_eq!(config.endpoint().host_str(), Some("example.documents.azure.com"));
        assert_eq!(config.access_key(), "a2V5");
        assert_eq!(config.database(), "shop");
        assert_eq!(config.application_name(), None);
    }

    #[test]
    fn reads_camel_case_json() {
        let config = ConnectionConfig::from_json_str(
            r#"{"endpoint":"https://localhost:8081/","accessKey":"a2V5","databaseName":"db","applicationName":"orders"}"#,
        )
        .unwrap();

        assert_eq!(config.database(), "db");
        assert_eq!(config.application_name(), Some("orders"));
    }

    #[test]
    fn debug_output_hides_the_access_key() {
        let config = ConnectionConfig::new("https://localhost:8081/", "c2VjcmV0LWtleQ==", "shop").unwrap();
        let printed = format!("{config:?}");

        assert!(!printed.contains("c2VjcmV0LWtleQ=="));
        assert!(printed.contains("shop"));
    }

    #[test]
    fn rejects_missing_section_and_empty_values() {
        let settings = json!({ "other": {} });
        assert!(matches!(
            ConnectionConfig::from_section(&settings, "cosmos"),
            Err(FeedError::Configuration(_))
        ));

        assert!(matches!(
            ConnectionConfig::new("https://localhost:8081/", "", "db"),
            Err(FeedError::Configuration(_))
        ));
        assert!(matches!(
            ConnectionConfig::new("not a url", "key", "db"),
            Err(FeedError::Configuration(_))
        ));
    }
}
