//! Core traits and types for item representation and serialization.
//!
//! Items travel to and from the service as JSON. Any serde type can be an item as long as it
//! exposes its identifier; the partition key is optional because the bound [`Query`]
//! supplies one for every call.
//!
//! [`Query`]: crate::container::Query

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, to_value};
use std::fmt;

use crate::error::{FeedError, FeedResult};

/// Core trait that all items stored in a container must implement.
///
/// # Example
///
/// ```ignore
/// use feedlayer::item::Item;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct Product {
///     pub id: String,
///     pub category: String,
///     pub name: String,
/// }
///
/// impl Item for Product {
///     fn id(&self) -> &str {
///         &self.id
///     }
///
///     fn partition_key(&self) -> Option<&str> {
///         Some(&self.category)
///     }
/// }
/// ```
///
/// `#[derive(Item)]` from the `feedlayer` crate generates the same implementation from
/// `#[item(id)]` and `#[item(partition_key)]` field attributes.
pub trait Item: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Returns the item's identifier, unique within its logical partition.
    fn id(&self) -> &str;

    /// Returns the value of the field the container is partitioned on, if the item has one.
    fn partition_key(&self) -> Option<&str> {
        None
    }
}

/// Untyped items, for reading documents whose shape is not known up front
/// (including system properties such as `_ts` and `_etag`).
impl Item for Value {
    fn id(&self) -> &str {
        self.get("id").and_then(Value::as_str).unwrap_or_default()
    }
}

/// Extension trait providing JSON conversion for items.
///
/// Automatically implemented for every [`Item`].
pub trait ItemExt: Item {
    /// Converts this item to a JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the item does not serialize to an object.
    fn to_json(&self) -> FeedResult<Value>;

    /// Creates an item from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    fn from_json(value: Value) -> FeedResult<Self>;
}

impl<I: Item> ItemExt for I {
    fn to_json(&self) -> FeedResult<Value> {
        let value = to_value(self)?;

        if !value.is_object() {
            return Err(FeedError::Serialization(format!(
                "item {} did not serialize to a JSON object",
                self.id()
            )));
        }

        Ok(value)
    }

    fn from_json(value: Value) -> FeedResult<Self> {
        Ok(from_value(value)?)
    }
}

/// A partition key value.
///
/// An empty key means "no partition scoping"; use [`PartitionKey::scope`] to turn the
/// caller-supplied string into the optional key sent with each request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Creates a partition key from any string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns `None` for an empty key, otherwise the key.
    pub fn scope(value: &str) -> Option<Self> {
        if value.is_empty() { None } else { Some(Self::new(value)) }
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encodes the key the way the service expects it in request headers: a JSON array
    /// holding the single key value.
    pub fn to_header_value(&self) -> String {
        Value::Array(vec![Value::String(self.0.clone())]).to_string()
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartitionKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PartitionKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Reads the value found at a partition key path such as `/address/city`.
///
/// Returns `None` if any segment is missing.
pub fn value_at_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .try_fold(document, |current, segment| current.get(segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: String,
        owner: String,
    }

    impl Item for Note {
        fn id(&self) -> &str {
            &self.id
        }
    }

    #[test]
    fn empty_partition_key_means_unscoped() {
        assert_eq!(PartitionKey::scope(""), None);
        assert_eq!(PartitionKey::scope("eu").map(|pk| pk.to_header_value()), Some(r#"["eu"]"#.to_string()));
    }

    #[test]
    fn resolves_nested_partition_paths() {
        let doc = json!({ "id": "1", "address": { "city": "Oslo" } });

        assert_eq!(value_at_path(&doc, "/address/city"), Some(&json!("Oslo")));
        assert_eq!(value_at_path(&doc, "/address/zip"), None);
    }

    #[test]
    fn items_convert_through_json() {
        let note = Note { id: "n1".into(), owner: "ada".into() };
        let value = note.to_json().unwrap();

        assert_eq!(value["owner"], "ada");
        assert_eq!(Note::from_json(value).unwrap(), note);
    }

    #[test]
    fn json_values_are_items() {
        assert_eq!(json!({ "id": "n1" }).id(), "n1");
        assert_eq!(json!({ "id": 7 }).id(), "");
    }
}
