//! Master-key request signing.
//!
//! Every request carries an `authorization` header holding a URL-encoded
//! `type=master&ver=1.0&sig=<signature>` token, where the signature is the base64 HMAC-SHA256
//! of
//!
//! ```text
//! {verb}\n{resource type}\n{resource link}\n{date}\n\n
//! ```
//!
//! keyed with the base64-decoded account key. Verb, resource type and date are lowercased;
//! the resource link keeps its case.

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use url::form_urlencoded;

use feedlayer_core::error::{FeedError, FeedResult};

type HmacSha256 = Hmac<Sha256>;

/// Kind of resource a request addresses, as named in the signed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Database,
    Container,
    Item,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Database => "dbs",
            ResourceType::Container => "colls",
            ResourceType::Item => "docs",
        }
    }
}

/// A decoded account key.
#[derive(Clone)]
pub struct MasterKey {
    key: Vec<u8>,
}

impl MasterKey {
    /// Decodes a base64 account key.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Configuration`] if the key is not valid base64.
    pub fn from_base64(key: &str) -> FeedResult<Self> {
        let key = STANDARD
            .decode(key.trim())
            .map_err(|err| FeedError::Configuration(format!("access key is not valid base64: {err}")))?;

        Ok(Self { key })
    }

    /// Builds the `authorization` header value for one request.
    pub fn authorization(
        &self,
        verb: &str,
        resource_type: ResourceType,
        resource_link: &str,
        date: &str,
    ) -> FeedResult<String> {
        let payload = format!(
            "{}\n{}\n{}\n{}\n\n",
            verb.to_lowercase(),
            resource_type.as_str(),
            resource_link,
            date.to_lowercase(),
        );

        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|err| FeedError::Configuration(format!("unusable access key: {err}")))?;
        mac.update(payload.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        let token = format!("type=master&ver=1.0&sig={signature}");
        Ok(form_urlencoded::byte_serialize(token.as_bytes()).collect())
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Formats a timestamp the way the `x-ms-date` header expects (RFC 1123, GMT).
pub fn rfc1123(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const KEY: &str = "C2y6yDjf5/R+ob0N8A7Cgv30VRDJIWEHLM+4QDU5DE2nQ9nDuVTqobD4b8mGGyPMbIZnqyMsEcaGQy67XIw/Jw==";
    const DATE: &str = "Thu, 27 Apr 2017 00:51:12 GMT";

    fn decode(token: &str) -> String {
        form_urlencoded::parse(token.as_bytes())
            .next()
            .map(|(decoded, _)| decoded.into_owned())
            .unwrap()
    }

    #[test]
    fn formats_dates_as_rfc1123() {
        let time = Utc.with_ymd_and_hms(2017, 4, 27, 0, 51, 12).unwrap();
        assert_eq!(rfc1123(time), DATE);
    }

    #[test]
    fn authorization_is_an_encoded_master_token() {
        let key = MasterKey::from_base64(KEY).unwrap();
        let token = key
            .authorization("GET", ResourceType::Item, "dbs/shop/colls/products/docs/p1", DATE)
            .unwrap();

        assert!(token.starts_with("type%3Dmaster%26ver%3D1.0%26sig%3D"));

        let decoded = decode(&token);
        let signature = decoded.strip_prefix("type=master&ver=1.0&sig=").unwrap();
        assert_eq!(STANDARD.decode(signature).unwrap().len(), 32);
    }

    #[test]
    fn signature_covers_verb_resource_and_date() {
        let key = MasterKey::from_base64(KEY).unwrap();
        let sign = |verb: &str, link: &str, date: &str| {
            key.authorization(verb, ResourceType::Item, link, date)
                .unwrap()
        };

        let base = sign("GET", "dbs/shop/colls/products/docs/p1", DATE);
        assert_eq!(base, sign("get", "dbs/shop/colls/products/docs/p1", &DATE.to_uppercase()));
        assert_ne!(base, sign("DELETE", "dbs/shop/colls/products/docs/p1", DATE));
        assert_ne!(base, sign("GET", "dbs/shop/colls/products/docs/P1", DATE));
        assert_ne!(base, sign("GET", "dbs/shop/colls/products/docs/p1", "Fri, 28 Apr 2017 00:51:12 GMT"));
    }

    #[test]
    fn rejects_keys_that_are_not_base64() {
        assert!(matches!(MasterKey::from_base64("not base64!"), Err(FeedError::Configuration(_))));
    }
}
