//! Response, paging and option types shared by every backend.
//!
//! This module provides:
//!
//! - [`Outcome`] - the single classification of service status codes
//! - [`ItemResponse`] - the answer to a point operation (read, upsert, create, delete)
//! - [`FeedPage`] - one page of query results with its charge and continuation token
//! - [`FeedOptions`] - the per-request options a query is sent with
//! - [`PaginationParams`] - 1-based page/size arithmetic for offset/limit paging

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::{FeedError, FeedResult},
    item::PartitionKey,
};

/// The kind of point operation a status code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Point read by ID.
    Read,
    /// Insert-or-replace.
    Upsert,
    /// Insert only.
    Create,
    /// Delete by ID.
    Delete,
    /// Query page.
    Query,
}

/// Classification of a service response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A new item was written.
    Created,
    /// An existing item was replaced.
    Replaced,
    /// A read, delete or query succeeded.
    Succeeded,
    /// The item or container does not exist.
    NotFound,
    /// The write collided with an existing item or unique key.
    Conflict,
    /// Any other status.
    OtherError(u16),
}

impl Outcome {
    /// Maps a status code to an outcome for the given operation.
    pub fn from_status(kind: OperationKind, status: u16) -> Self {
        match (kind, status) {
            (OperationKind::Upsert | OperationKind::Create, 201) => Outcome::Created,
            (OperationKind::Upsert, 200) => Outcome::Replaced,
            (OperationKind::Read | OperationKind::Query, 200) => Outcome::Succeeded,
            (OperationKind::Delete, 200 | 204) => Outcome::Succeeded,
            (_, 404) => Outcome::NotFound,
            (_, 409) => Outcome::Conflict,
            (_, status) => Outcome::OtherError(status),
        }
    }

    /// Returns `true` for `Created`, `Replaced` and `Succeeded`.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Created | Outcome::Replaced | Outcome::Succeeded)
    }
}

/// Response to a point operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemResponse {
    /// Status code reported by the service.
    pub status: u16,
    /// Status classification for the operation that produced this response.
    pub outcome: Outcome,
    /// Item body, when the service returned one.
    pub resource: Option<Value>,
    /// Request units consumed.
    pub request_charge: f64,
    /// Activity ID correlating the request with service logs.
    pub activity_id: Option<Uuid>,
    /// Entity tag of the item, when present.
    pub etag: Option<String>,
    /// Error message reported by the service for non-success statuses.
    pub message: Option<String>,
}

impl ItemResponse {
    /// Creates a response for `kind` with the given status and no body.
    pub fn new(kind: OperationKind, status: u16) -> Self {
        Self {
            status,
            outcome: Outcome::from_status(kind, status),
            resource: None,
            request_charge: 0.0,
            activity_id: None,
            etag: None,
            message: None,
        }
    }

    /// Sets the item body.
    pub fn with_resource(mut self, resource: Value) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Sets the request charge.
    pub fn with_request_charge(mut self, request_charge: f64) -> Self {
        self.request_charge = request_charge;
        self
    }

    /// Sets the activity ID.
    pub fn with_activity_id(mut self, activity_id: Uuid) -> Self {
        self.activity_id = Some(activity_id);
        self
    }

    /// Sets the entity tag.
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    /// Sets the service error message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Converts a non-success response into a [`FeedError::Remote`].
    pub fn into_remote_error(self) -> FeedError {
        let message = self
            .message
            .unwrap_or_else(|| format!("unexpected outcome {:?}", self.outcome));

        FeedError::remote(self.status, message)
    }
}

/// One page of query results.
///
/// The service signals that more pages exist by returning a continuation token.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPage<T> {
    /// Items on this page, in service order.
    pub items: Vec<T>,
    /// Request units consumed by this page.
    pub request_charge: f64,
    /// Token to resume after this page, `None` on the last page.
    pub continuation: Option<String>,
    /// Activity ID of the request that produced this page.
    pub activity_id: Option<Uuid>,
}

impl<T> FeedPage<T> {
    /// Creates a page with the given items and no continuation.
    pub fn new(items: Vec<T>) -> Self {
        Self { items, request_charge: 0.0, continuation: None, activity_id: None }
    }

    /// Sets the request charge.
    pub fn with_request_charge(mut self, request_charge: f64) -> Self {
        self.request_charge = request_charge;
        self
    }

    /// Sets the continuation token.
    pub fn with_continuation(mut self, continuation: Option<String>) -> Self {
        self.continuation = continuation;
        self
    }

    /// Sets the activity ID.
    pub fn with_activity_id(mut self, activity_id: Uuid) -> Self {
        self.activity_id = Some(activity_id);
        self
    }

    /// Returns `true` if the service reported more pages after this one.
    pub fn has_more_results(&self) -> bool {
        self.continuation.is_some()
    }

    /// Converts the items of this page, keeping the page metadata.
    pub fn try_map<U>(self, f: impl FnMut(T) -> FeedResult<U>) -> FeedResult<FeedPage<U>> {
        Ok(FeedPage {
            items: self.items.into_iter().map(f).collect::<FeedResult<Vec<U>>>()?,
            request_charge: self.request_charge,
            continuation: self.continuation,
            activity_id: self.activity_id,
        })
    }
}

impl<T> Default for FeedPage<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Options a query page request is sent with.
///
/// Count hints use `-1` for "service default".
#[derive(Debug, Clone, PartialEq)]
pub struct FeedOptions {
    /// Partition the query is scoped to; `None` fans out across partitions.
    pub partition_key: Option<PartitionKey>,
    /// Page-size hint.
    pub max_item_count: i32,
    /// Client-side buffering hint for cross-partition queries.
    pub max_buffered_item_count: i32,
    /// Parallelism hint for cross-partition queries.
    pub max_concurrency: i32,
    /// Token to resume from.
    pub continuation: Option<String>,
}

impl FeedOptions {
    /// Creates options scoped to `partition_key` with every hint at its default.
    pub fn new(partition_key: Option<PartitionKey>) -> Self {
        Self {
            partition_key,
            max_item_count: -1,
            max_buffered_item_count: -1,
            max_concurrency: -1,
            continuation: None,
        }
    }

    /// Sets the page-size hint.
    pub fn with_max_item_count(mut self, max_item_count: i32) -> Self {
        self.max_item_count = max_item_count;
        self
    }

    /// Sets the continuation token.
    pub fn with_continuation(mut self, continuation: Option<String>) -> Self {
        self.continuation = continuation;
        self
    }

    /// Returns `true` if the query must fan out across partitions.
    pub fn enable_cross_partition(&self) -> bool {
        self.partition_key.is_none()
    }
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Parameters for offset/limit paging. Pages are 1-indexed.
///
/// ```ignore
/// let params = PaginationParams::new(3, 20);
/// assert_eq!(params.offset(), 40);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PaginationParams {
    /// The page number (1-indexed).
    pub page: usize,
    /// Number of items per page.
    pub per_page: usize,
}

impl PaginationParams {
    /// Creates new pagination parameters.
    pub fn new(page: usize, per_page: usize) -> Self {
        Self { page, per_page }
    }

    /// Number of items to skip for this page. Page 0 is treated as page 1.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }

    /// Number of items to take for this page.
    pub fn limit(&self) -> usize {
        self.per_page
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self { page: 1, per_page: 10 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_statuses_per_operation() {
        assert_eq!(Outcome::from_status(OperationKind::Upsert, 201), Outcome::Created);
        assert_eq!(Outcome::from_status(OperationKind::Upsert, 200), Outcome::Replaced);
        assert_eq!(Outcome::from_status(OperationKind::Create, 200), Outcome::OtherError(200));
        assert_eq!(Outcome::from_status(OperationKind::Delete, 204), Outcome::Succeeded);
        assert_eq!(Outcome::from_status(OperationKind::Read, 404), Outcome::NotFound);
        assert_eq!(Outcome::from_status(OperationKind::Create, 409), Outcome::Conflict);
        assert_eq!(Outcome::from_status(OperationKind::Query, 429), Outcome::OtherError(429));
        assert!(!Outcome::Conflict.is_success());
    }

    #[test]
    fn pagination_offsets() {
        assert_eq!(PaginationParams::new(2, 10).offset(), 10);
        assert_eq!(PaginationParams::new(1, 5).offset(), 0);
        assert_eq!(PaginationParams::new(0, 5).offset(), 0);
        assert_eq!(PaginationParams::new(3, usize::MAX).offset(), usize::MAX);
    }

    #[test]
    fn remote_error_carries_status() {
        let err = ItemResponse::new(OperationKind::Upsert, 400)
            .with_message("bad partition key")
            .into_remote_error();

        assert_eq!(err.status(), Some(400));
        assert!(err.to_string().contains("bad partition key"));
    }
}
