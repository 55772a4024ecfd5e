use feedlayer::{
    Item,
    memory::{ContainerDefinition, DEFAULT_ENDPOINT, InMemoryStore},
    prelude::*,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Item)]
struct Product {
    id: String,
    #[item(partition_key)]
    category: String,
    sku: String,
    price: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
}

impl Product {
    fn new(id: &str, category: &str, price: f64) -> Self {
        Self {
            id: id.to_string(),
            category: category.to_string(),
            sku: format!("sku-{id}"),
            price,
            tags: Vec::new(),
        }
    }

    fn tagged(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|tag| tag.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Item)]
struct Listing {
    #[item(id)]
    code: String,
    #[item(partition_key)]
    region: Option<String>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("feedlayer_core=debug,feedlayer_memory=debug"))
        .with_test_writer()
        .try_init();
}

fn store() -> InMemoryStore {
    InMemoryStore::builder()
        .database("shop")
        .container_definition(ContainerDefinition::new("products", "/category").with_unique_key("/sku"))
        .page_size(2)
        .build()
}

fn client(store: &InMemoryStore) -> Client<feedlayer::memory::InMemoryConnector> {
    Client::new(store.connector(), store.connection_config().unwrap())
}

async fn seed(books: &mut Query<Product, InMemoryStore>) {
    for (id, price, tags) in [
        ("b1", 30.0, vec!["fiction"]),
        ("b2", 10.0, vec!["fiction", "classic"]),
        ("b3", 25.0, vec![]),
        ("b4", 5.0, vec!["reference"]),
        ("b5", 15.0, vec!["classic"]),
    ] {
        let product = Product::new(id, "books", price).tagged(&tags);
        assert!(books.save(&product).await.unwrap());
    }
}

#[test]
fn derive_uses_marked_fields() {
    let product = Product::new("p1", "books", 1.0);
    assert_eq!(product.id(), "p1");
    assert_eq!(product.partition_key(), Some("books"));

    let listing = Listing { code: "L-7".into(), region: None };
    assert_eq!(listing.id(), "L-7");
    assert_eq!(listing.partition_key(), None);

    let scoped = Listing { code: "L-8".into(), region: Some("emea".into()) };
    assert_eq!(scoped.partition_key(), Some("emea"));
}

#[tokio::test]
async fn saved_items_read_back_under_their_partition() {
    init_tracing();
    let store = store();
    let client = client(&store);

    let mut books = client.open::<Product>("products", "books").await.unwrap();
    let product = Product::new("p1", "books", 12.5).tagged(&["new"]);

    assert!(books.save(&product).await.unwrap());
    assert_eq!(books.request_charge(), 5.0);

    let read = books.get_by_id("p1").await.unwrap();
    assert_eq!(read, product);
    assert_eq!(books.request_charge(), 1.0);

    let mut raw = books.with_type::<serde_json::Value>();
    let stored = raw.get_by_id("p1").await.unwrap();
    assert!(stored.get("_etag").is_some());
    assert!(stored.get("_ts").is_some());
}

#[tokio::test]
async fn deleted_items_are_no_longer_found() {
    let store = store();
    let client = client(&store);
    let mut books = client.open::<Product>("products", "books").await.unwrap();

    books.save(&Product::new("p1", "books", 1.0)).await.unwrap();
    books.delete("p1").await.unwrap();

    assert!(matches!(books.get_by_id("p1").await, Err(FeedError::ItemNotFound(id, _)) if id == "p1"));
    assert!(matches!(books.delete("p1").await, Err(FeedError::ItemNotFound(..))));
    assert_eq!(store.item_count("shop", "products").await, Some(0));
}

#[tokio::test]
async fn create_reports_existing_items_and_save_reports_unique_key_conflicts() {
    let store = store();
    let client = client(&store);
    let mut books = client.open::<Product>("products", "books").await.unwrap();

    assert!(books.create(&Product::new("p1", "books", 1.0)).await.unwrap());
    assert!(!books.create(&Product::new("p1", "books", 2.0)).await.unwrap());

    let mut duplicate_sku = Product::new("p2", "books", 3.0);
    duplicate_sku.sku = "sku-p1".into();
    assert!(!books.save(&duplicate_sku).await.unwrap());

    assert_eq!(books.get_by_id("p1").await.unwrap().price, 1.0);
}

#[tokio::test]
async fn items_outside_the_bound_partition_are_rejected() {
    let store = store();
    let client = client(&store);
    let mut books = client.open::<Product>("products", "books").await.unwrap();

    let err = books.save(&Product::new("g1", "games", 1.0)).await.unwrap_err();
    assert_eq!(err.status(), Some(400));
}

#[tokio::test]
async fn filters_select_and_sort_within_the_partition() {
    let store = store();
    let client = client(&store);
    let mut books = client.open::<Product>("products", "books").await.unwrap();
    seed(&mut books).await;
    client.set(&Product::new("g1", "games", 1.0), "games").await.unwrap();

    let cheap = books
        .get_all_where(
            Select::builder()
                .filter(Filter::lt("price", 20))
                .sort("price", SortDirection::Asc)
                .build(),
        )
        .await
        .unwrap();
    let ids: Vec<_> = cheap.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["b4", "b2", "b5"]);

    let classics = books.get_all_where(Filter::contains("tags", "classic")).await.unwrap();
    assert_eq!(classics.len(), 2);

    let not_fiction = books
        .get_all_where(Filter::not_contains("tags", "fiction"))
        .await
        .unwrap();
    let mut ids: Vec<_> = not_fiction.iter().map(|p| p.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, ["b3", "b4", "b5"]);

    let picked = books
        .get_all_where(Filter::any_of("id", vec!["b1", "b5", "g1"]))
        .await
        .unwrap();
    assert_eq!(picked.len(), 2);

    let first = books
        .get_one(Filter::gt("price", 20).and(Filter::exists("tags")))
        .await
        .unwrap();
    assert_eq!(first.map(|p| p.id), Some("b1".to_string()));
    assert!(books.get_one(Filter::gt("price", 100)).await.unwrap().is_none());
}

#[tokio::test]
async fn pages_are_fetched_with_offset_and_limit() {
    let store = store();
    let client = client(&store);
    let mut books = client.open::<Product>("products", "books").await.unwrap();
    seed(&mut books).await;

    let page = books
        .get_page("SELECT * FROM c ORDER BY c.price", 2, 2)
        .await
        .unwrap();
    let ids: Vec<_> = page.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["b5", "b3"]);
    assert_eq!(books.request_charge(), 3.0);

    let last = books
        .get_page("SELECT * FROM c ORDER BY c.price", 3, 2)
        .await
        .unwrap();
    assert_eq!(last.len(), 1);
}

#[tokio::test]
async fn bounded_drains_resume_where_they_stopped() {
    let store = store();
    let client = client(&store);
    let mut books = client
        .open::<Product>("products", "books")
        .await
        .unwrap()
        .with_max_items(3);
    seed(&mut books).await;

    let first = books.get_all("SELECT * FROM c").await.unwrap();
    assert_eq!(first.len(), 4);
    assert_eq!(books.request_charge(), 6.0);
    assert!(books.continuation().is_some());

    let rest = books.get_all("SELECT * FROM c").await.unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].id, "b5");
    assert!(books.continuation().is_none());

    books.reset();
    assert_eq!(books.get_all("SELECT * FROM c").await.unwrap().len(), 4);
}

#[tokio::test]
async fn count_spans_every_partition() {
    let store = store();
    let client = client(&store);
    let mut books = client.open::<Product>("products", "books").await.unwrap();
    seed(&mut books).await;

    assert!(client.set(&Product::new("g1", "games", 1.0), "games").await.unwrap());
    assert_eq!(client.request_charge(), 5.0);

    assert_eq!(client.count("SELECT VALUE COUNT(1) FROM c").await.unwrap(), 6);
    assert_eq!(
        client
            .count(SqlQuery::new("SELECT VALUE COUNT(1) FROM c WHERE c.price > @min").with_parameter("min", 12))
            .await
            .unwrap(),
        3
    );
}

#[tokio::test]
async fn missing_containers_and_bad_credentials_fail_to_open() {
    let store = store();
    let client = client(&store);

    assert!(matches!(
        client.open::<Product>("orders", "").await,
        Err(FeedError::ContainerNotFound(container, database)) if container == "orders" && database == "shop"
    ));

    let config = ConnectionConfig::new(DEFAULT_ENDPOINT, "d3Jvbmcga2V5", "shop").unwrap();
    let rejected = Client::new(store.connector(), config);
    assert!(matches!(
        rejected.open::<Product>("products", "").await,
        Err(FeedError::Connection(_))
    ));
    assert_eq!(store.connection_count(), 1);
}

#[tokio::test]
async fn dispose_releases_the_connection_once() {
    let store = store();
    let client = client(&store);
    let mut books = client.open::<Product>("products", "books").await.unwrap();

    client.dispose().await.unwrap();
    client.dispose().await.unwrap();

    assert_eq!(store.shutdown_count(), 1);
    assert!(client.is_disposed());
    assert!(books.is_disposed());
    assert!(matches!(books.get_all("SELECT * FROM c").await, Err(FeedError::Disposed(_))));
    assert!(matches!(client.open::<Product>("products", "").await, Err(FeedError::Disposed(_))));
}

#[tokio::test]
async fn get_one_then_draining_the_same_filter_returns_everything() {
    let store = store();
    let client = client(&store);
    let mut books = client.open::<Product>("products", "books").await.unwrap();
    seed(&mut books).await;

    let first = books.get_one(Filter::gt("price", 0)).await.unwrap();
    assert_eq!(first.map(|p| p.id), Some("b1".to_string()));
    assert!(books.continuation().is_some());

    let all = books.get_all_where(Filter::gt("price", 0)).await.unwrap();
    assert_eq!(all.len(), 5);
}
