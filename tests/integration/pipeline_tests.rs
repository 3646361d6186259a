//! Integration tests for the harvest pipeline
//!
//! Most tests drive the pipeline with an in-process fetcher and wrapper
//! stores; the last one runs a full harvest against a wiremock server into a
//! JSON snapshot on disk.

use async_trait::async_trait;
use ripple_harvest::config::{load_config, JsonDetailConfig, JsonListingConfig};
use ripple_harvest::crawler::{build_pipeline, FetchError, Fetcher, JsonDetailParser, JsonListingParser};
use ripple_harvest::storage::{
    JsonFileStore, MemorySnapshotStore, MemoryStaging, StorageError, StorageResult,
};
use ripple_harvest::{
    HarvestError, PageTask, Pipeline, PipelineSettings, RunStatus, Snapshot, SnapshotStore,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BASE: &str = "https://collection.test";

/// Serves canned bodies by absolute URL; anything else is a 404
struct StubFetcher {
    bodies: HashMap<String, String>,
}

impl StubFetcher {
    fn new(bodies: Vec<(String, String)>) -> Self {
        Self {
            bodies: bodies.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        self.bodies
            .get(url.as_str())
            .map(|body| body.clone().into_bytes())
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// Memory store whose first `failures` commits fail
struct FailingCommitStore {
    inner: MemorySnapshotStore,
    failures: usize,
    attempts: AtomicUsize,
}

impl FailingCommitStore {
    fn new(failures: usize) -> Self {
        Self {
            inner: MemorySnapshotStore::new(),
            failures,
            attempts: AtomicUsize::new(0),
        }
    }
}

impl SnapshotStore for FailingCommitStore {
    type Staging = MemoryStaging;

    fn load_snapshot(&self) -> StorageResult<Snapshot> {
        self.inner.load_snapshot()
    }

    fn write_staging(&self, snapshot: &Snapshot) -> StorageResult<MemoryStaging> {
        self.inner.write_staging(snapshot)
    }

    fn commit_staging(&self, staging: MemoryStaging) -> StorageResult<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(StorageError::Unavailable("commit refused".to_string()));
        }
        self.inner.commit_staging(staging)
    }

    fn describe(&self) -> String {
        "failing-memory".to_string()
    }
}

/// Memory store whose commits block the calling thread while `held` is set
struct GatedStore {
    inner: MemorySnapshotStore,
    held: AtomicBool,
}

impl SnapshotStore for GatedStore {
    type Staging = MemoryStaging;

    fn load_snapshot(&self) -> StorageResult<Snapshot> {
        self.inner.load_snapshot()
    }

    fn write_staging(&self, snapshot: &Snapshot) -> StorageResult<MemoryStaging> {
        self.inner.write_staging(snapshot)
    }

    fn commit_staging(&self, staging: MemoryStaging) -> StorageResult<()> {
        while self.held.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }
        self.inner.commit_staging(staging)
    }

    fn describe(&self) -> String {
        "gated-memory".to_string()
    }
}

/// Counts listing and detail fetches before delegating
struct CountingFetcher {
    inner: StubFetcher,
    listing_fetches: Arc<AtomicUsize>,
    detail_fetches: Arc<AtomicUsize>,
}

#[async_trait]
impl Fetcher for CountingFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        if url.path().starts_with("/items/") {
            self.detail_fetches.fetch_add(1, Ordering::SeqCst);
        } else {
            self.listing_fetches.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.fetch(url).await
    }
}

fn page_url(n: usize) -> String {
    format!("{}/list/{}", BASE, n)
}

/// Builds a paginated collection: page `n` lists `counts[n - 1]` items and
/// links to page `n + 1` unless it is the last one
fn collection(counts: &[usize]) -> Vec<(String, String)> {
    let mut bodies = Vec::new();
    let mut next_id = 1;

    for (index, count) in counts.iter().enumerate() {
        let page = index + 1;
        let items: Vec<String> = (0..*count)
            .map(|_| {
                let id = next_id;
                next_id += 1;
                bodies.push((
                    format!("{}/items/{}", BASE, id),
                    format!(r#"{{"title": "Item {}", "category": "news"}}"#, id),
                ));
                format!(
                    r#"{{"id": "item-{}", "url": "/items/{}", "summary": "Listed {}"}}"#,
                    id, id, id
                )
            })
            .collect();

        let next = if page < counts.len() {
            format!(r#""/list/{}""#, page + 1)
        } else {
            "null".to_string()
        };
        bodies.push((
            page_url(page),
            format!(r#"{{"items": [{}], "next": {}}}"#, items.join(", "), next),
        ));
    }

    bodies
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        poll_interval: Duration::from_millis(5),
        flush_interval: Duration::from_secs(30),
        ..PipelineSettings::default()
    }
}

fn pipeline<S: SnapshotStore + 'static>(
    bodies: Vec<(String, String)>,
    store: S,
    settings: PipelineSettings,
) -> Pipeline<S> {
    Pipeline::new(
        Arc::new(StubFetcher::new(bodies)),
        Arc::new(JsonListingParser::new(&JsonListingConfig::default())),
        Arc::new(JsonDetailParser::new(&JsonDetailConfig::default())),
        Arc::new(store),
        settings,
    )
}

fn seed() -> PageTask {
    PageTask::parse(&page_url(1)).unwrap()
}

fn sorted_keys(snapshot: &Snapshot) -> Vec<String> {
    let mut keys: Vec<String> = snapshot.records.iter().map(|r| r.key.clone()).collect();
    keys.sort();
    keys
}

#[tokio::test]
async fn test_three_page_collection() {
    let pipeline = pipeline(collection(&[2, 1, 0]), MemorySnapshotStore::new(), settings());

    let summary = pipeline.run(seed()).await;

    assert_eq!(summary.status, RunStatus::Completed);
    assert!(summary.error.is_none());
    assert_eq!(summary.pages_processed, 3);
    assert_eq!(summary.items_discovered, 3);
    assert_eq!(summary.items_processed, 3);
    assert_eq!(summary.records_persisted, 3);

    let snapshot = pipeline.store().snapshot();
    assert_eq!(sorted_keys(&snapshot), vec!["item-1", "item-2", "item-3"]);
    assert!(snapshot.updated_at.is_some());

    // Detail values win, listing-only values survive
    let record = snapshot.get("item-2").unwrap();
    assert_eq!(record.attributes.title.as_deref(), Some("Item 2"));
    assert_eq!(record.attributes.summary.as_deref(), Some("Listed 2"));
    assert_eq!(record.source_url, format!("{}/items/2", BASE));

    // One final flush for the whole run
    assert_eq!(pipeline.store().commits(), 1);
}

#[tokio::test]
async fn test_failed_item_is_skipped() {
    let bodies: Vec<(String, String)> = collection(&[3])
        .into_iter()
        .filter(|(url, _)| !url.ends_with("/items/2"))
        .collect();
    let pipeline = pipeline(bodies, MemorySnapshotStore::new(), settings());

    let summary = pipeline.run(seed()).await;

    assert!(summary.is_completed());
    assert_eq!(summary.items_discovered, 3);
    assert_eq!(summary.items_processed, 2);
    assert_eq!(summary.items_failed, 1);
    assert_eq!(
        sorted_keys(&pipeline.store().snapshot()),
        vec!["item-1", "item-3"]
    );
}

#[tokio::test]
async fn test_failed_final_commit_cancels_and_keeps_snapshot() {
    let pipeline = pipeline(collection(&[3]), FailingCommitStore::new(1), settings());

    let summary = pipeline.run(seed()).await;

    assert_eq!(summary.status, RunStatus::CancelledFatal);
    assert!(matches!(summary.error, Some(HarvestError::Storage(_))));
    assert_eq!(summary.records_persisted, 0);
    assert!(pipeline.store().inner.snapshot().is_empty());
    assert_eq!(pipeline.store().inner.commits(), 0);
}

#[tokio::test]
async fn test_failed_commit_is_retried_by_next_flush() {
    let pipeline = pipeline(
        collection(&[3]),
        FailingCommitStore::new(1),
        PipelineSettings {
            batch_size: 1,
            flush_interval: Duration::from_millis(20),
            max_flush_failures: 3,
            ..settings()
        },
    );

    let summary = pipeline.run(seed()).await;

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.records_persisted, 3);
    assert!(pipeline.store().attempts.load(Ordering::SeqCst) >= 2);
    assert_eq!(
        sorted_keys(&pipeline.store().inner.snapshot()),
        vec!["item-1", "item-2", "item-3"]
    );
}

#[tokio::test]
async fn test_empty_collection_never_touches_store() {
    let pipeline = pipeline(collection(&[0]), MemorySnapshotStore::new(), settings());

    let summary = pipeline.run(seed()).await;

    assert!(summary.is_completed());
    assert_eq!(summary.pages_processed, 1);
    assert_eq!(summary.records_persisted, 0);
    assert_eq!(pipeline.store().staging_writes(), 0);
    assert_eq!(pipeline.store().commits(), 0);
}

#[tokio::test]
async fn test_cyclic_next_link_terminates() {
    let bodies = vec![
        (
            page_url(1),
            r#"{"items": [{"id": "a", "url": "/items/a"}], "next": "/list/2"}"#.to_string(),
        ),
        (
            page_url(2),
            r#"{"items": [{"id": "b", "url": "/items/b"}], "next": "/list/1#again"}"#.to_string(),
        ),
        (format!("{}/items/a", BASE), r#"{"title": "A"}"#.to_string()),
        (format!("{}/items/b", BASE), r#"{"title": "B"}"#.to_string()),
    ];
    let pipeline = pipeline(bodies, MemorySnapshotStore::new(), settings());

    let summary = pipeline.run(seed()).await;

    assert!(summary.is_completed());
    assert_eq!(summary.pages_processed, 2);
    assert_eq!(summary.records_persisted, 2);
}

#[tokio::test]
async fn test_unauthorized_detail_cancels_run() {
    struct ForbiddenDetails(StubFetcher);

    #[async_trait]
    impl Fetcher for ForbiddenDetails {
        async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
            if url.path().starts_with("/items/") {
                return Err(FetchError::Unauthorized {
                    url: url.to_string(),
                    status: 401,
                });
            }
            self.0.fetch(url).await
        }
    }

    let pipeline = Pipeline::new(
        Arc::new(ForbiddenDetails(StubFetcher::new(collection(&[2, 2])))),
        Arc::new(JsonListingParser::new(&JsonListingConfig::default())),
        Arc::new(JsonDetailParser::new(&JsonDetailConfig::default())),
        Arc::new(MemorySnapshotStore::new()),
        settings(),
    );

    let summary = pipeline.run(seed()).await;

    assert_eq!(summary.status, RunStatus::CancelledFatal);
    assert!(matches!(
        summary.error,
        Some(HarvestError::Fetch(FetchError::Unauthorized { status: 401, .. }))
    ));
    assert!(pipeline.store().snapshot().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_backpressure_blocks_upstream_and_drops_nothing() {
    let listing_fetches = Arc::new(AtomicUsize::new(0));
    let detail_fetches = Arc::new(AtomicUsize::new(0));
    let fetcher = CountingFetcher {
        inner: StubFetcher::new(collection(&[2, 2, 2, 2, 2])),
        listing_fetches: Arc::clone(&listing_fetches),
        detail_fetches: Arc::clone(&detail_fetches),
    };
    let pipeline = Arc::new(Pipeline::new(
        Arc::new(fetcher),
        Arc::new(JsonListingParser::new(&JsonListingConfig::default())),
        Arc::new(JsonDetailParser::new(&JsonDetailConfig::default())),
        Arc::new(GatedStore {
            inner: MemorySnapshotStore::new(),
            held: AtomicBool::new(true),
        }),
        PipelineSettings {
            page_capacity: 1,
            item_capacity: 1,
            record_capacity: 1,
            batch_size: 1,
            ..settings()
        },
    ));

    let run = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.run_with_workers(seed(), 1, 2, 1).await })
    };

    // With the first commit held, every queue fills and upstream stalls
    tokio::time::sleep(Duration::from_millis(150)).await;
    let details_stalled = detail_fetches.load(Ordering::SeqCst);
    let listings_stalled = listing_fetches.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // One record committing, one queued, one held by each Detail worker
    assert!(details_stalled <= 4, "detail fetches: {}", details_stalled);
    assert!(listings_stalled < 5, "listing fetches: {}", listings_stalled);
    assert_eq!(detail_fetches.load(Ordering::SeqCst), details_stalled);
    assert_eq!(listing_fetches.load(Ordering::SeqCst), listings_stalled);
    assert!(!run.is_finished());

    pipeline.store().held.store(false, Ordering::SeqCst);
    let summary = run.await.unwrap();

    assert!(summary.is_completed());
    assert_eq!(listing_fetches.load(Ordering::SeqCst), 5);
    assert_eq!(detail_fetches.load(Ordering::SeqCst), 10);
    assert_eq!(summary.items_discovered, 10);
    assert_eq!(summary.records_persisted, 10);
    assert_eq!(pipeline.store().inner.snapshot().len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_counts_do_not_change_result() {
    let counts = [3, 0, 4, 1, 2];

    let single = pipeline(collection(&counts), MemorySnapshotStore::new(), settings());
    let single_summary = single.run_with_workers(seed(), 1, 1, 1).await;

    let many = pipeline(
        collection(&counts),
        MemorySnapshotStore::new(),
        PipelineSettings {
            batch_size: 2,
            ..settings()
        },
    );
    let many_summary = many.run_with_workers(seed(), 3, 6, 3).await;

    assert!(single_summary.is_completed());
    assert!(many_summary.is_completed());
    assert_eq!(single_summary.records_persisted, 10);
    assert_eq!(many_summary.records_persisted, 10);
    assert_eq!(
        sorted_keys(&single.store().snapshot()),
        sorted_keys(&many.store().snapshot())
    );
}

#[tokio::test]
async fn test_full_harvest_over_http() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/api/posts/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"data": [{"slug": "first", "link": "/api/post/first", "title": "Listed first"},
                         {"slug": "second", "link": "/api/post/second"}],
                "next": "/api/posts/2"}"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/posts/2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"data": [{"slug": "third", "link": "/api/post/third"}], "next": null}"#,
        ))
        .mount(&mock_server)
        .await;

    for slug in ["first", "second", "third"] {
        Mock::given(method("GET"))
            .and(path(format!("/api/post/{}", slug)))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"{{"post": {{"title": "Post {}", "author": "Ada", "tags": ["a", "b"]}}}}"#,
                slug
            )))
            .mount(&mock_server)
            .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let snapshot_path = dir.path().join("out").join("snapshot.json");
    let config_path = dir.path().join("harvest.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
[pipeline]
seed = "{base}/api/posts/1"
detail-workers = 2
poll-interval-ms = 10

[user-agent]
crawler-name = "TestHarvester"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[fetch]
max-retries = 0

[listing]
format = "json"
items-pointer = "/data"
key-field = "slug"
url-field = "link"

[detail]
format = "json"
root-pointer = "/post"

[output]
backend = "json"
snapshot-path = "{snapshot}"
"#,
            base = base_url,
            snapshot = snapshot_path.display()
        ),
    )
    .unwrap();

    let config = load_config(&config_path).unwrap();
    let pipeline = build_pipeline(&config).unwrap();

    let summary = pipeline.run(PageTask::parse(&config.pipeline.seed).unwrap()).await;

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.pages_processed, 2);
    assert_eq!(summary.records_persisted, 3);

    // Read back through a fresh store to check what actually hit the disk
    let store = JsonFileStore::new(&snapshot_path);
    let snapshot = store.load_snapshot().unwrap();
    assert_eq!(sorted_keys(&snapshot), vec!["first", "second", "third"]);

    let first = snapshot.get("first").unwrap();
    assert_eq!(first.attributes.title.as_deref(), Some("Post first"));
    assert_eq!(first.attributes.author.as_deref(), Some("Ada"));
    assert_eq!(first.attributes.tags, vec!["a", "b"]);
    assert_eq!(first.source_url, format!("{}/api/post/first", base_url));

    // No staging leftovers next to the committed snapshot
    let leftovers: Vec<_> = std::fs::read_dir(snapshot_path.parent().unwrap())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".staging"))
        .collect();
    assert!(leftovers.is_empty());
}
