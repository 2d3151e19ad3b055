//! Test helpers - temporary databases with automatic cleanup
//!
//! Available to this crate's unit tests and, through the `testing` feature,
//! to other crates' tests.

use crate::engine::{EngineOptions, StorageEngine};
use crate::executor::QueryExecutor;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Collection used when a test does not name one
pub const DEFAULT_TEST_COLLECTION: &str = "test";

/// A storage engine over a unique temporary directory
///
/// The directory is removed when the context is dropped.
///
/// ```rust,no_run
/// use strand_core::testing::TestContext;
///
/// # async fn example() {
/// let ctx = TestContext::with_collection("docs").await;
/// let response = ctx.executor().execute(r#"CREATE { "a" = [] };"#).await;
/// assert!(response.success);
/// # }
/// ```
pub struct TestContext {
    temp_dir: TempDir,
    engine: Arc<StorageEngine>,
    collection: String,
}

impl TestContext {
    /// Empty database, no collections
    pub async fn new() -> Self {
        Self::open(EngineOptions::default(), None).await
    }

    /// Database holding one collection named `name`
    pub async fn with_collection(name: &str) -> Self {
        Self::open(EngineOptions::default(), Some(name)).await
    }

    /// Database with custom engine options and the default test collection
    pub async fn with_options(options: EngineOptions) -> Self {
        Self::open(options, Some(DEFAULT_TEST_COLLECTION)).await
    }

    async fn open(options: EngineOptions, collection: Option<&str>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temporary directory");
        let engine = StorageEngine::open(temp_dir.path(), options)
            .await
            .expect("Failed to open storage engine");
        if let Some(name) = collection {
            engine
                .create_collection(name)
                .await
                .expect("Failed to create test collection");
        }
        Self {
            temp_dir,
            engine: Arc::new(engine),
            collection: collection.unwrap_or(DEFAULT_TEST_COLLECTION).to_string(),
        }
    }

    /// Database directory
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn engine(&self) -> Arc<StorageEngine> {
        self.engine.clone()
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Executor bound to the context's collection
    pub fn executor(&self) -> QueryExecutor {
        QueryExecutor::new(self.engine(), self.collection.clone())
    }

    /// A second engine over the same directory, as after a restart
    pub async fn reopen(&self) -> StorageEngine {
        StorageEngine::open(self.path(), self.engine.options())
            .await
            .expect("Failed to reopen storage engine")
    }
}
