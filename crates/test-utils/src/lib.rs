pub mod builders;
pub mod fake_executor;
pub mod fake_processor;

use std::sync::{Arc, Once};

use conductor::exec::ExecContext;
use conductor::registry::ModuleRegistry;
use conductor::store::{MemoryEntityDirectory, MemoryResultStore};
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Context over an in-memory store; the store handle is returned too so
/// tests can inspect statuses directly.
pub fn memory_context(
    registry: ModuleRegistry,
    entities: MemoryEntityDirectory,
) -> (ExecContext, Arc<MemoryResultStore>) {
    let store = Arc::new(MemoryResultStore::new());
    let ctx = ExecContext::new(Arc::new(registry), store.clone(), Arc::new(entities));
    (ctx, store)
}

/// Directory with a single sample `s1`.
pub fn single_sample() -> MemoryEntityDirectory {
    let mut entities = MemoryEntityDirectory::new();
    entities.add_sample("s1");
    entities
}

/// Owned module names for `conduct` / `prepare_run` requests.
pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
