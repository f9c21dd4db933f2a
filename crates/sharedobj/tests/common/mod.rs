#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use sharedobj::{Config, SharedObject};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Route `tracing` output through the test harness; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A segment name no other test (or test process) uses.
pub fn unique_name(tag: &str) -> String {
    format!(
        "sotest_{}_{}_{}",
        tag,
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

pub fn named(tag: &str) -> Config {
    Config::default().with_name(unique_name(tag))
}

pub fn attach(name: &str) -> sharedobj::Result<SharedObject> {
    SharedObject::attach(name)
}
