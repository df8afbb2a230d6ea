//! Multi-threaded end-to-end scenarios exercising the public API the way
//! separate attached processes would.

mod end_to_end;

use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};

static TEST_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn unique_queue_name(tag: &str) -> String {
    format!(
        "relmq-e2e-{}-{}-{}",
        tag,
        process::id(),
        TEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
    )
}
