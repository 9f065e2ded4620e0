//! Cooperative scheduler shim for large scans and decodes.
//!
//! Message builds and decodes can touch tens of thousands of commits; doing
//! that in one uninterrupted burst starves everything else sharing the
//! runtime. The two entry points here process an entire input while
//! yielding to the scheduler after bounded chunks of work, so the only
//! suspension points a caller observes are *between* items — never inside a
//! filter insertion, a commit construction, or an upgrade step.
//!
//! Cancellation falls out of the model: dropping the returned future at a
//! yield point abandons the remaining work, and whatever partial state the
//! body accumulated goes with it.

use tracing::trace;

/// How urgently a cooperative task wants the runtime back.
///
/// Priorities only bias the chunk size between yields; they are not a
/// scheduling queue.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    const fn chunk_size(self) -> usize {
        match self {
            Self::High => 256,
            Self::Normal => 64,
            Self::Low => 16,
        }
    }
}

/// Run `body` over every item, yielding between chunks.
///
/// Returns once the entire input is processed. With `yield_often` the task
/// yields after every single item; otherwise after a priority-sized chunk.
pub async fn for_each<I, F>(items: I, mut body: F, priority: Priority, label: &str, yield_often: bool)
where
    I: IntoIterator,
    F: FnMut(I::Item),
{
    let chunk = if yield_often { 1 } else { priority.chunk_size() };
    let mut processed = 0_usize;

    for item in items {
        body(item);
        processed += 1;
        if processed % chunk == 0 {
            tokio::task::yield_now().await;
        }
    }

    trace!(label, processed, "cooperative task drained");
}

/// Map every item through `body`, yielding between chunks, and collect the
/// results. Returns once the entire input is processed.
pub async fn map<I, F, U>(
    items: I,
    mut body: F,
    priority: Priority,
    label: &str,
    yield_often: bool,
) -> Vec<U>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> U,
{
    let mut out = Vec::new();
    for_each(
        items,
        |item| out.push(body(item)),
        priority,
        label,
        yield_often,
    )
    .await;
    out
}
