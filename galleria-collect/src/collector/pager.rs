//! Paged walk over one upstream listing
//!
//! Pulls pages lazily: each `next_page` call throttles, fetches, and
//! recovers transient failures via the retry policy. The walk ends when the
//! upstream reports no continuation, the offset or page ceiling is reached,
//! or the caller stops pulling (the orchestrator's early-stop predicates
//! live in the calling loop). Retry state never crosses a page boundary.

use super::{CollectError, RateLimiter, RetryPolicy};
use crate::upstream::{Page, UpstreamError};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct PageWalk<'a, F> {
    fetch: F,
    throttle: &'a RateLimiter,
    retry: &'a RetryPolicy,
    cancel: CancellationToken,
    next_offset: Option<u32>,
    max_offset: Option<u32>,
    max_pages: Option<u32>,
    pages_fetched: u32,
    last_offset: u32,
    done: bool,
}

impl<'a, F> PageWalk<'a, F> {
    pub fn new(
        throttle: &'a RateLimiter,
        retry: &'a RetryPolicy,
        cancel: CancellationToken,
        fetch: F,
    ) -> Self {
        Self {
            fetch,
            throttle,
            retry,
            cancel,
            next_offset: Some(0),
            max_offset: None,
            max_pages: None,
            pages_fetched: 0,
            last_offset: 0,
            done: false,
        }
    }

    /// Stop before fetching at or beyond this offset
    pub fn with_max_offset(mut self, max_offset: u32) -> Self {
        self.max_offset = Some(max_offset);
        self
    }

    /// Stop after this many pages
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// Offset of the most recently fetched page
    pub fn last_offset(&self) -> u32 {
        self.last_offset
    }

    /// Fetch the next page, or `None` when the walk is over.
    ///
    /// Transient failures are retried with class-specific backoff up to the
    /// page-local attempt cap; beyond it the walk ends with `FetchExhausted`.
    /// Cancellation is observed here, at the page boundary.
    pub async fn next_page<T, Fut>(&mut self) -> Result<Option<Page<T>>, CollectError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Page<T>, UpstreamError>>,
    {
        if self.done {
            return Ok(None);
        }

        let offset = match self.next_offset {
            Some(offset) => offset,
            None => {
                self.done = true;
                return Ok(None);
            }
        };

        if let Some(max) = self.max_offset {
            if offset >= max {
                debug!(offset, max, "Offset ceiling reached, ending walk");
                self.done = true;
                return Ok(None);
            }
        }

        if let Some(max) = self.max_pages {
            if self.pages_fetched >= max {
                debug!(pages = self.pages_fetched, "Page ceiling reached, ending walk");
                self.done = true;
                return Ok(None);
            }
        }

        if self.cancel.is_cancelled() {
            debug!(offset, "Cancellation observed at page boundary");
            self.done = true;
            return Err(CollectError::Cancelled);
        }

        let mut attempts: u32 = 0;
        let page = loop {
            self.throttle.wait().await;

            match (self.fetch)(offset).await {
                Ok(page) => break page,
                Err(UpstreamError::Credential(message)) => {
                    // A dead credential set fails the whole run, not just
                    // this page.
                    self.done = true;
                    return Err(CollectError::Credential(message));
                }
                Err(err) => {
                    let class = self.retry.classify(&err);
                    attempts += 1;

                    if attempts >= self.retry.max_attempts(class) {
                        warn!(
                            offset,
                            attempts,
                            class = ?class,
                            error = %err,
                            "Page fetch retries exhausted, ending walk"
                        );
                        self.done = true;
                        return Err(CollectError::FetchExhausted { offset, source: err });
                    }

                    let backoff = self.retry.backoff_for(class);
                    warn!(
                        offset,
                        attempts,
                        class = ?class,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Upstream error, backing off before retry"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        };

        self.pages_fetched += 1;
        self.last_offset = offset;
        self.next_offset = page.next_offset;
        if self.next_offset.is_none() {
            self.done = true;
        }

        self.throttle.batch_pause(self.pages_fetched).await;

        Ok(Some(page))
    }
}
