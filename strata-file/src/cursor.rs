// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! Cursor over a column's pages with adaptive async prefetch.
//!
//! Pages are decoded in parallel on the worker pool; the cursor keeps a
//! bounded FIFO of in-flight decodes and always delivers pages in file
//! order.  The prefetch depth adapts: whenever `next_page` has to wait
//! (queue empty, or the front decode unfinished) the target depth grows,
//! so slow-to-decode columns automatically get more parallelism.  Hits
//! never shrink the depth; it is a per-column high-water mark.

use std::collections::VecDeque;
use std::sync::Arc;

use log::debug;
use strata_core::executor::{Executor, TaskHandle};
use strata_core::Result;
use strata_encoding::compression::DecompressorRegistry;
use strata_encoding::decoder::{decode_page, DecodedPage, PageInfo};
use strata_encoding::ColumnDescriptor;

const INITIAL_PREFETCH_DEPTH: usize = 4;
const MAX_PREFETCH_DEPTH: usize = 8;

pub struct PageCursor {
    pages: Vec<Option<PageInfo>>,
    next_page_index: usize,
    queue: VecDeque<TaskHandle<DecodedPage>>,
    target_depth: usize,
    misses: u64,
    column: Arc<ColumnDescriptor>,
    executor: Executor,
    decompressors: Arc<DecompressorRegistry>,
}

impl PageCursor {
    pub fn new(
        pages: Vec<PageInfo>,
        column: Arc<ColumnDescriptor>,
        executor: Executor,
        decompressors: Arc<DecompressorRegistry>,
    ) -> Self {
        let mut cursor = Self {
            pages: pages.into_iter().map(Some).collect(),
            next_page_index: 0,
            queue: VecDeque::new(),
            target_depth: INITIAL_PREFETCH_DEPTH,
            misses: 0,
            column,
            executor,
            decompressors,
        };
        // Start prefetching immediately.
        cursor.fill();
        cursor
    }

    /// True if more pages will be delivered.
    pub fn has_next(&self) -> bool {
        !self.queue.is_empty() || self.next_page_index < self.pages.len()
    }

    /// Current adaptive prefetch target.
    pub fn target_depth(&self) -> usize {
        self.target_depth
    }

    /// Misses observed so far.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// The next decoded page in file order, or `None` when exhausted.
    /// Blocks while the front decode is still running.
    pub fn next_page(&mut self) -> Result<Option<DecodedPage>> {
        if self.queue.is_empty() {
            if self.next_page_index >= self.pages.len() {
                return Ok(None);
            }
            // Queue empty with pages remaining: decode synchronously and
            // give this column more prefetch headroom.
            self.note_miss(true);
            let page = self.decode_now()?;
            self.fill();
            return Ok(Some(page));
        }

        let mut front = self.queue.pop_front().expect("queue checked non-empty");
        if !front.is_finished() {
            self.note_miss(false);
        }
        self.fill();
        let page = front.join()?;
        Ok(Some(page))
    }

    fn note_miss(&mut self, queue_empty: bool) {
        self.misses += 1;
        if self.target_depth < MAX_PREFETCH_DEPTH {
            self.target_depth += 1;
            debug!(
                "prefetch miss for column '{}' (queue_empty={queue_empty}), depth now {}",
                self.column.name, self.target_depth
            );
        }
    }

    /// Submit decode tasks until the queue holds `target_depth` futures
    /// or no pages remain.
    fn fill(&mut self) {
        while self.queue.len() < self.target_depth && self.next_page_index < self.pages.len() {
            let info = self.pages[self.next_page_index]
                .take()
                .expect("page submitted twice");
            self.next_page_index += 1;
            let column = self.column.clone();
            let decompressors = self.decompressors.clone();
            self.queue
                .push_back(self.executor.spawn(move || {
                    decode_page(&info, &column, &decompressors)
                }));
        }
    }

    fn decode_now(&mut self) -> Result<DecodedPage> {
        let info = self.pages[self.next_page_index]
            .take()
            .expect("page decoded twice");
        self.next_page_index += 1;
        decode_page(&info, &self.column, &self.decompressors)
    }
}

// Dropping the cursor drops the queued task handles; in-flight decodes
// finish on the pool and their results are discarded, releasing the
// underlying file slices.
