// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! The flat-column assembly buffer.
//!
//! One long-lived producer per column pulls decoded pages from its
//! cursor and appends them into pre-allocated value arrays; full
//! batches move through a bounded ready queue (capacity 2) and emptied
//! arrays come back through a pool (capacity 3).  Blocking on the full
//! queue is the backpressure toward page decoding; blocking on the
//! empty pool caps memory at a handful of batches.  Errors are latched
//! and re-raised on the consumer's next fetch.

use std::sync::{Arc, Mutex};

use arrow_buffer::{BooleanBufferBuilder, NullBuffer};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, trace};
use snafu::location;
use strata_core::executor::Executor;
use strata_core::{Error, Result};
use strata_encoding::{ColumnDescriptor, ValueVector};

use crate::cursor::PageCursor;

const READY_QUEUE_CAPACITY: usize = 2;
const ARRAY_POOL_CAPACITY: usize = 3;

/// One batch of a flat column: a value per record plus the null bitset
/// (absent for required columns).
#[derive(Debug)]
pub struct FlatBatch {
    pub values: ValueVector,
    pub nulls: Option<NullBuffer>,
}

impl FlatBatch {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_null(&self, row: usize) -> bool {
        match &self.nulls {
            Some(nulls) => !nulls.is_valid(row),
            None => false,
        }
    }
}

enum Message {
    Batch(FlatBatch),
    Finished,
}

/// Consumer handle of one column's producer/consumer pair.
pub struct ColumnAssemblyBuffer {
    ready: Receiver<Message>,
    pool: Sender<ValueVector>,
    error: Arc<Mutex<Option<Error>>>,
    finished: bool,
}

impl ColumnAssemblyBuffer {
    /// Spawn the producer worker for `cursor` and return the consumer
    /// handle.
    pub fn start(
        mut cursor: PageCursor,
        column: Arc<ColumnDescriptor>,
        batch_capacity: usize,
        executor: &Executor,
    ) -> Self {
        let (ready_tx, ready_rx) = bounded::<Message>(READY_QUEUE_CAPACITY);
        let (pool_tx, pool_rx) = bounded::<ValueVector>(ARRAY_POOL_CAPACITY);
        for _ in 0..ARRAY_POOL_CAPACITY {
            pool_tx
                .send(ValueVector::with_capacity(
                    column.physical_type,
                    batch_capacity,
                ))
                .expect("seeding an empty pool cannot fail");
        }
        let error = Arc::new(Mutex::new(None));

        let worker_error = error.clone();
        let worker_column = column.clone();
        // The handle is dropped on purpose: the worker runs until the
        // cursor is exhausted or the consumer goes away.
        let _ = executor.spawn(move || {
            let outcome = run_producer(
                &mut cursor,
                &worker_column,
                batch_capacity,
                &ready_tx,
                &pool_rx,
            );
            if let Err(e) = outcome {
                debug!(
                    "assembly worker for column '{}' stopping on error: {e}",
                    worker_column.name
                );
                *worker_error.lock().unwrap() = Some(e);
            }
            // Either way, wake the consumer.
            let _ = ready_tx.send(Message::Finished);
            Ok(())
        });

        Self {
            ready: ready_rx,
            pool: pool_tx,
            error,
            finished: false,
        }
    }

    /// Return a drained value array to the pool.
    pub fn recycle(&self, mut values: ValueVector) {
        values.clear();
        // A full pool just drops the array.
        let _ = self.pool.try_send(values);
    }

    /// Block for the next batch.  `None` marks the end of the column;
    /// a latched producer error is re-raised here, and on every call
    /// after it.
    pub fn next_batch(&mut self) -> Result<Option<FlatBatch>> {
        if let Some(e) = self.error.lock().unwrap().as_ref() {
            return Err(e.duplicate());
        }
        if self.finished {
            return Ok(None);
        }
        match self.ready.recv() {
            Ok(Message::Batch(batch)) => Ok(Some(batch)),
            Ok(Message::Finished) => {
                self.finished = true;
                if let Some(e) = self.error.lock().unwrap().as_ref() {
                    return Err(e.duplicate());
                }
                Ok(None)
            }
            Err(_) => {
                self.finished = true;
                match self.error.lock().unwrap().as_ref() {
                    Some(e) => Err(e.duplicate()),
                    None => Ok(None),
                }
            }
        }
    }
}

fn run_producer(
    cursor: &mut PageCursor,
    column: &ColumnDescriptor,
    batch_capacity: usize,
    ready: &Sender<Message>,
    pool: &Receiver<ValueVector>,
) -> Result<()> {
    let nullable = column.max_def_level > 0;
    let mut current = pool
        .recv()
        .map_err(|_| Error::io("assembly pool closed before the worker started", location!()))?;
    let mut nulls = nullable.then(|| BooleanBufferBuilder::new(batch_capacity));

    while let Some(page) = cursor.next_page()? {
        let mut offset = 0usize;
        while offset < page.num_values {
            let room = batch_capacity - current.len();
            let take = room.min(page.num_values - offset);
            current.extend_from_range(&page.values, offset, offset + take)?;
            if let Some(nulls) = nulls.as_mut() {
                // The bitset is built as pages are copied; publishing a
                // batch needs no second pass.
                for i in offset..offset + take {
                    nulls.append(page.is_present(i, column.max_def_level));
                }
            }
            offset += take;

            if current.len() == batch_capacity {
                let values = std::mem::replace(
                    &mut current,
                    // Blocks when the pool is drained.
                    pool.recv().map_err(|_| {
                        Error::io("assembly pool closed mid-column", location!())
                    })?,
                );
                let batch = FlatBatch {
                    values,
                    nulls: nulls
                        .as_mut()
                        .map(|builder| NullBuffer::new(builder.finish())),
                };
                trace!(
                    "publishing full batch of {} records for column '{}'",
                    batch.len(),
                    column.name
                );
                if ready.send(Message::Batch(batch)).is_err() {
                    // Consumer dropped the buffer; stop quietly.
                    return Ok(());
                }
            }
        }
    }

    if !current.is_empty() {
        let batch = FlatBatch {
            values: current,
            nulls: nulls
                .as_mut()
                .map(|builder| NullBuffer::new(builder.finish())),
        };
        trace!(
            "publishing tail batch of {} records for column '{}'",
            batch.len(),
            column.name
        );
        let _ = ready.send(Message::Batch(batch));
    }
    Ok(())
}
