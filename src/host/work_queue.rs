//! Worker pool for async work.
//!
//! Execute hooks run on the tokio blocking pool; completion ids flow back
//! over a channel and are drained on the value thread, so complete and
//! destroy hooks never leave it.

use std::ffi::c_void;

use tokio::sync::mpsc;

use crate::sys;

struct SendPtr(*mut c_void);

// The execute hook contract is that the pointed-to data is owned by exactly
// one lifecycle phase at a time, so moving the pointer to the pool thread is
// sound.
unsafe impl Send for SendPtr {}

pub(crate) struct WorkQueue {
    runtime: tokio::runtime::Runtime,
    tx: mpsc::UnboundedSender<u64>,
    rx: mpsc::UnboundedReceiver<u64>,
    outstanding: usize,
}

impl WorkQueue {
    pub fn new() -> std::io::Result<WorkQueue> {
        let runtime = tokio::runtime::Builder::new_multi_thread().build()?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(WorkQueue {
            runtime,
            tx,
            rx,
            outstanding: 0,
        })
    }

    /// Runs `execute(data)` on the pool and reports `id` back once done.
    pub fn submit(&mut self, id: u64, execute: sys::AsyncExecute, data: *mut c_void) {
        let tx = self.tx.clone();
        let data = SendPtr(data);
        self.outstanding += 1;
        self.runtime.spawn_blocking(move || {
            let data = data;
            unsafe { execute(data.0) };
            if tx.send(id).is_err() {
                log::warn!("work queue receiver dropped before completion of work {}", id);
            }
        });
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Blocks for the next finished execute hook. `None` when nothing is in
    /// flight.
    pub fn wait_completed(&mut self) -> Option<u64> {
        if self.outstanding == 0 {
            return None;
        }
        match self.rx.blocking_recv() {
            Some(id) => {
                self.outstanding -= 1;
                Some(id)
            }
            None => None,
        }
    }
}
