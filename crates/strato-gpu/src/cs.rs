//! Deferred command stream.
//!
//! Translation layers do not talk to their [`GpuContext`] directly. They
//! queue closures into a [`CsChunk`] and periodically hand full chunks to a
//! [`CsThread`], which replays them in order on a context it owns. This
//! keeps expensive backend work off the application thread while preserving
//! submission order exactly.

use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crate::context::GpuContext;

/// One deferred command. The closure runs exactly once, on the worker's
/// context.
pub type CsCommand = Box<dyn FnOnce(&mut dyn GpuContext) + Send>;

/// Number of commands a chunk holds before it must be dispatched.
const CHUNK_CAPACITY: usize = 1024;

/// An ordered batch of deferred commands.
pub struct CsChunk {
    commands: Vec<CsCommand>,
}

impl CsChunk {
    pub fn new() -> Self {
        Self {
            commands: Vec::with_capacity(CHUNK_CAPACITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.commands.len() >= CHUNK_CAPACITY
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Appends a command. Callers check [`CsChunk::is_full`] first and
    /// dispatch the chunk when it is.
    pub fn push(&mut self, command: CsCommand) {
        debug_assert!(!self.is_full());
        self.commands.push(command);
    }

    /// Runs every queued command, in push order.
    pub fn execute(self, context: &mut dyn GpuContext) {
        for command in self.commands {
            command(context);
        }
    }
}

impl Default for CsChunk {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct CsCounters {
    dispatched: u64,
    executed: u64,
}

struct CsSync {
    counters: Mutex<CsCounters>,
    executed: Condvar,
}

/// Worker thread that owns a recording context and replays chunks on it.
///
/// `dispatch` is counted before the chunk is sent, so a `synchronize`
/// issued afterwards is guaranteed to cover it.
pub struct CsThread {
    sender: Option<mpsc::Sender<CsChunk>>,
    thread: Option<thread::JoinHandle<()>>,
    sync: Arc<CsSync>,
}

impl CsThread {
    pub fn new(mut context: Box<dyn GpuContext>) -> Self {
        let (sender, receiver) = mpsc::channel::<CsChunk>();
        let sync = Arc::new(CsSync {
            counters: Mutex::new(CsCounters::default()),
            executed: Condvar::new(),
        });

        let worker_sync = Arc::clone(&sync);
        let thread = thread::Builder::new()
            .name("strato-cs".into())
            .spawn(move || {
                while let Ok(chunk) = receiver.recv() {
                    chunk.execute(context.as_mut());

                    let mut counters = worker_sync.counters.lock().unwrap();
                    counters.executed += 1;
                    worker_sync.executed.notify_all();
                }
            })
            .expect("failed to spawn command stream thread");

        Self {
            sender: Some(sender),
            thread: Some(thread),
            sync,
        }
    }

    /// Queues a chunk for execution.
    pub fn dispatch(&self, chunk: CsChunk) {
        {
            let mut counters = self.sync.counters.lock().unwrap();
            counters.dispatched += 1;
        }

        if let Some(sender) = &self.sender {
            // The worker only exits once the sender is dropped, so this
            // cannot fail while `self` is alive.
            let _ = sender.send(chunk);
        }
    }

    /// Blocks until every chunk dispatched so far has executed.
    pub fn synchronize(&self) {
        let mut counters = self.sync.counters.lock().unwrap();
        while counters.executed < counters.dispatched {
            counters = self.sync.executed.wait(counters).unwrap();
        }
    }

    /// Total number of chunks handed to the worker.
    pub fn chunks_dispatched(&self) -> u64 {
        self.sync.counters.lock().unwrap().dispatched
    }
}

impl Drop for CsThread {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop; join so queued work is
        // not torn down mid-chunk.
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::GpuDevice;
    use crate::trace::TraceDevice;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn chunks_execute_in_dispatch_order() {
        let device = TraceDevice::new();
        let thread = CsThread::new(device.create_context());

        let log = Arc::new(Mutex::new(Vec::new()));
        for value in 0..4u32 {
            let mut chunk = CsChunk::new();
            let log = Arc::clone(&log);
            chunk.push(Box::new(move |_ctx| {
                log.lock().unwrap().push(value);
            }));
            thread.dispatch(chunk);
        }

        thread.synchronize();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(thread.chunks_dispatched(), 4);
    }

    #[test]
    fn synchronize_waits_for_all_dispatched_chunks() {
        let device = TraceDevice::new();
        let thread = CsThread::new(device.create_context());

        let executed = Arc::new(AtomicU32::new(0));
        for _ in 0..16 {
            let mut chunk = CsChunk::new();
            let executed = Arc::clone(&executed);
            chunk.push(Box::new(move |_ctx| {
                std::thread::sleep(std::time::Duration::from_millis(1));
                executed.fetch_add(1, Ordering::SeqCst);
            }));
            thread.dispatch(chunk);
        }

        thread.synchronize();
        assert_eq!(executed.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn chunk_reports_full_at_capacity() {
        let mut chunk = CsChunk::new();
        for _ in 0..CHUNK_CAPACITY {
            assert!(!chunk.is_full());
            chunk.push(Box::new(|_ctx| {}));
        }
        assert!(chunk.is_full());
        assert_eq!(chunk.len(), CHUNK_CAPACITY);
    }
}
