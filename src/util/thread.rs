//! Module `thread` implement a generic multi-threading pattern.
//!
//! It is inspired from gen-server model from Erlang, where by, every thread is
//! expected to hold onto its own state, and handle all inter-thread communication
//! via channels and message queues. All channels are bounded, a full channel
//! blocks the sender until the thread catches up.

use std::{mem, sync::mpsc, thread};

use crate::Result;

/// Thread type, providing gen-server pattern to do multi-threading.
///
/// NOTE: When a thread value is dropped, it is made sure that there are no dangling
/// thread routines. To achieve this following requirements need to be satisfied:
///
/// * The thread's main loop should handle _disconnect_ signal on its [Rx] channel.
/// * Call `join()` on the [Thread] instance, after dropping all [Tx] clones.
pub struct Thread<Q, R = (), T = ()> {
    name: String,
    inner: Option<Inner<Q, R, T>>,
}

struct Inner<Q, R, T> {
    handle: thread::JoinHandle<T>,
    tx: Option<Tx<Q, R>>,
}

impl<Q, R, T> Inner<Q, R, T> {
    fn join(mut self, name: &str) -> Result<T> {
        mem::drop(self.tx.take());

        match self.handle.join() {
            Ok(val) => Ok(val),
            Err(err) => err_at!(ThreadFail, msg: "thread {} fail {:?}", name, err),
        }
    }
}

impl<Q, R, T> Drop for Thread<Q, R, T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.join(&self.name).ok();
        }
    }
}

impl<Q, R, T> Thread<Q, R, T> {
    /// Create a new Thread instance, using synchronous channel with finite buffer.
    /// `main_loop` shall be called with the rx side of the channel and shall return
    /// a function that can be spawned using thread::spawn.
    pub fn new_sync<F, N>(name: &str, chan_size: usize, main_loop: F) -> Thread<Q, R, T>
    where
        F: 'static + FnOnce(Rx<Q, R>) -> N + Send,
        N: 'static + Send + FnOnce() -> T,
        T: 'static + Send,
    {
        let (tx, rx) = mpsc::sync_channel(chan_size);
        let handle = thread::spawn(main_loop(rx));

        Thread {
            name: name.to_string(),
            inner: Some(Inner {
                handle,
                tx: Some(Tx(tx)),
            }),
        }
    }

    /// Recommended way to exit/shutdown the thread. Note that all [Tx] clones of this
    /// thread must also be dropped for this call to return.
    ///
    /// Even otherwise, when Thread value goes out of scope its drop implementation
    /// shall call this method to exit the thread, except that any errors are ignored.
    pub fn join(mut self) -> Result<T> {
        match self.inner.take() {
            Some(inner) => inner.join(&self.name),
            None => err_at!(ThreadFail, msg: "thread {} already joined", self.name),
        }
    }

    /// Return name of this thread.
    pub fn to_name(&self) -> String {
        self.name.to_string()
    }

    /// Return a clone of tx channel.
    pub fn to_tx(&self) -> Tx<Q, R> {
        match self.inner.as_ref().and_then(|inner| inner.tx.as_ref()) {
            Some(tx) => tx.clone(),
            None => unreachable!(),
        }
    }
}

/// IPC type, wrapping [mpsc::SyncSender] with an optional back-channel
/// for responses.
pub struct Tx<Q, R = ()>(mpsc::SyncSender<(Q, Option<mpsc::Sender<R>>)>);

impl<Q, R> Clone for Tx<Q, R> {
    fn clone(&self) -> Self {
        Tx(self.0.clone())
    }
}

impl<Q, R> Tx<Q, R> {
    /// Post a message to thread and don't wait for response. Block if
    /// the thread's channel is full.
    pub fn post(&self, msg: Q) -> Result<()> {
        err_at!(IPCFail, self.0.send((msg, None)))
    }

    /// Send a request message to thread and wait for a response.
    pub fn request(&self, request: Q) -> Result<R> {
        let (stx, srx) = mpsc::channel();
        err_at!(IPCFail, self.0.send((request, Some(stx))))?;
        err_at!(IPCFail, srx.recv())
    }
}

/// IPC type, that shall be passed to the thread's main loop.
///
/// Refer to [Thread::new_sync] for details.
pub type Rx<Q, R = ()> = mpsc::Receiver<(Q, Option<mpsc::Sender<R>>)>;

/// Block for the first message on `rx` and then gather as many outstanding
/// messages as possible, upto `limit`. Return None when all senders are
/// dropped and the channel is drained.
pub fn recv_batch<Q, R>(
    rx: &Rx<Q, R>,
    limit: usize,
) -> Option<Vec<(Q, Option<mpsc::Sender<R>>)>> {
    use std::sync::mpsc::TryRecvError;

    let msg = rx.recv().ok()?;
    let mut msgs = vec![msg];
    while msgs.len() < limit {
        match rx.try_recv() {
            Ok(msg) => msgs.push(msg),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
    Some(msgs)
}

#[cfg(test)]
#[path = "thread_test.rs"]
mod thread_test;
