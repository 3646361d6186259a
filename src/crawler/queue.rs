//! Bounded work queues between stages
//!
//! Each queue is a bounded `mpsc` channel whose receiver is shared by all
//! workers of the consuming stage. Producers block while the queue is full.
//! The coordinator closes a queue once its producers are done; consumers keep
//! draining what is left and then see [`Dequeue::Closed`]. Both sides give up
//! as soon as the run is cancelled.

use crate::crawler::state::CancelSignal;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};

/// The queue no longer accepts items
#[derive(Debug, Error, PartialEq, Eq)]
#[error("work queue closed")]
pub struct QueueClosed;

/// Outcome of a timed dequeue
#[derive(Debug, PartialEq, Eq)]
pub enum Dequeue<T> {
    Item(T),
    /// Nothing arrived within the timeout
    Idle,
    /// Closed and drained, or the run was cancelled
    Closed,
}

/// Bounded multi-producer, multi-consumer queue
pub struct WorkQueue<T> {
    name: &'static str,
    sender: mpsc::Sender<T>,
    receiver: Mutex<mpsc::Receiver<T>>,
    closed: watch::Sender<bool>,
    cancel: Arc<CancelSignal>,
}

impl<T: Send> WorkQueue<T> {
    pub fn new(name: &'static str, capacity: usize, cancel: Arc<CancelSignal>) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (closed, _) = watch::channel(false);
        Self {
            name,
            sender,
            receiver: Mutex::new(receiver),
            closed,
            cancel,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Enqueues an item, waiting for space while the queue is full
    ///
    /// Fails if the queue was closed or the run cancelled while waiting.
    pub async fn push(&self, item: T) -> Result<(), QueueClosed> {
        if self.is_closed() || self.cancel.is_cancelled() {
            return Err(QueueClosed);
        }

        let mut closed = self.closed.subscribe();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(QueueClosed),
            _ = closed.wait_for(|closed| *closed) => Err(QueueClosed),
            sent = self.sender.send(item) => sent.map_err(|_| QueueClosed),
        }
    }

    /// Dequeues the next item, waiting until one arrives or the queue is drained
    pub async fn pop(&self) -> Option<T> {
        let mut receiver = self.receiver.lock().await;

        if self.cancel.is_cancelled() {
            return None;
        }
        if let Ok(item) = receiver.try_recv() {
            return Some(item);
        }

        let mut closed = self.closed.subscribe();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            item = receiver.recv() => item,
            _ = closed.wait_for(|closed| *closed) => receiver.try_recv().ok(),
        }
    }

    /// Like [`pop`](Self::pop) but gives up after `timeout`
    pub async fn pop_timeout(&self, timeout: Duration) -> Dequeue<T> {
        match tokio::time::timeout(timeout, self.pop()).await {
            Ok(Some(item)) => Dequeue::Item(item),
            Ok(None) => Dequeue::Closed,
            Err(_) => Dequeue::Idle,
        }
    }

    /// Stops accepting items; consumers drain what is already queued
    pub fn close(&self) {
        if !self.closed.send_replace(true) {
            tracing::debug!("Closed {} queue", self.name);
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}
