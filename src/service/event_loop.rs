//! The background event loop.
//!
//! # Iteration
//! ```text
//! intake      drain the submission channel, create + add + perform + register
//! scan        next_completion until empty → complete → remove + release
//! wait        transport readiness, clamped to max_wait
//!             (transport idle → wait on the submission channel for idle_sleep)
//! perform     advance every registered transfer
//! ```
//!
//! # Design Decisions
//! - Only this loop touches the registry and the multiplexer
//! - The loop exits on `Stopped` (shutdown requested, nothing in flight)
//! - A readiness failure is fatal: the loop abandons its requests and exits

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::lifecycle::Lifecycle;
use crate::request::{RequestDescriptor, RequestRegistry};
use crate::transport::{Multiplexer, Readiness, TransferStatus};

pub(crate) struct EventLoop<M> {
    mux: M,
    registry: RequestRegistry,
    submissions: Receiver<RequestDescriptor>,
    lifecycle: Arc<Lifecycle>,
    max_wait: Duration,
    idle_sleep: Duration,
}

impl<M: Multiplexer> EventLoop<M> {
    pub(crate) fn new(
        mux: M,
        submissions: Receiver<RequestDescriptor>,
        lifecycle: Arc<Lifecycle>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            mux,
            registry: RequestRegistry::new(),
            submissions,
            lifecycle,
            max_wait: config.max_wait(),
            idle_sleep: config.idle_sleep(),
        }
    }

    /// Run until the lifecycle reaches a terminal state.
    pub(crate) fn run(mut self) {
        let span = tracing::info_span!("event_loop");
        let _entered = span.enter();
        tracing::info!(
            max_wait_ms = self.max_wait.as_millis() as u64,
            idle_sleep_ms = self.idle_sleep.as_millis() as u64,
            "Event loop starting"
        );

        while !self.lifecycle.state().is_terminal() {
            if let Err(err) = self.iterate() {
                tracing::error!(
                    error = %err,
                    abandoned = self.registry.len(),
                    "Event loop failed, abandoning in-flight requests"
                );
                self.lifecycle.fail();
                self.abandon();
                return;
            }
        }

        tracing::info!("Event loop stopped");
    }

    fn iterate(&mut self) -> Result<()> {
        self.intake();
        self.scan_completions();
        self.lifecycle.set_registered(self.registry.len());

        let timeout = self.next_timeout();
        match self.mux.wait(timeout)? {
            Readiness::Idle => self.idle(),
            Readiness::Ready | Readiness::TimedOut => {}
        }

        let running = self.mux.perform();
        tracing::trace!(
            running,
            registered = self.registry.len(),
            in_flight = self.lifecycle.in_flight(),
            "Event loop iteration"
        );
        Ok(())
    }

    fn intake(&mut self) {
        while let Ok(descriptor) = self.submissions.try_recv() {
            self.register(descriptor);
        }
    }

    /// Create, add and start a transfer for `descriptor`, then register it.
    fn register(&mut self, mut descriptor: RequestDescriptor) {
        let request_id = descriptor.request_id();

        let id = match self
            .mux
            .create_transfer(descriptor.spec().clone(), descriptor.sink())
        {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(%request_id, url = %descriptor.url(), error = %err, "Transfer creation failed");
                self.reject(descriptor, &err);
                return;
            }
        };

        if let Err(err) = self.mux.add(id) {
            tracing::warn!(%request_id, transfer_id = %id, error = %err, "Transfer registration failed");
            self.mux.release(id);
            self.reject(descriptor, &err);
            return;
        }

        descriptor.bind(id);
        self.mux.perform();

        let method = descriptor.method();
        let url = descriptor.url().to_string();
        let body_len = descriptor.body().map_or(0, str::len);
        match self.registry.insert(id, descriptor) {
            Ok(()) => {
                tracing::debug!(%request_id, transfer_id = %id, %method, %url, body_len, "Transfer registered");
            }
            Err(descriptor) => {
                let err = Error::transfer_init(url, format!("{id} is already registered"));
                tracing::error!(%request_id, error = %err, "Duplicate transfer handle");
                self.reject(descriptor, &err);
            }
        }
    }

    fn reject(&self, descriptor: RequestDescriptor, err: &Error) {
        descriptor.reject(err);
        self.lifecycle.finish_one();
    }

    fn scan_completions(&mut self) {
        while let Some(message) = self.mux.next_completion() {
            let id = message.id;
            match self.registry.remove(id) {
                Some(descriptor) => {
                    debug_assert_eq!(descriptor.transfer(), Some(id));
                    let request_id = descriptor.request_id();
                    match &message.status {
                        TransferStatus::Done { status } => {
                            tracing::debug!(%request_id, transfer_id = %id, status, "Transfer completed");
                        }
                        TransferStatus::Failed { status, reason } => {
                            tracing::warn!(%request_id, transfer_id = %id, ?status, %reason, "Transfer failed");
                        }
                    }
                    descriptor.complete(message.status);
                    self.lifecycle.finish_one();
                }
                None => {
                    let err = Error::CompletionMismatch(id);
                    tracing::error!(error = %err, "Releasing unmatched transfer");
                }
            }

            self.mux.remove(id);
            self.mux.release(id);
        }
    }

    fn next_timeout(&self) -> Duration {
        self.mux
            .timeout()
            .map_or(self.max_wait, |suggested| suggested.min(self.max_wait))
    }

    /// Nothing to wait on: pause, but pick up a new submission right away.
    fn idle(&mut self) {
        match self.submissions.recv_timeout(self.idle_sleep) {
            Ok(descriptor) => self.register(descriptor),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => thread::sleep(self.idle_sleep),
        }
    }

    /// Drop every pending request without completing it.
    fn abandon(&mut self) {
        for (id, descriptor) in self.registry.drain() {
            tracing::warn!(request_id = %descriptor.request_id(), transfer_id = %id, "Request abandoned");
        }
        while let Ok(descriptor) = self.submissions.try_recv() {
            tracing::warn!(request_id = %descriptor.request_id(), "Queued request abandoned");
        }
        self.lifecycle.set_registered(0);
    }
}
