//! In-memory transport with scripted replies.
//!
//! # Responsibilities
//! - Answer every transfer from a reply function, one chunk per `perform`
//! - Optionally shuffle completion order (seeded `fastrand`)
//! - Inject faults: refused creation, readiness failure, stray completions
//! - Count handle operations through a shared `ScriptedProbe`

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::{
    CompletionMessage, Multiplexer, Readiness, ResponseSink, TransferId, TransferSpec,
    TransferStatus,
};

type ReplyFn = Box<dyn Fn(&TransferSpec) -> ScriptedReply + Send>;
type RefuseFn = Box<dyn Fn(&TransferSpec) -> bool + Send>;

/// What the scripted transport answers for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedReply {
    /// Body chunks, delivered one per `perform`.
    pub chunks: Vec<Vec<u8>>,
    /// Status reported once every chunk was delivered.
    pub status: TransferStatus,
}

impl ScriptedReply {
    /// `200` with a single-chunk body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::status(200, body)
    }

    /// Arbitrary status with a single-chunk body.
    pub fn status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            chunks: vec![body.into()],
            status: TransferStatus::Done { status },
        }
    }

    /// `200` with the body split into the given chunks.
    pub fn chunked<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            status: TransferStatus::Done { status: 200 },
        }
    }

    /// `200` echoing the request body back.
    pub fn echo(spec: &TransferSpec) -> Self {
        Self::ok(spec.body().unwrap_or_default())
    }

    /// Deliver `partial`, then fail with `reason`.
    pub fn failed(partial: impl Into<Vec<u8>>, reason: impl Into<String>) -> Self {
        Self {
            chunks: vec![partial.into()],
            status: TransferStatus::Failed {
                status: None,
                reason: reason.into(),
            },
        }
    }
}

#[derive(Debug, Default)]
struct ProbeInner {
    created: AtomicUsize,
    added: AtomicUsize,
    removed: AtomicUsize,
    released: AtomicUsize,
    registered: AtomicUsize,
    peak_registered: AtomicUsize,
    injected: Mutex<Vec<TransferId>>,
    specs: Mutex<Vec<TransferSpec>>,
}

/// Shared view of a `ScriptedMultiplexer`, usable after the transport moved
/// into the worker.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProbe {
    inner: Arc<ProbeInner>,
}

impl ScriptedProbe {
    pub fn created(&self) -> usize {
        self.inner.created.load(Ordering::SeqCst)
    }

    pub fn added(&self) -> usize {
        self.inner.added.load(Ordering::SeqCst)
    }

    pub fn removed(&self) -> usize {
        self.inner.removed.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Transfers currently registered with the multiplexer.
    pub fn registered(&self) -> usize {
        self.inner.registered.load(Ordering::SeqCst)
    }

    pub fn peak_registered(&self) -> usize {
        self.inner.peak_registered.load(Ordering::SeqCst)
    }

    /// Every spec the transport was asked to create, in order.
    pub fn specs(&self) -> Vec<TransferSpec> {
        self.inner
            .specs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Queue a completion message for a transfer the transport never saw.
    pub fn inject_completion(&self, id: TransferId) {
        self.inner
            .injected
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(id);
    }

    fn take_injected(&self) -> Vec<TransferId> {
        std::mem::take(&mut *self.inner.injected.lock().unwrap_or_else(|p| p.into_inner()))
    }

    fn has_injected(&self) -> bool {
        !self
            .inner
            .injected
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_empty()
    }
}

struct ScriptedTransfer {
    sink: ResponseSink,
    chunks: VecDeque<Vec<u8>>,
    status: TransferStatus,
    done: bool,
}

/// Deterministic, in-memory `Multiplexer`.
pub struct ScriptedMultiplexer {
    reply: ReplyFn,
    refuse: Option<RefuseFn>,
    created: HashMap<TransferId, ScriptedTransfer>,
    registered: HashMap<TransferId, ScriptedTransfer>,
    completions: VecDeque<CompletionMessage>,
    rng: Option<fastrand::Rng>,
    latency: Duration,
    readiness_budget: Option<usize>,
    probe: ScriptedProbe,
}

impl ScriptedMultiplexer {
    pub fn new<F>(reply: F) -> Self
    where
        F: Fn(&TransferSpec) -> ScriptedReply + Send + 'static,
    {
        Self {
            reply: Box::new(reply),
            refuse: None,
            created: HashMap::new(),
            registered: HashMap::new(),
            completions: VecDeque::new(),
            rng: None,
            latency: Duration::ZERO,
            readiness_budget: None,
            probe: ScriptedProbe::default(),
        }
    }

    /// Shuffle the completions of each `perform` with a seeded RNG.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Some(fastrand::Rng::with_seed(seed));
        self
    }

    /// Sleep up to `latency` in every non-idle `wait`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Let `n` non-idle readiness waits succeed, then fail every following one.
    pub fn fail_readiness_after(mut self, n: usize) -> Self {
        self.readiness_budget = Some(n);
        self
    }

    /// Refuse to create transfers matching `predicate`.
    pub fn refuse_creation<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&TransferSpec) -> bool + Send + 'static,
    {
        self.refuse = Some(Box::new(predicate));
        self
    }

    pub fn probe(&self) -> ScriptedProbe {
        self.probe.clone()
    }

    fn has_work(&self) -> bool {
        !self.completions.is_empty()
            || self.registered.values().any(|t| !t.done)
            || self.probe.has_injected()
    }
}

impl Multiplexer for ScriptedMultiplexer {
    fn create_transfer(&mut self, spec: TransferSpec, sink: ResponseSink) -> Result<TransferId> {
        if self.refuse.as_ref().is_some_and(|refuse| refuse(&spec)) {
            return Err(Error::transfer_init(
                spec.url().as_str(),
                "scripted transport refused the transfer",
            ));
        }

        let reply = (self.reply)(&spec);
        self.probe
            .inner
            .specs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(spec);

        let id = TransferId::next();
        self.created.insert(
            id,
            ScriptedTransfer {
                sink,
                chunks: reply.chunks.into(),
                status: reply.status,
                done: false,
            },
        );
        self.probe.inner.created.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    fn add(&mut self, id: TransferId) -> Result<()> {
        let transfer = self
            .created
            .remove(&id)
            .ok_or_else(|| Error::transfer_init(id.to_string(), "transfer was never created"))?;
        self.registered.insert(id, transfer);

        let inner = &self.probe.inner;
        inner.added.fetch_add(1, Ordering::SeqCst);
        let now = inner.registered.fetch_add(1, Ordering::SeqCst) + 1;
        inner.peak_registered.fetch_max(now, Ordering::SeqCst);
        Ok(())
    }

    fn perform(&mut self) -> usize {
        let mut finished = Vec::new();
        for (id, transfer) in self.registered.iter_mut().filter(|(_, t)| !t.done) {
            if let Some(chunk) = transfer.chunks.pop_front() {
                transfer.sink.write(&chunk);
            }
            if transfer.chunks.is_empty() {
                transfer.done = true;
                finished.push(CompletionMessage {
                    id: *id,
                    status: transfer.status.clone(),
                });
            }
        }

        match self.rng.as_mut() {
            Some(rng) => rng.shuffle(&mut finished),
            None => finished.sort_by_key(|m| m.id),
        }
        self.completions.extend(finished);

        self.registered.values().filter(|t| !t.done).count()
    }

    fn timeout(&self) -> Option<Duration> {
        if self.completions.is_empty() {
            None
        } else {
            Some(Duration::ZERO)
        }
    }

    fn wait(&mut self, timeout: Duration) -> Result<Readiness> {
        if !self.has_work() {
            return Ok(Readiness::Idle);
        }

        if let Some(budget) = self.readiness_budget.as_mut() {
            if *budget == 0 {
                return Err(Error::ReadinessQuery(
                    "scripted transport lost its descriptors".to_string(),
                ));
            }
            *budget -= 1;
        }

        if !self.latency.is_zero() {
            std::thread::sleep(self.latency.min(timeout));
        }
        Ok(Readiness::Ready)
    }

    fn next_completion(&mut self) -> Option<CompletionMessage> {
        for id in self.probe.take_injected() {
            self.completions.push_back(CompletionMessage {
                id,
                status: TransferStatus::Done { status: 200 },
            });
        }
        self.completions.pop_front()
    }

    fn remove(&mut self, id: TransferId) {
        self.probe.inner.removed.fetch_add(1, Ordering::SeqCst);
        if self.registered.remove(&id).is_some() {
            self.probe.inner.registered.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn release(&mut self, id: TransferId) {
        self.created.remove(&id);
        self.probe.inner.released.fetch_add(1, Ordering::SeqCst);
    }
}
