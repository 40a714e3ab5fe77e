//! Production transport: reqwest transfers on a current-thread tokio runtime.
//!
//! # Responsibilities
//! - Build `reqwest` requests from `TransferSpec`s
//! - Run each added transfer as a task that streams its body into a sink
//! - Report finished transfers as `CompletionMessage`s
//!
//! # Design Decisions
//! - The runtime is driven only from the worker thread, inside `perform`
//!   and `wait`; between those calls no transfer makes progress
//! - The tokio I/O driver is the readiness primitive, so `wait` blocks in
//!   `block_on` until a task signals completion or the timeout elapses
//! - Idle connections are capped per host (`max_connections`)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::transport::{
    CompletionMessage, Method, Multiplexer, Readiness, ResponseSink, TransferId, TransferSpec,
    TransferStatus,
};

/// Multiplexer backed by `reqwest`.
pub struct HttpMultiplexer {
    runtime: Runtime,
    client: reqwest::Client,
    /// Created but not yet added.
    prepared: HashMap<TransferId, (reqwest::Request, ResponseSink)>,
    /// Added transfers, finished or not, until removed.
    running: HashMap<TransferId, JoinHandle<()>>,
    completions_tx: mpsc::UnboundedSender<CompletionMessage>,
    completions_rx: mpsc::UnboundedReceiver<CompletionMessage>,
    finished: Arc<Notify>,
}

impl HttpMultiplexer {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;

        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(config.max_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.clone());
        if !config.system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| Error::Runtime(std::io::Error::other(e)))?;

        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        Ok(Self {
            runtime,
            client,
            prepared: HashMap::new(),
            running: HashMap::new(),
            completions_tx,
            completions_rx,
            finished: Arc::new(Notify::new()),
        })
    }

    fn running_count(&self) -> usize {
        self.running.values().filter(|h| !h.is_finished()).count()
    }
}

impl Multiplexer for HttpMultiplexer {
    fn create_transfer(&mut self, spec: TransferSpec, sink: ResponseSink) -> Result<TransferId> {
        let method = match spec.method() {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        let mut builder = self.client.request(method, spec.url().clone());
        for (name, value) in spec.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = spec.body() {
            builder = builder.body(body.to_owned());
        }

        let request = builder
            .build()
            .map_err(|e| Error::transfer_init(spec.url().as_str(), e))?;

        let id = TransferId::next();
        self.prepared.insert(id, (request, sink));
        Ok(id)
    }

    fn add(&mut self, id: TransferId) -> Result<()> {
        let (request, sink) = self
            .prepared
            .remove(&id)
            .ok_or_else(|| Error::transfer_init(id.to_string(), "transfer was never created"))?;

        let client = self.client.clone();
        let tx = self.completions_tx.clone();
        let finished = Arc::clone(&self.finished);

        let handle = self.runtime.spawn(async move {
            let status = run_transfer(&client, request, &sink).await;
            let _ = tx.send(CompletionMessage { id, status });
            finished.notify_one();
        });

        self.running.insert(id, handle);
        Ok(())
    }

    fn perform(&mut self) -> usize {
        self.runtime.block_on(tokio::task::yield_now());
        self.running_count()
    }

    fn timeout(&self) -> Option<Duration> {
        if self.completions_rx.is_empty() {
            None
        } else {
            Some(Duration::ZERO)
        }
    }

    fn wait(&mut self, timeout: Duration) -> Result<Readiness> {
        if self.running.is_empty() {
            return Ok(Readiness::Idle);
        }

        let finished = Arc::clone(&self.finished);
        let outcome = self
            .runtime
            .block_on(async move { tokio::time::timeout(timeout, finished.notified()).await });

        Ok(match outcome {
            Ok(()) => Readiness::Ready,
            Err(_) => Readiness::TimedOut,
        })
    }

    fn next_completion(&mut self) -> Option<CompletionMessage> {
        self.completions_rx.try_recv().ok()
    }

    fn remove(&mut self, id: TransferId) {
        if let Some(handle) = self.running.remove(&id) {
            if !handle.is_finished() {
                tracing::debug!(transfer_id = %id, "Aborting unfinished transfer");
                handle.abort();
            }
        }
    }

    fn release(&mut self, id: TransferId) {
        self.prepared.remove(&id);
    }
}

/// Send the request and stream the body into `sink`.
async fn run_transfer(
    client: &reqwest::Client,
    request: reqwest::Request,
    sink: &ResponseSink,
) -> TransferStatus {
    let mut response = match client.execute(request).await {
        Ok(response) => response,
        Err(e) => {
            return TransferStatus::Failed {
                status: None,
                reason: e.to_string(),
            }
        }
    };

    let status = response.status().as_u16();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                sink.write(&chunk);
            }
            Ok(None) => return TransferStatus::Done { status },
            Err(e) => {
                return TransferStatus::Failed {
                    status: Some(status),
                    reason: e.to_string(),
                }
            }
        }
    }
}
