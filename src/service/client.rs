//! Public request API.
//!
//! # Design
//! `HttpService` owns the sending half of the submission channel and the
//! worker thread. Callers never touch the registry or the transport: a
//! submission validates the request, passes the lifecycle gate and hands a
//! `RequestDescriptor` to the worker, which does everything else.

use std::path::Path;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use serde::Serialize;

use crate::config::{load_config, validate_config, ConfigError, ServiceConfig, WorkerConfig};
use crate::error::{Error, Result};
use crate::lifecycle::{Lifecycle, LoopState};
use crate::request::{CompletionAction, Deferred, RequestDescriptor, Response};
use crate::service::event_loop::EventLoop;
use crate::transport::{HttpMultiplexer, Method, Multiplexer, TransferSpec};

/// Asynchronous HTTP client driven by one background worker.
///
/// All request methods are non-blocking and may be called from any thread.
/// Dropping the service shuts it down, waiting for in-flight requests.
pub struct HttpService {
    submissions: Sender<RequestDescriptor>,
    lifecycle: Arc<Lifecycle>,
    worker_id: ThreadId,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl HttpService {
    /// Start a service on the reqwest transport.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let mux = HttpMultiplexer::new(&config.transport)?;
        Self::with_transport(&config.worker, mux)
    }

    /// Load a TOML configuration file and start a service from it.
    pub fn from_config_file(path: &Path) -> Result<Self> {
        Self::new(load_config(path)?)
    }

    /// Start a service on an arbitrary transport.
    pub fn with_transport<M>(config: &WorkerConfig, mux: M) -> Result<Self>
    where
        M: Multiplexer + 'static,
    {
        let (submissions, receiver) = mpsc::channel();
        let lifecycle = Arc::new(Lifecycle::new());
        let event_loop = EventLoop::new(mux, receiver, Arc::clone(&lifecycle), config);

        let worker = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || event_loop.run())
            .map_err(Error::Spawn)?;

        tracing::info!(thread = %config.thread_name, "HTTP service started");

        Ok(Self {
            submissions,
            lifecycle,
            worker_id: worker.thread().id(),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// GET `url`; the returned handle resolves with the response.
    pub fn get(&self, url: &str) -> Result<Deferred> {
        let (action, deferred) = CompletionAction::deferred();
        self.submit(Method::Get, url, action, None)?;
        Ok(deferred)
    }

    /// GET `url`; `on_done` runs once on the worker thread.
    pub fn get_with<F>(&self, url: &str, on_done: F) -> Result<()>
    where
        F: FnOnce(Response) + Send + 'static,
    {
        self.submit(Method::Get, url, CompletionAction::callback(on_done), None)
    }

    /// POST `body` to `url` as `application/json`.
    pub fn post(&self, url: &str, body: impl Into<String>) -> Result<Deferred> {
        let (action, deferred) = CompletionAction::deferred();
        self.submit(Method::Post, url, action, Some(body.into()))?;
        Ok(deferred)
    }

    /// POST `body` to `url`; `on_done` runs once on the worker thread.
    pub fn post_with<F>(&self, url: &str, body: impl Into<String>, on_done: F) -> Result<()>
    where
        F: FnOnce(Response) + Send + 'static,
    {
        self.submit(
            Method::Post,
            url,
            CompletionAction::callback(on_done),
            Some(body.into()),
        )
    }

    /// Serialize `value` with serde_json and POST it.
    pub fn post_json<T>(&self, url: &str, value: &T) -> Result<Deferred>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_string(value).map_err(|e| Error::transfer_init(url, e))?;
        self.post(url, body)
    }

    fn submit(
        &self,
        method: Method,
        url: &str,
        action: CompletionAction,
        body: Option<String>,
    ) -> Result<()> {
        let spec = TransferSpec::new(method, url, body)?;
        let descriptor = RequestDescriptor::new(spec, action);
        let request_id = descriptor.request_id();

        self.lifecycle.admit(|| {
            self.submissions
                .send(descriptor)
                .map_err(|_| Error::ShuttingDown)
        })?;

        tracing::debug!(%request_id, %method, url, "Request submitted");
        Ok(())
    }

    /// Requests accepted and not yet completed.
    pub fn in_flight(&self) -> usize {
        self.lifecycle.in_flight()
    }

    /// Requests in the worker's registry as of its last iteration.
    pub fn registered(&self) -> usize {
        self.lifecycle.registered()
    }

    pub fn state(&self) -> LoopState {
        self.lifecycle.state()
    }

    /// Stop accepting requests, then wait for the worker to drain and exit.
    ///
    /// Idempotent. Called from a completion callback it only closes the
    /// gate, since the worker cannot wait for itself.
    pub fn shutdown(&self) -> Result<()> {
        self.lifecycle.trigger();

        // Another thread may hold the handle while it joins the worker.
        if thread::current().id() == self.worker_id {
            tracing::debug!("Shutdown requested from the worker thread, not waiting");
            return Ok(());
        }

        let mut worker = self.worker.lock().unwrap_or_else(|p| p.into_inner());
        let Some(handle) = worker.take() else {
            return Ok(());
        };

        tracing::info!(in_flight = self.in_flight(), "Shutdown requested, draining");
        handle.join().map_err(|_| Error::WorkerPanicked)?;
        tracing::info!(state = ?self.state(), "HTTP service stopped");
        Ok(())
    }
}

impl Drop for HttpService {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::error!(error = %err, "HTTP service shutdown failed");
        }
    }
}

impl std::fmt::Debug for HttpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpService")
            .field("state", &self.state())
            .field("accepting", &self.lifecycle.is_accepting())
            .field("in_flight", &self.in_flight())
            .field("registered", &self.registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ScriptedMultiplexer, ScriptedReply};

    fn worker_config() -> WorkerConfig {
        WorkerConfig {
            idle_sleep_ms: 5,
            ..WorkerConfig::default()
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = ServiceConfig::default();
        config.worker.max_wait_ms = 0;
        let err = HttpService::new(config).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Validation(_))));
    }

    #[test]
    fn invalid_url_fails_synchronously() {
        let service = HttpService::with_transport(
            &worker_config(),
            ScriptedMultiplexer::new(|_| ScriptedReply::ok("")),
        )
        .unwrap();
        let err = service.get("::not a url::").unwrap_err();
        assert!(matches!(err, Error::TransferInit { .. }));
        assert_eq!(service.in_flight(), 0);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let service = HttpService::with_transport(
            &worker_config(),
            ScriptedMultiplexer::new(|_| ScriptedReply::ok("")),
        )
        .unwrap();
        service.shutdown().unwrap();
        service.shutdown().unwrap();
        assert_eq!(service.state(), LoopState::Stopped);
        assert!(matches!(service.get("http://x/"), Err(Error::ShuttingDown)));
    }

    #[test]
    fn boxed_transport_is_accepted() {
        let mux: Box<dyn Multiplexer> =
            Box::new(ScriptedMultiplexer::new(|_| ScriptedReply::ok("boxed")));
        let service = HttpService::with_transport(&worker_config(), mux).unwrap();
        let response = service.get("http://x/").unwrap().wait().unwrap();
        assert_eq!(response.text(), "boxed");
    }

    #[test]
    fn post_json_serializes_value() {
        let mux = ScriptedMultiplexer::new(ScriptedReply::echo);
        let service = HttpService::with_transport(&worker_config(), mux).unwrap();
        let response = service
            .post_json("http://x/echo", &serde_json::json!({ "a": 1 }))
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(response.text(), r#"{"a":1}"#);
    }

    #[test]
    fn starts_from_config_file() {
        let path = std::env::temp_dir().join(format!("http-service-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            "[worker]\nthread_name = \"configured-worker\"\nidle_sleep_ms = 5\n\n[transport]\nsystem_proxy = false\n",
        )
        .unwrap();

        let service = HttpService::from_config_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let (tx, rx) = mpsc::channel();
        service
            .get_with("http://127.0.0.1:9/", move |response| {
                let name = thread::current().name().map(str::to_owned);
                tx.send((name, response)).unwrap();
            })
            .unwrap();

        let (name, response) = rx.recv_timeout(std::time::Duration::from_secs(10)).unwrap();
        assert_eq!(name.as_deref(), Some("configured-worker"));
        assert!(response.failure.is_some());
        service.shutdown().unwrap();
    }

    #[test]
    fn invalid_config_file_is_rejected() {
        let path = std::env::temp_dir().join(format!("http-service-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[worker]\nidle_sleep_ms = 0\n").unwrap();

        let err = HttpService::from_config_file(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, Error::Config(ConfigError::Validation(_))));
    }
}
