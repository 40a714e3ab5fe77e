//! Request descriptor: one logical request from submission to completion.

use url::Url;
use uuid::Uuid;

use crate::error::Error;
use crate::request::completion::{CompletionAction, Response};
use crate::transport::{Method, ResponseSink, TransferId, TransferSpec, TransferStatus};

/// A submitted request and everything needed to complete it.
#[derive(Debug)]
pub struct RequestDescriptor {
    request_id: Uuid,
    spec: TransferSpec,
    sink: ResponseSink,
    transfer: Option<TransferId>,
    action: CompletionAction,
}

impl RequestDescriptor {
    pub fn new(spec: TransferSpec, action: CompletionAction) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            spec,
            sink: ResponseSink::new(),
            transfer: None,
            action,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn method(&self) -> Method {
        self.spec.method()
    }

    pub fn url(&self) -> &Url {
        self.spec.url()
    }

    pub fn body(&self) -> Option<&str> {
        self.spec.body()
    }

    pub fn spec(&self) -> &TransferSpec {
        &self.spec
    }

    /// Handle to the response buffer, for the transport to write into.
    pub fn sink(&self) -> ResponseSink {
        self.sink.clone()
    }

    pub fn transfer(&self) -> Option<TransferId> {
        self.transfer
    }

    /// Record the transfer created for this request. Set exactly once.
    pub fn bind(&mut self, id: TransferId) {
        debug_assert!(self.transfer.is_none(), "descriptor bound twice");
        self.transfer = Some(id);
    }

    /// Run the completion action with the buffered body.
    pub fn complete(self, status: TransferStatus) -> bool {
        let response = Response::from_transfer(self.sink.take(), status);
        self.action.complete(response)
    }

    /// Complete without a transfer, reporting why it never started.
    pub fn reject(self, err: &Error) -> bool {
        self.action.complete(Response::rejected(err))
    }
}
