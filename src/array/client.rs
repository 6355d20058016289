//! Array Client
//!
//! Thin verb helpers over an [`ArrayTransport`], shared by every component
//! of the mapping engine and the volume shim.

use crate::array::envelope::Envelope;
use crate::domain::ports::{ArrayRequest, ArrayTransport, ArrayTransportRef, HttpVerb};
use crate::error::Result;
use serde_json::Value;
use std::sync::Arc;

/// Cheaply cloneable handle on an array session
#[derive(Clone)]
pub struct ArrayClient {
    transport: ArrayTransportRef,
}

impl ArrayClient {
    pub fn new(transport: Arc<dyn ArrayTransport>) -> Self {
        Self { transport }
    }

    pub async fn call(
        &self,
        verb: HttpVerb,
        path: impl Into<String>,
        body: Option<Value>,
    ) -> Result<Envelope> {
        self.transport
            .send(ArrayRequest {
                verb,
                path: path.into(),
                body,
            })
            .await
    }

    pub async fn get(&self, path: impl Into<String>) -> Result<Envelope> {
        self.call(HttpVerb::Get, path, None).await
    }

    pub async fn post(&self, path: impl Into<String>, body: Value) -> Result<Envelope> {
        self.call(HttpVerb::Post, path, Some(body)).await
    }

    pub async fn put(&self, path: impl Into<String>, body: Value) -> Result<Envelope> {
        self.call(HttpVerb::Put, path, Some(body)).await
    }

    pub async fn delete(&self, path: impl Into<String>, body: Option<Value>) -> Result<Envelope> {
        self.call(HttpVerb::Delete, path, body).await
    }
}
