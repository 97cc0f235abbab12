// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::{CompletionRequest, StreamEvent};

pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Stable driver id for status display and logging.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Send a completion request and return the normalized event stream.
    ///
    /// `Err` is reserved for fatal configuration problems (e.g. no API key);
    /// everything that happens after the request leaves the process — HTTP
    /// error statuses, transport resets, rate limits past the retry budget —
    /// arrives in-band as a terminal [`StreamEvent::Error`].
    async fn stream(&self, req: CompletionRequest) -> anyhow::Result<EventStream>;
}
