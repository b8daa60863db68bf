//! Scripted transports for engine unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::{Result, TernError};
use crate::provider::{ChatRequest, ChatTransport};
use crate::types::StreamDelta;

enum Script {
    Fail,
    Reply(Vec<StreamDelta>),
}

/// Transport that replays a queue of scripted turns and records every
/// request it receives.
pub(crate) struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    pub attempts: AtomicUsize,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            attempts: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue one connection failure.
    pub fn fail_once(self) -> Self {
        self.scripts
            .lock()
            .expect("scripts lock poisoned")
            .push_back(Script::Fail);
        self
    }

    /// Queue one successful turn replaying the given deltas.
    pub fn then_reply(self, deltas: Vec<StreamDelta>) -> Self {
        self.scripts
            .lock()
            .expect("scripts lock poisoned")
            .push_back(Script::Reply(deltas));
        self
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn stream_chat(
        &self,
        request: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamDelta>>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("requests lock poisoned")
            .push(request.clone());

        let script = self
            .scripts
            .lock()
            .expect("scripts lock poisoned")
            .pop_front();
        match script {
            Some(Script::Fail) => Err(TernError::Stream("scripted connection failure".into())),
            Some(Script::Reply(deltas)) => {
                Ok(futures::stream::iter(deltas.into_iter().map(Ok)).boxed())
            }
            None => Err(TernError::Stream("no scripted response left".into())),
        }
    }
}

/// Transport whose every attempt fails at connection establishment.
pub(crate) struct FailingTransport {
    pub attempts: AtomicUsize,
}

impl FailingTransport {
    pub fn new() -> Self {
        Self {
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ChatTransport for FailingTransport {
    async fn stream_chat(
        &self,
        _request: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamDelta>>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(TernError::Stream("scripted connection failure".into()))
    }
}
