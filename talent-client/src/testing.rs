//! Scripted transport for orchestration unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use talent_core::error::TransportError;
use talent_core::gateway::{ServiceEndpoint, Transport};
use talent_core::models::Principal;

use crate::session::{Session, SessionContext};

pub const USER: &str = "rrkah-fqaaa-aaaaa-aaaaq-cai";
pub const ADMIN: &str = "qjdnr-maaaa-aaaaa-aaaqq-cai";
pub const FACTORY: &str = "ryjl3-tyaaa-aaaaa-aaaba-cai";

pub fn principal(text: &str) -> Principal {
    Principal::parse(text).unwrap()
}

#[derive(Debug, Clone)]
pub struct Call {
    pub endpoint: String,
    pub method: String,
    pub args: Value,
}

enum Scripted {
    Reply(Value),
    Unreachable,
}

#[derive(Default)]
struct Script {
    replies: HashMap<String, VecDeque<Scripted>>,
    calls: Vec<Call>,
}

/// Answers calls from per-method queues. The last queued answer repeats.
/// Keys are either `method` or `endpoint/method`; the latter wins.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, key: &str, value: Value) -> &Self {
        self.push(key, Scripted::Reply(value))
    }

    pub fn unreachable(&self, key: &str) -> &Self {
        self.push(key, Scripted::Unreachable)
    }

    fn push(&self, key: &str, entry: Scripted) -> &Self {
        self.script
            .lock()
            .unwrap()
            .replies
            .entry(key.to_string())
            .or_default()
            .push_back(entry);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls().iter().filter(|c| c.method == method).count()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.method).collect()
    }

    pub fn into_transport(self) -> Arc<dyn Transport> {
        Arc::new(self)
    }

    /// Sign in `identity` over this transport.
    pub fn session_for(&self, identity: &str) -> (SessionContext, Arc<Session>) {
        let context = SessionContext::new();
        let session = context.sign_in(
            principal(identity),
            self.clone().into_transport(),
            principal(FACTORY),
        );
        (context, session)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn invoke(
        &self,
        endpoint: &ServiceEndpoint,
        method: &str,
        args: Value,
    ) -> Result<Value, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(Call {
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            args,
        });

        let specific = format!("{}/{}", endpoint, method);
        let queue = if script.replies.contains_key(&specific) {
            script.replies.get_mut(&specific)
        } else {
            script.replies.get_mut(method)
        };

        let entry = match queue {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().map(|e| match e {
                Scripted::Reply(v) => Scripted::Reply(v.clone()),
                Scripted::Unreachable => Scripted::Unreachable,
            }),
            None => None,
        };

        match entry {
            Some(Scripted::Reply(value)) => Ok(value),
            Some(Scripted::Unreachable) => Err(TransportError::Unreachable {
                endpoint: endpoint.clone(),
                message: "connection refused".to_string(),
            }),
            None => Err(TransportError::Unreachable {
                endpoint: endpoint.clone(),
                message: format!("no scripted reply for {}", method),
            }),
        }
    }
}
