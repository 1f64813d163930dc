//! Deterministic stand-ins for the model and search boundaries so the whole
//! pipeline can run offline.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::agents::AgentRole;
use crate::llm::{LanguageModel, ModelRequest, Reply, ToolInvocation};
use crate::search::{SearchFailure, SearchResult, WebSearch};
use crate::{ContentError, Result};

/// One queued model turn.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    ToolCall { name: String, arguments: Value },
    Empty,
    Failure(String),
}

#[derive(Default)]
struct ScriptedModelState {
    queues: HashMap<AgentRole, VecDeque<ScriptedReply>>,
    requests: Vec<ModelRequest>,
}

/// Language model that replays per-role scripts and records every request.
/// An exhausted script answers with no reply.
#[derive(Default)]
pub struct ScriptedModel {
    state: Mutex<ScriptedModelState>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ScriptedModelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, role: AgentRole, reply: ScriptedReply) -> &Self {
        self.state()
            .queues
            .entry(role)
            .or_default()
            .push_back(reply);
        self
    }

    pub fn text(&self, role: AgentRole, text: impl Into<String>) -> &Self {
        self.enqueue(role, ScriptedReply::Text(text.into()))
    }

    pub fn tool_call(&self, role: AgentRole, name: impl Into<String>, arguments: Value) -> &Self {
        self.enqueue(
            role,
            ScriptedReply::ToolCall {
                name: name.into(),
                arguments,
            },
        )
    }

    pub fn empty(&self, role: AgentRole) -> &Self {
        self.enqueue(role, ScriptedReply::Empty)
    }

    pub fn failure(&self, role: AgentRole, message: impl Into<String>) -> &Self {
        self.enqueue(role, ScriptedReply::Failure(message.into()))
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.state().requests.clone()
    }

    pub fn requests_for(&self, role: AgentRole) -> Vec<ModelRequest> {
        self.state()
            .requests
            .iter()
            .filter(|request| request.role == role)
            .cloned()
            .collect()
    }

    pub fn remaining(&self, role: AgentRole) -> usize {
        self.state().queues.get(&role).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn reply(&self, request: ModelRequest) -> Result<Option<Reply>> {
        let mut state = self.state();
        let next = state
            .queues
            .get_mut(&request.role)
            .and_then(VecDeque::pop_front);
        state.requests.push(request);
        drop(state);

        match next {
            Some(ScriptedReply::Text(text)) => Ok(Some(Reply::Text(text))),
            Some(ScriptedReply::ToolCall { name, arguments }) => {
                Ok(Some(Reply::ToolCall(ToolInvocation {
                    function_name: name,
                    arguments,
                })))
            }
            Some(ScriptedReply::Failure(message)) => Err(ContentError::Model(message)),
            Some(ScriptedReply::Empty) | None => Ok(None),
        }
    }
}

enum StubBehaviour {
    Results(Vec<SearchResult>),
    Failure(SearchFailure),
    Unconfigured,
}

/// Search client returning canned hits or a canned failure.
pub struct StubSearch {
    behaviour: StubBehaviour,
    queries: Mutex<Vec<String>>,
}

impl StubSearch {
    pub fn with_results(results: Vec<SearchResult>) -> Self {
        Self::new(StubBehaviour::Results(results))
    }

    /// Ready, but every search fails with `failure`.
    pub fn failing(failure: SearchFailure) -> Self {
        Self::new(StubBehaviour::Failure(failure))
    }

    /// Behaves like a client with no credential configured.
    pub fn unconfigured() -> Self {
        Self::new(StubBehaviour::Unconfigured)
    }

    fn new(behaviour: StubBehaviour) -> Self {
        Self {
            behaviour,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.queries().len()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// A hit whose snippet mentions the title.
pub fn sample_result(title: &str, link: &str) -> SearchResult {
    SearchResult {
        title: title.to_string(),
        snippet: format!("Snippet about {title}"),
        link: link.to_string(),
        full_content: None,
    }
}

#[async_trait]
impl WebSearch for StubSearch {
    async fn search(&self, query: &str) -> std::result::Result<Vec<SearchResult>, SearchFailure> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.to_string());

        match &self.behaviour {
            StubBehaviour::Results(results) => Ok(results.clone()),
            StubBehaviour::Failure(failure) => Err(failure.clone()),
            StubBehaviour::Unconfigured => Err(SearchFailure::MissingCredential),
        }
    }

    fn ensure_ready(&self) -> std::result::Result<(), SearchFailure> {
        match self.behaviour {
            StubBehaviour::Unconfigured => Err(SearchFailure::MissingCredential),
            _ => Ok(()),
        }
    }
}
