use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::{Conversational, DEFAULT_MAX_TURNS, WEB_SEARCH_TOOL};
use crate::llm::{ConversationMessage, Reply, ToolInvocation};
use crate::search::{WebSearch, format_results};

pub const NO_QUERY_MESSAGE: &str =
    "Error: No query provided for web search. Please provide a specific search query.";
pub const NO_RESULTS_MESSAGE: &str = "No results found.";

const COMPLETION_MARKER: &str = "complete";

/// What one loop run produced.
#[derive(Debug, Clone, Default)]
pub struct LoopOutcome {
    /// Trimmed concatenation of every text reply.
    pub text: String,
    /// Links from search hits, first-seen order, no duplicates.
    pub sources: Vec<String>,
    pub transcript: Vec<ConversationMessage>,
}

/// Drives one agent through a bounded number of turns, executing
/// `web_search` calls on its behalf.
#[derive(Clone)]
pub struct ToolLoop {
    search: Arc<dyn WebSearch>,
    max_turns: usize,
}

impl ToolLoop {
    pub fn new(search: Arc<dyn WebSearch>) -> Self {
        Self {
            search,
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub async fn run(&self, agent: &dyn Conversational, initial_prompt: &str) -> LoopOutcome {
        let mut transcript = vec![ConversationMessage::user(initial_prompt)];
        let mut text = String::new();
        let mut sources = SourceList::default();

        for turn in 1..=self.max_turns {
            let reply = match agent.reply(&transcript).await {
                Ok(Some(reply)) => reply,
                Ok(None) => {
                    error!(agent = agent.name(), turn, "agent returned no reply");
                    break;
                }
                Err(err) => {
                    error!(agent = agent.name(), turn, error = %err, "agent reply failed");
                    break;
                }
            };

            match reply {
                Reply::ToolCall(call) => {
                    if let Some(observation) = self.dispatch(&call, &mut sources).await {
                        transcript.push(ConversationMessage::function(WEB_SEARCH_TOOL, observation));
                    }
                }
                Reply::Text(content) if content.trim().is_empty() => {
                    warn!(agent = agent.name(), turn, "reply has no content or function call");
                    break;
                }
                Reply::Text(content) => {
                    debug!(agent = agent.name(), turn, preview = %preview(&content), "content received");
                    text.push_str(&content);
                    text.push('\n');
                    let finished = content.to_lowercase().contains(COMPLETION_MARKER);
                    transcript.push(ConversationMessage::assistant(content));
                    if finished {
                        info!(agent = agent.name(), turn, "completion signal received");
                        break;
                    }
                }
            }
        }

        LoopOutcome {
            text: text.trim().to_string(),
            sources: sources.into_vec(),
            transcript,
        }
    }

    /// Execute a tool call. `None` means nothing is appended for this turn.
    async fn dispatch(&self, call: &ToolInvocation, sources: &mut SourceList) -> Option<String> {
        info!(function = %call.function_name, arguments = %call.arguments, "function call");

        if call.function_name != WEB_SEARCH_TOOL {
            warn!(function = %call.function_name, "unknown function called");
            return None;
        }

        let arguments = parse_arguments(&call.arguments)?;
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|query| !query.is_empty());

        let Some(query) = query else {
            error!("no 'query' found in function call arguments");
            return Some(NO_QUERY_MESSAGE.to_string());
        };

        info!(%query, "executing web_search");
        let observation = match self.search.search(query).await {
            Ok(results) if results.is_empty() => NO_RESULTS_MESSAGE.to_string(),
            Ok(results) => {
                for result in &results {
                    sources.push(&result.link);
                }
                format_results(&results)
            }
            Err(failure) => failure.to_string(),
        };
        debug!(preview = %preview(&observation), "web search result");
        Some(observation)
    }
}

/// Accepts an object or a JSON-encoded object. A string that is not JSON is
/// malformed; any other shape parses to no arguments at all.
fn parse_arguments(arguments: &Value) -> Option<Map<String, Value>> {
    match arguments {
        Value::Object(map) => Some(map.clone()),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Some(map),
            Ok(_) => Some(Map::new()),
            Err(err) => {
                error!(arguments = %raw, error = %err, "failed to parse arguments");
                None
            }
        },
        _ => Some(Map::new()),
    }
}

fn preview(text: &str) -> String {
    text.chars().take(100).collect()
}

#[derive(Default)]
struct SourceList {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl SourceList {
    fn push(&mut self, link: &str) {
        if !link.is_empty() && self.seen.insert(link.to_string()) {
            self.ordered.push(link.to_string());
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_arguments_are_decoded() {
        let parsed = parse_arguments(&json!("{\"query\": \"rust\"}")).unwrap();
        assert_eq!(parsed["query"], "rust");
    }

    #[test]
    fn invalid_json_string_is_malformed() {
        assert!(parse_arguments(&json!("{query: rust")).is_none());
    }

    #[test]
    fn non_object_shapes_have_no_query() {
        assert!(parse_arguments(&json!(["rust"])).unwrap().is_empty());
        assert!(parse_arguments(&json!("\"rust\"")).unwrap().is_empty());
        assert!(parse_arguments(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn sources_keep_first_seen_order() {
        let mut sources = SourceList::default();
        for link in ["https://b", "https://a", "https://b", "", "https://c"] {
            sources.push(link);
        }
        assert_eq!(sources.into_vec(), vec!["https://b", "https://a", "https://c"]);
    }
}
