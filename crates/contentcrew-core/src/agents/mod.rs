//! Role-configured conversational agents.
//!
//! The three roles share one implementation; they differ only in their
//! instructions and in whether the `web_search` tool is declared.

mod interpreter;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::Result;
use crate::llm::{ConversationMessage, LanguageModel, ModelConfig, ModelRequest, Reply, ToolSchema};

pub use interpreter::{LoopOutcome, ToolLoop, NO_QUERY_MESSAGE, NO_RESULTS_MESSAGE};

/// Turn budget for the tool-calling loop when none is configured.
pub const DEFAULT_MAX_TURNS: usize = 5;

pub const WEB_SEARCH_TOOL: &str = "web_search";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Writer,
    Researcher,
    FactChecker,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Writer => "writer",
            AgentRole::Researcher => "researcher",
            AgentRole::FactChecker => "fact_checker",
        }
    }
}

/// The single capability the interpreter loop and the pipeline depend on.
#[async_trait]
pub trait Conversational: Send + Sync {
    fn name(&self) -> &str;

    /// Next reply given the full conversation so far.
    async fn reply(&self, history: &[ConversationMessage]) -> Result<Option<Reply>>;
}

/// Instructions, tools and model settings for one role.
#[derive(Clone)]
pub struct Agent {
    role: AgentRole,
    name: String,
    instructions: String,
    tools: Vec<ToolSchema>,
    config: ModelConfig,
    model: Arc<dyn LanguageModel>,
}

impl Agent {
    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn tools(&self) -> &[ToolSchema] {
        &self.tools
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("role", &self.role)
            .field("name", &self.name)
            .field("tools", &self.tools.len())
            .finish()
    }
}

#[async_trait]
impl Conversational for Agent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn reply(&self, history: &[ConversationMessage]) -> Result<Option<Reply>> {
        debug!(agent = %self.name, messages = history.len(), "requesting agent reply");
        let request = ModelRequest {
            role: self.role,
            instructions: self.instructions.clone(),
            messages: history.to_vec(),
            tools: self.tools.clone(),
            config: self.config.clone(),
        };
        self.model.reply(request).await
    }
}

/// The three agents one pipeline run needs.
#[derive(Debug, Clone)]
pub struct AgentSet {
    pub writer: Agent,
    pub researcher: Agent,
    pub fact_checker: Agent,
}

/// Builds agents for a subject-matter category. Building never touches the
/// network and never validates the model settings.
#[derive(Clone)]
pub struct AgentFactory {
    config: ModelConfig,
    model: Arc<dyn LanguageModel>,
}

impl AgentFactory {
    pub fn new(config: ModelConfig, model: Arc<dyn LanguageModel>) -> Self {
        Self { config, model }
    }

    pub fn build(&self, category: &str) -> AgentSet {
        AgentSet {
            writer: self.writer(category),
            researcher: self.researcher(category),
            fact_checker: self.fact_checker(category),
        }
    }

    pub fn writer(&self, category: &str) -> Agent {
        self.agent(
            AgentRole::Writer,
            "ArticleGenerator",
            format!(
                "You are an expert in {category} and content creation. \
                 Your task is to generate informative and engaging article drafts on trending {category} topics."
            ),
            Vec::new(),
        )
    }

    pub fn researcher(&self, category: &str) -> Agent {
        self.agent(
            AgentRole::Researcher,
            "ResearchAgent",
            format!(
                "You are an AI assistant specialized in researching various given topics. \
                 Your task is to gather relevant information from the web and existing knowledge bases \
                 to assist in creating comprehensive and accurate articles in the field of {category}. \
                 Always use the 'web_search' function to collect information. \
                 When using the web_search function, you MUST provide a specific query string. \
                 After gathering sufficient information, provide a summary of your findings. \
                 End your research with 'Research complete.' when you've finished the process."
            ),
            vec![web_search_tool(
                "The search query. This must be a non-empty string.",
            )],
        )
    }

    pub fn fact_checker(&self, category: &str) -> Agent {
        self.agent(
            AgentRole::FactChecker,
            "FactChecker",
            format!(
                "You are an AI assistant specialized in fact-checking and verification in the field of {category}. \
                 Your task is to analyze the provided article content, verify the factual accuracy \
                 using web search, and highlight any discrepancies or confirm correctness. \
                 Always use the 'web_search' function to verify information. \
                 After fact-checking, provide a summary of your findings. \
                 Your fact-checking process should include the following steps:\n\
                 1. Identify key claims or statements in the article.\n\
                 2. Use the web_search function to verify each claim.\n\
                 3. Compare the search results with the article's content.\n\
                 4. Highlight any discrepancies or inaccuracies found.\n\
                 5. Provide a summary of your findings, including both correct and incorrect information.\n\
                 6. End your report with 'Fact-checking complete.' when you've finished the process."
            ),
            vec![web_search_tool("The search query.")],
        )
    }

    fn agent(
        &self,
        role: AgentRole,
        name: &str,
        instructions: String,
        tools: Vec<ToolSchema>,
    ) -> Agent {
        Agent {
            role,
            name: name.to_string(),
            instructions,
            tools,
            config: self.config.clone(),
            model: self.model.clone(),
        }
    }
}

fn web_search_tool(query_description: &str) -> ToolSchema {
    ToolSchema {
        name: WEB_SEARCH_TOOL.to_string(),
        description: "Search the web for information.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": query_description,
                    "minLength": 1
                }
            },
            "required": ["query"]
        }),
    }
}
