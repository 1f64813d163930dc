//! ContentCrew core abstractions built directly on top of `graph_flow`.
//!
//! This crate provides the search client, the model boundary, the agent
//! factory, the tool-calling interpreter loop and the graph tasks that turn a
//! category and topic into a researched, drafted, fact-checked and revised
//! article.

pub mod agents;
mod config;
mod error;
mod export;
pub mod llm;
mod metrics;
mod pipeline;
mod prompts;
pub mod search;
mod security;
pub mod store;
mod tasks;
mod telemetry;
pub mod testing;
mod trace;
mod workflow;

pub use agents::{
    Agent, AgentFactory, AgentRole, AgentSet, Conversational, DEFAULT_MAX_TURNS, LoopOutcome,
    NO_QUERY_MESSAGE, NO_RESULTS_MESSAGE, ToolLoop, WEB_SEARCH_TOOL,
};
pub use config::{
    Config, ConfigLoader, LlmConfig, LoggingConfig, PipelineConfig, SearchConfig,
};
pub use error::{ContentError, ERROR_PREFIX, Result, is_error_sentinel};
pub use export::{SavedArtifact, save_artifact};
pub use llm::{
    ConversationMessage, LanguageModel, MessageRole, ModelConfig, ModelRequest, OpenAiChatModel,
    Reply, ToolInvocation, ToolSchema,
};
pub use pipeline::{
    ContentPipeline, NO_ARTICLE, NO_FACT_CHECK, NO_RESEARCH, PLACEHOLDER_CONTENT,
    PLACEHOLDER_TITLE, PipelineArtifact, REVISION_FAILED,
};
pub use search::{SearchFailure, SearchResult, SerpApiClient, WebSearch};
pub use security::{SecretValue, optional_env, require_env};
pub use store::{
    ArticlePage, ArticleRecord, ArticleStore, DraftRecord, DynArticleStore, MemoryArticleStore,
    PostgresArticleStore, normalize_paging,
};
pub use tasks::{
    DraftTask, FactCheckTask, FeedbackReviseTask, ResearchTask, ReviseTask, TitleTask,
};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use trace::{TraceCollector, TraceEvent, TraceStep, TraceSummary};
pub use workflow::{
    FeedbackRequest, GenerationOutcome, GenerationRequest, run_feedback_revision, run_generation,
};
