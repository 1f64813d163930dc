use std::sync::Arc;

use contentcrew_core::testing::{ScriptedModel, StubSearch, sample_result};
use contentcrew_core::{
    AgentFactory, AgentRole, MessageRole, ModelConfig, NO_QUERY_MESSAGE, NO_RESULTS_MESSAGE,
    SearchFailure, ToolLoop, WEB_SEARCH_TOOL,
};
use serde_json::json;

fn factory(model: &Arc<ScriptedModel>) -> AgentFactory {
    AgentFactory::new(ModelConfig::default(), model.clone())
}

fn hits() -> Arc<StubSearch> {
    Arc::new(StubSearch::with_results(vec![
        sample_result("DeFi growth", "https://defi.example/growth"),
        sample_result("DeFi risks", "https://defi.example/risks"),
    ]))
}

#[tokio::test]
async fn single_web_search_appends_one_function_message() {
    let model = Arc::new(ScriptedModel::new());
    model
        .tool_call(AgentRole::FactChecker, WEB_SEARCH_TOOL, json!({"query": "DeFi 2024"}))
        .text(AgentRole::FactChecker, "Claims verified. Fact-checking complete.");
    let search = hits();
    let checker = factory(&model).fact_checker("Finance");

    let outcome = ToolLoop::new(search.clone()).run(&checker, "check this").await;

    assert_eq!(search.queries(), vec!["DeFi 2024".to_string()]);
    let requests = model.requests_for(AgentRole::FactChecker);
    assert_eq!(requests.len(), 2);

    let second_turn = &requests[1].messages;
    assert_eq!(second_turn.len(), 2);
    assert_eq!(second_turn[1].role, MessageRole::Function);
    assert_eq!(second_turn[1].name.as_deref(), Some(WEB_SEARCH_TOOL));
    assert!(second_turn[1].content.starts_with("Title: DeFi growth\nSnippet:"));
    assert!(second_turn[1].content.contains("\n\nTitle: DeFi risks"));

    assert_eq!(outcome.text, "Claims verified. Fact-checking complete.");
    assert_eq!(
        outcome.sources,
        vec!["https://defi.example/growth", "https://defi.example/risks"]
    );
    assert_eq!(outcome.transcript.len(), 3);
}

#[tokio::test]
async fn json_string_arguments_are_accepted() {
    let model = Arc::new(ScriptedModel::new());
    model
        .tool_call(AgentRole::Researcher, WEB_SEARCH_TOOL, json!("{\"query\": \"solid state batteries\"}"))
        .text(AgentRole::Researcher, "Research complete.");
    let search = hits();
    let researcher = factory(&model).researcher("Energy");

    ToolLoop::new(search.clone()).run(&researcher, "go").await;
    assert_eq!(search.queries(), vec!["solid state batteries".to_string()]);
}

#[tokio::test]
async fn malformed_arguments_skip_the_turn_but_consume_budget() {
    let model = Arc::new(ScriptedModel::new());
    for _ in 0..3 {
        model.tool_call(AgentRole::Researcher, WEB_SEARCH_TOOL, json!("{query: oops"));
    }
    model.text(AgentRole::Researcher, "never reached");
    let search = hits();
    let researcher = factory(&model).researcher("Energy");

    let outcome = ToolLoop::new(search.clone())
        .with_max_turns(3)
        .run(&researcher, "go")
        .await;

    assert_eq!(model.requests().len(), 3);
    assert_eq!(model.remaining(AgentRole::Researcher), 1);
    assert_eq!(search.calls(), 0);
    assert_eq!(outcome.transcript.len(), 1);
    assert!(outcome.text.is_empty());
}

#[tokio::test]
async fn missing_query_gets_an_instructional_observation() {
    let model = Arc::new(ScriptedModel::new());
    model
        .tool_call(AgentRole::Researcher, WEB_SEARCH_TOOL, json!({"q": "wrong key"}))
        .tool_call(AgentRole::Researcher, WEB_SEARCH_TOOL, json!({"query": "   "}))
        .text(AgentRole::Researcher, "Research complete.");
    let search = hits();
    let researcher = factory(&model).researcher("Energy");

    let outcome = ToolLoop::new(search.clone()).run(&researcher, "go").await;

    assert_eq!(search.calls(), 0);
    let observations: Vec<_> = outcome
        .transcript
        .iter()
        .filter(|message| message.role == MessageRole::Function)
        .map(|message| message.content.as_str())
        .collect();
    assert_eq!(observations, vec![NO_QUERY_MESSAGE, NO_QUERY_MESSAGE]);
}

#[tokio::test]
async fn unknown_tools_are_ignored() {
    let model = Arc::new(ScriptedModel::new());
    model
        .tool_call(AgentRole::Researcher, "calculator", json!({"expression": "2+2"}))
        .text(AgentRole::Researcher, "Research complete.");
    let search = hits();
    let researcher = factory(&model).researcher("Energy");

    let outcome = ToolLoop::new(search.clone()).run(&researcher, "go").await;

    assert_eq!(search.calls(), 0);
    assert_eq!(model.requests().len(), 2);
    assert_eq!(model.requests()[1].messages.len(), 1);
    assert_eq!(outcome.transcript.len(), 2);
}

#[tokio::test]
async fn empty_results_and_failures_are_passed_through() {
    let model = Arc::new(ScriptedModel::new());
    model.tool_call(AgentRole::Researcher, WEB_SEARCH_TOOL, json!({"query": "obscure"}));
    let researcher = factory(&model).researcher("Energy");
    let outcome = ToolLoop::new(Arc::new(StubSearch::with_results(Vec::new())))
        .run(&researcher, "go")
        .await;
    assert_eq!(outcome.transcript[1].content, NO_RESULTS_MESSAGE);
    assert!(outcome.sources.is_empty());

    let model = Arc::new(ScriptedModel::new());
    model.tool_call(AgentRole::Researcher, WEB_SEARCH_TOOL, json!({"query": "obscure"}));
    let researcher = factory(&model).researcher("Energy");
    let failing = StubSearch::failing(SearchFailure::Transport("timed out".into()));
    let outcome = ToolLoop::new(Arc::new(failing)).run(&researcher, "go").await;
    assert_eq!(
        outcome.transcript[1].content,
        "Error: Unable to perform web search. timed out"
    );
}

#[tokio::test]
async fn transcript_never_exceeds_two_per_turn_plus_seed() {
    for max_turns in 1..=6 {
        let model = Arc::new(ScriptedModel::new());
        for idx in 0..10 {
            if idx % 2 == 0 {
                model.tool_call(AgentRole::Researcher, WEB_SEARCH_TOOL, json!({"query": format!("q{idx}")}));
            } else {
                model.text(AgentRole::Researcher, format!("partial {idx}"));
            }
        }
        let researcher = factory(&model).researcher("Energy");

        let outcome = ToolLoop::new(hits())
            .with_max_turns(max_turns)
            .run(&researcher, "go")
            .await;

        assert!(outcome.transcript.len() <= 2 * max_turns + 1);
        assert_eq!(model.requests().len(), max_turns);
    }
}

#[tokio::test]
async fn budget_exhaustion_returns_partial_text() {
    let model = Arc::new(ScriptedModel::new());
    model
        .text(AgentRole::Researcher, "first finding")
        .text(AgentRole::Researcher, "second finding")
        .text(AgentRole::Researcher, "third finding");
    let researcher = factory(&model).researcher("Energy");

    let outcome = ToolLoop::new(hits())
        .with_max_turns(2)
        .run(&researcher, "go")
        .await;

    assert_eq!(outcome.text, "first finding\nsecond finding");
}

#[tokio::test]
async fn completion_marker_is_case_insensitive() {
    let model = Arc::new(ScriptedModel::new());
    model
        .text(AgentRole::Researcher, "All done. RESEARCH COMPLETE")
        .text(AgentRole::Researcher, "should not be requested");
    let researcher = factory(&model).researcher("Energy");

    let outcome = ToolLoop::new(hits()).run(&researcher, "go").await;

    assert_eq!(outcome.text, "All done. RESEARCH COMPLETE");
    assert_eq!(model.requests().len(), 1);
}

#[tokio::test]
async fn no_reply_or_model_error_stops_with_partial_text() {
    let model = Arc::new(ScriptedModel::new());
    model
        .text(AgentRole::Researcher, "partial")
        .empty(AgentRole::Researcher)
        .text(AgentRole::Researcher, "unreached");
    let researcher = factory(&model).researcher("Energy");
    let outcome = ToolLoop::new(hits()).run(&researcher, "go").await;
    assert_eq!(outcome.text, "partial");
    assert_eq!(model.requests().len(), 2);

    let model = Arc::new(ScriptedModel::new());
    model
        .text(AgentRole::Researcher, "partial")
        .failure(AgentRole::Researcher, "rate limited");
    let researcher = factory(&model).researcher("Energy");
    let outcome = ToolLoop::new(hits()).run(&researcher, "go").await;
    assert_eq!(outcome.text, "partial");
}

#[tokio::test]
async fn repeated_links_are_reported_once() {
    let model = Arc::new(ScriptedModel::new());
    model
        .tool_call(AgentRole::Researcher, WEB_SEARCH_TOOL, json!({"query": "one"}))
        .tool_call(AgentRole::Researcher, WEB_SEARCH_TOOL, json!({"query": "two"}))
        .text(AgentRole::Researcher, "Research complete.");
    let researcher = factory(&model).researcher("Energy");

    let outcome = ToolLoop::new(hits()).run(&researcher, "go").await;
    assert_eq!(outcome.sources.len(), 2);
}
