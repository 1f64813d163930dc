use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum_test::TestServer;
use contentcrew_api::routes::build_router;
use contentcrew_api::state::{AppState, JobSettings, JobState};
use contentcrew_core::testing::{ScriptedModel, StubSearch, sample_result};
use contentcrew_core::{
    AgentFactory, AgentRole, ContentPipeline, LanguageModel, MemoryArticleStore, ModelConfig,
    ModelRequest, Reply, WEB_SEARCH_TOOL,
};
use serde_json::{Value, json};
use tokio::sync::Notify;
use tokio::time::{Duration, sleep, timeout};

fn settings() -> JobSettings {
    JobSettings {
        max_concurrency: 2,
        status_interval: Duration::from_millis(10),
        job_retention: Duration::from_secs(600),
        default_category: "Technology".into(),
    }
}

fn state_with(
    model: Arc<dyn LanguageModel>,
    search: StubSearch,
    settings: JobSettings,
) -> AppState {
    let factory = AgentFactory::new(ModelConfig::default(), model);
    let pipeline = Arc::new(ContentPipeline::new(factory, Arc::new(search)));
    AppState::from_parts(Arc::new(MemoryArticleStore::new()), pipeline, settings)
}

fn test_state(model: &Arc<ScriptedModel>, search: StubSearch) -> AppState {
    state_with(model.clone(), search, settings())
}

/// Scripted model whose writer calls wait for [`GatedModel::open`] while held.
struct GatedModel {
    inner: Arc<ScriptedModel>,
    held: AtomicBool,
    gate: Notify,
}

impl GatedModel {
    fn new(inner: Arc<ScriptedModel>) -> Self {
        Self {
            inner,
            held: AtomicBool::new(false),
            gate: Notify::new(),
        }
    }

    fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    fn open(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.gate.notify_one();
    }
}

#[async_trait]
impl LanguageModel for GatedModel {
    async fn reply(&self, request: ModelRequest) -> contentcrew_core::Result<Option<Reply>> {
        if request.role == AgentRole::Writer && self.held.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        self.inner.reply(request).await
    }
}

fn hits() -> StubSearch {
    StubSearch::with_results(vec![sample_result(
        "Battery density",
        "https://energy.example/density",
    )])
}

fn script_generation(model: &ScriptedModel) {
    model
        .tool_call(AgentRole::Researcher, WEB_SEARCH_TOOL, json!({"query": "solid state batteries"}))
        .text(AgentRole::Researcher, "Density is up 40%. Research complete.");
    model
        .text(AgentRole::Writer, "Solid state batteries are arriving.")
        .text(AgentRole::Writer, "Batteries Go Solid")
        .text(AgentRole::Writer, "Solid state batteries are arriving, density up 40%.");
    model.text(AgentRole::FactChecker, "Figures confirmed. Fact-checking complete.");
}

async fn generated_article(server: &TestServer) -> String {
    let article_id = start_generation(
        server,
        json!({ "category": "Energy", "topic": "Solid state batteries" }),
    )
    .await;
    let body = wait_for_terminal_event(server, &article_id).await;
    assert!(body.contains("event: article_ready"), "{body}");
    article_id
}

async fn drafts_of(server: &TestServer, article_id: &str) -> Vec<Value> {
    server
        .get(&format!("/article/{article_id}/drafts"))
        .await
        .json::<Value>()
        .as_array()
        .cloned()
        .expect("drafts array")
}

async fn wait_for_terminal_event(server: &TestServer, article_id: &str) -> String {
    timeout(Duration::from_secs(5), async {
        server
            .get(&format!("/article-status/{article_id}"))
            .await
            .text()
    })
    .await
    .expect("status stream did not finish in time")
}

async fn start_generation(server: &TestServer, body: Value) -> String {
    let response = server.post("/generate-article").json(&body).await;
    assert_eq!(response.status_code(), 202);
    let payload = response.json::<Value>();
    assert_eq!(payload["state"], "running");
    payload["article_id"]
        .as_str()
        .expect("article id missing")
        .to_string()
}

#[tokio::test]
async fn health_endpoints_report_capacity() {
    let model = Arc::new(ScriptedModel::new());
    let server = TestServer::new(build_router(test_state(&model, hits()))).unwrap();

    let response = server.get("/health/live").await;
    assert_eq!(response.status_code(), 200);

    let response = server.get("/health/ready").await;
    assert_eq!(response.status_code(), 200);
    let body = response.json::<Value>();
    assert_eq!(body["metrics"]["max_concurrency"], 2);
    assert_eq!(body["metrics"]["available_permits"], 2);
}

#[tokio::test]
async fn generation_streams_the_finished_article() {
    let model = Arc::new(ScriptedModel::new());
    script_generation(&model);
    let state = test_state(&model, hits());
    let server = TestServer::new(build_router(state.clone())).unwrap();

    let article_id = start_generation(
        &server,
        json!({ "category": "Energy", "topic": "Solid state batteries" }),
    )
    .await;

    let body = wait_for_terminal_event(&server, &article_id).await;
    assert!(
        body.contains("event: article_ready"),
        "stream did not include article_ready: {body}"
    );
    assert!(body.contains("Batteries Go Solid"), "title missing: {body}");
    assert!(!body.contains("article_failed"));

    let response = server.get(&format!("/article/{article_id}")).await;
    assert_eq!(response.status_code(), 200);
    let article = response.json::<Value>();
    assert_eq!(article["category"], "Energy");
    assert_eq!(article["title"], "Batteries Go Solid");
    assert_eq!(article["content"], "Solid state batteries are arriving.");
    assert_eq!(
        article["final_content"],
        "Solid state batteries are arriving, density up 40%."
    );
    assert!(
        article["research_info"]
            .as_str()
            .is_some_and(|text| text.ends_with("Sources:\nhttps://energy.example/density"))
    );

    let drafts = server
        .get(&format!("/article/{article_id}/drafts"))
        .await
        .json::<Value>();
    let drafts = drafts.as_array().expect("drafts array");
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0]["draft_number"], 1);
    assert!(drafts[0]["feedback"].is_null());

    let status = state
        .job_service()
        .status(article_id.parse().unwrap())
        .expect("job status");
    assert_eq!(status.state, JobState::Completed);
}

#[tokio::test]
async fn category_defaults_when_omitted() {
    let model = Arc::new(ScriptedModel::new());
    script_generation(&model);
    let server = TestServer::new(build_router(test_state(&model, hits()))).unwrap();

    let article_id = start_generation(&server, json!({ "topic": "Solid state batteries" })).await;
    wait_for_terminal_event(&server, &article_id).await;

    let article = server
        .get(&format!("/article/{article_id}"))
        .await
        .json::<Value>();
    assert_eq!(article["category"], "Technology");

    let research = &model.requests_for(AgentRole::Researcher)[0].messages[0].content;
    assert!(research.contains("Technology: Solid state batteries"));
}

#[tokio::test]
async fn missing_search_credential_fails_the_job() {
    let model = Arc::new(ScriptedModel::new());
    let server =
        TestServer::new(build_router(test_state(&model, StubSearch::unconfigured()))).unwrap();

    let article_id = start_generation(
        &server,
        json!({ "category": "Energy", "topic": "Solid state batteries" }),
    )
    .await;

    let body = wait_for_terminal_event(&server, &article_id).await;
    assert!(
        body.contains("event: article_failed"),
        "stream did not include article_failed: {body}"
    );
    assert!(body.contains("Error: SERPAPI_API_KEY is not set."));

    let article = server
        .get(&format!("/article/{article_id}"))
        .await
        .json::<Value>();
    assert_eq!(article["content"], "Error: SERPAPI_API_KEY is not set.");
    assert_eq!(article["title"], "Untitled Article");

    let drafts = server
        .get(&format!("/article/{article_id}/drafts"))
        .await
        .json::<Value>();
    assert_eq!(drafts.as_array().map(Vec::len), Some(0));
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn feedback_appends_numbered_drafts() {
    let model = Arc::new(ScriptedModel::new());
    script_generation(&model);
    let server = TestServer::new(build_router(test_state(&model, hits()))).unwrap();

    let article_id = start_generation(
        &server,
        json!({ "category": "Energy", "topic": "Solid state batteries" }),
    )
    .await;
    wait_for_terminal_event(&server, &article_id).await;

    for round in 1..=2 {
        model
            .text(AgentRole::Writer, format!("Revision {round}."))
            .text(AgentRole::Writer, format!("Batteries, Take {round}"));

        let response = server
            .post(&format!("/article/{article_id}/feedback"))
            .json(&json!({ "feedback": format!("round {round}: shorter") }))
            .await;
        assert_eq!(response.status_code(), 202);

        let body = wait_for_terminal_event(&server, &article_id).await;
        assert!(body.contains("event: article_ready"), "{body}");
    }

    let article = server
        .get(&format!("/article/{article_id}"))
        .await
        .json::<Value>();
    assert_eq!(article["title"], "Batteries, Take 2");
    assert_eq!(article["final_content"], "Revision 2.");
    assert!(
        article["research_info"]
            .as_str()
            .is_some_and(|text| text.contains("Research complete."))
    );

    let drafts = server
        .get(&format!("/article/{article_id}/drafts"))
        .await
        .json::<Value>();
    let drafts = drafts.as_array().expect("drafts array");
    let numbers: Vec<_> = drafts.iter().map(|draft| draft["draft_number"].clone()).collect();
    assert_eq!(numbers, vec![json!(1), json!(2), json!(3)]);
    assert_eq!(drafts[2]["content"], "Revision 2.");
    assert_eq!(drafts[2]["feedback"], "round 2: shorter");

    let writer_requests = model.requests_for(AgentRole::Writer);
    let second_revision = &writer_requests[writer_requests.len() - 2].messages[0].content;
    assert!(second_revision.contains("Revision 1."));
    assert!(model.requests_for(AgentRole::Researcher).len() == 2);
}

#[tokio::test]
async fn listing_pages_through_articles() {
    let model = Arc::new(ScriptedModel::new());
    let server = TestServer::new(build_router(test_state(&model, hits()))).unwrap();

    for idx in 0..3 {
        script_generation(&model);
        let article_id =
            start_generation(&server, json!({ "topic": format!("Topic {idx}") })).await;
        wait_for_terminal_event(&server, &article_id).await;
        sleep(Duration::from_millis(2)).await;
    }

    let page = server
        .get("/articles")
        .add_query_param("page", 1)
        .add_query_param("page_size", 2)
        .await
        .json::<Value>();
    assert_eq!(page["total"], 3);
    assert_eq!(page["total_pages"], 2);
    assert_eq!(page["articles"].as_array().map(Vec::len), Some(2));
    assert_eq!(page["articles"][0]["topic"], "Topic 2");

    let page = server.get("/articles?page=2&page_size=2").await.json::<Value>();
    assert_eq!(page["articles"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let model = Arc::new(ScriptedModel::new());
    let server = TestServer::new(build_router(test_state(&model, hits()))).unwrap();

    let response = server
        .post("/generate-article")
        .json(&json!({ "topic": "   " }))
        .await;
    assert_eq!(response.status_code(), 400);
    assert_eq!(response.json::<Value>()["error"], "topic must not be empty");

    let missing = uuid::Uuid::new_v4();
    let response = server.get(&format!("/article/{missing}")).await;
    assert_eq!(response.status_code(), 404);

    let response = server.get(&format!("/article-status/{missing}")).await;
    assert_eq!(response.status_code(), 404);

    let response = server
        .post(&format!("/article/{missing}/feedback"))
        .json(&json!({ "feedback": "more detail" }))
        .await;
    assert_eq!(response.status_code(), 404);

    let response = server
        .post(&format!("/article/{missing}/feedback"))
        .json(&json!({ "feedback": "" }))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn feedback_keeps_the_title_when_retitling_fails() {
    let model = Arc::new(ScriptedModel::new());
    script_generation(&model);
    let server = TestServer::new(build_router(test_state(&model, hits()))).unwrap();
    let article_id = generated_article(&server).await;

    model.text(AgentRole::Writer, "Revision 1.");
    let response = server
        .post(&format!("/article/{article_id}/feedback"))
        .json(&json!({ "feedback": "shorter" }))
        .await;
    assert_eq!(response.status_code(), 202);

    let body = wait_for_terminal_event(&server, &article_id).await;
    assert!(body.contains("event: article_ready"), "{body}");

    let article = server
        .get(&format!("/article/{article_id}"))
        .await
        .json::<Value>();
    assert_eq!(article["title"], "Batteries Go Solid");
    assert_eq!(article["final_content"], "Revision 1.");
    assert_eq!(drafts_of(&server, &article_id).await.len(), 2);
}

#[tokio::test]
async fn failed_revision_leaves_the_article_untouched() {
    let model = Arc::new(ScriptedModel::new());
    script_generation(&model);
    let server = TestServer::new(build_router(test_state(&model, hits()))).unwrap();
    let article_id = generated_article(&server).await;

    let before = server
        .get(&format!("/article/{article_id}"))
        .await
        .json::<Value>();

    model.empty(AgentRole::Writer);
    let response = server
        .post(&format!("/article/{article_id}/feedback"))
        .json(&json!({ "feedback": "add sources" }))
        .await;
    assert_eq!(response.status_code(), 202);

    let body = wait_for_terminal_event(&server, &article_id).await;
    assert!(body.contains("event: article_failed"), "{body}");
    assert!(body.contains("Error: Unable to generate revised article."), "{body}");

    let after = server
        .get(&format!("/article/{article_id}"))
        .await
        .json::<Value>();
    assert_eq!(after["title"], before["title"]);
    assert_eq!(after["content"], before["content"]);
    assert_eq!(after["final_content"], before["final_content"]);
    assert_eq!(after["research_info"], before["research_info"]);

    let drafts = drafts_of(&server, &article_id).await;
    assert_eq!(drafts.len(), 1);
    assert!(drafts[0]["feedback"].is_null());
}

#[tokio::test]
async fn feedback_conflicts_while_a_revision_is_running() {
    let scripted = Arc::new(ScriptedModel::new());
    script_generation(&scripted);
    let gated = Arc::new(GatedModel::new(scripted.clone()));
    let state = state_with(gated.clone(), hits(), settings());
    let server = TestServer::new(build_router(state.clone())).unwrap();
    let article_id = generated_article(&server).await;

    scripted
        .text(AgentRole::Writer, "Revision 1.")
        .text(AgentRole::Writer, "Batteries, Take 1");
    gated.hold();

    let first = server
        .post(&format!("/article/{article_id}/feedback"))
        .json(&json!({ "feedback": "shorter" }))
        .await;
    assert_eq!(first.status_code(), 202);

    let second = server
        .post(&format!("/article/{article_id}/feedback"))
        .json(&json!({ "feedback": "longer" }))
        .await;
    assert_eq!(second.status_code(), 409);
    assert_eq!(
        second.json::<Value>()["error"],
        "a job is already running for this article"
    );
    assert!(state.job_service().is_running(article_id.parse().unwrap()));

    gated.open();
    let body = wait_for_terminal_event(&server, &article_id).await;
    assert!(body.contains("event: article_ready"), "{body}");

    let drafts = drafts_of(&server, &article_id).await;
    assert_eq!(drafts.len(), 2);
    assert_eq!(drafts[1]["feedback"], "shorter");
}

#[tokio::test]
async fn rejected_feedback_does_not_hold_the_job_slot() {
    let model = Arc::new(ScriptedModel::new());
    let state = test_state(&model, StubSearch::unconfigured());
    let server = TestServer::new(build_router(state.clone())).unwrap();

    let article_id = start_generation(&server, json!({ "topic": "Solid state batteries" })).await;
    wait_for_terminal_event(&server, &article_id).await;
    let id = article_id.parse().unwrap();

    for _ in 0..2 {
        let response = server
            .post(&format!("/article/{article_id}/feedback"))
            .json(&json!({ "feedback": "more detail" }))
            .await;
        assert_eq!(response.status_code(), 409);
        assert_eq!(
            response.json::<Value>()["error"],
            "article has no draft to revise yet"
        );
    }

    let status = state.job_service().status(id).expect("job status");
    assert_eq!(status.state, JobState::Failed);
    assert!(!state.job_service().is_running(id));
}

#[tokio::test]
async fn finished_jobs_are_pruned_after_retention() {
    let model = Arc::new(ScriptedModel::new());
    let state = state_with(
        model.clone(),
        hits(),
        JobSettings {
            job_retention: Duration::ZERO,
            ..settings()
        },
    );
    let server = TestServer::new(build_router(state.clone())).unwrap();

    script_generation(&model);
    let first = generated_article(&server).await;
    let first_id = first.parse().unwrap();
    assert!(state.job_service().status(first_id).is_some());

    script_generation(&model);
    let second = generated_article(&server).await;

    assert!(state.job_service().status(first_id).is_none());
    assert!(state.job_service().status(second.parse().unwrap()).is_some());
    assert_eq!(state.metrics().total_jobs, 1);

    let body = wait_for_terminal_event(&server, &first).await;
    assert!(body.contains("event: article_ready"), "{body}");
}
