use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use scholarsift_common::Source;
use scholarsift_db::HistoryStore;
use scholarsift_ingestion::{PipelineSettings, SearchPipeline};
use scholarsift_ranker::{AnnotationSettings, Annotator, LruRefineCache, RefineSettings, Refiner, RelevanceFilter};
use scholarsift_test_utils::{annotation_json, papers, FailingEngine, ScriptedLlm, StaticEngine};
use scholarsift_web::router::build_router;
use scholarsift_web::state::AppState;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    llm: Arc<ScriptedLlm>,
    _dir: TempDir,
}

fn app() -> TestApp {
    let llm = Arc::new(ScriptedLlm::new(|req| {
        let text = req.prompt_text();
        if text.contains("Return the IDs") {
            Ok("A002".to_string())
        } else if text.contains("Original abstract") {
            Ok("Plain words.".to_string())
        } else {
            Ok(annotation_json("标题", "摘要", "关键词", "相关"))
        }
    }));

    let dir = tempfile::tempdir().unwrap();
    let history = Arc::new(HistoryStore::new(dir.path(), 10));
    let settings = PipelineSettings { engine_delay: Duration::ZERO, ..Default::default() };
    let pipeline = SearchPipeline::new(
        RelevanceFilter::new(llm.clone(), 5),
        Arc::new(Annotator::new(llm.clone(), AnnotationSettings::default())),
        settings,
    )
    .with_engine(Arc::new(StaticEngine::new(Source::Arxiv, papers(Source::Arxiv, &["A001", "A002"]))))
    .with_engine(Arc::new(FailingEngine::new(Source::SemanticScholar)))
    .with_history(history.clone());
    let refiner = Refiner::new(llm.clone(), Arc::new(LruRefineCache::new(8)), RefineSettings::default());

    let state = AppState::new(pipeline, refiner, history);
    TestApp { router: build_router(Arc::new(state)), llm, _dir: dir }
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn post_json(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, bytes) = send(router, req).await;
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn get_json(router: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, bytes) = send(router, Request::get(uri).body(Body::empty()).unwrap()).await;
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn root_and_health() {
    let app = app();
    let (status, body) = get_json(&app.router, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));

    let (status, body) = get_json(&app.router, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn invalid_category_is_a_400_listing_valid_codes() {
    let app = app();
    let (status, body) = post_json(
        &app.router,
        "/api/search",
        json!({"keywords": "attention", "question": "q", "arxiv_category": "xyz"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("xyz"));
    assert!(detail.contains("cs, math"));
    assert_eq!(app.llm.calls(), 0);
}

#[tokio::test]
async fn search_survives_a_failing_engine() {
    let app = app();
    let (status, body) = post_json(
        &app.router,
        "/api/search",
        json!({"keywords": "attention", "question": "Which scale?", "engines": ["arxiv", "s2"]}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    let paper = &body["papers"][0];
    assert_eq!(paper["arxiv_id"], "A002");
    assert_eq!(paper["title"], "Paper A002");
    assert_eq!(paper["title_zh"], "标题");
    assert_eq!(paper["abstract_zh"], "摘要");
    assert_eq!(paper["source"], "arxiv");
    assert_eq!(body["engines"][0], json!({"source": "arxiv", "count": 2}));
    assert_eq!(body["engines"][1]["source"], "semantic_scholar");
    assert!(body["engines"][1]["error"].is_string());
    assert!(body["history_id"].is_string());
}

#[tokio::test]
async fn blank_keywords_rejected() {
    let app = app();
    let (status, _) = post_json(&app.router, "/api/search", json!({"keywords": "  "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stream_emits_status_progress_and_complete() {
    let app = app();
    let req = Request::post("/api/search/stream")
        .header("content-type", "application/json")
        .body(Body::from(json!({"keywords": "attention", "question": "q"}).to_string()))
        .unwrap();
    let (status, bytes) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::OK);

    let events: Vec<Value> = String::from_utf8(bytes)
        .unwrap()
        .lines()
        .filter_map(|l| l.strip_prefix("data: "))
        .filter_map(|d| serde_json::from_str(d).ok())
        .collect();

    let kinds: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap_or("")).collect();
    assert_eq!(kinds, vec!["status", "status", "status", "progress", "complete"]);
    assert_eq!(events[3]["progress"], 90);
    assert_eq!(events[3]["paper_title"], "Paper A002");
    assert_eq!(events[4]["total"], 1);
}

#[tokio::test]
async fn stream_rejects_bad_category_before_streaming() {
    let app = app();
    let (status, body) = post_json(
        &app.router,
        "/api/search/stream",
        json!({"keywords": "attention", "arxiv_category": "biology"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("biology"));
}

#[tokio::test]
async fn refine_is_cached_across_requests() {
    let app = app();
    let body = json!({"arxiv_id": "2401.00001v1", "abstract": "A long abstract.", "title": "T"});
    let (status, first) = post_json(&app.router, "/api/arxiv/refine-abstract", body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, json!({"refined_abstract": "Plain words."}));

    let (_, second) = post_json(&app.router, "/api/arxiv/refine-abstract", body).await;
    assert_eq!(first, second);
    assert_eq!(app.llm.calls(), 1);
}

#[tokio::test]
async fn refine_empty_abstract_gets_placeholder() {
    let app = app();
    let (_, body) = post_json(&app.router, "/api/arxiv/refine-abstract", json!({"arxiv_id": "x", "abstract": ""})).await;
    assert_eq!(body["refined_abstract"], "(empty abstract)");
    assert_eq!(app.llm.calls(), 0);
}

#[tokio::test]
async fn latest_rejects_unknown_category() {
    let app = app();
    let (status, _) = post_json(&app.router, "/api/arxiv/latest", json!({"category": "cs.LG"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn history_save_list_get() {
    let app = app();
    let (status, saved) = post_json(
        &app.router,
        "/api/history/save",
        json!({
            "type": "arxiv_search",
            "params": {"keywords": "gnn"},
            "result_summary": {"total": 0},
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = saved["id"].as_str().unwrap().to_string();

    let (_, listed) = post_json(&app.router, "/api/history/list", json!({"type": "arxiv_search"})).await;
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["records"][0]["id"], id.as_str());
    assert_eq!(listed["records"][0]["type"], "arxiv_search");

    let (status, record) = get_json(&app.router, &format!("/api/history/get/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["params"]["keywords"], "gnn");
}

#[tokio::test]
async fn history_errors() {
    let app = app();
    let (status, _) = get_json(&app.router, "/api/history/get/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post_json(&app.router, "/api/history/save", json!({"type": "bogus", "params": {}})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_json(&app.router, "/api/history/list", json!({"type": "bogus"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
