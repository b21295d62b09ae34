use actix_web::{http::StatusCode, test, web, App};
use lineup_cache::{CacheMetrics, KeyedCache};
use lineup_service::handlers::{self, AppState};
use lineup_service::rankers::Sampler;
use lineup_service::services::{
    CandidateSetStore, ExperimentCatalog, LineupService, MetricsStore, QaOverrides,
    SlateAssembler, StoreTopicProfiles,
};
use lineup_service::store::{MemoryStore, StoreReader};
use prometheus::Registry;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const STORE_FIXTURE: &str = include_str!("../fixtures/store.json");
const CATALOG: &str = include_str!("../config/experiments.json");

fn state() -> web::Data<AppState> {
    let store: Arc<dyn StoreReader> = Arc::new(MemoryStore::from_fixture_str(STORE_FIXTURE).unwrap());
    let catalog = Arc::new(ExperimentCatalog::from_json(CATALOG).unwrap());
    let sampler = Arc::new(Sampler::seeded(7));

    let candidate_sets = Arc::new(CandidateSetStore::new(
        Arc::clone(&store),
        "lineup_candidate_sets",
        "id-version",
        KeyedCache::in_memory("candidate_sets", Duration::from_secs(900)),
    ));
    let recommendation_metrics = Arc::new(MetricsStore::new(
        Arc::clone(&store),
        "recommendation_metrics",
        KeyedCache::in_memory("recommendation_metrics", Duration::from_secs(300)),
    ));
    let slate_metrics = Arc::new(MetricsStore::new(
        Arc::clone(&store),
        "slate_metrics",
        KeyedCache::in_memory("slate_metrics", Duration::from_secs(300)),
    ));
    let topic_profiles = Arc::new(StoreTopicProfiles::new(Arc::clone(&store), "topic_profiles"));

    let slates = Arc::new(SlateAssembler::new(
        candidate_sets,
        recommendation_metrics,
        Arc::clone(&sampler),
        "RecommendationAPI",
    ));
    let lineups = Arc::new(LineupService::new(
        catalog,
        slates,
        slate_metrics,
        topic_profiles,
        QaOverrides::new(
            vec!["qa-user".to_string()],
            [("trending".to_string(), "trending-preview".to_string())].into(),
        ),
        sampler,
    ));

    let registry = Registry::new();
    CacheMetrics::register(&registry).unwrap();

    web::Data::new(AppState { lineups, registry })
}

#[actix_web::test]
async fn test_get_lineup() {
    let app = test::init_service(App::new().app_data(state()).configure(handlers::configure)).await;

    let req = test::TestRequest::get()
        .uri("/api/v1/lineups/discover?user_id=demo-user&recommendation_count=2")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["id"], "discover");
    assert_eq!(body["experimentId"], "discover-default");
    assert_eq!(body["requestId"].as_str().map(str::len), Some(36));

    let slates = body["slates"].as_array().unwrap();
    assert_eq!(slates.len(), 3);
    assert_eq!(slates[0]["displayName"], "Trending");

    let mut seen = HashSet::new();
    for slate in slates {
        let recs = slate["recommendations"].as_array().unwrap();
        assert!(recs.len() <= 2);
        for rec in recs {
            assert!(seen.insert(rec["itemId"].as_str().unwrap().to_string()));
        }
    }
}

#[actix_web::test]
async fn test_slate_count_zero() {
    let app = test::init_service(App::new().app_data(state()).configure(handlers::configure)).await;

    let req = test::TestRequest::get()
        .uri("/api/v1/lineups/discover?user_id=demo-user&slate_count=0")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["slates"].as_array().map(Vec::len), Some(0));
}

#[actix_web::test]
async fn test_get_slate_for_qa_user() {
    let app = test::init_service(App::new().app_data(state()).configure(handlers::configure)).await;

    let req = test::TestRequest::get()
        .uri("/api/v1/slates/trending?user_id=qa-user")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["id"], "trending-preview");
    assert_eq!(body["recommendations"][0]["itemId"], "9001");
    assert_eq!(body["recommendations"][0]["id"], "RecommendationAPI/9001");
}

#[actix_web::test]
async fn test_unknown_lineup_is_404() {
    let app = test::init_service(App::new().app_data(state()).configure(handlers::configure)).await;

    let req = test::TestRequest::get()
        .uri("/api/v1/lineups/nope?user_id=demo-user")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], 404);
}

#[actix_web::test]
async fn test_missing_user_id_is_400() {
    let app = test::init_service(App::new().app_data(state()).configure(handlers::configure)).await;

    let req = test::TestRequest::get()
        .uri("/api/v1/lineups/discover")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], 400);
    assert!(body["error"].as_str().unwrap().contains("user_id"));
}

#[actix_web::test]
async fn test_invalid_count_is_json_400() {
    let app = test::init_service(App::new().app_data(state()).configure(handlers::configure)).await;

    let req = test::TestRequest::get()
        .uri("/api/v1/slates/trending?user_id=demo-user&recommendation_count=many")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], 400);
}

#[actix_web::test]
async fn test_health_and_metrics() {
    let app = test::init_service(App::new().app_data(state()).configure(handlers::configure)).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}
