//! End-to-end tests for the valuation HTTP API over a SQLite snapshot.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use aqi_common::Config;
use aqi_valuation::data::{EpsForecast, Indicator, IndustryRoe, LocalStorage};
use aqi_valuation::valuation::CompanyCode;
use aqi_valuation::{build_router, ValuationState};

async fn seeded_app() -> (TempDir, axum::Router) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data.db_path = dir.path().join("aqi.db");

    let store = LocalStorage::open(&config.data.db_path).unwrap();
    let code: CompanyCode = "000625".parse().unwrap();

    store
        .save_indicators(
            &config.data.base_period,
            &[(
                code.clone(),
                Indicator {
                    book_value_per_share: Some(8.12),
                    earnings_per_share: Some(1.02),
                },
            )],
            "fixture",
        )
        .await
        .unwrap();
    store
        .save_eps_forecasts(
            config.data.forecast_as_of,
            &[(code.clone(), EpsForecast::from_raw(1.1, 1.3, 1.4))],
            "fixture",
        )
        .await
        .unwrap();
    store
        .save_industry(&IndustryRoe {
            industry_code: "801094".into(),
            industry_name: "汽车整车".into(),
            roe: 0.11,
        })
        .await
        .unwrap();
    store.save_industry_member(&code, "801094").await.unwrap();

    let state = ValuationState::new(config, Arc::new(store)).unwrap();
    (dir, build_router(Arc::new(state)))
}

async fn send(app: &axum::Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_value_grid_matches_worked_example() {
    let (_dir, app) = seeded_app().await;

    let (status, json) = send(
        &app,
        "GET",
        "/api/v1/rim/value?code=000625&rr_min=0.1&rr_max=0.1&gr_min=0.02&gr_max=0.02",
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let cells = json["data"]["cells"].as_array().unwrap();
    assert_eq!(cells.len(), 1);

    let d1 = 0.288 / 1.1;
    let d2 = 0.378 / 1.1f64.powi(2);
    let d3 = 0.348 / 1.1f64.powi(3);
    let cv = 0.348 * 1.02 / 0.08 / 1.1f64.powi(3);
    let value = cells[0]["value"].as_f64().unwrap();
    assert!((value - (8.12 + d1 + d2 + d3 + cv)).abs() < 1e-9);
    assert_eq!(json["data"]["bps_base"], 8.12);
}

#[tokio::test]
async fn test_default_grid_shape_and_order() {
    let (_dir, app) = seeded_app().await;

    let (status, json) = send(&app, "GET", "/api/v1/rim/value?code=000625").await;
    assert_eq!(status, StatusCode::OK);

    let data = &json["data"];
    assert_eq!(data["rr"].as_array().unwrap().len(), 7);
    assert_eq!(data["gr"].as_array().unwrap().len(), 5);

    let cells = data["cells"].as_array().unwrap();
    assert_eq!(cells.len(), 35);
    // growth rate varies fastest
    assert_eq!(cells[0]["rr"], cells[4]["rr"]);
    assert_ne!(cells[4]["rr"], cells[5]["rr"]);
    assert_eq!(cells[0]["gr"], 0.0);
}

#[tokio::test]
async fn test_growth_above_rates_gives_empty_grid() {
    let (_dir, app) = seeded_app().await;

    let (status, json) = send(
        &app,
        "GET",
        "/api/v1/rim/value?code=000625&rr_min=0.01&rr_max=0.03&rr_count=3&gr_min=0.04&gr_max=0.06&gr_count=3",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["data"]["cells"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_error_statuses() {
    let (_dir, app) = seeded_app().await;

    let (status, json) = send(&app, "GET", "/api/v1/rim/proposal?code=7000721").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);

    let (status, json) = send(&app, "GET", "/api/v1/rim/proposal?code=601318").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .contains("601318"));

    let (status, _) = send(&app, "GET", "/api/v1/rim/value?code=000625&rr_count=1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "DELETE", "/api/v1/rim/proposal/999999").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_huge_axis_count_is_rejected_and_service_keeps_serving() {
    let (_dir, app) = seeded_app().await;

    let (status, json) = send(
        &app,
        "GET",
        "/api/v1/rim/value?code=000625&rr_count=18446744073709551615",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "INVALID_INPUT");

    let (status, _) = send(
        &app,
        "GET",
        "/api/v1/rim/value?code=000625&rr_count=1000000&gr_count=1000000",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(&app, "GET", "/api/v1/rim/value?code=000625").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["cells"].as_array().unwrap().len(), 35);
}

#[tokio::test]
async fn test_step_sized_axes() {
    let (_dir, app) = seeded_app().await;

    let (status, json) = send(
        &app,
        "GET",
        "/api/v1/rim/value?code=000625&rr_min=0.08&rr_max=0.12&rr_step=0.02&gr_step=0.01",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["rr"].as_array().unwrap().len(), 3);
    assert_eq!(json["data"]["gr"].as_array().unwrap().len(), 5);
    assert_eq!(json["data"]["cells"].as_array().unwrap().len(), 15);
}

#[tokio::test]
async fn test_malformed_query_returns_json_error() {
    let (_dir, app) = seeded_app().await;

    let (status, json) = send(&app, "GET", "/api/v1/rim/value?rr_count=-1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_cache_lifecycle_over_http() {
    let (_dir, app) = seeded_app().await;

    send(&app, "GET", "/api/v1/rim/proposal?code=000625").await;
    send(&app, "GET", "/api/v1/rim/value?code=000625").await;

    let (_, json) = send(&app, "GET", "/api/v1/rim/cache").await;
    assert_eq!(json["data"]["entries"], 1);
    assert_eq!(json["data"]["hits"], 1);
    assert_eq!(json["data"]["misses"], 1);

    let (status, json) = send(&app, "DELETE", "/api/v1/rim/proposal/000625").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["invalidated"], true);

    let (_, json) = send(&app, "DELETE", "/api/v1/rim/proposal/000625").await;
    assert_eq!(json["data"]["invalidated"], false);
}
