// HTTP API tests against a scripted snapshot source and a temporary data dir.

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::Utc;
use dorm_power::api::{handlers::AppState, routes::create_router};
use dorm_power::collector::Collector;
use dorm_power::models::{CaptureLabels, DeviceInfo, OwnerInfo, RoomInfo, Snapshot};
use dorm_power::portal::SnapshotSource;
use dorm_power::registry::{Credentials, Dormitory, DormitoryRegistry};
use dorm_power::store::SnapshotStore;
use dorm_power::{AppError, Result};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Answers with a fixed balance per dormitory, or a login failure.
struct FakePortal {
    balances: HashMap<String, f64>,
}

#[async_trait]
impl SnapshotSource for FakePortal {
    async fn collect(&self, dormitory: &Dormitory) -> Result<Snapshot> {
        let balance = self
            .balances
            .get(&dormitory.id)
            .copied()
            .ok_or_else(|| AppError::Auth("账号或密码错误".to_string()))?;

        let now = Utc::now();
        let labels = CaptureLabels::new(now, chrono_tz::Asia::Shanghai);
        Ok(Snapshot {
            dormitory_id: dormitory.id.clone(),
            timestamp: now,
            date: labels.date,
            time: labels.time,
            hour: labels.hour,
            user_info: OwnerInfo {
                real_name: dormitory.user_name.clone(),
                ..Default::default()
            },
            room_info: RoomInfo {
                building: dormitory.building.clone(),
                room_number: dormitory.room_number.clone(),
                ..Default::default()
            },
            device_info: DeviceInfo {
                device_balance: balance,
                device_price: 0.5441,
                is_online: true,
                ..Default::default()
            },
        })
    }
}

fn dormitory(id: &str) -> Dormitory {
    Dormitory {
        id: id.to_string(),
        name: format!("{}宿舍", id),
        building: "13栋".to_string(),
        room_number: id.to_string(),
        floor: "5楼".to_string(),
        user_name: "测试用户".to_string(),
        credentials: Credentials {
            account: format!("acct-{}", id),
            password: "secret".to_string(),
        },
    }
}

struct Harness {
    server: TestServer,
    store: Arc<SnapshotStore>,
    _data: TempDir,
}

/// `ids` are registered up front; only those in `balances` can be collected.
fn harness(ids: &[&str], balances: &[(&str, f64)]) -> Harness {
    let data = tempfile::tempdir().unwrap();
    let store = Arc::new(SnapshotStore::new(data.path(), 100));
    let registry = Arc::new(DormitoryRegistry::new(
        ids.iter().map(|id| dormitory(id)).collect(),
    ));
    let source = Arc::new(FakePortal {
        balances: balances
            .iter()
            .map(|(id, b)| (id.to_string(), *b))
            .collect(),
    });
    let collector = Arc::new(Collector::new(
        source,
        store.clone(),
        registry.clone(),
        Duration::ZERO,
    ));

    let app = create_router(AppState {
        registry,
        store: store.clone(),
        collector,
        low_balance_threshold: 20.0,
    });

    Harness {
        server: TestServer::new(app).unwrap(),
        store,
        _data: data,
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let h = harness(&[], &[]);

    let response = h.server.get("/api/health").await;
    response.assert_status(StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["collector"], "idle");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_list_hides_credentials() {
    let h = harness(&["13-513", "13-514"], &[]);

    let response = h.server.get("/api/dormitories").await;
    response.assert_status(StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["success"], true);
    let list = body["data"].as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["id"], "13-513");
    assert_eq!(list[0]["roomNumber"], "13-513");
    assert!(list[0].get("password").is_none());
    assert!(list[0].get("account").is_none());
}

#[tokio::test]
async fn test_latest_not_found() {
    let h = harness(&["13-513"], &[]);

    let response = h.server.get("/api/dormitories/nobody/latest").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert!(body["message"].is_string());
    assert!(body.get("data").is_none());

    // Registered but never collected
    let response = h.server.get("/api/dormitories/13-513/latest").await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_register_validation() {
    let h = harness(&["13-513"], &[]);

    let response = h
        .server
        .post("/api/dormitories")
        .json(&json!({"id": "13-600", "name": "600"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["success"], false);

    let response = h
        .server
        .post("/api/dormitories")
        .json(&json!({
            "id": "13-513", "name": "dup", "account": "a", "password": "p"
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["message"].as_str().unwrap().contains("already exists"));

    let response = h
        .server
        .post("/api/dormitories")
        .content_type("application/json")
        .text("{not json")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["success"], false);
}

#[tokio::test]
async fn test_register_collects_first_snapshot() {
    let h = harness(&[], &[("13-600", 66.6)]);

    let response = h
        .server
        .post("/api/dormitories")
        .json(&json!({
            "id": "13-600",
            "name": "13栋600",
            "roomNumber": "600",
            "account": "19900000000",
            "password": "pw"
        }))
        .await;
    response.assert_status(StatusCode::CREATED);

    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["dormitory"]["id"], "13-600");
    assert_eq!(body["data"]["collection"]["outcome"], "stored");

    let latest: Value = h.server.get("/api/dormitories/13-600/latest").await.json();
    assert_eq!(latest["data"]["deviceInfo"]["deviceBalance"], 66.6);
    assert!(h.store.latest("13-600").await.unwrap().is_some());
}

#[tokio::test]
async fn test_scrape_all_with_partial_failure() {
    let h = harness(
        &["one", "two", "three"],
        &[("one", 80.0), ("three", 50.0)],
    );

    let response = h.server.post("/api/scrape").await;
    response.assert_status(StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "partiallyFailed");
    let results = body["data"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[1]["dormitoryId"], "two");
    assert_eq!(results[1]["outcome"], "failed");
    assert_eq!(results[1]["stage"], "auth");

    let comparison: Value = h.server.get("/api/comparison").await.json();
    let ranked = comparison["data"].as_array().unwrap();
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0]["dormitoryId"], "one");
    assert_eq!(ranked[0]["rank"], 1);
    assert_eq!(ranked[1]["dormitoryId"], "three");
    assert_eq!(ranked[1]["consumption7d"], 0.0);
}

#[tokio::test]
async fn test_scrape_single_dormitory() {
    let h = harness(&["one", "two"], &[("one", 12.5)]);

    let response = h
        .server
        .post("/api/scrape")
        .json(&json!({"dormitoryId": "one"}))
        .await;
    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["data"]["dormitoryId"], "one");
    assert_eq!(body["data"]["outcome"], "stored");
    assert!(h.store.latest("two").await.unwrap().is_none());

    let response = h
        .server
        .post("/api/scrape")
        .json(&json!({"dormitoryId": "ghost"}))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stats() {
    let h = harness(&["one", "two", "three"], &[("one", 84.5), ("two", 15.5)]);
    h.server.post("/api/scrape").await.assert_status(StatusCode::OK);

    let body: Value = h.server.get("/api/stats").await.json();
    let stats = &body["data"];
    assert_eq!(stats["totalDormitories"], 3);
    assert_eq!(stats["onlineCount"], 2);
    assert_eq!(stats["totalBalance"], 100.0);
    assert_eq!(stats["avgBalance"], 33.33);
    assert_eq!(stats["lowBalanceCount"], 1);
    assert!(stats["lastUpdate"].is_string());
}

#[tokio::test]
async fn test_windowed_views() {
    let h = harness(&["one"], &[("one", 40.0)]);
    h.server.post("/api/scrape").await.assert_status(StatusCode::OK);

    let hourly: Value = h
        .server
        .get("/api/dormitories/one/hourly")
        .add_query_param("days", "abc")
        .await
        .json();
    let buckets = hourly["data"].as_array().unwrap();
    assert_eq!(buckets.len(), 24);
    assert_eq!(
        buckets.iter().map(|b| b["count"].as_u64().unwrap()).sum::<u64>(),
        1
    );

    let history: Value = h.server.get("/api/dormitories/one/history").await.json();
    assert_eq!(history["data"].as_array().unwrap().len(), 1);

    // One reading yields no daily deltas yet
    let daily: Value = h.server.get("/api/dormitories/one/daily?days=0").await.json();
    assert_eq!(daily["data"], json!([]));

    let summary: Value = h.server.get("/api/dormitories/one/summary").await.json();
    assert_eq!(summary["data"]["currentBalance"], 40.0);
    assert_eq!(summary["data"]["rank"], 1);
    assert_eq!(summary["data"]["totalRanked"], 1);
    assert!(summary["data"].get("estimatedDays").unwrap().is_null());

    h.server
        .get("/api/dormitories/ghost/hourly")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rotate_credentials() {
    let h = harness(&["one"], &[]);

    let response = h
        .server
        .put("/api/dormitories/one/credentials")
        .json(&json!({"account": "new-account", "password": "new-secret"}))
        .await;
    response.assert_status(StatusCode::OK);
    assert_eq!(response.json::<Value>()["success"], true);

    h.server
        .put("/api/dormitories/ghost/credentials")
        .json(&json!({"account": "a", "password": "b"}))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    h.server
        .put("/api/dormitories/one/credentials")
        .json(&json!({"account": "", "password": "b"}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_window_is_served() {
    let h = harness(&["one"], &[("one", 40.0)]);
    h.server.post("/api/scrape").await.assert_status(StatusCode::OK);

    for route in ["history", "hourly", "daily", "summary"] {
        let response = h
            .server
            .get(&format!("/api/dormitories/one/{}", route))
            .add_query_param("days", "100000000")
            .await;
        response.assert_status(StatusCode::OK);
        assert_eq!(response.json::<Value>()["success"], true, "{}", route);
    }

    let history: Value = h
        .server
        .get("/api/dormitories/one/history?days=4294967295")
        .await
        .json();
    assert_eq!(history["data"].as_array().unwrap().len(), 1);
}
