use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use diesel::RunQueryDsl;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::config::Config;
use crate::storage::LocalFileStore;
use crate::store::test_support::temp_store;
use crate::AppState;

const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
const BOUNDARY: &str = "signage-test-boundary";

struct TestApp {
    router: Router,
    state: AppState,
    _dir: TempDir,
}

fn test_app() -> TestApp {
    let (store, dir) = temp_store();
    let upload_dir = dir.path().join("uploads");

    let config = Config::parse(&format!(
        r#"
[server]
host = "127.0.0.1"
port = 5000
public_url = "http://signage.test:5000"

[database]
url = "unused.db"

[storage]
upload_dir = "{}"

[logging]
level = "debug"
"#,
        upload_dir.display()
    ))
    .unwrap();

    let files = LocalFileStore::new(&upload_dir).unwrap();
    let state = AppState::new(store, Arc::new(files), config).unwrap();

    TestApp {
        router: crate::api::app(state.clone()),
        state,
        _dir: dir,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn json(&self, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn upload(&self, file_name: &str, bytes: &[u8], scheduling: Option<Value>) -> (StatusCode, Value) {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
        if let Some(scheduling) = scheduling {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"scheduling\"\r\n\r\n{}\r\n",
                    BOUNDARY, scheduling
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        self.send(
            Request::post("/upload")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    async fn poll(&self, device_id: &str) -> Value {
        let (status, body) = self.get(&format!("/api/playlist/{}", device_id)).await;
        assert_eq!(status, StatusCode::OK);
        body
    }
}

#[tokio::test]
async fn test_first_poll_registers_device() {
    let app = test_app();

    let request = Request::get("/api/playlist/android-42?app_version=2.0")
        .header("x-forwarded-for", "10.1.2.3, 172.16.0.1")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["device_id"], "android-42");
    assert_eq!(body["server_url"], "http://signage.test:5000");
    assert_eq!(body["playlist"], json!([]));

    let (_, devices) = app.get("/api/devices").await;
    assert_eq!(devices[0]["device_id"], "android-42");
    assert_eq!(devices[0]["device_name"], "TV-android-");
    assert_eq!(devices[0]["ip_address"], "10.1.2.3");
    assert_eq!(devices[0]["app_version"], "2.0");
    assert_eq!(devices[0]["content_count"], 0);
}

#[tokio::test]
async fn test_upload_assign_and_poll() {
    let app = test_app();
    app.poll("DEV1").await;

    let (status, body) = app
        .upload(
            "Lobby Loop.png",
            PNG_MAGIC,
            Some(json!({ "device_assignment": "DEV1", "display_duration": 15 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["assignments_created"], 1);
    let media_id = body["media"]["id"].as_i64().unwrap();
    let filename = body["media"]["filename"].as_str().unwrap().to_string();
    assert!(filename.ends_with("_Lobby_Loop.png"));

    let playlist = app.poll("DEV1").await;
    let entries = playlist["playlist"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["media_id"], media_id);
    assert_eq!(entries[0]["display_duration"], 15);
    assert_eq!(entries[0]["play_order"], 1);
    assert_eq!(
        entries[0]["url"],
        format!("http://signage.test:5000/uploads/{}", filename)
    );

    // Uploaded bytes are served back.
    let response = app
        .router
        .clone()
        .oneshot(
            Request::get(format!("/uploads/{}", filename))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_upload_rejects_disallowed_type() {
    let app = test_app();
    let (status, body) = app.upload("payload.exe", b"MZ", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_assign_errors_map_to_status_codes() {
    let app = test_app();
    app.poll("DEV1").await;
    let (_, uploaded) = app.upload("a.png", PNG_MAGIC, None).await;
    let media_id = uploaded["media"]["id"].clone();

    let (status, _) = app
        .json(
            Method::POST,
            "/api/assign-content",
            json!({ "device_id": "DEV1", "media_id": media_id }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .json(
            Method::POST,
            "/api/assign-content",
            json!({ "device_id": "DEV1", "media_id": media_id }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_ASSIGNMENT");

    let (status, body) = app
        .json(Method::POST, "/api/assign-content", json!({ "device_id": "DEV1" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = app
        .json(
            Method::POST,
            "/api/assign-content",
            json!({ "device_id": "DEV1", "media_id": 9999 }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_assign_all_and_reorder() {
    let app = test_app();
    for device in ["DEV1", "DEV2", "DEV3"] {
        app.poll(device).await;
    }
    let (_, first) = app.upload("first.png", PNG_MAGIC, None).await;
    let (_, second) = app.upload("second.png", PNG_MAGIC, None).await;
    let first_id = first["media"]["id"].as_i64().unwrap();
    let second_id = second["media"]["id"].as_i64().unwrap();

    let (status, body) = app
        .json(
            Method::POST,
            "/api/assign-all-devices",
            json!({ "media_id": first_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assigned_count"], 3);

    app.json(
        Method::POST,
        "/api/assign-content",
        json!({ "device_id": "DEV1", "media_id": second_id }),
    )
    .await;

    let (_, content) = app.get("/api/device/DEV1/content").await;
    let content = content.as_array().unwrap();
    assert_eq!(content.len(), 2);
    let first_rule = content[0]["id"].clone();
    let second_rule = content[1]["id"].clone();

    let (status, _) = app
        .json(
            Method::PUT,
            "/api/device/reorder-content",
            json!({
                "device_id": "DEV1",
                "content_order": [
                    { "assignment_id": first_rule, "play_order": 3 },
                    { "assignment_id": second_rule, "play_order": 1 }
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let playlist = app.poll("DEV1").await;
    let order: Vec<i64> = playlist["playlist"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["media_id"].as_i64().unwrap())
        .collect();
    assert_eq!(order, vec![second_id, first_id]);
}

#[tokio::test]
async fn test_schedule_toggle_and_delete() {
    let app = test_app();
    app.poll("DEV1").await;
    let (_, uploaded) = app
        .upload(
            "promo.png",
            PNG_MAGIC,
            Some(json!({ "device_assignment": "all" })),
        )
        .await;
    let media_id = uploaded["media"]["id"].as_i64().unwrap();

    let (status, body) = app
        .json(
            Method::PUT,
            &format!("/api/media/{}/schedule", media_id),
            json!({ "days_of_week": ["mon", "funday"] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = app
        .json(
            Method::PUT,
            &format!("/api/media/{}/schedule", media_id),
            json!({ "days_of_week": [], "display_duration": 25, "start_time": "00:00", "end_time": "23:59:59" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 1);

    let (_, detailed) = app.get("/api/media/detailed").await;
    assert_eq!(detailed[0]["display_duration"], 25);
    assert_eq!(detailed[0]["days_of_week"], json!(["all"]));

    let (status, _) = app
        .json(
            Method::PUT,
            &format!("/api/media/{}/toggle", media_id),
            json!({ "is_active": false }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.poll("DEV1").await["playlist"], json!([]));

    let (status, body) = app
        .send(
            Request::delete(format!("/api/media/{}", media_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rules_removed"], 1);
    assert_eq!(body["file_removed"], true);

    let (status, _) = app
        .send(
            Request::delete(format!("/api/media/{}", media_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_last_update_tracks_mutations() {
    let app = test_app();
    let (_, before) = app.get("/api/system/last-update").await;

    app.poll("DEV1").await;
    let (_, after_poll) = app.get("/api/system/last-update").await;
    assert_eq!(before["version"], after_poll["version"]);

    app.upload("v.png", PNG_MAGIC, None).await;
    let (_, after_upload) = app.get("/api/system/last-update").await;
    assert!(after_upload["version"].as_u64().unwrap() > before["version"].as_u64().unwrap());
    assert_eq!(
        after_upload["version"].as_u64().unwrap(),
        app.state.store.version().current()
    );
}

#[tokio::test]
async fn test_device_metadata_survives_polling() {
    let app = test_app();
    app.poll("DEV1").await;

    let (status, body) = app
        .json(
            Method::PUT,
            "/api/device/DEV1",
            json!({ "custom_name": "Cafeteria", "location": "Building B" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["custom_name"], "Cafeteria");

    app.poll("DEV1").await;
    let (_, devices) = app.get("/api/devices").await;
    assert_eq!(devices[0]["display_name"], "Cafeteria");
    assert_eq!(devices[0]["location"], "Building B");

    let (status, _) = app
        .json(Method::PUT, "/api/device/NOPE", json!({ "custom_name": "x" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_analytics_and_status() {
    let app = test_app();
    app.poll("DEV1").await;
    app.upload("s.png", PNG_MAGIC, None).await;

    let (status, _) = app
        .json(
            Method::POST,
            "/api/analytics",
            json!({
                "device_id": "DEV1",
                "filename": "s.png",
                "file_type": "image",
                "started_at": "2025-06-11T10:00:00",
                "ended_at": "2025-06-11T10:00:10",
                "planned_duration": 10,
                "actual_duration": 10,
                "completed": true
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .json(
            Method::POST,
            "/api/analytics",
            json!({
                "device_id": "DEV1",
                "filename": "s.png",
                "file_type": "hologram",
                "started_at": "2025-06-11T10:00:00"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = app.get("/api/system/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
    assert_eq!(body["active_devices"], 1);
    assert_eq!(body["total_media"], 1);
}

#[tokio::test]
async fn test_storage_failure_is_opaque_500() {
    let app = test_app();
    app.poll("DEV1").await;

    app.state
        .store
        .write_untracked(|conn| {
            diesel::sql_query("DROP TABLE device_content").execute(conn)?;
            Ok(())
        })
        .unwrap();

    let (status, body) = app.get("/api/playlist/DEV1").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "STORAGE_ERROR");
    assert_eq!(body["error"], "Storage is temporarily unavailable");
    assert!(!body.to_string().contains("device_content"));
}
