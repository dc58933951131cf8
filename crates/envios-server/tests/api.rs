use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use envios_core::{LifecycleManager, LifecyclePolicy};
use envios_notify::{MessageLog, RecordingNotifier};
use envios_server::{JSON_BODY_LIMIT, router};
use envios_storage::InlineEvidenceStore;
use envios_store::MemoryStore;
use serde_json::{Value, json};
use tower::ServiceExt;

const PNG: [u8; 12] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

fn app_with(policy: LifecyclePolicy) -> (Router, Arc<LifecycleManager>) {
    let manager = Arc::new(
        LifecycleManager::new(
            Arc::new(MemoryStore::new()),
            Arc::new(InlineEvidenceStore::new()),
            Arc::new(RecordingNotifier::new()),
            Arc::new(MessageLog::in_memory()),
        )
        .with_policy(policy),
    );
    (router(manager.clone()), manager)
}

fn app() -> Router {
    app_with(LifecyclePolicy::default()).0
}

async fn call(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body bytes");
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn as_user(builder: axum::http::request::Builder, role: &str) -> axum::http::request::Builder {
    builder
        .header("x-user-id", format!("u-{role}"))
        .header("x-user-name", format!("User {role}"))
        .header("x-user-role", role)
}

fn json_request(method: &str, uri: &str, role: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(role) = role {
        builder = as_user(builder, role);
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

fn get(uri: &str, role: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(role) = role {
        builder = as_user(builder, role);
    }
    builder.body(Body::empty()).expect("request")
}

fn envio(ticket: &str) -> Value {
    json!({
        "ticket": ticket,
        "calle": "Sarandí",
        "numero": "500",
        "departamento": "Montevideo",
        "motivo": "Entrega",
        "telefono": "099123456",
        "contacto": "María Pérez",
    })
}

async fn create(router: &Router, ticket: &str) -> String {
    let (status, body) = call(router, json_request("POST", "/api/envios", Some("agent"), envio(ticket))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["id"].as_str().expect("id").to_string()
}

async fn set_state(router: &Router, id: &str, role: &str, body: Value) -> (StatusCode, Value) {
    call(
        router,
        json_request("PATCH", &format!("/api/envios/{id}/estado"), Some(role), body),
    )
    .await
}

#[tokio::test]
async fn banner_and_catalog_are_public() {
    let app = app();
    let (status, body) = call(&app, get("/api/", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "API de Gestión de Envíos - Uruguay");

    let (_, body) = call(&app, get("/api/departamentos", None)).await;
    assert_eq!(body["departamentos"].as_array().unwrap().len(), 19);
    assert_eq!(body["departamentos"][10], "Paysandú");

    let (_, body) = call(&app, get("/api/motivos", None)).await;
    assert_eq!(body["motivos"], json!(["Entrega", "Retiro y Entrega", "Retiro"]));
}

#[tokio::test]
async fn full_delivery_over_http() {
    let app = app();
    let id = create(&app, "ENV-001").await;

    let (status, body) = set_state(&app, &id, "courier", json!({ "nuevo_estado": "Asignado a courier" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["state"], "Asignado a courier");

    let (status, body) = set_state(
        &app,
        &id,
        "courier",
        json!({
            "nuevo_estado": "Entregado",
            "receptor_nombre": "Ana",
            "receptor_cedula": "1.234.567-8",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["history"].as_array().unwrap().len(), 3);
    assert_eq!(body["history"][2]["detail"]["receiver_name"], "Ana");

    let (status, body) = call(&app, get("/api/tracking/ENV-001", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "Entregado");
    assert!(body.get("id").is_none());
    assert!(!body.to_string().contains("099123456"));
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let app = app();
    let (status, body) = call(&app, json_request("POST", "/api/envios", None, envio("ENV-002"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = call(&app, get("/api/envios", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn errors_use_the_documented_statuses() {
    let app = app();
    let id = create(&app, "ENV-003").await;

    let (status, body) = set_state(&app, &id, "courier", json!({ "nuevo_estado": "Entregado" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_transition");

    let (status, body) = set_state(&app, &id, "agent", json!({ "nuevo_estado": "Asignado a courier" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = set_state(
        &app,
        &id,
        "courier",
        json!({ "nuevo_estado": "Entregado", "receptor_nombre": " " }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    let fields: Vec<_> = body["fields"].as_array().unwrap().iter().map(|f| f["field"].clone()).collect();
    assert_eq!(fields, vec![json!("receiver_name"), json!("receiver_id")]);

    let (status, body) = set_state(
        &app,
        &id,
        "agent",
        json!({ "nuevo_estado": "Entregado", "receptor_nombre": "Ana", "receptor_cedula": "1" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _) = call(&app, json_request("POST", "/api/envios", Some("agent"), envio("ENV-003"))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let missing = "00000000-0000-4000-8000-000000000000";
    let (status, body) = set_state(&app, missing, "admin", json!({ "nuevo_estado": "Asignado a courier" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = call(&app, get("/api/envios/not-a-uuid", Some("admin"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_department_is_rejected() {
    let app = app();
    let mut body = envio("ENV-004");
    body["departamento"] = json!("Buenos Aires");
    let (status, body) = call(&app, json_request("POST", "/api/envios", Some("admin"), body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["fields"][0]["field"], "department");
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let app = app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/envios")
        .header("content-type", "application/json")
        .header("x-user-id", "u-1")
        .header("x-user-role", "admin")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = call(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn list_filters_and_counts() {
    let app = app();
    let first = create(&app, "ENV-010").await;
    create(&app, "ENV-011").await;
    create(&app, "OTRO-1").await;
    set_state(&app, &first, "courier", json!({ "nuevo_estado": "Asignado a courier" })).await;

    let (status, body) = call(&app, get("/api/envios?ticket=env-01&limit=10", Some("agent"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (_, body) = call(&app, get("/api/envios?estado=Asignado%20a%20courier", Some("agent"))).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["ticket"], "ENV-010");

    let (_, body) = call(&app, get("/api/envios/count?departamento=Montevideo", Some("agent"))).await;
    assert_eq!(body["count"], 3);

    let (_, body) = call(&app, get("/api/envios?limit=1&skip=1", Some("agent"))).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = call(&app, get("/api/envios?estado=Perdido", Some("agent"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_then_reference_in_transition() {
    let policy = LifecyclePolicy {
        max_evidence_bytes: 64,
        ..Default::default()
    };
    let (app, _) = app_with(policy);
    let id = create(&app, "ENV-020").await;
    set_state(&app, &id, "courier", json!({ "nuevo_estado": "Asignado a courier" })).await;

    let upload = |bytes: Vec<u8>| {
        as_user(
            Request::builder().method("POST").uri(format!("/api/envios/{id}/upload-image")),
            "courier",
        )
        .header("content-type", "application/octet-stream")
        .body(Body::from(bytes))
        .unwrap()
    };

    let (status, body) = call(&app, upload(vec![0u8; 100])).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["fields"][0]["field"], "evidence");

    let (status, body) = call(&app, upload(vec![0u8; 1000])).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE, "{body}");

    let (status, body) = call(&app, upload(PNG.to_vec())).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let url = body["url"].as_str().unwrap().to_string();
    assert!(url.starts_with("data:image/png;base64,"));

    let (status, body) = set_state(
        &app,
        &id,
        "courier",
        json!({ "nuevo_estado": "No entregado", "comentario": "Nadie en casa", "imagen_url": url }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["history"][2]["detail"]["evidence_url"], url);
    assert_eq!(body["history"][2]["detail"]["reason"], "Nadie en casa");
}

#[tokio::test]
async fn json_body_limit_is_independent_of_evidence_limit() {
    let policy = LifecyclePolicy {
        max_evidence_bytes: 16,
        ..Default::default()
    };
    let (app, _) = app_with(policy);
    let mut long_note = envio("ENV-025");
    long_note["calle"] = json!("Sarandí ".repeat(20));
    let (status, body) = call(&app, json_request("POST", "/api/envios", Some("agent"), long_note)).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let mut huge = envio("ENV-026");
    huge["contacto"] = json!("x".repeat(JSON_BODY_LIMIT + 1));
    let (status, body) = call(&app, json_request("POST", "/api/envios", Some("agent"), huge)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "payload_too_large");
}

#[tokio::test]
async fn delete_is_admin_only() {
    let app = app();
    let id = create(&app, "ENV-030").await;
    let delete = |role: &str| {
        as_user(Request::builder().method("DELETE").uri(format!("/api/envios/{id}")), role)
            .body(Body::empty())
            .unwrap()
    };

    let (status, _) = call(&app, delete("agent")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&app, delete("admin")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Envío eliminado exitosamente");

    let (status, _) = call(&app, delete("admin")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn messages_and_policy() {
    let (app, manager) = app_with(LifecyclePolicy::default());
    create(&app, "ENV-040").await;
    manager.drain_notifications().await;

    let (status, body) = call(&app, get("/api/messages?limit=5", Some("admin"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["ticket"], "ENV-040");
    assert_eq!(body[0]["state"], "Ingresada");
    assert_eq!(body[0]["sent"], true);

    let (status, body) = call(&app, get("/api/policy", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 4);
}
