//! Request handlers and their wire formats

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use courier_delivery::{
    CircuitState, DeliveryOutcome, DeliveryService, EmailId, ServiceStatus, SubmitRequest,
};
use serde::Serialize;

type SharedService = Arc<dyn DeliveryService>;

const SERVICE_NAME: &str = "Email Service";

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    message: &'static str,
    version: &'static str,
    endpoints: BTreeMap<&'static str, &'static str>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: String,
    service: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailResponse {
    success: bool,
    message: &'static str,
    email_id: EmailId,
    status: DeliveryOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    service_status: ServiceStatus,
    provider_failures: BTreeMap<String, u32>,
    circuit_breaker_status: BTreeMap<String, CircuitState>,
    queue_length: usize,
    sent_emails_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResponse {
    email_id: EmailId,
    status: DeliveryOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    success: bool,
    error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: error.into(),
        }),
    )
        .into_response()
}

const fn outcome_message(outcome: DeliveryOutcome) -> &'static str {
    match outcome {
        DeliveryOutcome::Sent => "Email sent",
        DeliveryOutcome::Queued => "Email queued for retry",
        DeliveryOutcome::Failed => "Email delivery failed",
    }
}

pub async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        message: "Email Service API",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: BTreeMap::from([
            ("GET /health", "Health check"),
            ("POST /send-email", "Send an email"),
            ("GET /status", "Get service status"),
            ("GET /emails/{id}", "Get the recorded outcome of an email"),
        ]),
    })
}

/// Liveness check
///
/// Always 200 while the process can answer requests; provider health is
/// reported by `/status` instead.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        service: SERVICE_NAME,
    })
}

pub async fn send_email(
    State(service): State<SharedService>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected malformed submission");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    match service.submit(request).await {
        Ok(receipt) => {
            tracing::debug!(
                email_id = %receipt.id,
                status = %receipt.status,
                "Submission handled"
            );
            (
                StatusCode::OK,
                Json(SendEmailResponse {
                    success: receipt.accepted,
                    message: outcome_message(receipt.status),
                    email_id: receipt.id,
                    status: receipt.status,
                    provider: receipt.provider,
                    error: receipt.error,
                }),
            )
                .into_response()
        }
        Err(e) => {
            tracing::debug!(error = %e, "Rejected invalid submission");
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

pub async fn status(State(service): State<SharedService>) -> Json<StatusResponse> {
    let snapshot = service.snapshot();

    Json(StatusResponse {
        service_status: snapshot.service_status,
        provider_failures: snapshot.failure_counts(),
        circuit_breaker_status: snapshot.circuit_states(),
        queue_length: snapshot.queue_length,
        sent_emails_count: snapshot.sent_count,
    })
}

pub async fn lookup(State(service): State<SharedService>, Path(id): Path<String>) -> Response {
    let id = EmailId::from(id);

    let Some(result) = service.lookup(&id) else {
        return error_response(StatusCode::NOT_FOUND, format!("Unknown email id {id}"));
    };

    let provider = result
        .provider
        .and_then(|provider| service.provider_name(provider))
        .map(str::to_string);

    Json(LookupResponse {
        email_id: id,
        status: result.outcome,
        provider,
        error: result.error,
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        Router,
        body::{Body, to_bytes},
        http::Request,
    };
    use courier_delivery::{BreakerSettings, DeliveryCoordinator, SimulatedTransport};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::router;

    fn app(first: SimulatedTransport, second: SimulatedTransport) -> Router {
        let coordinator = DeliveryCoordinator::builder()
            .breaker(BreakerSettings {
                failure_threshold: 1,
                cooldown_secs: 60,
            })
            .provider("Provider1", Arc::new(first))
            .provider("Provider2", Arc::new(second))
            .build()
            .unwrap();

        router(Arc::new(coordinator), Duration::from_secs(5))
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_healthy() {
        let app = app(SimulatedTransport::reliable(), SimulatedTransport::reliable());
        let (status, body) = call(&app, get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], SERVICE_NAME);
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_index_lists_endpoints() {
        let app = app(SimulatedTransport::reliable(), SimulatedTransport::reliable());
        let (status, body) = call(&app, get("/")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["endpoints"]["POST /send-email"], "Send an email");
    }

    #[tokio::test]
    async fn test_send_email_missing_fields() {
        let app = app(SimulatedTransport::reliable(), SimulatedTransport::reliable());
        let (status, body) = call(
            &app,
            post_json("/send-email", &json!({ "to": "a@example.com", "subject": "" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({ "success": false, "error": "Missing required fields: subject, body" })
        );
    }

    #[tokio::test]
    async fn test_send_email_malformed_body() {
        let app = app(SimulatedTransport::reliable(), SimulatedTransport::reliable());
        let request = Request::builder()
            .method("POST")
            .uri("/send-email")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let (status, body) = call(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_send_email_fails_over_and_reports_status() {
        let app = app(SimulatedTransport::failing(), SimulatedTransport::reliable());
        let email = json!({
            "id": "e1",
            "to": "a@example.com",
            "subject": "Hello",
            "body": "World",
        });

        let (status, body) = call(&app, post_json("/send-email", &email)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "success": true,
                "message": "Email sent",
                "emailId": "e1",
                "status": "SENT",
                "provider": "Provider2",
            })
        );

        let (_, body) = call(&app, get("/status")).await;
        assert_eq!(
            body,
            json!({
                "serviceStatus": "DEGRADED",
                "providerFailures": { "Provider1": 1, "Provider2": 0 },
                "circuitBreakerStatus": { "Provider1": "OPEN", "Provider2": "CLOSED" },
                "queueLength": 0,
                "sentEmailsCount": 1,
            })
        );

        let (status, body) = call(&app, get("/emails/e1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "emailId": "e1", "status": "SENT", "provider": "Provider2" })
        );
    }

    #[tokio::test]
    async fn test_generated_id_and_queueing() {
        let app = app(SimulatedTransport::failing(), SimulatedTransport::failing());
        let email = json!({ "to": "a@example.com", "subject": "Hello", "body": "World" });

        let (status, body) = call(&app, post_json("/send-email", &email)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "QUEUED");
        assert_eq!(body["message"], "Email queued for retry");
        assert!(body["emailId"].as_str().unwrap().starts_with("email-"));

        let (_, body) = call(&app, get("/status")).await;
        assert_eq!(body["serviceStatus"], "DOWN");
        assert_eq!(body["queueLength"], 1);
    }

    #[tokio::test]
    async fn test_lookup_unknown_id() {
        let app = app(SimulatedTransport::reliable(), SimulatedTransport::reliable());
        let (status, body) = call(&app, get("/emails/missing")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Unknown email id missing");
    }
}
