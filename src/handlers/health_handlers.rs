//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that probes every configured backend

use crate::services::context::StorageContext;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use bytes::Bytes;
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

use crate::models::entry::ObjectMeta;

/// `GET /healthz`
///
/// Very small liveness probe — always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe that performs a best-effort write/read/delete against
/// every configured backend. Returns JSON describing each check: HTTP 200
/// when all backends pass, HTTP 503 when any fails.
pub async fn readyz(State(ctx): State<Arc<StorageContext>>) -> impl IntoResponse {
    let mut checks = HashMap::new();
    let mut overall_ok = true;

    for driver in ctx.drivers() {
        let key = format!("readyz-{}", Uuid::new_v4());
        let result = probe(driver.as_ref(), &key).await;
        let ok = result.is_none();
        overall_ok &= ok;
        checks.insert(driver.name().to_string(), CheckStatus { ok, error: result });
    }

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };
    (status, Json(body))
}

/// Write, read back, and delete one probe object; `None` means healthy.
async fn probe(
    driver: &dyn crate::services::driver::StorageDriver,
    key: &str,
) -> Option<String> {
    if let Err(err) = driver
        .put_object(key, Bytes::from_static(b"readyz"), &ObjectMeta::default())
        .await
    {
        return Some(format!("write failed: {err}"));
    }
    let verdict = match driver.head(key).await {
        Ok(info) if info.size == 6 => None,
        Ok(info) => Some(format!("probe object has unexpected size {}", info.size)),
        Err(err) => Some(format!("read back failed: {err}")),
    };
    if let Err(err) = driver.delete_if_exists(key).await {
        // The probe object is six bytes of garbage; report but stay ready.
        return verdict.or(Some(format!("cleanup failed: {err}")));
    }
    verdict
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<String, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
