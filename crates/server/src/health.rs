//! Readiness endpoint. Reports degraded (503) whenever the database probe
//! fails, so load balancers stop routing chat traffic at a dead store.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use leadflow_db::DbPool;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Degraded,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: Readiness,
    pub database: Readiness,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_detail: Option<String>,
    pub checked_at: DateTime<Utc>,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(db_pool)
}

async fn health(State(pool): State<DbPool>) -> (StatusCode, Json<HealthResponse>) {
    let probe = sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&pool).await;

    let (database, database_detail) = match probe {
        Ok(_) => (Readiness::Ready, None),
        Err(error) => (Readiness::Degraded, Some(format!("database probe failed: {error}"))),
    };

    let status_code = match database {
        Readiness::Ready => StatusCode::OK,
        Readiness::Degraded => StatusCode::SERVICE_UNAVAILABLE,
    };

    let payload =
        HealthResponse { status: database, database, database_detail, checked_at: Utc::now() };
    (status_code, Json(payload))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    use leadflow_db::connect_with_settings;

    async fn probe(pool: leadflow_db::DbPool) -> (StatusCode, serde_json::Value) {
        let response = super::router(pool)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("router should respond");

        let status = response.status();
        let bytes =
            axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body collects");
        (status, serde_json::from_slice(&bytes).expect("body is json"))
    }

    #[tokio::test]
    async fn reports_ready_while_the_database_answers() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 5)
            .await
            .expect("pool should connect");

        let (status, payload) = probe(pool.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["status"], "ready");
        assert_eq!(payload["database"], "ready");

        pool.close().await;
    }

    #[tokio::test]
    async fn reports_degraded_once_the_pool_is_closed() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 5)
            .await
            .expect("pool should connect");
        pool.close().await;

        let (status, payload) = probe(pool).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload["status"], "degraded");
        assert!(payload["database_detail"].as_str().is_some());
    }
}
