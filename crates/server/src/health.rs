use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use crewflow_db::DbPool;
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

/// Result of probing the workflow store. `open_requests` doubles as a
/// liveness witness: the query touches the real schema, not just the
/// connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoreProbe {
    pub reachable: bool,
    pub open_requests: Option<i64>,
    pub detail: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: StoreProbe,
    pub checked_at: DateTime<Utc>,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn spawn(bind_address: &str, port: u16, db_pool: DbPool) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(db_pool)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let store = probe_store(&state.db_pool).await;

    let payload = HealthResponse {
        status: if store.reachable { "ready" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        store,
        checked_at: Utc::now(),
    };

    let status_code =
        if payload.store.reachable { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn probe_store(pool: &DbPool) -> StoreProbe {
    let open = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM approval_request
         WHERE archived = 0 AND status IN ('submitted', 'pending', 'escalated')",
    )
    .fetch_one(pool)
    .await;

    match open {
        Ok(count) => StoreProbe {
            reachable: true,
            open_requests: Some(count),
            detail: "workflow store reachable".to_string(),
        },
        Err(error) => StoreProbe {
            reachable: false,
            open_requests: None,
            detail: format!("workflow store query failed: {error}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use crewflow_core::config::DatabaseConfig;
    use crewflow_db::{connect, migrations, DbPool};

    use crate::health::{health, HealthState};

    async fn pool() -> DbPool {
        let database = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            timeout_secs: 5,
        };
        let pool = connect(&database).await.expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrate");
        pool
    }

    #[tokio::test]
    async fn health_reports_ready_with_the_open_request_count() {
        let pool = pool().await;

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert!(payload.store.reachable);
        assert_eq!(payload.store.open_requests, Some(0));
        assert_eq!(payload.version, env!("CARGO_PKG_VERSION"));

        pool.close().await;
    }

    #[tokio::test]
    async fn health_degrades_when_the_store_is_unreachable() {
        let pool = pool().await;
        pool.close().await;

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert!(!payload.store.reachable);
        assert_eq!(payload.store.open_requests, None);
    }
}
