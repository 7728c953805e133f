use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;
use sqlx::PgPool;

/// What `/health` reports on. Tests run without a pool.
#[derive(Clone)]
pub struct HealthProbe {
    pub service: &'static str,
    pub db_pool: Option<PgPool>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    service: &'static str,
    database: DatabaseHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    connection_pool: Option<ConnectionPoolHealth>,
}

#[derive(Serialize)]
pub struct DatabaseHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
pub struct ConnectionPoolHealth {
    size: u32,
    idle_connections: usize,
    max_connections: u32,
}

/// Health check endpoint
///
/// Returns 200 OK when the database answers within 5s, 503 otherwise.
pub async fn health_handler(
    Extension(probe): Extension<HealthProbe>,
) -> (StatusCode, Json<HealthResponse>) {
    let (db_health, pool_health) = match &probe.db_pool {
        Some(pool) => (check_database(pool).await, Some(pool_metrics(pool))),
        None => (
            DatabaseHealth {
                status: "not_configured".to_string(),
                error: None,
            },
            None,
        ),
    };

    let is_healthy = db_health.status != "error";
    let status_code = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if is_healthy { "healthy" } else { "unhealthy" }.to_string(),
            service: probe.service,
            database: db_health,
            connection_pool: pool_health,
        }),
    )
}

async fn check_database(pool: &PgPool) -> DatabaseHealth {
    match tokio::time::timeout(
        std::time::Duration::from_secs(5),
        sqlx::query("SELECT 1").execute(pool),
    )
    .await
    {
        Ok(Ok(_)) => DatabaseHealth {
            status: "ok".to_string(),
            error: None,
        },
        Ok(Err(e)) => DatabaseHealth {
            status: "error".to_string(),
            error: Some(format!("Query failed: {}", e)),
        },
        Err(_) => DatabaseHealth {
            status: "error".to_string(),
            error: Some("Query timeout (>5s)".to_string()),
        },
    }
}

fn pool_metrics(pool: &PgPool) -> ConnectionPoolHealth {
    ConnectionPoolHealth {
        size: pool.size(),
        idle_connections: pool.num_idle(),
        max_connections: pool.options().get_max_connections(),
    }
}
