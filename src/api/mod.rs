use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use chrono::Utc;
use log::info;
use serde::Serialize;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa::ToSchema;
use utoipa_swagger_ui::SwaggerUi;

use crate::cache::{PollStats, ReadingCache, ReadingSnapshot};
use crate::config::Config;
use crate::metering_energomera::meter_definitions::REGISTER_CATALOG;

pub mod prometheus;

const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub struct ApiManager {
    cache: Arc<ReadingCache>,
    config: Config,
}

pub struct ApiState {
    pub cache: Arc<ReadingCache>,
    pub config: Config,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub seconds_since_update: f64,
    pub polls: PollStats,
    pub identity: Option<String>,
    pub serial_number: Option<String>,
    pub last_error: Option<String>,
    pub timestamp: i64,
}

#[utoipa::path(get,
    path = "/metrics",
    summary = "Get the latest meter readings in prometheus format",
    responses(
        (status = 200, description = "Every declared series, 0 for values not read in the last cycle")
    ),
)]
async fn metrics(state: web::Data<ApiState>) -> impl Responder {
    let (snapshot, stats) = state.cache.view();
    let body = prometheus::render_metrics(&snapshot, &stats, &REGISTER_CATALOG, Utc::now());
    HttpResponse::Ok().content_type(METRICS_CONTENT_TYPE).body(body)
}

async fn metrics_head() -> impl Responder {
    HttpResponse::Ok().content_type(METRICS_CONTENT_TYPE).finish()
}

#[utoipa::path(get,
    path = "/health",
    summary = "Health check endpoint for container monitoring",
    responses(
        (status = 200, description = "The last poll cycle succeeded", body = HealthResponse),
        (status = 503, description = "The last poll cycle failed", body = HealthResponse)
    ),
)]
async fn health_check(state: web::Data<ApiState>) -> impl Responder {
    let (snapshot, stats) = state.cache.view();
    let now = Utc::now();
    let healthy = !snapshot.is_failure() && !snapshot.is_empty();

    let response = HealthResponse {
        status: if healthy { "healthy".to_string() } else { "unhealthy".to_string() },
        seconds_since_update: stats.seconds_since_success(now),
        polls: stats,
        identity: snapshot.identity.clone(),
        serial_number: snapshot.serial_number.clone(),
        last_error: snapshot.last_error.clone(),
        timestamp: now.timestamp(),
    };

    if healthy {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

#[utoipa::path(get,
    path = "/api/v1/snapshot",
    summary = "Get the current reading snapshot",
    responses(
        (status = 200, description = "Raw values of the last poll cycle", body = ReadingSnapshot)
    ),
)]
async fn get_snapshot(state: web::Data<ApiState>) -> impl Responder {
    let snapshot = state.cache.current();
    HttpResponse::Ok().json(snapshot.as_ref())
}

#[utoipa::path(get,
    path = "/api/v1/config",
    summary = "Get the running configuration, the meter password is masked",
    responses(
        (status = 200, description = "Get current running config", body = Config)
    ),
)]
async fn get_config(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(state.config.redacted())
}

#[derive(OpenApi)]
#[openapi(
    info(description = "energomera2prom API description"),
    paths(
        metrics,
        health_check,
        get_snapshot,
        get_config,
    ),
    components(schemas(HealthResponse, PollStats, ReadingSnapshot, Config))
)]
struct ApiDoc;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/metrics")
            .route(web::get().to(metrics))
            .route(web::head().to(metrics_head)),
    )
    .route("/health", web::get().to(health_check))
    .route("/api/v1/snapshot", web::get().to(get_snapshot))
    .route("/api/v1/config", web::get().to(get_config));
}

impl ApiManager {
    pub fn new(cache: Arc<ReadingCache>, config: Config) -> Self {
        return ApiManager { cache, config };
    }

    pub async fn start_thread(&self) -> std::io::Result<()> {
        let port = self.config.httpd.port;
        let state = web::Data::new(ApiState {
            cache: self.cache.clone(),
            config: self.config.clone(),
        });

        info!("Started HTTP server on {port}");
        // HttpServer is not Send and must be gone before the await, main spawns this future
        let server = HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .configure(routes)
                .service(
                    SwaggerUi::new("/swagger-ui/{_:.*}")
                        .url("/api/v1/openapi.json", ApiDoc::openapi()),
                )
        })
        .bind(("0.0.0.0", port))?
        .run();
        server.await
    }
}
