//! CurriForge API Gateway
//!
//! The HTTP surface of the document generator.
//! Handles:
//! - Corpus loading and context retrieval
//! - Document generation, revision and session lifetime
//! - Observability (logging, metrics)

mod handlers;
mod middleware;
mod registry;

use axum::{
    routing::{get, post},
    Router,
};
use curriforge_common::{
    config::{AppConfig, ObservabilityConfig},
    llm::{create_language_model, LanguageModel},
    metrics,
};
use curriforge_context::{Orchestrator, OrchestratorConfig, RevisionEngine};
use curriforge_search::{CorpusStore, Retriever};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use registry::SessionRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub retriever: Arc<Retriever>,
    pub orchestrator: Arc<Orchestrator>,
    pub revisions: Arc<RevisionEngine>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(config: AppConfig, corpus: CorpusStore, model: Arc<dyn LanguageModel>) -> Self {
        let retriever = Retriever::new(Arc::new(corpus), &config.retrieval);
        let orchestrator = Orchestrator::new(model.clone(), OrchestratorConfig::from_app_config(&config));
        let revisions = RevisionEngine::from_app_config(model, &config);
        let sessions = SessionRegistry::new(Duration::from_secs(config.server.session_ttl_secs));

        Self {
            config: Arc::new(config),
            retriever: Arc::new(retriever),
            orchestrator: Arc::new(orchestrator),
            revisions: Arc::new(revisions),
            sessions: Arc::new(sessions),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    init_tracing(&config.observability);

    info!("Starting CurriForge API Gateway v{}", curriforge_common::VERSION);

    // Missing model settings are fatal before anything is loaded
    config.validate().map_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        e
    })?;

    if config.observability.metrics_port != 0 {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(format!("{}_request_duration_seconds", metrics::METRICS_PREFIX)),
                metrics::LATENCY_BUCKETS,
            )?
            .set_buckets_for_metric(
                Matcher::Full(format!("{}_retrieval_duration_seconds", metrics::METRICS_PREFIX)),
                metrics::LATENCY_BUCKETS,
            )?
            .set_buckets_for_metric(
                Matcher::Suffix("model_duration_seconds".to_string()),
                metrics::MODEL_BUCKETS,
            )?
            .set_buckets_for_metric(
                Matcher::Suffix("generation_duration_seconds".to_string()),
                metrics::MODEL_BUCKETS,
            )?
            .with_http_listener(metrics_addr)
            .install()?;
        info!("Metrics exporter listening on {}", metrics_addr);
    }
    metrics::register_metrics();

    let corpus = CorpusStore::load(&config.corpus.sources);
    let model = create_language_model(&config.llm)?;
    info!(provider = model.name(), "Language model ready");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let shutdown_timeout = config.shutdown_timeout();
    let state = AppState::new(config, corpus, model);

    spawn_session_reaper(state.sessions.clone());

    let app = create_router(state);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_timeout))
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Periodically evict idle document sessions
fn spawn_session_reaper(sessions: Arc<SessionRegistry>) {
    let period = sessions
        .ttl()
        .min(Duration::from_secs(60))
        .max(Duration::from_secs(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            sessions.purge_expired().await;
        }
    });
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let api_routes = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Retrieval
        .route("/context", post(handlers::context::retrieve_context))

        // Documents
        .route("/documents", post(handlers::documents::create_document))
        .route(
            "/documents/{id}",
            get(handlers::documents::get_document).delete(handlers::documents::delete_document),
        )
        .route("/documents/{id}/snapshots", get(handlers::documents::list_snapshots))
        .route("/documents/{id}/revisions", post(handlers::documents::revise_document))

        // Catalogue
        .route("/competencies", get(handlers::competencies::list_competencies));

    Router::new()
        .nest("/v1", api_routes)
        .layer(axum::middleware::from_fn(middleware::metrics::track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }

    info!(grace_secs = grace.as_secs(), "Draining in-flight requests");
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        tracing::warn!("Shutdown grace period elapsed, exiting");
        std::process::exit(0);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use curriforge_common::config::SourceConfig;
    use curriforge_common::llm::{MockLanguageModel, MockReply};
    use curriforge_search::CorpusSource;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const CORPUS: &str = r#"{
        "metadata": { "documento": "Programa Curricular de Educación Secundaria" },
        "keywords": ["competencia", "desempeño"],
        "chunks": [
            { "id": "c1", "section": "Evaluación formativa", "text": "La evaluación formativa en ciencia y tecnología...", "keywords": ["evaluacion formativa"] },
            { "id": "c2", "section": "Matemática", "text": "Resuelve problemas de cantidad.", "keywords": ["matematica"] }
        ]
    }"#;

    const UNIT: &str = "| ITEM | CONTENIDO |\n| --- | --- |\n| **TÍTULO DE LA UNIDAD DIDÁCTICA** | Cuidamos el agua |\n| **SECUENCIA DE SESIONES** | Sesión 1: Exploramos el agua. Sesión 2: Medimos el consumo |";

    fn state_with(model: MockLanguageModel, critique_iterations: usize) -> AppState {
        let mut config = AppConfig::default();
        config.generation.critique_iterations = critique_iterations;

        let source_config = SourceConfig {
            id: "curriculo".to_string(),
            path: "unused".to_string(),
            label: None,
            role: Default::default(),
            top_k: 8,
        };
        let source = CorpusSource::from_json_str(&source_config, CORPUS).unwrap();
        AppState::new(config, CorpusStore::from_sources(vec![source]), Arc::new(model))
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn unit_body() -> Value {
        json!({
            "kind": "learning_unit",
            "grade": 3,
            "area": "Ciencia y Tecnología",
            "topic": "evaluación formativa"
        })
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let app = create_router(state_with(MockLanguageModel::new(), 0));

        let (status, body) = send(app.clone(), "GET", "/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = send(app, "GET", "/v1/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
        assert_eq!(body["sources"][0]["state"], "loaded");
        assert_eq!(body["sources"][0]["chunks"], 2);
    }

    #[tokio::test]
    async fn test_document_lifecycle() {
        let state = state_with(
            MockLanguageModel::with_script([
                MockReply::Text(UNIT.to_string()),
                MockReply::Text(UNIT.replace("agua", "agua potable")),
                MockReply::Text(format!("{}\n| **EVIDENCIAS** | Informe |", UNIT)),
            ]),
            1,
        );
        let app = create_router(state);

        let (status, created) = send(app.clone(), "POST", "/v1/documents", Some(unit_body())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"]["status"], "complete");
        assert_eq!(created["snapshot_count"], 2);
        assert_eq!(created["grounded"], true);
        assert_eq!(created["citations"][0]["chunk_id"], "c1");
        assert_eq!(created["unit_title"], "Cuidamos el agua potable");
        assert_eq!(created["session_titles"][0], "Exploramos el agua potable");

        let id = created["id"].as_str().unwrap().to_string();

        let (status, revised) = send(
            app.clone(),
            "POST",
            &format!("/v1/documents/{}/revisions", id),
            Some(json!({ "instruction": "Agrega las evidencias" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(revised["accepted"], true);
        assert_eq!(revised["snapshot_index"], 2);

        let (status, history) = send(app.clone(), "GET", &format!("/v1/documents/{}/snapshots", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history["snapshots"].as_array().map(Vec::len), Some(3));
        assert_eq!(history["snapshots"][2]["origin"]["step"], "revision");

        let (status, _) = send(app.clone(), "DELETE", &format!("/v1/documents/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(app, "GET", &format!("/v1/documents/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_rejected_revision_keeps_document() {
        let state = state_with(
            MockLanguageModel::with_script([
                MockReply::Text(UNIT.to_string()),
                MockReply::Text("| ITEM | CONTENIDO |".to_string()),
            ]),
            0,
        );
        let app = create_router(state);

        let (_, created) = send(app.clone(), "POST", "/v1/documents", Some(unit_body())).await;
        let id = created["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            app,
            "POST",
            &format!("/v1/documents/{}/revisions", id),
            Some(json!({ "instruction": "Resume todo" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accepted"], false);
        assert_eq!(body["error_code"], "STRUCTURAL_VALIDATION");
        assert_eq!(body["document"], UNIT);
    }

    #[tokio::test]
    async fn test_busy_session_is_conflict() {
        let state = state_with(MockLanguageModel::with_script([MockReply::Text(UNIT.to_string())]), 0);
        let app = create_router(state.clone());

        let (_, created) = send(app.clone(), "POST", "/v1/documents", Some(unit_body())).await;
        let id: uuid::Uuid = created["id"].as_str().unwrap().parse().unwrap();

        let _held = state.sessions.acquire(id).await.unwrap();
        let (status, body) = send(
            app,
            "POST",
            &format!("/v1/documents/{}/revisions", id),
            Some(json!({ "instruction": "Cambia el título" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "SESSION_BUSY");
    }

    #[tokio::test]
    async fn test_missing_field_is_bad_request() {
        let app = create_router(state_with(MockLanguageModel::new(), 0));
        let (status, body) = send(
            app,
            "POST",
            "/v1/documents",
            Some(json!({ "kind": "learning_session", "grade": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "MISSING_FIELD");
    }

    #[tokio::test]
    async fn test_context_and_competencies() {
        let app = create_router(state_with(MockLanguageModel::new(), 0));

        let (status, body) = send(
            app.clone(),
            "POST",
            "/v1/context",
            Some(json!({ "topic": "evaluación formativa" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["items"][0]["chunk_id"], "c1");
        assert_eq!(body["grounded"], true);

        let (status, body) = send(app.clone(), "POST", "/v1/context", Some(json!({ "grade": 9 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, body) = send(app, "GET", "/v1/competencies?area=Matem%C3%A1tica", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 4);
    }
}
