use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pricecast_core::features::{self, HORIZON};
use pricecast_core::model::{ModelKind, Models};

mod error;

use error::ApiError;

const DEFAULT_MODEL: &str = "model1";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = pricecast_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let port = settings.port()?;

    // No request is served until both models are in memory.
    let models = match Models::load(&settings.model_dir) {
        Ok(models) => models,
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(
                error = %format!("{e:#}"),
                model_dir = %settings.model_dir.display(),
                "failed to load models"
            );
            return Err(e);
        }
    };

    let state = AppState {
        models: Arc::new(models),
    };
    let app = app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, model_dir = %settings.model_dir.display(), "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/predict", post(predict))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[derive(Clone)]
struct AppState {
    models: Arc<Models>,
}

async fn index() -> &'static str {
    "pricecast api is running"
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct PredictRequest {
    prev_close: f64,
    #[serde(rename = "return")]
    return_rate: f64,
    #[serde(default = "default_model")]
    model: String,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

#[derive(Debug, Serialize)]
struct PredictResponse {
    predicted: Vec<f64>,
}

async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let rows = features::project(req.prev_close, req.return_rate);
    let x = features::to_matrix(&rows);

    let kind: ModelKind = req.model.parse()?;
    let predicted = state
        .models
        .get(kind)
        .predict(&x)
        .map_err(ApiError::Internal)?;

    if predicted.len() != HORIZON {
        return Err(ApiError::Internal(anyhow::anyhow!(
            "{kind} returned {} predictions for {HORIZON} rows",
            predicted.len()
        )));
    }

    tracing::debug!(model = %kind, prev_close = req.prev_close, return_rate = req.return_rate, "predicted");
    Ok(Json(PredictResponse { predicted }))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &pricecast_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use ndarray::Array2;
    use pricecast_core::model::Regressor;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    /// Predicts the projected close itself.
    struct EchoClose;

    impl Regressor for EchoClose {
        fn predict(&self, x: &Array2<f64>) -> anyhow::Result<Vec<f64>> {
            Ok(x.column(0).to_vec())
        }
    }

    /// Predicts a constant, to tell the two variants apart.
    struct Constant(f64);

    impl Regressor for Constant {
        fn predict(&self, x: &Array2<f64>) -> anyhow::Result<Vec<f64>> {
            Ok(vec![self.0; x.nrows()])
        }
    }

    struct Broken;

    impl Regressor for Broken {
        fn predict(&self, _x: &Array2<f64>) -> anyhow::Result<Vec<f64>> {
            anyhow::bail!("model exploded")
        }
    }

    fn test_app(svr: Box<dyn Regressor>, boosted: Box<dyn Regressor>) -> Router {
        app(AppState {
            models: Arc::new(Models::new(svr, boosted)),
        })
    }

    fn default_app() -> Router {
        test_app(Box::new(EchoClose), Box::new(Constant(42.0)))
    }

    async fn post_predict(app: Router, body: String) -> (StatusCode, Value) {
        let res = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/predict")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn predicted(body: &Value) -> Vec<f64> {
        body["predicted"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_f64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn model2_gets_the_compounded_projection() {
        let body = json!({"prev_close": 100, "return": 0.05, "model": "model2"});
        let (status, body) = post_predict(default_app(), body.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.get("error").is_none());
        let p = predicted(&body);
        assert_eq!(p.len(), 7);
        assert!((p[0] - 105.0).abs() < 1e-9);
        assert!((p[6] - 140.71).abs() < 0.01);
    }

    #[tokio::test]
    async fn model3_dispatches_to_the_boosted_variant() {
        let body = json!({"prev_close": 250.5, "return": -0.01, "model": "model3"});
        let (status, body) = post_predict(default_app(), body.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(predicted(&body), vec![42.0; 7]);
    }

    #[tokio::test]
    async fn unknown_models_are_client_errors() {
        for model in ["model9", "foo", "model1", "MODEL2"] {
            let body = json!({"prev_close": 100, "return": 0.05, "model": model});
            let (status, body) = post_predict(default_app(), body.to_string()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "model={model}");
            assert_eq!(body["error"], format!("unknown model: {model}"));
            assert!(body.get("predicted").is_none());
        }
    }

    #[tokio::test]
    async fn missing_model_defaults_to_model1_and_is_rejected() {
        let body = json!({"prev_close": 100, "return": 0.05});
        let (status, body) = post_predict(default_app(), body.to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "unknown model: model1");
    }

    #[tokio::test]
    async fn malformed_fields_are_client_errors() {
        let cases = [
            json!({"return": 0.05, "model": "model2"}).to_string(),
            json!({"prev_close": "100", "return": 0.05, "model": "model2"}).to_string(),
            json!({"prev_close": 100, "return": 0.05, "model": null}).to_string(),
            "not json".to_string(),
        ];
        for case in cases {
            let (status, body) = post_predict(default_app(), case.clone()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body={case}");
            assert!(body["error"].is_string(), "body={case}");
        }
    }

    #[tokio::test]
    async fn model_failures_are_server_errors() {
        let app = test_app(Box::new(Broken), Box::new(Constant(1.0)));
        let body = json!({"prev_close": 100, "return": 0.05, "model": "model2"});
        let (status, body) = post_predict(app, body.to_string()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "prediction failed");
    }

    #[tokio::test]
    async fn index_reports_liveness() {
        let res = default_app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(!bytes.is_empty());
    }

    #[tokio::test]
    async fn any_origin_is_allowed() {
        let res = default_app()
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
    }
}
