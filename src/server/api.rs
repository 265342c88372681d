use crate::agent::ChatAgent;
use crate::auth::{ AuthClient, CurrentUser };
use crate::cli::Args;
use crate::error::ApiError;
use crate::models::api::{
    BannerResponse,
    ChatRequest,
    ChatResponse,
    ClearResponse,
    HealthResponse,
    ProfileData,
    ProfileResponse,
    ReadyResponse,
};
use crate::models::chat::Conversation;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    routing::{ get, post },
    Router,
    Json,
    extract::{ FromRef, Path, State },
    extract::rejection::JsonRejection,
    http::{ header, HeaderValue, Method },
};
use chrono::Utc;
use tower_http::cors::{ AllowOrigin, Any, CorsLayer };
use log::{ info, warn };

const SERVICE_NAME: &str = "Conversation Gateway";

#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<ChatAgent>,
    pub auth: Arc<AuthClient>,
    pub args: Arc<Args>,
}

impl FromRef<AppState> for Arc<AuthClient> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if origins.iter().any(|o| o.trim() == "*") {
        return base.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .map(|o| o.trim().trim_end_matches('/'))
        .filter(|o| !o.is_empty())
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    base.allow_origin(AllowOrigin::list(allowed)).allow_credentials(true)
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.args.allowed_origins);

    Router::new()
        .route("/", get(home_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/chat", post(chat_handler))
        .route("/api/protected/chat", post(chat_handler))
        .route("/messages/{session_id}", get(messages_handler))
        .route("/api/protected/messages/{session_id}", get(messages_handler))
        .route("/clear/{session_id}", post(clear_handler))
        .route("/api/protected/clear/{session_id}", post(clear_handler))
        .route("/profile", get(profile_handler))
        .route("/api/protected/profile", get(profile_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_http_server(state: AppState) -> Result<(), Box<dyn Error + Send + Sync>> {
    let args = state.args.clone();
    let addr = args.server_addr().parse::<SocketAddr>()?;
    let app = build_router(state);

    if args.enable_tls {
        let (cert_path, key_path) = match (&args.tls_cert_path, &args.tls_key_path) {
            (Some(cert), Some(key)) => (cert, key),
            _ => {
                return Err("TLS enabled without both --tls-cert-path and --tls-key-path".into());
            }
        };
        info!("TLS enabled. Loading certificate from '{}' and key from '{}'", cert_path, key_path);
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            cert_path,
            key_path
        ).await?;

        info!("Starting HTTPS server on: https://{}", addr);
        axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            format!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e)
        })?;
        info!("Starting HTTP server on: http://{}", addr);
        axum::serve(listener, app.into_make_service()).await?;
    }

    Ok(())
}

async fn home_handler() -> Json<BannerResponse> {
    Json(BannerResponse {
        message: "Welcome to the Conversation Gateway!".into(),
        service: SERVICE_NAME.into(),
        time: Utc::now().to_rfc3339(),
    })
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = match state.agent.history_store().ping().await {
        Ok(()) => "connected".to_string(),
        Err(e) => format!("disconnected ({})", e),
    };
    let model = if state.agent.chat_client().is_configured() {
        "configured"
    } else {
        "not configured"
    };

    Json(HealthResponse {
        status: (if store == "connected" { "healthy" } else { "unhealthy" }).to_string(),
        store,
        model: model.into(),
        auth_backend: state.args.auth_backend_url.clone(),
        frontend_allowed: state.args.allowed_origins.clone(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

async fn ready_handler() -> Json<ReadyResponse> {
    Json(ReadyResponse {
        status: "ready".into(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

fn required(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.trim().is_empty())
}

async fn chat_handler(
    State(state): State<AppState>,
    _user: CurrentUser,
    payload: Result<Json<ChatRequest>, JsonRejection>
) -> Result<Json<ChatResponse>, ApiError> {
    let req = payload.map(|Json(req)| req).unwrap_or_default();
    let (session_id, message) = match (required(req.session_id), required(req.message)) {
        (Some(s), Some(m)) => (s, m),
        _ => {
            return Err(ApiError::Validation("session_id and message are required".into()));
        }
    };

    let response = state.agent.send_message(&session_id, &message).await?;
    Ok(Json(ChatResponse { response }))
}

async fn messages_handler(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(session_id): Path<String>
) -> Result<Json<Conversation>, ApiError> {
    let conversation = state.agent.get_history(&session_id).await?;
    Ok(Json(conversation))
}

async fn clear_handler(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(session_id): Path<String>
) -> Result<Json<ClearResponse>, ApiError> {
    state.agent.clear_history(&session_id).await?;
    Ok(Json(ClearResponse {
        message: format!("Session {} cleared!", session_id),
    }))
}

async fn profile_handler(CurrentUser(user): CurrentUser) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        success: true,
        data: ProfileData { user: user.0 },
    })
}
