use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    serve, Form, Json, Router,
};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::{Deserialize, Serialize};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::app_state::{AppState, SharedSession};
use crate::constants::SESSION_COOKIE;
use crate::form::{FormError, FormState, RelationshipType};
use crate::llm_interaction::TextGenerator;
use crate::session::{run_submit, ResponseState, SubmitOutcome};

/// Everything the server needs besides the text generator.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub templates_dir: PathBuf,
    pub static_dir: PathBuf,
    pub max_sessions: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error(transparent)]
    Form(#[from] FormError),
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        match self {
            WebError::Form(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
            WebError::Template(e) => {
                error!("Failed to get or render template: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

// Minijinja Environment setup
pub fn create_minijinja_env(templates_dir: impl AsRef<Path>) -> AutoReloader {
    let templates_dir = templates_dir.as_ref().to_path_buf();
    AutoReloader::new(move |notifier| {
        // Create the loader *inside* the closure so reloads pick up new files
        let mut env = Environment::new();
        env.set_loader(path_loader(&templates_dir));
        notifier.watch_path(&templates_dir, true);
        Ok(env)
    })
}

#[derive(Serialize)]
struct RelationshipOption {
    key: &'static str,
    label: &'static str,
}

fn render_page(state: &AppState, form: &FormState, response: &ResponseState) -> Result<String, WebError> {
    let relationship_types: Vec<RelationshipOption> = RelationshipType::ALL
        .into_iter()
        .map(|kind| RelationshipOption {
            key: kind.key(),
            label: kind.label(),
        })
        .collect();

    let env = state.templates.acquire_env()?;
    let tmpl = env.get_template("index.html")?;
    let html = tmpl.render(minijinja::context! {
        title => "상담 채팅",
        form => form,
        relationship_type => form.relationship_type.key(),
        relationship_types => relationship_types,
        profile_mode => form.profiles.mode(),
        me => form.profiles.me(),
        partner => form.profiles.partner(),
        response => response,
    })?;
    Ok(html)
}

fn session_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies
        .split(';')
        .find_map(|c| c.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .and_then(|value| Uuid::parse_str(value).ok())
}

// Attaches the session cookie when the session was just created.
fn with_session_cookie(mut response: Response, id: Uuid, created: bool) -> Response {
    if created {
        let cookie = format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax");
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().insert(header::SET_COOKIE, value);
            }
            Err(e) => warn!("Failed to build session cookie: {}", e),
        }
    }
    response
}

async fn index_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, session, created) = state.session_for(session_id_from_headers(&headers)).await;
    let page = {
        let session = session.lock().await;
        render_page(&state, session.form(), session.response()).map(Html)
    };
    with_session_cookie(page.into_response(), id, created)
}

async fn submit_form_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(fields): Form<Vec<(String, String)>>,
) -> Response {
    let (id, session, created) = state.session_for(session_id_from_headers(&headers)).await;
    let page = submit_form(&state, session, &fields).await;
    with_session_cookie(page.into_response(), id, created)
}

async fn submit_form(
    state: &AppState,
    session: SharedSession,
    fields: &[(String, String)],
) -> Result<Html<String>, WebError> {
    session
        .lock()
        .await
        .set_fields(fields.iter().map(|(name, value)| (name.as_str(), value.as_str())))?;

    run_submit(state.generator.clone(), session.clone()).await;

    let session = session.lock().await;
    Ok(Html(render_page(state, session.form(), session.response())?))
}

#[derive(Debug, Deserialize)]
pub struct FieldUpdate {
    pub name: String,
    pub value: String,
}

async fn update_field_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<FieldUpdate>,
) -> Response {
    let (id, session, created) = state.session_for(session_id_from_headers(&headers)).await;
    let result = session
        .lock()
        .await
        .set_field(&update.name, &update.value)
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(WebError::from);
    with_session_cookie(result.into_response(), id, created)
}

#[derive(Serialize)]
struct StateSnapshot {
    form: FormState,
    response: ResponseState,
}

async fn state_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, session, created) = state.session_for(session_id_from_headers(&headers)).await;
    let snapshot = {
        let session = session.lock().await;
        StateSnapshot {
            form: session.form().clone(),
            response: session.response().clone(),
        }
    };
    with_session_cookie(Json(snapshot).into_response(), id, created)
}

#[derive(Serialize)]
struct SubmitReply {
    outcome: SubmitOutcome,
    response: ResponseState,
}

async fn api_submit_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, session, created) = state.session_for(session_id_from_headers(&headers)).await;
    let outcome = run_submit(state.generator.clone(), session.clone()).await;
    let reply = SubmitReply {
        outcome,
        response: session.lock().await.response().clone(),
    };
    let status = if outcome == SubmitOutcome::Busy {
        StatusCode::CONFLICT
    } else {
        StatusCode::OK
    };
    with_session_cookie((status, Json(reply)).into_response(), id, created)
}

/// Builds the application router around an already constructed state.
pub fn build_router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    // Serve static files from the configured directory
    let static_files_service = ServeDir::new(static_dir.as_ref()).not_found_service(
        tower::service_fn(|_: Request| async {
            Ok::<_, Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response())
        }),
    );

    Router::new()
        .route("/", get(index_handler))
        .route("/submit", post(submit_form_handler))
        .route("/api/field", post(update_field_handler))
        .route("/api/state", get(state_handler))
        .route("/api/submit", post(api_submit_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http()) // Add request logging
}

pub async fn start_web_server(config: ServerConfig, generator: Arc<dyn TextGenerator>) -> Result<()> {
    let templates = create_minijinja_env(&config.templates_dir);
    // Fail early if the page template can't be loaded
    templates
        .acquire_env()
        .and_then(|env| env.get_template("index.html").map(|_| ()))
        .with_context(|| {
            format!(
                "Failed to load index.html from {}",
                config.templates_dir.display()
            )
        })?;

    let state = AppState::new(templates, generator, config.max_sessions);
    let app = build_router(state, &config.static_dir);

    info!("Web server listening on http://{}", config.addr);

    // Bind using tokio::net::TcpListener
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .context(format!("Failed to bind to address {}", config.addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
