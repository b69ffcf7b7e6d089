use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rocket::http::Status;
use rocket::request::Request;
use rocket::serde::json::Json;
use rocket::{catch, catchers, get, post, routes, Build, Rocket, State};
use sqlx::SqlitePool;

use common::api::{
    Envelope, ErrorData, HistoryData, MessageData, PredictData, StatusData, UserInfo, UserInit,
    UserNewPrompt, UserPrompt, UserRef, UsersData,
};

use crate::error::ApiError;
use crate::rag::RagPipeline;
use crate::{history, users};

/// Application state stored inside Rocket managed state.
#[derive(Clone)]
pub struct AppState {
    pub started_at: DateTime<Utc>,
    pub db: SqlitePool,
    pub pipeline: Arc<RagPipeline>,
    /// Messages kept per user; 0 disables history
    pub history_limit: usize,
}

type ApiResult<T> = std::result::Result<Json<Envelope<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope::new(data)))
}

fn message(text: &str) -> ApiResult<MessageData> {
    ok(MessageData {
        message: text.to_string(),
    })
}

fn required_query(name: &str, value: Option<String>) -> std::result::Result<String, ApiError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiError::Validation {
            message: format!("{name} is required"),
            loc: Some(vec!["query".to_string(), name.to_string()]),
        }),
    }
}

#[get("/health")]
async fn health(state: &State<AppState>) -> Json<Envelope<StatusData>> {
    let uptime = (Utc::now() - state.started_at).num_seconds();
    tracing::debug!(uptime_seconds = uptime, "health check");
    Json(Envelope::new(StatusData {
        status: "ok".to_string(),
    }))
}

#[post("/create_user", data = "<body>")]
async fn create_user(state: &State<AppState>, body: Json<UserInit>) -> ApiResult<MessageData> {
    let body = body.into_inner();
    users::add_user(&state.db, &body.username, &body.system_prompt, &body.chat_id).await?;
    message("User created successfully.")
}

#[get("/get_user?<username>")]
async fn get_user(state: &State<AppState>, username: Option<String>) -> ApiResult<UserInfo> {
    let username = required_query("username", username)?;
    ok(users::get_user_info(&state.db, &username).await?)
}

#[post("/set_prompt", data = "<body>")]
async fn set_prompt(state: &State<AppState>, body: Json<UserNewPrompt>) -> ApiResult<MessageData> {
    users::set_user_prompt(&state.db, &body.username, &body.new_prompt).await?;
    message("Prompt updated successfully.")
}

#[post("/predict", data = "<body>")]
async fn predict(state: &State<AppState>, body: Json<UserPrompt>) -> ApiResult<PredictData> {
    let user = users::get_user_info(&state.db, &body.username).await?;
    let answer = state
        .pipeline
        .run(&body.prompt, Some(&user.system_prompt))
        .await?;

    if state.history_limit > 0 {
        if let Err(e) = record_exchange(state, &user.username, &body.prompt, &answer.text).await {
            tracing::warn!(username = %user.username, "failed to record history: {:#}", e);
        }
    }

    ok(PredictData {
        response: answer.text,
        sources: answer.sources,
    })
}

async fn record_exchange(state: &AppState, username: &str, prompt: &str, reply: &str) -> Result<()> {
    history::store_message(&state.db, username, history::ROLE_USER, prompt.trim()).await?;
    history::store_message(&state.db, username, history::ROLE_ASSISTANT, reply).await?;
    history::trim(&state.db, username, state.history_limit).await?;
    Ok(())
}

#[get("/get_all_users")]
async fn get_all_users(state: &State<AppState>) -> ApiResult<UsersData> {
    ok(UsersData {
        users: users::get_all_users(&state.db).await?,
    })
}

#[post("/remove_user", data = "<body>")]
async fn remove_user(state: &State<AppState>, body: Json<UserRef>) -> ApiResult<MessageData> {
    users::remove_user(&state.db, &body.username).await?;
    history::clear(&state.db, &body.username).await?;
    message("User removed successfully.")
}

#[get("/get_history?<username>&<limit>")]
async fn get_history(
    state: &State<AppState>,
    username: Option<String>,
    limit: Option<usize>,
) -> ApiResult<HistoryData> {
    let username = required_query("username", username)?;
    // unknown users are a 404, not an empty list
    users::get_user_info(&state.db, &username).await?;
    let limit = limit.unwrap_or(20).clamp(1, 200);
    ok(HistoryData {
        messages: history::get_messages(&state.db, &username, limit).await?,
    })
}

/// JSON envelope for every error Rocket produces itself (bad JSON, unknown route, ...)
#[catch(default)]
fn default_catcher(status: Status, req: &Request<'_>) -> (Status, Json<Envelope<ErrorData>>) {
    let (message, key) = match status.code {
        400 => ("Malformed request body.".to_string(), "execution_params_validation_error"),
        404 => (format!("No route for {} {}", req.method(), req.uri()), "not_found"),
        422 => (
            "Request body does not match the expected schema.".to_string(),
            "execution_params_validation_error",
        ),
        _ => (
            status.reason().unwrap_or("Unexpected error").to_string(),
            "general_logic_error",
        ),
    };
    (
        status,
        Json(Envelope::new(ErrorData {
            message,
            error_key: Some(key.to_string()),
            error_loc: None,
        })),
    )
}

/// Rocket instance with every route mounted; `address`/`port` override Rocket's defaults.
pub fn build_rocket(state: AppState, address: &str, port: u16) -> Rocket<Build> {
    let fig = rocket::Config::figment()
        .merge(("address", address.to_string()))
        .merge(("port", port));

    rocket::custom(fig)
        .manage(state)
        .mount(
            "/",
            routes![
                health,
                create_user,
                get_user,
                set_prompt,
                predict,
                get_all_users,
                remove_user,
                get_history,
            ],
        )
        .register("/", catchers![default_catcher])
}

pub async fn launch(state: AppState, address: &str, port: u16) -> Result<()> {
    // Launch Rocket - this will run until shutdown (SIGINT/SIGTERM etc.)
    tracing::info!(address, port, "Starting Rocket HTTP server");
    build_rocket(state, address, port)
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    tracing::info!("Rocket HTTP server has shut down");
    Ok(())
}
