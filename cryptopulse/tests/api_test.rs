use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rocket::http::{ContentType, Status};
use rocket::local::asynchronous::Client;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;

use cryptopulse::llm::{LlmProvider, LlmRequest, LlmResponse};
use cryptopulse::rag::{Document, Embedder, RagPipeline, RagSettings, VectorIndex};
use cryptopulse::server::{build_rocket, AppState};
use cryptopulse::storage::ensure_schema;

/// Maps a few coin names onto fixed axes
struct CoinEmbedder;

#[async_trait]
impl Embedder for CoinEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let t = t.to_lowercase();
                vec![
                    if t.contains("bitcoin") { 1.0 } else { 0.0 },
                    if t.contains("solana") { 1.0 } else { 0.0 },
                    0.1,
                ]
            })
            .collect())
    }
}

/// Echoes the prompt it was given so tests can inspect it
struct EchoLlm {
    down: AtomicBool,
}

#[async_trait]
impl LlmProvider for EchoLlm {
    async fn generate(&self, request: LlmRequest) -> anyhow::Result<LlmResponse> {
        if self.down.load(Ordering::SeqCst) {
            anyhow::bail!("LLM API error 503 Service Unavailable: try later");
        }
        Ok(LlmResponse {
            content: format!("ANSWER<{}>", request.prompt),
            usage: Default::default(),
            model: "echo".into(),
        })
    }

    fn model(&self) -> &str {
        "echo"
    }
}

async fn client_with(documents: Vec<Document>, llm_down: bool, history_limit: usize) -> Client {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test pool");
    ensure_schema(&pool).await.expect("schema");

    let index = VectorIndex::build(&CoinEmbedder, documents)
        .await
        .expect("index");
    let settings = RagSettings {
        top_k: 1,
        ..Default::default()
    };
    let pipeline = RagPipeline::new(
        settings,
        Arc::new(CoinEmbedder),
        Arc::new(EchoLlm {
            down: AtomicBool::new(llm_down),
        }),
        index,
        None,
    );

    let state = AppState {
        started_at: Utc::now(),
        db: pool,
        pipeline: Arc::new(pipeline),
        history_limit,
    };
    Client::tracked(build_rocket(state, "127.0.0.1", 8000))
        .await
        .expect("valid rocket instance")
}

fn news() -> Vec<Document> {
    vec![
        Document {
            id: "btc-1".into(),
            source: "crypto_news".into(),
            text: "Bitcoin hashrate hit a record".into(),
        },
        Document {
            id: "sol-1".into(),
            source: "crypto_news".into(),
            text: "Solana validators upgraded".into(),
        },
    ]
}

async fn client() -> Client {
    client_with(news(), false, 50).await
}

async fn post_json(client: &Client, path: &str, body: Value) -> (Status, Value) {
    let response = client
        .post(path)
        .header(ContentType::JSON)
        .body(body.to_string())
        .dispatch()
        .await;
    let status = response.status();
    let value = response.into_json::<Value>().await.unwrap_or(Value::Null);
    (status, value)
}

async fn get_json(client: &Client, path: &str) -> (Status, Value) {
    let response = client.get(path).dispatch().await;
    let status = response.status();
    let value = response.into_json::<Value>().await.unwrap_or(Value::Null);
    (status, value)
}

async fn register(client: &Client, username: &str, prompt: &str) {
    let (status, _) = post_json(
        client,
        "/create_user",
        json!({"username": username, "chat_id": "1001", "system_prompt": prompt}),
    )
    .await;
    assert_eq!(status, Status::Ok);
}

#[rocket::async_test]
async fn health_reports_ok() {
    let client = client().await;
    let (status, body) = get_json(&client, "/health").await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body, json!({"data": {"status": "ok"}}));
}

#[rocket::async_test]
async fn create_and_get_user() {
    let client = client().await;
    let (status, body) = post_json(
        &client,
        "/create_user",
        json!({"username": "alice", "chat_id": "42", "system_prompt": "bitcoin mining"}),
    )
    .await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["data"]["message"], "User created successfully.");

    let (status, body) = get_json(&client, "/get_user?username=alice").await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["data"]["chat_id"], "42");
    assert_eq!(body["data"]["system_prompt"], "bitcoin mining");
    assert!(body["data"]["creation_date"].as_f64().unwrap() > 0.0);
}

#[rocket::async_test]
async fn duplicate_user_conflicts() {
    let client = client().await;
    register(&client, "alice", "defi").await;

    let (status, body) = post_json(
        &client,
        "/create_user",
        json!({"username": "alice", "chat_id": "42", "system_prompt": "nft"}),
    )
    .await;
    assert_eq!(status, Status::Conflict);
    assert_eq!(
        body["data"]["message"],
        "User with alice already exists in the system."
    );
    assert_eq!(body["data"]["error_key"], "conflict");
}

#[rocket::async_test]
async fn blank_prompt_is_rejected() {
    let client = client().await;
    let (status, body) = post_json(
        &client,
        "/create_user",
        json!({"username": "bob", "chat_id": "7", "system_prompt": "  "}),
    )
    .await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["data"]["error_key"], "execution_params_validation_error");
    assert_eq!(body["data"]["error_loc"], json!(["body", "system_prompt"]));
}

#[rocket::async_test]
async fn missing_fields_get_json_error() {
    let client = client().await;
    let (status, body) = post_json(&client, "/create_user", json!({"username": "x"})).await;
    assert_eq!(status, Status::UnprocessableEntity);
    assert_eq!(body["data"]["error_key"], "execution_params_validation_error");
}

#[rocket::async_test]
async fn unknown_route_is_json_404() {
    let client = client().await;
    let (status, body) = get_json(&client, "/nope").await;
    assert_eq!(status, Status::NotFound);
    assert_eq!(body["data"]["error_key"], "not_found");
}

#[rocket::async_test]
async fn set_prompt_updates_and_requires_user() {
    let client = client().await;
    let (status, body) = post_json(
        &client,
        "/set_prompt",
        json!({"username": "ghost", "new_prompt": "eth"}),
    )
    .await;
    assert_eq!(status, Status::NotFound);
    assert_eq!(body["data"]["message"], "User ghost not found.");

    register(&client, "carol", "eth").await;
    let (status, body) = post_json(
        &client,
        "/set_prompt",
        json!({"username": "carol", "new_prompt": "solana only"}),
    )
    .await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["data"]["message"], "Prompt updated successfully.");

    let (_, body) = get_json(&client, "/get_user?username=carol").await;
    assert_eq!(body["data"]["system_prompt"], "solana only");
}

#[rocket::async_test]
async fn predict_answers_with_context_and_preferences() {
    let client = client().await;
    register(&client, "dave", "focus on miners").await;

    let (status, body) = post_json(
        &client,
        "/predict",
        json!({"username": "dave", "prompt": "What is new with bitcoin?"}),
    )
    .await;
    assert_eq!(status, Status::Ok);
    let response = body["data"]["response"].as_str().unwrap();
    assert!(response.contains("User preferences: focus on miners"));
    assert!(response.contains("Bitcoin hashrate hit a record"));
    assert!(!response.contains("Solana validators"));
    assert_eq!(body["data"]["sources"], json!(["btc-1"]));
}

#[rocket::async_test]
async fn predict_records_history() {
    let client = client_with(news(), false, 2).await;
    register(&client, "erin", "anything").await;

    for q in ["bitcoin?", "solana?"] {
        let (status, _) =
            post_json(&client, "/predict", json!({"username": "erin", "prompt": q})).await;
        assert_eq!(status, Status::Ok);
    }

    let (status, body) = get_json(&client, "/get_history?username=erin&limit=10").await;
    assert_eq!(status, Status::Ok);
    let messages = body["data"]["messages"].as_array().unwrap();
    // trimmed to the newest exchange
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "solana?");
    assert_eq!(messages[1]["role"], "assistant");
}

#[rocket::async_test]
async fn predict_errors() {
    let client = client().await;
    let (status, _) = post_json(
        &client,
        "/predict",
        json!({"username": "nobody", "prompt": "bitcoin?"}),
    )
    .await;
    assert_eq!(status, Status::NotFound);

    register(&client, "frank", "p").await;
    let (status, body) =
        post_json(&client, "/predict", json!({"username": "frank", "prompt": " "})).await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["data"]["error_loc"], json!(["body", "prompt"]));

    let empty = client_with(Vec::new(), false, 50).await;
    register(&empty, "frank", "p").await;
    let (status, body) = post_json(
        &empty,
        "/predict",
        json!({"username": "frank", "prompt": "bitcoin?"}),
    )
    .await;
    assert_eq!(status, Status::ServiceUnavailable);
    assert_eq!(
        body["data"]["message"],
        "No matching documents found in the index."
    );

    let down = client_with(news(), true, 50).await;
    register(&down, "frank", "p").await;
    let (status, body) = post_json(
        &down,
        "/predict",
        json!({"username": "frank", "prompt": "bitcoin?"}),
    )
    .await;
    assert_eq!(status, Status::BadGateway);
    assert_eq!(body["data"]["error_key"], "upstream_error");
}

#[rocket::async_test]
async fn list_and_remove_users() {
    let client = client().await;
    register(&client, "u1", "p1").await;
    register(&client, "u2", "p2").await;

    let (status, body) = get_json(&client, "/get_all_users").await;
    assert_eq!(status, Status::Ok);
    let names: Vec<&str> = body["data"]["users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["u1", "u2"]);

    let (status, body) = post_json(&client, "/remove_user", json!({"username": "u1"})).await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["data"]["message"], "User removed successfully.");

    let (status, _) = get_json(&client, "/get_user?username=u1").await;
    assert_eq!(status, Status::NotFound);
    let (_, body) = get_json(&client, "/get_all_users").await;
    assert_eq!(body["data"]["users"].as_array().unwrap().len(), 1);
}

#[rocket::async_test]
async fn get_user_requires_username() {
    let client = client().await;
    let (status, body) = get_json(&client, "/get_user").await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["data"]["error_loc"], json!(["query", "username"]));
}

#[rocket::async_test]
async fn malformed_json_is_bad_request() {
    let client = client().await;
    let response = client
        .post("/create_user")
        .header(ContentType::JSON)
        .body(r#"{"username": "#)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    let body = response.into_json::<Value>().await.unwrap();
    assert_eq!(body["data"]["error_key"], "execution_params_validation_error");
}

#[rocket::async_test]
async fn history_of_unknown_user_is_not_found() {
    let client = client().await;
    let (status, body) = get_json(&client, "/get_history?username=ghost").await;
    assert_eq!(status, Status::NotFound);
    assert_eq!(body["data"]["error_key"], "not_found");
}

#[rocket::async_test]
async fn history_limit_defaults_and_clamps() {
    let client = client().await;
    register(&client, "gina", "anything").await;
    for q in ["bitcoin?", "solana?", "bitcoin again?"] {
        let (status, _) =
            post_json(&client, "/predict", json!({"username": "gina", "prompt": q})).await;
        assert_eq!(status, Status::Ok);
    }

    let (status, body) = get_json(&client, "/get_history?username=gina").await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["data"]["messages"].as_array().unwrap().len(), 6);

    // 0 is raised to 1
    let (status, body) = get_json(&client, "/get_history?username=gina&limit=0").await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["data"]["messages"].as_array().unwrap().len(), 1);

    let (status, body) = get_json(&client, "/get_history?username=gina&limit=5000").await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["data"]["messages"].as_array().unwrap().len(), 6);
}

#[rocket::async_test]
async fn removing_a_user_clears_history() {
    let client = client().await;
    register(&client, "hank", "btc").await;
    let (status, _) = post_json(
        &client,
        "/predict",
        json!({"username": "hank", "prompt": "bitcoin?"}),
    )
    .await;
    assert_eq!(status, Status::Ok);

    let (status, _) = post_json(&client, "/remove_user", json!({"username": "hank"})).await;
    assert_eq!(status, Status::Ok);

    register(&client, "hank", "btc").await;
    let (status, body) = get_json(&client, "/get_history?username=hank").await;
    assert_eq!(status, Status::Ok);
    assert!(body["data"]["messages"].as_array().unwrap().is_empty());
}
