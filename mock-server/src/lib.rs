use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, Query, RawQuery, State},
    http::{header, HeaderMap, Method, StatusCode},
    routing::{any, delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateItem {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct Page {
    #[serde(default = "first_page")]
    pub page: usize,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
}

fn first_page() -> usize {
    1
}

fn default_per_page() -> usize {
    20
}

/// Items keyed by insertion order so pages are stable.
pub type Db = Arc<RwLock<BTreeMap<(u64, Uuid), Item>>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(BTreeMap::new()));
    Router::new()
        .route("/items", get(list_items).post(create_item))
        .route("/items/{id}", delete(delete_item))
        .route("/private", get(private))
        .route("/plain", get(plain))
        .route("/echo", any(echo))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn list_items(State(db): State<Db>, Query(page): Query<Page>) -> Json<Value> {
    let items = db.read().await;
    let skip = page.page.saturating_sub(1) * page.per_page;
    let slice: Vec<Item> = items.values().skip(skip).take(page.per_page).cloned().collect();
    Json(json!({ "items": slice, "page": page.page }))
}

async fn create_item(
    State(db): State<Db>,
    Json(input): Json<CreateItem>,
) -> (StatusCode, Json<Item>) {
    let item = Item {
        id: Uuid::new_v4(),
        name: input.name,
    };
    let mut items = db.write().await;
    let seq = items.keys().next_back().map_or(0, |(seq, _)| seq + 1);
    items.insert((seq, item.id), item.clone());
    tracing::debug!(id = %item.id, "item created");
    (StatusCode::CREATED, Json(item))
}

async fn delete_item(State(db): State<Db>, Path(id): Path<Uuid>) -> StatusCode {
    let mut items = db.write().await;
    let key = items.keys().find(|(_, item_id)| *item_id == id).copied();
    match key {
        Some(key) => {
            items.remove(&key);
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

/// Always rejects, with a body that is not JSON.
async fn private() -> (StatusCode, &'static str) {
    (StatusCode::UNAUTHORIZED, "<html>session expired</html>")
}

async fn plain() -> &'static str {
    "hello"
}

/// Reflect what the client sent.
async fn echo(
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: String,
) -> Json<Value> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let body: Value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&body).unwrap_or(Value::String(body))
    };
    Json(json!({
        "method": method.as_str(),
        "query": query,
        "content_type": content_type,
        "body": body,
    }))
}
