#![allow(dead_code)]

//! In-process stand-in for the garden API, served on an ephemeral port.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct User {
    id: i64,
    username: String,
    email: String,
    password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Default)]
struct Backend {
    users: Vec<User>,
    access_tokens: HashMap<String, i64>,
    refresh_tokens: HashMap<String, i64>,
    collections: BTreeMap<String, Vec<Value>>,
    next_id: i64,
    issued: u64,
    fail_next: Option<(u16, Value)>,
    acknowledge_writes: bool,
    requests: Vec<RecordedRequest>,
}

type Shared = Arc<Mutex<Backend>>;

pub struct FakeApi {
    pub base_url: String,
    state: Shared,
}

impl FakeApi {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(Backend::default()));
        let app = Router::new()
            .route("/{*path}", any(dispatch))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake api");
        let addr = listener.local_addr().expect("fake api address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake api crashed");
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    /// The next request (of any kind) answers with this status and body.
    pub fn fail_next(&self, status: u16, body: Value) {
        self.state.lock().unwrap().fail_next = Some((status, body));
    }

    /// Creates and updates answer with a confirmation message instead of the
    /// stored row. Care schedules still carry the row under `schedule`.
    pub fn acknowledge_writes(&self) {
        self.state.lock().unwrap().acknowledge_writes = true;
    }

    /// Invalidates every issued access token, as if they all expired.
    pub fn expire_tokens(&self) {
        self.state.lock().unwrap().access_tokens.clear();
    }

    /// Stores a raw row, bypassing validation.
    pub fn insert(&self, collection: &str, row: Value) {
        self.state
            .lock()
            .unwrap()
            .collections
            .entry(collection.trim_start_matches('/').to_string())
            .or_default()
            .push(row);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn last_request(&self) -> RecordedRequest {
        self.requests().last().cloned().expect("no requests recorded")
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }
}

fn reply(status: u16, body: Value) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn dispatch(
    State(state): State<Shared>,
    method: Method,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut backend = state.lock().unwrap();

    backend.requests.push(RecordedRequest {
        method: method.to_string(),
        path: format!("/{}", path),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    });

    if let Some((status, body)) = backend.fail_next.take() {
        return reply(status, body);
    }

    let body: Map<String, Value> = serde_json::from_slice(&body).unwrap_or_default();
    let text = |key: &str| body.get(key).and_then(Value::as_str).unwrap_or("").to_string();

    match (method.as_str(), path.as_str()) {
        ("POST", "register") => {
            let username = text("username");
            let email = text("email");
            if backend.users.iter().any(|u| u.username == username) {
                return reply(400, json!({"msg": "Username already exists"}));
            }
            if backend.users.iter().any(|u| u.email == email) {
                return reply(400, json!({"msg": "Email already exists"}));
            }
            backend.next_id += 1;
            let id = backend.next_id;
            backend.users.push(User {
                id,
                username,
                email,
                password: text("password"),
            });
            reply(201, json!({"msg": "User registered successfully"}))
        }
        ("POST", "login") => {
            let email = text("email");
            let password = text("password");
            let user = match backend.users.iter().find(|u| u.email == email).cloned() {
                Some(user) => user,
                None => return reply(401, json!({"msg": "User not found"})),
            };
            if user.password != password {
                return reply(401, json!({"msg": "Invalid password"}));
            }
            backend.issued += 1;
            let access = format!("access-{}-{}", user.id, backend.issued);
            let refresh = format!("refresh-{}-{}", user.id, backend.issued);
            backend.access_tokens.insert(access.clone(), user.id);
            backend.refresh_tokens.insert(refresh.clone(), user.id);
            reply(
                200,
                json!({"access_token": access, "refresh_token": refresh, "username": user.username}),
            )
        }
        ("POST", "refresh") => {
            let user_id = bearer(&headers).and_then(|t| backend.refresh_tokens.get(&t).copied());
            match user_id {
                Some(user_id) => {
                    backend.issued += 1;
                    let access = format!("access-{}-{}", user_id, backend.issued);
                    backend.access_tokens.insert(access.clone(), user_id);
                    reply(200, json!({"access_token": access}))
                }
                None => reply(401, json!({"msg": "Invalid refresh token"})),
            }
        }
        ("POST", "logout") => reply(200, json!({"msg": "Logged out successfully"})),
        _ => {
            let user_id = match bearer(&headers).and_then(|t| backend.access_tokens.get(&t).copied())
            {
                Some(user_id) => user_id,
                None => return reply(401, json!({"msg": "Missing or invalid token"})),
            };
            let username = backend
                .users
                .iter()
                .find(|u| u.id == user_id)
                .map(|u| u.username.clone())
                .unwrap_or_default();
            resource(&mut backend, &method, &path, body, user_id, &username)
        }
    }
}

fn resource(
    backend: &mut Backend,
    method: &Method,
    path: &str,
    body: Map<String, Value>,
    user_id: i64,
    username: &str,
) -> Response {
    let segments: Vec<&str> = path.split('/').collect();

    if method.as_str() == "POST" && segments.last() == Some(&"reactions") {
        let collection = segments[..segments.len() - 2].join("/");
        let id = segments[segments.len() - 2].parse::<i64>().unwrap_or(-1);
        let kind = body.get("type").and_then(Value::as_str).unwrap_or("like").to_string();
        let rows = backend.collections.entry(collection).or_default();
        return match rows.iter_mut().find(|row| row["id"] == json!(id)) {
            Some(row) => {
                let current = row["reactions"][&kind].as_i64().unwrap_or(0);
                if !row["reactions"].is_object() {
                    row["reactions"] = json!({"like": 0, "dislike": 0});
                }
                row["reactions"][&kind] = json!(current + 1);
                reply(200, json!({"reactions": row["reactions"].clone()}))
            }
            None => reply(404, json!({"msg": "Post not found"})),
        };
    }

    // `forum/posts` is a two-segment collection root.
    let depth = if segments[0] == "forum" {
        segments.len() - 1
    } else {
        segments.len()
    };

    if depth % 2 == 1 {
        let rows = backend.collections.entry(path.to_string()).or_default().clone();
        return match method.as_str() {
            "GET" => reply(200, Value::Array(rows)),
            "POST" => {
                backend.next_id += 1;
                let mut row = body;
                row.insert("id".into(), json!(backend.next_id));
                row.insert("user_id".into(), json!(user_id));
                if segments[0] == "forum" {
                    row.insert("author".into(), json!({"id": user_id, "username": username}));
                    row.insert("isOwner".into(), json!(true));
                }
                if segments.len() >= 3 && segments[2] == "care_schedules" {
                    let plant_id = segments[1].parse::<i64>().unwrap_or(-1);
                    row.insert("plant_id".into(), json!(plant_id));
                }
                let is_schedule = row.contains_key("plant_id");
                let row = Value::Object(row);
                backend
                    .collections
                    .entry(path.to_string())
                    .or_default()
                    .push(row.clone());
                match (backend.acknowledge_writes, is_schedule) {
                    (false, _) => reply(201, row),
                    (true, true) => reply(
                        201,
                        json!({"msg": "Care schedule added successfully", "schedule": row}),
                    ),
                    (true, false) => reply(201, json!({"message": "Added successfully"})),
                }
            }
            _ => reply(405, json!({"msg": "Method not allowed"})),
        };
    }

    let collection = segments[..segments.len() - 1].join("/");
    let id = segments[segments.len() - 1].parse::<i64>().unwrap_or(-1);
    let acknowledge = backend.acknowledge_writes;
    let rows = backend.collections.entry(collection).or_default();
    let position = rows.iter().position(|row| row["id"] == json!(id));

    match (method.as_str(), position) {
        (_, None) => reply(404, json!({"msg": "Not found"})),
        ("GET", Some(index)) => reply(200, rows[index].clone()),
        ("PATCH", Some(index)) | ("PUT", Some(index)) => {
            if let Value::Object(row) = &mut rows[index] {
                for (key, value) in body {
                    row.insert(key, value);
                }
            }
            if acknowledge {
                return reply(200, json!({"msg": "Updated successfully"}));
            }
            reply(200, rows[index].clone())
        }
        ("DELETE", Some(index)) => {
            rows.remove(index);
            reply(200, json!({"msg": "Deleted successfully"}))
        }
        _ => reply(405, json!({"msg": "Method not allowed"})),
    }
}
