//! In-memory backend used by unit tests in place of `HttpTransport`.
//!
//! Implements the same routes as the real API, records every call, and lets a
//! test inject failures or change how the search and create routes behave.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Map, Value};
use tokio::sync::{Notify, Semaphore};

use crate::api_client::{ApiRequest, ApiTransport};
use crate::config::Config;
use crate::errors::ApiError;

/// How `GET /skills/?search=` behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Supported,
    /// Route missing: 404.
    Absent,
    /// Route exists but errors: 500.
    Broken,
}

/// What the create-association route echoes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateEcho {
    Faithful,
    /// Omits the job and echoes the skill id instead of its name.
    Sparse,
    /// Echoes the level and the flag in shapes the client cannot parse.
    Loose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

struct Failure {
    method: Method,
    path_prefix: String,
    status: u16,
    body: Value,
}

struct Inner {
    skills: Vec<Value>,
    associations: Vec<Value>,
    next_association: u32,
    calls: Vec<Call>,
    failures: Vec<Failure>,
    search_mode: SearchMode,
    create_echo: CreateEcho,
    unique_skill_names: bool,
    list_skills_fails: bool,
    /// Registered by "another client" right before our next skill create.
    racing_skill: Option<(String, String)>,
}

#[derive(Clone)]
pub struct FakeBackend {
    inner: Arc<Mutex<Inner>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                skills: Vec::new(),
                associations: Vec::new(),
                next_association: 1,
                calls: Vec::new(),
                failures: Vec::new(),
                search_mode: SearchMode::Supported,
                create_echo: CreateEcho::Faithful,
                unique_skill_names: false,
                list_skills_fails: false,
                racing_skill: None,
            })),
        }
    }

    pub fn transport(&self) -> Arc<dyn ApiTransport> {
        Arc::new(self.clone())
    }

    pub fn with_skill(self, id: &str, name: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .skills
            .push(json!({"id": id, "name": name, "description": null}));
        self
    }

    pub fn with_association(self, record: Value) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.associations.push(record);
            inner.next_association += 1;
        }
        self
    }

    pub fn set_search_mode(&self, mode: SearchMode) {
        self.inner.lock().unwrap().search_mode = mode;
    }

    pub fn set_create_echo(&self, echo: CreateEcho) {
        self.inner.lock().unwrap().create_echo = echo;
    }

    pub fn set_unique_skill_names(&self, on: bool) {
        self.inner.lock().unwrap().unique_skill_names = on;
    }

    /// The next `POST /skills/` loses a race: the skill `(id, name)` appears in
    /// the registry and the create is rejected as a duplicate.
    pub fn race_next_skill_create(&self, id: &str, name: &str) {
        self.inner.lock().unwrap().racing_skill = Some((id.to_string(), name.to_string()));
    }

    pub fn set_list_skills_fails(&self, on: bool) {
        self.inner.lock().unwrap().list_skills_fails = on;
    }

    /// The next request matching `method` and `path_prefix` fails with `status`.
    pub fn fail_next(&self, method: Method, path_prefix: &str, status: u16, body: Value) {
        self.inner.lock().unwrap().failures.push(Failure {
            method,
            path_prefix: path_prefix.to_string(),
            status,
            body,
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, method: Method, path_prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == method && c.path.starts_with(path_prefix))
            .count()
    }

    pub fn skill_creates(&self) -> usize {
        self.count_calls(Method::POST, "/skills/")
    }

    pub fn skills(&self) -> Vec<Value> {
        self.inner.lock().unwrap().skills.clone()
    }

    pub fn associations(&self) -> Vec<Value> {
        self.inner.lock().unwrap().associations.clone()
    }

    fn route(&self, request: &ApiRequest) -> Result<Value, (u16, Value)> {
        let mut inner = self.inner.lock().unwrap();
        let path = request.path.as_str();
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        match (request.method.as_str(), segments.as_slice()) {
            ("GET", ["skills"]) => {
                let search = request
                    .query
                    .iter()
                    .find(|(k, _)| k == "search")
                    .map(|(_, v)| v.to_lowercase());
                match (search, inner.search_mode) {
                    (Some(_), SearchMode::Absent) => Err((404, json!({"detail": "Not found."}))),
                    (Some(_), SearchMode::Broken) => Err((500, json!({"detail": "search index down"}))),
                    (Some(q), SearchMode::Supported) => Ok(Value::Array(
                        inner
                            .skills
                            .iter()
                            .filter(|s| {
                                s["name"]
                                    .as_str()
                                    .unwrap_or_default()
                                    .to_lowercase()
                                    .contains(&q)
                            })
                            .cloned()
                            .collect(),
                    )),
                    (None, _) if inner.list_skills_fails => {
                        Err((503, json!({"detail": "registry unavailable"})))
                    }
                    (None, _) => Ok(json!({"data": inner.skills.clone()})),
                }
            }
            ("POST", ["skills"]) => {
                let body = request.body.clone().unwrap_or(Value::Null);
                let name = body["name"].as_str().unwrap_or_default().to_string();
                if name.trim().is_empty() {
                    return Err((400, json!({"name": ["This field may not be blank."]})));
                }
                if let Some((id, winner)) = inner.racing_skill.take() {
                    inner.skills.push(json!({"id": id, "name": winner, "description": null}));
                    return Err((400, json!({"name": ["skill with this name already exists."]})));
                }
                if inner.unique_skill_names
                    && inner.skills.iter().any(|s| {
                        s["name"].as_str().unwrap_or_default().to_lowercase() == name.to_lowercase()
                    })
                {
                    return Err((400, json!({"name": ["skill with this name already exists."]})));
                }
                let id = format!("s{}", inner.skills.len() + 1);
                let created = json!({
                    "id": id,
                    "name": name,
                    "description": body.get("description").cloned().unwrap_or(Value::Null),
                    "category": body.get("category").cloned().unwrap_or(Value::Null),
                });
                inner.skills.push(created.clone());
                Ok(json!({"data": created}))
            }
            ("GET", ["jobs", "skills"]) => Ok(Value::Array(inner.associations.clone())),
            ("GET", ["jobs", "skills", id]) => inner
                .associations
                .iter()
                .find(|a| id_of(a) == *id)
                .cloned()
                .ok_or((404, json!({"detail": "Not found."}))),
            ("POST", ["jobs", "skills", "create", job_id]) => {
                let body = request.body.clone().unwrap_or(Value::Null);
                let skill_id = body["skill_id"].as_str().unwrap_or_default().to_string();
                let Some(skill) = inner.skills.iter().find(|s| id_of(s) == skill_id).cloned() else {
                    return Err((400, json!({"skill_id": ["Invalid pk - object does not exist."]})));
                };
                let id = format!("a{}", inner.next_association);
                inner.next_association += 1;
                let record = json!({
                    "id": id,
                    "job_id": job_id,
                    "skill": skill["name"],
                    "experience_level": body["experience_level"],
                    "is_required": body["is_required"],
                });
                inner.associations.push(record.clone());
                match inner.create_echo {
                    CreateEcho::Faithful => Ok(record),
                    CreateEcho::Sparse => Ok(json!({
                        "data": {
                            "id": id,
                            "skill": skill_id,
                            "experience_level": body["experience_level"],
                            "is_required": body["is_required"],
                        }
                    })),
                    CreateEcho::Loose => Ok(json!({
                        "id": id,
                        "job_id": job_id,
                        "experience_level": "Advanced ",
                        "is_required": "true",
                    })),
                }
            }
            ("PUT", ["jobs", "skills", "update", id]) => {
                let body = request.body.clone().unwrap_or(Value::Null);
                let Some(record) = inner.associations.iter_mut().find(|a| id_of(a) == *id) else {
                    return Err((404, json!({"detail": "Not found."})));
                };
                if let (Some(target), Some(patch)) = (record.as_object_mut(), body.as_object()) {
                    merge(target, patch);
                }
                Ok(record.clone())
            }
            ("DELETE", ["jobs", "skills", "delete", id]) => {
                let before = inner.associations.len();
                inner.associations.retain(|a| id_of(a) != *id);
                if inner.associations.len() == before {
                    Err((404, json!({"detail": "Not found."})))
                } else {
                    Ok(Value::Null)
                }
            }
            _ => Err((404, json!({"detail": "Not found."}))),
        }
    }
}

fn id_of(value: &Value) -> String {
    match &value["id"] {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn merge(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        if key != "skill_id" {
            target.insert(key.clone(), value.clone());
        }
    }
}

#[async_trait]
impl ApiTransport for FakeBackend {
    async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        // Give other in-flight requests a chance to interleave.
        tokio::task::yield_now().await;

        let injected = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(Call {
                method: request.method.clone(),
                path: request.path.clone(),
                query: request.query.clone(),
                body: request.body.clone(),
            });
            let pos = inner.failures.iter().position(|f| {
                f.method == request.method && request.path.starts_with(&f.path_prefix)
            });
            pos.map(|i| inner.failures.remove(i))
        };

        if let Some(failure) = injected {
            let status = StatusCode::from_u16(failure.status).unwrap();
            return Err(ApiError::from_response(status, &failure.body.to_string()));
        }

        let result = self.route(&request);
        tokio::task::yield_now().await;

        result.map_err(|(status, body)| {
            ApiError::from_response(StatusCode::from_u16(status).unwrap(), &body.to_string())
        })
    }
}

/// Parks every request until `open` is called, so a test can observe or drop
/// an operation while it is in flight.
#[derive(Clone)]
pub struct GatedTransport {
    inner: Arc<dyn ApiTransport>,
    entered: Arc<Notify>,
    gate: Arc<Semaphore>,
}

impl GatedTransport {
    pub fn new(inner: Arc<dyn ApiTransport>) -> Self {
        Self {
            inner,
            entered: Arc::new(Notify::new()),
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    pub fn transport(&self) -> Arc<dyn ApiTransport> {
        Arc::new(self.clone())
    }

    /// Resolves once a request has reached the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Lets parked and future requests through. A closed semaphore never blocks.
    pub fn open(&self) {
        self.gate.close();
    }
}

#[async_trait]
impl ApiTransport for GatedTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        self.entered.notify_one();
        let _ = self.gate.acquire().await;
        self.inner.send(request).await
    }
}

pub fn test_config() -> Config {
    Config {
        api_base_url: "http://backend.test/api".to_string(),
        api_token: None,
        http_timeout_secs: 5,
        rust_log: "debug".to_string(),
    }
}
