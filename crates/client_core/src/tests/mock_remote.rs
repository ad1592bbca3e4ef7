use std::{collections::HashMap, sync::Arc, time::Duration as StdDuration};

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use shared::{
    domain::{FamilyId, Identity},
    protocol::{FamilyRow, NewFamilyRow, NewMembershipRow},
};
use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex},
    time::{sleep, timeout},
};

use crate::config::RemoteConfig;

pub(crate) const ANON_KEY: &str = "anon-test-key";

pub(crate) struct MockState {
    pub users: HashMap<String, (String, String)>,
    pub families: Vec<FamilyRow>,
    pub memberships: Vec<NewMembershipRow>,
    pub fail_membership: bool,
    pub fail_listing: bool,
    pub confirm_sign_ups: bool,
    pub allow_refresh: bool,
    pub expires_in: i64,
    pub logouts: u32,
    pub listings: u32,
    /// Password grants for these emails wait until the sender fires.
    token_gates: HashMap<String, oneshot::Receiver<()>>,
    seq: i64,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            users: HashMap::new(),
            families: Vec::new(),
            memberships: Vec::new(),
            fail_membership: false,
            fail_listing: false,
            confirm_sign_ups: false,
            allow_refresh: true,
            expires_in: 3600,
            logouts: 0,
            listings: 0,
            token_gates: HashMap::new(),
            seq: 0,
        }
    }
}

impl MockState {
    fn next_created_at(&mut self) -> DateTime<Utc> {
        self.seq += 1;
        let base = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .expect("base timestamp");
        base + Duration::seconds(self.seq)
    }

    fn session_json(&self, user_id: &str, email: &str) -> Value {
        json!({
            "access_token": format!("token-{user_id}"),
            "refresh_token": format!("refresh-{user_id}"),
            "expires_in": self.expires_in,
            "token_type": "bearer",
            "user": { "id": user_id, "email": email },
        })
    }

    /// Seeds a family the user already belongs to.
    pub fn seed_family(&mut self, id: &str, name: &str, member: &str) {
        let created_at = self.next_created_at();
        self.families.push(FamilyRow {
            id: FamilyId::from(id),
            name: name.to_string(),
            created_at: Some(created_at),
        });
        self.memberships.push(NewMembershipRow {
            family_id: FamilyId::from(id),
            user_id: Identity::from(member),
            role: shared::domain::MembershipRole::Admin,
        });
    }
}

#[derive(Clone, Default)]
pub(crate) struct MockRemote {
    pub state: Arc<Mutex<MockState>>,
}

impl MockRemote {
    pub async fn with_user(email: &str, password: &str, user_id: &str) -> Self {
        let remote = Self::default();
        remote
            .state
            .lock()
            .await
            .users
            .insert(email.to_string(), (password.to_string(), user_id.to_string()));
        remote
    }

    pub async fn gate_token(&self, email: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state
            .lock()
            .await
            .token_gates
            .insert(email.to_string(), rx);
        tx
    }

    /// Waits until the password grant for `email` has reached the server.
    pub async fn token_requested(&self, email: &str) {
        timeout(StdDuration::from_secs(5), async {
            while self.state.lock().await.token_gates.contains_key(email) {
                sleep(StdDuration::from_millis(5)).await;
            }
        })
        .await
        .expect("token request reached the mock");
    }

    pub async fn spawn(&self) -> RemoteConfig {
        std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let app = Router::new()
            .route("/auth/v1/token", post(token))
            .route("/auth/v1/signup", post(sign_up))
            .route("/auth/v1/logout", post(logout))
            .route("/rest/v1/families", get(list_families).post(insert_family))
            .route("/rest/v1/family_members", post(insert_membership))
            .with_state(self.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        RemoteConfig {
            url: url::Url::parse(&format!("http://{addr}")).expect("url"),
            anon_key: ANON_KEY.to_string(),
        }
    }
}

fn has_anon_key(headers: &HeaderMap) -> bool {
    headers
        .get("apikey")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == ANON_KEY)
}

fn bearer_user(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer token-")
        .map(str::to_string)
}

fn reject(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

async fn token(
    State(remote): State<MockRemote>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !has_anon_key(&headers) {
        return reject(StatusCode::UNAUTHORIZED, json!({"message": "No API key found"}));
    }
    let email = body["email"].as_str().unwrap_or_default();
    let gate = remote.state.lock().await.token_gates.remove(email);
    if let Some(gate) = gate {
        let _ = gate.await;
    }

    let state = remote.state.lock().await;
    match query.get("grant_type").map(String::as_str) {
        Some("password") => {
            let password = body["password"].as_str().unwrap_or_default();
            match state.users.get(email) {
                Some((expected, user_id)) if expected == password => {
                    Json(state.session_json(user_id, email)).into_response()
                }
                _ => reject(
                    StatusCode::BAD_REQUEST,
                    json!({"error": "invalid_grant", "error_description": "Invalid login credentials"}),
                ),
            }
        }
        Some("refresh_token") if state.allow_refresh => {
            let refresh = body["refresh_token"].as_str().unwrap_or_default();
            let user_id = refresh.strip_prefix("refresh-").unwrap_or_default();
            let email = state
                .users
                .iter()
                .find(|(_, (_, id))| id == user_id)
                .map(|(email, _)| email.clone())
                .unwrap_or_default();
            Json(state.session_json(user_id, &email)).into_response()
        }
        _ => reject(
            StatusCode::BAD_REQUEST,
            json!({"error": "invalid_grant", "error_description": "Refresh Token Not Found"}),
        ),
    }
}

async fn sign_up(State(remote): State<MockRemote>, Json(body): Json<Value>) -> Response {
    let mut state = remote.state.lock().await;
    let email = body["email"].as_str().unwrap_or_default().to_string();
    let password = body["password"].as_str().unwrap_or_default().to_string();
    if state.users.contains_key(&email) {
        return reject(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({"msg": "User already registered"}),
        );
    }
    let user_id = format!("user-{}", state.users.len() + 1);
    state
        .users
        .insert(email.clone(), (password, user_id.clone()));
    if state.confirm_sign_ups {
        Json(json!({"id": user_id, "email": email, "confirmation_sent_at": "2024-01-01T00:00:00Z"}))
            .into_response()
    } else {
        Json(state.session_json(&user_id, &email)).into_response()
    }
}

async fn logout(State(remote): State<MockRemote>, headers: HeaderMap) -> StatusCode {
    if bearer_user(&headers).is_none() {
        return StatusCode::UNAUTHORIZED;
    }
    remote.state.lock().await.logouts += 1;
    StatusCode::NO_CONTENT
}

async fn list_families(
    State(remote): State<MockRemote>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let Some(user_id) = bearer_user(&headers) else {
        return reject(StatusCode::UNAUTHORIZED, json!({"message": "JWT expired"}));
    };
    let mut state = remote.state.lock().await;
    state.listings += 1;
    if state.fail_listing {
        return reject(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"message": "database unavailable"}),
        );
    }
    let mut rows: Vec<FamilyRow> = state
        .families
        .iter()
        .filter(|family| {
            state
                .memberships
                .iter()
                .any(|m| m.family_id == family.id && m.user_id.as_str() == user_id)
        })
        .cloned()
        .collect();
    if query.get("order").map(String::as_str) == Some("created_at.desc") {
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }
    Json(rows).into_response()
}

async fn insert_family(
    State(remote): State<MockRemote>,
    headers: HeaderMap,
    Json(body): Json<NewFamilyRow>,
) -> Response {
    if bearer_user(&headers).is_none() {
        return reject(StatusCode::UNAUTHORIZED, json!({"message": "JWT expired"}));
    }
    let mut state = remote.state.lock().await;
    let created_at = state.next_created_at();
    let row = FamilyRow {
        id: FamilyId::new(format!("fam-{}", state.families.len() + 1)),
        name: body.name,
        created_at: Some(created_at),
    };
    state.families.push(row.clone());
    let wants_row = headers
        .get("Prefer")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("return=representation"));
    if wants_row {
        (StatusCode::CREATED, Json(vec![row])).into_response()
    } else {
        StatusCode::CREATED.into_response()
    }
}

async fn insert_membership(
    State(remote): State<MockRemote>,
    headers: HeaderMap,
    Json(body): Json<NewMembershipRow>,
) -> Response {
    if bearer_user(&headers).is_none() {
        return reject(StatusCode::UNAUTHORIZED, json!({"message": "JWT expired"}));
    }
    let mut state = remote.state.lock().await;
    if state.fail_membership {
        return reject(
            StatusCode::FORBIDDEN,
            json!({"message": "new row violates row-level security policy"}),
        );
    }
    state.memberships.push(body);
    StatusCode::CREATED.into_response()
}
