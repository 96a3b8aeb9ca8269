//! In-memory fakes of every port, shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use client_lib::client::AppState;
use client_lib::config::Config;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use todo_core::domain::{
    AuthEvent, AuthEventKind, AuthUser, Bucket, CreateTodoInput, Profile, Session,
    SignUpCredentials, Todo, TodoFilters, TodoStatus, UpdateProfileInput, UpdateTodoInput,
    UserRole,
};
use todo_core::ports::{
    AuthEventStream, AuthService, DatabaseService, ObjectStorage, PortError, PortResult,
};
use tokio::sync::{broadcast, Notify};
use uuid::Uuid;

//=========================================================================================
// Builders
//=========================================================================================

pub fn session_for(user_id: Uuid) -> Session {
    Session {
        access_token: format!("access-{user_id}"),
        refresh_token: format!("refresh-{user_id}"),
        expires_at: Utc::now() + Duration::hours(1),
        user: AuthUser {
            id: user_id,
            email: Some(format!("{user_id}@example.com")),
        },
    }
}

pub fn profile_for(user_id: Uuid, role: UserRole) -> Profile {
    let now = Utc::now();
    Profile {
        id: user_id,
        email: format!("{user_id}@example.com"),
        full_name: Some("Test User".to_string()),
        avatar_url: None,
        role,
        created_at: now,
        updated_at: now,
    }
}

/// No retries, so failing fakes do not slow the tests down.
pub fn test_config() -> Config {
    Config {
        query_retries: 0,
        mutation_retries: 0,
        ..Config::default()
    }
}

/// Yields to other tasks until `condition` holds.
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}

//=========================================================================================
// Auth
//=========================================================================================

pub struct FakeAuth {
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
    pub subscribe_calls: AtomicUsize,
    pub get_session_calls: AtomicUsize,
    pub fail_get_session: AtomicBool,
    pub fail_sign_out: AtomicBool,
    /// Accepted `(email, password)` pairs and the user they sign in as.
    accounts: Mutex<Vec<(String, String, Uuid)>>,
    pub reset_requests: Mutex<Vec<(String, String)>>,
}

impl FakeAuth {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            session: Mutex::new(None),
            events,
            subscribe_calls: AtomicUsize::new(0),
            get_session_calls: AtomicUsize::new(0),
            fail_get_session: AtomicBool::new(false),
            fail_sign_out: AtomicBool::new(false),
            accounts: Mutex::new(Vec::new()),
            reset_requests: Mutex::new(Vec::new()),
        }
    }

    /// Starts with a restorable session for `user_id`.
    pub fn with_session(user_id: Uuid) -> Self {
        let auth = Self::new();
        *auth.session.lock().unwrap() = Some(session_for(user_id));
        auth
    }

    pub fn add_account(&self, email: &str, password: &str, user_id: Uuid) {
        self.accounts
            .lock()
            .unwrap()
            .push((email.to_string(), password.to_string(), user_id));
    }

    /// Delivers a synthetic session-change notification.
    pub fn emit(&self, kind: AuthEventKind, session: Option<Session>) {
        *self.session.lock().unwrap() = session.clone();
        let _ = self.events.send(AuthEvent::new(kind, session));
    }
}

#[async_trait]
impl AuthService for FakeAuth {
    async fn get_session(&self) -> PortResult<Option<Session>> {
        self.get_session_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_get_session.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("auth service unreachable".to_string()));
        }
        Ok(self.session.lock().unwrap().clone())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<Session> {
        let user_id = self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|(e, p, _)| e == email && p == password)
            .map(|(_, _, id)| *id)
            .ok_or_else(|| PortError::Invalid("Invalid login credentials".to_string()))?;
        let session = session_for(user_id);
        self.emit(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, credentials: &SignUpCredentials) -> PortResult<Option<Session>> {
        self.add_account(&credentials.email, &credentials.password, Uuid::new_v4());
        Ok(None)
    }

    async fn sign_out(&self) -> PortResult<()> {
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("network down".to_string()));
        }
        self.emit(AuthEventKind::SignedOut, None);
        Ok(())
    }

    async fn request_password_reset(&self, email: &str, redirect_to: &str) -> PortResult<()> {
        self.reset_requests
            .lock()
            .unwrap()
            .push((email.to_string(), redirect_to.to_string()));
        Ok(())
    }

    async fn update_password(&self, _new_password: &str) -> PortResult<()> {
        Ok(())
    }

    fn subscribe(&self) -> AuthEventStream {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let mut receiver = self.events.subscribe();
        Box::pin(async_stream::stream! {
            while let Ok(event) = receiver.recv().await {
                yield event;
            }
        })
    }
}

//=========================================================================================
// Database
//=========================================================================================

#[derive(Default)]
pub struct FakeDb {
    profiles: Mutex<Vec<Profile>>,
    todos: Mutex<Vec<Todo>>,
    pub list_calls: AtomicUsize,
    pub fail_profile_reads: AtomicBool,
    pub fail_updates: AtomicBool,
    /// Statuses written by `update_todo`, in commit order.
    pub committed_statuses: Mutex<Vec<TodoStatus>>,
    update_gate: Mutex<Option<Arc<Notify>>>,
    list_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_profile(&self, profile: Profile) {
        self.profiles.lock().unwrap().push(profile);
    }

    pub fn add_todo(&self, owner: Uuid, title: &str, status: TodoStatus) -> Todo {
        let now = Utc::now();
        let todo = Todo {
            id: Uuid::new_v4(),
            user_id: owner,
            title: title.to_string(),
            description: None,
            status,
            priority: Default::default(),
            image_url: None,
            due_date: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.todos.lock().unwrap().push(todo.clone());
        todo
    }

    pub fn stored_todo(&self, id: Uuid) -> Option<Todo> {
        self.todos.lock().unwrap().iter().find(|t| t.id == id).cloned()
    }

    /// Makes the next `update_todo` wait until the returned handle is notified.
    pub fn gate_next_update(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.update_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Makes the next `list_todos` wait until the returned handle is notified.
    pub fn gate_next_list(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.list_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn profile(&self, user_id: Uuid) -> PortResult<Profile> {
        self.profiles
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Profile {user_id} not found")))
    }
}

#[async_trait]
impl DatabaseService for FakeDb {
    async fn get_profile(&self, user_id: Uuid) -> PortResult<Profile> {
        tokio::task::yield_now().await;
        if self.fail_profile_reads.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("profiles unavailable".to_string()));
        }
        self.profile(user_id)
    }

    async fn list_profiles(&self) -> PortResult<Vec<Profile>> {
        let mut profiles = self.profiles.lock().unwrap().clone();
        profiles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(profiles)
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        input: &UpdateProfileInput,
    ) -> PortResult<Profile> {
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles
            .iter_mut()
            .find(|p| p.id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("Profile {user_id} not found")))?;
        if let Some(name) = &input.full_name {
            profile.full_name = Some(name.clone());
        }
        if let Some(url) = &input.avatar_url {
            profile.avatar_url = Some(url.clone());
        }
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn update_role(&self, user_id: Uuid, role: UserRole) -> PortResult<Profile> {
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles
            .iter_mut()
            .find(|p| p.id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("Profile {user_id} not found")))?;
        profile.role = role;
        Ok(profile.clone())
    }

    async fn count_profiles(&self, role: Option<UserRole>) -> PortResult<u64> {
        let profiles = self.profiles.lock().unwrap();
        Ok(profiles
            .iter()
            .filter(|p| role.map_or(true, |r| p.role == r))
            .count() as u64)
    }

    async fn list_todos(&self, owner: Uuid, filters: &TodoFilters) -> PortResult<Vec<Todo>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.list_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let mut todos: Vec<Todo> = self
            .todos
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.user_id == owner && t.matches(filters))
            .cloned()
            .collect();
        todos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(todos)
    }

    async fn get_todo(&self, id: Uuid, owner: Uuid) -> PortResult<Todo> {
        self.todos
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id && t.user_id == owner)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Todo {id} not found")))
    }

    async fn create_todo(&self, owner: Uuid, input: &CreateTodoInput) -> PortResult<Todo> {
        let now = Utc::now();
        let todo = Todo {
            id: Uuid::new_v4(),
            user_id: owner,
            title: input.title.trim().to_string(),
            description: input.description.clone(),
            status: TodoStatus::Pending,
            priority: input.priority.unwrap_or_default(),
            image_url: input.image_url.clone(),
            due_date: input.due_date,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.todos.lock().unwrap().push(todo.clone());
        Ok(todo)
    }

    async fn update_todo(
        &self,
        id: Uuid,
        owner: Uuid,
        input: &UpdateTodoInput,
    ) -> PortResult<Todo> {
        let gate = self.update_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("write rejected".to_string()));
        }

        let mut todos = self.todos.lock().unwrap();
        let todo = todos
            .iter_mut()
            .find(|t| t.id == id && t.user_id == owner)
            .ok_or_else(|| PortError::NotFound(format!("Todo {id} not found")))?;
        if let Some(title) = &input.title {
            todo.title = title.clone();
        }
        if let Some(description) = &input.description {
            todo.description = Some(description.clone());
        }
        if let Some(status) = input.status {
            todo.set_status(status, Utc::now());
            self.committed_statuses.lock().unwrap().push(status);
        }
        if let Some(priority) = input.priority {
            todo.priority = priority;
        }
        if let Some(due_date) = input.due_date {
            todo.due_date = due_date;
        }
        if let Some(image_url) = &input.image_url {
            todo.image_url = image_url.clone();
        }
        todo.updated_at = Utc::now();
        Ok(todo.clone())
    }

    async fn delete_todo(&self, id: Uuid, owner: Uuid) -> PortResult<()> {
        let mut todos = self.todos.lock().unwrap();
        let before = todos.len();
        todos.retain(|t| !(t.id == id && t.user_id == owner));
        if todos.len() == before {
            return Err(PortError::NotFound(format!("Todo {id} not found")));
        }
        Ok(())
    }

    async fn list_todo_statuses(
        &self,
        owner: Option<Uuid>,
    ) -> PortResult<Vec<(Uuid, TodoStatus)>> {
        Ok(self
            .todos
            .lock()
            .unwrap()
            .iter()
            .filter(|t| owner.map_or(true, |o| t.user_id == o))
            .map(|t| (t.user_id, t.status))
            .collect())
    }
}

//=========================================================================================
// Storage
//=========================================================================================

#[derive(Default)]
pub struct FakeStorage {
    pub uploads: Mutex<Vec<(Bucket, String, String)>>,
    pub deletes: Mutex<Vec<(Bucket, String)>>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn upload(
        &self,
        bucket: Bucket,
        path: &str,
        _data: Bytes,
        content_type: &str,
    ) -> PortResult<String> {
        self.uploads
            .lock()
            .unwrap()
            .push((bucket, path.to_string(), content_type.to_string()));
        Ok(format!(
            "https://backend.test/storage/v1/object/public/{}/{}",
            bucket.as_str(),
            path
        ))
    }

    async fn delete(&self, bucket: Bucket, path: &str) -> PortResult<()> {
        self.deletes.lock().unwrap().push((bucket, path.to_string()));
        Ok(())
    }
}

//=========================================================================================
// Wiring
//=========================================================================================

pub struct Harness {
    pub auth: Arc<FakeAuth>,
    pub db: Arc<FakeDb>,
    pub storage: Arc<FakeStorage>,
    pub state: Arc<AppState>,
}

impl Harness {
    pub fn new(auth: FakeAuth, db: FakeDb) -> Self {
        let auth = Arc::new(auth);
        let db = Arc::new(db);
        let storage = Arc::new(FakeStorage::default());
        let state = Arc::new(AppState::new(
            auth.clone(),
            db.clone(),
            storage.clone(),
            Arc::new(test_config()),
        ));
        Self {
            auth,
            db,
            storage,
            state,
        }
    }

    /// A harness whose store has already restored a session for a user with `role`.
    pub async fn signed_in(role: UserRole) -> (Self, Uuid) {
        let user_id = Uuid::new_v4();
        let db = FakeDb::new();
        db.add_profile(profile_for(user_id, role));
        let harness = Self::new(FakeAuth::with_session(user_id), db);
        harness.state.session.initialize().await;
        assert!(harness.state.session.profile().is_some());
        (harness, user_id)
    }
}
