// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: a mock API server behind `kube::Client` and in-memory
//! stand-ins for the cluster and state store seams.

use crate::error::{ReconcilerError, Result as ReconcileResult};
use crate::kubernetes::{ClusterClient, StateStore};
use crate::sync::CancelFlag;
use crate::types::manifest::{Controller, ManifestDocument, ObjectRef, ResourceKind};
use crate::types::state::AppliedState;
use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::BodyExt;
use kube::client::Body;
use kube::Client;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

/// Method, URI (path and query) and body of a request seen by [`MockService`]
pub type RecordedRequest = (String, String, Bytes);

/// A mock HTTP service that returns predefined responses based on request paths.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    /// Routes that accept a request and never answer
    hanging: Arc<Mutex<HashSet<(String, String)>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            hanging: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()), (status, body.to_string()));
        self
    }

    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    pub fn on_patch(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PATCH", path, status, body)
    }

    pub fn on_delete(self, path: &str, status: u16, body: &str) -> Self {
        self.on("DELETE", path, status, body)
    }

    /// Never respond to `method` requests under `path`
    pub fn hang(self, method: &str, path: &str) -> Self {
        self.hanging
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()));
        self
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        let responses = self.responses.lock().unwrap();

        if let Some(resp) = responses.get(&(method.to_string(), path.to_string())) {
            return Some(resp.clone());
        }

        for ((m, p), resp) in responses.iter() {
            if m == method && path.starts_with(p) {
                return Some(resp.clone());
            }
        }

        None
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let uri = req.uri().to_string();
        let response = self.find_response(&method, req.uri().path());
        let hangs = self
            .hanging
            .lock()
            .unwrap()
            .iter()
            .any(|(m, p)| *m == method && req.uri().path().starts_with(p.as_str()));
        let requests = self.requests.clone();

        Box::pin(async move {
            let body = req.into_body().collect().await?.to_bytes();
            requests.lock().unwrap().push((method, uri, body));
            if hangs {
                std::future::pending::<()>().await;
            }

            let (status, body) = response.unwrap_or_else(|| (404, not_found_json("object", "unknown")));
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// A Kubernetes `Status` failure body
pub fn status_json(code: u16, reason: &str, message: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    })
    .to_string()
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    status_json(404, "NotFound", &format!("{} \"{}\" not found", resource, name))
}

/// A call received by [`FakeCluster`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Get(ObjectRef),
    Create(ObjectRef),
    Patch(ObjectRef),
    Delete(ObjectRef),
}

impl Call {
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Call::Get(_))
    }
}

#[derive(Default)]
struct FakeState {
    objects: BTreeMap<ObjectRef, Value>,
    calls: Vec<Call>,
    namespaces: BTreeSet<String>,
    /// Object names whose writes are forbidden
    denied: HashSet<String>,
    /// Object names whose next N writes fail transiently
    flaky: HashMap<String, u32>,
    /// Object names whose next N writes hit a resource version conflict
    conflicting: HashMap<String, u32>,
    /// Flag raised once this many more writes have succeeded
    cancel_after: Option<(usize, CancelFlag)>,
    next_uid: u64,
}

/// In-memory cluster with server-side-apply-like merge semantics
pub struct FakeCluster {
    state: Mutex<FakeState>,
}

impl FakeCluster {
    pub fn new() -> Self {
        let state = FakeState {
            namespaces: BTreeSet::from(["default".to_string(), "kube-system".to_string()]),
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Seed a live object that was not created through the client
    pub fn insert(&self, content: Value) -> ObjectRef {
        let target = ManifestDocument::from_value(Controller::Cilium, content.clone())
            .unwrap()
            .object_ref();
        self.state.lock().unwrap().objects.insert(target.clone(), content);
        target
    }

    pub fn object(&self, target: &ObjectRef) -> Option<Value> {
        self.state.lock().unwrap().objects.get(target).cloned()
    }

    pub fn identities(&self) -> BTreeSet<ObjectRef> {
        self.state.lock().unwrap().objects.keys().cloned().collect()
    }

    pub fn deny(&self, name: &str) {
        self.state.lock().unwrap().denied.insert(name.to_string());
    }

    pub fn allow(&self, name: &str) {
        self.state.lock().unwrap().denied.remove(name);
    }

    pub fn fail_transiently(&self, name: &str, times: u32) {
        self.state.lock().unwrap().flaky.insert(name.to_string(), times);
    }

    pub fn fail_conflict(&self, name: &str, times: u32) {
        self.state.lock().unwrap().conflicting.insert(name.to_string(), times);
    }

    /// Cancel `cancel` right after the `writes`-th successful write
    pub fn cancel_after(&self, writes: usize, cancel: CancelFlag) {
        self.state.lock().unwrap().cancel_after = Some((writes, cancel));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn mutating_calls(&self) -> usize {
        self.calls().iter().filter(|c| c.is_mutating()).count()
    }

    fn check_write(state: &mut FakeState, target: &ObjectRef) -> ReconcileResult<()> {
        if state.denied.contains(&target.name) {
            return Err(ReconcilerError::Permission(format!("{} is forbidden", target)));
        }
        if let Some(remaining) = state.flaky.get_mut(&target.name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ReconcilerError::TransientCluster(format!("{} timed out", target)));
            }
        }
        if let Some(remaining) = state.conflicting.get_mut(&target.name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ReconcilerError::Conflict(format!("{} was modified", target)));
            }
        }
        if let Some(ns) = &target.namespace {
            if !state.namespaces.contains(ns) {
                return Err(ReconcilerError::TransientCluster(format!("namespace {} not found", ns)));
            }
        }
        Ok(())
    }

    fn written(state: &mut FakeState) {
        if let Some((remaining, cancel)) = &mut state.cancel_after {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                cancel.cancel();
            }
        }
    }

    fn stamp(state: &mut FakeState, content: &mut Value) {
        state.next_uid += 1;
        content["metadata"]["uid"] = Value::from(format!("uid-{}", state.next_uid));
        content["metadata"]["resourceVersion"] = Value::from("1");
    }
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get(&self, target: &ObjectRef) -> ReconcileResult<Option<Value>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Get(target.clone()));
        Ok(state.objects.get(target).cloned())
    }

    async fn create(&self, doc: &ManifestDocument) -> ReconcileResult<()> {
        let target = doc.object_ref();
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Create(target.clone()));
        Self::check_write(&mut state, &target)?;

        if state.objects.contains_key(&target) {
            return Err(ReconcilerError::Conflict(format!("{} already exists", target)));
        }
        let mut content = doc.content.clone();
        Self::stamp(&mut state, &mut content);
        if doc.kind == ResourceKind::Namespace {
            state.namespaces.insert(doc.name.clone());
        }
        state.objects.insert(target, content);
        Self::written(&mut state);
        Ok(())
    }

    async fn patch(&self, doc: &ManifestDocument) -> ReconcileResult<()> {
        let target = doc.object_ref();
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Patch(target.clone()));
        Self::check_write(&mut state, &target)?;

        match state.objects.get_mut(&target) {
            Some(live) => {
                merge(live, &doc.content);
                let version = live["metadata"]["resourceVersion"]
                    .as_str()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(0);
                live["metadata"]["resourceVersion"] = Value::from((version + 1).to_string());
            }
            None => {
                let mut content = doc.content.clone();
                Self::stamp(&mut state, &mut content);
                state.objects.insert(target, content);
            }
        }
        Self::written(&mut state);
        Ok(())
    }

    async fn delete(&self, target: &ObjectRef) -> ReconcileResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Delete(target.clone()));
        Self::check_write(&mut state, target)?;

        state.objects.remove(target);
        if target.kind == ResourceKind::Namespace {
            state.namespaces.remove(&target.name);
        }
        Self::written(&mut state);
        Ok(())
    }
}

/// Maps merge key by key; anything else is replaced
fn merge(live: &mut Value, desired: &Value) {
    match (live, desired) {
        (Value::Object(have), Value::Object(want)) => {
            for (key, value) in want {
                match have.get_mut(key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        have.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}

/// State store kept in memory
#[derive(Default)]
pub struct MemoryStateStore {
    states: Mutex<HashMap<String, AppliedState>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryStateStore {
    pub fn stored(&self, scope: &str) -> Option<AppliedState> {
        self.states.lock().unwrap().get(scope).cloned()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, scope: &str) -> ReconcileResult<AppliedState> {
        Ok(self.stored(scope).unwrap_or_else(|| AppliedState::empty(scope)))
    }

    async fn save(&self, state: &AppliedState) -> ReconcileResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(ReconcilerError::StateStore("store unavailable".to_string()));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.states
            .lock()
            .unwrap()
            .insert(state.scope.clone(), state.clone());
        Ok(())
    }
}
