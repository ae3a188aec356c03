#![allow(dead_code)]
use futures::FutureExt;
use futures::future::BoxFuture;
use ledger_client::transport::{HttpRequest, HttpResponse};
use ledger_client::{
    Client, ClientConfig, MemoryTokenStore, StorageError, TokenStore, Transport, TransportError,
};
use reqwest::Method;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

pub const ORIGIN: &str = "http://ledger.test";
pub const BASE: &str = "http://ledger.test/api/v1/";

enum Reply {
    Response(HttpResponse),
    Fail(TransportError),
}

/// Answers requests from a script keyed by method and path (relative to the
/// API base). The last reply for a route repeats forever.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Arc<Reply>>>>,
    requests: Mutex<Vec<HttpRequest>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, method: Method, path: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Arc::new(reply));
    }

    pub fn respond(&self, method: Method, path: &str, status: u16, body: serde_json::Value) {
        self.push(
            method,
            path,
            Reply::Response(HttpResponse::new(status, body.to_string())),
        );
    }

    /// Replies `200 { status: "success", data }`.
    pub fn data(&self, method: Method, path: &str, data: serde_json::Value) {
        self.respond(
            method,
            path,
            200,
            serde_json::json!({ "status": "success", "data": data }),
        );
    }

    pub fn fail(&self, method: Method, path: &str, error: TransportError) {
        self.push(method, path, Reply::Fail(error));
    }

    /// Requests are recorded but not answered until [`ScriptedTransport::release`].
    pub fn hold(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, count: usize) {
        if let Some(gate) = self.gate.lock().unwrap().as_ref() {
            gate.add_permits(count);
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        let url = format!("{BASE}{path}");
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.method == method && request.url == url)
            .count()
    }

    /// Waits until at least `count` requests have been sent.
    pub async fn wait_for_requests(&self, count: usize) {
        while self.requests.lock().unwrap().len() < count {
            tokio::task::yield_now().await;
        }
    }

    fn next_reply(&self, method: &Method, path: &str) -> Option<Arc<Reply>> {
        let mut routes = self.routes.lock().unwrap();
        let queue = routes.get_mut(&(method.clone(), path.to_string()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        async move {
            let path = request
                .url
                .strip_prefix(BASE)
                .unwrap_or(&request.url)
                .to_string();
            let method = request.method.clone();
            self.requests.lock().unwrap().push(request);

            let gate = self.gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.acquire().await.unwrap().forget();
            }

            match self.next_reply(&method, &path).as_deref() {
                Some(Reply::Response(response)) => Ok(response.clone()),
                Some(Reply::Fail(error)) => Err(error.clone()),
                None => Ok(HttpResponse::new(
                    404,
                    format!(r#"{{"message":"no route for {method} {path}"}}"#),
                )),
            }
        }
        .boxed()
    }
}

/// Memory store that counts writes and removals.
#[derive(Default)]
pub struct CountingTokenStore {
    inner: MemoryTokenStore,
    pub sets: AtomicUsize,
    pub removes: AtomicUsize,
}

impl CountingTokenStore {
    pub fn with_token(token: &str) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryTokenStore::with_token(token),
            ..Default::default()
        })
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

impl TokenStore for CountingTokenStore {
    fn get(&self) -> BoxFuture<'_, Result<Option<String>, StorageError>> {
        self.inner.get()
    }

    fn set<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(token)
    }

    fn remove(&self) -> BoxFuture<'_, Result<(), StorageError>> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove()
    }
}

pub fn client(transport: &Arc<ScriptedTransport>, store: Arc<dyn TokenStore>) -> Client {
    ledger_client::init_logging();
    Client::new(&ClientConfig::new(ORIGIN), transport.clone(), store)
}

pub fn user(id: &str, name: &str) -> serde_json::Value {
    serde_json::json!({ "_id": id, "name": name, "email": format!("{id}@example.com") })
}

pub fn profile(balance: f64) -> serde_json::Value {
    serde_json::json!({
        "_id": "u1",
        "name": "Ana",
        "email": "u1@example.com",
        "createdAt": "2024-05-01T10:00:00.000Z",
        "balance": balance,
        "users": []
    })
}

pub fn group(id: &str, members: &[serde_json::Value]) -> serde_json::Value {
    serde_json::json!({
        "_id": id,
        "name": "Flat",
        "members": members,
        "expenses": [],
        "createdAt": "2024-05-01T10:00:00.000Z"
    })
}

/// An entry of `GET /groups`, which adds the current user's totals.
pub fn group_entry(id: &str, total_owed: f64, total_returned: f64) -> serde_json::Value {
    let mut entry = group(
        id,
        &[serde_json::json!({
            "_id": "u1",
            "name": "Ana",
            "email": "u1@example.com",
            "expensesPaid": [],
            "expensesOwed": ["e1"],
            "createdAt": "2024-05-01T10:00:00.000Z",
            "balance": total_returned - total_owed
        })],
    );
    entry["totalOwed"] = total_owed.into();
    entry["totalReturned"] = total_returned.into();
    entry
}
