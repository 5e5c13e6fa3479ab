//! Mock transport for testing.
//!
//! Responses are scripted per `(method, path)`. Queued responses are consumed
//! in order; once a route's queue is empty its handler (if any) answers, and
//! unknown routes get a 404 envelope. Every call is recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::envelope::HttpResponse;
use super::error::ApiError;
use super::request::{ApiRequest, Method};
use super::transport::HttpTransport;

type Handler = Arc<dyn Fn(&ApiRequest, Option<&str>) -> HttpResponse + Send + Sync>;

/// A call observed by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub bearer: Option<String>,
}

struct Scripted {
    delay: Option<Duration>,
    response: Result<HttpResponse, ApiError>,
}

#[derive(Default)]
struct Route {
    queue: VecDeque<Scripted>,
    handler: Option<Handler>,
    delay: Option<Duration>,
}

/// Scripted [`HttpTransport`]
#[derive(Clone, Default)]
pub struct MockTransport {
    routes: Arc<Mutex<HashMap<(Method, String), Route>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

fn key(method: Method, path: &str) -> (Method, String) {
    (method, path.trim_start_matches('/').to_string())
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next call to `method path`
    pub fn enqueue(&self, method: Method, path: &str, response: HttpResponse) -> &Self {
        self.push(method, path, None, Ok(response));
        self
    }

    /// Queue a JSON response
    pub fn enqueue_json(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
        self.enqueue(method, path, HttpResponse::new(status, body.to_string()))
    }

    /// Queue a JSON response that arrives after `delay`
    pub fn enqueue_json_delayed(
        &self,
        method: Method,
        path: &str,
        delay: Duration,
        status: u16,
        body: Value,
    ) -> &Self {
        let response = HttpResponse::new(status, body.to_string());
        self.push(method, path, Some(delay), Ok(response));
        self
    }

    /// Queue a transport failure (connection refused, timeout)
    pub fn enqueue_transport_error(&self, method: Method, path: &str, message: &str) -> &Self {
        self.push(method, path, None, Err(ApiError::transport(message)));
        self
    }

    /// Answer every call to `method path` not covered by the queue
    pub fn respond_with<F>(&self, method: Method, path: &str, handler: F) -> &Self
    where
        F: Fn(&ApiRequest, Option<&str>) -> HttpResponse + Send + Sync + 'static,
    {
        self.with_route(method, path, |route| route.handler = Some(Arc::new(handler)));
        self
    }

    /// Delay every response on `method path`
    pub fn delay(&self, method: Method, path: &str, delay: Duration) -> &Self {
        self.with_route(method, path, |route| route.delay = Some(delay));
        self
    }

    /// All calls observed so far
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls made to a path, any method
    pub fn calls_to(&self, path: &str) -> Vec<MockCall> {
        let path = path.trim_start_matches('/');
        self.calls()
            .into_iter()
            .filter(|c| c.path == path)
            .collect()
    }

    pub fn call_count(&self, path: &str) -> usize {
        self.calls_to(path).len()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn push(
        &self,
        method: Method,
        path: &str,
        delay: Option<Duration>,
        response: Result<HttpResponse, ApiError>,
    ) {
        self.with_route(method, path, |route| {
            route.queue.push_back(Scripted { delay, response })
        });
    }

    fn with_route(&self, method: Method, path: &str, f: impl FnOnce(&mut Route)) {
        let mut routes = self.routes.lock().unwrap();
        f(routes.entry(key(method, path)).or_default());
    }

    fn next_response(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> (Option<Duration>, Result<HttpResponse, ApiError>) {
        let mut routes = self.routes.lock().unwrap();
        let Some(route) = routes.get_mut(&key(request.method, &request.path)) else {
            return (None, Ok(not_found()));
        };
        match route.queue.pop_front() {
            Some(queued) => (queued.delay.or(route.delay), queued.response),
            None => match &route.handler {
                Some(handler) => (route.delay, Ok(handler(request, bearer))),
                None => (route.delay, Ok(not_found())),
            },
        }
    }
}

fn not_found() -> HttpResponse {
    HttpResponse::new(404, r#"{"status":"fail","message":"Not found"}"#)
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<HttpResponse, ApiError> {
        self.calls.lock().unwrap().push(MockCall {
            method: request.method,
            path: request.path.trim_start_matches('/').to_string(),
            query: request.query.clone(),
            body: request.body.clone(),
            bearer: bearer.map(str::to_string),
        });

        let (delay, response) = self.next_response(request, bearer);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        response
    }
}
