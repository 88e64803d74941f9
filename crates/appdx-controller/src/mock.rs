//! Scripted in-memory transport for tests.

use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
};

use appdx_common::error::{AppdError, Result};
use async_trait::async_trait;

use crate::{
    session::{CSRF_TOKEN, LOGIN_PATH, SESSION_COOKIE},
    transport::{ControllerRequest, ControllerResponse, ControllerTransport},
};

#[derive(Debug, Clone)]
enum Reply {
    Response(ControllerResponse),
    Fault(String),
}

/// Answers requests by path; unknown paths get a 404.
#[derive(Debug)]
pub struct MockTransport {
    host: String,
    replies: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<ControllerRequest>>,
    close_calls: AtomicUsize,
}

impl MockTransport {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            replies: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
        }
    }

    pub fn respond(&self, path: &str, response: ControllerResponse) {
        lock(&self.replies).insert(path.to_string(), Reply::Response(response));
    }

    pub fn respond_json(&self, path: &str, status: u16, body: serde_json::Value) {
        self.respond(path, ControllerResponse::new(status, body.to_string()));
    }

    pub fn fail(&self, path: &str, reason: &str) {
        lock(&self.replies).insert(path.to_string(), Reply::Fault(reason.to_string()));
    }

    pub fn accept_login(&self, session_id: &str, csrf_token: &str) {
        self.respond(
            LOGIN_PATH,
            ControllerResponse::new(200, "")
                .with_header("set-cookie", &format!("{SESSION_COOKIE}={session_id}; Path=/"))
                .with_header("set-cookie", &format!("{CSRF_TOKEN}={csrf_token}; Path=/")),
        );
    }

    pub fn requests(&self) -> Vec<ControllerRequest> {
        lock(&self.requests).clone()
    }

    pub fn requests_to(&self, path: &str) -> usize {
        lock(&self.requests)
            .iter()
            .filter(|request| request.path == path)
            .count()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControllerTransport for MockTransport {
    async fn send(&self, request: ControllerRequest) -> Result<ControllerResponse> {
        let reply = lock(&self.replies).get(&request.path).cloned();
        lock(&self.requests).push(request);
        yield_once().await;

        match reply {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::Fault(reason)) => Err(AppdError::Transport {
                host: self.host.clone(),
                reason,
            }),
            None => Ok(ControllerResponse::new(404, "not found")),
        }
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Gives other in-flight calls a chance to run, like a real network wait would.
async fn yield_once() {
    let mut yielded = false;
    std::future::poll_fn(|cx| {
        if yielded {
            std::task::Poll::Ready(())
        } else {
            yielded = true;
            cx.waker().wake_by_ref();
            std::task::Poll::Pending
        }
    })
    .await;
}
