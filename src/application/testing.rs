//! Scripted transport for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::application::error::FetchError;
use crate::application::ports::HttpTransport;

#[derive(Clone)]
struct Scripted {
    result: Result<Value, FetchError>,
    delay: Duration,
}

#[derive(Default)]
struct State {
    queued: HashMap<String, VecDeque<Scripted>>,
    sticky: HashMap<String, Scripted>,
    calls: Vec<(String, Option<Value>)>,
}

/// Answers requests keyed as `"GET /api/designs"`. Queued answers are used
/// first, then the sticky one; unknown routes answer 404.
#[derive(Default)]
pub(crate) struct FakeTransport {
    state: Mutex<State>,
}

impl FakeTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn respond(&self, route: &str, result: Result<Value, FetchError>) {
        self.state.lock().unwrap().sticky.insert(
            route.to_string(),
            Scripted {
                result,
                delay: Duration::ZERO,
            },
        );
    }

    pub(crate) fn respond_once(
        &self,
        route: &str,
        result: Result<Value, FetchError>,
        delay: Duration,
    ) {
        self.state
            .lock()
            .unwrap()
            .queued
            .entry(route.to_string())
            .or_default()
            .push_back(Scripted { result, delay });
    }

    pub(crate) fn calls(&self, route: &str) -> usize {
        self.bodies(route).len()
    }

    pub(crate) fn bodies(&self, route: &str) -> Vec<Option<Value>> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(key, _)| key == route)
            .map(|(_, body)| body.clone())
            .collect()
    }

    async fn answer(&self, route: String, body: Option<Value>) -> Result<Value, FetchError> {
        let scripted = {
            let mut state = self.state.lock().unwrap();
            state.calls.push((route.clone(), body));
            let queued = state.queued.get_mut(&route).and_then(VecDeque::pop_front);
            queued.or_else(|| state.sticky.get(&route).cloned())
        };

        let Some(scripted) = scripted else {
            return Err(FetchError::Status {
                status: 404,
                body: format!("no route for {route}"),
            });
        };
        if !scripted.delay.is_zero() {
            tokio::time::sleep(scripted.delay).await;
        }
        scripted.result
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get_json(&self, path: &str) -> Result<Value, FetchError> {
        self.answer(format!("GET {path}"), None).await
    }

    async fn post_json(&self, path: &str, body: Option<Value>) -> Result<Value, FetchError> {
        self.answer(format!("POST {path}"), body).await
    }
}
