//! Elicitation router: correlates "need user input" requests with the
//! answers that arrive later, on whatever task happens to deliver them.
//!
//! One table maps request id → single-use reply channel. The task that
//! raised the request parks on the receiving half with a timeout; the task
//! that receives the user's answer (a websocket handler, a test) calls
//! [`ElicitationRouter::resolve`]. All slot mutation is check-and-remove
//! under the table lock, so a response is delivered at most once and a
//! late or duplicate one is rejected instead of being misrouted.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use stepclaw_core::{
    AgentEvent, ElicitationAction, ElicitationError, ElicitationRequest, ElicitationResponse,
    EventSink, InputSchema,
};

use crate::server::ServerNotification;

/// How many settled ids are remembered to tell "settled" from "unknown".
const SETTLED_MEMORY: usize = 1024;

/// Routing namespace for one server connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouterHandle {
    server: String,
    namespace: String,
}

impl RouterHandle {
    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// How a wait ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Awaited {
    /// A response was delivered (possibly a `cancel` from `cancel_all`).
    Response(ElicitationResponse),
    /// Nobody answered in time; the slot was removed.
    TimedOut,
}

impl Awaited {
    /// Collapse into a response, synthesizing `cancel` for a timeout.
    pub fn into_response(self, request_id: &str) -> ElicitationResponse {
        match self {
            Self::Response(response) => response,
            Self::TimedOut => ElicitationResponse::cancel(request_id),
        }
    }
}

struct PendingSlot {
    request: ElicitationRequest,
    namespace: String,
    sender: oneshot::Sender<ElicitationResponse>,
}

#[derive(Default)]
struct RouterState {
    namespaces: HashSet<String>,
    pending: HashMap<String, PendingSlot>,
    /// Receiving halves not yet claimed by a waiter; `None` once claimed
    receivers: HashMap<String, Option<oneshot::Receiver<ElicitationResponse>>>,
    settled: VecDeque<String>,
}

impl RouterState {
    fn mark_settled(&mut self, id: String) {
        if self.settled.len() == SETTLED_MEMORY {
            self.settled.pop_front();
        }
        self.settled.push_back(id);
    }

    /// Forget a settled request's receiver once a waiter has claimed it.
    /// An unclaimed receiver stays so a late waiter still gets the answer.
    fn release_claimed(&mut self, id: &str) {
        if matches!(self.receivers.get(id), Some(None)) {
            self.receivers.remove(id);
        }
    }

    fn missing(&self, id: &str) -> ElicitationError {
        if self.settled.iter().any(|s| s == id) {
            ElicitationError::AlreadySettled(id.to_string())
        } else {
            ElicitationError::UnknownRequest(id.to_string())
        }
    }
}

/// Shared request/response correlation table.
pub struct ElicitationRouter {
    state: AsyncMutex<RouterState>,
    events: EventSink,
}

impl ElicitationRouter {
    pub fn new(events: EventSink) -> Self {
        Self {
            state: AsyncMutex::new(RouterState::default()),
            events,
        }
    }

    /// Open a routing namespace for a server connection.
    pub async fn register(&self, server: &str) -> RouterHandle {
        let namespace = format!("{server}-{}", &Uuid::new_v4().simple().to_string()[..8]);
        self.state.lock().await.namespaces.insert(namespace.clone());
        tracing::debug!(server, %namespace, "Registered elicitation namespace");
        RouterHandle {
            server: server.to_string(),
            namespace,
        }
    }

    /// Drop a namespace. Its outstanding requests are resolved with `cancel`.
    pub async fn unregister(&self, handle: &RouterHandle) -> usize {
        let drained = {
            let mut state = self.state.lock().await;
            state.namespaces.remove(&handle.namespace);
            let ids: Vec<String> = state
                .pending
                .iter()
                .filter(|(_, slot)| slot.namespace == handle.namespace)
                .map(|(id, _)| id.clone())
                .collect();
            settle_cancelled(&mut state, ids)
        };
        self.emit_resolved(&drained, ElicitationAction::Cancel);
        drained.len()
    }

    /// Store a pending request and announce it. The `elicitation_request`
    /// event is emitted before this returns.
    pub async fn request(
        &self,
        handle: &RouterHandle,
        prompt: impl Into<String>,
        schema: InputSchema,
    ) -> Result<String, ElicitationError> {
        let request_id = format!("{}-{}", handle.namespace, Uuid::new_v4());
        let request = ElicitationRequest {
            request_id: request_id.clone(),
            server: handle.server.clone(),
            prompt: prompt.into(),
            schema,
        };
        let (tx, rx) = oneshot::channel();

        {
            let mut state = self.state.lock().await;
            if !state.namespaces.contains(&handle.namespace) {
                return Err(ElicitationError::UnknownHandle(handle.server.clone()));
            }
            state.pending.insert(
                request_id.clone(),
                PendingSlot {
                    request: request.clone(),
                    namespace: handle.namespace.clone(),
                    sender: tx,
                },
            );
            state.receivers.insert(request_id.clone(), Some(rx));
        }

        tracing::info!(request_id = %request_id, server = %request.server, "Elicitation requested");
        self.events.emit(AgentEvent::ElicitationRequest {
            request_id: request.request_id,
            server: request.server,
            prompt: request.prompt,
            schema: request.schema,
        });
        Ok(request_id)
    }

    /// Wait for the answer to `request_id`, suspending only this task.
    ///
    /// On timeout the slot is removed and `cancel` is returned, unless the
    /// answer landed just before the timer fired, in which case it wins.
    pub async fn await_response(
        &self,
        request_id: &str,
        timeout: Duration,
    ) -> Result<ElicitationResponse, ElicitationError> {
        Ok(self.wait(request_id, timeout).await?.into_response(request_id))
    }

    /// Like [`await_response`](Self::await_response) but tells a timeout
    /// apart from an explicit cancel.
    pub async fn wait(&self, request_id: &str, timeout: Duration) -> Result<Awaited, ElicitationError> {
        let mut rx = {
            let mut state = self.state.lock().await;
            let claimed = state.receivers.get_mut(request_id).map(Option::take);
            match claimed {
                None => return Err(state.missing(request_id)),
                Some(None) => return Err(ElicitationError::AlreadyAwaited(request_id.to_string())),
                Some(Some(rx)) => rx,
            }
        };

        let outcome = match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(response)) => Awaited::Response(response),
            // Sender dropped without a value: the slot was discarded
            Ok(Err(_)) => Awaited::Response(ElicitationResponse::cancel(request_id)),
            Err(_elapsed) => {
                let expired = {
                    let mut state = self.state.lock().await;
                    match state.pending.remove(request_id) {
                        Some(_) => {
                            state.mark_settled(request_id.to_string());
                            state.release_claimed(request_id);
                            true
                        }
                        None => false,
                    }
                };
                if expired {
                    tracing::warn!(request_id, timeout_secs = timeout.as_secs(), "Elicitation timed out");
                    self.emit_resolved(&[request_id.to_string()], ElicitationAction::Cancel);
                    Awaited::TimedOut
                } else {
                    // Resolved between the timer firing and the lock
                    match rx.try_recv() {
                        Ok(response) => Awaited::Response(response),
                        Err(_) => Awaited::Response(ElicitationResponse::cancel(request_id)),
                    }
                }
            }
        };

        self.state.lock().await.receivers.remove(request_id);
        Ok(outcome)
    }

    /// Deliver the answer to a pending request, exactly once.
    ///
    /// Unknown and already-settled ids are rejected and logged; an accepted
    /// answer that does not fit the schema is rejected and the request stays
    /// pending.
    pub async fn resolve(
        &self,
        request_id: &str,
        mut response: ElicitationResponse,
    ) -> Result<(), ElicitationError> {
        response.request_id = request_id.to_string();
        let action = response.action;

        {
            let mut state = self.state.lock().await;
            let validation = state
                .pending
                .get(request_id)
                .map(|slot| response.validate(&slot.request.schema));
            match validation {
                None => {
                    let err = state.missing(request_id);
                    tracing::warn!(request_id, error = %err, "Ignoring elicitation response");
                    return Err(err);
                }
                Some(Err(field)) => {
                    tracing::warn!(request_id, field = %field, "Elicitation response does not match schema");
                    return Err(ElicitationError::InvalidResponse {
                        request_id: request_id.to_string(),
                        field,
                    });
                }
                Some(Ok(())) => {}
            }

            if let Some(slot) = state.pending.remove(request_id) {
                if slot.sender.send(response).is_err() {
                    tracing::debug!(request_id, "Elicitation waiter already gone");
                }
            }
            state.mark_settled(request_id.to_string());
            state.release_claimed(request_id);
        }

        tracing::info!(request_id, %action, "Elicitation resolved");
        self.emit_resolved(&[request_id.to_string()], action);
        Ok(())
    }

    /// Resolve every pending request with `cancel`. Used when a session is
    /// cancelled.
    pub async fn cancel_all(&self) -> usize {
        let drained = {
            let mut state = self.state.lock().await;
            let ids: Vec<String> = state.pending.keys().cloned().collect();
            settle_cancelled(&mut state, ids)
        };
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "Cancelled pending elicitations");
        }
        self.emit_resolved(&drained, ElicitationAction::Cancel);
        drained.len()
    }

    /// Snapshot of the requests still waiting for an answer.
    pub async fn pending(&self) -> Vec<ElicitationRequest> {
        let state = self.state.lock().await;
        let mut requests: Vec<ElicitationRequest> =
            state.pending.values().map(|slot| slot.request.clone()).collect();
        requests.sort_by(|a, b| a.request_id.cmp(&b.request_id));
        requests
    }

    pub async fn is_pending(&self, request_id: &str) -> bool {
        self.state.lock().await.pending.contains_key(request_id)
    }

    /// Serve a server's out-of-band elicitation notifications.
    ///
    /// Each notification is registered, awaited on its own task, and
    /// answered through its reply channel, independently of whichever task
    /// is running the tool call. The listener ends when the feed closes.
    pub fn spawn_listener(
        self: &Arc<Self>,
        handle: RouterHandle,
        mut notifications: mpsc::Receiver<ServerNotification>,
        timeout: Duration,
    ) -> JoinHandle<()> {
        let router = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                match notification {
                    ServerNotification::ElicitationRequested {
                        prompt,
                        schema,
                        respond_to,
                    } => {
                        let request_id = match router.request(&handle, prompt, schema).await {
                            Ok(id) => id,
                            Err(e) => {
                                tracing::warn!(server = %handle.server, error = %e, "Could not route elicitation");
                                let _ = respond_to.send(ElicitationResponse::cancel(String::new()));
                                continue;
                            }
                        };
                        let router = Arc::clone(&router);
                        tokio::spawn(async move {
                            let response = match router.await_response(&request_id, timeout).await {
                                Ok(response) => response,
                                Err(e) => {
                                    tracing::warn!(request_id = %request_id, error = %e, "Elicitation wait failed");
                                    ElicitationResponse::cancel(&request_id)
                                }
                            };
                            if respond_to.send(response).is_err() {
                                tracing::debug!(request_id = %request_id, "Server stopped waiting for elicitation");
                            }
                        });
                    }
                }
            }
            tracing::debug!(server = %handle.server, "Notification feed closed");
        })
    }

    fn emit_resolved(&self, ids: &[String], action: ElicitationAction) {
        for id in ids {
            self.events.emit(AgentEvent::ElicitationResolved {
                request_id: id.clone(),
                action,
            });
        }
    }
}

/// Remove `ids` from the table, sending `cancel` to each waiter.
fn settle_cancelled(state: &mut RouterState, ids: Vec<String>) -> Vec<String> {
    let mut settled = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(slot) = state.pending.remove(&id) {
            let _ = slot.sender.send(ElicitationResponse::cancel(&id));
            state.mark_settled(id.clone());
            state.release_claimed(&id);
            settled.push(id);
        }
    }
    settled
}
