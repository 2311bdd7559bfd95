//! Serialized request queue
//!
//! Requests are dispatched strictly in the order they were enqueued and at most
//! one of them is handed to the transport at any time. The next request is only
//! dispatched after the previous one's completion hook has run. An empty queue
//! polls itself again after a fixed interval, so once started the loop keeps
//! picking up new work without any further trigger.
//!
//! `stop()` and `clear()` only drop requests that were not dispatched yet. A
//! request already handed to the transport cannot be aborted; its hooks still
//! fire when the transport returns.

use crate::transport::{Request, Transport};
use log::{debug, error, warn};
use serde_json::Value;
use std::{
    any::Any,
    collections::VecDeque,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{task::AbortHandle, time::sleep};

pub type SuccessHook = Box<dyn FnOnce(Value) + Send + 'static>;
pub type CompleteHook = Box<dyn FnOnce() + Send + 'static>;

/// One pending outbound call
pub struct RequestDescriptor {
    pub request: Request,
    on_success: Option<SuccessHook>,
    on_complete: Option<CompleteHook>,
}

impl RequestDescriptor {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            on_success: None,
            on_complete: None,
        }
    }

    /// Called with the parsed response body if the transport call succeeded
    pub fn on_success(mut self, hook: impl FnOnce(Value) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(hook));
        self
    }

    /// Called after the transport call returned, whether it succeeded or not
    pub fn on_complete(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(hook));
        self
    }
}

impl std::fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("request", &self.request)
            .field("on_success", &self.on_success.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

struct Entry {
    id: u64,
    descriptor: RequestDescriptor,
}

#[derive(Default)]
struct State {
    requests: VecDeque<Entry>,
    next_id: u64,
    running: bool,
    in_flight: Option<u64>,
    idle_timer: Option<(u64, AbortHandle)>,
    next_timer: u64,
}

struct Shared<T> {
    transport: T,
    poll_interval: Duration,
    state: Mutex<State>,
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, timer)) = state.idle_timer.take() {
            timer.abort();
        }
    }
}

/// FIFO queue with a single request in flight
///
/// Cloning is cheap; all clones operate on the same queue.
pub struct RequestQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for RequestQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> RequestQueue<T>
where
    T: Transport + Send + Sync + 'static,
{
    pub fn new(transport: T, poll_interval: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                poll_interval,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Append a descriptor to the tail of the queue
    ///
    /// Does not send anything by itself; a running queue picks the request up
    /// on its next step.
    pub fn enqueue(&self, descriptor: RequestDescriptor) {
        let mut state = self.state();
        let id = state.next_id;
        state.next_id += 1;
        debug!(
            "enqueue #{id} {} ({} pending)",
            descriptor.request.payload,
            state.requests.len()
        );
        state.requests.push_back(Entry { id, descriptor });
    }

    /// Start the dispatch loop
    ///
    /// Must be called from within a tokio runtime. Calling it on a queue that
    /// is already running has no effect.
    pub fn run(&self) {
        {
            let mut state = self.state();
            if state.running {
                debug!("request queue already running");
                return;
            }
            state.running = true;
        }

        self.step();
    }

    /// Drop all pending requests, cancel the idle poll and halt the loop
    ///
    /// A request that is in flight is not aborted. Its hooks still run when the
    /// transport returns, but nothing else is dispatched until `run()` is
    /// called again.
    pub fn stop(&self) {
        let dropped = {
            let mut state = self.state();
            state.running = false;
            if let Some((_, timer)) = state.idle_timer.take() {
                timer.abort();
            }
            std::mem::take(&mut state.requests)
        };

        debug!("request queue stopped, dropped {} requests", dropped.len());
    }

    /// Drop all pending requests, leaving the loop and its idle poll alone
    pub fn clear(&self) {
        let dropped = std::mem::take(&mut self.state().requests);

        debug!("request queue cleared, dropped {} requests", dropped.len());
    }

    /// Number of queued requests, including the one in flight
    pub fn len(&self) -> usize {
        self.state().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().requests.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.state().running
    }

    pub fn is_in_flight(&self) -> bool {
        self.state().in_flight.is_some()
    }

    pub fn has_idle_timer(&self) -> bool {
        self.state().idle_timer.is_some()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // hooks never run under the lock, a poisoned state is still consistent
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Dispatch the head of the queue or schedule the next poll
    fn step(&self) {
        let mut state = self.state();

        if !state.running || state.in_flight.is_some() {
            return;
        }

        if state.requests.is_empty() {
            let timer_id = state.next_timer;
            state.next_timer += 1;

            // a pending poll must not keep a dropped queue alive
            let shared = Arc::downgrade(&self.shared);
            let poll_interval = self.shared.poll_interval;
            let timer = tokio::spawn(async move {
                sleep(poll_interval).await;
                if let Some(shared) = shared.upgrade() {
                    RequestQueue { shared }.poll(timer_id);
                }
            });
            state.idle_timer = Some((timer_id, timer.abort_handle()));
            return;
        }

        let Some(head) = state.requests.front_mut() else {
            return;
        };

        let id = head.id;
        let request = head.descriptor.request.clone();
        let on_success = head.descriptor.on_success.take();
        let on_complete = self.wrap_on_complete(id, head.descriptor.on_complete.take());
        state.in_flight = Some(id);
        drop(state);

        debug!("dispatch #{id} {}", request.payload);

        let shared = self.shared.clone();
        tokio::spawn(async move {
            let action = request.payload.action().to_string();

            // a panicking transport surfaces as a JoinError, the queue still advances
            let send = tokio::spawn(async move { shared.transport.send(request).await });

            match send.await {
                Ok(Ok(body)) => {
                    if let Some(hook) = on_success {
                        run_hook(&action, "success", move || hook(body));
                    }
                }
                Ok(Err(e)) => error!("request #{id} {action} failed: {e:#}"),
                Err(e) => error!("request #{id} {action} aborted: {e}"),
            }

            on_complete();
        });
    }

    /// Chain queue advancement behind the caller's completion hook
    fn wrap_on_complete(&self, id: u64, original: Option<CompleteHook>) -> CompleteHook {
        let queue = self.clone();

        Box::new(move || {
            if let Some(hook) = original {
                run_hook(&format!("#{id}"), "completion", hook);
            }
            queue.advance(id);
        })
    }

    fn advance(&self, id: u64) {
        {
            let mut state = self.state();

            // the entry is gone if the queue was cleared while it was in flight
            if let Some(position) = state.requests.iter().position(|entry| entry.id == id) {
                state.requests.remove(position);
            }
            state.in_flight = None;

            debug!("completed #{id} ({} pending)", state.requests.len());
        }

        self.step();
    }

    fn poll(&self, timer_id: u64) {
        {
            let mut state = self.state();

            match state.idle_timer {
                Some((current, _)) if current == timer_id => state.idle_timer = None,
                _ => return,
            }
        }

        self.step();
    }
}

fn run_hook(request: &str, kind: &str, hook: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(hook)) {
        warn!(
            "{kind} hook of {request} panicked: {}",
            panic_message(panic.as_ref())
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
