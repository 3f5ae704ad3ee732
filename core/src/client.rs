//! Single-shot request execution.
//!
//! # Design
//! `ApiClient` holds only injected collaborators (transport, indicator,
//! unauthorized hook), never per-request state. Each
//! `RequestSpec` is consumed by exactly one `send` or `subscribe`, which
//! performs one transport call and yields one outcome.
//!
//! `subscribe` stores the listener in a slot shared between the request task
//! and the returned `Subscription`. Whoever takes the listener out of the slot
//! first wins: the task delivers the outcome, or `cancel` discards it. The
//! listener is an `FnOnce`, so it can run at most once. The unauthorized hook
//! runs on the delivering side, so a cancelled request never triggers it.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{ApiError, TransportError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::indicator::{IndicatorGuard, LoadingIndicator, NoopIndicator};
use crate::request::RequestSpec;
use crate::transport::{Transport, UreqTransport};

/// Status code that short-circuits a response into `ApiError::Unauthorized`.
pub const UNAUTHORIZED_STATUS: u16 = 401;

/// Result delivered once per request.
pub type Outcome = Result<Value, ApiError>;

/// Called once for every unauthorized response, before the failure is
/// delivered. Typically starts a logout flow.
pub type UnauthorizedHook = Arc<dyn Fn() + Send + Sync>;

type Listener = Box<dyn FnOnce(Outcome) + Send>;
type ListenerSlot = Arc<Mutex<Option<Listener>>>;

/// Executes `RequestSpec`s against an injected `Transport`.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    indicator: Arc<dyn LoadingIndicator>,
    on_unauthorized: Option<UnauthorizedHook>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("on_unauthorized", &self.on_unauthorized.is_some())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Client over `transport` with no indicator and no unauthorized hook.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::builder().transport(transport).build()
    }

    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Execute `spec` and resolve to its single outcome.
    pub async fn send(&self, spec: RequestSpec) -> Outcome {
        let guard = self.start_indicator(&spec);
        let request = spec.prepare()?;
        let outcome = self.dispatch(request, guard).await;
        self.notify_unauthorized(&outcome);
        outcome
    }

    /// Start executing `spec` and deliver its outcome to `listener`.
    ///
    /// The indicator is started and the request prepared on the calling
    /// thread; an `EncodingFailure` reaches the listener before this returns
    /// and no network call is made. Otherwise the call runs on a task spawned
    /// onto the current Tokio runtime; outside a runtime the listener receives
    /// `ApiError::Other(TransportError::Request)` instead.
    pub fn subscribe<F>(&self, spec: RequestSpec, listener: F) -> Subscription
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        let guard = self.start_indicator(&spec);
        let request = match spec.prepare() {
            Ok(request) => request,
            Err(err) => {
                drop(guard);
                listener(Err(err));
                return Subscription::finished();
            }
        };

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                drop(guard);
                warn!(error = %err, "subscribe called outside a Tokio runtime");
                listener(Err(ApiError::Other(TransportError::Request(err.to_string()))));
                return Subscription::finished();
            }
        };

        let listener: Listener = Box::new(listener);
        let slot: ListenerSlot = Arc::new(Mutex::new(Some(listener)));
        let task_slot = Arc::clone(&slot);
        let client = self.clone();
        let handle = runtime.spawn(async move {
            let outcome = client.dispatch(request, guard).await;
            let listener = task_slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            match listener {
                Some(listener) => {
                    client.notify_unauthorized(&outcome);
                    listener(outcome);
                }
                None => debug!("outcome dropped, subscription was cancelled"),
            }
        });

        Subscription {
            slot,
            handle: Some(handle),
        }
    }

    fn start_indicator(&self, spec: &RequestSpec) -> Option<IndicatorGuard> {
        spec.show_indicator()
            .then(|| IndicatorGuard::start(&self.indicator))
    }

    async fn dispatch(&self, request: HttpRequest, guard: Option<IndicatorGuard>) -> Outcome {
        let method = request.method;
        debug!(%method, url = %request.url, "dispatching request");
        debug!("{}", request.to_curl());

        let result = self.transport.execute(request).await;
        drop(guard);

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                let err = ApiError::from_transport(err);
                warn!(error = %err, "request failed");
                return Err(err);
            }
        };

        if response.status == UNAUTHORIZED_STATUS {
            warn!("request unauthorized");
            return Err(ApiError::Unauthorized);
        }

        let value = decode_body(method, &response)?;
        debug!(status = response.status, "request succeeded");
        Ok(value)
    }

    /// Run the unauthorized hook, if any, for an outcome about to be delivered.
    fn notify_unauthorized(&self, outcome: &Outcome) {
        if let (Err(ApiError::Unauthorized), Some(hook)) = (outcome, &self.on_unauthorized) {
            hook();
        }
    }
}

/// Decode a response body as JSON. Empty bodies are expected on HEAD and on
/// 204/205 and decode to `null`.
fn decode_body(method: HttpMethod, response: &HttpResponse) -> Result<Value, TransportError> {
    let empty_allowed = method == HttpMethod::Head || matches!(response.status, 204 | 205);
    if empty_allowed && response.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&response.body).map_err(|e| TransportError::Decode(e.to_string()))
}

/// Builder for `ApiClient`.
#[derive(Default)]
pub struct ApiClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    indicator: Option<Arc<dyn LoadingIndicator>>,
    on_unauthorized: Option<UnauthorizedHook>,
    config: ClientConfig,
}

impl ApiClientBuilder {
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn indicator(mut self, indicator: Arc<dyn LoadingIndicator>) -> Self {
        self.indicator = Some(indicator);
        self
    }

    pub fn on_unauthorized<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_unauthorized = Some(Arc::new(hook));
        self
    }

    /// Configure the default `UreqTransport`. Ignored when a transport is
    /// supplied with `transport`, which carries its own settings.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the client. Without an explicit transport, a `UreqTransport`
    /// configured from `config` is used.
    pub fn build(self) -> ApiClient {
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(UreqTransport::new(&self.config)));
        ApiClient {
            transport,
            indicator: self.indicator.unwrap_or_else(|| Arc::new(NoopIndicator)),
            on_unauthorized: self.on_unauthorized,
        }
    }
}

/// Handle to a subscribed request.
///
/// Dropping the handle detaches from the request without cancelling it.
pub struct Subscription {
    slot: ListenerSlot,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    fn finished() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            handle: None,
        }
    }

    /// Cancel the in-flight call.
    ///
    /// Returns `true` when the listener was withdrawn before the outcome was
    /// delivered; it will never be called. Returns `false` when delivery
    /// already happened or is underway.
    pub fn cancel(&self) -> bool {
        let withdrawn = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if let Some(handle) = &self.handle {
            handle.abort();
        }
        if withdrawn {
            debug!("request cancelled");
        }
        withdrawn
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait until the request task has ended, by completion or cancellation.
    pub async fn wait(self) {
        if let Some(handle) = self.handle {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    warn!(error = %err, "request task failed");
                }
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::oneshot;

    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    /// Records each request and answers with a fixed result.
    struct ScriptedTransport {
        log: Log,
        requests: Arc<Mutex<Vec<HttpRequest>>>,
        reply: Result<HttpResponse, TransportError>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.log.lock().unwrap().push("execute".to_string());
            self.requests.lock().unwrap().push(request);
            self.reply.clone()
        }
    }

    /// Never completes.
    struct PendingTransport;

    #[async_trait]
    impl Transport for PendingTransport {
        async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            std::future::pending().await
        }
    }

    struct RecordingIndicator {
        log: Log,
    }

    impl LoadingIndicator for RecordingIndicator {
        fn start(&self) {
            self.log.lock().unwrap().push("start".to_string());
        }
        fn stop(&self) {
            self.log.lock().unwrap().push("stop".to_string());
        }
    }

    struct Harness {
        client: ApiClient,
        log: Log,
        requests: Arc<Mutex<Vec<HttpRequest>>>,
        unauthorized_calls: Arc<AtomicUsize>,
    }

    fn harness(reply: Result<HttpResponse, TransportError>) -> Harness {
        let log: Log = Arc::default();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let unauthorized_calls = Arc::new(AtomicUsize::new(0));
        let hook_calls = Arc::clone(&unauthorized_calls);
        let client = ApiClient::builder()
            .transport(ScriptedTransport {
                log: Arc::clone(&log),
                requests: Arc::clone(&requests),
                reply,
            })
            .indicator(Arc::new(RecordingIndicator {
                log: Arc::clone(&log),
            }))
            .on_unauthorized(move || {
                hook_calls.fetch_add(1, Ordering::SeqCst);
            })
            .build();
        Harness {
            client,
            log,
            requests,
            unauthorized_calls,
        }
    }

    fn response(status: u16, body: &str) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        })
    }

    const ITEMS: &str = "https://api.example.com/items";

    #[tokio::test]
    async fn get_sends_query_and_emits_body() {
        let h = harness(response(200, r#"{"items":[]}"#));
        let spec = RequestSpec::builder(ITEMS).parameter("page", "1").build();

        let value = h.client.send(spec).await.unwrap();
        assert_eq!(value, json!({"items": []}));

        let requests = h.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Get);
        assert_eq!(requests[0].url, "https://api.example.com/items?page=1");
        assert!(requests[0].body.is_none());
    }

    #[tokio::test]
    async fn post_unauthorized_skips_body_and_runs_hook() {
        let h = harness(response(401, "<html>not json</html>"));
        let spec = RequestSpec::builder(ITEMS)
            .method(HttpMethod::Post)
            .parameter("name", "x")
            .build();

        let err = h.client.send(spec).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        assert_eq!(h.unauthorized_calls.load(Ordering::SeqCst), 1);

        let requests = h.requests.lock().unwrap();
        assert_eq!(requests[0].url, ITEMS);
        let body: Value = serde_json::from_str(requests[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"name": "x"}));
    }

    #[tokio::test]
    async fn hook_is_not_run_for_other_statuses() {
        let h = harness(response(403, r#"{"error":"forbidden"}"#));
        let value = h.client.send(RequestSpec::builder(ITEMS).build()).await.unwrap();
        assert_eq!(value["error"], "forbidden");
        assert_eq!(h.unauthorized_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn server_error_with_json_body_is_success() {
        let h = harness(response(500, r#"{"message":"boom"}"#));
        let value = h.client.send(RequestSpec::builder(ITEMS).build()).await.unwrap();
        assert_eq!(value["message"], "boom");
    }

    #[tokio::test]
    async fn connectivity_failure_is_no_connection() {
        let h = harness(Err(TransportError::Connect("network unreachable".to_string())));
        let err = h.client.send(RequestSpec::builder(ITEMS).build()).await.unwrap_err();
        assert!(matches!(err, ApiError::NoConnection));
    }

    #[tokio::test]
    async fn timeout_is_no_connection() {
        let h = harness(Err(TransportError::Timeout("global".to_string())));
        let err = h.client.send(RequestSpec::builder(ITEMS).build()).await.unwrap_err();
        assert!(matches!(err, ApiError::NoConnection));
    }

    #[tokio::test]
    async fn other_transport_failure_is_wrapped() {
        let source = TransportError::Request("tls handshake failed".to_string());
        let h = harness(Err(source.clone()));
        let err = h.client.send(RequestSpec::builder(ITEMS).build()).await.unwrap_err();
        match err {
            ApiError::Other(inner) => assert_eq!(inner, source),
            other => panic!("expected Other, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_json_is_decode_failure() {
        let h = harness(response(200, "not json"));
        let err = h.client.send(RequestSpec::builder(ITEMS).build()).await.unwrap_err();
        assert!(matches!(err, ApiError::Other(TransportError::Decode(_))));
    }

    #[tokio::test]
    async fn empty_body_on_no_content_is_null() {
        let h = harness(response(204, ""));
        let spec = RequestSpec::builder(ITEMS).method(HttpMethod::Delete).build();
        assert_eq!(h.client.send(spec).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn empty_body_on_head_is_null() {
        let h = harness(response(200, ""));
        let spec = RequestSpec::builder(ITEMS).method(HttpMethod::Head).build();
        assert_eq!(h.client.send(spec).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn empty_body_on_ok_get_is_decode_failure() {
        let h = harness(response(200, ""));
        let err = h.client.send(RequestSpec::builder(ITEMS).build()).await.unwrap_err();
        assert!(matches!(err, ApiError::Other(TransportError::Decode(_))));
    }

    #[tokio::test]
    async fn indicator_is_untouched_when_not_requested() {
        let h = harness(response(200, "{}"));
        h.client.send(RequestSpec::builder(ITEMS).build()).await.unwrap();
        assert_eq!(entries(&h.log), vec!["execute"]);
    }

    #[tokio::test]
    async fn indicator_stops_on_failure() {
        let h = harness(Err(TransportError::Connect("offline".to_string())));
        let spec = RequestSpec::builder(ITEMS).show_indicator(true).build();
        h.client.send(spec).await.unwrap_err();
        assert_eq!(entries(&h.log), vec!["start", "execute", "stop"]);
    }

    #[tokio::test]
    async fn encoding_failure_stops_indicator_without_dispatch() {
        let h = harness(response(200, "{}"));
        let spec = RequestSpec::builder("not a url").show_indicator(true).build();
        let err = h.client.send(spec).await.unwrap_err();
        assert!(matches!(err, ApiError::EncodingFailure(_)));
        assert_eq!(entries(&h.log), vec!["start", "stop"]);
        assert!(h.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscribe_orders_indicator_around_dispatch_and_delivery() {
        let h = harness(response(200, r#"{"ok":true}"#));
        let spec = RequestSpec::builder(ITEMS).show_indicator(true).build();
        let (tx, rx) = oneshot::channel();
        let log = Arc::clone(&h.log);

        let subscription = h.client.subscribe(spec, move |outcome| {
            log.lock().unwrap().push("outcome".to_string());
            let _ = tx.send(outcome);
        });

        let outcome = rx.await.unwrap();
        assert_eq!(outcome.unwrap(), json!({"ok": true}));
        subscription.wait().await;
        assert_eq!(entries(&h.log), vec!["start", "execute", "stop", "outcome"]);
    }

    #[tokio::test]
    async fn subscribe_delivers_exactly_one_outcome() {
        let h = harness(response(200, "{}"));
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);

        let subscription = h.client.subscribe(RequestSpec::builder(ITEMS).build(), move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        subscription.wait().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscribe_reports_encoding_failure_before_returning() {
        let h = harness(response(200, "{}"));
        let delivered = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&delivered);

        let subscription = h.client.subscribe(RequestSpec::builder("").build(), move |outcome| {
            *slot.lock().unwrap() = Some(outcome);
        });

        assert!(matches!(
            delivered.lock().unwrap().take(),
            Some(Err(ApiError::EncodingFailure(_)))
        ));
        assert!(subscription.is_finished());
        assert!(!subscription.cancel());
        assert!(h.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_before_completion_suppresses_outcome_and_stops_indicator() {
        let log: Log = Arc::default();
        let client = ApiClient::builder()
            .transport(PendingTransport)
            .indicator(Arc::new(RecordingIndicator {
                log: Arc::clone(&log),
            }))
            .build();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);

        let spec = RequestSpec::builder(ITEMS).show_indicator(true).build();
        let subscription = client.subscribe(spec, move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        assert!(subscription.cancel());
        subscription.wait().await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(entries(&log), vec!["start", "stop"]);
    }

    #[tokio::test]
    async fn cancel_after_delivery_reports_false() {
        let h = harness(response(200, "{}"));
        let (tx, rx) = oneshot::channel();
        let subscription = h.client.subscribe(RequestSpec::builder(ITEMS).build(), move |outcome| {
            let _ = tx.send(outcome.is_ok());
        });

        assert!(rx.await.unwrap());
        assert!(!subscription.cancel());
    }

    /// Cancels the stashed subscription from inside `execute`, then answers
    /// 401. The cancel lands after the call but before delivery.
    struct CancelDuringCall {
        subscription: Arc<Mutex<Option<Subscription>>>,
        cancelled: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for CancelDuringCall {
        async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            if let Some(subscription) = self.subscription.lock().unwrap().as_ref() {
                if subscription.cancel() {
                    self.cancelled.fetch_add(1, Ordering::SeqCst);
                }
            }
            response(401, "")
        }
    }

    #[tokio::test]
    async fn cancelled_unauthorized_request_does_not_run_hook() {
        let stash: Arc<Mutex<Option<Subscription>>> = Arc::default();
        let cancelled = Arc::new(AtomicUsize::new(0));
        let hook_calls = Arc::new(AtomicUsize::new(0));
        let counted_hook = Arc::clone(&hook_calls);
        let client = ApiClient::builder()
            .transport(CancelDuringCall {
                subscription: Arc::clone(&stash),
                cancelled: Arc::clone(&cancelled),
            })
            .on_unauthorized(move || {
                counted_hook.fetch_add(1, Ordering::SeqCst);
            })
            .build();
        let deliveries = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&deliveries);

        let subscription = client.subscribe(RequestSpec::builder(ITEMS).build(), move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        *stash.lock().unwrap() = Some(subscription);
        // The current-thread runtime runs the spawned task to completion here.
        tokio::task::yield_now().await;

        let subscription = stash.lock().unwrap().take().unwrap();
        subscription.wait().await;
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(deliveries.load(Ordering::SeqCst), 0);
        assert_eq!(hook_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn subscribe_outside_runtime_reports_error_to_listener() {
        let log: Log = Arc::default();
        let client = ApiClient::builder()
            .transport(PendingTransport)
            .indicator(Arc::new(RecordingIndicator {
                log: Arc::clone(&log),
            }))
            .build();
        let delivered = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&delivered);

        let spec = RequestSpec::builder(ITEMS).show_indicator(true).build();
        let subscription = client.subscribe(spec, move |outcome| {
            *slot.lock().unwrap() = Some(outcome);
        });

        assert!(matches!(
            delivered.lock().unwrap().take(),
            Some(Err(ApiError::Other(TransportError::Request(_))))
        ));
        assert!(subscription.is_finished());
        assert_eq!(entries(&log), vec!["start", "stop"]);
    }
}
