//! The SDK instance. One per process, passed by handle to whoever needs it.
//!
//! Entry points never block: network and storage work runs on the tokio
//! runtime the instance was created in, and every caller-supplied handler or
//! listener is delivered through the [`UiLoop`] returned by [`Entrig::new`].

use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, info};

use crate::backend::BackendClient;
use crate::config::SdkConfig;
use crate::delivery::DeliveryTracker;
use crate::dispatch::{ui_channel, UiDispatcher, UiLoop};
use crate::error::{EntrigError, Result};
use crate::models::{
    InboundMessage, NotificationEvent, OpenIntent, RegistrationAck, RegistrationRecord, TapIntent,
};
use crate::permission::{
    GateDecision, PendingRegistration, PermissionGate, PermissionWaiter, RegistrationHandler,
};
use crate::platform::{
    ForegroundSlot, NotificationPresenter, PermissionPrompt, SurfaceId, TokenProvider,
};
use crate::registration::RegistrationClient;
use crate::router::{NotificationListener, NotificationRouter};
use crate::token_store::TokenStore;

pub type UnregisterHandler = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// The platform collaborators an SDK instance drives.
#[derive(Clone)]
pub struct Platform {
    pub tokens: Arc<dyn TokenProvider>,
    pub prompt: Arc<dyn PermissionPrompt>,
    pub presenter: Arc<dyn NotificationPresenter>,
}

impl Platform {
    pub fn from_shared<P>(platform: Arc<P>) -> Self
    where
        P: TokenProvider + PermissionPrompt + NotificationPresenter + 'static,
    {
        Self {
            tokens: platform.clone(),
            prompt: platform.clone(),
            presenter: platform,
        }
    }
}

#[derive(Clone)]
pub struct Entrig {
    inner: Arc<Inner>,
}

struct Inner {
    config: SdkConfig,
    registration: RegistrationClient,
    gate: PermissionGate,
    tracker: DeliveryTracker,
    router: NotificationRouter,
    foreground: ForegroundSlot,
    presenter: Arc<dyn NotificationPresenter>,
    dispatcher: UiDispatcher,
    runtime: Handle,
}

impl Entrig {
    /// Builds the instance inside the current tokio runtime. The returned
    /// `UiLoop` must be run (or drained) by the host for handlers to fire.
    pub fn new(
        config: SdkConfig,
        platform: Platform,
        store: Arc<dyn TokenStore>,
    ) -> Result<(Self, UiLoop)> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| {
            EntrigError::Platform("the SDK must be created inside a tokio runtime".to_string())
        })?;

        let backend = BackendClient::new(&config.base_url, &config.api_key)?;
        let (dispatcher, ui_loop) = ui_channel();

        let inner = Inner {
            registration: RegistrationClient::new(backend.clone(), store, platform.tokens),
            gate: PermissionGate::new(platform.prompt, config.handle_permission_automatically),
            tracker: DeliveryTracker::new(Arc::new(backend), runtime.clone()),
            router: NotificationRouter::new(
                dispatcher.clone(),
                config.show_foreground_notification,
            ),
            foreground: ForegroundSlot::new(),
            presenter: platform.presenter,
            dispatcher,
            runtime,
            config,
        };

        Ok((
            Self {
                inner: Arc::new(inner),
            },
            ui_loop,
        ))
    }

    pub fn config(&self) -> &SdkConfig {
        &self.inner.config
    }

    /// Creates the notification channel and bootstraps the push transport.
    /// Calling it again after success is a no-op.
    pub async fn initialize(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.registration.is_initialized() {
            return Ok(());
        }

        inner.presenter.create_channel(
            &inner.config.notification_channel_id,
            &inner.config.notification_channel_name,
        );

        match inner.registration.bootstrap(&inner.config.app_id).await {
            Ok(()) => {
                info!("SDK initialized");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "SDK initialization failed");
                Err(e)
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.registration.is_initialized()
    }

    /// Registers `user_id` for push. May park behind a consent prompt shown on
    /// `surface` (or the current foreground surface); a later call supersedes
    /// this one while parked and its handler is never called. Calls are ordered
    /// by when they were made, not by when their background work finishes.
    pub fn register<F>(
        &self,
        user_id: &str,
        sdk_label: &str,
        surface: Option<SurfaceId>,
        handler: F,
    ) where
        F: FnOnce(Result<RegistrationAck>) + Send + 'static,
    {
        let inner = self.inner.clone();
        let ticket = self.inner.gate.issue_ticket();
        let user_id = user_id.to_string();
        let sdk_label = sdk_label.to_string();
        let handler: RegistrationHandler = Box::new(handler);

        self.inner.runtime.spawn(async move {
            if !inner.registration.is_initialized() {
                error!(user_id = %user_id, "Registration failed: SDK not initialized");
                inner.gate.settle(ticket);
                inner.complete(handler, Err(EntrigError::NotInitialized));
                return;
            }

            // An already registered user never sees the consent prompt
            match inner.registration.store().load().await {
                Ok(Some(record)) if record.user_id == user_id => {
                    debug!(user_id = %user_id, "User already registered");
                    inner.gate.settle(ticket);
                    inner.complete(handler, Ok(RegistrationAck::AlreadyRegistered));
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    inner.gate.settle(ticket);
                    inner.complete(handler, Err(e));
                    return;
                }
            }

            let surface = surface.or_else(|| inner.foreground.current());
            match inner
                .gate
                .request_registration(ticket, &user_id, &sdk_label, surface, handler)
            {
                GateDecision::Proceed(request) => inner.perform_registration(request).await,
                GateDecision::Deferred | GateDecision::Superseded => {}
                GateDecision::Rejected(request, e) => {
                    error!(user_id = %user_id, error = %e, "Registration failed");
                    inner.complete(request.handler, Err(e));
                }
            }
        });
    }

    /// Delivers the consent prompt outcome. A parked registration resumes
    /// either way and a manual permission request receives `granted`.
    pub fn on_permission_result(&self, granted: bool) {
        let outcome = self.inner.gate.on_consent_result(granted);
        if let Some(PermissionWaiter(handler)) = outcome.waiter {
            self.inner.dispatcher.post(move || handler(Ok(granted)));
        }
        if let Some(request) = outcome.registration {
            let inner = self.inner.clone();
            self.inner
                .runtime
                .spawn(async move { inner.perform_registration(request).await });
        }
    }

    /// Asks for notification consent without registering. The handler gets
    /// `true` straight away when no prompt is needed; otherwise the prompt is
    /// shown on `surface` (or the foreground surface) and the handler waits
    /// for [`Entrig::on_permission_result`].
    pub fn request_permission<F>(&self, surface: Option<SurfaceId>, handler: F)
    where
        F: FnOnce(Result<bool>) + Send + 'static,
    {
        let surface = surface.or_else(|| self.inner.foreground.current());
        if let Some((handler, answer)) = self
            .inner
            .gate
            .request_permission(surface, Box::new(handler))
        {
            self.inner.dispatcher.post(move || handler(answer));
        }
    }

    pub fn pending_registration(&self) -> Option<String> {
        self.inner.gate.pending_user()
    }

    pub fn unregister<F>(&self, handler: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let inner = self.inner.clone();
        let handler: UnregisterHandler = Box::new(handler);

        self.inner.runtime.spawn(async move {
            let result = inner.registration.unregister().await;
            match &result {
                Ok(()) => info!("User unregistered"),
                Err(e) => error!(error = %e, "Unregistration failed"),
            }
            inner.dispatcher.post(move || handler(result));
        });
    }

    /// Token rotation from the push transport.
    pub fn on_new_token(&self, token: &str) {
        let inner = self.inner.clone();
        let token = token.to_string();

        self.inner.runtime.spawn(async move {
            match inner.registration.on_token_rotated(&token).await {
                Ok(true) => info!("Push token refreshed"),
                Ok(false) => debug!("Token refresh skipped, no registered user"),
                Err(e) => error!(error = %e, "Push token refresh failed"),
            }
        });
    }

    pub async fn registration(&self) -> Result<Option<RegistrationRecord>> {
        self.inner.registration.store().load().await
    }

    /// Entry point for messages handed over by the push transport.
    pub fn on_message_received(&self, message: InboundMessage) {
        let inner = &self.inner;
        let Some(event) = inner
            .tracker
            .on_message_arrived(&message.message_id, &message.data)
        else {
            return;
        };

        let in_foreground = inner.foreground.is_foreground();
        if inner.router.should_display(in_foreground) {
            let tap = TapIntent {
                message_id: message.message_id,
                extras: message.data,
            };
            inner
                .presenter
                .show(&inner.config.notification_channel_id, &event, tap);
        }

        if in_foreground {
            inner.router.route_foreground(event);
        }
    }

    /// Processes a launch or resume intent. Returns true if it surfaced a
    /// notification that had not been opened before.
    pub fn handle_intent(&self, intent: &OpenIntent) -> bool {
        let Some(message_id) = intent.message_id() else {
            return false;
        };
        if intent.launched_from_history {
            debug!(message_id = %message_id, "Ignoring intent relaunched from history");
            return false;
        }

        let event = NotificationEvent::from_push_data(&intent.extras);
        if !self
            .inner
            .tracker
            .on_message_opened(message_id, event.delivery_id.as_deref())
        {
            return false;
        }

        debug!(message_id = %message_id, "Notification opened");
        self.inner.router.route_opened(event);
        true
    }

    pub fn on_surface_created(&self, surface: SurfaceId, intent: Option<&OpenIntent>) {
        debug!(surface = ?surface, "Surface created");
        if let Some(intent) = intent {
            self.handle_intent(intent);
        }
    }

    pub fn on_surface_resumed(&self, surface: SurfaceId, intent: Option<&OpenIntent>) {
        self.inner.foreground.resumed(surface);
        if let Some(intent) = intent {
            self.handle_intent(intent);
        }
    }

    pub fn on_surface_paused(&self, surface: SurfaceId) {
        self.inner.foreground.left(surface);
    }

    pub fn on_surface_destroyed(&self, surface: SurfaceId) {
        self.inner.foreground.left(surface);
    }

    pub fn is_in_foreground(&self) -> bool {
        self.inner.foreground.is_foreground()
    }

    pub fn set_foreground_listener<F>(&self, listener: Option<F>)
    where
        F: Fn(NotificationEvent) + Send + Sync + 'static,
    {
        self.inner
            .router
            .set_foreground_listener(listener.map(|l| Arc::new(l) as NotificationListener));
    }

    pub fn set_opened_listener<F>(&self, listener: Option<F>)
    where
        F: Fn(NotificationEvent) + Send + Sync + 'static,
    {
        self.inner
            .router
            .set_opened_listener(listener.map(|l| Arc::new(l) as NotificationListener));
    }

    /// The notification the process was opened from, returned at most once.
    pub fn initial_notification(&self) -> Option<NotificationEvent> {
        self.inner.router.consume_initial()
    }
}

impl Inner {
    async fn perform_registration(&self, request: PendingRegistration) {
        let PendingRegistration {
            user_id,
            sdk_label,
            handler,
        } = request;

        let result = self.registration.register(&user_id, &sdk_label).await;
        match &result {
            Ok(_) => info!(user_id = %user_id, "User registered"),
            Err(e) => error!(user_id = %user_id, error = %e, "Registration failed"),
        }
        self.complete(handler, result);
    }

    fn complete(&self, handler: RegistrationHandler, result: Result<RegistrationAck>) {
        self.dispatcher.post(move || handler(result));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessPlatform;
    use crate::registration::tests::mount_fcm_params;
    use crate::token_store::MemoryTokenStore;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        sdk: Entrig,
        platform: Arc<HeadlessPlatform>,
        store: Arc<dyn TokenStore>,
        server: MockServer,
    }

    async fn harness(
        config: impl FnOnce(SdkConfig) -> SdkConfig,
        consent_required: bool,
    ) -> Harness {
        harness_with_store(config, consent_required, Arc::new(MemoryTokenStore::new())).await
    }

    async fn harness_with_store(
        config: impl FnOnce(SdkConfig) -> SdkConfig,
        consent_required: bool,
        store: Arc<dyn TokenStore>,
    ) -> Harness {
        let server = MockServer::start().await;
        mount_fcm_params(&server).await;

        let platform = Arc::new(HeadlessPlatform::new(consent_required).with_token("tok"));
        let config = config(SdkConfig::new("key").unwrap().with_base_url(server.uri()));
        let (sdk, ui) =
            Entrig::new(config, Platform::from_shared(platform.clone()), store.clone()).unwrap();
        tokio::spawn(ui.run());

        Harness {
            sdk,
            platform,
            store,
            server,
        }
    }

    /// A store whose first read is slow, as a cold file read would be.
    struct SlowFirstLoad {
        inner: MemoryTokenStore,
        slowed: AtomicBool,
    }

    impl SlowFirstLoad {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryTokenStore::new(),
                slowed: AtomicBool::new(false),
            })
        }
    }

    #[async_trait::async_trait]
    impl TokenStore for SlowFirstLoad {
        async fn load(&self) -> Result<Option<RegistrationRecord>> {
            if !self.slowed.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.inner.load().await
        }

        async fn save(&self, record: &RegistrationRecord) -> Result<()> {
            self.inner.save(record).await
        }

        async fn clear(&self) -> Result<()> {
            self.inner.clear().await
        }
    }

    fn capture<T: Send + 'static>() -> (impl FnOnce(T) + Send + 'static, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            move |value: T| {
                let _ = tx.send(value);
            },
            rx,
        )
    }

    async fn mount_register(server: &MockServer, user: &str, id: &str, calls: u64) {
        Mock::given(method("POST"))
            .and(path("/register"))
            .and(body_json(json!({"user_id": user, "fcm_token": "tok", "sdk": "android"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": id})))
            .expect(calls)
            .mount(server)
            .await;
    }

    fn record(id: &str, user: &str) -> RegistrationRecord {
        RegistrationRecord {
            registration_id: id.to_string(),
            user_id: user.to_string(),
            push_token: "tok".to_string(),
        }
    }

    fn message(id: &str, delivery_id: Option<&str>) -> InboundMessage {
        let mut payload = json!({ "type": "chat", "room": "r-7" });
        if let Some(delivery_id) = delivery_id {
            payload["delivery_id"] = json!(delivery_id);
        }
        InboundMessage {
            message_id: id.to_string(),
            data: HashMap::from([
                ("title".to_string(), "New message".to_string()),
                ("body".to_string(), "hello".to_string()),
                ("payload".to_string(), payload.to_string()),
            ]),
        }
    }

    #[tokio::test]
    async fn test_register_before_initialize_fails() {
        let h = harness(|c| c, false).await;
        let (handler, rx) = capture::<Result<RegistrationAck>>();
        h.sdk.register("u1", "android", None, handler);
        assert!(matches!(rx.await.unwrap(), Err(EntrigError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_register_idempotent_then_unregister() {
        let h = harness(|c| c, false).await;
        mount_register(&h.server, "u1", "r1", 1).await;
        Mock::given(method("POST"))
            .and(path("/unregister"))
            .and(body_json(json!({"id": "r1"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&h.server)
            .await;

        h.sdk.initialize().await.unwrap();
        h.sdk.initialize().await.unwrap();
        assert_eq!(
            h.platform.channels(),
            vec![("default".to_string(), "General".to_string())]
        );

        let (handler, rx) = capture::<Result<RegistrationAck>>();
        h.sdk.register("u1", "android", None, handler);
        assert_eq!(
            rx.await.unwrap().unwrap(),
            RegistrationAck::Registered(record("r1", "u1"))
        );
        assert_eq!(h.store.load().await.unwrap(), Some(record("r1", "u1")));

        let (handler, rx) = capture::<Result<RegistrationAck>>();
        h.sdk.register("u1", "android", None, handler);
        assert_eq!(rx.await.unwrap().unwrap(), RegistrationAck::AlreadyRegistered);

        let (handler, rx) = capture::<Result<()>>();
        h.sdk.unregister(handler);
        rx.await.unwrap().unwrap();
        assert_eq!(h.sdk.registration().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unregister_without_registration() {
        let h = harness(|c| c, false).await;
        h.sdk.initialize().await.unwrap();

        let (handler, rx) = capture::<Result<()>>();
        h.sdk.unregister(handler);
        assert!(matches!(rx.await.unwrap(), Err(EntrigError::NotRegistered)));
        assert_eq!(h.store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_consent_gated_registration_last_caller_wins() {
        let h = harness(|c| c, true).await;
        mount_register(&h.server, "u1", "r1", 0).await;
        mount_register(&h.server, "u2", "r2", 1).await;
        h.sdk.initialize().await.unwrap();
        h.sdk.on_surface_resumed(SurfaceId(1), None);

        let first_calls = Arc::new(AtomicUsize::new(0));
        let counter = first_calls.clone();
        h.sdk.register("u1", "android", None, move |_: Result<RegistrationAck>| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let (handler, rx) = capture::<Result<RegistrationAck>>();
        h.sdk.register("u2", "android", None, handler);

        // Wait until both requests reached the gate
        while h.platform.prompts().len() < 2 {
            tokio::task::yield_now().await;
        }
        assert_eq!(h.sdk.pending_registration().as_deref(), Some("u2"));

        // Denied still registers the token
        h.sdk.on_permission_result(false);
        assert_eq!(
            rx.await.unwrap().unwrap(),
            RegistrationAck::Registered(record("r2", "u2"))
        );
        assert!(h.sdk.pending_registration().is_none());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(first_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_later_register_wins_when_earlier_call_is_slow() {
        let h = harness_with_store(|c| c, true, SlowFirstLoad::new()).await;
        mount_register(&h.server, "u1", "r1", 0).await;
        mount_register(&h.server, "u2", "r2", 1).await;
        h.sdk.initialize().await.unwrap();
        h.sdk.on_surface_resumed(SurfaceId(1), None);

        let first_calls = Arc::new(AtomicUsize::new(0));
        let counter = first_calls.clone();
        // u1's store read is the slow one, so u2 reaches the gate first
        h.sdk.register("u1", "android", None, move |_: Result<RegistrationAck>| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let (handler, rx) = capture::<Result<RegistrationAck>>();
        h.sdk.register("u2", "android", None, handler);

        while h.sdk.pending_registration().is_none() {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.sdk.pending_registration().as_deref(), Some("u2"));
        assert_eq!(h.platform.prompts().len(), 1);

        h.sdk.on_permission_result(true);
        assert_eq!(
            rx.await.unwrap().unwrap(),
            RegistrationAck::Registered(record("r2", "u2"))
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(first_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_consent_result_during_slow_register_is_not_lost() {
        let h = harness_with_store(|c| c, true, SlowFirstLoad::new()).await;
        mount_register(&h.server, "u1", "r1", 1).await;
        h.sdk.initialize().await.unwrap();
        h.sdk.on_surface_resumed(SurfaceId(1), None);

        let (handler, rx) = capture::<Result<RegistrationAck>>();
        h.sdk.register("u1", "android", None, handler);
        h.sdk.on_permission_result(false);

        assert_eq!(
            rx.await.unwrap().unwrap(),
            RegistrationAck::Registered(record("r1", "u1"))
        );
        assert!(h.platform.prompts().is_empty());
        assert!(h.sdk.pending_registration().is_none());
    }

    #[tokio::test]
    async fn test_request_permission_without_prompt() {
        let h = harness(|c| c, false).await;
        let (handler, rx) = capture::<Result<bool>>();
        h.sdk.request_permission(None, handler);
        assert!(rx.await.unwrap().unwrap());
        assert!(h.platform.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_request_permission_shows_prompt() {
        let h = harness(|c| c, true).await;

        let (handler, rx) = capture::<Result<bool>>();
        h.sdk.request_permission(None, handler);
        assert!(matches!(
            rx.await.unwrap(),
            Err(EntrigError::PermissionSurfaceUnavailable)
        ));

        h.sdk.on_surface_resumed(SurfaceId(5), None);
        let (handler, rx) = capture::<Result<bool>>();
        h.sdk.request_permission(None, handler);
        assert_eq!(h.platform.prompts(), vec![SurfaceId(5)]);
        assert!(h.sdk.pending_registration().is_none());

        h.sdk.on_permission_result(true);
        assert!(rx.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_consent_without_surface_fails() {
        let h = harness(|c| c, true).await;
        h.sdk.initialize().await.unwrap();

        let (handler, rx) = capture::<Result<RegistrationAck>>();
        h.sdk.register("u1", "android", None, handler);
        assert!(matches!(
            rx.await.unwrap(),
            Err(EntrigError::PermissionSurfaceUnavailable)
        ));
        assert!(h.sdk.pending_registration().is_none());
        assert!(h.platform.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_token_rotation_reregisters() {
        let h = harness(|c| c, false).await;
        Mock::given(method("POST"))
            .and(path("/register"))
            .and(body_json(json!({"user_id": "u1", "fcm_token": "tok2", "sdk": "android"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "r2"})))
            .expect(1)
            .mount(&h.server)
            .await;
        h.sdk.initialize().await.unwrap();
        h.store.save(&record("r1", "u1")).await.unwrap();

        h.sdk.on_new_token("tok2");
        for _ in 0..100 {
            if h.store.load().await.unwrap().map(|r| r.push_token) == Some("tok2".to_string()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let stored = h.store.load().await.unwrap().unwrap();
        assert_eq!(stored.registration_id, "r2");
        assert_eq!(stored.push_token, "tok2");
    }

    #[tokio::test]
    async fn test_background_message_is_shown_and_reported() {
        let h = harness(|c| c, false).await;
        Mock::given(method("POST"))
            .and(path("/delivery-status"))
            .and(body_json(json!({"delivery_id": "d1", "status": "delivered"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&h.server)
            .await;

        let foreground_calls = Arc::new(AtomicUsize::new(0));
        let counter = foreground_calls.clone();
        h.sdk.set_foreground_listener(Some(move |_: NotificationEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        h.sdk.on_message_received(message("m1", Some("d1")));
        h.sdk.on_message_received(message("m1", Some("d1")));

        let shown = h.platform.shown();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].event.title, "New message");
        assert_eq!(shown[0].event.notification_type.as_deref(), Some("chat"));
        assert_eq!(shown[0].event.data["room"], json!("r-7"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(foreground_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_foreground_message_respects_display_policy() {
        let h = harness(|c| c.with_foreground_notifications(false), false).await;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        h.sdk.set_foreground_listener(Some(move |event: NotificationEvent| {
            let _ = tx.send(event);
        }));
        h.sdk.on_surface_resumed(SurfaceId(3), None);

        h.sdk.on_message_received(message("m1", None));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.body.as_deref(), Some("hello"));
        assert!(h.platform.shown().is_empty());

        // Backgrounded again: shown, no observer
        h.sdk.on_surface_paused(SurfaceId(3));
        h.sdk.on_message_received(message("m2", None));
        assert_eq!(h.platform.shown().len(), 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_tap_round_trip_and_initial_latch() {
        let h = harness(|c| c, false).await;
        Mock::given(method("POST"))
            .and(path("/delivery-status"))
            .and(body_json(json!({"delivery_id": "d1", "status": "read"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&h.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/delivery-status"))
            .and(body_json(json!({"delivery_id": "d1", "status": "delivered"})))
            .respond_with(ResponseTemplate::new(200))
            .mount(&h.server)
            .await;

        let opened = Arc::new(Mutex::new(Vec::new()));
        let sink = opened.clone();
        h.sdk.set_opened_listener(Some(move |event: NotificationEvent| {
            sink.lock().unwrap().push(event.title);
        }));

        h.sdk.on_message_received(message("m1", Some("d1")));
        let tap = h.platform.shown().remove(0).tap;
        let intent = tap.into_open_intent();

        // Cold start delivers the intent on create and again on resume
        h.sdk.on_surface_created(SurfaceId(1), Some(&intent));
        h.sdk.on_surface_resumed(SurfaceId(1), Some(&intent));
        assert!(!h.sdk.handle_intent(&intent));

        let initial = h.sdk.initial_notification().unwrap();
        assert_eq!(initial.title, "New message");
        assert_eq!(initial.delivery_id.as_deref(), Some("d1"));
        assert!(h.sdk.initial_notification().is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*opened.lock().unwrap(), vec!["New message".to_string()]);
    }

    #[tokio::test]
    async fn test_history_and_plain_intents_ignored() {
        let h = harness(|c| c, false).await;

        let plain = OpenIntent::default();
        assert!(!h.sdk.handle_intent(&plain));

        let mut history = message("m9", None).data;
        history.insert("google.message_id".to_string(), "m9".to_string());
        let intent = OpenIntent {
            extras: history,
            launched_from_history: true,
        };
        assert!(!h.sdk.handle_intent(&intent));
        assert!(h.sdk.initial_notification().is_none());
    }
}
