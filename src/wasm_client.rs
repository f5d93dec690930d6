//! Browser surface: `window.localStorage` state plus a player bound to an
//! HTML video element and hls.js.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tokio::sync::mpsc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, js_sys, spawn_local, JsFuture};
use web_sys::{Event, HtmlVideoElement};

use crate::activation;
use crate::backup;
use crate::catalog;
use crate::config::AppConfig;
use crate::model::{Channel, Customer, CustomerStatus, HistoryItem, Movie};
use crate::player::{
    AttachOptions, MediaElement, PlaybackEngine, PlaybackState, PlayerEvent, Presentation, SessionId,
    StreamErrorKind, StreamingEngine, StreamingSession,
};
use crate::state::LocalState;
use crate::storage::BrowserStore;
use crate::sync::watch::Watch;
use crate::sync::CloudSync;

const HLS_CONFIG: &str = r#"{"enableWorker":true,"lowLatencyMode":true}"#;
const HLS_MANIFEST_PARSED: &str = "hlsManifestParsed";
const HLS_ERROR: &str = "hlsError";

#[wasm_bindgen]
extern "C" {
    type Hls;

    #[wasm_bindgen(static_method_of = Hls, js_name = isSupported, catch)]
    fn is_supported() -> Result<bool, JsValue>;

    #[wasm_bindgen(constructor)]
    fn new(config: &JsValue) -> Hls;

    #[wasm_bindgen(method, js_name = loadSource)]
    fn load_source(this: &Hls, url: &str);

    #[wasm_bindgen(method, js_name = attachMedia)]
    fn attach_media(this: &Hls, media: &HtmlVideoElement);

    #[wasm_bindgen(method, js_name = startLoad)]
    fn start_load(this: &Hls);

    #[wasm_bindgen(method, js_name = recoverMediaError)]
    fn recover_media_error(this: &Hls);

    #[wasm_bindgen(method)]
    fn destroy(this: &Hls);

    #[wasm_bindgen(method, js_name = on)]
    fn on_manifest(this: &Hls, event: &str, callback: &Closure<dyn FnMut()>);

    #[wasm_bindgen(method, js_name = on)]
    fn on_error(this: &Hls, event: &str, callback: &Closure<dyn FnMut(JsValue, HlsErrorData)>);

    type HlsErrorData;

    #[wasm_bindgen(method, getter, js_name = "type")]
    fn kind(this: &HlsErrorData) -> String;

    #[wasm_bindgen(method, getter)]
    fn fatal(this: &HlsErrorData) -> bool;

    #[wasm_bindgen(method, getter)]
    fn details(this: &HlsErrorData) -> String;

    #[wasm_bindgen(js_namespace = JSON, js_name = parse, catch)]
    fn json_parse(text: &str) -> Result<JsValue, JsValue>;
}

type EventSender = mpsc::UnboundedSender<(SessionId, PlayerEvent)>;

fn console_warn(message: &str) {
    web_sys::console::warn_1(&JsValue::from_str(message));
}

fn console_error(message: &str) {
    web_sys::console::error_1(&JsValue::from_str(message));
}

/// `MediaElement` over an `HTMLVideoElement`
pub struct VideoElement {
    element: HtmlVideoElement,
    events: EventSender,
    session: Rc<Cell<u64>>,
    listeners: Vec<(&'static str, Closure<dyn FnMut(Event)>)>,
}

impl VideoElement {
    fn new(element: HtmlVideoElement, events: EventSender) -> Result<Self, JsValue> {
        let session = Rc::new(Cell::new(0));
        let mut listeners = Vec::new();
        let forward = |name: &'static str, make: fn() -> PlayerEvent| {
            let events = events.clone();
            let session = Rc::clone(&session);
            let cb = Closure::<dyn FnMut(Event)>::new(move |_: Event| {
                let _ = events.send((SessionId(session.get()), make()));
            });
            (name, cb)
        };
        listeners.push(forward("loadedmetadata", || PlayerEvent::LoadedMetadata));
        listeners.push(forward("error", || {
            PlayerEvent::ElementError("media element reported an error".to_string())
        }));
        for (name, cb) in &listeners {
            element.add_event_listener_with_callback(name, cb.as_ref().unchecked_ref())?;
        }
        Ok(Self {
            element,
            events,
            session,
            listeners,
        })
    }
}

impl Drop for VideoElement {
    fn drop(&mut self) {
        for (name, cb) in &self.listeners {
            let _ = self
                .element
                .remove_event_listener_with_callback(name, cb.as_ref().unchecked_ref());
        }
    }
}

impl MediaElement for VideoElement {
    fn set_muted(&mut self, muted: bool) {
        self.element.set_muted(muted);
    }

    fn is_muted(&self) -> bool {
        self.element.muted()
    }

    fn can_play_type(&self, mime: &str) -> bool {
        !self.element.can_play_type(mime).is_empty()
    }

    fn set_source(&mut self, url: &str) {
        self.element.set_src(url);
    }

    fn clear_source(&mut self) {
        let _ = self.element.remove_attribute("src");
        self.element.load();
    }

    fn play(&mut self) {
        let id = SessionId(self.session.get());
        let promise = match self.element.play() {
            Ok(promise) => promise,
            Err(e) => {
                let _ = self.events.send((id, PlayerEvent::PlayRejected(format!("{:?}", e))));
                return;
            }
        };
        let events = self.events.clone();
        spawn_local(async move {
            if let Err(e) = JsFuture::from(promise).await {
                let _ = events.send((id, PlayerEvent::PlayRejected(format!("{:?}", e))));
            }
        });
    }

    fn present(&mut self, presentation: Presentation) {
        self.element.set_controls(presentation.controls);
        let _ = self.element.style().set_property("object-fit", presentation.fit.css_value());
    }

    fn bind_session(&mut self, id: SessionId) {
        self.session.set(id.0);
    }
}

/// hls.js, if the page loaded it
pub struct HlsJs {
    events: EventSender,
}

pub struct HlsSession {
    hls: Hls,
    _on_manifest: Closure<dyn FnMut()>,
    _on_error: Closure<dyn FnMut(JsValue, HlsErrorData)>,
}

impl StreamingSession for HlsSession {
    fn start_load(&mut self) {
        self.hls.start_load();
    }

    fn recover_media_error(&mut self) {
        self.hls.recover_media_error();
    }

    fn destroy(&mut self) {
        self.hls.destroy();
    }
}

impl StreamingEngine<VideoElement> for HlsJs {
    type Session = HlsSession;

    fn is_supported(&self) -> bool {
        // a ReferenceError means the script is not on the page
        Hls::is_supported().unwrap_or(false)
    }

    fn open(&self, id: SessionId, url: &str, media: &mut VideoElement) -> HlsSession {
        let config = json_parse(HLS_CONFIG).unwrap_or(JsValue::UNDEFINED);
        let hls = Hls::new(&config);

        let events = self.events.clone();
        let on_manifest = Closure::<dyn FnMut()>::new(move || {
            let _ = events.send((id, PlayerEvent::ManifestParsed));
        });
        let events = self.events.clone();
        let on_error = Closure::<dyn FnMut(JsValue, HlsErrorData)>::new(move |_: JsValue, data: HlsErrorData| {
            let event = PlayerEvent::StreamError {
                kind: StreamErrorKind::from_hls_type(&data.kind()),
                fatal: data.fatal(),
                details: data.details(),
            };
            let _ = events.send((id, event));
        });
        hls.on_manifest(HLS_MANIFEST_PARSED, &on_manifest);
        hls.on_error(HLS_ERROR, &on_error);

        hls.load_source(url);
        hls.attach_media(&media.element);
        HlsSession {
            hls,
            _on_manifest: on_manifest,
            _on_error: on_error,
        }
    }
}

type BrowserEngine = PlaybackEngine<HlsJs, VideoElement>;

fn state_name(state: &PlaybackState) -> String {
    match state {
        PlaybackState::Idle => "idle".to_string(),
        PlaybackState::Loading => "loading".to_string(),
        PlaybackState::Ready => "ready".to_string(),
        PlaybackState::Playing => "playing".to_string(),
        PlaybackState::Failed(e) => format!("failed: {}", e),
    }
}

/// Player bound to one `<video>` element
#[wasm_bindgen]
pub struct WasmPlayer {
    engine: Rc<RefCell<BrowserEngine>>,
}

#[wasm_bindgen]
impl WasmPlayer {
    #[wasm_bindgen(constructor)]
    pub fn new(element_id: &str) -> Result<WasmPlayer, JsValue> {
        console_error_panic_hook::set_once();
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| JsValue::from_str("no document"))?;
        let element = document
            .get_element_by_id(element_id)
            .ok_or_else(|| JsValue::from_str("video element not found"))?
            .dyn_into::<HtmlVideoElement>()
            .map_err(|_| JsValue::from_str("element is not a <video>"))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let media = VideoElement::new(element, tx.clone())?;
        let engine = Rc::new(RefCell::new(PlaybackEngine::new(HlsJs { events: tx }, media)));
        spawn_local(pump(Rc::downgrade(&engine), rx));
        Ok(Self { engine })
    }

    pub fn attach(&self, url: &str, autoplay: bool, muted: bool) {
        self.engine
            .borrow_mut()
            .attach(url, AttachOptions { autoplay, muted });
    }

    pub fn detach(&self) {
        self.engine.borrow_mut().detach();
    }

    pub fn state(&self) -> String {
        state_name(self.engine.borrow().state())
    }

    pub fn strategy(&self) -> Option<String> {
        self.engine
            .borrow()
            .strategy()
            .map(|s| s.display_name().to_string())
    }
}

/// Feed element and library callbacks into the engine outside of any borrow
async fn pump(engine: Weak<RefCell<BrowserEngine>>, mut rx: mpsc::UnboundedReceiver<(SessionId, PlayerEvent)>) {
    while let Some((id, event)) = rx.recv().await {
        let Some(engine) = engine.upgrade() else {
            break;
        };
        if let PlayerEvent::PlayRejected(reason) = &event {
            console_warn(&format!("Autoplay prevented: {}", reason));
        }
        let mut engine = engine.borrow_mut();
        engine.handle_session_event(id, event);
        if let PlaybackState::Failed(e) = engine.state() {
            console_error(&format!("Playback failed: {}", e));
        }
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Call `callback` with the JSON of every value published on `rx` until its source stops
fn forward_changes<T>(mut rx: tokio::sync::watch::Receiver<T>, callback: js_sys::Function)
where
    T: serde::Serialize + 'static,
{
    spawn_local(async move {
        while rx.changed().await.is_ok() {
            let json = to_json(&*rx.borrow_and_update());
            if let Err(e) = callback.call1(&JsValue::NULL, &JsValue::from_str(&json)) {
                console_warn(&format!("Watch callback failed: {:?}", e));
            }
        }
    });
}

enum WatchHandle {
    Device(Watch<Option<Customer>>),
    Customers(Watch<Vec<Customer>>),
}

/// Running device-record subscription; polling stops on `cancel()` or `free()`
#[wasm_bindgen]
pub struct SyncWatch {
    handle: Option<WatchHandle>,
}

#[wasm_bindgen]
impl SyncWatch {
    pub fn cancel(&mut self) {
        self.handle = None;
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Latest value as JSON
    pub fn current_json(&self) -> String {
        match &self.handle {
            Some(WatchHandle::Device(watch)) => to_json(&watch.current()),
            Some(WatchHandle::Customers(watch)) => to_json(&watch.current()),
            None => "null".to_string(),
        }
    }
}

/// Local state and admin operations over `window.localStorage`
#[wasm_bindgen]
pub struct WasmClient {
    state: LocalState<BrowserStore>,
}

#[wasm_bindgen]
impl WasmClient {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        console_error_panic_hook::set_once();
        Self {
            state: LocalState::new(BrowserStore::new()),
        }
    }

    pub fn device_id(&self) -> String {
        self.state.device_id()
    }

    pub fn config_json(&self) -> String {
        to_json(&self.state.load_config())
    }

    pub fn save_config_json(&self, json: &str) -> bool {
        match serde_json::from_str::<AppConfig>(json) {
            Ok(config) => self.state.save_config(&config).is_ok(),
            Err(e) => {
                console_warn(&format!("Rejected config: {}", e));
                false
            }
        }
    }

    pub fn channels_json(&self) -> String {
        to_json(&self.state.channels())
    }

    pub fn save_channels_json(&self, json: &str) -> bool {
        serde_json::from_str::<Vec<Channel>>(json)
            .map(|channels| self.state.save_channels(&channels).is_ok())
            .unwrap_or(false)
    }

    pub fn movies_json(&self) -> String {
        to_json(&self.state.movies())
    }

    pub fn save_movies_json(&self, json: &str) -> bool {
        serde_json::from_str::<Vec<Movie>>(json)
            .map(|movies| self.state.save_movies(&movies).is_ok())
            .unwrap_or(false)
    }

    pub fn search_channels_json(&self, query: &str) -> String {
        let channels = self.state.channels();
        to_json(&catalog::search_channels(&channels, query))
    }

    /// Number of channels imported
    pub fn import_playlist(&self, text: &str) -> u32 {
        match catalog::import_playlist(&self.state, text) {
            Ok(count) => count as u32,
            Err(e) => {
                console_error(&e.diagnostics());
                0
            }
        }
    }

    pub fn verify_admin_password(&self, input: &str) -> bool {
        catalog::verify_admin_password(&self.state, input)
    }

    pub fn history_json(&self) -> String {
        to_json(&self.state.history())
    }

    pub fn add_history_json(&self, item: &str) -> bool {
        serde_json::from_str::<HistoryItem>(item)
            .map(|item| self.state.add_to_history(item).is_ok())
            .unwrap_or(false)
    }

    pub fn last_watched(&self) -> Option<String> {
        self.state.last_watched()
    }

    pub fn set_last_watched(&self, id: &str) -> bool {
        self.state.save_last_watched(id).is_ok()
    }

    /// Activation code for `device_id`, `undefined` for zero months
    pub fn generate_code(device_id: &str, months: u32) -> Option<String> {
        activation::generate(device_id, months)
    }

    /// Months unlocked by `code` for `device_id`, 0 when invalid
    pub fn validate_code(code: &str, device_id: &str) -> u32 {
        activation::validate(code, device_id).months.unwrap_or(0)
    }

    pub fn redeem_code(&self, code: &str) -> bool {
        matches!(self.state.redeem_code(code), Ok(Some(_)))
    }

    pub fn is_subscribed(&self) -> bool {
        self.state.subscription_status().active
    }

    pub fn export_database(&self) -> Option<String> {
        backup::export_database(&self.state).ok()
    }

    /// Resolves to a boolean
    pub fn sync_from_url(&self, url: String) -> js_sys::Promise {
        let state = self.state.clone();
        future_to_promise(async move {
            Ok(JsValue::from_bool(backup::fetch_remote_database(&state, &url).await))
        })
    }

    pub fn cloud_push(&self) -> js_sys::Promise {
        let sync = CloudSync::from_config(self.state.clone());
        future_to_promise(async move { Ok(JsValue::from_bool(sync.push_backup().await)) })
    }

    pub fn cloud_pull(&self) -> js_sys::Promise {
        let sync = CloudSync::from_config(self.state.clone());
        future_to_promise(async move { Ok(JsValue::from_bool(sync.pull_backup().await)) })
    }

    /// Resolves to the device record as JSON, or null
    pub fn register_device(&self) -> js_sys::Promise {
        let sync = CloudSync::from_config(self.state.clone());
        let device = self.state.device_id();
        future_to_promise(async move {
            Ok(match sync.register_device(&device).await {
                Some(customer) => JsValue::from_str(&to_json(&customer)),
                None => JsValue::NULL,
            })
        })
    }

    /// Resolves to the device record as JSON, or null
    pub fn fetch_customer(&self, device_id: String) -> js_sys::Promise {
        let sync = CloudSync::from_config(self.state.clone());
        future_to_promise(async move {
            Ok(match sync.fetch_customer(&device_id).await {
                Some(customer) => JsValue::from_str(&to_json(&customer)),
                None => JsValue::NULL,
            })
        })
    }

    /// Resolves to a boolean
    pub fn grant_subscription(&self, device_id: String, days: u32) -> js_sys::Promise {
        let sync = CloudSync::from_config(self.state.clone());
        future_to_promise(async move { Ok(JsValue::from_bool(sync.grant_subscription(&device_id, days).await)) })
    }

    /// `status` is `Active`, `Banned`, `Expired` or `Pending`, capitalized or lowercase.
    /// Resolves to false for an unknown status or a missing record.
    pub fn set_status(&self, device_id: String, status: &str) -> js_sys::Promise {
        let sync = CloudSync::from_config(self.state.clone());
        let status = serde_json::from_value::<CustomerStatus>(serde_json::Value::String(status.to_string()));
        future_to_promise(async move {
            let updated = match status {
                Ok(status) => sync.set_status(&device_id, status).await,
                Err(e) => {
                    console_warn(&format!("Unknown status: {}", e));
                    false
                }
            };
            Ok(JsValue::from_bool(updated))
        })
    }

    /// Resolves to the device records as a JSON array
    pub fn list_customers(&self) -> js_sys::Promise {
        let sync = CloudSync::from_config(self.state.clone());
        future_to_promise(async move { Ok(JsValue::from_str(&to_json(&sync.list_customers().await))) })
    }

    /// `json` is an array of channels. Resolves to a boolean.
    pub fn upload_channels(&self, json: &str) -> js_sys::Promise {
        let sync = CloudSync::from_config(self.state.clone());
        let channels = serde_json::from_str::<Vec<Channel>>(json);
        future_to_promise(async move {
            let uploaded = match channels {
                Ok(channels) => sync.upload_channels(&channels).await,
                Err(e) => {
                    console_warn(&format!("Rejected channel list: {}", e));
                    false
                }
            };
            Ok(JsValue::from_bool(uploaded))
        })
    }

    /// Call `callback(json)` whenever the record of `device_id` changes
    pub fn watch_device(&self, device_id: &str, callback: js_sys::Function) -> SyncWatch {
        let watch = CloudSync::from_config(self.state.clone()).watch_device(device_id);
        forward_changes(watch.subscribe(), callback);
        SyncWatch {
            handle: Some(WatchHandle::Device(watch)),
        }
    }

    /// Call `callback(json)` with the full device list whenever it changes
    pub fn watch_customers(&self, callback: js_sys::Function) -> SyncWatch {
        let watch = CloudSync::from_config(self.state.clone()).watch_customers();
        forward_changes(watch.subscribe(), callback);
        SyncWatch {
            handle: Some(WatchHandle::Customers(watch)),
        }
    }
}

impl Default for WasmClient {
    fn default() -> Self {
        Self::new()
    }
}
