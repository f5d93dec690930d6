//! Playback engine wrapper.
//!
//! Binds a stream URL to a media element, choosing between an adaptive
//! streaming library (hls.js in the browser), the platform's native manifest
//! support, and plain progressive playback. The host forwards media and
//! library callbacks as [`PlayerEvent`]s; the wrapper answers with the
//! recovery action it took.
//!
//! An adaptive session is owned by a [`SessionGuard`] which destroys it exactly
//! once, whether the wrapper re-attaches, detaches or is dropped.

use crate::errors::PlaybackError;

/// MIME type checked for native manifest support
pub const HLS_MIME: &str = "application/vnd.apple.mpegurl";

const MANIFEST_EXTENSIONS: [&str; 2] = [".m3u8", ".m3u"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStrategy {
    /// Segmented manifest driven by the adaptive streaming library
    Adaptive,
    /// Segmented manifest assigned straight to an element that plays it natively
    NativeManifest,
    /// Single file assigned as the element's source
    Progressive,
}

impl PlaybackStrategy {
    pub fn display_name(&self) -> &'static str {
        match self {
            PlaybackStrategy::Adaptive => "Adaptive (HLS library)",
            PlaybackStrategy::NativeManifest => "Native HLS",
            PlaybackStrategy::Progressive => "Progressive",
        }
    }
}

/// Whether `url` looks like a segmented manifest, judged by the extension in
/// its path (query string and fragment ignored)
pub fn is_manifest_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    MANIFEST_EXTENSIONS.iter().any(|ext| path.contains(ext))
}

pub fn select_strategy(url: &str, adaptive_available: bool, native_manifest: bool) -> PlaybackStrategy {
    if adaptive_available && is_manifest_url(url) {
        PlaybackStrategy::Adaptive
    } else if native_manifest {
        PlaybackStrategy::NativeManifest
    } else {
        PlaybackStrategy::Progressive
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttachOptions {
    pub autoplay: bool,
    pub muted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectFit {
    /// Fill the container, cropping the overflow
    Cover,
    /// Letterbox, keeping the whole picture visible
    Contain,
}

impl ObjectFit {
    pub fn css_value(&self) -> &'static str {
        match self {
            ObjectFit::Cover => "cover",
            ObjectFit::Contain => "contain",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presentation {
    pub fit: ObjectFit,
    pub controls: bool,
}

impl Presentation {
    /// Muted players are backgrounds; unmuted ones are the foreground player
    pub fn for_options(options: AttachOptions) -> Self {
        if options.muted {
            Self { fit: ObjectFit::Cover, controls: false }
        } else {
            Self { fit: ObjectFit::Contain, controls: true }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorKind {
    Network,
    Media,
    Other,
}

impl StreamErrorKind {
    /// Map an hls.js `ErrorTypes` value
    pub fn from_hls_type(kind: &str) -> Self {
        match kind {
            "networkError" => StreamErrorKind::Network,
            "mediaError" => StreamErrorKind::Media,
            _ => StreamErrorKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// The adaptive library parsed the manifest
    ManifestParsed,
    /// The element loaded metadata for a directly assigned source
    LoadedMetadata,
    /// A play request was refused by the platform
    PlayRejected(String),
    /// Error reported by the adaptive library
    StreamError {
        kind: StreamErrorKind,
        fatal: bool,
        details: String,
    },
    /// Error reported by the element itself for a directly assigned source
    ElementError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    None,
    RestartLoad,
    RecoverMedia,
    Destroy,
}

/// Recovery policy for adaptive-library errors
pub fn recovery_for(kind: StreamErrorKind, fatal: bool) -> Recovery {
    if !fatal {
        return Recovery::None;
    }
    match kind {
        StreamErrorKind::Network => Recovery::RestartLoad,
        StreamErrorKind::Media => Recovery::RecoverMedia,
        StreamErrorKind::Other => Recovery::Destroy,
    }
}

/// The element video is rendered into
pub trait MediaElement {
    fn set_muted(&mut self, muted: bool);
    fn is_muted(&self) -> bool;
    /// Native support for `mime`
    fn can_play_type(&self, mime: &str) -> bool;
    fn set_source(&mut self, url: &str);
    fn clear_source(&mut self);
    /// Request playback; a refusal comes back later as [`PlayerEvent::PlayRejected`]
    fn play(&mut self);
    fn present(&mut self, presentation: Presentation);
    /// Called first on every attach with the id that later events must carry
    fn bind_session(&mut self, _id: SessionId) {}
}

/// Live adaptive streaming session bound to one URL and one element
pub trait StreamingSession {
    fn start_load(&mut self);
    fn recover_media_error(&mut self);
    fn destroy(&mut self);
}

/// Identifies one attach; events from older sessions carry an older id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// Adaptive streaming library
pub trait StreamingEngine<M: MediaElement> {
    type Session: StreamingSession;

    fn is_supported(&self) -> bool;
    /// Create a session, load `url` and attach it to `media`
    fn open(&self, id: SessionId, url: &str, media: &mut M) -> Self::Session;
}

/// Owns an adaptive session and destroys it exactly once
#[derive(Debug)]
pub struct SessionGuard<S: StreamingSession> {
    id: SessionId,
    session: Option<S>,
}

impl<S: StreamingSession> SessionGuard<S> {
    pub fn new(id: SessionId, session: S) -> Self {
        Self { id, session: Some(session) }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn session_mut(&mut self) -> Option<&mut S> {
        self.session.as_mut()
    }

    pub fn release(mut self) {
        self.destroy_once();
    }

    fn destroy_once(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.destroy();
            tracing::debug!(session = self.id.0, "Destroyed streaming session");
        }
    }
}

impl<S: StreamingSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.destroy_once();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackState {
    Idle,
    /// Source assigned, waiting for manifest or metadata
    Loading,
    /// Loaded; autoplay was off or refused
    Ready,
    /// Play requested
    Playing,
    Failed(PlaybackError),
}

pub struct PlaybackEngine<E, M>
where
    M: MediaElement,
    E: StreamingEngine<M>,
{
    engine: E,
    media: M,
    session: Option<SessionGuard<E::Session>>,
    strategy: Option<PlaybackStrategy>,
    url: Option<String>,
    options: AttachOptions,
    retried_muted: bool,
    next_id: u64,
    current: Option<SessionId>,
    state: PlaybackState,
}

impl<E, M> PlaybackEngine<E, M>
where
    M: MediaElement,
    E: StreamingEngine<M>,
{
    pub fn new(engine: E, media: M) -> Self {
        Self {
            engine,
            media,
            session: None,
            strategy: None,
            url: None,
            options: AttachOptions::default(),
            retried_muted: false,
            next_id: 0,
            current: None,
            state: PlaybackState::Idle,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn strategy(&self) -> Option<PlaybackStrategy> {
        self.strategy
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.current
    }

    pub fn has_streaming_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn media(&self) -> &M {
        &self.media
    }

    pub fn media_mut(&mut self) -> &mut M {
        &mut self.media
    }

    /// Start playing `url`, replacing whatever was attached before
    pub fn attach(&mut self, url: &str, options: AttachOptions) -> SessionId {
        self.teardown();

        self.next_id += 1;
        let id = SessionId(self.next_id);
        self.current = Some(id);
        self.options = options;
        self.retried_muted = false;
        self.url = Some(url.to_string());
        self.media.bind_session(id);

        // mute first so autoplay policies see a muted element
        self.media.set_muted(options.muted);
        self.media.present(Presentation::for_options(options));

        let strategy = select_strategy(url, self.engine.is_supported(), self.media.can_play_type(HLS_MIME));
        self.strategy = Some(strategy);
        tracing::info!(url, strategy = strategy.display_name(), autoplay = options.autoplay, muted = options.muted, "Attaching stream");

        match strategy {
            PlaybackStrategy::Adaptive => {
                let session = self.engine.open(id, url, &mut self.media);
                self.session = Some(SessionGuard::new(id, session));
                self.state = PlaybackState::Loading;
            }
            PlaybackStrategy::NativeManifest => {
                self.media.set_source(url);
                self.state = PlaybackState::Loading;
            }
            PlaybackStrategy::Progressive => {
                self.media.set_source(url);
                if options.autoplay {
                    self.media.play();
                    self.state = PlaybackState::Playing;
                } else {
                    self.state = PlaybackState::Ready;
                }
            }
        }
        id
    }

    /// Release everything bound to the element
    pub fn detach(&mut self) {
        self.teardown();
        self.current = None;
        self.strategy = None;
        self.url = None;
        self.state = PlaybackState::Idle;
    }

    fn teardown(&mut self) {
        if let Some(guard) = self.session.take() {
            guard.release();
        }
        if matches!(
            self.strategy,
            Some(PlaybackStrategy::NativeManifest | PlaybackStrategy::Progressive)
        ) {
            self.media.clear_source();
        }
    }

    /// Route an event that belongs to session `id`; stale events are dropped
    pub fn handle_session_event(&mut self, id: SessionId, event: PlayerEvent) -> Recovery {
        if self.current != Some(id) {
            tracing::debug!(session = id.0, "Ignoring event from a released session");
            return Recovery::None;
        }
        self.handle_event(event)
    }

    /// React to an event for the current attachment
    pub fn handle_event(&mut self, event: PlayerEvent) -> Recovery {
        let Some(strategy) = self.strategy else {
            return Recovery::None;
        };

        match event {
            PlayerEvent::ManifestParsed => {
                if strategy == PlaybackStrategy::Adaptive && self.session.is_some() {
                    self.start_if_autoplay();
                }
                Recovery::None
            }
            PlayerEvent::LoadedMetadata => {
                if strategy == PlaybackStrategy::NativeManifest && self.state == PlaybackState::Loading {
                    self.start_if_autoplay();
                }
                Recovery::None
            }
            PlayerEvent::PlayRejected(reason) => {
                tracing::warn!(reason = %reason, strategy = strategy.display_name(), "Autoplay prevented");
                if strategy == PlaybackStrategy::Adaptive && !self.retried_muted {
                    self.retried_muted = true;
                    self.media.set_muted(true);
                    self.media.play();
                    self.state = PlaybackState::Playing;
                } else {
                    self.state = PlaybackState::Ready;
                }
                Recovery::None
            }
            PlayerEvent::StreamError { kind, fatal, details } => {
                if strategy != PlaybackStrategy::Adaptive {
                    return Recovery::None;
                }
                self.recover(kind, fatal, details)
            }
            PlayerEvent::ElementError(details) => {
                if strategy != PlaybackStrategy::Adaptive {
                    tracing::error!(details = %details, "Media element failed");
                    self.state = PlaybackState::Failed(PlaybackError::Unrecoverable(details));
                }
                Recovery::None
            }
        }
    }

    fn start_if_autoplay(&mut self) {
        if self.options.autoplay {
            self.media.play();
            self.state = PlaybackState::Playing;
        } else {
            self.state = PlaybackState::Ready;
        }
    }

    fn recover(&mut self, kind: StreamErrorKind, fatal: bool, details: String) -> Recovery {
        let recovery = recovery_for(kind, fatal);
        match recovery {
            Recovery::None => {
                tracing::debug!(?kind, details = %details, "Non-fatal stream error");
            }
            Recovery::RestartLoad => {
                tracing::warn!(details = %details, "Fatal network error encountered, trying to recover");
                if let Some(session) = self.session.as_mut().and_then(|g| g.session_mut()) {
                    session.start_load();
                }
            }
            Recovery::RecoverMedia => {
                tracing::warn!(details = %details, "Fatal media error encountered, trying to recover");
                if let Some(session) = self.session.as_mut().and_then(|g| g.session_mut()) {
                    session.recover_media_error();
                }
            }
            Recovery::Destroy => {
                tracing::error!(details = %details, "Fatal stream error, cannot recover");
                if let Some(guard) = self.session.take() {
                    guard.release();
                }
                self.state = PlaybackState::Failed(PlaybackError::Unrecoverable(details));
            }
        }
        recovery
    }
}

impl<E, M> Drop for PlaybackEngine<E, M>
where
    M: MediaElement,
    E: StreamingEngine<M>,
{
    fn drop(&mut self) {
        self.teardown();
    }
}
