//! Hot reload of the configuration document.
//!
//! The watcher observes the document's parent directory (so atomic-rename
//! saves and delete/recreate are seen), coalesces bursts of change
//! notifications with a single resettable timer, and reloads through the
//! [`Loader`]. Reloads are serialized inside the watcher task.
//!
//! ```text
//! Idle --change--> PendingReload --quiet period--> Reloading --ok--> Idle
//!                                                           \--err--> Failed
//! any --file gone at expiry--> Deleted   (left when the file reappears)
//! ```
//!
//! A successful reload swaps the [`LiveConfig`]; a failed one leaves the
//! previous snapshot in effect.

use arc_swap::ArcSwap;
use notify::{EventKind, RecursiveMode, Watcher as _};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::loader::Loader;
use super::types::{Config, LoadOptions};
use crate::error::{ConfigError, ConfigResult, ValidationError};

/// Quiet period used when none is configured.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Capacity of the event and error queues returned by [`Watcher::watch`].
pub const EVENT_QUEUE_CAPACITY: usize = 64;

pub type ReloadCallback = Arc<dyn Fn(Arc<Config>) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&ConfigError) + Send + Sync>;
pub type DeletedCallback = Arc<dyn Fn() + Send + Sync>;

/// The shared, swappable configuration snapshot.
///
/// Readers get an `Arc<Config>` that stays valid and unchanged for as long
/// as they hold it, even across a swap.
#[derive(Clone)]
pub struct LiveConfig(Arc<ArcSwap<Config>>);

impl LiveConfig {
    pub fn new(config: Config) -> Self {
        Self(Arc::new(ArcSwap::from_pointee(config)))
    }

    /// The snapshot currently in effect.
    pub fn load(&self) -> Arc<Config> {
        self.0.load_full()
    }

    pub fn store(&self, config: Arc<Config>) {
        self.0.store(config);
    }
}

impl std::fmt::Debug for LiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("LiveConfig").field(&self.load().loaded_from).finish()
    }
}

/// Watcher state for the observed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    /// A change was seen; the quiet-period timer is running.
    PendingReload,
    Reloading,
    /// The last reload failed; the previous snapshot is still in effect.
    Failed,
    /// The file is gone; nothing is reloaded until it reappears.
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    /// A reload finished, successfully or not.
    ConfigUpdated,
    ConfigDeleted,
}

/// One reload outcome or deletion, in the order they happened.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    /// Set on a successful reload.
    pub new_config: Option<Arc<Config>>,
    /// Warnings from a successful reload.
    pub findings: Vec<ValidationError>,
    /// Set on a failed reload.
    pub error: Option<Arc<ConfigError>>,
}

impl WatchEvent {
    fn updated(config: Arc<Config>, findings: Vec<ValidationError>) -> Self {
        Self {
            kind: WatchEventKind::ConfigUpdated,
            new_config: Some(config),
            findings,
            error: None,
        }
    }

    fn failed(error: Arc<ConfigError>) -> Self {
        Self {
            kind: WatchEventKind::ConfigUpdated,
            new_config: None,
            findings: Vec::new(),
            error: Some(error),
        }
    }

    fn deleted() -> Self {
        Self {
            kind: WatchEventKind::ConfigDeleted,
            new_config: None,
            findings: Vec::new(),
            error: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// What to watch and who to tell.
#[derive(Clone)]
pub struct WatchOptions {
    pub path: PathBuf,
    /// Reused for every reload; `path` is forced to the watched file.
    pub load_options: LoadOptions,
    pub debounce: Duration,
    pub on_reload: Option<ReloadCallback>,
    pub on_error: Option<ErrorCallback>,
    pub on_file_deleted: Option<DeletedCallback>,
}

impl WatchOptions {
    pub fn new(path: impl Into<PathBuf>, load_options: LoadOptions) -> Self {
        let path = path.into();
        let load_options = LoadOptions {
            path: Some(path.clone()),
            ..load_options
        };
        Self {
            path,
            load_options,
            debounce: DEFAULT_DEBOUNCE,
            on_reload: None,
            on_error: None,
            on_file_deleted: None,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn on_reload(mut self, f: impl Fn(Arc<Config>) + Send + Sync + 'static) -> Self {
        self.on_reload = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&ConfigError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_file_deleted(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_file_deleted = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for WatchOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchOptions")
            .field("path", &self.path)
            .field("debounce", &self.debounce)
            .field("on_reload", &self.on_reload.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_file_deleted", &self.on_file_deleted.is_some())
            .finish_non_exhaustive()
    }
}

/// Watches one configuration file and keeps a [`LiveConfig`] current.
pub struct Watcher {
    options: WatchOptions,
    loader: Loader,
    live: LiveConfig,
    state: Arc<watch::Sender<WatchState>>,
    cancel: Mutex<Option<CancellationToken>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Watcher {
    pub fn new(loader: Loader, live: LiveConfig, options: WatchOptions) -> Self {
        let (state, _) = watch::channel(WatchState::Idle);
        Self {
            options,
            loader,
            live,
            state: Arc::new(state),
            cancel: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn live(&self) -> &LiveConfig {
        &self.live
    }

    pub fn state(&self) -> WatchState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<WatchState> {
        self.state.subscribe()
    }

    /// Start observing. Must be called inside a Tokio runtime.
    ///
    /// Returns the reload/deletion event queue and the observation error
    /// queue. Cancelling `ctx` or calling [`stop`](Self::stop) ends the
    /// watch; a reload already running finishes but publishes nothing.
    ///
    /// Both queues hold [`EVENT_QUEUE_CAPACITY`] items. The watcher never
    /// waits on a slow consumer: when a queue is full the new item is
    /// dropped and a warning is logged. Callbacks still run for every
    /// outcome, so `on_error` sees each failure even if its queued copy
    /// was dropped.
    pub fn watch(
        &self,
        ctx: &CancellationToken,
    ) -> ConfigResult<(mpsc::Receiver<WatchEvent>, mpsc::Receiver<ConfigError>)> {
        let mut cancel = self
            .cancel
            .lock()
            .map_err(|_| ConfigError::Watch("watcher lock poisoned".to_string()))?;
        if cancel.as_ref().is_some_and(|token| !token.is_cancelled()) {
            return Err(ConfigError::Watch("already watching".to_string()));
        }

        let path = self.options.path.clone();
        let file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| ConfigError::Watch(format!("not a file path: {}", path.display())))?;
        let dir = watch_dir(&path);

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut backend = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = raw_tx.send(res);
        })?;
        backend.watch(&dir, RecursiveMode::NonRecursive)?;
        info!(path = %path.display(), debounce_ms = self.options.debounce.as_millis() as u64, "Watching config file");

        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let token = ctx.child_token();

        let task = WatchTask {
            path,
            file_name,
            options: self.options.clone(),
            loader: self.loader.clone(),
            live: self.live.clone(),
            state: Arc::clone(&self.state),
            events: event_tx,
            errors: error_tx,
            token: token.clone(),
        };
        let handle = tokio::spawn(task.run(backend, raw_rx));

        *cancel = Some(token);
        if let Ok(mut slot) = self.task.lock() {
            *slot = Some(handle);
        }
        Ok((event_rx, error_rx))
    }

    /// Stop observing. Idempotent; a no-op if never started.
    pub fn stop(&self) {
        if let Ok(cancel) = self.cancel.lock()
            && let Some(token) = cancel.as_ref()
        {
            token.cancel();
        }
    }

    /// Stop and wait for the watcher task (and any in-flight reload) to end.
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self.task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "Config watcher task ended abnormally");
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the background task.
struct WatchTask {
    path: PathBuf,
    file_name: OsString,
    options: WatchOptions,
    loader: Loader,
    live: LiveConfig,
    state: Arc<watch::Sender<WatchState>>,
    events: mpsc::Sender<WatchEvent>,
    errors: mpsc::Sender<ConfigError>,
    token: CancellationToken,
}

impl WatchTask {
    async fn run(
        self,
        backend: notify::RecommendedWatcher,
        mut raw: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    ) {
        // Dropping the backend stops the OS watch.
        let _backend = backend;
        let timer = tokio::time::sleep(self.options.debounce);
        tokio::pin!(timer);
        let mut pending = false;
        let mut deleted = false;

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                received = raw.recv() => match received {
                    None => break,
                    Some(Ok(event)) => {
                        if self.concerns_file(&event) {
                            timer.as_mut().reset(Instant::now() + self.options.debounce);
                            if !pending {
                                pending = true;
                                self.set_state(WatchState::PendingReload);
                            }
                        }
                    }
                    Some(Err(e)) => self.report_backend_error(e.into()),
                },
                _ = &mut timer, if pending => {
                    pending = false;
                    deleted = self.settle(deleted).await;
                }
            }
        }
        debug!(path = %self.path.display(), "Config watcher stopped");
    }

    fn concerns_file(&self, event: &notify::Event) -> bool {
        if matches!(event.kind, EventKind::Access(_)) {
            return false;
        }
        event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(self.file_name.as_os_str()))
    }

    /// The quiet period ended: reload, or record the deletion.
    ///
    /// Returns whether the file is now missing.
    async fn settle(&self, was_deleted: bool) -> bool {
        if !self.path.exists() {
            self.set_state(WatchState::Deleted);
            if !was_deleted && !self.token.is_cancelled() {
                info!(path = %self.path.display(), "Config file deleted, keeping previous config");
                if let Some(cb) = &self.options.on_file_deleted {
                    cb();
                }
                self.publish(WatchEvent::deleted());
            }
            return true;
        }

        self.set_state(WatchState::Reloading);
        let loader = self.loader.clone();
        let load_options = self.options.load_options.clone();
        let outcome = tokio::task::spawn_blocking(move || loader.load(&load_options))
            .await
            .unwrap_or_else(|e| Err(ConfigError::Watch(format!("reload task failed: {}", e))));

        match outcome {
            Ok(resolved) => {
                let config = Arc::new(resolved.config);
                self.live.store(Arc::clone(&config));
                self.set_state(WatchState::Idle);
                info!(
                    path = %self.path.display(),
                    warnings = resolved.findings.len(),
                    "Config reloaded"
                );
                if !self.token.is_cancelled() {
                    if let Some(cb) = &self.options.on_reload {
                        cb(Arc::clone(&config));
                    }
                    self.publish(WatchEvent::updated(config, resolved.findings));
                }
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "Config reload failed, keeping previous config");
                self.set_state(WatchState::Failed);
                if !self.token.is_cancelled() {
                    if let Some(cb) = &self.options.on_error {
                        cb(&err);
                    }
                    self.publish(WatchEvent::failed(Arc::new(err)));
                }
            }
        }
        false
    }

    fn report_backend_error(&self, err: ConfigError) {
        warn!(path = %self.path.display(), error = %err, "Config watch backend error");
        if let Some(cb) = &self.options.on_error {
            cb(&err);
        }
        if let Err(mpsc::error::TrySendError::Full(dropped)) = self.errors.try_send(err) {
            warn!(error = %dropped, "Config watch error queue full, dropping error");
        }
    }

    fn publish(&self, event: WatchEvent) {
        if let Err(mpsc::error::TrySendError::Full(dropped)) = self.events.try_send(event) {
            warn!(
                kind = ?dropped.kind,
                failed = dropped.is_error(),
                "Config watch event queue full, dropping event"
            );
        }
    }

    fn set_state(&self, state: WatchState) {
        self.state.send_replace(state);
    }
}

/// Directory a watched path's events arrive from.
pub fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::{KeychainManager, UnavailableStore};
    use std::collections::HashMap;

    fn loader() -> Loader {
        Loader::new(Arc::new(
            KeychainManager::new(Arc::new(UnavailableStore)).with_env(HashMap::new()),
        ))
    }

    #[test]
    fn test_watch_dir() {
        assert_eq!(watch_dir(Path::new("config.yaml")), PathBuf::from("."));
        assert_eq!(watch_dir(Path::new("/etc/app/config.yaml")), PathBuf::from("/etc/app"));
    }

    #[test]
    fn test_options_force_watched_path() {
        let options = WatchOptions::new("/tmp/app/config.toml", LoadOptions::default());
        assert_eq!(
            options.load_options.path,
            Some(PathBuf::from("/tmp/app/config.toml"))
        );
        assert_eq!(options.debounce, DEFAULT_DEBOUNCE);
    }

    #[test]
    fn test_stop_without_watch_is_noop() {
        let watcher = Watcher::new(
            loader(),
            LiveConfig::new(Config::default()),
            WatchOptions::new("/nonexistent/config.yaml", LoadOptions::default()),
        );
        watcher.stop();
        watcher.stop();
        assert_eq!(watcher.state(), WatchState::Idle);
    }

    #[test]
    fn test_event_constructors() {
        let ok = WatchEvent::updated(Arc::new(Config::default()), Vec::new());
        assert_eq!(ok.kind, WatchEventKind::ConfigUpdated);
        assert!(!ok.is_error());

        let failed = WatchEvent::failed(Arc::new(ConfigError::Watch("x".to_string())));
        assert_eq!(failed.kind, WatchEventKind::ConfigUpdated);
        assert!(failed.new_config.is_none());
        assert!(failed.is_error());

        assert_eq!(WatchEvent::deleted().kind, WatchEventKind::ConfigDeleted);
    }

    #[test]
    fn test_full_queues_drop_without_blocking() {
        let (events, mut event_rx) = mpsc::channel(1);
        let (errors, mut error_rx) = mpsc::channel(1);
        let failures = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&failures);
        let path = PathBuf::from("/tmp/app/config.yaml");
        let task = WatchTask {
            file_name: OsString::from("config.yaml"),
            options: WatchOptions::new(&path, LoadOptions::default()).on_error(move |_| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }),
            path,
            loader: loader(),
            live: LiveConfig::new(Config::default()),
            state: Arc::new(watch::channel(WatchState::Idle).0),
            events,
            errors,
            token: CancellationToken::new(),
        };

        task.publish(WatchEvent::deleted());
        task.publish(WatchEvent::updated(Arc::new(Config::default()), Vec::new()));
        task.report_backend_error(ConfigError::Watch("first".to_string()));
        task.report_backend_error(ConfigError::Watch("second".to_string()));

        assert_eq!(event_rx.try_recv().unwrap().kind, WatchEventKind::ConfigDeleted);
        assert!(event_rx.try_recv().is_err());
        assert!(matches!(error_rx.try_recv(), Ok(ConfigError::Watch(msg)) if msg == "first"));
        assert!(error_rx.try_recv().is_err());
        assert_eq!(failures.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn test_live_config_swap_is_whole() {
        let live = LiveConfig::new(Config::default());
        let mut next = Config::default();
        next.max_concurrent_ops = 9;
        next.ui.compact_mode = true;

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let live = live.clone();
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        let snapshot = live.load();
                        // Both fields change together or not at all.
                        assert_eq!(snapshot.max_concurrent_ops == 9, snapshot.ui.compact_mode);
                    }
                })
            })
            .collect();

        let next = Arc::new(next);
        for i in 0..1_000 {
            if i % 2 == 0 {
                live.store(Arc::clone(&next));
            } else {
                live.store(Arc::new(Config::default()));
            }
        }
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
