//! LSP Client Manager
//!
//! Registry of server configurations and lazily spawned clients, one per
//! configuration, with race-safe startup and a diagnostics relay.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use super::client::{ClientEvent, ClientOptions, LspClient};
use super::launcher::{ProcessLauncher, ServerLauncher};
use super::servers;
use crate::error::ConfigError;
use crate::infra::{lock, read_lock, write_lock};
use crate::models::diagnostic::{FileDiagnostics, PublishedDiagnostics};
use crate::models::lsp::uri_to_path;
use crate::models::server::LanguageServerConfig;

const DIAGNOSTICS_CAPACITY: usize = 1024;

struct CachedClient {
    client: Arc<LspClient>,
    language_id: String,
}

/// State shared with relay tasks
struct Registry {
    configs: RwLock<Vec<LanguageServerConfig>>,
    clients: RwLock<HashMap<String, CachedClient>>,
    spawn_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    relays: Mutex<Vec<JoinHandle<()>>>,
    diagnostics: broadcast::Sender<FileDiagnostics>,
    disposed: AtomicBool,
}

impl Registry {
    fn cached(&self, config_id: &str) -> Option<Arc<LspClient>> {
        read_lock(&self.clients)
            .get(config_id)
            .map(|c| Arc::clone(&c.client))
    }

    /// Language id of the cached client behind `client`, if it is cached
    fn language_of(&self, client: &Weak<LspClient>) -> Option<String> {
        read_lock(&self.clients)
            .values()
            .find(|c| std::ptr::eq(Arc::as_ptr(&c.client), client.as_ptr()))
            .map(|c| c.language_id.clone())
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

pub struct LspClientManager {
    registry: Arc<Registry>,
    launcher: Arc<dyn ServerLauncher>,
    options: ClientOptions,
}

impl Default for LspClientManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LspClientManager {
    /// Manager with the built-in servers, spawning real processes
    pub fn new() -> Self {
        let (diagnostics, _) = broadcast::channel(DIAGNOSTICS_CAPACITY);
        Self {
            registry: Arc::new(Registry {
                configs: RwLock::new(servers::defaults()),
                clients: RwLock::new(HashMap::new()),
                spawn_locks: Mutex::new(HashMap::new()),
                relays: Mutex::new(Vec::new()),
                diagnostics,
                disposed: AtomicBool::new(false),
            }),
            launcher: Arc::new(ProcessLauncher),
            options: ClientOptions::default(),
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn ServerLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    // ========================================================================
    // Configuration registry
    // ========================================================================

    /// Add a configuration, replacing any existing one with the same id
    pub fn register_server(&self, config: LanguageServerConfig) -> Result<(), ConfigError> {
        config.validate()?;

        let mut configs = write_lock(&self.registry.configs);
        match configs.iter_mut().find(|c| c.id == config.id) {
            Some(existing) => {
                tracing::debug!("Replacing server configuration '{}'", config.id);
                *existing = config;
            }
            None => {
                tracing::debug!("Registering server configuration '{}'", config.id);
                configs.push(config);
            }
        }
        Ok(())
    }

    pub fn configs(&self) -> Vec<LanguageServerConfig> {
        read_lock(&self.registry.configs).clone()
    }

    pub fn config(&self, id: &str) -> Option<LanguageServerConfig> {
        read_lock(&self.registry.configs)
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    /// First enabled configuration serving `language_id`
    pub fn config_for_language(&self, language_id: &str) -> Option<LanguageServerConfig> {
        read_lock(&self.registry.configs)
            .iter()
            .find(|c| c.enabled && c.handles_language(language_id))
            .cloned()
    }

    /// First enabled configuration serving `ext` (leading dot optional)
    pub fn config_for_extension(&self, ext: &str) -> Option<LanguageServerConfig> {
        read_lock(&self.registry.configs)
            .iter()
            .find(|c| c.enabled && c.handles_extension(ext))
            .cloned()
    }

    pub fn language_for_extension(&self, ext: &str) -> Option<String> {
        self.config_for_extension(ext)
            .and_then(|c| c.primary_language().map(str::to_string))
    }

    // ========================================================================
    // Clients
    // ========================================================================

    /// Connected client for `language_id`, spawning it on first use
    ///
    /// Concurrent callers for the same configuration share a single spawn.
    /// `None` when no enabled configuration matches or the server failed to
    /// start; a later call retries.
    pub async fn get_client(
        &self,
        language_id: &str,
        workspace_root: &Path,
    ) -> Option<Arc<LspClient>> {
        if self.registry.is_disposed() {
            return None;
        }
        let Some(config) = self.config_for_language(language_id) else {
            tracing::debug!("No enabled language server for '{}'", language_id);
            return None;
        };

        // Fast path: no spawn lock
        if let Some(client) = self.registry.cached(&config.id)
            && client.is_connected()
        {
            return Some(client);
        }

        let spawn_lock = self.spawn_lock(&config.id);
        let _guard = spawn_lock.lock().await;

        if self.registry.is_disposed() {
            return None;
        }
        if let Some(client) = self.registry.cached(&config.id) {
            if client.is_connected() {
                return Some(client);
            }
            tracing::info!(
                "{} language server is no longer connected, restarting",
                config.id
            );
            let stale = write_lock(&self.registry.clients).remove(&config.id);
            if let Some(stale) = stale {
                stale.client.dispose();
            }
        }

        let config_id = config.id.clone();
        let client = Arc::new(LspClient::new(
            config,
            language_id,
            Arc::clone(&self.launcher),
            self.options,
        ));
        self.attach_relay(&client);

        if !client.initialize(workspace_root).await {
            client.dispose();
            return None;
        }

        // dispose() raises the flag before it drains under this lock
        let cached = {
            let mut clients = write_lock(&self.registry.clients);
            if self.registry.is_disposed() {
                false
            } else {
                clients.insert(
                    config_id,
                    CachedClient {
                        client: Arc::clone(&client),
                        language_id: language_id.to_string(),
                    },
                );
                true
            }
        };
        if !cached {
            client.dispose();
            return None;
        }
        Some(client)
    }

    /// Cached, connected client for a file extension; never spawns
    pub fn get_client_for_extension(&self, ext: &str) -> Option<Arc<LspClient>> {
        let config = self.config_for_extension(ext)?;
        self.registry
            .cached(&config.id)
            .filter(|client| client.is_connected())
    }

    pub fn active_clients(&self) -> Vec<(String, Arc<LspClient>)> {
        read_lock(&self.registry.clients)
            .values()
            .map(|c| (c.language_id.clone(), Arc::clone(&c.client)))
            .collect()
    }

    pub fn subscribe_diagnostics(&self) -> broadcast::Receiver<FileDiagnostics> {
        self.registry.diagnostics.subscribe()
    }

    fn spawn_lock(&self, config_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            lock(&self.registry.spawn_locks)
                .entry(config_id.to_string())
                .or_default(),
        )
    }

    fn attach_relay(&self, client: &Arc<LspClient>) {
        let task = tokio::spawn(relay_diagnostics(
            Arc::downgrade(&self.registry),
            Arc::downgrade(client),
            client.subscribe(),
            client.language_id().to_string(),
        ));

        let mut relays = lock(&self.registry.relays);
        relays.retain(|handle| !handle.is_finished());
        relays.push(task);
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Gracefully stop every active client
    pub async fn stop_all(&self) {
        let clients: Vec<CachedClient> = write_lock(&self.registry.clients)
            .drain()
            .map(|(_, cached)| cached)
            .collect();
        if clients.is_empty() {
            return;
        }

        tracing::info!("Stopping {} language servers", clients.len());
        futures::future::join_all(clients.iter().map(|c| c.client.shutdown())).await;

        for cached in clients {
            cached.client.dispose();
        }
    }

    /// Kill every client immediately; the manager is unusable afterwards
    pub fn dispose(&self) {
        if self.registry.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let clients: Vec<CachedClient> = write_lock(&self.registry.clients)
            .drain()
            .map(|(_, cached)| cached)
            .collect();
        for cached in &clients {
            cached.client.dispose();
        }
        for relay in lock(&self.registry.relays).drain(..) {
            relay.abort();
        }
        lock(&self.registry.spawn_locks).clear();

        tracing::debug!("LspClientManager disposed ({} clients)", clients.len());
    }
}

impl Drop for LspClientManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Re-emit a client's diagnostics with file path and language resolved
async fn relay_diagnostics(
    registry: Weak<Registry>,
    client: Weak<LspClient>,
    mut events: broadcast::Receiver<ClientEvent>,
    spawned_for: String,
) {
    loop {
        match events.recv().await {
            Ok(ClientEvent::Diagnostics(published)) => {
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                // Early diagnostics can arrive before the client is cached
                let language_id = registry
                    .language_of(&client)
                    .unwrap_or_else(|| spawned_for.clone());
                let _ = registry
                    .diagnostics
                    .send(file_diagnostics(published, language_id));
            }
            Ok(ClientEvent::Notification { .. }) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(
                    "Diagnostics relay for {} lagged, {} events skipped",
                    spawned_for,
                    skipped
                );
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn file_diagnostics(published: PublishedDiagnostics, language_id: String) -> FileDiagnostics {
    FileDiagnostics {
        file_path: uri_to_path(&published.uri),
        language_id,
        uri: published.uri,
        version: published.version,
        diagnostics: published.diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::infra::lsp::client::SessionState;
    use crate::infra::lsp::testing::{
        FakeLauncher, basiclang_config, publish_diagnostics, wait_until,
    };
    use crate::models::diagnostic::DiagnosticSeverity;
    use crate::models::server::ServerStartInfo;

    fn root() -> PathBuf {
        std::env::temp_dir()
    }

    fn manager(launcher: &Arc<FakeLauncher>) -> LspClientManager {
        let manager = LspClientManager::new().with_launcher(launcher.clone());
        manager.register_server(basiclang_config()).unwrap();
        manager
    }

    fn fakescript_config() -> LanguageServerConfig {
        LanguageServerConfig::new("fakescript", "FakeScript", ServerStartInfo::new("fakescript-ls"))
            .with_languages(["fakescript"])
            .with_extensions([".fks"])
    }

    #[test]
    fn test_builtin_lookups() {
        let manager = LspClientManager::new();

        assert_eq!(manager.config_for_language("python").unwrap().id, "pylsp");
        assert_eq!(manager.config_for_extension("GO").unwrap().id, "gopls");
        assert_eq!(manager.language_for_extension("rs").as_deref(), Some("rust"));
        assert_eq!(
            manager.language_for_extension(".tsx").as_deref(),
            Some("typescript")
        );
        assert!(manager.config_for_language("basiclang").is_none());
        assert!(manager.config("omnisharp").is_some());
    }

    #[test]
    fn test_register_server_upserts_by_id() {
        let manager = LspClientManager::new();
        let before = manager.configs().len();

        manager.register_server(basiclang_config()).unwrap();
        assert_eq!(manager.configs().len(), before + 1);

        let mut replacement = basiclang_config();
        replacement.start = ServerStartInfo::new("basiclang-ls-nightly");
        manager.register_server(replacement).unwrap();

        assert_eq!(manager.configs().len(), before + 1);
        assert_eq!(
            manager.config("basiclang").unwrap().start.command,
            "basiclang-ls-nightly"
        );
        assert_eq!(
            manager.language_for_extension(".BAS").as_deref(),
            Some("basiclang")
        );
    }

    #[test]
    fn test_register_server_rejects_invalid() {
        let manager = LspClientManager::new();
        let invalid = LanguageServerConfig::new("", "", ServerStartInfo::new("x"));
        assert!(matches!(
            manager.register_server(invalid),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_or_disabled_language_spawns_nothing() {
        let launcher = Arc::new(FakeLauncher::new());
        let manager = manager(&launcher);
        manager
            .register_server(fakescript_config().disabled())
            .unwrap();

        assert!(manager.get_client("cobol", &root()).await.is_none());
        assert!(manager.get_client("fakescript", &root()).await.is_none());
        assert_eq!(launcher.launches(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_get_client_spawns_once() {
        let launcher = Arc::new(FakeLauncher::new().launch_delay(Duration::from_millis(50)));
        let manager = manager(&launcher);
        let root = root();

        let clients = futures::future::join_all(
            (0..8).map(|_| manager.get_client("basiclang", &root)),
        )
        .await;

        assert_eq!(launcher.launches(), 1);
        let first = clients[0].clone().unwrap();
        for client in &clients {
            assert!(Arc::ptr_eq(client.as_ref().unwrap(), &first));
        }
        assert_eq!(manager.active_clients().len(), 1);
    }

    #[tokio::test]
    async fn test_extension_lookup_never_spawns() {
        let launcher = Arc::new(FakeLauncher::new());
        let manager = LspClientManager::new().with_launcher(launcher.clone());
        manager
            .register_server(
                LanguageServerConfig::new("gopls", "gopls", ServerStartInfo::new("gopls"))
                    .with_languages(["go"])
                    .with_extensions([".go"]),
            )
            .unwrap();

        assert!(manager.get_client_for_extension(".go").is_none());
        assert_eq!(launcher.launches(), 0);

        let client = manager.get_client("go", &root()).await.unwrap();
        let by_ext = manager.get_client_for_extension("go").unwrap();
        assert!(Arc::ptr_eq(&client, &by_ext));
        assert!(by_ext.is_connected());
    }

    #[tokio::test]
    async fn test_diagnostics_relay() {
        let launcher = Arc::new(FakeLauncher::new().after_initialized(vec![
            publish_diagnostics("file:///a/b.bas", 4, 1, "Undeclared variable 'x'"),
            publish_diagnostics("untitled:Untitled-1", 0, 2, "Unused label"),
        ]));
        let manager = manager(&launcher);
        let mut diagnostics = manager.subscribe_diagnostics();

        manager.get_client("basiclang", &root()).await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), diagnostics.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(first.file_path.ends_with("b.bas"));
        assert_eq!(first.language_id, "basiclang");
        assert_eq!(first.diagnostics.len(), 1);
        assert_eq!(first.diagnostics[0].severity, DiagnosticSeverity::Error);
        assert_eq!(first.diagnostics[0].range.start.line, 4);

        let second = tokio::time::timeout(Duration::from_secs(2), diagnostics.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.file_path, PathBuf::from("untitled:Untitled-1"));
        assert_eq!(second.diagnostics[0].severity, DiagnosticSeverity::Warning);
    }

    #[tokio::test]
    async fn test_failed_spawn_is_not_cached() {
        let launcher = Arc::new(FakeLauncher::failing());
        let manager = manager(&launcher);

        assert!(manager.get_client("basiclang", &root()).await.is_none());
        assert!(manager.active_clients().is_empty());
        assert!(manager.get_client("basiclang", &root()).await.is_none());
        assert_eq!(launcher.launches(), 2);
    }

    #[tokio::test]
    async fn test_disconnected_client_is_replaced() {
        let launcher = Arc::new(FakeLauncher::new());
        let manager = manager(&launcher);

        let first = manager.get_client("basiclang", &root()).await.unwrap();
        first.dispose();
        assert!(manager.get_client_for_extension(".bas").is_none());

        let second = manager.get_client("basiclang", &root()).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.is_connected());
        assert_eq!(launcher.launches(), 2);
        assert_eq!(manager.active_clients().len(), 1);
    }

    #[tokio::test]
    async fn test_dispose_terminates_all_clients() {
        let launcher = Arc::new(FakeLauncher::new());
        let manager = manager(&launcher);
        manager.register_server(fakescript_config()).unwrap();

        let basic = manager.get_client("basiclang", &root()).await.unwrap();
        let fake = manager.get_client("fakescript", &root()).await.unwrap();
        assert_eq!(manager.active_clients().len(), 2);

        manager.dispose();
        assert!(manager.active_clients().is_empty());
        for client in [&basic, &fake] {
            assert_eq!(client.state(), SessionState::Disconnected);
            assert!(!client.is_connected());
        }
        assert!(wait_until(|| launcher.alive() == 0).await);

        manager.dispose();
        assert!(manager.get_client("basiclang", &root()).await.is_none());
        assert_eq!(launcher.launches(), 2);
    }

    #[tokio::test]
    async fn test_dispose_during_spawn_discards_client() {
        let launcher = Arc::new(FakeLauncher::new().launch_delay(Duration::from_millis(100)));
        let manager = manager(&launcher);
        let root = root();

        let (client, ()) = tokio::join!(manager.get_client("basiclang", &root), async {
            assert!(wait_until(|| launcher.launches() == 1).await);
            manager.dispose();
        });

        assert!(client.is_none());
        assert!(manager.active_clients().is_empty());
        assert!(wait_until(|| launcher.alive() == 0).await);
    }

    #[tokio::test]
    async fn test_stop_all_shuts_down_gracefully() {
        let launcher = Arc::new(FakeLauncher::new());
        let manager = manager(&launcher);
        manager.register_server(fakescript_config()).unwrap();

        let basic = manager.get_client("basiclang", &root()).await.unwrap();
        manager.get_client("fakescript", &root()).await.unwrap();

        manager.stop_all().await;
        assert!(manager.active_clients().is_empty());
        assert!(!basic.is_connected());
        let shutdowns = launcher
            .received_methods()
            .iter()
            .filter(|m| *m == "shutdown")
            .count();
        assert_eq!(shutdowns, 2);

        // Not disposed: clients can be spawned again
        assert!(manager.get_client("basiclang", &root()).await.is_some());
        assert_eq!(launcher.launches(), 3);
    }
}
