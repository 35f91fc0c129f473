//! Server endpoint validation and the persisted endpoint preference.
//!
//! The preferred endpoint is resolved in this order:
//!
//! 1. the value persisted under [`SERVER_URL_KEY`] in a [`PreferenceStore`]
//! 2. the `IMPOSTER_SERVER_URL` environment variable captured at build time
//! 3. [`DEFAULT_SERVER_URL`]

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};
use url::Url;

use crate::error::{Result, SessionError};

/// Key under which the endpoint preference is persisted.
pub const SERVER_URL_KEY: &str = "server_url";

/// Fallback endpoint when nothing is persisted or configured at build time.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5050";

const BUILD_TIME_SERVER_URL: Option<&str> = option_env!("IMPOSTER_SERVER_URL");

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "ws", "wss"];

// ── Endpoint ────────────────────────────────────────────────────────

/// A syntactically valid, absolute server URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(Url);

impl Endpoint {
    /// Validate `raw` (surrounding whitespace is ignored).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidEndpoint`] when the input is empty, is not
    /// an absolute URL, uses a scheme other than http/https/ws/wss, or has no host.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let invalid = |reason: String| SessionError::InvalidEndpoint {
            input: raw.to_string(),
            reason,
        };
        if trimmed.is_empty() {
            return Err(invalid("URL is empty".into()));
        }

        let url = Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;
        if !ALLOWED_SCHEMES.contains(&url.scheme()) {
            return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid("URL has no host".into()));
        }
        Ok(Self(url))
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// The same endpoint with `http`/`https` mapped to `ws`/`wss`.
    pub fn websocket_url(&self) -> Url {
        let mut url = self.0.clone();
        let scheme = match url.scheme() {
            "http" => Some("ws"),
            "https" => Some("wss"),
            _ => None,
        };
        if let Some(scheme) = scheme {
            // http(s) and ws(s) are all "special" schemes, so the swap cannot fail.
            let _ = url.set_scheme(scheme);
        }
        url
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Endpoint {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// ── Preference storage ──────────────────────────────────────────────

/// Minimal key-value persistence for client preferences.
pub trait PreferenceStore: Send + Sync {
    /// Look up `key`. Storage failures read as absent.
    fn get(&self, key: &str) -> Option<String>;

    /// Persist `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value could not be persisted.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// In-process store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| std::io::Error::other("preference store lock poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Stores preferences as a flat JSON object in a single file.
///
/// The file and its parent directory are created on first write.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl PreferenceStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.load() {
            Ok(mut values) => values.remove(key),
            Err(e) => {
                warn!(path = %self.path.display(), "failed to read preferences: {e}");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.load()?;
        values.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&values)?)?;
        debug!(path = %self.path.display(), key, "preference saved");
        Ok(())
    }
}

// ── Endpoint preference ─────────────────────────────────────────────

/// Resolves and persists the preferred server endpoint.
pub struct EndpointPreference {
    store: Box<dyn PreferenceStore>,
    build_default: Option<&'static str>,
}

impl EndpointPreference {
    pub fn new(store: impl PreferenceStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            build_default: BUILD_TIME_SERVER_URL,
        }
    }

    /// Replace the build-time override (mainly for tests and embedding).
    #[must_use]
    pub fn with_build_default(mut self, url: Option<&'static str>) -> Self {
        self.build_default = url;
        self
    }

    /// The endpoint string to pre-fill the connection form with.
    pub fn current(&self) -> String {
        self.store
            .get(SERVER_URL_KEY)
            .filter(|stored| !stored.trim().is_empty())
            .or_else(|| self.build_default.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
    }

    /// [`current`](Self::current), validated.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidEndpoint`] if the resolved value is malformed.
    pub fn resolve(&self) -> Result<Endpoint> {
        Endpoint::parse(&self.current())
    }

    /// Persist `endpoint` as the new preference.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn remember(&self, endpoint: &Endpoint) -> Result<()> {
        self.store.set(SERVER_URL_KEY, endpoint.as_str())
    }
}

impl fmt::Debug for EndpointPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointPreference")
            .field("current", &self.current())
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn parses_lan_address() {
        let endpoint = Endpoint::parse("  http://192.168.1.100:5050 ").unwrap();
        assert_eq!(endpoint.url().port(), Some(5050));
        assert_eq!(endpoint.url().host_str(), Some("192.168.1.100"));
    }

    #[test]
    fn rejects_malformed_input() {
        for raw in ["", "   ", "localhost:5050", "not a url", "/relative", "ftp://host"] {
            let err = Endpoint::parse(raw).unwrap_err();
            assert!(
                matches!(err, SessionError::InvalidEndpoint { .. }),
                "{raw:?} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn websocket_url_maps_scheme() {
        let http = Endpoint::parse("http://example.com:5050/game").unwrap();
        assert_eq!(http.websocket_url().as_str(), "ws://example.com:5050/game");

        let https = Endpoint::parse("https://example.com").unwrap();
        assert_eq!(https.websocket_url().scheme(), "wss");

        let ws = Endpoint::parse("ws://example.com/ws").unwrap();
        assert_eq!(ws.websocket_url().as_str(), "ws://example.com/ws");
    }

    #[test]
    fn preference_falls_back_to_default() {
        let pref = EndpointPreference::new(MemoryStore::new()).with_build_default(None);
        assert_eq!(pref.current(), DEFAULT_SERVER_URL);
    }

    #[test]
    fn preference_prefers_build_default_over_fallback() {
        let pref = EndpointPreference::new(MemoryStore::new())
            .with_build_default(Some("http://10.0.0.2:5050"));
        assert_eq!(pref.current(), "http://10.0.0.2:5050");
    }

    #[test]
    fn persisted_value_wins() {
        let pref = EndpointPreference::new(MemoryStore::new())
            .with_build_default(Some("http://10.0.0.2:5050"));
        let endpoint = Endpoint::parse("http://10.0.0.9:5050").unwrap();
        pref.remember(&endpoint).unwrap();
        assert_eq!(pref.resolve().unwrap(), endpoint);
    }

    #[test]
    fn json_file_store_round_trips() {
        let dir = std::env::temp_dir().join(format!("imposter-pref-{}", uuid::Uuid::new_v4()));
        let store = JsonFileStore::new(dir.join("prefs.json"));
        assert!(store.get(SERVER_URL_KEY).is_none());

        store.set(SERVER_URL_KEY, "http://10.0.0.3:5050").unwrap();
        store.set("other", "value").unwrap();

        let reopened = JsonFileStore::new(dir.join("prefs.json"));
        assert_eq!(
            reopened.get(SERVER_URL_KEY).as_deref(),
            Some("http://10.0.0.3:5050")
        );
        assert_eq!(reopened.get("other").as_deref(), Some("value"));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn poisoned_memory_store_reports_lost_write() {
        let store = MemoryStore::new();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = store.values.lock().unwrap();
            panic!("poison the lock");
        }));
        assert!(store.values.is_poisoned());

        let err = store.set(SERVER_URL_KEY, "http://10.0.0.1:5050").unwrap_err();
        assert!(matches!(err, SessionError::Io(_)));
    }
}
