//! Dual-tier credential storage
//!
//! Tier A is the transmitted store: a cookie jar that is sent with every request
//! and that the server writes through `Set-Cookie`. Tier B is a client-only
//! key-value store kept as a fallback. Reads prefer Tier A; writes go to both.
//!
//! Both tiers persist as small JSON maps in the data directory. Nothing here is
//! encrypted.

use super::types::{AuthError, SessionTokens, UserProfile};
use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use reqwest::header::HeaderValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;

const COOKIE_FILE: &str = "cookies.json";
const LOCAL_STORAGE_FILE: &str = "local_storage.json";

/// Tier B key of the locale preference. Not a session key.
pub const LOCALE_KEY: &str = "locale";

/// Session values kept in both tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKey {
    AccessToken,
    RefreshToken,
    Profile,
}

impl CredentialKey {
    pub const ALL: [CredentialKey; 3] = [
        CredentialKey::AccessToken,
        CredentialKey::RefreshToken,
        CredentialKey::Profile,
    ];

    /// Name in the transmitted tier (cookie name)
    pub fn cookie_name(self) -> &'static str {
        match self {
            CredentialKey::AccessToken => "accessToken",
            CredentialKey::RefreshToken => "refreshToken",
            CredentialKey::Profile => "user",
        }
    }

    /// Name in the local fallback tier
    pub fn local_key(self) -> &'static str {
        match self {
            CredentialKey::AccessToken => "accessToken",
            CredentialKey::RefreshToken => "refreshToken",
            CredentialKey::Profile => "userData",
        }
    }
}

/// One persistence location
pub trait StorageTier: Send + Sync {
    /// Short name for log lines
    fn name(&self) -> &'static str;

    fn get(&self, key: &str) -> Result<Option<String>, AuthError>;

    fn set(&self, key: &str, value: &str) -> Result<(), AuthError>;

    fn remove(&self, key: &str) -> Result<(), AuthError>;
}

/// String map that optionally writes itself through to a JSON file
struct PersistentMap {
    entries: RwLock<BTreeMap<String, String>>,
    path: Option<PathBuf>,
}

impl PersistentMap {
    fn in_memory() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            path: None,
        }
    }

    fn open(path: PathBuf) -> Self {
        let entries = Self::load(&path);
        Self {
            entries: RwLock::new(entries),
            path: Some(path),
        }
    }

    fn load(path: &Path) -> BTreeMap<String, String> {
        if !path.exists() {
            debug!("{} does not exist yet", path.display());
            return BTreeMap::new();
        }

        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                return BTreeMap::new();
            }
        };

        match serde_json::from_str(&json) {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to parse {} ({}), discarding it", path.display(), e);
                let _ = std::fs::remove_file(path);
                BTreeMap::new()
            }
        }
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), AuthError> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };

        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| AuthError::StorageError(format!("Failed to serialize store: {}", e)))?;

        std::fs::write(path, json).map_err(|e| {
            error!("Failed to write {}: {}", path.display(), e);
            AuthError::StorageError(format!("Failed to write {}: {}", path.display(), e))
        })
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn insert(&self, key: &str, value: &str) -> Result<(), AuthError> {
        let mut entries = self.entries.write();
        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.flush(&entries) {
            match previous {
                Some(previous) => entries.insert(key.to_string(), previous),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        let mut entries = self.entries.write();
        match entries.remove(key) {
            Some(previous) => {
                if let Err(e) = self.flush(&entries) {
                    entries.insert(key.to_string(), previous);
                    return Err(e);
                }
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn snapshot(&self) -> Vec<(String, String)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Encode a value for the cookie boundary
pub fn encode_cookie_value(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Inverse of the server's form encoding: `+` is a space, then percent-decode
pub fn decode_cookie_value(raw: &str) -> Result<String, AuthError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| AuthError::DecodeError(format!("Invalid cookie encoding: {}", e)))
}

/// Parsed `Set-Cookie` header
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SetCookie {
    pub name: String,
    pub value: String,
    pub expired: bool,
}

/// Legacy `Expires` layouts still sent by some servers (`01-Jan-1970`)
const LEGACY_COOKIE_DATE_FORMATS: [&str; 2] =
    ["%a, %d-%b-%Y %H:%M:%S GMT", "%a, %d-%b-%y %H:%M:%S GMT"];

fn parse_cookie_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc2822(value) {
        return Some(at.with_timezone(&Utc));
    }
    LEGACY_COOKIE_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

pub(crate) fn parse_set_cookie(header: &str) -> Option<SetCookie> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let value = value.trim().trim_matches('"');

    let mut expired = false;
    for attr in parts {
        let (attr_name, attr_value) = match attr.split_once('=') {
            Some((n, v)) => (n.trim(), v.trim()),
            None => (attr.trim(), ""),
        };
        if attr_name.eq_ignore_ascii_case("max-age") {
            if let Ok(secs) = attr_value.parse::<i64>() {
                expired = secs <= 0;
            }
        } else if attr_name.eq_ignore_ascii_case("expires") {
            if let Some(at) = parse_cookie_date(attr_value) {
                expired = expired || at <= Utc::now();
            }
        }
    }

    Some(SetCookie {
        name: name.to_string(),
        value: value.to_string(),
        expired,
    })
}

/// Tier A: the cookie jar
///
/// Values are stored exactly as they travel on the wire. `StorageTier::get`
/// decodes them and `StorageTier::set` encodes them. The jar also serves as the
/// HTTP client's cookie provider, so server `Set-Cookie` headers land here.
pub struct CookieTier {
    jar: PersistentMap,
    enabled: AtomicBool,
    origin: Option<Url>,
}

impl CookieTier {
    pub fn in_memory() -> Self {
        Self {
            jar: PersistentMap::in_memory(),
            enabled: AtomicBool::new(true),
            origin: None,
        }
    }

    /// Cookie jar persisted under `dir`
    pub fn open(dir: &Path) -> Self {
        let path = dir.join(COOKIE_FILE);
        info!("Cookie jar: {}", path.display());
        Self {
            jar: PersistentMap::open(path),
            enabled: AtomicBool::new(true),
            origin: None,
        }
    }

    /// Only exchange cookies with this origin's host
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn set_enabled(&self, enabled: bool) {
        if !enabled {
            warn!("Cookies disabled; session data will live in local storage only");
        }
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Value as stored on the wire, without decoding
    pub fn raw(&self, name: &str) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        self.jar.get(name)
    }

    /// Store an already encoded value, the way a server `Set-Cookie` would
    pub fn set_raw(&self, name: &str, raw: &str) -> Result<(), AuthError> {
        self.ensure_enabled()?;
        self.jar.insert(name, raw)
    }

    fn ensure_enabled(&self) -> Result<(), AuthError> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(AuthError::StorageError("Cookies are disabled".to_string()))
        }
    }

    fn matches_origin(&self, url: &Url) -> bool {
        match &self.origin {
            Some(origin) => origin.host_str() == url.host_str(),
            None => true,
        }
    }

    /// `Cookie` header value for outbound requests
    pub fn header_value(&self) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        let pairs = self.jar.snapshot();
        if pairs.is_empty() {
            return None;
        }
        Some(
            pairs
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Apply one `Set-Cookie` header from a response
    pub fn apply_set_cookie(&self, header: &str) {
        if !self.is_enabled() {
            debug!("Ignoring Set-Cookie while cookies are disabled");
            return;
        }
        let cookie = match parse_set_cookie(header) {
            Some(cookie) => cookie,
            None => {
                warn!("Ignoring malformed Set-Cookie header");
                return;
            }
        };

        let result = if cookie.expired || cookie.value.is_empty() {
            debug!("Server removed cookie {}", cookie.name);
            self.jar.remove(&cookie.name)
        } else {
            debug!("Server set cookie {} ({} bytes)", cookie.name, cookie.value.len());
            self.jar.insert(&cookie.name, &cookie.value)
        };

        if let Err(e) = result {
            warn!("Failed to apply Set-Cookie for {}: {}", cookie.name, e);
        }
    }
}

impl StorageTier for CookieTier {
    fn name(&self) -> &'static str {
        "cookie"
    }

    fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        self.raw(key).map(|raw| decode_cookie_value(&raw)).transpose()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        self.set_raw(key, &encode_cookie_value(value))
    }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        // Removal works even while disabled so logout never leaves cookies behind.
        self.jar.remove(key)
    }
}

impl reqwest::cookie::CookieStore for CookieTier {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        if !self.matches_origin(url) {
            return;
        }
        for header in cookie_headers {
            match header.to_str() {
                Ok(header) => self.apply_set_cookie(header),
                Err(_) => warn!("Ignoring non-ASCII Set-Cookie header"),
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        if !self.matches_origin(url) {
            return None;
        }
        self.header_value()
            .and_then(|value| HeaderValue::from_str(&value).ok())
    }
}

/// Tier B: client-only key-value storage
pub struct LocalStorageTier {
    map: PersistentMap,
}

impl LocalStorageTier {
    pub fn in_memory() -> Self {
        Self {
            map: PersistentMap::in_memory(),
        }
    }

    /// Local storage persisted under `dir`
    pub fn open(dir: &Path) -> Self {
        let path = dir.join(LOCAL_STORAGE_FILE);
        info!("Local storage: {}", path.display());
        Self {
            map: PersistentMap::open(path),
        }
    }
}

impl StorageTier for LocalStorageTier {
    fn name(&self) -> &'static str {
        "local"
    }

    fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        Ok(self.map.get(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        self.map.insert(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        self.map.remove(key)
    }
}

/// The one place that knows about tier precedence
#[derive(Clone)]
pub struct CredentialStore {
    transmitted: Arc<dyn StorageTier>,
    local: Arc<dyn StorageTier>,
}

impl CredentialStore {
    pub fn new(transmitted: Arc<dyn StorageTier>, local: Arc<dyn StorageTier>) -> Self {
        Self { transmitted, local }
    }

    /// Both tiers in memory
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(CookieTier::in_memory()),
            Arc::new(LocalStorageTier::in_memory()),
        )
    }

    /// The local fallback tier, for preferences that live next to the session
    pub fn local_tier(&self) -> Arc<dyn StorageTier> {
        Arc::clone(&self.local)
    }

    fn read_tier(tier: &dyn StorageTier, key: &str) -> Option<String> {
        match tier.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!("Unreadable {} value for {} ({}), treating as absent", tier.name(), key, e);
                None
            }
        }
    }

    /// Tier A first, then Tier B. No merge.
    pub fn read(&self, key: CredentialKey) -> Option<String> {
        Self::read_tier(self.transmitted.as_ref(), key.cookie_name())
            .or_else(|| Self::read_tier(self.local.as_ref(), key.local_key()))
    }

    /// Write to both tiers.
    ///
    /// A rejected Tier A write is tolerated as long as Tier B succeeds. Any older
    /// Tier A value is dropped then, since it would shadow the new one on read.
    /// A failed Tier B write rolls Tier A back so the tiers never disagree.
    pub fn write(&self, key: CredentialKey, value: &str) -> Result<(), AuthError> {
        let transmitted = self.transmitted.set(key.cookie_name(), value);
        if let Err(e) = &transmitted {
            warn!(
                "{} tier rejected {} ({}), continuing with {} tier",
                self.transmitted.name(),
                key.cookie_name(),
                e,
                self.local.name()
            );
            if let Err(stale) = self.transmitted.remove(key.cookie_name()) {
                warn!(
                    "Failed to drop stale {} from {} tier: {}",
                    key.cookie_name(),
                    self.transmitted.name(),
                    stale
                );
            }
        }

        if let Err(e) = self.local.set(key.local_key(), value) {
            error!("Failed to write {} to {} tier: {}", key.local_key(), self.local.name(), e);
            if transmitted.is_ok() {
                if let Err(rollback) = self.transmitted.remove(key.cookie_name()) {
                    error!("Rollback of {} failed: {}", key.cookie_name(), rollback);
                }
            }
            return Err(e);
        }

        Ok(())
    }

    /// Remove from both tiers. Both removals are attempted; the first error wins.
    pub fn clear(&self, key: CredentialKey) -> Result<(), AuthError> {
        let transmitted = self.transmitted.remove(key.cookie_name());
        let local = self.local.remove(key.local_key());
        transmitted.and(local)
    }

    /// Remove every session key from both tiers
    pub fn clear_all(&self) -> Result<(), AuthError> {
        let mut first_error = None;
        for key in CredentialKey::ALL {
            if let Err(e) = self.clear(key) {
                error!("Failed to clear {}: {}", key.cookie_name(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                info!("Cleared session data from both tiers");
                Ok(())
            }
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.read(CredentialKey::AccessToken)
            .filter(|token| !token.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(CredentialKey::RefreshToken)
            .filter(|token| !token.is_empty())
    }

    /// Store both tokens, or neither
    pub fn store_tokens(&self, tokens: &SessionTokens) -> Result<(), AuthError> {
        self.write(CredentialKey::AccessToken, &tokens.access_token)?;
        if let Err(e) = self.write(CredentialKey::RefreshToken, &tokens.refresh_token) {
            let _ = self.clear(CredentialKey::AccessToken);
            return Err(e);
        }
        info!(
            "Stored session tokens (access: {} chars, refresh: {} chars)",
            tokens.access_token.len(),
            tokens.refresh_token.len()
        );
        Ok(())
    }

    fn parse_profile(source: &str, json: &str) -> Option<UserProfile> {
        match serde_json::from_str::<UserProfile>(json) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!("Cached profile in {} is not valid ({}), ignoring it", source, e);
                None
            }
        }
    }

    /// Profile from the transmitted tier (`user` cookie)
    pub fn profile_from_transmitted(&self) -> Option<UserProfile> {
        let name = CredentialKey::Profile.cookie_name();
        Self::read_tier(self.transmitted.as_ref(), name)
            .and_then(|json| Self::parse_profile(self.transmitted.name(), &json))
    }

    /// Profile from the local fallback tier (`userData`)
    pub fn profile_from_local(&self) -> Option<UserProfile> {
        let key = CredentialKey::Profile.local_key();
        Self::read_tier(self.local.as_ref(), key)
            .and_then(|json| Self::parse_profile(self.local.name(), &json))
    }

    /// Profile with Tier A precedence
    pub fn read_profile(&self) -> Option<UserProfile> {
        self.profile_from_transmitted()
            .or_else(|| self.profile_from_local())
    }

    pub fn write_profile(&self, profile: &UserProfile) -> Result<(), AuthError> {
        let json = serde_json::to_string(profile)
            .map_err(|e| AuthError::StorageError(format!("Failed to serialize profile: {}", e)))?;
        self.write(CredentialKey::Profile, &json)?;
        debug!("Cached profile for {}", profile.email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::cookie::CookieStore;

    /// Tier whose writes always fail
    struct BrokenTier;

    impl StorageTier for BrokenTier {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn get(&self, _key: &str) -> Result<Option<String>, AuthError> {
            Ok(None)
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), AuthError> {
            Err(AuthError::StorageError("quota exceeded".to_string()))
        }
        fn remove(&self, _key: &str) -> Result<(), AuthError> {
            Ok(())
        }
    }

    /// Tier that keeps what it already holds but rejects new values
    struct ReadOnlyTier {
        entries: parking_lot::Mutex<BTreeMap<String, String>>,
    }

    impl ReadOnlyTier {
        fn holding(key: &str, value: &str) -> Self {
            let mut entries = BTreeMap::new();
            entries.insert(key.to_string(), value.to_string());
            Self {
                entries: parking_lot::Mutex::new(entries),
            }
        }
    }

    impl StorageTier for ReadOnlyTier {
        fn name(&self) -> &'static str {
            "read-only"
        }
        fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
            Ok(self.entries.lock().get(key).cloned())
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), AuthError> {
            Err(AuthError::StorageError("cookies blocked".to_string()))
        }
        fn remove(&self, key: &str) -> Result<(), AuthError> {
            self.entries.lock().remove(key);
            Ok(())
        }
    }

    fn profile(name: &str) -> UserProfile {
        UserProfile {
            id: "7".to_string(),
            name: name.to_string(),
            email: "jane@example.com".to_string(),
            image_url: Some("https://cdn.example.com/j.png".to_string()),
            roles: Some(["user".to_string()].into()),
        }
    }

    fn tiers() -> (Arc<CookieTier>, Arc<LocalStorageTier>, CredentialStore) {
        let cookies = Arc::new(CookieTier::in_memory());
        let local = Arc::new(LocalStorageTier::in_memory());
        let store = CredentialStore::new(cookies.clone(), local.clone());
        (cookies, local, store)
    }

    #[test]
    fn test_cookie_value_encoding_roundtrip_with_plus() {
        let encoded = encode_cookie_value("Jane+Doe {\"a\":1}");
        assert!(!encoded.contains('+'));
        assert_eq!(decode_cookie_value(&encoded).unwrap(), "Jane+Doe {\"a\":1}");
    }

    #[test]
    fn test_decode_form_encoded_space() {
        assert_eq!(decode_cookie_value("Jane+Doe").unwrap(), "Jane Doe");
        assert_eq!(decode_cookie_value("Jane%2BDoe").unwrap(), "Jane+Doe");
    }

    #[test]
    fn test_decode_invalid_utf8_is_decode_error() {
        let err = decode_cookie_value("%FF%FE").unwrap_err();
        assert!(matches!(err, AuthError::DecodeError(_)));
    }

    #[test]
    fn test_profile_roundtrip_preserves_plus_in_name() {
        let (_, _, store) = tiers();
        let original = profile("Jane+Doe");
        store.write_profile(&original).unwrap();
        assert_eq!(store.read_profile(), Some(original.clone()));
        assert_eq!(store.profile_from_transmitted(), Some(original.clone()));
        assert_eq!(store.profile_from_local(), Some(original));
    }

    #[test]
    fn test_server_written_profile_cookie_is_form_decoded() {
        let (cookies, _, store) = tiers();
        let json = r#"{"id":"1","name":"Jane Doe","email":"j@example.com"}"#;
        let form_encoded = encode_cookie_value(json).replace("%20", "+");
        cookies.set_raw("user", &form_encoded).unwrap();

        let loaded = store.profile_from_transmitted().unwrap();
        assert_eq!(loaded.name, "Jane Doe");
    }

    #[test]
    fn test_read_prefers_transmitted_tier() {
        let (cookies, local, store) = tiers();
        cookies.set("accessToken", "from-cookie").unwrap();
        local.set("accessToken", "from-local").unwrap();
        assert_eq!(store.access_token().as_deref(), Some("from-cookie"));
    }

    #[test]
    fn test_read_falls_back_to_local_tier() {
        let (_, local, store) = tiers();
        local.set("accessToken", "from-local").unwrap();
        assert_eq!(store.access_token().as_deref(), Some("from-local"));
    }

    #[test]
    fn test_corrupt_cookie_falls_through_to_local() {
        let (cookies, local, store) = tiers();
        cookies.set_raw("accessToken", "%FF").unwrap();
        local.set("accessToken", "good").unwrap();
        assert_eq!(store.access_token().as_deref(), Some("good"));
    }

    #[test]
    fn test_corrupt_profile_is_absent() {
        let (cookies, local, store) = tiers();
        cookies.set("user", "{not json").unwrap();
        local.set("userData", "also not json").unwrap();
        assert!(store.profile_from_transmitted().is_none());
        assert!(store.profile_from_local().is_none());
        assert!(store.read_profile().is_none());
    }

    #[test]
    fn test_write_goes_to_both_tiers_under_tier_names() {
        let (cookies, local, store) = tiers();
        store.write_profile(&profile("A")).unwrap();
        assert!(cookies.get("user").unwrap().is_some());
        assert!(local.get("userData").unwrap().is_some());
        assert!(local.get("user").unwrap().is_none());
    }

    #[test]
    fn test_disabled_cookies_still_write_local_tier() {
        let (cookies, local, store) = tiers();
        cookies.set_enabled(false);
        store.write(CredentialKey::AccessToken, "tok").unwrap();
        assert_eq!(local.get("accessToken").unwrap().as_deref(), Some("tok"));
        assert_eq!(store.access_token().as_deref(), Some("tok"));

        cookies.set_enabled(true);
        assert!(cookies.get("accessToken").unwrap().is_none());
    }

    #[test]
    fn test_failed_local_write_rolls_back_transmitted_tier() {
        let cookies = Arc::new(CookieTier::in_memory());
        let store = CredentialStore::new(cookies.clone(), Arc::new(BrokenTier));
        let err = store.write(CredentialKey::AccessToken, "tok").unwrap_err();
        assert!(matches!(err, AuthError::StorageError(_)));
        assert!(cookies.get("accessToken").unwrap().is_none());
    }

    #[test]
    fn test_rejected_transmitted_write_drops_stale_value() {
        let transmitted = Arc::new(ReadOnlyTier::holding("accessToken", "OLD"));
        let local = Arc::new(LocalStorageTier::in_memory());
        let store = CredentialStore::new(transmitted.clone(), local.clone());

        store.write(CredentialKey::AccessToken, "NEW").unwrap();

        assert_eq!(store.access_token().as_deref(), Some("NEW"));
        assert!(transmitted.get("accessToken").unwrap().is_none());
        assert_eq!(local.get("accessToken").unwrap().as_deref(), Some("NEW"));
    }

    #[test]
    fn test_store_tokens_writes_pair() {
        let (cookies, local, store) = tiers();
        store
            .store_tokens(&SessionTokens {
                access_token: "a".to_string(),
                refresh_token: "r".to_string(),
            })
            .unwrap();
        assert_eq!(cookies.get("refreshToken").unwrap().as_deref(), Some("r"));
        assert_eq!(local.get("accessToken").unwrap().as_deref(), Some("a"));
        assert_eq!(store.refresh_token().as_deref(), Some("r"));
    }

    #[test]
    fn test_clear_all_keeps_locale() {
        let (cookies, local, store) = tiers();
        store
            .store_tokens(&SessionTokens {
                access_token: "a".to_string(),
                refresh_token: "r".to_string(),
            })
            .unwrap();
        store.write_profile(&profile("A")).unwrap();
        local.set(LOCALE_KEY, "en").unwrap();

        store.clear_all().unwrap();

        for key in CredentialKey::ALL {
            assert!(cookies.get(key.cookie_name()).unwrap().is_none());
            assert!(local.get(key.local_key()).unwrap().is_none());
        }
        assert_eq!(local.get(LOCALE_KEY).unwrap().as_deref(), Some("en"));
    }

    #[test]
    fn test_tiers_persist_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = CredentialStore::new(
                Arc::new(CookieTier::open(dir.path())),
                Arc::new(LocalStorageTier::open(dir.path())),
            );
            store.write_profile(&profile("Jane+Doe")).unwrap();
            store.write(CredentialKey::AccessToken, "tok").unwrap();
        }

        let reopened = CredentialStore::new(
            Arc::new(CookieTier::open(dir.path())),
            Arc::new(LocalStorageTier::open(dir.path())),
        );
        assert_eq!(reopened.access_token().as_deref(), Some("tok"));
        assert_eq!(reopened.read_profile().unwrap().name, "Jane+Doe");
    }

    #[test]
    fn test_corrupt_store_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOCAL_STORAGE_FILE), "garbage").unwrap();
        let local = LocalStorageTier::open(dir.path());
        assert!(local.get("accessToken").unwrap().is_none());
        assert!(!dir.path().join(LOCAL_STORAGE_FILE).exists());
    }

    #[test]
    fn test_parse_set_cookie() {
        let cookie = parse_set_cookie("accessToken=abc.def; Path=/; HttpOnly; Max-Age=3600").unwrap();
        assert_eq!(cookie.name, "accessToken");
        assert_eq!(cookie.value, "abc.def");
        assert!(!cookie.expired);

        let cookie = parse_set_cookie("user=; Path=/; Max-Age=0").unwrap();
        assert!(cookie.expired);

        let cookie =
            parse_set_cookie("refreshToken=x; Expires=Thu, 01 Jan 1970 00:00:00 GMT").unwrap();
        assert!(cookie.expired);

        let cookie =
            parse_set_cookie("refreshToken=x; Expires=Thu, 01-Jan-1970 00:00:00 GMT").unwrap();
        assert!(cookie.expired);

        let cookie =
            parse_set_cookie("refreshToken=x; Expires=Fri, 01-Jan-2100 00:00:00 GMT").unwrap();
        assert!(!cookie.expired);

        let cookie = parse_set_cookie("user=x; Expires=Thu, 01-Jan-70 00:00:00 GMT").unwrap();
        assert!(cookie.expired);

        assert!(parse_set_cookie("no-equals-sign").is_none());
        assert!(parse_set_cookie("=value").is_none());
    }

    #[test]
    fn test_cookie_provider_roundtrip() {
        let origin = Url::parse("http://localhost:8080").unwrap();
        let jar = CookieTier::in_memory().with_origin(origin.clone());

        let set = [
            HeaderValue::from_static("accessToken=tok; Path=/"),
            HeaderValue::from_static("user=%7B%22id%22%3A%221%22%7D; Path=/"),
        ];
        jar.set_cookies(&mut set.iter(), &origin);

        let header = jar.cookies(&origin).unwrap();
        assert_eq!(
            header.to_str().unwrap(),
            "accessToken=tok; user=%7B%22id%22%3A%221%22%7D"
        );
        assert_eq!(jar.get("user").unwrap().as_deref(), Some("{\"id\":\"1\"}"));

        let removal = [HeaderValue::from_static("accessToken=; Max-Age=0")];
        jar.set_cookies(&mut removal.iter(), &origin);
        assert!(jar.get("accessToken").unwrap().is_none());
    }

    #[test]
    fn test_cookie_provider_ignores_foreign_hosts() {
        let origin = Url::parse("http://localhost:8080").unwrap();
        let foreign = Url::parse("https://tracker.example.com").unwrap();
        let jar = CookieTier::in_memory().with_origin(origin);
        jar.set("accessToken", "tok").unwrap();

        assert!(jar.cookies(&foreign).is_none());
        let set = [HeaderValue::from_static("evil=1")];
        jar.set_cookies(&mut set.iter(), &foreign);
        assert!(jar.raw("evil").is_none());
    }

    #[test]
    fn test_disabled_jar_sends_nothing() {
        let jar = CookieTier::in_memory();
        jar.set("accessToken", "tok").unwrap();
        jar.set_enabled(false);
        assert!(jar.header_value().is_none());
        assert!(jar.set("accessToken", "other").is_err());
    }
}
