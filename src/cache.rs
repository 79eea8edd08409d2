use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use http::Method;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::AppConfig;
use crate::request::Request;
use crate::response::{Body, Response};

/// Storage backend for a cache connection.
pub trait CacheDriver: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value, ttl: Option<Duration>);
    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
    fn rm(&self, key: &str);
    fn clear(&self);
}

/// In-process driver with per-entry expiry; the default connection.
#[derive(Default)]
pub struct MemoryDriver {
    store: Mutex<HashMap<String, (Value, Option<Instant>)>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheDriver for MemoryDriver {
    fn get(&self, key: &str) -> Option<Value> {
        let mut store = self.store.lock().unwrap_or_else(|p| p.into_inner());
        match store.get(key) {
            Some((_, Some(deadline))) if *deadline <= Instant::now() => {
                store.remove(key);
                None
            }
            Some((value, _)) => Some(value.clone()),
            None => None,
        }
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let deadline = ttl.map(|d| Instant::now() + d);
        self.store
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key.to_string(), (value, deadline));
    }

    fn rm(&self, key: &str) {
        self.store
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(key);
    }

    fn clear(&self) {
        self.store
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }
}

/// Keyed facade over named cache connections.
///
/// Connections are registered once and shared; first access to a missing
/// `default` connection installs a [`MemoryDriver`] (at-most-once via the
/// entry API).
#[derive(Default)]
pub struct Cache {
    connections: DashMap<String, Arc<dyn CacheDriver>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named connection; the first registration for a name wins.
    pub fn connect(&self, name: &str, driver: Arc<dyn CacheDriver>) -> Arc<dyn CacheDriver> {
        let entry = self.connections.entry(name.to_string()).or_insert(driver);
        Arc::clone(entry.value())
    }

    /// The named connection handle; `default` is created on demand.
    pub fn store(&self, name: &str) -> Option<Arc<dyn CacheDriver>> {
        if name == "default" {
            let entry = self
                .connections
                .entry("default".to_string())
                .or_insert_with(|| Arc::new(MemoryDriver::new()));
            return Some(Arc::clone(entry.value()));
        }
        self.connections.get(name).map(|c| Arc::clone(c.value()))
    }

    fn default_store(&self) -> Arc<dyn CacheDriver> {
        self.store("default").unwrap_or_else(|| Arc::new(MemoryDriver::new()))
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.default_store().get(key)
    }

    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        self.default_store().set(key, value, ttl);
    }

    pub fn has(&self, key: &str) -> bool {
        self.default_store().has(key)
    }

    pub fn rm(&self, key: &str) {
        self.default_store().rm(key);
    }

    /// Fetch a key, computing and storing it on a miss.
    pub fn remember<F>(&self, key: &str, ttl: Option<Duration>, f: F) -> Value
    where
        F: FnOnce() -> Value,
    {
        let store = self.default_store();
        if let Some(found) = store.get(key) {
            return found;
        }
        let value = f();
        store.set(key, value.clone(), ttl);
        value
    }
}

fn digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Build the cache key for a request from the configured pattern.
///
/// `:name` placeholders substitute request params (a missing one disables
/// caching for the request) and `__URL__` substitutes a digest of the full
/// request path.
fn build_key(pattern: &str, req: &Request) -> Option<String> {
    let mut parts = Vec::new();
    for segment in pattern.split('/') {
        if let Some(name) = segment.strip_prefix(':') {
            match req.param(name) {
                Some(Value::String(s)) => parts.push(s),
                Some(v) => parts.push(v.to_string()),
                None => return None,
            }
        } else if segment == "__URL__" {
            parts.push(digest(req.raw_path()));
        } else {
            parts.push(segment.to_string());
        }
    }
    Some(parts.join("/"))
}

/// The request-level response cache gate.
///
/// On a GET with caching configured and the path not excepted, a fresh
/// cached entry short-circuits the pipeline: 304 when the client
/// revalidates with a matching `If-Modified-Since`, else the cached body.
/// On a miss the computed key is remembered on the request so the final
/// response can be stored.
pub(crate) fn request_cache_check(
    req: &mut Request,
    config: &AppConfig,
    cache: &Cache,
) -> Option<Response> {
    let pattern = config.request_cache.as_deref()?;
    if *req.method() != Method::GET {
        return None;
    }
    for except in &config.request_cache_except {
        if req.path().starts_with(except.as_str()) {
            return None;
        }
    }
    let key = build_key(pattern, req)?;
    let expire = config.request_cache_expire.unwrap_or(0);

    if let Some(entry) = cache.get(&key) {
        let mtime = entry.get("mtime").and_then(|v| v.as_u64()).unwrap_or(0);
        if req.header("if-modified-since") == Some(mtime.to_string().as_str()) {
            debug!(key = %key, "request cache revalidated");
            return Some(Response::empty().code(304));
        }
        let content = entry
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let kind = entry
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("html");
        debug!(key = %key, "request cache hit");
        let response = match kind {
            "json" => match serde_json::from_str(&content) {
                Ok(v) => Response::json(v),
                Err(_) => Response::text(content),
            },
            other => Response::create(Value::String(content), other),
        };
        return Some(response.header("Last-Modified", mtime.to_string()));
    }

    req.set_cache_plan(key, expire);
    None
}

/// Store the outgoing response under the key planned by the gate.
pub(crate) fn request_cache_store(cache: &Cache, key: &str, expire_secs: u64, res: &Response) {
    let kind = match res.body() {
        Body::Json(_) => "json",
        Body::Text(_) => "text",
        _ => "html",
    };
    let entry = json!({
        "content": res.render(),
        "type": kind,
        "mtime": now_secs(),
    });
    let ttl = (expire_secs > 0).then(|| Duration::from_secs(expire_secs));
    cache.set(key, entry, ttl);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_driver_ttl() {
        let driver = MemoryDriver::new();
        driver.set("k", json!(1), Some(Duration::from_secs(0)));
        assert_eq!(driver.get("k"), None);
        driver.set("k", json!(2), None);
        assert_eq!(driver.get("k"), Some(json!(2)));
    }

    #[test]
    fn test_remember_computes_once() {
        let cache = Cache::new();
        let first = cache.remember("answer", None, || json!(41));
        let second = cache.remember("answer", None, || json!(0));
        assert_eq!(first, json!(41));
        assert_eq!(second, json!(41));
    }

    #[test]
    fn test_named_connection_first_registration_wins() {
        let cache = Cache::new();
        let a: Arc<dyn CacheDriver> = Arc::new(MemoryDriver::new());
        let first = cache.connect("redis", a);
        first.set("k", json!("v"), None);
        let second = cache.connect("redis", Arc::new(MemoryDriver::new()));
        assert_eq!(second.get("k"), Some(json!("v")));
    }

    #[test]
    fn test_build_key_substitution() {
        let mut req = Request::new("/pets?id=7");
        req.set_param("id", json!("7"));
        assert_eq!(build_key("pets/:id", &req), Some("pets/7".to_string()));
        assert_eq!(build_key("pets/:missing", &req), None);
        assert!(build_key("__URL__", &req).unwrap().len() == 64);
    }
}
