use std::collections::HashMap;
use std::sync::Arc;

use http::{Extensions, Method};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::config::AppConfig;
use crate::dispatch::Dispatch;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));

/// Remove anything that looks like a markup tag from a resolution name.
pub(crate) fn strip_tags(input: &str) -> String {
    TAG_RE.replace_all(input, "").into_owned()
}

/// Parse query string parameters from a URL path.
///
/// Extracts everything after the `?` character and URL-decodes parameter
/// names and values.
pub fn parse_query_params(path: &str) -> Map<String, Value> {
    if let Some(pos) = path.find('?') {
        let query_str = &path[pos + 1..];
        url::form_urlencoded::parse(query_str.as_bytes())
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    } else {
        Map::new()
    }
}

/// Pending response-cache instruction recorded by the cache gate.
#[derive(Debug, Clone)]
pub(crate) struct CachePlan {
    pub key: String,
    pub expire_secs: u64,
}

/// Mutable, request-scoped state object.
///
/// Created once per incoming call and mutated incrementally as resolution
/// proceeds: the dispatcher and module resolver fill in the active module,
/// controller, action, language set and dispatch descriptor.
#[derive(Debug, Default)]
pub struct Request {
    path: String,
    raw: String,
    method: Method,
    entry: String,
    headers: HashMap<String, String>,
    params: Map<String, Value>,
    route_vars: Vec<(String, Value)>,
    module: String,
    controller: String,
    action: String,
    langset: String,
    filter: Option<String>,
    ajax_override: Option<bool>,
    dispatch: Option<Dispatch>,
    extensions: Extensions,
    cache_plan: Option<CachePlan>,
    active_config: Option<Arc<AppConfig>>,
}

impl Request {
    /// Build a request from a path; a query string, when present, is parsed
    /// into the raw params.
    pub fn new(path: &str) -> Self {
        let params = parse_query_params(path);
        let bare = path.split('?').next().unwrap_or("/").to_string();
        Request {
            path: bare,
            raw: path.to_string(),
            method: Method::GET,
            entry: "index".to_string(),
            params,
            ..Default::default()
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn set_method(&mut self, method: Method) -> &mut Self {
        self.method = method;
        self
    }

    /// Path with the query string stripped.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The original path including any query string.
    pub fn raw_path(&self) -> &str {
        &self.raw
    }

    /// Entry script name, used by module auto-binding.
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn set_entry(&mut self, entry: &str) -> &mut Self {
        self.entry = entry.to_string();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|v| v.as_str())
    }

    /// Header snapshot; keys are stored lowercased.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// A single raw parameter, passed through the active filter.
    pub fn param(&self, name: &str) -> Option<Value> {
        self.params.get(name).map(|v| self.apply_filter(v.clone()))
    }

    /// Raw parameter snapshot, passed through the active filter.
    pub fn params(&self) -> Map<String, Value> {
        self.params
            .iter()
            .map(|(k, v)| (k.clone(), self.apply_filter(v.clone())))
            .collect()
    }

    pub fn set_param(&mut self, name: &str, value: Value) -> &mut Self {
        self.params.insert(name.to_string(), value);
        self
    }

    pub fn merge_params<I>(&mut self, vars: I) -> &mut Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        for (k, v) in vars {
            self.params.insert(k, v);
        }
        self
    }

    /// Ordered route variables produced by route matching or segment parsing.
    pub fn route_vars(&self) -> &[(String, Value)] {
        &self.route_vars
    }

    pub fn merge_route_vars(&mut self, vars: &[(String, Value)]) -> &mut Self {
        for (k, v) in vars {
            self.route_vars.push((k.clone(), v.clone()));
            self.params.insert(k.clone(), v.clone());
        }
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn set_module(&mut self, module: &str) -> &mut Self {
        self.module = module.to_string();
        self
    }

    pub fn controller(&self) -> &str {
        &self.controller
    }

    pub fn set_controller(&mut self, controller: &str) -> &mut Self {
        self.controller = controller.to_string();
        self
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn set_action(&mut self, action: &str) -> &mut Self {
        self.action = action.to_string();
        self
    }

    pub fn langset(&self) -> &str {
        &self.langset
    }

    pub fn set_langset(&mut self, lang: &str) -> &mut Self {
        self.langset = lang.to_string();
        self
    }

    /// Name of the default input filter applied on param access.
    pub fn set_filter(&mut self, filter: Option<String>) -> &mut Self {
        self.filter = filter;
        self
    }

    fn apply_filter(&self, value: Value) -> Value {
        let Some(filter) = &self.filter else {
            return value;
        };
        let Value::String(mut s) = value else {
            return value;
        };
        for name in filter.split(',') {
            match name.trim() {
                "strip_tags" => s = strip_tags(&s),
                "trim" => s = s.trim().to_string(),
                "lower" => s = s.to_lowercase(),
                _ => {}
            }
        }
        Value::String(s)
    }

    /// Whether this looks like an AJAX-style call; an explicit override wins
    /// over the `X-Requested-With` header probe.
    pub fn is_ajax(&self) -> bool {
        if let Some(flag) = self.ajax_override {
            return flag;
        }
        self.header("x-requested-with")
            .map(|v| v.eq_ignore_ascii_case("xmlhttprequest"))
            .unwrap_or(false)
    }

    pub fn set_ajax(&mut self, flag: bool) -> &mut Self {
        self.ajax_override = Some(flag);
        self
    }

    pub fn dispatch(&self) -> Option<&Dispatch> {
        self.dispatch.as_ref()
    }

    pub fn set_dispatch(&mut self, dispatch: Dispatch) -> &mut Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Attach a typed value for injection; a parameter declared with
    /// [`crate::binder::ParamSpec::inject`] receives this exact instance.
    pub fn attach<T: Send + Sync + 'static>(&mut self, value: Arc<T>) -> &mut Self {
        self.extensions.insert(value);
        self
    }

    pub fn attachment<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.extensions.get::<Arc<T>>().cloned()
    }

    /// The module-merged configuration snapshot, set during module
    /// resolution so later pipeline stages see the overlay.
    pub(crate) fn set_active_config(&mut self, config: Arc<AppConfig>) {
        self.active_config = Some(config);
    }

    pub(crate) fn active_config(&self) -> Option<Arc<AppConfig>> {
        self.active_config.clone()
    }

    pub(crate) fn set_cache_plan(&mut self, key: String, expire_secs: u64) {
        self.cache_plan = Some(CachePlan { key, expire_secs });
    }

    pub(crate) fn take_cache_plan(&mut self) -> Option<CachePlan> {
        self.cache_plan.take()
    }
}
