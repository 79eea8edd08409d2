use http::Method;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::dispatch::{Dispatch, ModuleTarget};
use crate::request::Request;

/// One route definition as it appears in a rule file.
///
/// `rule` uses `:name` placeholders (`pets/:id`); `route` is a
/// `module/controller/action` target, or an absolute URL (containing
/// `://`) for a redirect rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRule {
    pub rule: String,
    pub route: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub vars: Map<String, Value>,
}

/// The route-matching capability the kernel consumes.
pub trait RouteResolver: Send + Sync {
    fn register_rules(&mut self, rules: Vec<RouteRule>);

    /// Map a request path to a dispatch descriptor, or `None` when nothing
    /// matches.
    fn resolve(
        &self,
        req: &Request,
        path: &str,
        depr: &str,
        domain_mode: bool,
    ) -> Option<Dispatch>;
}

struct CompiledRule {
    method: Option<Method>,
    regex: Regex,
    param_names: Vec<String>,
    rule: RouteRule,
}

/// Default resolver: rules compile to anchored regexes at registration
/// time, ordered longest pattern first so overlapping rules prefer the
/// more specific one.
#[derive(Default)]
pub struct RuleResolver {
    compiled: Vec<CompiledRule>,
}

impl RuleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    pub(crate) fn rule_to_regex(rule: &str) -> Option<(Regex, Vec<String>)> {
        let trimmed = rule.trim_matches('/');
        if trimmed.is_empty() {
            return Regex::new("^/$").ok().map(|r| (r, Vec::new()));
        }

        let mut pattern = String::with_capacity(rule.len() + 5);
        pattern.push('^');
        let mut param_names = Vec::new();
        for segment in trimmed.split('/') {
            if let Some(name) = segment.strip_prefix(':') {
                pattern.push_str("/([^/]+)");
                param_names.push(name.to_string());
            } else {
                pattern.push('/');
                pattern.push_str(&regex::escape(segment));
            }
        }
        pattern.push('$');

        match Regex::new(&pattern) {
            Ok(regex) => Some((regex, param_names)),
            Err(err) => {
                warn!(rule = %rule, error = %err, "route rule failed to compile");
                None
            }
        }
    }

    fn build_dispatch(rule: &CompiledRule, vars: Vec<(String, Value)>) -> Dispatch {
        if rule.rule.route.contains("://") {
            return Dispatch::Redirect {
                url: rule.rule.route.clone(),
                status: rule.rule.status.unwrap_or(301),
            };
        }
        Dispatch::Module {
            target: ModuleTarget::parse(&rule.rule.route),
            route_vars: vars,
            convert: None,
        }
    }
}

impl RouteResolver for RuleResolver {
    fn register_rules(&mut self, rules: Vec<RouteRule>) {
        for rule in rules {
            let method = rule
                .method
                .as_deref()
                .and_then(|m| m.to_uppercase().parse::<Method>().ok());
            if let Some((regex, param_names)) = Self::rule_to_regex(&rule.rule) {
                self.compiled.push(CompiledRule {
                    method,
                    regex,
                    param_names,
                    rule,
                });
            }
        }
        self.compiled
            .sort_by(|a, b| b.rule.rule.len().cmp(&a.rule.rule.len()));
    }

    fn resolve(
        &self,
        req: &Request,
        path: &str,
        depr: &str,
        domain_mode: bool,
    ) -> Option<Dispatch> {
        let mut normalized = path.trim_matches('/').to_string();
        if depr != "/" {
            normalized = normalized.replace(depr, "/");
        }
        let normalized = format!("/{}", normalized);

        for compiled in &self.compiled {
            if let Some(method) = &compiled.method {
                if method != req.method() {
                    continue;
                }
            }
            if domain_mode {
                if let Some(domain) = &compiled.rule.domain {
                    if req.header("host") != Some(domain.as_str()) {
                        continue;
                    }
                }
            }
            if let Some(captures) = compiled.regex.captures(&normalized) {
                let mut vars = Vec::with_capacity(compiled.param_names.len());
                for (i, name) in compiled.param_names.iter().enumerate() {
                    if let Some(m) = captures.get(i + 1) {
                        vars.push((name.clone(), Value::String(m.as_str().to_string())));
                    }
                }
                for (k, v) in &compiled.rule.vars {
                    vars.push((k.clone(), v.clone()));
                }
                return Some(Self::build_dispatch(compiled, vars));
            }
        }
        None
    }
}
