use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use tracing::debug;

use super::{RouteResolver, RouteRule};
use crate::config::AppConfig;
use crate::dispatch::{Dispatch, ModuleTarget};
use crate::error::Error;
use crate::module::ControllerRegistry;
use crate::request::Request;

/// Borrowed pieces of the application context the route check needs.
pub struct RouteContext<'a> {
    pub resolver: &'a Mutex<Box<dyn RouteResolver>>,
    pub rules_loaded: &'a AtomicBool,
    pub registry: &'a ControllerRegistry,
    pub check_override: Option<bool>,
    pub must_override: Option<bool>,
    pub bound_module: Option<String>,
    pub conf_path: Option<&'a Path>,
    pub runtime_path: Option<&'a Path>,
}

/// Resolve the request into a dispatch descriptor.
///
/// Route matching runs when the runtime override (else `url_route_on`)
/// says so; an unmatched path fails with [`Error::RouteNotFound`] when
/// "route required" is set, and otherwise falls back to positional
/// segment parsing.
pub fn check(
    req: &Request,
    config: &AppConfig,
    ctx: &RouteContext<'_>,
) -> Result<Dispatch, Error> {
    let path = req.path();
    let depr = config.pathinfo_depr.as_str();

    let enabled = ctx.check_override.unwrap_or(config.url_route_on);
    let mut result = None;
    if enabled {
        if !ctx.rules_loaded.swap(true, Ordering::SeqCst) {
            let rules = load_rules(config, ctx)?;
            if !rules.is_empty() {
                ctx.resolver
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .register_rules(rules);
            }
        }

        result = ctx
            .resolver
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .resolve(req, path, depr, config.url_domain_deploy);

        let must = ctx.must_override.unwrap_or(config.url_route_must);
        if must && result.is_none() {
            return Err(Error::RouteNotFound(path.to_string()));
        }
    }

    match result {
        Some(dispatch) => Ok(dispatch),
        None => Ok(parse_path(
            path,
            depr,
            config,
            ctx.registry,
            ctx.bound_module.as_deref(),
        )),
    }
}

/// Load route rules: the compiled cache file wins over the configured
/// rule files.
fn load_rules(config: &AppConfig, ctx: &RouteContext<'_>) -> Result<Vec<RouteRule>, Error> {
    if let Some(runtime) = ctx.runtime_path {
        let cached = runtime.join("route.json");
        if cached.is_file() {
            let content = std::fs::read_to_string(&cached)?;
            let rules: Vec<RouteRule> = serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("{}: {}", cached.display(), e)))?;
            debug!(file = %cached.display(), rules = rules.len(), "route cache loaded");
            return Ok(rules);
        }
    }

    let mut rules = Vec::new();
    if let Some(conf) = ctx.conf_path {
        for name in &config.route_config_file {
            let file = if name.contains('.') {
                conf.join(name)
            } else {
                conf.join(format!("{}.yaml", name))
            };
            if !file.is_file() {
                continue;
            }
            let loaded = read_rule_file(&file)
                .map_err(|e| Error::Config(format!("{}: {}", file.display(), e)))?;
            debug!(file = %file.display(), rules = loaded.len(), "route rules loaded");
            rules.extend(loaded);
        }
    }
    Ok(rules)
}

fn read_rule_file(file: &PathBuf) -> anyhow::Result<Vec<RouteRule>> {
    let content = std::fs::read_to_string(file)?;
    let rules = if file.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };
    Ok(rules)
}

/// Positional segment parsing, the fallback when routing is disabled or
/// unmatched: `(module,) controller, action, ...name/value pairs`. An
/// active module binding is prepended, so bound applications do not carry
/// the module segment in their URLs.
pub fn parse_path(
    path: &str,
    depr: &str,
    config: &AppConfig,
    registry: &ControllerRegistry,
    bound_module: Option<&str>,
) -> Dispatch {
    let mut normalized = path.trim_matches('/').to_string();
    if depr != "/" {
        normalized = normalized.replace(depr, "/");
    }
    if let Some(bind) = bound_module {
        normalized = format!("{}/{}", bind.trim_matches('/'), normalized);
    }
    let mut segments: VecDeque<String> = normalized
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();

    let module = if config.app_multi_module {
        segments.pop_front()
    } else {
        None
    };

    let mut controller = segments.pop_front();
    if config.controller_auto_search {
        if let Some(name) = &controller {
            let probe_module = module
                .as_deref()
                .unwrap_or(&config.default_module)
                .to_lowercase();
            let layer = &config.url_controller_layer;
            if !registry.has(&probe_module, layer, name)
                && registry.has_prefix(&probe_module, layer, &format!("{}.", name))
            {
                if let Some(sub) = segments.pop_front() {
                    controller = Some(format!("{}.{}", name, sub));
                }
            }
        }
    }

    let action = segments.pop_front();

    let mut route_vars = Vec::new();
    while let Some(name) = segments.pop_front() {
        match segments.pop_front() {
            Some(value) => route_vars.push((name, Value::String(value))),
            // a trailing unpaired segment is dropped
            None => break,
        }
    }

    Dispatch::Module {
        target: ModuleTarget {
            module,
            controller,
            action,
        },
        route_vars,
        convert: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_path_full_triple_with_pairs() {
        let config = AppConfig::default();
        let registry = ControllerRegistry::new();
        match parse_path("/index/user/show/id/7", "/", &config, &registry, None) {
            Dispatch::Module {
                target, route_vars, ..
            } => {
                assert_eq!(target.module.as_deref(), Some("index"));
                assert_eq!(target.controller.as_deref(), Some("user"));
                assert_eq!(target.action.as_deref(), Some("show"));
                assert_eq!(route_vars, vec![("id".to_string(), json!("7"))]);
            }
            other => panic!("unexpected dispatch: {other:?}"),
        }
    }

    #[test]
    fn test_parse_path_custom_delimiter() {
        let config = AppConfig {
            pathinfo_depr: "-".to_string(),
            ..AppConfig::default()
        };
        let registry = ControllerRegistry::new();
        match parse_path("/index-blog-read", "-", &config, &registry, None) {
            Dispatch::Module { target, .. } => {
                assert_eq!(target.controller.as_deref(), Some("blog"));
                assert_eq!(target.action.as_deref(), Some("read"));
            }
            other => panic!("unexpected dispatch: {other:?}"),
        }
    }

    #[test]
    fn test_parse_path_single_module() {
        let config = AppConfig {
            app_multi_module: false,
            ..AppConfig::default()
        };
        let registry = ControllerRegistry::new();
        match parse_path("/user/show", "/", &config, &registry, None) {
            Dispatch::Module { target, .. } => {
                assert_eq!(target.module, None);
                assert_eq!(target.controller.as_deref(), Some("user"));
                assert_eq!(target.action.as_deref(), Some("show"));
            }
            other => panic!("unexpected dispatch: {other:?}"),
        }
    }

    #[test]
    fn test_parse_path_empty_defaults() {
        let config = AppConfig::default();
        let registry = ControllerRegistry::new();
        match parse_path("/", "/", &config, &registry, None) {
            Dispatch::Module { target, .. } => {
                assert_eq!(target, ModuleTarget::default());
            }
            other => panic!("unexpected dispatch: {other:?}"),
        }
    }
}
