//! Typed configuration and the two-level cascade.
//!
//! Process-wide defaults come from [`AppConfig::default`], optionally
//! overridden by a root config file, overridden again per module by a
//! lazily loaded overlay that is cached for the remainder of the process.

mod loader;

pub use loader::{load_config_value, ModuleConfigCache};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// How the binder pulls values from the request when a call supplies none:
/// by name from the param map, or in order from the route variables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlParamType {
    #[default]
    Named,
    Positional,
}

/// Recognized application options.
///
/// Every option can be overridden per module; unknown keys in config files
/// are rejected so typos surface instead of silently falling back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    // application
    pub app_debug: bool,
    pub app_namespace: String,
    pub default_timezone: String,
    pub extra_config_list: Vec<String>,
    pub auto_bind_module: bool,

    // input / language
    pub default_filter: Option<String>,
    pub default_lang: String,
    pub lang_switch_on: bool,

    // request cache gate
    pub request_cache: Option<String>,
    pub request_cache_expire: Option<u64>,
    pub request_cache_except: Vec<String>,

    // modules
    pub app_multi_module: bool,
    pub default_module: String,
    pub deny_module_list: Vec<String>,

    // controllers / actions
    pub url_convert: bool,
    pub default_controller: String,
    pub default_action: String,
    pub action_suffix: String,
    pub empty_controller: String,
    pub url_controller_layer: String,
    pub controller_suffix: bool,

    // routing
    pub url_route_on: bool,
    pub url_route_must: bool,
    pub route_config_file: Vec<String>,
    pub url_domain_deploy: bool,
    pub pathinfo_depr: String,
    pub controller_auto_search: bool,
    pub url_param_type: UrlParamType,

    // output
    pub default_ajax_return: String,
    pub default_return_type: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            app_debug: false,
            app_namespace: "app".to_string(),
            default_timezone: "UTC".to_string(),
            extra_config_list: Vec::new(),
            auto_bind_module: false,
            default_filter: None,
            default_lang: "en-us".to_string(),
            lang_switch_on: false,
            request_cache: None,
            request_cache_expire: None,
            request_cache_except: Vec::new(),
            app_multi_module: true,
            default_module: "index".to_string(),
            deny_module_list: vec!["common".to_string()],
            url_convert: true,
            default_controller: "index".to_string(),
            default_action: "index".to_string(),
            action_suffix: String::new(),
            empty_controller: "error".to_string(),
            url_controller_layer: "controller".to_string(),
            controller_suffix: false,
            url_route_on: true,
            url_route_must: false,
            route_config_file: vec!["route".to_string()],
            url_domain_deploy: false,
            pathinfo_depr: "/".to_string(),
            controller_auto_search: false,
            url_param_type: UrlParamType::Named,
            default_ajax_return: "json".to_string(),
            default_return_type: "html".to_string(),
        }
    }
}

impl AppConfig {
    /// Overlay a loose value on top of this configuration. Top-level keys
    /// replace wholesale; the overlay wins.
    pub fn merged_with(&self, overlay: &Value) -> Result<AppConfig, Error> {
        let mut base = serde_json::to_value(self)
            .map_err(|e| Error::Config(e.to_string()))?;
        if let (Value::Object(base_map), Value::Object(overlay_map)) = (&mut base, overlay) {
            for (k, v) in overlay_map {
                base_map.insert(k.clone(), v.clone());
            }
        } else if !overlay.is_null() {
            return Err(Error::Config("config overlay must be a mapping".to_string()));
        }
        serde_json::from_value(base).map_err(|e| Error::Config(e.to_string()))
    }
}
