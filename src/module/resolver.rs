use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::warn;

use super::{parse_name, Controller, ControllerRegistry};
use crate::binder::{Invoker, Params};
use crate::cache::{self, Cache};
use crate::config::{AppConfig, ModuleConfigCache};
use crate::dispatch::ModuleTarget;
use crate::error::{Abort, Error};
use crate::hook::{events, HookOutcome, HookRegistry};
use crate::lang::Lang;
use crate::request::{strip_tags, Request};
use crate::response::ReturnValue;

/// Resolves a raw `(module, controller, action)` target into an invoked
/// action, applying the binding/deny-list checks, the module configuration
/// overlay, name normalization, and the empty-controller / empty-action
/// fallbacks.
pub struct ModuleResolver<'a> {
    pub registry: &'a ControllerRegistry,
    pub instances: &'a Mutex<HashMap<String, Controller>>,
    pub hooks: &'a HookRegistry,
    pub config_cache: &'a ModuleConfigCache,
    pub cache: &'a Cache,
    pub lang: &'a Lang,
    pub bound_module: Option<String>,
    pub conf_path: Option<&'a Path>,
    pub debug: bool,
}

impl ModuleResolver<'_> {
    pub fn resolve(
        &self,
        target: &ModuleTarget,
        base_config: &Arc<AppConfig>,
        convert: Option<bool>,
        req: &mut Request,
    ) -> Result<ReturnValue, Abort> {
        let mut config = base_config.clone();

        if config.app_multi_module {
            let requested = target.module.as_deref().unwrap_or("");
            let mut module = strip_tags(requested).to_lowercase();
            if module.is_empty() {
                module = config.default_module.to_lowercase();
            }

            let mut available = false;
            if let Some(bind) = &self.bound_module {
                let bind_module = bind.split('/').next().unwrap_or("").to_string();
                if requested.is_empty() {
                    module = bind_module;
                    available = true;
                } else if module == bind_module {
                    available = true;
                }
            } else if !config.deny_module_list.contains(&module)
                && self.registry.has_module(&module)
            {
                available = true;
            }

            if module.is_empty() || !available {
                return Err(Error::ModuleNotFound(module).into());
            }

            req.set_module(&module);
            config = self
                .config_cache
                .module_config(&module, base_config, self.conf_path)?;
            req.set_active_config(config.clone());

            // the module may reconfigure the request cache
            if let Some(res) = cache::request_cache_check(req, &config, self.cache) {
                return Err(Abort::Respond(res));
            }

            if let Some(conf) = self.conf_path {
                let pack = Lang::pack_file(&conf.join(&module).join("lang"), req.langset());
                if let Err(err) = self.lang.load(&[pack]) {
                    warn!(module = %module, error = %err, "module language pack failed to load");
                }
            }
        } else {
            req.set_module("");
        }

        let convert = convert.unwrap_or(config.url_convert);

        let controller = strip_tags(
            target
                .controller
                .as_deref()
                .unwrap_or(&config.default_controller),
        );
        let controller = if convert {
            controller.to_lowercase()
        } else {
            controller
        };

        let action_name = strip_tags(target.action.as_deref().unwrap_or(&config.default_action));
        let action_name = if convert {
            action_name.to_lowercase()
        } else {
            action_name
        };

        req.set_controller(&parse_name(&controller, true));
        req.set_action(&action_name);

        if let HookOutcome::Respond(res) = self.hooks.fire_request(events::MODULE_INIT, req) {
            return Err(Abort::Respond(res));
        }

        let invoker = Invoker {
            registry: self.registry,
            instances: self.instances,
            config: config.as_ref(),
            debug: self.debug,
        };

        let module = req.module().to_string();
        let instance = match invoker.invoke_constructor(&controller, &module) {
            Ok(instance) => instance,
            Err(Error::ControllerNotFound(_)) => invoker
                .invoke_constructor(&config.empty_controller, &module)
                .map_err(|_| Error::ControllerNotFound(controller.clone()))?,
            Err(err) => return Err(err.into()),
        };

        let action = format!("{}{}", action_name, config.action_suffix);
        let (func, vars) = if let Some(func) = instance.lookup(&action) {
            (func, Params::None)
        } else if let Some(func) = instance.empty_action() {
            // the fallback gets the originally requested action name
            (
                func,
                Params::Positional(vec![Value::String(action_name.clone())]),
            )
        } else {
            return Err(Error::ActionNotFound(format!(
                "{}->{}()",
                instance.name(),
                action
            ))
            .into());
        };

        if let HookOutcome::Respond(res) = self.hooks.fire_request(events::ACTION_BEGIN, req) {
            return Err(Abort::Respond(res));
        }

        invoker.invoke_function(&func, vars, req).map_err(Abort::from)
    }
}
