use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use super::{bind, Callable, CallableFn, Params};
use crate::config::AppConfig;
use crate::error::Error;
use crate::module::{Controller, ControllerRegistry};
use crate::request::Request;
use crate::response::ReturnValue;

/// Uniform call surface over functions, bound methods, named controller
/// actions, and controller construction.
///
/// Stateless apart from the borrowed registry and the request-scoped
/// instance cache it fills; side effects are limited to a diagnostic trace
/// when the process debug flag is set and whatever the invoked code does.
pub struct Invoker<'a> {
    pub registry: &'a ControllerRegistry,
    pub instances: &'a Mutex<HashMap<String, Controller>>,
    pub config: &'a AppConfig,
    pub debug: bool,
}

impl Invoker<'_> {
    /// Call a bare function or closure, binding its declared parameters.
    pub fn invoke_function(
        &self,
        f: &CallableFn,
        values: Params,
        req: &mut Request,
    ) -> Result<ReturnValue, Error> {
        let args = bind(f.params(), values, req, self.config.url_param_type)?;
        if self.debug {
            debug!("[ RUN ] {}", f.name());
        }
        f.call(req, args)
    }

    /// Call a method reference. A named target is instantiated through the
    /// controller registry first; its action must exist on the instance.
    pub fn invoke_method(
        &self,
        target: &Callable,
        values: Params,
        req: &mut Request,
    ) -> Result<ReturnValue, Error> {
        match target {
            Callable::Bound(f) => self.invoke_function(f, values, req),
            Callable::Named { controller, action } => {
                let instance = self.invoke_constructor(controller, req.module())?;
                let lookup = format!("{}{}", action, self.config.action_suffix);
                let func = instance.lookup(&lookup).ok_or_else(|| {
                    Error::ActionNotFound(format!("{}->{}()", instance.name(), lookup))
                })?;
                self.invoke_function(&func, values, req)
            }
        }
    }

    /// Construct a controller instance from its registered factory.
    ///
    /// `path` is `controller` or `module/controller`; a bare name resolves
    /// inside `current_module`. Instances are cached for the remainder of
    /// the request and released at teardown.
    pub fn invoke_constructor(
        &self,
        path: &str,
        current_module: &str,
    ) -> Result<Controller, Error> {
        let (module, name) = match path.rsplit_once('/') {
            Some((module, name)) => (module.to_string(), name.to_string()),
            None => (current_module.to_string(), path.to_string()),
        };
        let lookup = crate::module::controller_key(&name, self.config.controller_suffix);
        let layer = &self.config.url_controller_layer;

        let cache_key = format!("{}/{}/{}", module, layer, lookup);
        let mut instances = self
            .instances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(instance) = instances.get(&cache_key) {
            return Ok(instance.clone());
        }

        let instance = self
            .registry
            .make(&module, layer, &lookup)
            .ok_or_else(|| Error::ControllerNotFound(path.to_string()))?;
        instances.insert(cache_key, instance.clone());
        Ok(instance)
    }
}
