use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::binder::{Args, CallableFn, ParamSpec};
use crate::error::Error;
use crate::request::Request;
use crate::response::ReturnValue;

/// A controller instance: a named set of actions plus an optional
/// empty-action fallback.
///
/// Actions are [`CallableFn`]s declared with their parameter shapes at
/// build time; shared state is captured by the factory closure, so clones
/// of an instance share it.
#[derive(Clone)]
pub struct Controller {
    name: String,
    actions: HashMap<String, CallableFn>,
    empty: Option<CallableFn>,
}

impl Controller {
    pub fn new(name: &str) -> Self {
        Controller {
            name: name.to_string(),
            actions: HashMap::new(),
            empty: None,
        }
    }

    /// Declare an action with its parameter list.
    pub fn action<F>(mut self, action: &str, params: Vec<ParamSpec>, f: F) -> Self
    where
        F: Fn(&mut Request, Args) -> Result<ReturnValue, Error> + Send + Sync + 'static,
    {
        let name = format!("{}->{}", self.name, action);
        self.actions
            .insert(action.to_string(), CallableFn::new(&name, params, f));
        self
    }

    /// Declare the empty-action fallback. It is invoked when the requested
    /// action does not exist and receives the originally requested action
    /// name as its only argument.
    pub fn on_empty<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Request, Args) -> Result<ReturnValue, Error> + Send + Sync + 'static,
    {
        let name = format!("{}->_empty", self.name);
        self.empty = Some(CallableFn::new(
            &name,
            vec![ParamSpec::required("name")],
            f,
        ));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_action(&self, action: &str) -> bool {
        self.actions.contains_key(action)
    }

    pub fn lookup(&self, action: &str) -> Option<CallableFn> {
        self.actions.get(action).cloned()
    }

    pub fn empty_action(&self) -> Option<CallableFn> {
        self.empty.clone()
    }
}

pub type ControllerFactory = Arc<dyn Fn() -> Controller + Send + Sync>;

/// Mapping from logical controller names to constructor functions,
/// populated at startup. Also the source of truth for which modules exist.
#[derive(Default)]
pub struct ControllerRegistry {
    modules: HashSet<String>,
    factories: HashMap<String, ControllerFactory>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module with no controllers yet; modules are also
    /// registered implicitly by [`ControllerRegistry::register`].
    pub fn register_module(&mut self, module: &str) {
        self.modules.insert(module.to_string());
    }

    pub fn register<F>(&mut self, module: &str, layer: &str, name: &str, factory: F)
    where
        F: Fn() -> Controller + Send + Sync + 'static,
    {
        self.modules.insert(module.to_string());
        self.factories
            .insert(Self::key(module, layer, name), Arc::new(factory));
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.modules.contains(module)
    }

    pub fn has(&self, module: &str, layer: &str, name: &str) -> bool {
        self.factories.contains_key(&Self::key(module, layer, name))
    }

    /// Whether any registered controller name in the layer starts with
    /// `prefix`; used by controller auto-search for nested layers.
    pub fn has_prefix(&self, module: &str, layer: &str, prefix: &str) -> bool {
        let key_prefix = Self::key(module, layer, prefix);
        self.factories.keys().any(|k| k.starts_with(&key_prefix))
    }

    /// Construct a fresh instance, or `None` for an unregistered name.
    pub fn make(&self, module: &str, layer: &str, name: &str) -> Option<Controller> {
        self.factories
            .get(&Self::key(module, layer, name))
            .map(|factory| factory())
    }

    fn key(module: &str, layer: &str, name: &str) -> String {
        format!("{}/{}/{}", module, layer, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_lookup() {
        let mut registry = ControllerRegistry::new();
        registry.register("index", "controller", "user", || {
            Controller::new("user").action("show", vec![ParamSpec::required("id")], |_, args| {
                Ok(json!({"id": args.value(0)}).into())
            })
        });
        assert!(registry.has_module("index"));
        assert!(!registry.has_module("admin"));
        assert!(registry.has("index", "controller", "user"));
        let instance = registry.make("index", "controller", "user").unwrap();
        assert!(instance.has_action("show"));
        assert!(instance.lookup("missing").is_none());
    }

    #[test]
    fn test_prefix_probe() {
        let mut registry = ControllerRegistry::new();
        registry.register("index", "controller", "admin.user", || {
            Controller::new("admin.user")
        });
        assert!(registry.has_prefix("index", "controller", "admin."));
        assert!(!registry.has_prefix("index", "controller", "blog."));
    }
}
