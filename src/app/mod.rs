//! The top-level dispatcher.
//!
//! [`App`] owns everything the pipeline shares across requests — the
//! configuration cascade, the hook and controller registries, the route
//! resolver, the cache connections — and runs the request lifecycle as one
//! state machine: common init, module binding, language setup, route
//! resolution, hook firing, the request cache gate, dispatch-type
//! branching, and response normalization.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::binder::{Callable, Invoker, Params};
use crate::cache::{self, Cache};
use crate::config::{load_config_value, AppConfig, ModuleConfigCache};
use crate::dispatch::Dispatch;
use crate::error::{Abort, Error};
use crate::hook::{events, HookOutcome, HookRegistry};
use crate::lang::Lang;
use crate::module::{Controller, ControllerRegistry, ModuleResolver};
use crate::request::Request;
use crate::response::{Response, ReturnValue};
use crate::route::{self, RouteContext, RouteResolver, RuleResolver};

/// The application context and request dispatcher.
///
/// Registries are populated during bootstrap through the `&mut` accessors;
/// steady-state request handling goes through [`App::run`] on `&self`.
/// Interior mutability is limited to the cross-request state that must
/// initialize at most once: the init latch, the debug flag, the module
/// config cache, loaded extra files, and route rules.
pub struct App {
    config: RwLock<Arc<AppConfig>>,
    hooks: HookRegistry,
    registry: ControllerRegistry,
    route_resolver: Mutex<Box<dyn RouteResolver>>,
    rules_loaded: AtomicBool,
    module_configs: ModuleConfigCache,
    cache: Cache,
    lang: Lang,
    init: AtomicBool,
    debug: AtomicBool,
    loaded_files: Mutex<HashSet<PathBuf>>,
    namespace: RwLock<String>,
    timezone: RwLock<String>,
    bound_module: RwLock<Option<String>>,
    preset_dispatch: Mutex<Option<Dispatch>>,
    route_override: Mutex<(Option<bool>, Option<bool>)>,
    instances: Mutex<HashMap<String, Controller>>,
    conf_path: Option<PathBuf>,
    runtime_path: Option<PathBuf>,
    root_config_file: Option<PathBuf>,
}

impl Default for App {
    fn default() -> Self {
        Self::with_config(AppConfig::default())
    }
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AppConfig) -> Self {
        App {
            lang: Lang::new(&config.default_lang),
            debug: AtomicBool::new(config.app_debug),
            namespace: RwLock::new(config.app_namespace.clone()),
            timezone: RwLock::new(config.default_timezone.clone()),
            config: RwLock::new(Arc::new(config)),
            hooks: HookRegistry::new(),
            registry: ControllerRegistry::new(),
            route_resolver: Mutex::new(Box::new(RuleResolver::new())),
            rules_loaded: AtomicBool::new(false),
            module_configs: ModuleConfigCache::new(),
            cache: Cache::new(),
            init: AtomicBool::new(false),
            loaded_files: Mutex::new(HashSet::new()),
            bound_module: RwLock::new(None),
            preset_dispatch: Mutex::new(None),
            route_override: Mutex::new((None, None)),
            instances: Mutex::new(HashMap::new()),
            conf_path: None,
            runtime_path: None,
            root_config_file: None,
        }
    }

    /// Directory holding config files, route rule files, and language
    /// packs (`<conf>/<module>/config.yaml`, `<conf>/route.yaml`,
    /// `<conf>/lang/<range>.yaml`).
    pub fn conf_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.conf_path = Some(path.into());
        self
    }

    /// Directory holding compiled artifacts such as the route cache.
    pub fn runtime_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.runtime_path = Some(path.into());
        self
    }

    /// Root configuration file merged over the defaults during common init.
    pub fn root_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.root_config_file = Some(path.into());
        self
    }

    pub fn hooks_mut(&mut self) -> &mut HookRegistry {
        &mut self.hooks
    }

    pub fn controllers_mut(&mut self) -> &mut ControllerRegistry {
        &mut self.registry
    }

    pub fn controllers(&self) -> &ControllerRegistry {
        &self.registry
    }

    /// Replace the default rule resolver with an external implementation.
    pub fn set_route_resolver(&mut self, resolver: Box<dyn RouteResolver>) {
        *self
            .route_resolver
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = resolver;
    }

    pub fn config(&self) -> Arc<AppConfig> {
        self.config
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn lang(&self) -> &Lang {
        &self.lang
    }

    pub fn is_debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    pub fn namespace(&self) -> String {
        self.namespace
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn timezone(&self) -> String {
        self.timezone
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Pin every request to one module, bypassing path-based module
    /// selection. An explicit binding set before `run` wins over
    /// auto-binding.
    pub fn bind_module(&self, module: &str) {
        *self
            .bound_module
            .write()
            .unwrap_or_else(|p| p.into_inner()) = Some(module.to_string());
    }

    pub fn bound_module(&self) -> Option<String> {
        self.bound_module
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Runtime override of the route-matching switches; wins over
    /// `url_route_on` / `url_route_must`.
    pub fn route(&self, enabled: bool, must: bool) {
        *self
            .route_override
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = (Some(enabled), Some(must));
    }

    /// Pre-set the dispatch descriptor for the next `run`, skipping route
    /// checking entirely.
    pub fn dispatch(&self, dispatch: Dispatch) {
        *self
            .preset_dispatch
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = Some(dispatch);
    }

    /// String-keyed programmatic dispatch; unrecognized kinds fail with
    /// [`Error::UnsupportedDispatch`].
    pub fn dispatch_parts(&self, kind: &str, payload: Value) -> Result<(), Error> {
        self.dispatch(Dispatch::from_parts(kind, payload)?);
        Ok(())
    }

    /// Common initialization, performed at most once per process: merge the
    /// root config file, apply the `APP_DEBUG` environment override, merge
    /// each extra config file once, record namespace and timezone, fire
    /// `app_init`.
    pub fn init_common(&self) -> Result<Arc<AppConfig>, Error> {
        if !self.init.swap(true, Ordering::SeqCst) {
            let mut config = (*self.config()).clone();

            if let Some(file) = &self.root_config_file {
                if file.is_file() {
                    let overlay = load_config_value(file)
                        .map_err(|e| Error::Config(format!("{}: {}", file.display(), e)))?;
                    config = config.merged_with(&overlay)?;
                }
            }

            let debug_enabled = match std::env::var("APP_DEBUG") {
                Ok(v) => matches!(v.as_str(), "1" | "true" | "on"),
                Err(_) => config.app_debug,
            };
            self.debug.store(debug_enabled, Ordering::Relaxed);

            let extra = config.extra_config_list.clone();
            for name in extra {
                let Some(conf) = &self.conf_path else { break };
                let file = if name.contains('.') {
                    conf.join(&name)
                } else {
                    conf.join(format!("{}.yaml", name))
                };
                let mut loaded = self
                    .loaded_files
                    .lock()
                    .unwrap_or_else(|p| p.into_inner());
                if file.is_file() && !loaded.contains(&file) {
                    let overlay = load_config_value(&file)
                        .map_err(|e| Error::Config(format!("{}: {}", file.display(), e)))?;
                    config = config.merged_with(&overlay)?;
                    loaded.insert(file);
                }
            }

            *self
                .namespace
                .write()
                .unwrap_or_else(|p| p.into_inner()) = config.app_namespace.clone();
            *self
                .timezone
                .write()
                .unwrap_or_else(|p| p.into_inner()) = config.default_timezone.clone();
            debug!(
                namespace = %config.app_namespace,
                timezone = %config.default_timezone,
                debug = debug_enabled,
                "application initialized"
            );

            *self.config.write().unwrap_or_else(|p| p.into_inner()) = Arc::new(config);

            // no request exists yet, so an app_init short-circuit has
            // nothing to replace
            if let HookOutcome::Respond(_) = self.hooks.fire(events::APP_INIT) {
                debug!("app_init response outcome ignored");
            }
        }
        Ok(self.config())
    }

    /// Explicit reset of the process-lifetime caches: the init latch, the
    /// module config overlays, loaded extra files, and registered route
    /// rules.
    pub fn reset(&self) {
        self.init.store(false, Ordering::SeqCst);
        self.rules_loaded.store(false, Ordering::SeqCst);
        self.module_configs.reset();
        self.loaded_files
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }

    /// Run the full lifecycle for one request.
    ///
    /// Resolution failures (`*NotFound`) propagate as typed errors for the
    /// boundary to render; a hook or cache-gate short-circuit is caught
    /// here and still flows through `app_end`.
    pub fn run(&self, req: &mut Request) -> Result<Response, Error> {
        let config = self.init_common()?;

        {
            let mut bound = self
                .bound_module
                .write()
                .unwrap_or_else(|p| p.into_inner());
            if bound.is_none() && config.auto_bind_module {
                let entry = req.entry().to_string();
                if !entry.is_empty() && entry != "index" && self.registry.has_module(&entry) {
                    *bound = Some(entry);
                }
            }
        }

        req.set_filter(config.default_filter.clone());

        self.lang.set_range(&config.default_lang);
        if config.lang_switch_on {
            self.lang.detect(req);
        }
        req.set_langset(&self.lang.range());
        if let Some(conf) = &self.conf_path {
            let pack = Lang::pack_file(&conf.join("lang"), &self.lang.range());
            if let Err(err) = self.lang.load(&[pack]) {
                warn!(error = %err, "language pack failed to load");
            }
        }

        let result = self.handle(req, &config);
        let mut response = match result {
            Ok(response) => response,
            Err(Abort::Respond(response)) => response,
            Err(Abort::Fail(err)) => {
                self.teardown();
                return Err(err);
            }
        };

        if let HookOutcome::Respond(replacement) =
            self.hooks.fire_response(events::APP_END, req, &mut response)
        {
            response = replacement;
        }

        self.teardown();
        Ok(response)
    }

    fn handle(&self, req: &mut Request, config: &Arc<AppConfig>) -> Result<Response, Abort> {
        let preset = self
            .preset_dispatch
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        let dispatch = match preset {
            Some(dispatch) => dispatch,
            None => {
                let (check_override, must_override) = *self
                    .route_override
                    .lock()
                    .unwrap_or_else(|p| p.into_inner());
                route::check(
                    req,
                    config,
                    &RouteContext {
                        resolver: &self.route_resolver,
                        rules_loaded: &self.rules_loaded,
                        registry: &self.registry,
                        check_override,
                        must_override,
                        bound_module: self.bound_module(),
                        conf_path: self.conf_path.as_deref(),
                        runtime_path: self.runtime_path.as_deref(),
                    },
                )?
            }
        };

        req.set_dispatch(dispatch.clone());

        if self.is_debug() {
            debug!("[ ROUTE ] {:?}", dispatch);
            debug!("[ HEADER ] {:?}", req.headers());
            debug!("[ PARAM ] {:?}", req.params());
        }

        if let HookOutcome::Respond(response) = self.hooks.fire_request(events::APP_BEGIN, req) {
            return Err(Abort::Respond(response));
        }

        if let Some(response) = cache::request_cache_check(req, config, &self.cache) {
            return Err(Abort::Respond(response));
        }

        let data = self.exec(dispatch, config, req)?;
        // module resolution may have merged a config overlay for this
        // request; normalization follows it
        let effective = req.active_config().unwrap_or_else(|| config.clone());
        let response = normalize(data, req, &effective);

        if let Some(plan) = req.take_cache_plan() {
            cache::request_cache_store(&self.cache, &plan.key, plan.expire_secs, &response);
        }

        Ok(response)
    }

    fn exec(
        &self,
        dispatch: Dispatch,
        config: &Arc<AppConfig>,
        req: &mut Request,
    ) -> Result<ReturnValue, Abort> {
        match dispatch {
            Dispatch::Redirect { url, status } => {
                Ok(ReturnValue::Response(Response::redirect(url, status)))
            }
            Dispatch::Module {
                target,
                route_vars,
                convert,
            } => {
                req.merge_route_vars(&route_vars);
                let resolver = ModuleResolver {
                    registry: &self.registry,
                    instances: &self.instances,
                    hooks: &self.hooks,
                    config_cache: &self.module_configs,
                    cache: &self.cache,
                    lang: &self.lang,
                    bound_module: self.bound_module(),
                    conf_path: self.conf_path.as_deref(),
                    debug: self.is_debug(),
                };
                resolver.resolve(&target, config, convert, req)
            }
            Dispatch::Controller { path, route_vars } => {
                let vars = merged_vars(req, &route_vars);
                let (controller, action) = path
                    .rsplit_once('/')
                    .ok_or_else(|| Error::ControllerNotFound(path.clone()))?;
                let callable = Callable::Named {
                    controller: controller.to_string(),
                    action: action.to_string(),
                };
                self.invoker(config)
                    .invoke_method(&callable, Params::Named(vars), req)
                    .map_err(Abort::Fail)
            }
            Dispatch::Method {
                callable,
                route_vars,
            } => {
                let vars = merged_vars(req, &route_vars);
                self.invoker(config)
                    .invoke_method(&callable, Params::Named(vars), req)
                    .map_err(Abort::Fail)
            }
            Dispatch::Function { callable } => self
                .invoker(config)
                .invoke_function(&callable, Params::None, req)
                .map_err(Abort::Fail),
            Dispatch::Response { response } => Ok(ReturnValue::Response(response)),
        }
    }

    fn invoker<'a>(&'a self, config: &'a Arc<AppConfig>) -> Invoker<'a> {
        Invoker {
            registry: &self.registry,
            instances: &self.instances,
            config: config.as_ref(),
            debug: self.is_debug(),
        }
    }

    /// Release the request-scoped controller instances; they may hold
    /// scarce resources, so teardown is explicit rather than left to drop
    /// order.
    fn teardown(&self) {
        self.instances
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }
}

fn merged_vars(req: &Request, route_vars: &[(String, Value)]) -> Map<String, Value> {
    let mut vars = req.params();
    for (k, v) in route_vars {
        vars.insert(k.clone(), v.clone());
    }
    vars
}

fn normalize(data: ReturnValue, req: &Request, config: &AppConfig) -> Response {
    match data {
        ReturnValue::Response(response) => response,
        ReturnValue::Value(Value::Null) | ReturnValue::None => Response::empty(),
        ReturnValue::Value(value) => {
            let kind = if req.is_ajax() {
                config.default_ajax_return.as_str()
            } else {
                config.default_return_type.as_str()
            };
            Response::create(value, kind)
        }
    }
}
