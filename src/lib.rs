//! # switchyard
//!
//! **switchyard** is a request dispatch kernel: given an incoming
//! HTTP-like request it resolves which application code should handle it
//! (URL routing or explicit binding), binds that code's declared
//! parameters from the request, executes it, and normalizes whatever
//! comes back into a response. Fixed lifecycle hooks let external
//! behaviors observe or short-circuit the pipeline.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - **[`app`]** - The top-level dispatcher: common init, the request
//!   lifecycle state machine, dispatch-type branching, normalization
//! - **[`route`]** - Route checking, the `RouteResolver` capability, and
//!   positional segment parsing
//! - **[`module`]** - Module/controller/action resolution with deny-lists,
//!   bindings, and empty-controller/empty-action fallbacks
//! - **[`binder`]** - Declared-parameter binding (typed injection,
//!   positional, named) and uniform invocation
//! - **[`hook`]** - Lifecycle extension points with explicit
//!   continue-or-respond outcomes
//! - **[`config`]** - The two-level configuration cascade (app defaults,
//!   per-module overlays)
//! - **[`cache`]** - Keyed cache connections and the request-level
//!   response cache gate
//! - **[`lang`]** - Language range detection and language packs
//!
//! ## Quick start
//!
//! ```
//! use serde_json::json;
//! use switchyard::{App, Controller, ParamSpec, Request};
//!
//! let mut app = App::new();
//! app.controllers_mut().register("index", "controller", "user", || {
//!     Controller::new("user").action(
//!         "show",
//!         vec![ParamSpec::required("id")],
//!         |_req, args| Ok(json!({ "id": args.value(0) }).into()),
//!     )
//! });
//! app.route(false, false);
//!
//! let mut req = Request::new("/index/user/show/id/7");
//! let res = app.run(&mut req).unwrap();
//! assert_eq!(res.status(), 200);
//! ```
//!
//! ## Request handling flow
//!
//! 1. `init_common` - once per process: root config, `APP_DEBUG` override,
//!    extra config files, `app_init`
//! 2. Module binding - explicit binding wins, else entry-script auto-bind
//! 3. Input filter and language setup
//! 4. Dispatch descriptor - preset via [`App::dispatch`], else route check
//!    with segment-parsing fallback
//! 5. `app_begin`, then the request cache gate (either may short-circuit)
//! 6. Dispatch-type branch: redirect / module / controller / method /
//!    function / response
//! 7. Normalize the return value, store the response cache entry, fire
//!    `app_end`, release request-scoped instances

pub mod app;
pub mod binder;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod hook;
pub mod lang;
pub mod module;
pub mod request;
pub mod response;
pub mod route;

pub use app::App;
pub use binder::{Args, Callable, CallableFn, Injectable, ParamSpec, Params};
pub use config::{AppConfig, UrlParamType};
pub use dispatch::{Dispatch, ModuleTarget};
pub use error::Error;
pub use hook::{HookContext, HookListener, HookOutcome, HookRegistry};
pub use module::{Controller, ControllerRegistry};
pub use request::Request;
pub use response::{Body, Response, ReturnValue};
pub use route::{RouteResolver, RouteRule, RuleResolver};
