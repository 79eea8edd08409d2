//! Module/controller/action resolution: deny lists, module bindings, case
//! conversion, the empty-controller fallback, module config overlays, and
//! single-module deployment.

mod common;
mod tracing_util;

use serde_json::json;
use switchyard::{
    App, AppConfig, Body, Controller, Dispatch, Error, ModuleTarget, Request,
};
use tracing_util::TestTracing;

fn module_dispatch(target: ModuleTarget, convert: Option<bool>) -> Dispatch {
    Dispatch::Module {
        target,
        route_vars: Vec::new(),
        convert,
    }
}

#[test]
fn test_unknown_module_is_rejected() {
    let _tracing = TestTracing::init();
    let fx = common::demo_app();
    let mut req = Request::new("/nowhere/user/show");
    let err = fx.app.run(&mut req).unwrap_err();
    assert!(matches!(err, Error::ModuleNotFound(m) if m == "nowhere"));
}

#[test]
fn test_denied_module_is_rejected_even_when_registered() {
    let _tracing = TestTracing::init();
    let mut fx = common::demo_app();
    fx.app
        .controllers_mut()
        .register("common", "controller", "tool", || Controller::new("tool"));
    let mut req = Request::new("/common/tool/index");
    let err = fx.app.run(&mut req).unwrap_err();
    assert!(matches!(err, Error::ModuleNotFound(m) if m == "common"));
}

#[test]
fn test_empty_module_falls_back_to_default() {
    let _tracing = TestTracing::init();
    let fx = common::demo_app();
    let mut req = common::ajax_request("/");
    let res = fx.app.run(&mut req).expect("run");
    // default module/controller/action resolve to index/index/index
    assert_eq!(req.module(), "index");
    assert_eq!(res.body(), &Body::Json(json!("welcome")));
}

#[test]
fn test_bound_module_accepts_only_itself() {
    let _tracing = TestTracing::init();
    let fx = common::demo_app();
    fx.app.bind_module("admin");

    // bound deployments omit the module segment from the URL
    let mut req = common::ajax_request("/user/list");
    let res = fx.app.run(&mut req).expect("run");
    assert_eq!(req.module(), "admin");
    assert_eq!(res.body(), &Body::Json(json!(["alice", "bob"])));
}

#[test]
fn test_auto_bind_follows_entry_script() {
    let _tracing = TestTracing::init();
    let fx = common::demo_app_with(AppConfig {
        auto_bind_module: true,
        ..AppConfig::default()
    });

    // an "admin" entry script with a registered admin module binds it
    let mut req = common::ajax_request("/user/list");
    req.set_entry("admin");
    let res = fx.app.run(&mut req).expect("run");
    assert_eq!(req.module(), "admin");
    assert_eq!(res.body(), &Body::Json(json!(["alice", "bob"])));
}

#[test]
fn test_auto_bind_ignores_default_entry() {
    let _tracing = TestTracing::init();
    let fx = common::demo_app_with(AppConfig {
        auto_bind_module: true,
        ..AppConfig::default()
    });

    // the default "index" entry never auto-binds
    let mut req = common::ajax_request("/index/user/show/id/2");
    let res = fx.app.run(&mut req).expect("run");
    assert_eq!(req.module(), "index");
    assert!(matches!(res.body(), Body::Json(_)));
}

#[test]
fn test_bound_module_rejects_other_modules() {
    let _tracing = TestTracing::init();
    let fx = common::demo_app();
    fx.app.bind_module("admin");
    fx.app.dispatch(module_dispatch(
        ModuleTarget::new("index", "user", "show"),
        None,
    ));
    let mut req = Request::new("/");
    let err = fx.app.run(&mut req).unwrap_err();
    assert!(matches!(err, Error::ModuleNotFound(m) if m == "index"));
}

#[test]
fn test_convert_folds_case_by_default() {
    let _tracing = TestTracing::init();
    let fx = common::demo_app();
    fx.app.dispatch(module_dispatch(
        ModuleTarget::new("Index", "User", "Show"),
        None,
    ));
    let mut req = common::ajax_request("/?id=4");
    let res = fx.app.run(&mut req).expect("run");
    assert_eq!(req.controller(), "User");
    assert_eq!(req.action(), "show");
    assert_eq!(fx.show_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(matches!(res.body(), Body::Json(_)));
}

#[test]
fn test_convert_override_disables_folding() {
    let _tracing = TestTracing::init();
    let fx = common::demo_app();
    // with conversion off the lookup is case-sensitive: "User" is not
    // registered, and neither is an empty controller for this miss in the
    // admin module
    fx.app.dispatch(module_dispatch(
        ModuleTarget::new("admin", "User", "list"),
        Some(false),
    ));
    let mut req = Request::new("/");
    let err = fx.app.run(&mut req).unwrap_err();
    assert!(matches!(err, Error::ControllerNotFound(c) if c == "User"));
}

#[test]
fn test_missing_controller_uses_empty_controller() {
    let _tracing = TestTracing::init();
    let fx = common::demo_app();
    let mut req = common::ajax_request("/index/ghost/save");
    let res = fx.app.run(&mut req).expect("run");
    // the configured empty controller handles the miss; its empty action
    // receives the requested action name
    assert_eq!(res.body(), &Body::Json(json!({ "error_for": "save" })));
}

#[test]
fn test_missing_controller_without_fallback_is_404() {
    let _tracing = TestTracing::init();
    let fx = common::demo_app();
    // the admin module registers no empty controller
    let mut req = Request::new("/admin/ghost/index");
    let err = fx.app.run(&mut req).unwrap_err();
    assert!(matches!(err, Error::ControllerNotFound(ref c) if c == "ghost"));
    assert_eq!(err.status(), 404);
}

#[test]
fn test_missing_action_without_fallback_is_404() {
    let _tracing = TestTracing::init();
    let fx = common::demo_app();
    let mut req = Request::new("/admin/user/ghost");
    let err = fx.app.run(&mut req).unwrap_err();
    assert!(matches!(err, Error::ActionNotFound(a) if a == "user->ghost()"));
}

#[test]
fn test_action_suffix_participates_in_lookup() {
    let _tracing = TestTracing::init();
    let mut app = App::with_config(AppConfig {
        action_suffix: "_action".to_string(),
        ..AppConfig::default()
    });
    app.controllers_mut()
        .register("index", "controller", "job", || {
            Controller::new("job").action("run_action", vec![], |_req, _args| {
                Ok(json!("ran").into())
            })
        });
    app.route(false, false);
    let mut req = common::ajax_request("/index/job/run");
    let res = app.run(&mut req).expect("run");
    assert_eq!(res.body(), &Body::Json(json!("ran")));
}

#[test]
fn test_single_module_deployment() {
    let _tracing = TestTracing::init();
    let mut app = App::with_config(AppConfig {
        app_multi_module: false,
        ..AppConfig::default()
    });
    app.controllers_mut().register("", "controller", "user", || {
        Controller::new("user").action("show", vec![], |_req, _args| {
            Ok(json!("single").into())
        })
    });
    app.route(false, false);
    let mut req = common::ajax_request("/user/show");
    let res = app.run(&mut req).expect("run");
    assert_eq!(req.module(), "");
    assert_eq!(res.body(), &Body::Json(json!("single")));
}

#[test]
fn test_module_config_overlay_applies_and_caches() {
    let _tracing = TestTracing::init();
    let dir = tempfile::tempdir().expect("tempdir");
    let module_dir = dir.path().join("index");
    std::fs::create_dir_all(&module_dir).expect("mkdir");
    let overlay = module_dir.join("config.yaml");
    std::fs::write(&overlay, "default_return_type: json\n").expect("write");

    let mut app = App::new().conf_path(dir.path());
    app.controllers_mut()
        .register("index", "controller", "index", || {
            Controller::new("index").action("index", vec![], |_req, _args| {
                Ok(json!("welcome").into())
            })
        });
    app.route(false, false);

    // not ajax: the module overlay switches the default return type
    let mut req = Request::new("/index/index/index");
    let res = app.run(&mut req).expect("run");
    assert_eq!(res.body(), &Body::Json(json!("welcome")));

    // the overlay is cached: editing the file does not affect later runs
    std::fs::write(&overlay, "default_return_type: text\n").expect("write");
    let mut req = Request::new("/index/index/index");
    let res = app.run(&mut req).expect("run");
    assert_eq!(res.body(), &Body::Json(json!("welcome")));
}

#[test]
fn test_controller_suffix_lookup() {
    let _tracing = TestTracing::init();
    let mut app = App::with_config(AppConfig {
        controller_suffix: true,
        ..AppConfig::default()
    });
    app.controllers_mut()
        .register("index", "controller", "user_controller", || {
            Controller::new("user_controller").action("show", vec![], |_req, _args| {
                Ok(json!("suffixed").into())
            })
        });
    app.route(false, false);
    let mut req = common::ajax_request("/index/user/show");
    let res = app.run(&mut req).expect("run");
    assert_eq!(res.body(), &Body::Json(json!("suffixed")));
}
