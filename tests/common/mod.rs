#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use switchyard::{App, AppConfig, Controller, ParamSpec, Request};

/// A bootstrapped application with two modules and a call counter on
/// `index/user::show`.
pub struct Fixture {
    pub app: App,
    pub show_calls: Arc<AtomicUsize>,
}

pub fn demo_app() -> Fixture {
    demo_app_with(AppConfig::default())
}

pub fn demo_app_with(config: AppConfig) -> Fixture {
    let mut app = App::with_config(config);
    let show_calls = Arc::new(AtomicUsize::new(0));

    let calls = show_calls.clone();
    let controllers = app.controllers_mut();
    controllers.register("index", "controller", "user", move || {
        let calls = calls.clone();
        Controller::new("user")
            .action(
                "show",
                vec![ParamSpec::required("id")],
                move |_req, args| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({
                        "controller": "user",
                        "action": "show",
                        "id": args.value(0),
                    })
                    .into())
                },
            )
            .action(
                "read",
                vec![
                    ParamSpec::required("a"),
                    ParamSpec::optional("b", json!(5)),
                ],
                |_req, args| Ok(json!({ "a": args.value(0), "b": args.value(1) }).into()),
            )
    });
    controllers.register("index", "controller", "index", || {
        Controller::new("index").action("index", vec![], |_req, _args| {
            Ok(json!("welcome").into())
        })
    });
    controllers.register("index", "controller", "blog", || {
        Controller::new("blog")
            .action("index", vec![], |_req, _args| Ok(json!("blog home").into()))
            .on_empty(|_req, args| Ok(json!({ "missing": args.str(0) }).into()))
    });
    controllers.register("index", "controller", "error", || {
        Controller::new("error")
            .on_empty(|_req, args| Ok(json!({ "error_for": args.str(0) }).into()))
    });
    controllers.register("admin", "controller", "user", || {
        Controller::new("user").action("list", vec![], |_req, _args| {
            Ok(json!(["alice", "bob"]).into())
        })
    });

    app.route(false, false);
    Fixture { app, show_calls }
}

/// A request that negotiates the JSON return type via the ajax probe.
pub fn ajax_request(path: &str) -> Request {
    let mut req = Request::new(path);
    req.set_header("X-Requested-With", "XMLHttpRequest");
    req
}
