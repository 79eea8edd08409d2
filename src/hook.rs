use std::collections::HashMap;
use std::sync::Arc;

use crate::request::Request;
use crate::response::Response;

/// Well-known lifecycle events fired by the dispatcher.
pub mod events {
    pub const APP_INIT: &str = "app_init";
    pub const APP_BEGIN: &str = "app_begin";
    pub const MODULE_INIT: &str = "module_init";
    pub const ACTION_BEGIN: &str = "action_begin";
    pub const APP_END: &str = "app_end";
}

/// What a listener decided: let the pipeline continue, or short-circuit the
/// remaining stages with a finished response.
#[derive(Debug)]
pub enum HookOutcome {
    Continue,
    Respond(Response),
}

/// What a listener sees. The request slot is empty for `app_init` (no
/// request is in flight yet); the response slot is populated only for the
/// `app_end` event.
pub struct HookContext<'a> {
    pub event: &'a str,
    pub request: Option<&'a mut Request>,
    pub response: Option<&'a mut Response>,
}

pub trait HookListener: Send + Sync {
    fn handle(&self, ctx: &mut HookContext<'_>) -> HookOutcome;
}

impl<F> HookListener for F
where
    F: for<'a, 'b> Fn(&'a mut HookContext<'b>) -> HookOutcome + Send + Sync,
{
    fn handle(&self, ctx: &mut HookContext<'_>) -> HookOutcome {
        self(ctx)
    }
}

/// Process-wide mapping from event name to an ordered listener sequence.
///
/// Listeners run in registration order; the first `Respond` outcome stops
/// the remaining listeners and is returned to the pipeline. Registration
/// happens during bootstrap (`&mut`), firing under traffic takes `&self`.
#[derive(Default)]
pub struct HookRegistry {
    listeners: HashMap<String, Vec<Arc<dyn HookListener>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, event: &str, listener: impl HookListener + 'static) {
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push(Arc::new(listener));
    }

    pub fn has(&self, event: &str) -> bool {
        self.listeners
            .get(event)
            .map(|l| !l.is_empty())
            .unwrap_or(false)
    }

    /// Fire an event with no request in flight (`app_init`).
    pub fn fire(&self, event: &str) -> HookOutcome {
        self.fire_inner(event, None, None)
    }

    /// Fire a request-stage event.
    pub fn fire_request(&self, event: &str, req: &mut Request) -> HookOutcome {
        self.fire_inner(event, Some(req), None)
    }

    /// Fire a response-stage event (`app_end`); listeners may inspect or
    /// replace the outgoing response.
    pub fn fire_response(
        &self,
        event: &str,
        req: &mut Request,
        res: &mut Response,
    ) -> HookOutcome {
        self.fire_inner(event, Some(req), Some(res))
    }

    fn fire_inner(
        &self,
        event: &str,
        mut req: Option<&mut Request>,
        mut res: Option<&mut Response>,
    ) -> HookOutcome {
        let Some(listeners) = self.listeners.get(event) else {
            return HookOutcome::Continue;
        };
        for listener in listeners {
            let mut ctx = HookContext {
                event,
                request: req.as_deref_mut(),
                response: res.as_deref_mut(),
            };
            if let HookOutcome::Respond(response) = listener.handle(&mut ctx) {
                return HookOutcome::Respond(response);
            }
        }
        HookOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_listeners_run_in_registration_order() {
        static SEEN: AtomicUsize = AtomicUsize::new(0);
        let mut hooks = HookRegistry::new();
        hooks.add(events::APP_BEGIN, |_: &mut HookContext<'_>| {
            assert_eq!(SEEN.fetch_add(1, Ordering::SeqCst), 0);
            HookOutcome::Continue
        });
        hooks.add(events::APP_BEGIN, |_: &mut HookContext<'_>| {
            assert_eq!(SEEN.fetch_add(1, Ordering::SeqCst), 1);
            HookOutcome::Continue
        });
        let mut req = Request::new("/");
        assert!(matches!(
            hooks.fire_request(events::APP_BEGIN, &mut req),
            HookOutcome::Continue
        ));
        assert_eq!(SEEN.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_respond_stops_remaining_listeners() {
        let mut hooks = HookRegistry::new();
        hooks.add(events::APP_BEGIN, |_: &mut HookContext<'_>| {
            HookOutcome::Respond(Response::text("halted"))
        });
        hooks.add(events::APP_BEGIN, |_: &mut HookContext<'_>| {
            panic!("must not run");
        });
        let mut req = Request::new("/");
        match hooks.fire_request(events::APP_BEGIN, &mut req) {
            HookOutcome::Respond(res) => assert_eq!(res.render(), "halted"),
            HookOutcome::Continue => panic!("expected short-circuit"),
        }
    }
}
