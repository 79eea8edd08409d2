use std::fmt;

use serde_json::Value;

use crate::binder::{Callable, CallableFn};
use crate::error::Error;
use crate::response::Response;

/// Raw `(module, controller, action)` target of a module dispatch. Fields
/// left empty fall back to the configured defaults during resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleTarget {
    pub module: Option<String>,
    pub controller: Option<String>,
    pub action: Option<String>,
}

impl ModuleTarget {
    pub fn new(module: &str, controller: &str, action: &str) -> Self {
        fn part(s: &str) -> Option<String> {
            (!s.is_empty()).then(|| s.to_string())
        }
        ModuleTarget {
            module: part(module),
            controller: part(controller),
            action: part(action),
        }
    }

    /// Parse a `module/controller/action` path; missing trailing segments
    /// stay unset, empty segments stay unset.
    pub fn parse(path: &str) -> Self {
        let mut parts = path.trim_matches('/').splitn(3, '/');
        let mut next = || {
            parts
                .next()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        };
        ModuleTarget {
            module: next(),
            controller: next(),
            action: next(),
        }
    }
}

impl fmt::Display for ModuleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.module.as_deref().unwrap_or(""),
            self.controller.as_deref().unwrap_or(""),
            self.action.as_deref().unwrap_or("")
        )
    }
}

/// The resolved instruction describing what code handles a request.
///
/// Produced by route checking or explicit binding, attached to the request,
/// and consumed exactly once by the exec step. `Controller` and `Method`
/// carry pre-resolved targets and deliberately bypass module validation.
#[derive(Clone)]
pub enum Dispatch {
    /// Redirect to `url` with the given status code.
    Redirect { url: String, status: u16 },
    /// Full module/controller/action resolution; `convert` overrides the
    /// configured name case-folding when set.
    Module {
        target: ModuleTarget,
        route_vars: Vec<(String, Value)>,
        convert: Option<bool>,
    },
    /// Bound `[module/]controller/action` path, invoked without module
    /// validation.
    Controller {
        path: String,
        route_vars: Vec<(String, Value)>,
    },
    /// Bound callable method reference.
    Method {
        callable: Callable,
        route_vars: Vec<(String, Value)>,
    },
    /// Bare function or closure.
    Function { callable: CallableFn },
    /// A pre-built response, passed through unchanged.
    Response { response: Response },
}

impl Dispatch {
    /// Build a descriptor from a string-keyed kind and a loose payload — the
    /// programmatic dispatch API. This is the one place an unrecognized kind
    /// surfaces [`Error::UnsupportedDispatch`].
    pub fn from_parts(kind: &str, payload: Value) -> Result<Self, Error> {
        match kind {
            "redirect" => {
                let (url, status) = match payload {
                    Value::String(url) => (url, 302),
                    Value::Object(map) => {
                        let url = map
                            .get("url")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string();
                        let status =
                            map.get("status").and_then(|v| v.as_u64()).unwrap_or(302) as u16;
                        (url, status)
                    }
                    other => (other.to_string(), 302),
                };
                Ok(Dispatch::Redirect { url, status })
            }
            "module" => {
                let target = match payload {
                    Value::String(path) => ModuleTarget::parse(&path),
                    Value::Array(parts) => {
                        let seg = |i: usize| {
                            parts
                                .get(i)
                                .and_then(|v| v.as_str())
                                .unwrap_or_default()
                                .to_string()
                        };
                        ModuleTarget::new(&seg(0), &seg(1), &seg(2))
                    }
                    _ => ModuleTarget::default(),
                };
                Ok(Dispatch::Module {
                    target,
                    route_vars: Vec::new(),
                    convert: None,
                })
            }
            "controller" => {
                let path = payload.as_str().unwrap_or_default().to_string();
                Ok(Dispatch::Controller {
                    path,
                    route_vars: Vec::new(),
                })
            }
            other => Err(Error::UnsupportedDispatch(other.to_string())),
        }
    }

    /// Discriminator name, used for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Dispatch::Redirect { .. } => "redirect",
            Dispatch::Module { .. } => "module",
            Dispatch::Controller { .. } => "controller",
            Dispatch::Method { .. } => "method",
            Dispatch::Function { .. } => "function",
            Dispatch::Response { .. } => "response",
        }
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatch::Redirect { url, status } => f
                .debug_struct("Redirect")
                .field("url", url)
                .field("status", status)
                .finish(),
            Dispatch::Module {
                target,
                route_vars,
                convert,
            } => f
                .debug_struct("Module")
                .field("target", &target.to_string())
                .field("route_vars", route_vars)
                .field("convert", convert)
                .finish(),
            Dispatch::Controller { path, route_vars } => f
                .debug_struct("Controller")
                .field("path", path)
                .field("route_vars", route_vars)
                .finish(),
            Dispatch::Method {
                callable,
                route_vars,
            } => f
                .debug_struct("Method")
                .field("callable", callable)
                .field("route_vars", route_vars)
                .finish(),
            Dispatch::Function { callable } => f
                .debug_struct("Function")
                .field("callable", &callable.name())
                .finish(),
            Dispatch::Response { response } => f
                .debug_struct("Response")
                .field("status", &response.status())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_module_target_parse() {
        let t = ModuleTarget::parse("index/user/show");
        assert_eq!(t.module.as_deref(), Some("index"));
        assert_eq!(t.controller.as_deref(), Some("user"));
        assert_eq!(t.action.as_deref(), Some("show"));

        let t = ModuleTarget::parse("/user");
        assert_eq!(t.module.as_deref(), Some("user"));
        assert_eq!(t.controller, None);
    }

    #[test]
    fn test_from_parts_redirect() {
        let d = Dispatch::from_parts("redirect", json!("/target")).unwrap();
        match d {
            Dispatch::Redirect { url, status } => {
                assert_eq!(url, "/target");
                assert_eq!(status, 302);
            }
            other => panic!("unexpected dispatch: {other:?}"),
        }
    }

    #[test]
    fn test_from_parts_unknown_kind() {
        let err = Dispatch::from_parts("teleport", json!(null)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedDispatch(k) if k == "teleport"));
    }
}
