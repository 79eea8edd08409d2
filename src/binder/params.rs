use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::UrlParamType;
use crate::error::Error;
use crate::request::Request;

/// Values offered to the binder for one call.
///
/// The variant is the binding mode: a positional sequence is consumed from
/// the front in declaration order, a named mapping is looked up per
/// parameter name. `None` (and an empty sequence or mapping) makes the
/// binder pull from the current request instead, selected by the
/// `url_param_type` configuration flag.
#[derive(Debug, Clone, Default)]
pub enum Params {
    #[default]
    None,
    Positional(Vec<Value>),
    Named(Map<String, Value>),
}

impl Params {
    pub fn is_empty(&self) -> bool {
        match self {
            Params::None => true,
            Params::Positional(v) => v.is_empty(),
            Params::Named(m) => m.is_empty(),
        }
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Params::Positional(values)
    }
}

impl From<Map<String, Value>> for Params {
    fn from(values: Map<String, Value>) -> Self {
        Params::Named(values)
    }
}

/// One resolved argument: a plain value or an injected typed object.
#[derive(Clone)]
pub enum ArgValue {
    Value(Value),
    Object(Arc<dyn Any + Send + Sync>),
}

impl fmt::Debug for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            ArgValue::Object(_) => f.debug_tuple("Object").field(&"..").finish(),
        }
    }
}

/// Concrete argument list produced by [`bind`], in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Args(Vec<ArgValue>);

impl Args {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ArgValue> {
        self.0.get(index)
    }

    /// The plain value at `index`, if that slot holds one.
    pub fn value(&self, index: usize) -> Option<&Value> {
        match self.0.get(index) {
            Some(ArgValue::Value(v)) => Some(v),
            _ => None,
        }
    }

    pub fn str(&self, index: usize) -> Option<&str> {
        self.value(index).and_then(|v| v.as_str())
    }

    /// Downcast the injected object at `index`.
    pub fn object<T: Any + Send + Sync>(&self, index: usize) -> Option<Arc<T>> {
        match self.0.get(index) {
            Some(ArgValue::Object(o)) => o.clone().downcast::<T>().ok(),
            _ => None,
        }
    }
}

/// Resolution strategy for an injected parameter.
pub type Injector = Arc<dyn Fn(&Request) -> ArgValue + Send + Sync>;

/// How one declared parameter is satisfied.
#[derive(Clone)]
pub enum ParamKind {
    /// A plain value bound positionally or by name.
    Value,
    /// A typed object resolved from the request or the type's own entry
    /// points, never from the value set.
    Inject(Injector),
}

impl fmt::Debug for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::Value => write!(f, "Value"),
            ParamKind::Inject(_) => write!(f, "Inject"),
        }
    }
}

/// One declared parameter of a callable.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub(crate) name: String,
    pub(crate) kind: ParamKind,
    pub(crate) default: Option<Value>,
}

impl ParamSpec {
    /// A required plain parameter.
    pub fn required(name: &str) -> Self {
        ParamSpec {
            name: name.to_string(),
            kind: ParamKind::Value,
            default: None,
        }
    }

    /// A plain parameter with a declared default.
    pub fn optional(name: &str, default: Value) -> Self {
        ParamSpec {
            name: name.to_string(),
            kind: ParamKind::Value,
            default: Some(default),
        }
    }

    /// A typed-object parameter resolved through [`Injectable`]: the exact
    /// instance attached to the request wins, then the type's
    /// `from_request` entry point, then its shared singleton, then a fresh
    /// default instance.
    pub fn inject<T: Injectable>(name: &str) -> Self {
        let injector: Injector = Arc::new(|req: &Request| {
            if let Some(found) = req.attachment::<T>() {
                return ArgValue::Object(found);
            }
            let resolved = T::from_request(req)
                .or_else(T::shared)
                .unwrap_or_else(T::fresh);
            ArgValue::Object(resolved)
        });
        ParamSpec {
            name: name.to_string(),
            kind: ParamKind::Inject(injector),
            default: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Types that can be auto-injected into a declared parameter.
///
/// The default entry points mirror the lookup order the binder applies
/// after the request's own attachment map: an "invoke with request"
/// constructor, a process-wide singleton accessor, and a plain default
/// construction.
pub trait Injectable: Send + Sync + 'static {
    /// Build an instance from the current request.
    fn from_request(_req: &Request) -> Option<Arc<Self>> {
        None
    }

    /// A shared singleton instance, when the type keeps one.
    fn shared() -> Option<Arc<Self>> {
        None
    }

    /// A fresh default instance; the binder's last resort.
    fn fresh() -> Arc<Self>;
}

/// Bind declared parameters to concrete arguments.
///
/// Empty `values` pull from the request: the ordered route-variable
/// sequence (positional) or the param mapping (named), per
/// `url_param_type`. Each declared parameter then resolves in order —
/// injected type, positional front / named lookup, declared default — or
/// the whole call fails with [`Error::MissingArgument`].
pub fn bind(
    specs: &[ParamSpec],
    values: Params,
    req: &Request,
    url_param_type: UrlParamType,
) -> Result<Args, Error> {
    let values = if values.is_empty() {
        match url_param_type {
            UrlParamType::Positional => Params::Positional(
                req.route_vars().iter().map(|(_, v)| v.clone()).collect(),
            ),
            UrlParamType::Named => Params::Named(req.params()),
        }
    } else {
        values
    };

    let (mut queue, named) = match values {
        Params::Positional(v) => (VecDeque::from(v), None),
        Params::Named(m) => (VecDeque::new(), Some(m)),
        Params::None => (VecDeque::new(), None),
    };

    let mut args = Vec::with_capacity(specs.len());
    for spec in specs {
        match &spec.kind {
            ParamKind::Inject(injector) => args.push(injector(req)),
            ParamKind::Value => {
                let bound = match &named {
                    Some(map) => map.get(&spec.name).cloned(),
                    None => queue.pop_front(),
                };
                match bound.or_else(|| spec.default.clone()) {
                    Some(v) => args.push(ArgValue::Value(v)),
                    None => return Err(Error::MissingArgument(spec.name.clone())),
                }
            }
        }
    }
    Ok(Args(args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sig_a_b5() -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("a"),
            ParamSpec::optional("b", json!(5)),
        ]
    }

    #[test]
    fn test_positional_with_default() {
        let req = Request::new("/");
        let args = bind(
            &sig_a_b5(),
            Params::Positional(vec![json!(10)]),
            &req,
            UrlParamType::Named,
        )
        .unwrap();
        assert_eq!(args.value(0), Some(&json!(10)));
        assert_eq!(args.value(1), Some(&json!(5)));
    }

    #[test]
    fn test_named_missing_required() {
        let req = Request::new("/");
        let specs = vec![ParamSpec::required("a"), ParamSpec::required("b")];
        let mut values = Map::new();
        values.insert("b".to_string(), json!(2));
        let err = bind(&specs, Params::Named(values), &req, UrlParamType::Named).unwrap_err();
        assert!(matches!(err, Error::MissingArgument(name) if name == "a"));
    }

    #[test]
    fn test_empty_values_pull_named_from_request() {
        let mut req = Request::new("/");
        req.set_param("a", json!("x"));
        let args = bind(&sig_a_b5(), Params::None, &req, UrlParamType::Named).unwrap();
        assert_eq!(args.str(0), Some("x"));
        assert_eq!(args.value(1), Some(&json!(5)));
    }

    #[test]
    fn test_empty_values_pull_positional_from_request() {
        let mut req = Request::new("/");
        req.merge_route_vars(&[
            ("first".to_string(), json!("1")),
            ("second".to_string(), json!("2")),
        ]);
        let specs = vec![ParamSpec::required("a"), ParamSpec::required("b")];
        let args = bind(&specs, Params::None, &req, UrlParamType::Positional).unwrap();
        assert_eq!(args.str(0), Some("1"));
        assert_eq!(args.str(1), Some("2"));
    }

    struct Token {
        id: u32,
    }

    impl Injectable for Token {
        fn fresh() -> Arc<Self> {
            Arc::new(Token { id: 0 })
        }
    }

    #[test]
    fn test_inject_prefers_attached_instance() {
        let mut req = Request::new("/");
        let attached = Arc::new(Token { id: 42 });
        req.attach(attached.clone());
        let specs = vec![ParamSpec::inject::<Token>("token")];
        let args = bind(&specs, Params::None, &req, UrlParamType::Named).unwrap();
        let got = args.object::<Token>(0).unwrap();
        assert!(Arc::ptr_eq(&attached, &got));
        assert_eq!(got.id, 42);
    }

    #[test]
    fn test_inject_falls_back_to_fresh() {
        let req = Request::new("/");
        let specs = vec![ParamSpec::inject::<Token>("token")];
        let args = bind(&specs, Params::None, &req, UrlParamType::Named).unwrap();
        assert_eq!(args.object::<Token>(0).unwrap().id, 0);
    }
}
