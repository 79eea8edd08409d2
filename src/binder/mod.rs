//! Argument binding and uniform invocation.
//!
//! Callables declare their parameter shapes at registration time
//! ([`ParamSpec`]); the binder turns a positional sequence or name/value
//! mapping into a concrete argument list, auto-injecting typed objects, and
//! the [`Invoker`] performs the actual call for functions, bound methods,
//! named controller actions, and controller construction alike.

mod invoker;
mod params;

pub use invoker::Invoker;
pub use params::{bind, ArgValue, Args, Injectable, Injector, ParamKind, ParamSpec, Params};

use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::request::Request;
use crate::response::ReturnValue;

type CallFn = Arc<dyn Fn(&mut Request, Args) -> Result<ReturnValue, Error> + Send + Sync>;

/// A function or closure together with its declared parameter list.
///
/// The declared list is what the binder resolves against; the `name` is
/// carried for diagnostics only.
#[derive(Clone)]
pub struct CallableFn {
    name: String,
    params: Vec<ParamSpec>,
    call: CallFn,
}

impl CallableFn {
    pub fn new<F>(name: &str, params: Vec<ParamSpec>, f: F) -> Self
    where
        F: Fn(&mut Request, Args) -> Result<ReturnValue, Error> + Send + Sync + 'static,
    {
        CallableFn {
            name: name.to_string(),
            params,
            call: Arc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn call(&self, req: &mut Request, args: Args) -> Result<ReturnValue, Error> {
        (self.call)(req, args)
    }
}

impl fmt::Debug for CallableFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableFn")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

/// Polymorphic method reference: either a pre-bound callable (the instance
/// is captured in the closure) or a `controller/action` pair resolved
/// through the controller registry at invocation time.
#[derive(Debug, Clone)]
pub enum Callable {
    Bound(CallableFn),
    Named { controller: String, action: String },
}
