use serde_json::json;
use thiserror::Error;

use crate::response::Response;

/// Failures surfaced by the dispatch kernel.
///
/// Resolution failures (module/controller/action/route) are produced only at
/// the dispatch-descriptor and module-resolution boundaries and map to 404 at
/// the HTTP edge. Everything else is a contract or environment failure and
/// maps to a 5xx.
#[derive(Debug, Error)]
pub enum Error {
    #[error("module not exists:{0}")]
    ModuleNotFound(String),
    #[error("controller not exists:{0}")]
    ControllerNotFound(String),
    #[error("method not exists:{0}")]
    ActionNotFound(String),
    #[error("route not found:{0}")]
    RouteNotFound(String),
    #[error("method param miss:{0}")]
    MissingArgument(String),
    #[error("dispatch type not support:{0}")]
    UnsupportedDispatch(String),
    #[error("config error:{0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Status code this failure surfaces as at the HTTP boundary.
    pub fn status(&self) -> u16 {
        match self {
            Error::ModuleNotFound(_)
            | Error::ControllerNotFound(_)
            | Error::ActionNotFound(_)
            | Error::RouteNotFound(_) => 404,
            Error::MissingArgument(_)
            | Error::UnsupportedDispatch(_)
            | Error::Config(_)
            | Error::Io(_) => 500,
        }
    }

    /// Render the failure as a JSON error response for the boundary.
    pub fn into_response(self) -> Response {
        let status = self.status();
        Response::json(json!({ "error": self.to_string() })).code(status)
    }
}

/// Control-flow signal for the pipeline.
///
/// `Respond` is not a failure: a hook or the request cache gate produced a
/// finished response and the remaining stages are skipped. It is caught
/// exactly once, at the top of `App::run`. `Fail` carries a real [`Error`]
/// out of the run unmodified.
#[derive(Debug)]
pub enum Abort {
    Respond(Response),
    Fail(Error),
}

impl From<Error> for Abort {
    fn from(err: Error) -> Self {
        Abort::Fail(err)
    }
}
