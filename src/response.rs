use serde_json::Value;

pub(crate) fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "OK",
    }
}

/// Response payload, one variant per output shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Text(String),
    Html(String),
    Json(Value),
    Redirect(String),
}

impl Body {
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Body::Empty | Body::Redirect(_) => None,
            Body::Text(_) => Some("text/plain"),
            Body::Html(_) => Some("text/html"),
            Body::Json(_) => Some("application/json"),
        }
    }
}

/// A finished response: status, extra headers, body.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Body,
}

impl Response {
    pub fn new(status: u16, body: Body) -> Self {
        Response {
            status,
            headers: Vec::new(),
            body,
        }
    }

    /// The empty default response produced by a null handler return.
    pub fn empty() -> Self {
        Response::new(200, Body::Empty)
    }

    pub fn text(content: impl Into<String>) -> Self {
        Response::new(200, Body::Text(content.into()))
    }

    pub fn html(content: impl Into<String>) -> Self {
        Response::new(200, Body::Html(content.into()))
    }

    pub fn json(value: Value) -> Self {
        Response::new(200, Body::Json(value))
    }

    pub fn redirect(url: impl Into<String>, status: u16) -> Self {
        Response::new(status, Body::Redirect(url.into()))
    }

    /// Wrap a raw handler return value using the configured output kind.
    ///
    /// Unknown kinds fall back to `html`; a string value renders as-is, any
    /// other value is serialized.
    pub fn create(data: Value, kind: &str) -> Self {
        match kind {
            "json" => Response::json(data),
            "text" => match data {
                Value::String(s) => Response::text(s),
                other => Response::text(other.to_string()),
            },
            _ => match data {
                Value::String(s) => Response::html(s),
                other => Response::html(other.to_string()),
            },
        }
    }

    pub fn code(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> &'static str {
        status_reason(self.status)
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn content_type(&self) -> Option<&'static str> {
        self.body.content_type()
    }

    /// Body rendered to a transmissible string; redirect targets render to
    /// their URL so callers can log or store them uniformly.
    pub fn render(&self) -> String {
        match &self.body {
            Body::Empty => String::new(),
            Body::Text(s) | Body::Html(s) | Body::Redirect(s) => s.clone(),
            Body::Json(v) => v.to_string(),
        }
    }
}

/// What invoked application code handed back, before normalization.
#[derive(Debug)]
pub enum ReturnValue {
    /// Already a finished response; passes through unchanged.
    Response(Response),
    /// A raw value to wrap per the ajax/default return type.
    Value(Value),
    /// Nothing; normalizes to the empty default response.
    None,
}

impl From<Value> for ReturnValue {
    fn from(value: Value) -> Self {
        ReturnValue::Value(value)
    }
}

impl From<Response> for ReturnValue {
    fn from(response: Response) -> Self {
        ReturnValue::Response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_reason() {
        assert_eq!(status_reason(200), "OK");
        assert_eq!(status_reason(404), "Not Found");
        assert_eq!(status_reason(304), "Not Modified");
    }

    #[test]
    fn test_create_kinds() {
        let r = Response::create(json!({"a": 1}), "json");
        assert_eq!(r.content_type(), Some("application/json"));
        let r = Response::create(Value::String("hi".into()), "html");
        assert_eq!(r.body(), &Body::Html("hi".into()));
        let r = Response::create(json!(5), "text");
        assert_eq!(r.body(), &Body::Text("5".into()));
    }

    #[test]
    fn test_redirect_render() {
        let r = Response::redirect("/login", 302);
        assert_eq!(r.status(), 302);
        assert_eq!(r.render(), "/login");
    }
}
