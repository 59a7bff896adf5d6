//! Error responses.
//!
//! Every error that ends a request passes through one [`ErrorRenderer`].
//! The default, [`ProblemRenderer`], writes an RFC 7807 style problem
//! document:
//!
//! ```json
//! {"status": 404, "type": "NOT_FOUND", "title": "no such user", "detail": "…", "extensions": {"user_id": 7}}
//! ```
//!
//! `type`, `status` and `title` come from the outermost [`Coded`] error in
//! the chain; `extensions` collects every [`Bag`] annotation.
//!
//! [`Coded`]: crate::errors::Coded
//! [`Bag`]: crate::errors::Bag

use std::error::Error as StdError;

use http::StatusCode;
use serde_json::{json, Map, Value};
use tracing::{error, warn};

use crate::errors::{bag, code};
use crate::negotiate::Negotiator;
use crate::request::Request;
use crate::response::ResponseWriter;

/// Writes the response for a failed request. Must not fail.
pub trait ErrorRenderer: Send + Sync + 'static {
    fn render(
        &self,
        err: &(dyn StdError + 'static),
        req: &Request,
        w: &ResponseWriter,
        negotiator: &Negotiator,
    );
}

impl<F> ErrorRenderer for F
where
    F: Fn(&(dyn StdError + 'static), &Request, &ResponseWriter, &Negotiator) + Send + Sync + 'static,
{
    fn render(
        &self,
        err: &(dyn StdError + 'static),
        req: &Request,
        w: &ResponseWriter,
        negotiator: &Negotiator,
    ) {
        self(err, req, w, negotiator)
    }
}

// ── Problem ───────────────────────────────────────────────────────────────────

/// A problem document describing one error.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Problem {
    pub status: u16,
    /// The error's type tag. Empty for unclassified errors.
    pub kind: String,
    pub title: String,
    pub detail: String,
    pub extensions: Map<String, Value>,
}

impl Problem {
    pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
        let extensions = bag::list_pairs(err);
        let detail = err.to_string();
        match code(err) {
            Some(coded) => Self {
                status: coded.http_code(),
                kind: coded.kind().to_owned(),
                title: coded.message(),
                detail,
                extensions,
            },
            None => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                detail,
                extensions,
                ..Self::default()
            },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn to_value(&self) -> Value {
        json!({
            "status": self.status,
            "type": self.kind,
            "title": self.title,
            "detail": self.detail,
            "extensions": self.extensions,
        })
    }
}

// ── Default renderer ──────────────────────────────────────────────────────────

/// Renders [`Problem`] documents through the request's negotiated format,
/// or the default format when negotiation itself failed.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProblemRenderer;

impl ErrorRenderer for ProblemRenderer {
    fn render(
        &self,
        err: &(dyn StdError + 'static),
        req: &Request,
        w: &ResponseWriter,
        negotiator: &Negotiator,
    ) {
        let problem = Problem::from_error(err);
        record(&problem, req);

        w.set_status(problem.status_code());
        let document = problem.to_value();
        if negotiator.marshal(req, w, Value::Null, Some(document.clone())).is_ok() {
            return;
        }
        if let Err(e) = negotiator.marshal_default(w, Value::Null, Some(document)) {
            error!(error = %e, "failed to marshal error response");
        }
    }
}

fn record(problem: &Problem, req: &Request) {
    let extensions = Value::Object(problem.extensions.clone());
    if problem.status >= 500 {
        error!(
            method = %req.method(),
            path = req.path(),
            status = problem.status,
            kind = %problem.kind,
            %extensions,
            detail = %problem.detail,
            "request failed"
        );
    } else {
        warn!(
            method = %req.method(),
            path = req.path(),
            status = problem.status,
            kind = %problem.kind,
            %extensions,
            detail = %problem.detail,
            "request rejected"
        );
    }
}
