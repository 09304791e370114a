//! Thin HTTP trigger for function-style endpoints.
//!
//! Exercises a function-compatible app booted through a container session:
//!
//! ```no_run
//! use scabbard::query::FunctionQuery;
//!
//! # fn main() -> scabbard::Result<()> {
//! # let host_port = 8080;
//! let mut query = FunctionQuery::new(host_port)
//!     .with_body(serde_json::json!({ "accounts": [] }));
//! let response = query.call()?;
//! assert_eq!(response.status, 200);
//! # Ok(())
//! # }
//! ```

use reqwest::blocking::Client;

use crate::error::{Error, Result};
use scabbard_common::error::ScabbardError;

/// Captured HTTP response of one query.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body, verbatim.
    pub body: String,
}

/// One POST against a function endpoint bound to a host port.
#[derive(Debug)]
pub struct FunctionQuery {
    port: u16,
    body: serde_json::Value,
    spec_version: String,
    response: Option<QueryResponse>,
}

impl FunctionQuery {
    /// Creates a query against `localhost:<port>` with an empty JSON body.
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            port,
            body: serde_json::Value::Object(serde_json::Map::new()),
            spec_version: "1.0".to_string(),
            response: None,
        }
    }

    /// Replaces the JSON body sent with the request.
    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }

    /// Overrides the CloudEvents spec version header.
    #[must_use]
    pub fn with_spec_version(mut self, version: impl Into<String>) -> Self {
        self.spec_version = version.into();
        self
    }

    /// Sends the request and records the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent or the body cannot be
    /// serialized. Non-2xx statuses are not errors; inspect the response.
    pub fn call(&mut self) -> Result<&QueryResponse> {
        let body = serde_json::to_string(&self.body).map_err(ScabbardError::from)?;
        tracing::debug!(port = self.port, "querying function endpoint");

        let response = Client::new()
            .post(format!("http://localhost:{}", self.port))
            .header("Content-Type", "application/json")
            .header("ce-id", format!("scabbard-{}", uuid::Uuid::new_v4().simple()))
            .header("ce-time", "2020-09-03T20:56:28.297915Z")
            .header("ce-type", "")
            .header("ce-source", "")
            .header("ce-specversion", self.spec_version.clone())
            .body(body)
            .send()?;

        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(&*self.response.insert(QueryResponse { status, body }))
    }

    /// The recorded response of the last call.
    ///
    /// # Errors
    ///
    /// Querying before `call` is a usage error.
    pub fn response(&self) -> Result<&QueryResponse> {
        self.response.as_ref().ok_or_else(|| {
            Error::Common(ScabbardError::Usage {
                message: "no response recorded; execute `call` first".into(),
            })
        })
    }

    /// Whether the last call returned a 2xx status.
    ///
    /// # Errors
    ///
    /// Usage error before `call`.
    pub fn success(&self) -> Result<bool> {
        Ok((200..300).contains(&self.response()?.status))
    }

    /// Parses the last response body as JSON.
    ///
    /// # Errors
    ///
    /// Usage error before `call`; a serialization error when the body is
    /// not valid JSON.
    pub fn as_json(&self) -> Result<serde_json::Value> {
        let response = self.response()?;
        serde_json::from_str(&response.body)
            .map_err(|source| Error::Common(ScabbardError::from(source)))
    }
}
