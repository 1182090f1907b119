//! Boundaries to the HTTP transport and the credential source.
//!
//! The client only builds request bodies and reads response strings; moving
//! bytes and producing a bearer token happen behind these traits.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{Error, Result};

/// One SOAP call, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapRequest {
    pub endpoint: String,
    pub action: &'static str,
    pub body: String,
    pub bearer_token: String,
    /// Abort the call after this long and report [`Error::Timeout`].
    pub timeout: Option<Duration>,
}

pub trait Transport {
    /// Sends the request and returns the raw response body.
    ///
    /// Implementations report an expired `timeout` as [`Error::Timeout`] and a
    /// non-success HTTP status as [`Error::TransportFailure`] carrying the body.
    fn send(&self, request: &SoapRequest) -> Result<String>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &SoapRequest) -> Result<String> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, request: &SoapRequest) -> Result<String> {
        (**self).send(request)
    }
}

/// Supplies a ready-to-use bearer token. Token acquisition (client
/// assertions, token exchange) lives outside this crate.
pub trait CredentialProvider {
    fn bearer_token(&self) -> Result<String>;
}

impl<C: CredentialProvider + ?Sized> CredentialProvider for &C {
    fn bearer_token(&self) -> Result<String> {
        (**self).bearer_token()
    }
}

impl<C: CredentialProvider + ?Sized> CredentialProvider for Arc<C> {
    fn bearer_token(&self) -> Result<String> {
        (**self).bearer_token()
    }
}

#[derive(Debug, Clone)]
pub struct StaticCredential(String);

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl CredentialProvider for StaticCredential {
    fn bearer_token(&self) -> Result<String> {
        if self.0.is_empty() {
            return Err(Error::Credential("empty bearer token".to_string()));
        }
        Ok(self.0.clone())
    }
}

/// Token slot shared between concurrent callers. Rotation goes through
/// [`SharedCredential::rotate`], the only writer; readers copy the current
/// token out and never hold the lock across a call.
#[derive(Debug, Clone, Default)]
pub struct SharedCredential {
    slot: Arc<RwLock<Option<String>>>,
}

impl SharedCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Some(token.into()))),
        }
    }

    pub fn rotate(&self, token: impl Into<String>) -> Result<()> {
        let mut slot = self
            .slot
            .write()
            .map_err(|_| Error::Credential("credential slot poisoned".to_string()))?;
        *slot = Some(token.into());
        Ok(())
    }
}

impl CredentialProvider for SharedCredential {
    fn bearer_token(&self) -> Result<String> {
        let slot = self
            .slot
            .read()
            .map_err(|_| Error::Credential("credential slot poisoned".to_string()))?;
        slot.clone()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| Error::Credential("no bearer token set".to_string()))
    }
}

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use reqwest::blocking::Client;
    use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
    use tracing::{debug, warn};

    use super::{SoapRequest, Transport};
    use crate::error::{Error, Result};

    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Blocking HTTPS transport.
    ///
    /// The only overall deadline is the per-request [`SoapRequest::timeout`];
    /// a request without one waits for the server indefinitely once connected.
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        client: Client,
    }

    impl HttpTransport {
        pub fn new() -> Result<Self> {
            let client = Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(None::<Duration>)
                .build()
                .map_err(|err| Error::TransportFailure {
                    endpoint: String::new(),
                    status: None,
                    body: err.to_string(),
                })?;
            Ok(Self { client })
        }
    }

    impl Transport for HttpTransport {
        fn send(&self, request: &SoapRequest) -> Result<String> {
            debug!("POST {} ({})", request.endpoint, request.action);
            let mut builder = self
                .client
                .post(&request.endpoint)
                .header(CONTENT_TYPE, "text/xml; charset=utf-8")
                .header("SOAPAction", request.action)
                .header(AUTHORIZATION, format!("Bearer {}", request.bearer_token))
                .body(request.body.clone());
            if let Some(timeout) = request.timeout {
                builder = builder.timeout(timeout);
            }

            let response = builder.send().map_err(|err| map_error(request, err))?;
            let status = response.status();
            let body = response.text().map_err(|err| map_error(request, err))?;

            if !status.is_success() {
                warn!("{} answered HTTP {}", request.endpoint, status.as_u16());
                return Err(Error::TransportFailure {
                    endpoint: request.endpoint.clone(),
                    status: Some(status.as_u16()),
                    body,
                });
            }
            Ok(body)
        }
    }

    fn map_error(request: &SoapRequest, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            let after = match request.timeout {
                Some(budget) if !err.is_connect() => budget,
                Some(budget) => budget.min(CONNECT_TIMEOUT),
                None => CONNECT_TIMEOUT,
            };
            Error::Timeout {
                endpoint: request.endpoint.clone(),
                after,
            }
        } else {
            Error::TransportFailure {
                endpoint: request.endpoint.clone(),
                status: err.status().map(|status| status.as_u16()),
                body: err.to_string(),
            }
        }
    }

}
