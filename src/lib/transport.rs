//! The HTTP(S) layer revision lookups and archive downloads go through.

use tracing::debug;

use crate::error::Error;
use crate::provider::DownloadRequest;

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs blocking `GET` requests.
///
/// A non-success status is a response, not an error: callers decide what it means. Errors are
/// reserved for requests that never produced a response, and are never retried.
pub trait Transport: Send + Sync {
    fn get(&self, request: &DownloadRequest) -> Result<HttpResponse, Error>;
}

/// A [`Transport`] over a blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str) -> Result<Self, Error> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, request: &DownloadRequest) -> Result<HttpResponse, Error> {
        debug!(url = %request.url, authenticated = request.access_header.is_some(), "GET");
        let mut builder = self.client.get(&request.url);
        if let Some((name, value)) = &request.access_header {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder
            .send()
            .map_err(|err| Error::transfer(&request.url, err))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|err| Error::transfer(&request.url, err))?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}
