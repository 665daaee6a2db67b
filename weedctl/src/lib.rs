//! # weedctl: client for the weed detection service
//!
//! The weed detection service slices an uploaded GeoTIFF, runs a detector over the slices and
//! returns the detections as a zip of shapefiles. While it works it broadcasts progress messages
//! over a WebSocket. `weedctl` is the client side of that service:
//!
//! - [`notifications`] subscribes to the push channel and appends each message to the page;
//! - [`upload`] posts a GeoTIFF (or an image plus its corner coordinates) and downloads the
//!   resulting archive (or renders the returned link);
//! - [`registration`] posts the registration form as JSON and redirects to the application page.
//!
//! ## Architecture
//!
//! Each handler is split into pure functions and a thin async driver. The pure functions turn form
//! inputs into an [`http::HttpRequest`] plus initial [`page::Effect`]s, and turn the response into
//! more effects. The driver on [`Client`] sends the request through an [`http::HttpClient`],
//! applies effects to an [`page::EffectSink`], and renders any failure before returning it.
//!
//! Drivers are cancellable through a [`CancellationToken`]. An in-flight guard rejects a second
//! upload (or registration) while one is running. The post-registration redirect is a
//! [`task::PendingRedirect`] the caller can await or cancel.
//!
//! ## Quick Start
//!
//! ```no_run
//! use weedctl::{Client, Config, http::ReqwestHttpClient, page::SharedPage};
//! use weedctl::registration::{RegistrationForm, RegistrationOutcome};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::default();
//! let client = Client::new(ReqwestHttpClient::new(config.request_timeout)?, &config)?;
//! let page = SharedPage::default();
//!
//! let form = RegistrationForm {
//!     name: "Ada".into(),
//!     email: "ada@example.com".into(),
//!     phone: "555-0100".into(),
//!     address: "12 Field Lane".into(),
//! };
//! if let RegistrationOutcome::Registered(redirect) = client.register(form, &page, &CancellationToken::new()).await? {
//!     redirect.run(&page).await;
//! }
//! # Ok(())
//! # }
//! ```
pub mod config;
pub mod console;
pub mod errors;
pub mod http;
pub mod notifications;
pub mod page;
pub mod registration;
pub mod task;
pub mod telemetry;
pub mod upload;

#[cfg(test)]
mod test;

pub use config::Config;
pub use errors::{Error, Result};

use config::Endpoints;
use http::{HttpClient, HttpRequest, HttpResponse, PendingResponse};
use std::future::Future;
use std::time::Duration;
use task::InFlight;
use tokio_util::sync::CancellationToken;

/// Drives the upload and registration handlers against the detection service.
pub struct Client<H> {
    http: H,
    endpoints: Endpoints,
    download_filename: String,
    app_path: String,
    redirect_delay: Duration,
    uploads: InFlight,
    registrations: InFlight,
}

impl<H: HttpClient> Client<H> {
    pub fn new(http: H, config: &Config) -> Result<Self> {
        Ok(Self {
            http,
            endpoints: config.endpoints()?,
            download_filename: config.download_filename.clone(),
            app_path: config.app_path.clone(),
            redirect_delay: config.redirect_delay,
            uploads: InFlight::new("upload"),
            registrations: InFlight::new("registration"),
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Send a request and wait for the response head, giving up if `cancel` fires first.
    async fn send(&self, request: &HttpRequest, cancel: &CancellationToken, operation: &'static str) -> Result<PendingResponse> {
        until_cancelled(self.http.send(request), cancel, operation).await
    }

    /// Send a request and read the whole response, giving up if `cancel` fires first.
    async fn execute(&self, request: &HttpRequest, cancel: &CancellationToken, operation: &'static str) -> Result<HttpResponse> {
        let response = self.send(request, cancel, operation).await?;
        until_cancelled(response.into_response(), cancel, operation).await
    }
}

/// Await `work`, or fail with [`Error::Cancelled`] if `cancel` fires first.
async fn until_cancelled<T>(
    work: impl Future<Output = Result<T>>,
    cancel: &CancellationToken,
    operation: &'static str,
) -> Result<T> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled { operation }),
        result = work => result,
    }
}
