//! Registration form client.
//!
//! The form's four fields are posted as JSON to the registration endpoint. A successful
//! registration shows a confirmation and schedules a redirect to the application page; a rejected
//! one shows the server's `detail`.

use crate::Client;
use crate::errors::{Error, Result};
use crate::http::{HttpClient, HttpRequest, HttpResponse, RequestBody};
use crate::page::{Effect, EffectSink, Region};
use crate::task::PendingRedirect;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

pub const SUCCESS_MESSAGE: &str = "Registration successful! Redirecting to the application page...";

/// Values read from the registration form. Sent as-is, without format checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
}

/// Wire shape the registration endpoint expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationPayload {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Phone Number")]
    pub phone_number: String,
}

impl From<RegistrationForm> for RegistrationPayload {
    fn from(form: RegistrationForm) -> Self {
        Self {
            name: form.name,
            email: form.email,
            address: form.address,
            phone_number: form.phone,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Rejection {
    detail: Option<serde_json::Value>,
}

pub fn plan_registration(form: RegistrationForm, endpoint: &Url) -> Result<HttpRequest> {
    let payload = serde_json::to_value(RegistrationPayload::from(form))?;
    Ok(HttpRequest::post(endpoint.clone(), RequestBody::Json(payload)).with_header("Content-Type", "application/json"))
}

/// Result of interpreting the registration response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationResponse {
    Accepted,
    Rejected { detail: String },
}

impl RegistrationResponse {
    pub fn effects(&self) -> Vec<Effect> {
        let text = match self {
            RegistrationResponse::Accepted => SUCCESS_MESSAGE.to_string(),
            RegistrationResponse::Rejected { detail } => format!("Registration failed: {detail}"),
        };
        vec![Effect::SetText {
            region: Region::Message,
            text,
        }]
    }
}

/// Interpret the registration response.
///
/// A rejection must carry a JSON body with a `detail` field; anything else is a decode error.
pub fn interpret_registration_response(response: &HttpResponse) -> Result<RegistrationResponse> {
    if response.is_success() {
        return Ok(RegistrationResponse::Accepted);
    }

    let rejection: Rejection = response.json()?;
    let detail = match rejection.detail {
        Some(serde_json::Value::String(detail)) => detail,
        Some(other) => other.to_string(),
        None => {
            return Err(Error::Other(anyhow::anyhow!(
                "registration rejected with status {} and no detail",
                response.status
            )));
        }
    };
    Ok(RegistrationResponse::Rejected { detail })
}

pub fn registration_failure_effects(err: &Error) -> Vec<Effect> {
    vec![Effect::SetText {
        region: Region::Message,
        text: format!("Error: {}", err.user_message()),
    }]
}

/// How a finished registration ended.
#[derive(Debug)]
pub enum RegistrationOutcome {
    /// Accepted; the redirect still has to be awaited (or cancelled) by the caller
    Registered(PendingRedirect),
    Rejected { detail: String },
}

impl<H: HttpClient> Client<H> {
    /// Submit the registration form.
    ///
    /// The returned redirect is already counting down from the moment the response was accepted,
    /// and is cancelled along with `cancel`.
    #[tracing::instrument(skip_all, fields(endpoint = %self.endpoints.register))]
    pub async fn register(
        &self,
        form: RegistrationForm,
        sink: &dyn EffectSink,
        cancel: &CancellationToken,
    ) -> Result<RegistrationOutcome> {
        let _guard = self.registrations.try_begin()?;

        let result = async {
            let request = plan_registration(form, &self.endpoints.register)?;
            let response = self.execute(&request, cancel, "registration").await?;
            let interpreted = interpret_registration_response(&response)?;
            sink.apply_all(interpreted.effects());
            Ok::<_, Error>(interpreted)
        }
        .await;

        match result {
            Ok(RegistrationResponse::Accepted) => {
                tracing::info!(redirect_to = %self.app_path, delay = ?self.redirect_delay, "Registration accepted");
                Ok(RegistrationOutcome::Registered(
                    PendingRedirect::new(&self.app_path, self.redirect_delay).cancelled_by(cancel),
                ))
            }
            Ok(RegistrationResponse::Rejected { detail }) => {
                tracing::warn!(detail = %detail, "Registration rejected");
                Ok(RegistrationOutcome::Rejected { detail })
            }
            Err(err) => {
                err.log();
                if !matches!(err, Error::Cancelled { .. }) {
                    sink.apply_all(registration_failure_effects(&err));
                }
                Err(err)
            }
        }
    }
}
