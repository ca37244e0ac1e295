//! # Potbot Backend Client
//!
//! Thin async wrapper over the JSON endpoints of the potbot backend. All business
//! logic (authentication, ownership checks, log storage) lives server-side; this
//! module only shapes requests, carries the session cookie and maps responses.
//!
//! ## Endpoints
//!
//! | Call            | Endpoint                      |
//! |-----------------|-------------------------------|
//! | `register`      | `POST /api/register`          |
//! | `login`         | `POST /api/login`             |
//! | `logout`        | `POST /api/logout`            |
//! | `me`            | `GET /api/me`                 |
//! | `add_plant`     | `POST /api/add_plant`         |
//! | `plants`        | `GET /api/get_all_my_plants`  |
//! | `plant_logs`    | `POST /api/get_plant_logs`    |
//!
//! ## Sessions
//!
//! The backend issues a `potbot_session` cookie on login and registration. The
//! client keeps that cookie itself (rather than in a cookie jar) so that it can
//! be persisted by [`crate::session`] and restored on the next run.
//!
//! ## Error Handling
//!
//! Non-2xx responses carry a plain-text message which is surfaced verbatim:
//! - **401**: [`ClientError::Unauthorized`], the session is missing or expired
//! - **other**: [`ClientError::Status`] with the status code and message
//! - **transport**: [`ClientError::Http`] for connect, timeout and decode failures
//!
//! Form validation that the backend would reject anyway is done up front and
//! reported as [`ClientError::Invalid`] without a network round trip.

use crate::config::Config;
use crate::view::TimeWindow;
use crate::SeriesSet;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Name of the backend's session cookie
pub const SESSION_COOKIE: &str = "potbot_session";

/// Plant types the backend accepts on registration
pub const PLANT_TYPES: [&str; 3] = ["tomato", "basil", "succulent"];

/// Errors that can occur while talking to the backend.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport failure (connect, timeout, body decode)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The session is missing, expired or rejected
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Any other non-success status
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Request rejected before it was sent
    #[error("{0}")]
    Invalid(String),
}

/// An account as reported by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub email: String,
    #[serde(default)]
    pub username: String,
}

/// A plant owned by the logged-in user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plant {
    #[serde(rename = "plantName", default)]
    pub name: String,
    #[serde(rename = "plantID")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Registration form.
#[derive(Clone, Debug, Serialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(skip)]
    pub confirm_password: String,
}

impl Registration {
    /// Check the form the way the sign-up page does before submitting.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.username.is_empty()
            || self.email.is_empty()
            || self.password.is_empty()
            || self.confirm_password.is_empty()
        {
            return Err(ClientError::Invalid(
                "All required fields must be filled".into(),
            ));
        }
        if self.password != self.confirm_password {
            return Err(ClientError::Invalid("Passwords do not match".into()));
        }
        Ok(())
    }
}

/// Request body for claiming a plant id.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewPlant {
    #[serde(rename = "plantId")]
    pub id: String,
    #[serde(rename = "plantName")]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl NewPlant {
    /// Build a validated request; the id is trimmed.
    pub fn new(id: &str, kind: &str, name: Option<&str>) -> Result<Self, ClientError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ClientError::Invalid("Plant id is required".into()));
        }
        if !PLANT_TYPES.contains(&kind) {
            return Err(ClientError::Invalid("Invalid plant type".into()));
        }
        Ok(Self {
            id: id.to_string(),
            name: name.unwrap_or_default().trim().to_string(),
            kind: kind.to_string(),
        })
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct PlantLogsRequest<'a> {
    #[serde(rename = "plantID")]
    plant_id: &'a str,
    #[serde(rename = "startDate")]
    start: &'a crate::Timestamp,
    #[serde(rename = "endDate")]
    end: &'a crate::Timestamp,
}

/// Async client for the potbot backend.
///
/// # Example
/// ```no_run
/// use potbot_lib::{align::align, client::PotbotClient, view::TimeWindow};
/// use std::time::Duration;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let mut client = PotbotClient::new("http://localhost:8080", Duration::from_secs(10))?;
/// client.login("fern", "hunter2").await?;
///
/// let logs = client.plant_logs("plant_00042", &TimeWindow::last_days(7)?).await?;
/// let table = align(&logs);
/// println!("{} aligned rows", table.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PotbotClient {
    http: reqwest::Client,
    base_url: String,
    session: Option<String>,
}

impl PotbotClient {
    /// Create a client for `base_url` (scheme and host, no `/api` suffix).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session: None,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        Self::new(config.server.base_url.clone(), config.request_timeout())
    }

    /// Restore a previously saved `potbot_session=...` cookie pair.
    pub fn with_session(mut self, cookie: Option<String>) -> Self {
        self.session = cookie;
        self
    }

    /// Current session cookie pair, if logged in.
    pub fn session_cookie(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Create an account; the backend logs the new user in immediately.
    pub async fn register(&mut self, form: &Registration) -> Result<User, ClientError> {
        form.validate()?;
        let resp = self.request(Method::POST, "register").json(form).send().await?;
        let resp = check(resp).await?;
        self.capture_session(&resp);
        let user: User = resp.json().await?;
        info!(user_id = user.user_id, "registered");
        Ok(user)
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<User, ClientError> {
        if username.is_empty() || password.is_empty() {
            return Err(ClientError::Invalid(
                "All required fields must be filled".into(),
            ));
        }
        let resp = self
            .request(Method::POST, "login")
            .json(&LoginRequest { username, password })
            .send()
            .await?;
        let resp = check(resp).await?;
        self.capture_session(&resp);
        let user: User = resp.json().await?;
        info!(user_id = user.user_id, "logged in");
        Ok(user)
    }

    /// End the session server-side and forget the cookie locally.
    ///
    /// The cookie is dropped even if the request fails.
    pub async fn logout(&mut self) -> Result<(), ClientError> {
        let result = self.request(Method::POST, "logout").send().await;
        self.session = None;
        check(result?).await?;
        Ok(())
    }

    /// Verify the current session; 401 means it is no longer valid.
    pub async fn me(&self) -> Result<User, ClientError> {
        let resp = self.request(Method::GET, "me").send().await?;
        Ok(check(resp).await?.json().await?)
    }

    /// Claim an unassigned plant id for the logged-in user.
    pub async fn add_plant(&self, plant: &NewPlant) -> Result<(), ClientError> {
        let resp = self
            .request(Method::POST, "add_plant")
            .json(plant)
            .send()
            .await?;
        check(resp).await?;
        info!(plant = %plant.id, "plant added");
        Ok(())
    }

    /// Plants owned by the logged-in user.
    pub async fn plants(&self) -> Result<Vec<Plant>, ClientError> {
        let resp = self.request(Method::GET, "get_all_my_plants").send().await?;
        // The backend encodes an empty list as `null`
        let plants: Option<Vec<Plant>> = check(resp).await?.json().await?;
        Ok(plants.unwrap_or_default())
    }

    /// Sensor logs of one plant within `window`.
    ///
    /// Samples with non-finite values are dropped here, before they can reach
    /// the aligner.
    pub async fn plant_logs(
        &self,
        plant_id: &str,
        window: &TimeWindow,
    ) -> Result<SeriesSet, ClientError> {
        if plant_id.is_empty() {
            return Err(ClientError::Invalid("Missing plant id".into()));
        }
        let body = PlantLogsRequest {
            plant_id,
            start: &window.start,
            end: &window.end,
        };
        debug!(plant = plant_id, start = %window.start, end = %window.end, "fetching plant logs");

        let resp = self
            .request(Method::POST, "get_plant_logs")
            .json(&body)
            .send()
            .await?;
        let mut logs: SeriesSet = check(resp).await?.json().await?;

        let dropped = logs.retain_finite();
        if dropped > 0 {
            warn!(plant = plant_id, dropped, "dropped samples with non-finite values");
        }
        Ok(logs)
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/{}", self.base_url, endpoint)
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(endpoint));
        match &self.session {
            Some(cookie) => builder.header(COOKIE, cookie),
            None => builder,
        }
    }

    /// Remember the session cookie set by the response, if any.
    fn capture_session(&mut self, resp: &Response) {
        let cookie = resp
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(parse_session_cookie);
        if let Some(cookie) = cookie {
            self.session = Some(cookie);
        }
    }
}

/// Extract the `potbot_session=value` pair from a `Set-Cookie` header value.
///
/// Returns `None` for other cookies and for the empty value the backend sends
/// when clearing the session.
fn parse_session_cookie(header: &str) -> Option<String> {
    let pair = header.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    if name != SESSION_COOKIE || value.is_empty() {
        return None;
    }
    Some(pair.to_string())
}

/// Map non-success responses to errors carrying the server's message.
async fn check(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default().trim().to_string();
    debug!(status = status.as_u16(), %message, "request failed");
    if status == StatusCode::UNAUTHORIZED {
        Err(ClientError::Unauthorized(message))
    } else {
        Err(ClientError::Status {
            status: status.as_u16(),
            message,
        })
    }
}
