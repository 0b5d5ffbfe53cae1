//! Upcoming calendar events
//!
//! Reads the next few events from the user's primary Google Calendar
//! using service account authentication.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{Error, Result};

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";
const EVENTS_URL: &str = "https://www.googleapis.com/calendar/v3/calendars/primary/events";

/// Reads upcoming events from the primary calendar
pub struct CalendarClient {
    service_account_path: PathBuf,
    client: reqwest::Client,
    access_token: Arc<Mutex<Option<TokenInfo>>>,
    max_events: usize,
}

/// Cached token info
struct TokenInfo {
    access_token: String,
    expires_at: u64,
}

/// Service account JSON structure
#[derive(Debug, Deserialize)]
struct ServiceAccount {
    client_email: String,
    private_key: String,
}

/// JWT claims for Google OAuth
#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    exp: u64,
    iat: u64,
}

/// Token response from Google
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<Event>,
}

#[derive(Debug, Deserialize)]
struct Event {
    summary: Option<String>,
    location: Option<String>,
    start: Option<EventStart>,
}

#[derive(Debug, Deserialize)]
struct EventStart {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
    date: Option<String>,
}

impl CalendarClient {
    /// Create a new calendar client
    ///
    /// The service account file is read lazily on the first token
    /// request, so a bad path surfaces as a gather-time warning rather
    /// than a startup failure.
    #[must_use]
    pub fn new(service_account_path: PathBuf, max_events: usize) -> Self {
        Self {
            service_account_path,
            client: reqwest::Client::new(),
            access_token: Arc::new(Mutex::new(None)),
            max_events,
        }
    }

    /// Fetch the next events as spoken-form summaries
    ///
    /// # Errors
    ///
    /// Returns error if authentication or the events request fails
    pub async fn upcoming_events(&self) -> Result<Vec<String>> {
        let token = self.get_access_token().await?;
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let max_results = self.max_events.to_string();

        let response = self
            .client
            .get(EVENTS_URL)
            .bearer_auth(&token)
            .query(&[
                ("timeMin", now.as_str()),
                ("maxResults", max_results.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
            ])
            .send()
            .await
            .map_err(|e| Error::Calendar(format!("events request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Calendar(format!("events API error {status}: {body}")));
        }

        let list: EventList = response
            .json()
            .await
            .map_err(|e| Error::Calendar(format!("events parse error: {e}")))?;

        let events: Vec<String> = list.items.iter().map(format_event).collect();
        tracing::debug!(count = events.len(), "calendar events fetched");
        Ok(events)
    }

    /// Load service account from file
    fn load_service_account(&self) -> Result<ServiceAccount> {
        let content = std::fs::read_to_string(&self.service_account_path)
            .map_err(|e| Error::Calendar(format!("failed to read service account: {e}")))?;

        serde_json::from_str(&content)
            .map_err(|e| Error::Calendar(format!("failed to parse service account: {e}")))
    }

    /// Create JWT for token request
    fn create_jwt(service_account: &ServiceAccount) -> Result<String> {
        use jsonwebtoken::{Algorithm, EncodingKey, Header};

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let header = Header::new(Algorithm::RS256);
        let claims = JwtClaims {
            iss: &service_account.client_email,
            scope: CALENDAR_SCOPE,
            aud: GOOGLE_TOKEN_URL,
            exp: now + 3600,
            iat: now,
        };

        let key = EncodingKey::from_rsa_pem(service_account.private_key.as_bytes())
            .map_err(|e| Error::Calendar(format!("invalid private key: {e}")))?;

        jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|e| Error::Calendar(format!("JWT encoding failed: {e}")))
    }

    /// Get or refresh access token
    async fn get_access_token(&self) -> Result<String> {
        {
            let token_guard = self.access_token.lock().await;
            if let Some(ref token_info) = *token_guard {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap()
                    .as_secs();

                // Reuse the cached token unless it expires within 5 minutes
                if token_info.expires_at > now + 300 {
                    return Ok(token_info.access_token.clone());
                }
            }
        }

        let service_account = self.load_service_account()?;
        let jwt = Self::create_jwt(&service_account)?;

        let response = self
            .client
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await
            .map_err(|e| Error::Calendar(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Calendar(format!(
                "token request failed: {status} - {body}"
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Calendar(format!("token parse error: {e}")))?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let token_info = TokenInfo {
            access_token: token_response.access_token.clone(),
            expires_at: now + token_response.expires_in,
        };

        {
            let mut token_guard = self.access_token.lock().await;
            *token_guard = Some(token_info);
        }

        Ok(token_response.access_token)
    }
}

/// Render one event the way it should be spoken
///
/// Timed events get a weekday-and-time phrase; all-day events keep their
/// raw date.
fn format_event(event: &Event) -> String {
    let summary = event.summary.as_deref().unwrap_or("(No title)");

    let start_fmt = event.start.as_ref().map_or_else(String::new, |start| {
        if let Some(date_time) = &start.date_time {
            DateTime::parse_from_rfc3339(date_time).map_or_else(
                |_| date_time.clone(),
                |dt| dt.format("%A, %b %d at %I:%M %p").to_string(),
            )
        } else {
            start.date.clone().unwrap_or_default()
        }
    });

    let mut entry = format!("{summary} on {start_fmt}");
    if let Some(location) = &event.location {
        if !location.is_empty() {
            entry.push_str(&format!(" @ {location}"));
        }
    }
    entry
}
