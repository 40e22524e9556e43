//! HTTP backend for a hosted PostgREST + auth service.
//!
//! Tables live under `/rest/v1/{table}` and auth under `/auth/v1`. Every
//! request carries the project's `apikey`; the bearer token is the session's
//! access token once signed in and the anon key before that.

pub mod error;
pub mod params;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use plotpot_types::api::{AuthSession, AuthUser, Credentials, Identity};
use plotpot_types::{Backend, BackendError, Filter, Query, Table};

use crate::error::{ErrorBody, from_status, from_transport};

#[derive(Clone)]
pub struct RestBackend {
    inner: Arc<RestInner>,
}

struct RestInner {
    http: Client,
    base_url: String,
    api_key: String,
    session: RwLock<Option<RestSession>>,
}

#[derive(Clone)]
struct RestSession {
    access_token: String,
    identity: Identity,
}

impl RestBackend {
    /// `base_url` is the project URL, e.g. `https://xyz.supabase.co`.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Other(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            inner: Arc::new(RestInner {
                http,
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key: api_key.to_string(),
                session: RwLock::new(None),
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    fn session(&self) -> Option<RestSession> {
        self.inner
            .session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_session(&self, session: Option<RestSession>) {
        *self
            .inner
            .session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = session;
    }

    fn bearer(&self) -> String {
        self.session()
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.inner.api_key.clone())
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.inner.base_url, table.name())
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.inner.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.inner.api_key)
            .header("Authorization", format!("Bearer {}", self.bearer()))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let resp = self
            .authorized(request)
            .send()
            .await
            .map_err(from_transport)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!("Backend request failed ({}): {}", status, body);
            return Err(from_status(status.as_u16(), ErrorBody::parse(&body)));
        }
        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    fn start_session(&self, session: AuthSession) -> Identity {
        let identity = Identity::from(session.user);
        self.set_session(Some(RestSession {
            access_token: session.access_token,
            identity: identity.clone(),
        }));
        identity
    }
}

impl Backend for RestBackend {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, BackendError> {
        let request = self
            .inner
            .http
            .get(self.table_url(query.table))
            .query(&params::select_params(query));

        let rows: Vec<Value> = self.send_json(request).await?;
        debug!("Fetched {} rows from {}", rows.len(), query.table);
        Ok(rows)
    }

    async fn insert(&self, table: Table, row: Value) -> Result<Value, BackendError> {
        let request = self
            .inner
            .http
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&row);

        let rows: Vec<Value> = self.send_json(request).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::Decode(format!("insert into {} returned no row", table)))
    }

    async fn update(&self, table: Table, filters: &[Filter], changes: Value) -> Result<Vec<Value>, BackendError> {
        let request = self
            .inner
            .http
            .patch(self.table_url(table))
            .query(&params::filter_params(filters))
            .header("Prefer", "return=representation")
            .json(&changes);

        self.send_json(request).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let request = self.inner.http.post(self.auth_url("signup")).json(&credentials);
        let body: Value = self.send_json(request).await?;

        // With email confirmation enabled the service returns the bare user
        // and no session.
        if body.get("access_token").is_some() {
            let session: AuthSession =
                serde_json::from_value(body).map_err(|e| BackendError::Decode(e.to_string()))?;
            let identity = self.start_session(session);
            info!("Signed up {}", identity.id);
            Ok(identity)
        } else {
            let user: AuthUser =
                serde_json::from_value(body).map_err(|e| BackendError::Decode(e.to_string()))?;
            info!("Signed up {} (awaiting email confirmation)", user.id);
            Ok(Identity::from(user))
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let request = self
            .inner
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .json(&credentials);

        let session: AuthSession = self.send_json(request).await?;
        let identity = self.start_session(session);
        info!("Signed in {}", identity.id);
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if self.session().is_none() {
            return Ok(());
        }

        let request = self.inner.http.post(self.auth_url("logout"));
        let result = self.send(request).await;
        self.set_session(None);

        match result {
            Ok(_) | Err(BackendError::Unauthenticated(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn current_identity(&self) -> Option<Identity> {
        self.session().map(|s| s.identity)
    }
}
