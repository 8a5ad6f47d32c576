use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{ModuleCache, DEFAULT_UPDATE_INTERVAL};
use crate::logger::{ExchangeLogMode, ExchangeLogger};
use crate::protocol::{
    authentication_data, const_temp_data, module_path, modules_path, parse_module_document,
    user_id_string, zone_state_data, zones_path, AUTHENTICATION_PATH, DEFAULT_BASE_URL,
};
use crate::session::{Credentials, Session};
use crate::types::*;
use crate::{Error, Result};

type RefreshCallback = Box<dyn Fn(&str, &ModuleSnapshot) + Send + Sync>;

#[derive(Deserialize)]
struct AuthResponse {
    authenticated: bool,
    #[serde(default)]
    user_id: Option<Value>,
    #[serde(default)]
    token: Option<String>,
}

pub struct TechClientBuilder {
    base_url: String,
    update_interval: Duration,
    credentials: Option<Credentials>,
    http: Option<reqwest::Client>,
    log_mode: Option<ExchangeLogMode>,
    log_path: Option<PathBuf>,
    refresh_callbacks: Vec<RefreshCallback>,
}

impl Default for TechClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TechClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            update_interval: DEFAULT_UPDATE_INTERVAL,
            credentials: None,
            http: None,
            log_mode: None,
            log_path: None,
            refresh_callbacks: Vec::new(),
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        let mut url = url.into();
        if !url.ends_with('/') {
            url.push('/');
        }
        self.base_url = url;
        self
    }

    /// Maximum age of a cached module snapshot.
    pub fn update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Starts the client already authenticated, e.g. from stored config.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Shares an existing HTTP client instead of building one.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn exchange_log(mut self, mode: ExchangeLogMode, path: impl Into<PathBuf>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn on_refresh(mut self, f: impl Fn(&str, &ModuleSnapshot) + Send + Sync + 'static) -> Self {
        self.refresh_callbacks.push(Box::new(f));
        self
    }

    pub fn build(self) -> Result<TechClient> {
        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder().build()?,
        };

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(Mutex::new(ExchangeLogger::new(mode, path)?)),
            _ => None,
        };

        Ok(TechClient {
            http,
            base_url: self.base_url,
            session: self
                .credentials
                .map(Session::Authenticated)
                .unwrap_or_default(),
            cache: ModuleCache::new(self.update_interval),
            logger,
            refresh_callbacks: self.refresh_callbacks,
        })
    }
}

pub struct TechClient {
    http: reqwest::Client,
    base_url: String,
    session: Session,
    cache: ModuleCache,
    logger: Option<Mutex<ExchangeLogger>>,
    refresh_callbacks: Vec<RefreshCallback>,
}

impl TechClient {
    pub fn builder() -> TechClientBuilder {
        TechClientBuilder::new()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Current credentials, for the host to persist after `authenticate`.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.session.require().ok()
    }

    /// Logs in and, on success, switches the session to the returned
    /// user id and token. Returns the server's `authenticated` flag.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<bool> {
        let data = authentication_data(username, password);
        let req = self.http.post(self.url(AUTHENTICATION_PATH));
        let result = self
            .send("POST", AUTHENTICATION_PATH, req, Some(&data))
            .await?;
        let auth: AuthResponse = serde_json::from_value(result)?;

        if !auth.authenticated {
            debug!("authentication rejected");
            self.session = Session::Anonymous;
            return Ok(false);
        }

        let user_id = auth
            .user_id
            .as_ref()
            .and_then(user_id_string)
            .ok_or_else(|| Error::Protocol("authentication response missing user_id".into()))?;
        let token = auth
            .token
            .ok_or_else(|| Error::Protocol("authentication response missing token".into()))?;

        debug!(user_id = %user_id, "authenticated");
        self.session = Session::Authenticated(Credentials::new(user_id, token));
        Ok(true)
    }

    pub async fn list_modules(&self) -> Result<Vec<Module>> {
        let creds = self.session.require()?;
        let result = self.get(creds, &modules_path(&creds.user_id)).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// The raw module document, bypassing the cache.
    pub async fn get_module_data(&self, udid: &str) -> Result<Value> {
        let creds = self.session.require()?;
        debug!(udid, user_id = %creds.user_id, "getting module data");
        self.get(creds, &module_path(&creds.user_id, udid)).await
    }

    /// Zones and tiles of `udid`, refetched when older than the update
    /// interval. Both views always come from the same fetch.
    pub async fn module_data(&self, udid: &str) -> Result<Arc<ModuleSnapshot>> {
        let (snapshot, refreshed) = self
            .cache
            .get_or_refresh(udid, move || async move {
                let doc = self.get_module_data(udid).await?;
                Ok::<_, Error>(parse_module_document(&doc))
            })
            .await?;

        if refreshed {
            debug!(
                udid,
                zones = snapshot.zones.len(),
                tiles = snapshot.tiles.len(),
                "module cache updated"
            );
            for cb in &self.refresh_callbacks {
                cb(udid, &snapshot);
            }
        }
        Ok(snapshot)
    }

    pub async fn get_module_zones(&self, udid: &str) -> Result<BTreeMap<ZoneId, Zone>> {
        Ok(self.module_data(udid).await?.zones.clone())
    }

    pub async fn get_module_tiles(&self, udid: &str) -> Result<BTreeMap<TileId, Tile>> {
        Ok(self.module_data(udid).await?.tiles.clone())
    }

    pub async fn get_zone(&self, udid: &str, zone_id: ZoneId) -> Result<Zone> {
        self.module_data(udid)
            .await?
            .zones
            .get(&zone_id)
            .cloned()
            .ok_or_else(|| Error::ZoneNotFound {
                module: udid.to_string(),
                zone: zone_id,
            })
    }

    pub async fn get_tile(&self, udid: &str, tile_id: TileId) -> Result<Tile> {
        self.module_data(udid)
            .await?
            .tiles
            .get(&tile_id)
            .cloned()
            .ok_or_else(|| Error::TileNotFound {
                module: udid.to_string(),
                tile: tile_id,
            })
    }

    /// Switches the zone to constant-temperature mode at `target`.
    /// Returns the API response verbatim.
    pub async fn set_const_temp(
        &self,
        udid: &str,
        zone_id: ZoneId,
        target: Temperature,
    ) -> Result<Value> {
        let creds = self.session.require()?;
        if !target.celsius().is_finite() {
            return Err(Error::Protocol(format!("target temperature {target} is not finite")));
        }

        // Any snapshot, stale or not, carries the mode id.
        let snapshot = match self.cache.cached(udid).await {
            Some(snapshot) => snapshot,
            None => self.module_data(udid).await?,
        };
        let zone = snapshot.zones.get(&zone_id).ok_or_else(|| Error::ZoneNotFound {
            module: udid.to_string(),
            zone: zone_id,
        })?;
        let mode_id = zone
            .mode_id
            .ok_or_else(|| Error::Protocol(format!("zone {zone_id} has no mode id")))?;

        debug!(udid, zone_id, %target, "setting zone constant temperature");
        let data = const_temp_data(mode_id, zone_id, target);
        let path = zones_path(&creds.user_id, udid);
        self.post_command("set_const_temp", creds, zone_id, &path, &data).await
    }

    /// Turns the zone on or off. Returns the API response verbatim.
    pub async fn set_zone(&self, udid: &str, zone_id: ZoneId, on: bool) -> Result<Value> {
        let creds = self.session.require()?;
        let state = if on { ZoneState::On } else { ZoneState::Off };

        debug!(udid, zone_id, on, "turning zone on/off");
        let data = zone_state_data(zone_id, state);
        let path = zones_path(&creds.user_id, udid);
        self.post_command("set_zone", creds, zone_id, &path, &data).await
    }

    /// Marks `udid` stale so the next read refetches it.
    pub async fn invalidate(&self, udid: &str) {
        self.cache.invalidate(udid).await;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, creds: &Credentials, path: &str) -> Result<Value> {
        let req = self.http.get(self.url(path)).bearer_auth(creds.token.expose_secret());
        self.send("GET", path, req, None).await
    }

    async fn post_command(
        &self,
        action: &str,
        creds: &Credentials,
        zone_id: ZoneId,
        path: &str,
        data: &Value,
    ) -> Result<Value> {
        self.with_logger(|logger| logger.log_command(action, Some(zone_id), data));
        let req = self.http.post(self.url(path)).bearer_auth(creds.token.expose_secret());
        let result = self.send("POST", path, req, Some(data)).await?;
        debug!(action, response = %result, "command accepted");
        Ok(result)
    }

    async fn send(
        &self,
        method: &str,
        path: &str,
        req: RequestBuilder,
        body: Option<&Value>,
    ) -> Result<Value> {
        debug!(method, path, "sending request");
        self.with_logger(|logger| logger.log_request(method, path, body));

        let req = req.header(ACCEPT, "application/json");
        let req = match body {
            Some(body) => req.json(body),
            None => req,
        };
        let resp = req.send().await?;
        let status = resp.status();

        if status != StatusCode::OK {
            let body = match resp.text().await {
                Ok(body) => body,
                Err(e) => {
                    warn!(path, "failed to read error response body: {e}");
                    format!("<unreadable body: {e}>")
                }
            };
            warn!(status = status.as_u16(), path, "invalid response from Tech API");
            self.with_logger(|logger| {
                logger.log_response(path, status.as_u16(), &Value::String(body.clone()))
            });
            return Err(Error::Request {
                status: status.as_u16(),
                body,
            });
        }

        let data: Value = resp.json().await?;
        self.with_logger(|logger| logger.log_response(path, status.as_u16(), &data));
        Ok(data)
    }

    fn with_logger(&self, f: impl FnOnce(&mut ExchangeLogger)) {
        if let Some(logger) = &self.logger {
            f(&mut logger.lock().unwrap_or_else(PoisonError::into_inner));
        }
    }
}
