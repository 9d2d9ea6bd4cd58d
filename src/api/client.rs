//! REST client for the Budgetly API.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use regex::Regex;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::error::ApiError;
use crate::budget::{Budget, Transaction};
use crate::cache::{cache_key, CacheConfig, CacheOptions, ResponseCache};
use crate::cancel::CancellationScope;
use crate::config::Config;
use crate::retry::{execute_observed, RetryPolicy, TracingObserver};

/// Keys of cached responses that change when an expense is written.
const EXPENSE_DEPENDENT_KEYS: &str = r"/(expenses|budgets)(\?|$)";

/// Settings for [`ApiClient::init`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub token: Option<String>,
    /// Policy for GET requests that do not name their own.
    pub retry: RetryPolicy,
    pub cache: CacheConfig,
    pub request_timeout: Duration,
    /// Background purge interval for expired cache entries. `None` disables it.
    pub sweep_interval: Option<Duration>,
}

impl ClientConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            token: None,
            retry: RetryPolicy::standard(),
            cache: CacheConfig::default(),
            request_timeout: Duration::from_secs(30),
            sweep_interval: None,
        }
    }
}

impl From<&Config> for ClientConfig {
    fn from(config: &Config) -> Self {
        Self {
            base_url: config.api_url.clone(),
            token: config.api_token.clone(),
            retry: config.retry,
            cache: CacheConfig {
                default_ttl: config.cache_ttl,
                stale_on_error: config.stale_on_error,
                max_stale: config.cache_max_stale,
            },
            request_timeout: config.request_timeout,
            sweep_interval: config.cache_sweep_interval,
        }
    }
}

/// Per-request options for GET calls.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    /// Overrides the client's default retry policy.
    pub retry: Option<RetryPolicy>,
    /// Aborts the request (including backoff waits) when cancelled.
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// List endpoints answer either with a bare array or a paginated envelope.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListResponse<T> {
    Plain(Vec<T>),
    Paged { items: Vec<T> },
}

impl<T> ListResponse<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            Self::Plain(items) | Self::Paged { items } => items,
        }
    }
}

/// Fields sent when recording an expense.
#[derive(Debug, Clone, Serialize)]
pub struct NewExpense {
    pub category: String,
    pub amount: rust_decimal::Decimal,
    pub date: chrono::NaiveDate,
    pub description: String,
}

/// Session context for talking to the API.
///
/// Owns the HTTP client, auth token, response cache and the cancellation
/// scope for requests bound to this session.
///
/// # Lifecycle
/// `init` → active → `teardown`. Teardown cancels in-flight requests,
/// stops the cache sweeper and drops cached data.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: RwLock<Option<String>>,
    retry: RetryPolicy,
    cache: Arc<ResponseCache>,
    scope: CancellationScope,
    sweeper: Option<(CancellationToken, JoinHandle<()>)>,
    expense_keys: Regex,
}

impl ApiClient {
    /// Build an active client.
    ///
    /// Must be called inside a tokio runtime when `sweep_interval` is set.
    pub fn init(config: ClientConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::Client(e.to_string()))?;
        let expense_keys =
            Regex::new(EXPENSE_DEPENDENT_KEYS).map_err(|e| ApiError::Client(e.to_string()))?;

        let cache: Arc<ResponseCache> = Arc::new(ResponseCache::new(config.cache));
        let sweeper = config.sweep_interval.filter(|d| !d.is_zero()).map(|every| {
            let stop = CancellationToken::new();
            let handle = cache.spawn_sweeper(every, stop.clone());
            (stop, handle)
        });

        tracing::info!(base_url = %config.base_url, retry = %config.retry, "API client ready");

        Ok(Self {
            http,
            base_url: normalize_base(config.base_url),
            token: RwLock::new(config.token),
            retry: config.retry,
            cache,
            scope: CancellationScope::new(),
            sweeper,
            expense_keys,
        })
    }

    /// End the session.
    pub async fn teardown(mut self) {
        self.scope.cancel_all();
        if let Some((stop, handle)) = self.sweeper.take() {
            stop.cancel();
            if let Err(e) = handle.await {
                tracing::warn!("Cache sweeper ended abnormally: {}", e);
            }
        }
        self.cache.clear();
        tracing::info!("API client torn down");
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    /// Forget the token, e.g. after a 401.
    pub fn clear_token(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn has_token(&self) -> bool {
        self.token().is_some()
    }

    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Scope for requests that should die with this session.
    pub fn scope(&self) -> &CancellationScope {
        &self.scope
    }

    /// Absolute URL for an API path.
    pub fn url(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// GET `path` and decode the JSON body, retrying transient failures.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<T, ApiError> {
        let url = self.url(path)?;
        decode(self.get_value(url, options).await?)
    }

    /// GET through the response cache.
    ///
    /// The cache key is the URL plus its sorted query parameters unless
    /// `cache.cache_key` names one.
    pub async fn cached_get<T: DeserializeOwned>(
        &self,
        path: &str,
        options: &RequestOptions,
        cache: &CacheOptions,
    ) -> Result<T, ApiError> {
        let url = self.url(path)?;
        let key = cache_key(
            url.as_str(),
            options.query.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        );
        let value = self
            .cache
            .cached_fetch(&key, cache, || self.get_value(url.clone(), options))
            .await?;
        decode(value)
    }

    /// POST a JSON body. Never retried.
    ///
    /// On success, cached entries whose key matches `invalidate` are removed.
    pub async fn post_json<B, T>(
        &self,
        path: &str,
        body: &B,
        invalidate: Option<&Regex>,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path)?;
        let body = serde_json::to_value(body).map_err(|e| ApiError::Client(e.to_string()))?;
        let value = self.send(Method::POST, url, &[], Some(&body)).await?;
        if let Some(pattern) = invalidate {
            self.cache.clear_pattern(pattern);
        }
        decode(value)
    }

    /// All budgets of the signed-in user.
    pub async fn fetch_budgets(&self, cache: &CacheOptions) -> Result<Vec<Budget>, ApiError> {
        let list: ListResponse<Budget> = self
            .cached_get("budgets", &RequestOptions::new(), cache)
            .await?;
        Ok(list.into_items())
    }

    /// All expenses of the signed-in user.
    pub async fn fetch_expenses(&self, cache: &CacheOptions) -> Result<Vec<Transaction>, ApiError> {
        let list: ListResponse<Transaction> = self
            .cached_get("expenses", &RequestOptions::new(), cache)
            .await?;
        Ok(list.into_items())
    }

    /// Record an expense and drop cached expense and budget listings.
    pub async fn create_expense(&self, expense: &NewExpense) -> Result<Transaction, ApiError> {
        self.post_json("expenses", expense, Some(&self.expense_keys))
            .await
    }

    async fn get_value(&self, url: Url, options: &RequestOptions) -> Result<Value, ApiError> {
        let policy = options.retry.unwrap_or(self.retry);
        let attempts = execute_observed(
            || self.send(Method::GET, url.clone(), &options.query, None),
            &policy,
            &TracingObserver,
        );

        match &options.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(ApiError::Cancelled),
                result = attempts => result,
            },
            None => attempts.await,
        }
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        tracing::debug!(%method, %url, "Sending request");

        let mut request = self.http.request(method, url.clone());
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = self.token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(ApiError::from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::debug!(%url, status = status.as_u16(), "Request failed");
            return Err(ApiError::from_response(status.as_u16(), &text));
        }

        let bytes = response.bytes().await.map_err(ApiError::from_reqwest)?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}

/// `Url::join` replaces the last segment unless the base ends with `/`.
fn normalize_base(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}
