//! The evaluation client and its builder.
//!
//! The [`Client`] type is the main entry point for querying a PDP.
//! Use [`ClientBuilder`] to configure and create clients.

use crate::{
    codec,
    config::{Config, ConfigOverrides, EnvSource, ProcessEnv},
    endpoint,
    retry::RetryPolicy,
    transport::{HttpTransport, RawResponse, Transport},
    Error, Response, Result,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// A blocking client for a Policy Decision Point.
///
/// Every evaluation encodes the input to JSON, POSTs it to the configured
/// endpoint with bounded retries on network failures, and decodes the
/// response body. The status code is not inspected unless the client was
/// built with [`ClientBuilder::error_for_status`].
///
/// The client is cheap to clone and safe to share across threads; clones
/// share one connection pool.
///
/// # Examples
///
/// ```no_run
/// use pdp_client::{Client, PdpRequest};
/// use serde_json::json;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), pdp_client::Error> {
/// let client = Client::builder()
///     .hostname("pdp.internal")
///     .port(8181)
///     .policy_path("/v1/data/authz")
///     .retry_max_attempts(3)
///     .retry_backoff(Duration::from_millis(100))
///     .build()?;
///
/// // Free-form input
/// let tree = client.get_json_response(&json!({ "user": "alice", "action": "read" }))?;
/// println!("result: {}", tree["result"]);
///
/// // Typed input, shallow mapping output
/// let request = PdpRequest::new("alice", "read", "reports/q3");
/// let mapping = client.get_mapped_response(&request)?;
/// println!("keys: {:?}", mapping.keys().collect::<Vec<_>>());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: Config,
    endpoint: Url,
    transport: Box<dyn Transport>,
    retry_policy: RetryPolicy,
    error_for_status: bool,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("config", &self.inner.config)
            .field("retry_policy", &self.inner.retry_policy)
            .field("error_for_status", &self.inner.error_for_status)
            .finish()
    }
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Builds a client from the process environment and defaults only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] if the resolved configuration
    /// does not form a valid endpoint.
    pub fn from_env() -> Result<Self> {
        ClientBuilder::new().build()
    }

    /// Returns the resolved configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns the URL every evaluation is POSTed to.
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Returns the retry policy applied to every evaluation.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry_policy
    }

    /// Evaluates `input` and decodes the whole response into a JSON tree.
    ///
    /// `input` can be any serializable value: a `serde_json` value, a map,
    /// a [`PdpRequest`](crate::PdpRequest), or a caller-defined type.
    ///
    /// # Errors
    ///
    /// - [`Error::SerializationFailed`] if `input` cannot be encoded
    /// - [`Error::Transport`] if every attempt failed at the network layer
    /// - [`Error::DeserializationFailed`] if the body is not JSON
    /// - [`Error::HttpError`] for status 400 and above, in strict mode only
    pub fn get_json_response<I>(&self, input: &I) -> Result<Value>
    where
        I: Serialize + ?Sized,
    {
        let (raw, _) = self.dispatch(input)?;
        codec::decode_tree(&raw.body, raw.status)
    }

    /// Evaluates `input` and decodes the response into a string-keyed
    /// mapping whose values are arbitrary JSON.
    ///
    /// # Errors
    ///
    /// Same as [`get_json_response`](Self::get_json_response), plus
    /// [`Error::DeserializationFailed`] if the body is valid JSON but not an
    /// object.
    pub fn get_mapped_response<I>(&self, input: &I) -> Result<Map<String, Value>>
    where
        I: Serialize + ?Sized,
    {
        let (raw, _) = self.dispatch(input)?;
        codec::decode_map(&raw.body, raw.status)
    }

    /// Evaluates `input` and decodes the response into `T`, keeping the
    /// status, headers, raw body, latency and attempt count.
    ///
    /// # Errors
    ///
    /// Same as [`get_json_response`](Self::get_json_response).
    pub fn evaluate<T, I>(&self, input: &I) -> Result<Response<T>>
    where
        T: DeserializeOwned,
        I: Serialize + ?Sized,
    {
        let start_time = Instant::now();
        let (raw, attempts) = self.dispatch(input)?;
        let latency = start_time.elapsed();

        let data = codec::decode(&raw.body, raw.status)?;
        Ok(Response::new(
            data,
            raw.text(),
            raw.status,
            raw.headers,
            latency,
            attempts,
        ))
    }

    /// Evaluates `input` and returns the undecoded response.
    ///
    /// # Errors
    ///
    /// Same as [`get_json_response`](Self::get_json_response), minus the
    /// decoding failure.
    pub fn evaluate_raw<I>(&self, input: &I) -> Result<RawResponse>
    where
        I: Serialize + ?Sized,
    {
        self.dispatch(input).map(|(raw, _)| raw)
    }

    /// Encodes `input` and POSTs it under the retry policy.
    ///
    /// Returns the response and the number of attempts it took.
    fn dispatch<I>(&self, input: &I) -> Result<(RawResponse, u32)>
    where
        I: Serialize + ?Sized,
    {
        let body = codec::encode(input)?;
        let url = &self.inner.endpoint;
        let start_time = Instant::now();

        let outcome = self.inner.retry_policy.run(|attempt| {
            tracing::debug!(
                url = %url,
                attempt = attempt,
                body_len = body.len(),
                "Dispatching evaluation request"
            );
            self.inner.transport.post(url, &body)
        });

        let raw = outcome.result.map_err(|source| Error::Transport {
            url: url.clone(),
            attempts: outcome.attempts,
            source,
        })?;

        tracing::info!(
            status = raw.status.as_u16(),
            latency_ms = start_time.elapsed().as_millis() as u64,
            attempts = outcome.attempts,
            "Received PDP response"
        );

        if self.inner.error_for_status && raw.status.as_u16() >= 400 {
            let raw_response = raw.text();
            tracing::warn!(
                status = raw.status.as_u16(),
                response = %raw_response,
                "PDP returned an error status"
            );
            return Err(Error::HttpError {
                status: raw.status,
                raw_response,
            });
        }

        Ok((raw, outcome.attempts))
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// Any field left unset is taken from its environment variable, or its
/// default if the variable is unset or malformed. Fields set here always
/// win over the environment.
///
/// # Examples
///
/// ```no_run
/// use pdp_client::ClientBuilder;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), pdp_client::Error> {
/// let client = ClientBuilder::new()
///     .scheme("https")
///     .hostname("pdp.internal")
///     .read_timeout(Duration::from_secs(2))
///     .connection_timeout(Duration::from_millis(500))
///     .build()?;
///
/// assert_eq!(client.endpoint().as_str(), "https://pdp.internal:8181/authz");
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    overrides: ConfigOverrides,
    env: Box<dyn EnvSource>,
    transport: Option<Box<dyn Transport>>,
    error_for_status: bool,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` reading the process environment.
    pub fn new() -> Self {
        Self {
            overrides: ConfigOverrides::default(),
            env: Box::new(ProcessEnv),
            transport: None,
            error_for_status: false,
        }
    }

    /// Sets the URL scheme, overriding `PDP_SCHEMA`.
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.overrides.scheme = Some(scheme.into());
        self
    }

    /// Sets the PDP hostname, overriding `PDP_HOSTNAME`.
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.overrides.hostname = Some(hostname.into());
        self
    }

    /// Sets the PDP port, overriding `PDP_PORT`.
    pub fn port(mut self, port: u16) -> Self {
        self.overrides.port = Some(port);
        self
    }

    /// Sets the policy path, overriding `PDP_POLICY_PATH`. Must start with `/`.
    pub fn policy_path(mut self, policy_path: impl Into<String>) -> Self {
        self.overrides.policy_path = Some(policy_path.into());
        self
    }

    /// Sets the read timeout, overriding `PDP_READ_TIMEOUT_MILLISECONDS`.
    /// Zero disables it.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.overrides.read_timeout_ms = Some(millis(timeout));
        self
    }

    /// Sets the connection timeout, overriding
    /// `PDP_CONNECTION_TIMEOUT_MILLISECONDS`. Zero disables it.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.overrides.connection_timeout_ms = Some(millis(timeout));
        self
    }

    /// Sets the maximum number of attempts per evaluation, overriding
    /// `PDP_RETRY_MAX_ATTEMPTS`. Zero behaves like one.
    pub fn retry_max_attempts(mut self, attempts: u32) -> Self {
        self.overrides.retry_max_attempts = Some(attempts);
        self
    }

    /// Sets the base backoff between attempts, overriding
    /// `PDP_RETRY_BACKOFF_MILLISECONDS`.
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.overrides.retry_backoff_ms = Some(millis(backoff));
        self
    }

    /// Replaces the environment the builder reads overrides from.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdp_client::Client;
    /// use std::collections::HashMap;
    ///
    /// let env: HashMap<String, String> =
    ///     [("PDP_PORT".to_string(), "9000".to_string())].into_iter().collect();
    ///
    /// let client = Client::builder().env_source(env).build().unwrap();
    /// assert_eq!(client.config().port, 9000);
    /// ```
    pub fn env_source(mut self, env: impl EnvSource + 'static) -> Self {
        self.env = Box::new(env);
        self
    }

    /// Replaces the HTTP transport.
    ///
    /// When set, the timeouts in the configuration are not applied by the
    /// client; the transport is used as given.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Maps responses with status 400 and above to [`Error::HttpError`]
    /// instead of decoding them. Off by default.
    pub fn error_for_status(mut self, enabled: bool) -> Self {
        self.error_for_status = enabled;
        self
    }

    /// Resolves the configuration against the environment and builds the
    /// `Client`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] if the resolved configuration
    /// does not form a valid endpoint, or if the HTTP client cannot be
    /// initialized.
    pub fn build(self) -> Result<Client> {
        let config = Config::resolve(&self.overrides, &*self.env);
        let endpoint = endpoint::build(&config)?;
        let retry_policy = RetryPolicy::from_config(&config);

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                if !matches!(endpoint.scheme(), "http" | "https") {
                    return Err(Error::ConfigurationError(format!(
                        "Unsupported scheme for HTTP transport: {}",
                        endpoint.scheme()
                    )));
                }
                Box::new(HttpTransport::from_config(&config)?)
            }
        };

        tracing::debug!(
            endpoint = %endpoint,
            read_timeout_ms = config.read_timeout_ms,
            connection_timeout_ms = config.connection_timeout_ms,
            retry_max_attempts = retry_policy.max_attempts(),
            retry_backoff_ms = config.retry_backoff_ms,
            "Built PDP client"
        );

        Ok(Client {
            inner: Arc::new(ClientInner {
                config,
                endpoint,
                transport,
                retry_policy,
                error_for_status: self.error_for_status,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
