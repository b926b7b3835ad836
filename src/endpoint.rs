//! Builds the PDP endpoint URL from a resolved [`Config`].

use crate::{config::Config, Error, Result};
use url::Url;

/// Builds `{scheme}://{hostname}:{port}{policy_path}`.
///
/// The host is validated and IDNA/percent-encoded, and the path is
/// percent-encoded, so a `?` or `#` in the policy path never turns into a
/// query or fragment. Components that cannot form a valid URL yield
/// [`Error::ConfigurationError`].
///
/// When the port is the scheme's well-known port the serialized URL omits
/// it, which addresses the same endpoint.
///
/// # Examples
///
/// ```
/// use pdp_client::config::Config;
/// use pdp_client::endpoint;
///
/// let url = endpoint::build(&Config::default()).unwrap();
/// assert_eq!(url.as_str(), "http://localhost:8181/authz");
/// ```
pub fn build(config: &Config) -> Result<Url> {
    if config.port == 0 {
        return Err(Error::ConfigurationError(
            "port must be between 1 and 65535".to_string(),
        ));
    }

    if !config.policy_path.starts_with('/') {
        return Err(Error::ConfigurationError(format!(
            "policy path must start with '/': {:?}",
            config.policy_path
        )));
    }

    // Parse the scheme on its own first, then set each component through
    // the setters so no component can leak into a neighbouring one.
    let mut url = Url::parse(&format!("{}://placeholder", config.scheme)).map_err(|e| {
        Error::ConfigurationError(format!("Invalid scheme {:?}: {}", config.scheme, e))
    })?;

    url.set_host(Some(&config.hostname)).map_err(|e| {
        Error::ConfigurationError(format!("Invalid hostname {:?}: {}", config.hostname, e))
    })?;

    url.set_port(Some(config.port)).map_err(|()| {
        Error::ConfigurationError(format!(
            "Scheme {:?} does not accept a port",
            config.scheme
        ))
    })?;

    url.set_path(&config.policy_path);

    tracing::debug!(url = %url, "Resolved PDP endpoint");

    Ok(url)
}
