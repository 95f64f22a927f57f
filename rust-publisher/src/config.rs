//! Configuration module for environment variable parsing.
//!
//! The broker address is either given whole through `RABBITMQ_URL` or assembled
//! from the individual `RABBITMQ_*` connection settings.

use std::env;
use tracing::warn;
use url::Url;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_AMQP_PORT: u16 = 5672;
const DEFAULT_USERNAME: &str = "guest";
const DEFAULT_PASSWORD: &str = "guest";
const DEFAULT_VHOST: &str = "/";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// AMQP connection URI for the RabbitMQ broker
    pub amqp_url: String,

    /// Port for the web server to listen on
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            amqp_url: env::var("RABBITMQ_URL").unwrap_or_else(|_| amqp_url_from_env()),

            port: parse_or("PORT", 8080),
        }
    }

    /// Whether the AMQP URI carries credentials other than the broker defaults.
    pub fn has_custom_credentials(&self) -> bool {
        !self
            .amqp_url
            .contains(&format!("//{}:{}@", DEFAULT_USERNAME, DEFAULT_PASSWORD))
    }
}

/// Build an AMQP URI from its parts.
///
/// Credentials and vhost are percent-encoded, so the default `/` vhost becomes
/// `%2F` and passwords may contain any of `@ : / # %`.
fn amqp_url_from_parts(
    host: &str,
    port: u16,
    username: &str,
    password: &str,
    vhost: &str,
) -> Result<String, url::ParseError> {
    let mut url = Url::parse(&format!("amqp://{}/", host))?;
    url.set_port(Some(port))
        .map_err(|_| url::ParseError::InvalidPort)?;
    url.set_username(username)
        .map_err(|_| url::ParseError::EmptyHost)?;
    url.set_password(Some(password))
        .map_err(|_| url::ParseError::EmptyHost)?;
    url.path_segments_mut()
        .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .clear()
        .push(vhost);
    Ok(url.into())
}

/// Build the AMQP URI from the `RABBITMQ_*` settings.
fn amqp_url_from_env() -> String {
    let host = env::var("RABBITMQ_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let username = env::var("RABBITMQ_USERNAME").unwrap_or_else(|_| DEFAULT_USERNAME.to_string());
    let password = env::var("RABBITMQ_PASSWORD").unwrap_or_else(|_| DEFAULT_PASSWORD.to_string());
    let vhost = env::var("RABBITMQ_VHOST").unwrap_or_else(|_| DEFAULT_VHOST.to_string());
    let port = parse_or("RABBITMQ_PORT", DEFAULT_AMQP_PORT);

    match amqp_url_from_parts(&host, port, &username, &password, &vhost) {
        Ok(url) => url,
        Err(e) => {
            warn!(env_var = "RABBITMQ_HOST", value = %host, error = %e, "Invalid broker host, using default");
            format!(
                "amqp://{}:{}@{}:{}/%2F",
                DEFAULT_USERNAME, DEFAULT_PASSWORD, DEFAULT_HOST, DEFAULT_AMQP_PORT
            )
        }
    }
}

/// Parse an environment variable, falling back to `default` when unset or invalid.
fn parse_or<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(env_var = name, value = %raw, default = %default, "Invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}
