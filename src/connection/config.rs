// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use crate::{
    cql::{
        Compression,
        Consistency,
    },
    Error,
    Result,
};
use derive_builder::Builder;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    net::{
        IpAddr,
        SocketAddr,
    },
    path::{
        Path,
        PathBuf,
    },
    str::FromStr,
    time::Duration,
};
use url::Url;

/// The port used for contact points that name none.
pub const DEFAULT_PORT: u16 = 9042;
/// Rows fetched per page unless configured otherwise.
pub const DEFAULT_FETCH_SIZE: i32 = 5000;
/// Milliseconds to wait for a response unless configured otherwise.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 12_000;
/// The CQL version sent at startup unless configured otherwise.
pub const DEFAULT_VERSION: &str = "3.0.0";

const SCHEME: &str = "cassandra://";

/// Everything needed to open a [`Connection`](super::Connection).
///
/// Built from a URL (see [`ConnectionConfig::from_url`]), with
/// [`ConnectionConfig::builder`], or deserialized from a structured document.
#[derive(Builder, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[builder(pattern = "owned", setter(into, strip_option), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct ConnectionConfig {
    #[builder(default)]
    contact_points: Vec<String>,
    #[builder(default)]
    keyspace: Option<String>,
    #[builder(default)]
    consistency: Consistency,
    #[builder(default)]
    local_datacenter: Option<String>,
    #[builder(default)]
    secure_connect_bundle: Option<PathBuf>,
    #[builder(default = "DEFAULT_VERSION.to_owned()")]
    version: String,
    #[builder(default)]
    user: Option<String>,
    #[builder(default)]
    password: Option<String>,
    #[builder(default = "DEFAULT_FETCH_SIZE")]
    fetch_size: i32,
    #[builder(default = "DEFAULT_REQUEST_TIMEOUT_MS")]
    request_timeout_ms: u64,
    #[builder(default)]
    compression: Compression,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            contact_points: Vec::new(),
            keyspace: None,
            consistency: Consistency::default(),
            local_datacenter: None,
            secure_connect_bundle: None,
            version: DEFAULT_VERSION.to_owned(),
            user: None,
            password: None,
            fetch_size: DEFAULT_FETCH_SIZE,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            compression: Compression::None,
        }
    }
}

impl ConnectionConfigBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        let no_hosts = self.contact_points.as_ref().map(Vec::is_empty).unwrap_or(true);
        let no_bundle = matches!(self.secure_connect_bundle, None | Some(None));
        if no_hosts && no_bundle {
            return Err("either a contact point or a secure connect bundle is required".to_owned());
        }
        if let Some(fetch_size) = self.fetch_size {
            if fetch_size <= 0 {
                return Err(format!("fetch size must be positive, got {}", fetch_size));
            }
        }
        Ok(())
    }
}

impl ConnectionConfig {
    /// Start building a configuration.
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    /// Parse `[jdbc:]cassandra://host1[:port][,host2[:port]...][/keyspace][?option=value&...]`.
    pub fn from_url(url: &str) -> Result<Self> {
        let url = url.trim();
        let rest = strip_prefix_ignore_case(url, "jdbc:").unwrap_or(url);
        let rest = strip_prefix_ignore_case(rest, SCHEME)
            .ok_or_else(|| Error::invalid_config(format!("`{}` is not a {} url", url, SCHEME)))?;
        let hosts_end = rest.find(|c: char| c == '/' || c == '?').unwrap_or_else(|| rest.len());
        let (hosts, tail) = rest.split_at(hosts_end);
        // the host list is not a valid url authority, parse the tail alone
        let parsed = Url::parse(&format!("{}hosts{}", SCHEME, tail))
            .map_err(|e| Error::invalid_config(format!("`{}`: {}", url, e)))?;
        let mut config = Self {
            contact_points: hosts
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_owned)
                .collect(),
            ..Default::default()
        };
        let keyspace = parsed.path().trim_matches('/');
        if !keyspace.is_empty() {
            config.keyspace = Some(keyspace.to_owned());
        }
        for (key, value) in parsed.query_pairs() {
            config.apply_option(&key, &value)?;
        }
        if config.contact_points.is_empty() && config.secure_connect_bundle.is_none() {
            return Err(Error::invalid_config(format!(
                "`{}` names neither a host nor a secure connect bundle",
                url
            )));
        }
        Ok(config)
    }

    fn apply_option(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = |e: &dyn std::fmt::Display| Error::invalid_config(format!("option {}={}: {}", key, value, e));
        match key.to_ascii_lowercase().as_str() {
            "consistency" => self.consistency = value.parse().map_err(|e| invalid(&e))?,
            "localdatacenter" => self.local_datacenter = Some(value.to_owned()),
            "secureconnectbundle" => self.secure_connect_bundle = Some(PathBuf::from(value)),
            "version" => self.version = value.to_owned(),
            "user" => self.user = Some(value.to_owned()),
            "password" => self.password = Some(value.to_owned()),
            "fetchsize" => {
                self.fetch_size = value.parse().map_err(|e| invalid(&e))?;
                if self.fetch_size <= 0 {
                    return Err(invalid(&"must be positive"));
                }
            }
            "requesttimeout" => self.request_timeout_ms = value.parse().map_err(|e| invalid(&e))?,
            "compression" => self.compression = value.parse().map_err(|e| invalid(&e))?,
            _ => return Err(invalid(&"unknown option")),
        }
        Ok(())
    }

    /// The contact points as configured.
    pub fn contact_points(&self) -> &[String] {
        &self.contact_points
    }

    /// The contact points, with the default port added where none is given.
    pub(crate) fn addresses(&self) -> Vec<String> {
        self.contact_points.iter().map(|point| with_default_port(point)).collect()
    }

    pub fn keyspace(&self) -> Option<&str> {
        self.keyspace.as_deref()
    }

    pub fn set_keyspace(&mut self, keyspace: Option<String>) {
        self.keyspace = keyspace;
    }

    /// The default consistency of statements.
    pub fn consistency(&self) -> Consistency {
        self.consistency
    }

    pub fn local_datacenter(&self) -> Option<&str> {
        self.local_datacenter.as_deref()
    }

    pub fn secure_connect_bundle(&self) -> Option<&Path> {
        self.secure_connect_bundle.as_deref()
    }

    /// The CQL version requested at startup.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// The default page size of statements.
    pub fn fetch_size(&self) -> i32 {
        self.fetch_size
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn set_request_timeout(&mut self, timeout: Duration) {
        self.request_timeout_ms = timeout.as_millis() as u64;
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }
}

impl FromStr for ConnectionConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_url(s)
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s.is_char_boundary(prefix.len()) && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

fn with_default_port(point: &str) -> String {
    if let Ok(ip) = point.parse::<IpAddr>() {
        return SocketAddr::new(ip, DEFAULT_PORT).to_string();
    }
    if point.parse::<SocketAddr>().is_ok() {
        return point.to_owned();
    }
    match point.rsplit_once(':') {
        Some((_, port)) if port.parse::<u16>().is_ok() => point.to_owned(),
        _ => format!("{}:{}", point, DEFAULT_PORT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_carry_hosts_keyspace_and_options() {
        let config: ConnectionConfig =
            "jdbc:cassandra://10.0.0.1:9142,node2/ks1?Consistency=QUORUM&localdatacenter=dc1&fetchSize=100&compression=lz4"
                .parse()
                .unwrap();
        assert_eq!(config.contact_points(), &["10.0.0.1:9142".to_owned(), "node2".to_owned()]);
        assert_eq!(config.addresses(), vec!["10.0.0.1:9142".to_owned(), "node2:9042".to_owned()]);
        assert_eq!(config.keyspace(), Some("ks1"));
        assert_eq!(config.consistency(), Consistency::Quorum);
        assert_eq!(config.local_datacenter(), Some("dc1"));
        assert_eq!(config.fetch_size(), 100);
        assert_eq!(config.compression(), Compression::Lz4);
        assert_eq!(config.version(), DEFAULT_VERSION);
        assert_eq!(config.request_timeout(), Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS));
    }

    #[test]
    fn options_are_percent_decoded() {
        let config = ConnectionConfig::from_url(
            "cassandra://localhost?user=cassandra&password=p%40ss&secureconnectbundle=%2Ftmp%2Fbundle.zip&requesttimeout=500",
        )
        .unwrap();
        assert_eq!(config.keyspace(), None);
        assert_eq!(config.user(), Some("cassandra"));
        assert_eq!(config.password(), Some("p@ss"));
        assert_eq!(config.secure_connect_bundle(), Some(Path::new("/tmp/bundle.zip")));
        assert_eq!(config.request_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn bad_urls_are_rejected() {
        for url in &[
            "http://localhost/ks",
            "cassandra:///ks",
            "cassandra://localhost/ks?colour=blue",
            "cassandra://localhost/ks?consistency=SOMETIMES",
            "cassandra://localhost/ks?fetchsize=0",
        ] {
            assert!(
                matches!(ConnectionConfig::from_url(url), Err(Error::InvalidConfig { .. })),
                "{} should be rejected",
                url
            );
        }
    }

    #[test]
    fn ipv6_contact_points_get_the_default_port() {
        assert_eq!(with_default_port("::1"), "[::1]:9042");
        assert_eq!(with_default_port("[::1]:9043"), "[::1]:9043");
        assert_eq!(with_default_port("127.0.0.1"), "127.0.0.1:9042");
    }

    #[test]
    fn builder_requires_a_host_or_bundle() {
        assert!(ConnectionConfig::builder().build().is_err());
        let config = ConnectionConfig::builder()
            .contact_points(vec!["localhost".to_owned()])
            .keyspace("ks")
            .build()
            .unwrap();
        assert_eq!(config.keyspace(), Some("ks"));
        assert_eq!(config.fetch_size(), DEFAULT_FETCH_SIZE);
        assert_eq!(config.consistency(), Consistency::LocalOne);
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: ConnectionConfig = serde_json::from_str(
            r#"{ "contact_points": ["127.0.0.1:9042"], "consistency": "LOCAL_QUORUM", "compression": "snappy" }"#,
        )
        .unwrap();
        assert_eq!(config.consistency(), Consistency::LocalQuorum);
        assert_eq!(config.compression(), Compression::Snappy);
        assert_eq!(config.fetch_size(), DEFAULT_FETCH_SIZE);
        assert_eq!(config.version(), DEFAULT_VERSION);
    }
}
