//! Connection parameters and the URL grammar of §6.
//!
//! ```text
//! jdbc:pony://host[:port][/schema][?k=v&...]
//! jdbc:pony:local://config_path[?k=v&...]
//! ```

use crate::error::{HdbError, HdbResult};
use secstr::SecUtf8;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Default TCP port for the pony wire protocol (§6).
pub const DEFAULT_PORT: u16 = 9157;

/// Where a connection should be established: a remote TCP endpoint, or an
/// in-process embedded server booted from a local configuration path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Target {
    Tcp { host: String, port: u16 },
    Local { config_path: PathBuf },
}

/// An immutable bundle of everything needed to open a new connection (§6, §10.3).
///
/// Built either directly via [`ConnectParams::builder`] or parsed from a URL
/// with [`IntoConnectParams::into_connect_params`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectParams {
    target: Target,
    schema: Option<String>,
    user: String,
    password: SecUtf8,
    /// Unrecognised URL query keys, passed through to the embedded server
    /// configuration (§6) when `target` is [`Target::Local`].
    extra: BTreeMap<String, String>,
}

impl ConnectParams {
    pub fn builder() -> ConnectParamsBuilder {
        ConnectParamsBuilder::default()
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &SecUtf8 {
        &self.password
    }

    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }

    /// The `host:port` pair to dial, if this is a TCP target.
    pub fn addr(&self) -> Option<String> {
        match &self.target {
            Target::Tcp { host, port } => Some(format!("{host}:{port}")),
            Target::Local { .. } => None,
        }
    }
}

impl std::fmt::Display for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.target {
            Target::Tcp { host, port } => write!(f, "jdbc:pony://{}@{host}:{port}", self.user)?,
            Target::Local { config_path } => {
                write!(f, "jdbc:pony:local://{}", config_path.display())?;
            }
        }
        if let Some(schema) = &self.schema {
            write!(f, "/{schema}")?;
        }
        Ok(())
    }
}

/// Builder for [`ConnectParams`] (§10.3).
#[derive(Clone, Debug, Default)]
pub struct ConnectParamsBuilder {
    host: Option<String>,
    port: Option<u16>,
    local_config_path: Option<PathBuf>,
    schema: Option<String>,
    user: Option<String>,
    password: Option<String>,
    extra: BTreeMap<String, String>,
}

impl ConnectParamsBuilder {
    pub fn hostname(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn local(mut self, config_path: impl Into<PathBuf>) -> Self {
        self.local_config_path = Some(config_path.into());
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> HdbResult<ConnectParams> {
        let target = if let Some(config_path) = self.local_config_path {
            Target::Local { config_path }
        } else {
            let host = self
                .host
                .ok_or_else(|| HdbError::Usage("connect params: missing host".into()))?;
            Target::Tcp {
                host,
                port: self.port.unwrap_or(DEFAULT_PORT),
            }
        };
        Ok(ConnectParams {
            target,
            schema: self.schema,
            user: self
                .user
                .ok_or_else(|| HdbError::Usage("connect params: missing user".into()))?,
            password: SecUtf8::from(
                self.password
                    .ok_or_else(|| HdbError::Usage("connect params: missing password".into()))?,
            ),
            extra: self.extra,
        })
    }
}

/// Converts a value into [`ConnectParams`]; implemented for URL strings.
pub trait IntoConnectParams {
    fn into_connect_params(self) -> HdbResult<ConnectParams>;
}

impl IntoConnectParams for ConnectParams {
    fn into_connect_params(self) -> HdbResult<ConnectParams> {
        Ok(self)
    }
}

impl IntoConnectParams for &str {
    fn into_connect_params(self) -> HdbResult<ConnectParams> {
        parse_url(self)
    }
}

impl IntoConnectParams for String {
    fn into_connect_params(self) -> HdbResult<ConnectParams> {
        parse_url(&self)
    }
}

fn usage(msg: impl Into<String>) -> HdbError {
    HdbError::Usage(msg.into())
}

/// Parses the URL grammar of §6. Percent-decoding and query-pair splitting are
/// delegated to the `url` crate by reparsing the recognised suffix as an
/// `http`-scheme URL; only the `jdbc:pony[:local]://` prefix handling is
/// hand-rolled, since that scheme shape is not one `url::Url` understands
/// natively.
pub fn parse_url(s: &str) -> HdbResult<ConnectParams> {
    let (is_local, rest) = if let Some(rest) = s.strip_prefix("jdbc:pony:local://") {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix("jdbc:pony://") {
        (false, rest)
    } else {
        return Err(usage(format!("not a pony connection url: {s}")));
    };

    let synthetic = format!("http://{rest}");
    let parsed =
        url::Url::parse(&synthetic).map_err(|e| usage(format!("invalid connection url: {e}")))?;

    let mut extra = BTreeMap::new();
    let mut user = None;
    let mut password = None;
    let mut create = None;
    for (k, v) in parsed.query_pairs() {
        match k.as_ref() {
            "user" => user = Some(v.into_owned()),
            "password" => password = Some(v.into_owned()),
            "create" | "boot_or_create" | "create_or_boot" => create = Some(v.into_owned()),
            other => {
                extra.insert(other.to_string(), v.into_owned());
            }
        }
    }
    if let Some(create) = create {
        extra.insert("create".to_string(), create);
    }

    let schema = {
        let path = parsed.path().trim_start_matches('/');
        if path.is_empty() {
            None
        } else {
            Some(path.to_string())
        }
    };

    let mut builder = ConnectParams::builder();
    builder = builder
        .user(user.ok_or_else(|| usage("connection url is missing the 'user' parameter"))?)
        .password(
            password.ok_or_else(|| usage("connection url is missing the 'password' parameter"))?,
        );
    if let Some(schema) = schema {
        builder = builder.schema(schema);
    }
    for (k, v) in extra {
        builder = builder.extra(k, v);
    }

    if is_local {
        builder = builder.local(PathBuf::from(
            parsed
                .host_str()
                .ok_or_else(|| usage("local connection url is missing a config path"))?,
        ));
    } else {
        let host = parsed
            .host_str()
            .ok_or_else(|| usage("connection url is missing a host"))?
            .to_string();
        builder = builder.hostname(host);
        if let Some(port) = parsed.port() {
            builder = builder.port(port);
        }
    }

    builder.build()
}
