//! Data-source configuration.
//!
//! Sources are declared in TOML under `[sources.<name>]`, either with a `dsn`
//! (PDO style `mysql:host=..;dbname=..` or a `mysql://` URL) or with discrete
//! `host`/`port`/`dbname`/... keys. `${VAR}` references in string values are
//! expanded from the environment when the file is loaded.
//!
//! ```toml
//! default = "main"
//! sql_collection = false
//!
//! [sources.main]
//! host = "127.0.0.1"
//! port = 3306
//! dbname = "app"
//! charset = "utf8mb4"
//! user = "root"
//! password = "${DB_PASSWORD}"
//! ```

use crate::error::{OrmError, OrmResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3306;

/// Top-level configuration: every known data source plus logging switches.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Source used when none is named. Defaults to the first source by name.
    #[serde(default)]
    pub default: Option<String>,
    /// Keep the readable SQL of every executed statement.
    #[serde(default)]
    pub sql_collection: bool,
    /// Log statements slower than this many milliseconds at WARN.
    #[serde(default)]
    pub slow_query_ms: Option<u64>,
    #[serde(default)]
    pub sources: BTreeMap<String, DataSourceConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DataSourceConfig {
    pub dsn: Option<String>,
    /// Driver name; only `mysql` is supported.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dbname: Option<String>,
    pub charset: Option<String>,
    pub unix_socket: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub ssl: Option<SslConfig>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SslMode {
    Disabled,
    #[default]
    Preferred,
    Required,
    VerifyCa,
    VerifyIdentity,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SslConfig {
    #[serde(default)]
    pub mode: SslMode,
    pub ca: Option<String>,
    pub cert: Option<String>,
    pub key: Option<String>,
}

/// Fully resolved connection parameters of one source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub dbname: Option<String>,
    pub charset: Option<String>,
    pub unix_socket: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub ssl: Option<SslConfig>,
}

impl DatabaseConfig {
    /// Read, expand and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> OrmResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OrmError::configuration(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw).map_err(|e| match e {
            OrmError::Configuration(msg) => {
                OrmError::configuration(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Parse, expand and validate TOML text.
    pub fn from_toml_str(raw: &str) -> OrmResult<Self> {
        let mut config: DatabaseConfig = toml::from_str(raw)
            .map_err(|e| OrmError::configuration(format!("failed to parse config: {e}")))?;
        config.expand_env()?;
        config.validate()?;
        Ok(config)
    }

    fn expand_env(&mut self) -> OrmResult<()> {
        for source in self.sources.values_mut() {
            for field in [
                &mut source.dsn,
                &mut source.host,
                &mut source.dbname,
                &mut source.charset,
                &mut source.unix_socket,
                &mut source.user,
                &mut source.password,
            ] {
                if let Some(value) = field.as_mut() {
                    *value = expand_env_vars(value)?;
                }
            }
            if let Some(ssl) = source.ssl.as_mut() {
                for field in [&mut ssl.ca, &mut ssl.cert, &mut ssl.key] {
                    if let Some(value) = field.as_mut() {
                        *value = expand_env_vars(value)?;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> OrmResult<()> {
        if self.sources.is_empty() {
            return Err(OrmError::configuration(
                "at least one [sources.<name>] entry is required",
            ));
        }
        if let Some(default) = &self.default {
            if !self.sources.contains_key(default) {
                return Err(not_defined(default));
            }
        }
        for (name, source) in &self.sources {
            if let Some(kind) = &source.kind {
                if !kind.eq_ignore_ascii_case("mysql") {
                    return Err(OrmError::configuration(format!(
                        "unsupported type '{kind}' for data source '{name}'"
                    )));
                }
            }
            let has_dsn = source.dsn.as_deref().is_some_and(|d| !d.trim().is_empty());
            let has_host = source.host.as_deref().is_some_and(|h| !h.trim().is_empty());
            let has_socket = source
                .unix_socket
                .as_deref()
                .is_some_and(|s| !s.trim().is_empty());
            if !has_dsn && !has_host && !has_socket {
                return Err(OrmError::configuration(format!(
                    "data source '{name}' needs a dsn or a host"
                )));
            }
        }
        Ok(())
    }

    /// Name of the source used when none is given.
    pub fn default_source(&self) -> OrmResult<&str> {
        match &self.default {
            Some(name) => Ok(name),
            None => self
                .sources
                .keys()
                .next()
                .map(String::as_str)
                .ok_or_else(|| OrmError::configuration("no data source configured")),
        }
    }

    /// Look up a source by name, or the default source for `None`/`""`.
    pub fn source(&self, name: Option<&str>) -> OrmResult<(&str, &DataSourceConfig)> {
        let name = match name {
            Some(n) if !n.is_empty() => n,
            _ => self.default_source()?,
        };
        self.sources
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| not_defined(name))
    }

    pub fn slow_query_threshold(&self) -> Option<Duration> {
        self.slow_query_ms.map(Duration::from_millis)
    }
}

fn not_defined(name: &str) -> OrmError {
    OrmError::configuration(format!("data source 'database.{name}' not defined!"))
}

impl DataSourceConfig {
    /// Resolve the DSN (if any) and the discrete keys into connection
    /// settings. Discrete keys override values parsed from the DSN.
    pub fn settings(&self) -> OrmResult<ConnectionSettings> {
        let mut settings = match self.dsn.as_deref().map(str::trim) {
            Some(dsn) if !dsn.is_empty() => parse_dsn(dsn)?,
            _ => ConnectionSettings {
                port: DEFAULT_PORT,
                ..ConnectionSettings::default()
            },
        };
        if let Some(host) = &self.host {
            settings.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        merge(&mut settings.dbname, &self.dbname);
        merge(&mut settings.charset, &self.charset);
        merge(&mut settings.unix_socket, &self.unix_socket);
        merge(&mut settings.user, &self.user);
        merge(&mut settings.password, &self.password);
        if self.ssl.is_some() {
            settings.ssl = self.ssl.clone();
        }
        if settings.host.is_empty() && settings.unix_socket.is_none() {
            settings.host = "localhost".to_string();
        }
        Ok(settings)
    }

    /// PDO-style DSN: `mysql:host=..;port=..;dbname=..;charset=..;unix_socket=..;`.
    /// Credentials are not part of the DSN.
    pub fn to_dsn(&self) -> OrmResult<String> {
        let s = self.settings()?;
        let mut dsn = format!("mysql:host={};port={};", s.host, s.port);
        for (key, value) in [
            ("dbname", &s.dbname),
            ("charset", &s.charset),
            ("unix_socket", &s.unix_socket),
        ] {
            if let Some(v) = value {
                dsn.push_str(&format!("{key}={v};"));
            }
        }
        Ok(dsn)
    }
}

fn merge(target: &mut Option<String>, value: &Option<String>) {
    if value.is_some() {
        *target = value.clone();
    }
}

fn parse_dsn(dsn: &str) -> OrmResult<ConnectionSettings> {
    if dsn.starts_with("mysql://") || dsn.starts_with("mariadb://") {
        return parse_url_dsn(dsn);
    }
    let Some(body) = dsn.strip_prefix("mysql:") else {
        return Err(OrmError::configuration(format!(
            "unsupported dsn '{dsn}', expected mysql:... or mysql://..."
        )));
    };
    let mut settings = ConnectionSettings {
        port: DEFAULT_PORT,
        ..ConnectionSettings::default()
    };
    for pair in body.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| OrmError::configuration(format!("malformed dsn segment '{pair}'")))?;
        let value = value.trim().to_string();
        match key.trim() {
            "host" => settings.host = value,
            "port" => {
                settings.port = value
                    .parse()
                    .map_err(|_| OrmError::configuration(format!("invalid port '{value}' in dsn")))?;
            }
            "dbname" => settings.dbname = Some(value),
            "charset" => settings.charset = Some(value),
            "unix_socket" => settings.unix_socket = Some(value),
            other => {
                return Err(OrmError::configuration(format!(
                    "unknown dsn key '{other}'"
                )));
            }
        }
    }
    Ok(settings)
}

fn parse_url_dsn(dsn: &str) -> OrmResult<ConnectionSettings> {
    let parsed = url::Url::parse(dsn)
        .map_err(|e| OrmError::configuration(format!("invalid dsn url: {e}")))?;
    let mut settings = ConnectionSettings {
        host: parsed.host_str().unwrap_or_default().to_string(),
        port: parsed.port().unwrap_or(DEFAULT_PORT),
        ..ConnectionSettings::default()
    };
    if !parsed.username().is_empty() {
        settings.user = Some(percent_decode(parsed.username()));
    }
    settings.password = parsed.password().map(percent_decode);
    let db = parsed.path().trim_start_matches('/');
    if !db.is_empty() {
        settings.dbname = Some(percent_decode(db));
    }
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "charset" => settings.charset = Some(value.into_owned()),
            "socket" | "unix_socket" => settings.unix_socket = Some(value.into_owned()),
            _ => {}
        }
    }
    Ok(settings)
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = |b: u8| (b as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn expand_env_vars(input: &str) -> OrmResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut key = String::new();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                key.push(ch);
            }

            if !closed {
                return Err(OrmError::configuration(format!(
                    "unterminated env var reference: ${{{key}}}"
                )));
            }
            if key.is_empty() {
                return Err(OrmError::configuration("invalid env var reference: ${}"));
            }

            let v = std::env::var(&key).map_err(|_| {
                OrmError::configuration(format!("missing env var for config expansion: {key}"))
            })?;
            out.push_str(&v);
            continue;
        }

        out.push(c);
    }

    Ok(out)
}
