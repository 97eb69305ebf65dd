//! Runtime configuration from environment variables and command-line flags.
//! Flags override the environment; anything unset falls back to a default.

use std::path::PathBuf;

use tracing::warn;

pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_SNAPSHOT_MS: u64 = 5000;
pub const DEFAULT_DOMAIN: &str = "blindbrook.org";
pub const DEFAULT_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

pub const USAGE: &str = "service-hours\n\nUSAGE:\n  service-hours [--port N] [--data-dir PATH] [--roster CSV] [--admins FILE]\n\nOPTIONS:\n  --port N          HTTP port (env: SERVICE_HOURS_HTTP_PORT, default 8080)\n  --data-dir PATH   Store snapshot directory (env: SERVICE_HOURS_DATA_DIR, default data)\n  --roster CSV      Roster imported at startup (env: SERVICE_HOURS_ROSTER)\n  --admins FILE     Admin emails, one per line (env: SERVICE_HOURS_ADMINS)\n\nOther environment:\n  SERVICE_HOURS_SNAPSHOT_MS      snapshot interval, 0 disables persistence (default 5000)\n  SERVICE_HOURS_DOMAIN           allowed account domain (default blindbrook.org)\n  SERVICE_HOURS_CLIENT_ID        expected OAuth client id\n  SERVICE_HOURS_TOKENINFO_URL    token-info endpoint\n  SERVICE_HOURS_SECURE_COOKIES   mark the session cookie Secure\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub http_port: u16,
    pub data_dir: PathBuf,
    pub snapshot_ms: u64,
    pub domain: String,
    pub client_id: Option<String>,
    pub tokeninfo_url: String,
    pub roster_path: Option<PathBuf>,
    pub admins_path: Option<PathBuf>,
    pub secure_cookies: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            snapshot_ms: DEFAULT_SNAPSHOT_MS,
            domain: DEFAULT_DOMAIN.to_string(),
            client_id: None,
            tokeninfo_url: DEFAULT_TOKENINFO_URL.to_string(),
            roster_path: None,
            admins_path: None,
            secure_cookies: false,
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_num<T: std::str::FromStr>(name: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(target: "service_hours::config", name, value = %raw, "ignoring unparseable number");
            None
        }
    }
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

impl Config {
    /// Build from an environment lookup and the process arguments.
    pub fn from_sources<E>(env: E, args: &[String]) -> Self
    where
        E: Fn(&str) -> Option<String>,
    {
        let d = Config::default();
        let http_port = parse_num("--port", arg_value(args, "--port"))
            .or_else(|| parse_num("SERVICE_HOURS_HTTP_PORT", env("SERVICE_HOURS_HTTP_PORT")))
            .unwrap_or(d.http_port);
        let data_dir = non_empty(arg_value(args, "--data-dir"))
            .or_else(|| non_empty(env("SERVICE_HOURS_DATA_DIR")))
            .map(PathBuf::from)
            .unwrap_or(d.data_dir);
        let snapshot_ms = parse_num("SERVICE_HOURS_SNAPSHOT_MS", env("SERVICE_HOURS_SNAPSHOT_MS")).unwrap_or(d.snapshot_ms);
        let secure_cookies = match env("SERVICE_HOURS_SECURE_COOKIES") {
            Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
                warn!(target: "service_hours::config", value = %raw, "SERVICE_HOURS_SECURE_COOKIES is not a boolean");
                d.secure_cookies
            }),
            None => d.secure_cookies,
        };
        Self {
            http_port,
            data_dir,
            snapshot_ms,
            domain: non_empty(env("SERVICE_HOURS_DOMAIN")).unwrap_or(d.domain),
            client_id: non_empty(env("SERVICE_HOURS_CLIENT_ID")),
            tokeninfo_url: non_empty(env("SERVICE_HOURS_TOKENINFO_URL")).unwrap_or(d.tokeninfo_url),
            roster_path: non_empty(arg_value(args, "--roster")).or_else(|| non_empty(env("SERVICE_HOURS_ROSTER"))).map(PathBuf::from),
            admins_path: non_empty(arg_value(args, "--admins")).or_else(|| non_empty(env("SERVICE_HOURS_ADMINS"))).map(PathBuf::from),
            secure_cookies,
        }
    }

    pub fn from_env_and_args(args: &[String]) -> Self {
        Self::from_sources(|name| std::env::var(name).ok(), args)
    }

    pub fn persistence_enabled(&self) -> bool { self.snapshot_ms > 0 }
}
