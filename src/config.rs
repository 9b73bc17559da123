use config::{Config as SettingsLoader, Environment};
use serde::Deserialize;
use std::{net::SocketAddr, path::PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind: SocketAddr,
    pub log_level: String,
    pub stash: StashConfig,
    pub front_door: FrontDoorConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StashConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub token_encryption_key: String,
    pub login_token_ttl_seconds: i64,
    pub read_authorization_policy: String,
    pub http_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrontDoorConfig {
    pub host: String,
    pub shared_fetch_secret: String,
    pub http_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawEnvConfig {
    config: Option<String>,
    bind: Option<String>,
    log_level: Option<String>,
    stash_host: Option<String>,
    stash_user: Option<String>,
    stash_password: Option<String>,
    token_encryption_key: Option<String>,
    token_ttl_seconds: Option<String>,
    read_policy: Option<String>,
    http_timeout_ms: Option<String>,
    front_door_host: Option<String>,
    shared_fetch_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let env_cfg = load_stash_auth_env()?;
        let mut cfg = Self::defaults();
        if let Some(path) = env_cfg
            .config
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            let loaded = Self::from_yaml_file(PathBuf::from(path))
                .map_err(|err| format!("failed to load STASH_AUTH_CONFIG={path}: {err}"))?;
            cfg = loaded;
        }
        cfg.apply_env_overrides(&env_cfg);
        Ok(cfg)
    }

    pub fn from_env_with_config_file(config_path: PathBuf) -> Result<Self, String> {
        let env_cfg = load_stash_auth_env()?;
        let mut cfg = Self::from_yaml_file(config_path)?;
        cfg.apply_env_overrides(&env_cfg);
        Ok(cfg)
    }

    pub fn defaults() -> Self {
        Self {
            bind: "127.0.0.1:4875".parse().expect("valid default bind"),
            log_level: "info".to_string(),
            stash: StashConfig {
                host: String::new(),
                user: String::new(),
                password: String::new(),
                token_encryption_key: String::new(),
                login_token_ttl_seconds: 3600,
                read_authorization_policy: "repository-read-permission".to_string(),
                http_timeout_ms: 5_000,
            },
            front_door: FrontDoorConfig {
                host: String::new(),
                shared_fetch_secret: String::new(),
                http_timeout_ms: 5_000,
            },
        }
    }

    pub fn from_yaml_file(path: PathBuf) -> Result<Self, String> {
        let text = std::fs::read_to_string(&path)
            .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
        Self::from_yaml_str(&path.display().to_string(), &text)
    }

    fn from_yaml_str(source: &str, text: &str) -> Result<Self, String> {
        let parsed = serde_yaml::from_str::<YamlConfig>(text)
            .map_err(|err| format!("failed to parse {source}: {err}"))?;

        let mut cfg = Self::defaults();
        if let Some(listen) = parsed.listen.as_deref() {
            cfg.bind = listen
                .parse()
                .map_err(|err| format!("invalid listen address {listen}: {err}"))?;
        }
        if let Some(level) = parsed.log.and_then(|log| log.level) {
            cfg.log_level = level;
        }
        if let Some(stash) = parsed.stash {
            apply_if_some(&mut cfg.stash.host, stash.host);
            apply_if_some(&mut cfg.stash.user, stash.user);
            apply_if_some(&mut cfg.stash.password, stash.password);
            apply_if_some(&mut cfg.stash.token_encryption_key, stash.token_encryption_key);
            if let Some(ttl) = stash.login_token_ttl_seconds {
                cfg.stash.login_token_ttl_seconds = ttl;
            }
            apply_if_some(
                &mut cfg.stash.read_authorization_policy,
                stash.read_authorization_policy,
            );
            if let Some(timeout_ms) = stash.timeout_ms {
                cfg.stash.http_timeout_ms = timeout_ms;
            }
        }
        if let Some(front_door) = parsed.front_door {
            apply_if_some(&mut cfg.front_door.host, front_door.host);
            apply_if_some(
                &mut cfg.front_door.shared_fetch_secret,
                front_door.shared_fetch_secret,
            );
            if let Some(timeout_ms) = front_door.timeout_ms {
                cfg.front_door.http_timeout_ms = timeout_ms;
            }
        }
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self, env_cfg: &RawEnvConfig) {
        if let Some(bind) = parse_env_value::<SocketAddr>(env_cfg.bind.as_deref()) {
            self.bind = bind;
        }
        if let Some(value) = env_cfg.log_level.as_deref()
            && !value.trim().is_empty()
        {
            self.log_level = value.to_string();
        }
        if let Some(value) = env_cfg.stash_host.as_deref() {
            self.stash.host = value.to_string();
        }
        if let Some(value) = env_cfg.stash_user.as_deref() {
            self.stash.user = value.to_string();
        }
        if let Some(value) = env_cfg.stash_password.as_deref() {
            self.stash.password = value.to_string();
        }
        if let Some(value) = env_cfg.token_encryption_key.as_deref() {
            self.stash.token_encryption_key = value.to_string();
        }
        if let Some(parsed) = parse_env_value::<i64>(env_cfg.token_ttl_seconds.as_deref()) {
            self.stash.login_token_ttl_seconds = parsed;
        }
        if let Some(value) = env_cfg.read_policy.as_deref() {
            self.stash.read_authorization_policy = value.to_string();
        }
        if let Some(parsed) = parse_env_value::<u64>(env_cfg.http_timeout_ms.as_deref()) {
            self.stash.http_timeout_ms = parsed;
            self.front_door.http_timeout_ms = parsed;
        }
        if let Some(value) = env_cfg.front_door_host.as_deref() {
            self.front_door.host = value.to_string();
        }
        if let Some(value) = env_cfg.shared_fetch_secret.as_deref() {
            self.front_door.shared_fetch_secret = value.to_string();
        }
    }
}

fn apply_if_some(target: &mut String, value: Option<String>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn load_stash_auth_env() -> Result<RawEnvConfig, String> {
    let settings = SettingsLoader::builder()
        .add_source(Environment::with_prefix("STASH_AUTH").try_parsing(false))
        .build()
        .map_err(|err| format!("failed to load STASH_AUTH_* environment: {err}"))?;

    Ok(RawEnvConfig {
        config: env_value(&settings, "config"),
        bind: env_value(&settings, "bind"),
        log_level: env_value(&settings, "log_level"),
        stash_host: env_value(&settings, "stash_host"),
        stash_user: env_value(&settings, "stash_user"),
        stash_password: env_value(&settings, "stash_password"),
        token_encryption_key: env_value(&settings, "token_encryption_key"),
        token_ttl_seconds: env_value(&settings, "token_ttl_seconds"),
        read_policy: env_value(&settings, "read_policy"),
        http_timeout_ms: env_value(&settings, "http_timeout_ms"),
        front_door_host: env_value(&settings, "front_door_host"),
        shared_fetch_secret: env_value(&settings, "shared_fetch_secret"),
    })
}

fn env_value(settings: &SettingsLoader, key: &str) -> Option<String> {
    settings
        .get_string(key)
        .ok()
        .or_else(|| settings.get_string(&key.to_ascii_uppercase()).ok())
}

fn parse_env_value<T>(raw: Option<&str>) -> Option<T>
where
    T: std::str::FromStr,
{
    raw.and_then(|value| value.parse::<T>().ok())
}

#[derive(Debug, Deserialize)]
struct YamlConfig {
    listen: Option<String>,
    log: Option<YamlLog>,
    stash: Option<YamlStash>,
    #[serde(rename = "frontDoor")]
    front_door: Option<YamlFrontDoor>,
}

#[derive(Debug, Deserialize)]
struct YamlLog {
    level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YamlStash {
    host: Option<String>,
    user: Option<String>,
    password: Option<String>,
    #[serde(rename = "tokenEncryptionKey")]
    token_encryption_key: Option<String>,
    #[serde(rename = "loginTokenTtlSeconds")]
    login_token_ttl_seconds: Option<i64>,
    #[serde(rename = "readAuthorizationPolicy")]
    read_authorization_policy: Option<String>,
    #[serde(rename = "timeoutMs")]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct YamlFrontDoor {
    host: Option<String>,
    #[serde(rename = "sharedFetchSecret")]
    shared_fetch_secret: Option<String>,
    #[serde(rename = "timeoutMs")]
    timeout_ms: Option<u64>,
}
