//! Settings loaded from the environment

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::deploy::{detector, git, orchestrator, restart};
use crate::errors::DeployerError;
use crate::logs::{LogLevel, LogOptions};
use crate::webhook::signature::{SharedSecret, MIN_SECRET_LEN};

pub const SECRET_VAR: &str = "GITHUB_WEBHOOK_SECRET";
pub const HOST_VAR: &str = "WEBHOOK_HOST";
pub const PORT_VAR: &str = "WEBHOOK_PORT";
pub const PROJECT_ROOT_VAR: &str = "DEPLOY_PROJECT_ROOT";
pub const BRANCHES_VAR: &str = "DEPLOY_BRANCHES";
pub const EVENT_VAR: &str = "DEPLOY_EVENT";
pub const REMOTE_VAR: &str = "DEPLOY_REMOTE";
pub const FF_ONLY_VAR: &str = "DEPLOY_FF_ONLY";
pub const UNIT_VAR: &str = "DEPLOY_SYSTEMD_UNIT";
pub const SUDO_VAR: &str = "DEPLOY_USE_SUDO";
pub const COMPOSE_FILE_VAR: &str = "DEPLOY_COMPOSE_FILE";
pub const TIMEOUT_VAR: &str = "DEPLOY_TIMEOUT_SECS";
pub const RETRIES_VAR: &str = "DEPLOY_RESTART_RETRIES";
pub const POLL_VAR: &str = "DEPLOY_RESTART_POLL_SECS";
pub const WAIT_VAR: &str = "DEPLOY_WAIT";
pub const LOG_LEVEL_VAR: &str = "LOG_LEVEL";
pub const LOG_FORMAT_VAR: &str = "LOG_FORMAT";
pub const LOG_DIR_VAR: &str = "LOG_DIR";

/// Deployer settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Webhook secret; `None` only for commands that never verify deliveries
    pub secret: Option<SharedSecret>,

    pub host: String,
    pub port: u16,

    /// Canonical path of the working tree to update
    pub project_root: PathBuf,

    /// Tracked branches, in preference order
    pub branches: Vec<String>,

    /// Event kind that triggers a deploy
    pub event_kind: String,

    pub remote: String,
    pub ff_only: bool,

    pub systemd_unit: Option<String>,
    pub use_sudo: bool,
    pub compose_file: String,

    /// Upper bound for one deploy run
    pub deploy_timeout: Duration,

    pub restart_retries: u32,
    pub restart_poll_interval: Duration,

    /// Answer webhook deliveries only after the deploy finished
    pub wait_for_result: bool,

    pub log_level: LogLevel,
    pub log_json: bool,
    pub log_dir: Option<PathBuf>,
}

impl Settings {
    /// Read settings from the process environment, after loading `.env`
    pub fn from_env() -> Result<Self, DeployerError> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Build settings from explicit key/value pairs
    pub fn from_vars<I>(vars: I) -> Result<Self, DeployerError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .collect();
        let get = |key: &str| vars.get(key).map(|v| v.trim().to_string());

        let secret = get(SECRET_VAR).map(SharedSecret::new);

        let project_root = match get(PROJECT_ROOT_VAR) {
            Some(path) => PathBuf::from(path),
            None => std::env::current_dir()?,
        };
        let project_root = project_root.canonicalize().map_err(|e| {
            DeployerError::ConfigError(format!(
                "{} {} is not accessible: {}",
                PROJECT_ROOT_VAR,
                project_root.display(),
                e
            ))
        })?;

        let branches: Vec<String> = get(BRANCHES_VAR)
            .unwrap_or_else(|| "main,master".to_string())
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string)
            .collect();
        if branches.is_empty() {
            return Err(DeployerError::ConfigError(format!(
                "{} lists no branches",
                BRANCHES_VAR
            )));
        }

        let log_json = match get(LOG_FORMAT_VAR).as_deref() {
            None | Some("text") => false,
            Some("json") => true,
            Some(other) => {
                return Err(DeployerError::ConfigError(format!(
                    "{} must be 'text' or 'json', got '{}'",
                    LOG_FORMAT_VAR, other
                )))
            }
        };

        let log_level = match get(LOG_LEVEL_VAR) {
            Some(level) => level.parse().map_err(DeployerError::ConfigError)?,
            None => LogLevel::Info,
        };

        Ok(Self {
            secret,
            host: get(HOST_VAR).unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&vars, PORT_VAR, 5000)?,
            project_root,
            branches,
            event_kind: get(EVENT_VAR).unwrap_or_else(|| "push".to_string()),
            remote: get(REMOTE_VAR).unwrap_or_else(|| "origin".to_string()),
            ff_only: parse_bool(&vars, FF_ONLY_VAR, true)?,
            systemd_unit: get(UNIT_VAR),
            use_sudo: parse_bool(&vars, SUDO_VAR, false)?,
            compose_file: get(COMPOSE_FILE_VAR)
                .unwrap_or_else(|| "docker-compose.yml".to_string()),
            deploy_timeout: Duration::from_secs(parse_or(&vars, TIMEOUT_VAR, 300)?),
            restart_retries: parse_or(&vars, RETRIES_VAR, 5)?,
            restart_poll_interval: Duration::from_secs(parse_or(&vars, POLL_VAR, 2)?),
            wait_for_result: parse_bool(&vars, WAIT_VAR, false)?,
            log_level,
            log_json,
            log_dir: get(LOG_DIR_VAR).map(PathBuf::from),
        })
    }

    /// The webhook secret, enforcing presence and minimum length
    pub fn require_secret(&self) -> Result<SharedSecret, DeployerError> {
        let secret = self.secret.clone().ok_or_else(|| {
            DeployerError::ConfigError(format!("{} is not set", SECRET_VAR))
        })?;
        if secret.len() < MIN_SECRET_LEN {
            return Err(DeployerError::ConfigError(format!(
                "{} must be at least {} bytes of random data",
                SECRET_VAR, MIN_SECRET_LEN
            )));
        }
        Ok(secret)
    }

    pub fn deploy_options(&self) -> orchestrator::Options {
        orchestrator::Options {
            project_root: self.project_root.clone(),
            branches: self.branches.clone(),
            timeout: self.deploy_timeout,
            git: git::Options {
                remote: self.remote.clone(),
                ff_only: self.ff_only,
            },
            detector: detector::Options {
                unit: self.systemd_unit.clone(),
                compose_file: self.compose_file.clone(),
            },
            restart: restart::Options {
                unit: self.systemd_unit.clone(),
                use_sudo: self.use_sudo,
                compose_file: self.compose_file.clone(),
                retries: self.restart_retries,
                poll_interval: self.restart_poll_interval,
            },
        }
    }

    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            log_level: self.log_level.clone(),
            json_format: self.log_json,
            log_dir: self.log_dir.clone(),
            ..LogOptions::default()
        }
    }
}

fn parse_or<T>(vars: &HashMap<String, String>, key: &str, default: T) -> Result<T, DeployerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match vars.get(key) {
        Some(raw) => raw.trim().parse().map_err(|e| {
            DeployerError::ConfigError(format!("invalid {} '{}': {}", key, raw, e))
        }),
        None => Ok(default),
    }
}

fn parse_bool(vars: &HashMap<String, String>, key: &str, default: bool) -> Result<bool, DeployerError> {
    match vars.get(key).map(|v| v.trim().to_lowercase()).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(DeployerError::ConfigError(format!(
            "invalid {} '{}': expected true or false",
            key, other
        ))),
    }
}
