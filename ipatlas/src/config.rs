use std::{fs, path::PathBuf, str::FromStr};

use thiserror::Error;

use core_types::config::SpaceConfig;

const DELEGATION_FILES: &[&str] = &[
    "delegated-afrinic-extended-latest",
    "delegated-apnic-extended-latest",
    "delegated-arin-extended-latest",
    "delegated-lacnic-extended-latest",
    "delegated-ripencc-extended-latest",
];

/// Deployment target for the binary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            other => Err(ConfigError::UnknownEnvironment {
                value: other.to_string(),
            }),
        }
    }
}

/// Minimal configuration blob compiled into the binary.
#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub state_dir: PathBuf,
    pub delegation_files: Vec<PathBuf>,
    pub space: SpaceConfig,
}

impl AppConfig {
    pub fn load(env: Environment) -> Result<Self, ConfigError> {
        Ok(Self {
            env,
            state_dir: state_dir_for(env),
            delegation_files: delegation_files_for(env),
            space: SpaceConfig::default(),
        })
    }

    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.state_dir).map_err(|source| ConfigError::CreateStateDir {
            path: self.state_dir.clone(),
            source,
        })
    }

    pub fn env_label(&self) -> &'static str {
        match self.env {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.state_dir.join("snapshots")
    }
}

fn state_dir_for(env: Environment) -> PathBuf {
    match env {
        Environment::Dev => PathBuf::from("./ipatlas.state"),
        Environment::Prod => PathBuf::from("/var/lib/ipatlas/state"),
    }
}

fn delegation_files_for(env: Environment) -> Vec<PathBuf> {
    let data_dir = match env {
        Environment::Dev => PathBuf::from("./data"),
        Environment::Prod => PathBuf::from("/var/lib/ipatlas/data"),
    };
    DELEGATION_FILES
        .iter()
        .map(|name| data_dir.join(name))
        .collect()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown environment '{value}' (expected 'dev' or 'prod')")]
    UnknownEnvironment { value: String },
    #[error("failed to create state directory {path:?}: {source}")]
    CreateStateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}
