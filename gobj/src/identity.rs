//! Node identity: a persisted UUID plus the hostname

use crate::error::Result;
use crate::runtime::Runtime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Failed to access identity file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse identity file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub node_uuid: Uuid,
    #[serde(skip)]
    pub hostname: String,
}

/// On-disk form of the identity file
#[derive(Debug, Serialize, Deserialize)]
struct IdentityFile {
    node_uuid: Uuid,
    created_at: DateTime<Utc>,
}

impl Identity {
    /// Fresh identity that is not written anywhere
    pub fn ephemeral() -> Self {
        Self {
            node_uuid: Uuid::new_v4(),
            hostname: hostname(),
        }
    }

    /// Read the uuid from `path`, generating and writing one when the file is absent
    pub fn load_or_create(path: &Path) -> std::result::Result<Self, IdentityError> {
        let node_uuid = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let file: IdentityFile = serde_json::from_str(&contents)?;
            file.node_uuid
        } else {
            let file = IdentityFile {
                node_uuid: Uuid::new_v4(),
                created_at: Utc::now(),
            };
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
            std::fs::write(path, serde_json::to_string_pretty(&file)?)?;
            tracing::info!(path = %path.display(), uuid = %file.node_uuid, "node uuid created");
            file.node_uuid
        };
        Ok(Self {
            node_uuid,
            hostname: hostname(),
        })
    }
}

/// `HOSTNAME`, else `/etc/hostname`, else `localhost`
pub fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_string())
}

impl Runtime {
    /// Identity of this node, loaded on first use and cached
    pub fn identity(&self) -> Result<&Identity> {
        self.identity.get_or_try_init(|| {
            let identity = match &self.settings.identity_file {
                Some(path) => Identity::load_or_create(path)?,
                None => Identity::ephemeral(),
            };
            Ok(identity)
        })
    }

    pub fn node_uuid(&self) -> Result<String> {
        Ok(self.identity()?.node_uuid.to_string())
    }

    pub fn hostname(&self) -> Result<&str> {
        Ok(self.identity()?.hostname.as_str())
    }
}
