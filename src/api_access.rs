use std::sync::Arc;

use serde::Deserialize;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiPermissions {
    pub attach: bool,
    pub script: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiKey {
    pub key: String,

    #[serde(default, flatten)]
    pub permissions: ApiPermissions,
}

#[allow(clippy::derivable_impls)]
impl Default for ApiPermissions {
    fn default() -> Self {
        Self {
            attach: false,
            script: false,
        }
    }
}

impl ApiPermissions {
    pub const fn attach() -> Self {
        Self {
            attach: true,
            script: false,
        }
    }

    pub const fn script() -> Self {
        Self {
            attach: false,
            script: true,
        }
    }

    pub const fn all() -> Self {
        Self {
            attach: true,
            script: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiAccessPolicy {
    pub disable_access_control: bool,
    pub restrict_attach: bool,
    pub restrict_script: bool,
}

impl Default for ApiAccessPolicy {
    fn default() -> Self {
        Self {
            // Debug builds run without access control for development purposes.
            disable_access_control: cfg!(debug_assertions),
            restrict_attach: true,
            restrict_script: true,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ApiAccessConfig {
    pub api_policy: ApiAccessPolicy,
    pub api_keys: Vec<ApiKey>,
}

pub struct ApiAccessManager {
    config: Arc<Config>,
}

impl ApiAccessManager {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn acquire_permissions(&self, key: Option<&str>, permissions: ApiPermissions) -> bool {
        let config = &self.config.api_access;

        if config.api_policy.disable_access_control {
            return true;
        }

        let mut attach_check = !permissions.attach || !config.api_policy.restrict_attach;
        let mut script_check = !permissions.script || !config.api_policy.restrict_script;

        if let Some(key_config) = key.and_then(|key| config.api_keys.iter().find(|k| k.key == key))
        {
            attach_check |= key_config.permissions.attach;
            script_check |= key_config.permissions.script;
        }

        attach_check && script_check
    }
}
