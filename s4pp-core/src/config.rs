use serde_derive::{Deserialize, Serialize};

use crate::error::{Result, S4ppError};

fn default_port() -> u16 {
    22226
}

fn default_hide() -> HideMode {
    HideMode::Preferred
}

/// Hide-layer negotiation policy, mirroring the `hide` config key of §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HideMode {
    Disabled,
    Preferred,
    Mandatory,
}

impl HideMode {
    fn from_u8(v: u8) -> Option<HideMode> {
        match v {
            0 => Some(HideMode::Disabled),
            1 => Some(HideMode::Preferred),
            2 => Some(HideMode::Mandatory),
            _ => None,
        }
    }
}

/// Data row format selector (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataFormat {
    Simple = 0,
    Extended = 1,
}

/// Construction parameters for a session, deserializable with `serde` the
/// way `server/services/authenticator`'s `Config`/`UserInfo` are loaded via
/// `serdeconv`/`serde_json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// DNS hostname of the collection server. Required.
    pub server: String,
    /// TCP port. Defaults to 22226.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Auth username. Required.
    pub user: String,
    /// Auth shared key. Required.
    pub key: String,
    /// Wrap the connection in TLS. Defaults to false.
    #[serde(default)]
    pub secure: bool,
    /// HIDE negotiation policy. Defaults to `Preferred` when not secure.
    #[serde(default = "default_hide")]
    pub hide: HideMode,
    /// Data row format. Defaults to `Simple`.
    #[serde(default)]
    pub format: DataFormatConfig,
    /// `source_id` prefix used when samples are read from a flash FIFO.
    #[serde(default)]
    pub flashbase: Option<String>,
    /// Legacy HMAC key-length clamp, see `DESIGN.md` / SPEC_FULL §9.
    #[serde(default)]
    pub johny_bug: bool,
    /// Host override of the server-advertised `n_max`.
    #[serde(default)]
    pub max_batch_size: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct DataFormatConfig(pub DataFormat);

impl Default for DataFormatConfig {
    fn default() -> Self {
        DataFormatConfig(DataFormat::Simple)
    }
}

impl From<u8> for DataFormatConfig {
    fn from(v: u8) -> Self {
        DataFormatConfig(if v == 0 { DataFormat::Simple } else { DataFormat::Extended })
    }
}

impl From<DataFormatConfig> for u8 {
    fn from(v: DataFormatConfig) -> u8 {
        v.0 as u8
    }
}

impl SessionConfig {
    /// Validates required fields, matching `s4pp_do_upload`'s
    /// `err_out("no 'user' cfg")`-style checks in the original source.
    pub fn validate(&self) -> Result<()> {
        if self.server.is_empty() {
            return Err(S4ppError::Config("no 'server' cfg".into()));
        }
        if self.user.is_empty() {
            return Err(S4ppError::Config("no 'user' cfg".into()));
        }
        if self.key.is_empty() {
            return Err(S4ppError::Config("no 'key' cfg".into()));
        }
        if self.format.0 == DataFormat::Extended && self.flashbase.is_none() {
            return Err(S4ppError::Config("format 1 requires flash-backed source".into()));
        }
        Ok(())
    }

    pub fn hide_mode_from_u8(v: u8) -> Option<HideMode> {
        HideMode::from_u8(v)
    }

    pub fn from_json(s: &str) -> Result<SessionConfig> {
        let config: SessionConfig =
            serde_json::from_str(s).map_err(|e| S4ppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(s: &str) -> Result<SessionConfig> {
        let config: SessionConfig =
            serdeconv::from_toml_str(s).map_err(|e| S4ppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
