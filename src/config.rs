use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SafeZoneError};

pub const DATA_DIR: &str = ".clanzone";
pub const CONFIG_VERSION: u32 = 1;

/// Longest activation window accepted: ten years.
pub const MAX_WINDOW_SECS: f64 = 10.0 * 365.0 * 24.0 * 3600.0;
/// Upper bound for `prompt_delay_ms` and `collaborator_timeout_ms`: one hour.
pub const MAX_DELAY_MS: u64 = 3_600_000;

/// How the coordinator detects that a group already owns a zone.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingZoneCheck {
    /// Rely on the claim registry and the deterministic zone id.
    #[default]
    Deterministic,
    /// Additionally scan the zone service for ids containing the group tag.
    ScanZoneIds,
}

impl std::fmt::Display for ExistingZoneCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deterministic => write!(f, "deterministic"),
            Self::ScanZoneIds => write!(f, "scan_zone_ids"),
        }
    }
}

/// Claim policy, loaded once at startup and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Claims are accepted only this many seconds after the reference start.
    pub activation_window_secs: Option<f64>,
    /// Explicit reference start ("wipe time"). Persisted on first start when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_started_at: Option<DateTime<Utc>>,
    pub zone_radius: f64,
    /// Only these groups may claim. `None` or empty means every group may.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_groups: Option<Vec<String>>,
    /// Passed verbatim to the zone service; `{group}` expands to the group tag.
    pub zone_flags: BTreeMap<String, String>,
    pub zone_id_prefix: String,
    /// Host object kinds whose interaction sessions offer the prompt.
    pub target_kinds: Vec<String>,
    pub permission: String,
    pub command: String,
    pub prompt_delay_ms: u64,
    pub collaborator_timeout_ms: u64,
    pub schedule_zone_erase: bool,
    pub existing_zone_check: ExistingZoneCheck,
}

impl Default for Policy {
    fn default() -> Self {
        let zone_flags = [
            ("nopvp", "true"),
            ("noraid", "true"),
            ("eject", "true"),
            ("enter_message", "Welcome to {group}'s Safe Zone!"),
            ("leave_message", "Leaving {group}'s Safe Zone."),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            activation_window_secs: Some(3600.0),
            window_started_at: None,
            zone_radius: 50.0,
            allowed_groups: None,
            zone_flags,
            zone_id_prefix: "clansafezone_".into(),
            target_kinds: vec!["cupboard.tool.deployed".into()],
            permission: "clansafezone.use".into(),
            command: "clansafezone.create".into(),
            prompt_delay_ms: 200,
            collaborator_timeout_ms: 2000,
            schedule_zone_erase: true,
            existing_zone_check: ExistingZoneCheck::Deterministic,
        }
    }
}

impl Policy {
    /// Reject values the coordinator cannot act on.
    pub fn validate(&self) -> Result<()> {
        if !(self.zone_radius.is_finite() && self.zone_radius > 0.0) {
            return Err(SafeZoneError::InvalidPolicy(format!(
                "zone_radius must be positive, got {}",
                self.zone_radius
            )));
        }
        if let Some(window) = self.activation_window_secs
            && !(window.is_finite() && window > 0.0)
        {
            return Err(SafeZoneError::InvalidPolicy(format!(
                "activation_window_secs must be positive, got {window}"
            )));
        }
        if let Some(window) = self.activation_window_secs
            && window > MAX_WINDOW_SECS
        {
            return Err(SafeZoneError::InvalidPolicy(format!(
                "activation_window_secs must be at most {MAX_WINDOW_SECS}, got {window}"
            )));
        }
        for (field, value) in [
            ("prompt_delay_ms", self.prompt_delay_ms),
            ("collaborator_timeout_ms", self.collaborator_timeout_ms),
        ] {
            if value > MAX_DELAY_MS {
                return Err(SafeZoneError::InvalidPolicy(format!(
                    "{field} must be at most {MAX_DELAY_MS}, got {value}"
                )));
            }
        }
        for (field, value) in [
            ("command", &self.command),
            ("permission", &self.permission),
            ("zone_id_prefix", &self.zone_id_prefix),
        ] {
            if value.trim().is_empty() {
                return Err(SafeZoneError::InvalidPolicy(format!(
                    "{field} must be non-empty"
                )));
            }
        }
        if self.target_kinds.iter().all(|k| k.trim().is_empty()) {
            return Err(SafeZoneError::InvalidPolicy(
                "target_kinds must name at least one object kind".into(),
            ));
        }
        Ok(())
    }

    /// The allow-list, if one is actually configured.
    pub fn allow_list(&self) -> Option<&[String]> {
        self.allowed_groups
            .as_deref()
            .filter(|groups| !groups.is_empty())
    }

    /// Window length, saturating at [`TimeDelta::MAX`] for unvalidated values.
    pub fn activation_window(&self) -> Option<TimeDelta> {
        self.activation_window_secs
            .map(|secs| millis((secs * 1000.0).round() as i64))
    }

    pub fn prompt_delay(&self) -> TimeDelta {
        millis(i64::try_from(self.prompt_delay_ms).unwrap_or(i64::MAX))
    }

    pub fn collaborator_timeout(&self) -> TimeDelta {
        millis(i64::try_from(self.collaborator_timeout_ms).unwrap_or(i64::MAX))
    }

    /// Moment the activation window lapses, if there is one. A deadline past
    /// the last representable instant is clamped to it.
    pub fn window_deadline(&self, reference_start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.activation_window().map(|window| {
            reference_start
                .checked_add_signed(window)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }
}

fn millis(ms: i64) -> TimeDelta {
    TimeDelta::try_milliseconds(ms).unwrap_or(TimeDelta::MAX)
}

/// On-disk config file: `<root>/.clanzone/config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub version: u32,
    #[serde(default)]
    pub policy: Policy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            policy: Policy::default(),
        }
    }
}

pub fn data_dir(root: &Path) -> PathBuf {
    root.join(DATA_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    data_dir(root).join("config.json")
}

impl Config {
    /// Load and validate the config under `root`.
    pub fn load(root: &Path) -> Result<Self> {
        let path = config_path(root);
        if !path.exists() {
            return Err(SafeZoneError::NotInitialized);
        }
        let data = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&data)?;
        config.policy.validate()?;
        Ok(config)
    }

    /// Load the config if the data dir exists, else fall back to defaults.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        match Self::load(root) {
            Err(SafeZoneError::NotInitialized) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn write(&self, root: &Path) -> Result<()> {
        fs::create_dir_all(data_dir(root))?;
        fs::write(config_path(root), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
