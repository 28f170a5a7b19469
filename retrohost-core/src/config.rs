use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// When to apply the XRGB8888 red/blue swap (plus opaque alpha) to converted frames.
///
/// The swap corrects the channel order observed from some cores; it is not a property of the
/// pixel format itself, so it can be limited to named cores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelSwap {
    #[default]
    Always,
    Never,
    /// Only for cores whose `library_name` matches one of these (case-insensitive).
    Cores(Vec<String>),
}

impl ChannelSwap {
    pub fn applies_to(&self, core_name: &str) -> bool {
        match self {
            ChannelSwap::Always => true,
            ChannelSwap::Never => false,
            ChannelSwap::Cores(names) => names.iter().any(|n| n.eq_ignore_ascii_case(core_name)),
        }
    }
}

/// Host-side settings exposed to cores through the environment protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Answer to `GET_SYSTEM_DIRECTORY` (BIOS files and the like).
    pub system_directory: PathBuf,
    /// Answer to `GET_SAVE_DIRECTORY`; falls back to `system_directory`.
    pub save_directory: Option<PathBuf>,
    pub channel_swap: ChannelSwap,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            system_directory: PathBuf::from("."),
            save_directory: None,
            channel_swap: ChannelSwap::default(),
        }
    }
}

impl HostConfig {
    pub fn with_system_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.system_directory = dir.into();
        self
    }

    pub fn with_save_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_directory = Some(dir.into());
        self
    }

    pub fn with_channel_swap(mut self, swap: ChannelSwap) -> Self {
        self.channel_swap = swap;
        self
    }

    pub fn effective_save_directory(&self) -> &Path {
        self.save_directory
            .as_deref()
            .unwrap_or(&self.system_directory)
    }

    /// Read a TOML config. A missing file yields defaults; a malformed one is reported and
    /// replaced by defaults.
    pub fn load_from_file(path: &Path) -> HostConfig {
        let text = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                debug!("No host config at {} ({e}); using defaults", path.display());
                return HostConfig::default();
            }
        };

        match toml::from_str::<HostConfig>(&text) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(
                    "Failed to parse host config {}: {e}; using defaults",
                    path.display()
                );
                HostConfig::default()
            }
        }
    }

    pub fn save_to_file(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let text = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_directory_falls_back_to_system_directory() {
        let cfg = HostConfig::default().with_system_directory("/bios");
        assert_eq!(cfg.effective_save_directory(), Path::new("/bios"));

        let cfg = cfg.with_save_directory("/saves");
        assert_eq!(cfg.effective_save_directory(), Path::new("/saves"));
    }

    #[test]
    fn parses_partial_toml() {
        let cfg: HostConfig = toml::from_str(
            r#"
            system_directory = "/opt/bios"

            [channel_swap]
            cores = ["mGBA", "Snes9x"]
            "#,
        )
        .unwrap();

        assert_eq!(cfg.system_directory, PathBuf::from("/opt/bios"));
        assert_eq!(cfg.save_directory, None);
        assert!(cfg.channel_swap.applies_to("mgba"));
        assert!(!cfg.channel_swap.applies_to("Genesis Plus GX"));
    }

    #[test]
    fn unit_variants_parse_from_strings() {
        let cfg: HostConfig = toml::from_str(r#"channel_swap = "never""#).unwrap();
        assert_eq!(cfg.channel_swap, ChannelSwap::Never);
        assert!(!cfg.channel_swap.applies_to("anything"));
        assert!(ChannelSwap::Always.applies_to("anything"));
    }

    #[test]
    fn missing_or_malformed_files_yield_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert_eq!(HostConfig::load_from_file(&missing), HostConfig::default());

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "system_directory = [").unwrap();
        assert_eq!(HostConfig::load_from_file(&bad), HostConfig::default());
    }

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("host.toml");
        let cfg = HostConfig::default()
            .with_save_directory("/saves")
            .with_channel_swap(ChannelSwap::Cores(vec!["mGBA".into()]));

        cfg.save_to_file(&path).unwrap();
        assert_eq!(HostConfig::load_from_file(&path), cfg);
    }
}
