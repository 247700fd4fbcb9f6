use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

const PREFERENCE_FILE: &str = "theme";

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ThemeName {
    #[default]
    Light,
    Dark,
}

impl ThemeName {
    pub fn toggled(self) -> Self {
        match self {
            ThemeName::Light => ThemeName::Dark,
            ThemeName::Dark => ThemeName::Light,
        }
    }
}

/// Last theme picked in the TUI, kept apart from the hand-edited config.
#[derive(Debug, Clone)]
pub struct ThemePreference {
    path: PathBuf,
}

impl ThemePreference {
    pub fn in_state_dir(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(PREFERENCE_FILE),
        }
    }

    pub fn load(&self) -> Option<ThemeName> {
        let raw = fs::read_to_string(&self.path).ok()?;
        match raw.trim().parse() {
            Ok(theme) => Some(theme),
            Err(_) => {
                tracing::warn!(path = %self.path.display(), value = raw.trim(), "ignoring unknown stored theme");
                None
            }
        }
    }

    pub fn store(&self, theme: ThemeName) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating state directory {}", parent.display()))?;
        }
        fs::write(&self.path, theme.to_string())
            .with_context(|| format!("writing theme preference {}", self.path.display()))
    }
}
