// host runs keep modulator presets next to the project; loaded on startup, saved on quit
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::pipeline::modulator::ModulatorBank;

const SEQCORE_DIR: &str = ".seqcore";
const MODULATOR_FILE: &str = "modulators.json";

// <project_dir>/.seqcore/modulators.json
pub fn modulator_file_path(project_dir: &Path) -> PathBuf {
    project_dir.join(SEQCORE_DIR).join(MODULATOR_FILE)
}

// missing or unreadable presets just mean a fresh bank
pub fn load_modulators(project_dir: &Path) -> Option<ModulatorBank> {
    let path = modulator_file_path(project_dir);
    let data = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&data) {
        Ok(bank) => Some(bank),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable modulator presets");
            None
        }
    }
}

// Save the presets, making .seqcore/ if it doesn't exist already
pub fn save_modulators(project_dir: &Path, bank: &ModulatorBank) -> anyhow::Result<()> {
    let path = modulator_file_path(project_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("could not create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(bank)?;
    std::fs::write(&path, json).with_context(|| format!("could not write {}", path.display()))?;
    Ok(())
}
