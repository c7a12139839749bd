use crate::constants::UNKNOWN_APP;
use crate::error::TrackerResult;
use log::info;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const BUILTIN_NAMES: &[(&str, &str)] = &[
    ("explorer.exe", "Windows Explorer"),
    ("taskmgr.exe", "Task Manager"),
    ("powershell.exe", "Windows PowerShell"),
    ("cmd.exe", "Command Prompt"),
    ("windowsterminal.exe", "Windows Terminal"),
    ("shellexperiencehost.exe", "Windows Shell Experience Host"),
    ("msedgewebview2.exe", "Microsoft Edge WebView2"),
    ("code.exe", "Visual Studio Code"),
    ("neutralino-win_x64.exe", "Neutralino App"),
    ("opera.exe", "Opera Browser"),
    ("chrome.exe", "Google Chrome"),
    ("msedge.exe", "Microsoft Edge"),
    ("firefox.exe", "Mozilla Firefox"),
    ("winword.exe", "Microsoft Word"),
    ("excel.exe", "Microsoft Excel"),
    ("powerpnt.exe", "Microsoft PowerPoint"),
    ("vlc.exe", "VLC Media Player"),
    ("notepad.exe", "Notepad"),
    // X11 WM_CLASS instance names
    ("code", "Visual Studio Code"),
    ("google-chrome", "Google Chrome"),
    ("firefox", "Mozilla Firefox"),
    ("navigator", "Mozilla Firefox"),
    ("gnome-terminal-server", "Terminal"),
    ("vlc", "VLC Media Player"),
];

/// Friendly display names for process / window-class names.
///
/// Lookups are case-insensitive and accept names with or without a trailing
/// `.exe`. Unknown names are returned unchanged.
#[derive(Debug, Clone)]
pub struct AppNameTable {
    names: HashMap<String, String>,
}

impl Default for AppNameTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AppNameTable {
    pub fn builtin() -> Self {
        let names = BUILTIN_NAMES
            .iter()
            .map(|(raw, friendly)| ((*raw).to_string(), (*friendly).to_string()))
            .collect();
        Self { names }
    }

    /// Layers overrides from a JSON object file (`{"raw.exe": "Friendly"}`) on top.
    pub fn extend_from_file(&mut self, path: &Path) -> TrackerResult<usize> {
        let contents = fs::read_to_string(path)?;
        let overrides: HashMap<String, String> = serde_json::from_str(&contents)?;
        let count = overrides.len();
        for (raw, friendly) in overrides {
            self.insert(&raw, friendly);
        }
        info!("Loaded {count} app name overrides from {}", path.display());
        Ok(count)
    }

    pub fn insert(&mut self, raw: &str, friendly: String) {
        self.names.insert(raw.trim().to_lowercase(), friendly);
    }

    pub fn friendly_name(&self, raw: &str) -> String {
        let raw = raw.trim();
        if raw.is_empty() {
            return UNKNOWN_APP.to_string();
        }

        let key = raw.to_lowercase();
        if let Some(name) = self.names.get(&key) {
            return name.clone();
        }

        let alternate = match key.strip_suffix(".exe") {
            Some(stem) => stem.to_string(),
            None => format!("{key}.exe"),
        };
        self.names
            .get(&alternate)
            .cloned()
            .unwrap_or_else(|| raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = AppNameTable::builtin();
        assert_eq!(table.friendly_name("Code.exe"), "Visual Studio Code");
        assert_eq!(table.friendly_name("WindowsTerminal.exe"), "Windows Terminal");
    }

    #[test]
    fn test_lookup_tolerates_missing_exe_suffix() {
        let table = AppNameTable::builtin();
        assert_eq!(table.friendly_name("winword"), "Microsoft Word");
        assert_eq!(table.friendly_name("firefox"), "Mozilla Firefox");
    }

    #[test]
    fn test_unknown_names_pass_through() {
        let table = AppNameTable::builtin();
        assert_eq!(table.friendly_name("obsidian.exe"), "obsidian.exe");
        assert_eq!(table.friendly_name("  "), UNKNOWN_APP);
    }

    #[test]
    fn test_overrides_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("names.json");
        std::fs::write(&path, r#"{"Obsidian.exe": "Obsidian", "notepad.exe": "Editor"}"#).unwrap();

        let mut table = AppNameTable::builtin();
        let loaded = table.extend_from_file(&path).unwrap();

        assert_eq!(loaded, 2);
        assert_eq!(table.friendly_name("obsidian.exe"), "Obsidian");
        assert_eq!(table.friendly_name("NOTEPAD.EXE"), "Editor");
    }

    #[test]
    fn test_malformed_override_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("names.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let mut table = AppNameTable::builtin();
        assert!(table.extend_from_file(&path).is_err());
        assert_eq!(table.friendly_name("chrome.exe"), "Google Chrome");
    }
}
