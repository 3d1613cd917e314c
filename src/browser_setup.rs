//! Chrome/Chromium detection for the headless launcher.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Well-known Chrome/Chromium executable paths per platform.
#[cfg(target_os = "macos")]
const KNOWN_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
];

#[cfg(all(unix, not(target_os = "macos")))]
const KNOWN_PATHS: &[&str] = &[
    "/opt/google/chrome/chrome",
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
];

#[cfg(windows)]
const KNOWN_PATHS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
];

/// Well-known command names to search in PATH.
const KNOWN_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Detect an existing Chrome/Chromium installation.
///
/// Checks, in order, the `CHROME` environment variable, well-known command
/// names in PATH, then well-known filesystem paths.
pub fn detect_chrome() -> Option<PathBuf> {
    detect_chrome_with(std::env::var("CHROME").ok().as_deref(), KNOWN_PATHS)
}

fn detect_chrome_with(env_override: Option<&str>, known_paths: &[&str]) -> Option<PathBuf> {
    if let Some(path) = env_override {
        let p = PathBuf::from(path);
        if p.exists() {
            debug!("Chrome found via CHROME env var: {}", path);
            return Some(p);
        }
        debug!("CHROME points at missing file {}, ignoring", path);
    }

    for cmd in KNOWN_COMMANDS {
        if let Ok(path) = which::which(cmd) {
            debug!("Chrome found in PATH: {}", path.display());
            return Some(path);
        }
    }

    known_paths
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .map(|p| {
            debug!("Chrome found at known path: {}", p.display());
            p.to_path_buf()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_override_wins_when_present() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        assert_eq!(detect_chrome_with(Some(path), &[]), Some(PathBuf::from(path)));
    }

    #[test]
    fn test_known_path_used_as_fallback() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        let found = detect_chrome_with(Some("/definitely/not/chrome"), &[path]);
        // A Chrome on PATH takes precedence over the known path list.
        assert!(found.is_some());
    }

    #[test]
    fn test_known_commands_not_empty() {
        assert!(KNOWN_COMMANDS.contains(&"chromium"));
    }
}
