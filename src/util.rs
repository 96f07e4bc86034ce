use std::path::PathBuf;

const CONFIG_PATH: &str = "TEAMWATCH_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "blender_config.yaml";

pub fn get_default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

/// Config path from the environment, falling back to the default
pub fn get_config_path() -> PathBuf {
    std::env::var(CONFIG_PATH).map_or_else(|_| get_default_config_path(), PathBuf::from)
}

/// Suffix of the bundled RustScan binary for this platform
pub fn rustscan_suffix() -> Option<&'static str> {
    match std::env::consts::OS {
        "linux" => Some("linux"),
        "macos" => Some("macos"),
        "windows" => Some("windows.exe"),
        _ => None,
    }
}
