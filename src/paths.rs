use std::path::PathBuf;
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// File name of the optional configuration file next to the executable.
pub const CONFIG_FILE_NAME: &str = "click_capture.json";

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the logs directory: `<exe_dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_exe_dir().join("logs")
}

/// Returns the default save directory for captures: `<exe_dir>/Pictures/`
pub fn get_pictures_dir() -> PathBuf {
    get_exe_dir().join("Pictures")
}

/// Returns the configuration file path: `<exe_dir>/click_capture.json`
pub fn get_config_path() -> PathBuf {
    get_exe_dir().join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_are_under_exe_dir() {
        let exe_dir = get_exe_dir();
        assert_eq!(get_logs_dir(), exe_dir.join("logs"));
        assert_eq!(get_pictures_dir(), exe_dir.join("Pictures"));
        assert!(get_config_path().ends_with(CONFIG_FILE_NAME));
    }
}
