//! Per-platform paths and the mpv binary lookup.

use std::path::{Path, PathBuf};

const APP_DIR: &str = "iptv";

#[cfg(unix)]
const PATH_SEPARATOR: char = ':';
#[cfg(windows)]
const PATH_SEPARATOR: char = ';';

/// IPC endpoint name for this process's mpv instance.
#[cfg(unix)]
pub fn mpv_socket_name() -> String {
    std::env::temp_dir()
        .join(format!("iptv-mpv-{}.sock", std::process::id()))
        .display()
        .to_string()
}

#[cfg(windows)]
pub fn mpv_socket_name() -> String {
    format!("iptv-mpv-{}", std::process::id())
}

#[cfg(unix)]
pub fn mpv_socket_arg() -> String {
    format!("--input-ipc-server={}", mpv_socket_name())
}

#[cfg(windows)]
pub fn mpv_socket_arg() -> String {
    format!("--input-ipc-server=\\\\.\\pipe\\{}", mpv_socket_name())
}

fn exe_dir() -> Option<PathBuf> {
    std::env::current_exe().ok()?.parent().map(Path::to_path_buf)
}

#[cfg(unix)]
fn home_subdir(parts: &[&str], fallback: &str) -> PathBuf {
    let base = dirs::home_dir().unwrap_or_else(|| PathBuf::from(fallback));
    parts.iter().fold(base, |p, part| p.join(part)).join(APP_DIR)
}

/// `~/.local/share/iptv` on Linux and macOS. On Windows a `data` directory
/// beside the executable (portable install) wins over the local app data.
pub fn data_dir() -> PathBuf {
    #[cfg(unix)]
    {
        home_subdir(&[".local", "share"], "/tmp")
    }
    #[cfg(windows)]
    {
        if let Some(portable) = exe_dir().map(|d| d.join("data")).filter(|d| d.exists()) {
            return portable;
        }
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

/// `~/.config/iptv` on Linux and macOS; on Windows the executable's own
/// directory when it holds a `config.toml`.
pub fn config_dir() -> PathBuf {
    #[cfg(unix)]
    {
        home_subdir(&[".config"], ".")
    }
    #[cfg(windows)]
    {
        if let Some(dir) = exe_dir().filter(|d| d.join("config.toml").exists()) {
            return dir;
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

pub fn mpv_binary_name() -> &'static str {
    if cfg!(windows) {
        "mpv.exe"
    } else {
        "mpv"
    }
}

/// Find the mpv binary: `MPV_PATH`, then beside the current executable,
/// then `PATH`.
pub fn find_mpv_binary() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("MPV_PATH")
        .map(PathBuf::from)
        .filter(|p| p.exists())
    {
        return Some(path);
    }

    let name = mpv_binary_name();
    if let Some(local) = exe_dir().map(|d| d.join(name)).filter(|p| p.exists()) {
        return Some(local);
    }

    std::env::var("PATH")
        .ok()?
        .split(PATH_SEPARATOR)
        .map(|dir| PathBuf::from(dir).join(name))
        .find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_are_app_scoped() {
        assert!(data_dir().ends_with(APP_DIR));
        assert!(config_dir().ends_with(APP_DIR));
    }

    #[test]
    fn test_socket_name_is_per_process() {
        let name = mpv_socket_name();
        assert!(name.contains(&std::process::id().to_string()));
        assert!(mpv_socket_arg().starts_with("--input-ipc-server="));
    }
}
