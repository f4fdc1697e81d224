//! Platform-specific paths for vault storage.

use std::path::PathBuf;

/// Get the platform-specific data directory for storing the vault
///
/// Returns:
/// - Windows: %APPDATA%\Palisade
/// - macOS: ~/Library/Application Support/Palisade
/// - Linux/Other: ~/.local/share/Palisade
pub fn get_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".data")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join("Palisade")
}

/// Get the default vault database path
pub fn get_default_vault_path() -> PathBuf {
    get_data_dir().join("vault.db")
}

/// Ensure the data directory exists, creating it if necessary
pub fn ensure_data_dir() -> std::io::Result<PathBuf> {
    let dir = get_data_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
