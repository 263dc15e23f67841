use std::path::Path;

/// Restricts a file holding secrets (config, SQLite database) to its owner
#[cfg(unix)]
pub fn secure_file<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    use std::os::unix::prelude::PermissionsExt;
    std::fs::set_permissions(path.as_ref(), std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
pub fn secure_file<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    std::fs::metadata(path.as_ref()).map(|_| ())
}
