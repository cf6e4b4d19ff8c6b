use std::path::{Path, PathBuf};

/// Base data directory for the application.
pub const DATA_DIR: &str = "./data";

pub const DATA_DB_DIR: &str = "./data/db";
pub const DATA_MEDIA_DIR: &str = "./data/media";

pub const MESSAGES_DB_PATH: &str = "./data/db/messages.db";
pub const WHATSAPP_AUTH_DB_PATH: &str = "./data/db/whatsapp_auth.db";
pub const WHATSAPP_LOG_PATH: &str = "./data/whatsapp.log";

/// Source-tree directory holding the embedded migration files. Used by the
/// migrate CLI when creating new migrations.
pub const MIGRATIONS_DIR: &str = "migrations";

/// Creates all required data directories.
pub fn ensure_data_directories() -> std::io::Result<()> {
    for dir in [DATA_DIR, DATA_DB_DIR, DATA_MEDIA_DIR] {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Returns the absolute media path for a relative path stored in the
/// database, refusing anything that escapes the media root.
pub fn media_path(relative: &str) -> Option<PathBuf> {
    contained_path(Path::new(DATA_MEDIA_DIR), relative)
}

pub(crate) fn contained_path(root: &Path, relative: &str) -> Option<PathBuf> {
    let joined = root.join(relative);
    let root = root.canonicalize().ok()?;
    let resolved = joined.canonicalize().ok()?;
    if resolved.starts_with(&root) {
        Some(resolved)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contained_path_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("media");
        std::fs::create_dir_all(root.join("images")).unwrap();
        std::fs::write(root.join("images/a.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("secret.txt"), b"x").unwrap();

        assert!(contained_path(&root, "images/a.jpg").is_some());
        assert!(contained_path(&root, "../secret.txt").is_none());
    }
}
