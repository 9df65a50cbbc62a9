//! Per-session workspace directories and path confinement.
//!
//! Layout: `<base>/<tenant>/<session>/` with fixed subdirectories
//! `.meta` (audit log and metadata), `artifacts`, and `exports`.
//!
//! [`resolve`] is the single confinement check: a relative path is walked
//! component by component from the canonical root, following symlinks on the
//! part that exists and appending missing segments lexically. Anything that
//! ends up outside the root is a [`SandboxError::PathEscape`].

use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::errors::{Result, SandboxError};

/// Metadata subdirectory (holds the session audit log).
pub const META_DIR: &str = ".meta";

/// Subdirectories created inside every workspace root.
pub const SUBDIRECTORIES: [&str; 3] = [META_DIR, "artifacts", "exports"];

// ─────────────────────────────────────────────────────────────────────────────
// Path confinement
// ─────────────────────────────────────────────────────────────────────────────

/// Resolve `relative` inside `root`, returning the absolute path.
///
/// Absolute or empty input, and anything resolving outside the canonical
/// root (including through symlinks), fails with `PathEscape`.
pub fn resolve(root: &Path, relative: &str) -> Result<PathBuf> {
    let escape = || SandboxError::PathEscape {
        path: relative.to_owned(),
    };

    let trimmed = relative.trim();
    if trimmed.is_empty() || Path::new(trimmed).is_absolute() {
        return Err(escape());
    }

    let canonical_root = root.canonicalize()?;
    let mut current = canonical_root.clone();

    for component in Path::new(trimmed).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !current.pop() {
                    return Err(escape());
                }
            }
            Component::Normal(segment) => {
                let next = current.join(segment);
                current = match fs::symlink_metadata(&next) {
                    // Dangling symlinks fail to canonicalize and are refused.
                    Ok(_) => next.canonicalize().map_err(|_| escape())?,
                    Err(_) => next,
                };
            }
            Component::RootDir | Component::Prefix(_) => return Err(escape()),
        }
    }

    if current.starts_with(&canonical_root) {
        Ok(current)
    } else {
        Err(escape())
    }
}

/// Check that `id` is a single, non-empty path component.
pub fn validate_id(kind: &'static str, id: &str) -> Result<()> {
    let invalid = || SandboxError::InvalidId {
        kind,
        value: id.to_owned(),
    };
    if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\', '\0']) {
        return Err(invalid());
    }
    let mut components = Path::new(id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(c)), None) if c == OsStr::new(id) => Ok(()),
        _ => Err(invalid()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Workspace manager
// ─────────────────────────────────────────────────────────────────────────────

/// Creates, sizes and destroys workspaces under one base directory.
#[derive(Clone, Debug)]
pub struct WorkspaceManager {
    base_dir: PathBuf,
}

impl WorkspaceManager {
    /// Manager rooted at `base_dir` (created lazily).
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// The configured base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory holding all of a tenant's workspaces.
    pub fn tenant_dir(&self, tenant_id: &str) -> Result<PathBuf> {
        validate_id("tenant", tenant_id)?;
        Ok(self.base_dir.join(tenant_id))
    }

    /// Workspace root path (not necessarily existing).
    pub fn root(&self, tenant_id: &str, session_id: &str) -> Result<PathBuf> {
        validate_id("session", session_id)?;
        Ok(self.tenant_dir(tenant_id)?.join(session_id))
    }

    /// Whether the workspace root exists.
    pub fn exists(&self, tenant_id: &str, session_id: &str) -> bool {
        self.root(tenant_id, session_id).is_ok_and(|p| p.is_dir())
    }

    /// Create the workspace (idempotent). Returns the canonical root.
    pub fn create(&self, tenant_id: &str, session_id: &str) -> Result<PathBuf> {
        let root = self.root(tenant_id, session_id)?;
        fs::create_dir_all(&root)?;
        for sub in SUBDIRECTORIES {
            fs::create_dir_all(root.join(sub))?;
        }
        restrict_permissions(&root)?;
        let root = root.canonicalize()?;
        debug!(tenant_id, session_id, root = %root.display(), "workspace ready");
        Ok(root)
    }

    /// Remove the workspace recursively. `false` when nothing existed.
    pub fn destroy(&self, tenant_id: &str, session_id: &str) -> Result<bool> {
        let root = self.root(tenant_id, session_id)?;
        if fs::symlink_metadata(&root).is_err() {
            return Ok(false);
        }
        let canonical = root.canonicalize()?;
        let base = self.base_dir.canonicalize()?;
        if canonical == base || !canonical.starts_with(&base) {
            return Err(SandboxError::OutsideBase { path: canonical });
        }
        fs::remove_dir_all(&canonical)?;
        info!(tenant_id, session_id, "workspace destroyed");
        Ok(true)
    }

    /// Total bytes of regular files in the workspace (0 when missing).
    pub fn size(&self, tenant_id: &str, session_id: &str) -> Result<u64> {
        Ok(dir_size(&self.root(tenant_id, session_id)?))
    }

    /// Total bytes of regular files across all of a tenant's workspaces.
    pub fn tenant_size(&self, tenant_id: &str) -> Result<u64> {
        Ok(dir_size(&self.tenant_dir(tenant_id)?))
    }

    /// Session ids with a workspace for this tenant, sorted.
    pub fn list_sessions(&self, tenant_id: &str) -> Result<Vec<String>> {
        let dir = self.tenant_dir(tenant_id)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut sessions: Vec<String> = entries
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        sessions.sort();
        Ok(sessions)
    }
}

/// Sum of regular-file sizes under `path`; symlinks are not followed.
fn dir_size(path: &Path) -> u64 {
    if !path.exists() {
        return 0;
    }
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

#[cfg(unix)]
fn restrict_permissions(root: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(root, fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_root: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn manager() -> (tempfile::TempDir, WorkspaceManager) {
        let dir = tempfile::tempdir().unwrap();
        let mgr = WorkspaceManager::new(dir.path().join("base"));
        (dir, mgr)
    }

    // ── resolve ─────────────────────────────────────────────────────

    #[test]
    fn resolve_plain_relative() {
        let (_d, mgr) = manager();
        let root = mgr.create("t1", "s1").unwrap();
        let p = resolve(&root, "artifacts/report.md").unwrap();
        assert_eq!(p, root.join("artifacts/report.md"));
        assert!(p.starts_with(&root));
    }

    #[test]
    fn resolve_dotdot_escape_rejected() {
        let (_d, mgr) = manager();
        let root = mgr.create("t1", "s1").unwrap();
        assert_matches!(
            resolve(&root, "../../etc/passwd"),
            Err(SandboxError::PathEscape { .. })
        );
        assert_matches!(
            resolve(&root, "missing/../../s2/x"),
            Err(SandboxError::PathEscape { .. })
        );
    }

    #[test]
    fn resolve_dotdot_staying_inside_ok() {
        let (_d, mgr) = manager();
        let root = mgr.create("t1", "s1").unwrap();
        let p = resolve(&root, "artifacts/../exports/./a.txt").unwrap();
        assert_eq!(p, root.join("exports/a.txt"));
    }

    #[test]
    fn resolve_absolute_and_empty_rejected() {
        let (_d, mgr) = manager();
        let root = mgr.create("t1", "s1").unwrap();
        assert_matches!(resolve(&root, "/etc/passwd"), Err(SandboxError::PathEscape { .. }));
        assert_matches!(resolve(&root, "   "), Err(SandboxError::PathEscape { .. }));
    }

    #[test]
    fn resolve_root_itself() {
        let (_d, mgr) = manager();
        let root = mgr.create("t1", "s1").unwrap();
        assert_eq!(resolve(&root, ".").unwrap(), root);
    }

    #[cfg(unix)]
    #[test]
    fn resolve_symlink_escape_rejected() {
        let (d, mgr) = manager();
        let root = mgr.create("t1", "s1").unwrap();
        let outside = d.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        assert_matches!(
            resolve(&root, "link/secret.txt"),
            Err(SandboxError::PathEscape { .. })
        );
    }

    #[cfg(unix)]
    #[test]
    fn resolve_symlink_inside_ok() {
        let (_d, mgr) = manager();
        let root = mgr.create("t1", "s1").unwrap();
        std::os::unix::fs::symlink(root.join("artifacts"), root.join("art")).unwrap();
        let p = resolve(&root, "art/x.txt").unwrap();
        assert_eq!(p, root.join("artifacts/x.txt"));
    }

    // ── ids ─────────────────────────────────────────────────────────

    #[test]
    fn ids_must_be_single_components() {
        validate_id("tenant", "acme-1").unwrap();
        for bad in ["", ".", "..", "a/b", "a\\b", "/abs"] {
            assert_matches!(validate_id("tenant", bad), Err(SandboxError::InvalidId { .. }), "{bad}");
        }
    }

    // ── lifecycle ───────────────────────────────────────────────────

    #[test]
    fn create_is_idempotent_with_subdirs() {
        let (_d, mgr) = manager();
        let a = mgr.create("t1", "s1").unwrap();
        let b = mgr.create("t1", "s1").unwrap();
        assert_eq!(a, b);
        for sub in SUBDIRECTORIES {
            assert!(a.join(sub).is_dir());
        }
        assert!(mgr.exists("t1", "s1"));
    }

    #[cfg(unix)]
    #[test]
    fn create_sets_owner_only_mode() {
        use std::os::unix::fs::PermissionsExt;
        let (_d, mgr) = manager();
        let root = mgr.create("t1", "s1").unwrap();
        let mode = fs::metadata(&root).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn destroy_removes_and_reports() {
        let (_d, mgr) = manager();
        let root = mgr.create("t1", "s1").unwrap();
        fs::write(root.join("artifacts/a.txt"), "x").unwrap();
        assert!(mgr.destroy("t1", "s1").unwrap());
        assert!(!root.exists());
        assert!(!mgr.destroy("t1", "s1").unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn destroy_refuses_symlinked_workspace_outside_base() {
        let (d, mgr) = manager();
        let outside = d.path().join("elsewhere");
        fs::create_dir_all(&outside).unwrap();
        fs::create_dir_all(mgr.base_dir().join("t1")).unwrap();
        std::os::unix::fs::symlink(&outside, mgr.base_dir().join("t1/s1")).unwrap();

        assert_matches!(mgr.destroy("t1", "s1"), Err(SandboxError::OutsideBase { .. }));
        assert!(outside.exists());
    }

    #[test]
    fn size_sums_regular_files() {
        let (_d, mgr) = manager();
        let root = mgr.create("t1", "s1").unwrap();
        fs::write(root.join("a.txt"), vec![0u8; 100]).unwrap();
        fs::write(root.join("artifacts/b.txt"), vec![0u8; 50]).unwrap();
        assert_eq!(mgr.size("t1", "s1").unwrap(), 150);
        assert_eq!(mgr.size("t1", "missing").unwrap(), 0);

        let other = mgr.create("t1", "s2").unwrap();
        fs::write(other.join("c.txt"), vec![0u8; 25]).unwrap();
        assert_eq!(mgr.tenant_size("t1").unwrap(), 175);
        assert_eq!(mgr.tenant_size("t2").unwrap(), 0);
    }

    #[test]
    fn list_sessions_sorted() {
        let (_d, mgr) = manager();
        assert!(mgr.list_sessions("t1").unwrap().is_empty());
        let _ = mgr.create("t1", "b").unwrap();
        let _ = mgr.create("t1", "a").unwrap();
        assert_eq!(mgr.list_sessions("t1").unwrap(), vec!["a", "b"]);
    }
}
