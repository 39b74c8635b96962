//! Ownership and permission helpers shared by the filesystem-backed
//! resources.

use std::path::Path;

use crate::error::{EngineError, EngineResult};
use crate::exec::Executor;

/// Parse an octal permission string such as `"0755"` or `"600"`.
///
/// # Errors
///
/// Returns an error when the string is not valid octal or exceeds `0o7777`.
pub fn parse_octal_mode(mode: &str) -> EngineResult<u32> {
    let parsed = u32::from_str_radix(mode, 8)
        .map_err(|_| EngineError::Other(anyhow::anyhow!("invalid octal mode: {mode}")))?;
    if parsed > 0o7777 {
        return Err(EngineError::Other(anyhow::anyhow!(
            "mode out of range: {mode}"
        )));
    }
    Ok(parsed)
}

/// Permission bits (`0o7777` mask) of the file at `path`, or `None` when it
/// does not exist.
///
/// # Errors
///
/// Returns an error when the path exists but its metadata cannot be read.
pub fn file_mode(path: &Path) -> EngineResult<Option<u32>> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::symlink_metadata(path) {
            Ok(meta) => Ok(Some(meta.permissions().mode() & 0o7777)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::from_io(&e, &format!("stat {}", path.display()))),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(None)
    }
}

/// Set the permission bits of `path`.
///
/// # Errors
///
/// Returns an error when the permissions cannot be changed.
pub fn set_mode(path: &Path, mode: u32) -> EngineResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .map_err(|e| EngineError::from_io(&e, &format!("chmod {}", path.display())))
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
        Ok(())
    }
}

/// Numeric uid and gid owning `path`, or `None` when it does not exist.
///
/// # Errors
///
/// Returns an error when the path exists but its metadata cannot be read.
pub fn file_owner(path: &Path) -> EngineResult<Option<(u32, u32)>> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        match std::fs::symlink_metadata(path) {
            Ok(meta) => Ok(Some((meta.uid(), meta.gid()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::from_io(&e, &format!("stat {}", path.display()))),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(None)
    }
}

/// Resolve a user name to its uid via the user database.
///
/// # Errors
///
/// Returns [`EngineError::ResourceUnavailable`] when the user does not
/// exist or the database cannot be queried.
pub fn lookup_uid(executor: &dyn Executor, user: &str) -> EngineResult<u32> {
    lookup_id(executor, "passwd", user)
}

/// Resolve a group name to its gid via the group database.
///
/// # Errors
///
/// Returns [`EngineError::ResourceUnavailable`] when the group does not
/// exist or the database cannot be queried.
pub fn lookup_gid(executor: &dyn Executor, group: &str) -> EngineResult<u32> {
    lookup_id(executor, "group", group)
}

fn lookup_id(executor: &dyn Executor, database: &str, name: &str) -> EngineResult<u32> {
    let result = executor
        .run_unchecked("getent", &[database, name])
        .map_err(EngineError::Other)?;
    if !result.success {
        return Err(EngineError::ResourceUnavailable(format!(
            "{database} entry '{name}' not found"
        )));
    }
    // getent output: name:x:uid:gid:...
    result
        .stdout
        .trim()
        .split(':')
        .nth(2)
        .and_then(|field| field.parse().ok())
        .ok_or_else(|| {
            EngineError::Other(anyhow::anyhow!(
                "unparseable getent {database} output for '{name}'"
            ))
        })
}

/// Change ownership of `path` to `owner`/`group` (either may be absent).
///
/// Shells out to `chown` so name resolution and privilege handling follow
/// the host's own tooling.
///
/// # Errors
///
/// Returns a classified error when `chown` fails.
pub fn chown(
    executor: &dyn Executor,
    path: &Path,
    owner: Option<&str>,
    group: Option<&str>,
) -> EngineResult<()> {
    let spec = match (owner, group) {
        (Some(o), Some(g)) => format!("{o}:{g}"),
        (Some(o), None) => o.to_string(),
        (None, Some(g)) => format!(":{g}"),
        (None, None) => return Ok(()),
    };
    let path_str = path.display().to_string();
    let result = executor
        .run_unchecked("chown", &[&spec, &path_str])
        .map_err(EngineError::Other)?;
    if result.success {
        Ok(())
    } else {
        Err(EngineError::from_command(
            &format!("chown {spec} {path_str}"),
            &result.stderr,
        ))
    }
}

/// Write `bytes` to `path` atomically with the given permission bits.
///
/// The content lands in a same-directory temporary file that is created with
/// the final mode before any bytes are written, then renamed over the
/// destination. A crash never leaves a partially written or world-readable
/// artifact at the final path.
///
/// # Errors
///
/// Returns an error when the temporary file cannot be created, written, or
/// renamed.
pub fn atomic_write(path: &Path, bytes: &[u8], mode: u32) -> EngineResult<()> {
    use std::io::Write as _;

    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".converge-tmp");
    let tmp = std::path::PathBuf::from(tmp);

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let result = options
        .open(&tmp)
        .and_then(|mut f| f.write_all(bytes))
        .and_then(|()| {
            // The tmp file may pre-exist with wider bits from an interrupted
            // run; re-assert the mode before it becomes visible.
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(mode))?;
            }
            std::fs::rename(&tmp, path)
        });

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            Err(EngineError::from_io(
                &e,
                &format!("writing {}", path.display()),
            ))
        }
    }
}
