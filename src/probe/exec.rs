use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStringExt;
use std::path::PathBuf;
use tracing::info;

use crate::error::ProbeError;

/// Overrides the binary path used for re-execution. Taken verbatim when non-empty.
pub const EXEC_PATH_ENV: &str = "BOLTD_EXEC_PATH";

/// Returned when the running binary can't be located.
pub const BAD_EXEC_PATH: &str = "bad-exec-path";

const DELETED_SUFFIX: &str = " (deleted)";

/// Path of the daemon binary.
pub fn get_exec_path() -> String {
    exec_path_from(std::env::var_os(EXEC_PATH_ENV), || {
        std::fs::read_link("/proc/self/exe")
    })
}

/// Resolve the exec path from an override and a reader of the running binary's link.
///
/// The link of a binary replaced on disk since startup ends in " (deleted)"; that marker
/// is stripped.
pub fn exec_path_from(
    env_override: Option<OsString>,
    self_exe: impl FnOnce() -> std::io::Result<PathBuf>,
) -> String {
    if let Some(path) = env_override.filter(|path| !path.is_empty()) {
        return path.to_string_lossy().into_owned();
    }

    let path = self_exe()
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_else(|_| BAD_EXEC_PATH.to_string());
    match path.strip_suffix(DELETED_SUFFIX) {
        Some(stripped) => stripped.to_string(),
        None => path,
    }
}

/// Replace the running daemon with a fresh copy of its binary, keeping the original
/// arguments and environment.
///
/// Only returns on failure, in which case the current process is untouched.
pub fn replace_daemon() -> Result<(), ProbeError> {
    let path = get_exec_path();
    let program = CString::new(path.clone())?;
    let args = std::env::args_os()
        .map(|arg| CString::new(arg.into_vec()))
        .collect::<Result<Vec<_>, _>>()?;
    let env = std::env::vars_os()
        .map(|(key, value)| {
            let mut pair = key.into_vec();
            pair.push(b'=');
            pair.extend(value.into_vec());
            CString::new(pair)
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!("Re-executing daemon from {}", path);
    let err = match nix::unistd::execve(&program, &args, &env) {
        Ok(never) => match never {},
        Err(err) => err,
    };
    Err(ProbeError::Exec { path, source: err })
}
