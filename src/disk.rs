//! Filesystem helpers shared by the database, topics and content store.
//!
//! Modes are applied on Unix only.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, TrangerError};

/// Create a directory (and parents) with the given mode.
///
/// Failure is critical: nothing can be stored without the directory.
pub fn create_dir(path: &Path, xpermission: u32) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(xpermission);
    }
    #[cfg(not(unix))]
    let _ = xpermission;
    builder.create(path).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "cannot create directory");
        TrangerError::storage(path, e)
    })
}

/// Open options for a file that may be created with the given mode
pub fn writable_options(rpermission: u32) -> OpenOptions {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(rpermission);
    }
    #[cfg(not(unix))]
    let _ = rpermission;
    options
}

/// Write a value as pretty JSON, replacing the file
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T, rpermission: u32) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    let mut file: File = writable_options(rpermission).truncate(true).open(path)?;
    file.write_all(&data)?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    Ok(())
}

/// Read a JSON file
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

/// `EMFILE`: the process hit its file descriptor limit
pub fn is_too_many_open_files(err: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(24)
    }
    #[cfg(not(unix))]
    {
        let _ = err;
        false
    }
}
