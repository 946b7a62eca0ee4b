use crate::common::error::{Result, TempFileCreation, WriteToTempFile};
use snafu::ResultExt;
use std::io::Write;
use tempfile::{Builder, NamedTempFile as TempFile};

/// Create a new temporary file whose name starts with the given prefix and ends with the given
/// suffix, and write the buffer into it. The file is removed when the returned handle is dropped.
pub(crate) fn write_to_tempfile(prefix: &str, suffix: &str, buf: &[u8]) -> Result<TempFile> {
    let mut handle: TempFile = Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile()
        .context(TempFileCreation)?;

    handle.write_all(buf).context(WriteToTempFile {
        filepath: handle.path().to_path_buf(),
    })?;
    handle.flush().context(WriteToTempFile {
        filepath: handle.path().to_path_buf(),
    })?;

    Ok(handle)
}
