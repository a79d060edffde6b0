use std::{
	ffi::OsString,
	path::{Path, PathBuf},
};

use tokio::{fs, io::AsyncWriteExt};
use tracing::trace;

use crate::error::FileIOError;

/// Reads the whole file, returning `None` if it doesn't exist yet
pub async fn read_if_exists(path: impl AsRef<Path>) -> Result<Option<Vec<u8>>, FileIOError> {
	let path = path.as_ref();

	match fs::read(path).await {
		Ok(bytes) => Ok(Some(bytes)),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(FileIOError::from((path, e, "failed to read file"))),
	}
}

/// Replaces the contents of `path` with `bytes` without ever exposing a partially written file.
///
/// The data goes to a sibling temporary file which is synced to disk and then renamed over the
/// destination, so an interruption leaves either the old or the new contents in place.
pub async fn write_atomic(path: impl AsRef<Path>, bytes: &[u8]) -> Result<(), FileIOError> {
	let path = path.as_ref();

	if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
		fs::create_dir_all(parent)
			.await
			.map_err(|e| FileIOError::from((parent, e, "failed to create parent directory")))?;
	}

	let tmp_path = temp_sibling(path);

	let mut file = fs::File::create(&tmp_path)
		.await
		.map_err(|e| FileIOError::from((tmp_path.as_path(), e, "failed to create temp file")))?;

	file.write_all(bytes)
		.await
		.map_err(|e| FileIOError::from((tmp_path.as_path(), e, "failed to write temp file")))?;

	file.sync_all()
		.await
		.map_err(|e| FileIOError::from((tmp_path.as_path(), e, "failed to sync temp file")))?;

	drop(file);

	fs::rename(&tmp_path, path)
		.await
		.map_err(|e| FileIOError::from((path, e, "failed to move temp file into place")))?;

	trace!(path = %path.display(), bytes = bytes.len(), "Atomically wrote file");

	Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
	let mut name = path
		.file_name()
		.map_or_else(|| OsString::from("unnamed"), ToOwned::to_owned);
	name.push(".tmp");
	path.with_file_name(name)
}
