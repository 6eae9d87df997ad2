//! Small I/O helpers shared by the repositories

use std::io::ErrorKind;
use std::path::Path;

use futures::Stream;
use futures::stream::BoxStream;
use tokio::fs::File;
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;

/// Open a file for reading, mapping "not found" to `None`
pub(crate) async fn open_existing(path: &Path) -> Result<Option<File>, StorageError> {
    match File::open(path).await {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<(), StorageError> {
    if cancel.is_cancelled() {
        Err(StorageError::Cancelled)
    } else {
        Ok(())
    }
}

/// Pin a fallible stream behind a `'static` box with a concrete error type
pub(crate) fn boxed<T>(
    stream: impl Stream<Item = Result<T, StorageError>> + Send + 'static,
) -> BoxStream<'static, Result<T, StorageError>> {
    Box::pin(stream)
}
