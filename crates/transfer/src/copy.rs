//! Bounded copy from the range reader into a sink

use sluice_errors::Error;
use sluice_net::RangeRetryReader;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Copy the reader's range into `writer` through one fixed-size buffer
///
/// At most one buffer of data is in flight; a writer that stops accepting
/// bytes stalls the reader with it. Returns the number of bytes copied.
///
/// # Errors
///
/// Propagates reader errors as-is, wraps writer failures as I/O errors and
/// returns `Error::Cancelled` when `cancel` fires mid-write.
pub async fn copy_range<W>(
    reader: &mut RangeRetryReader,
    writer: &mut W,
    buffer_size: usize,
    cancel: &CancellationToken,
) -> Result<u64, Error>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut copied = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            written = writer.write_all(&buf[..n]) => written?,
        }
        copied += n as u64;
    }

    writer.flush().await?;
    Ok(copied)
}
