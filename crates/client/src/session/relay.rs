//! Byte relays between the local terminal and the remote streams.
//!
//! Each relay is a spawned task that moves bytes until its source ends or an
//! error occurs. Errors are not returned: the first one is recorded as the
//! session's [`RelayResult`] and becomes the final status message.

use std::sync::{Arc, OnceLock};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;

/// Buffer size for remote-to-local copies.
const OUTPUT_BUFFER_SIZE: usize = 4096;

/// Message describing how the session ended. Written at most once.
pub type RelayResult = Arc<OnceLock<String>>;

/// Records `message` unless an earlier relay already did.
pub fn record(result: &OnceLock<String>, message: String) {
    if let Err(message) = result.set(message) {
        tracing::debug!(%message, "Relay result already recorded, dropping");
    }
}

/// Copies `reader` into `writer`, flushing after every chunk so interactive
/// output is never held back.
async fn pump<R, W>(reader: &mut R, writer: &mut W, buffer_size: usize) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buffer = vec![0u8; buffer_size];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            return Ok(total);
        }
        writer.write_all(&buffer[..n]).await?;
        writer.flush().await?;
        total += n as u64;
    }
}

/// Spawns a relay copying a remote output stream to a local one.
///
/// `name` identifies the stream in logs and in the recorded message.
pub fn spawn_output_relay<R, W>(
    name: &'static str,
    mut reader: R,
    mut writer: W,
    result: RelayResult,
) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        match pump(&mut reader, &mut writer, OUTPUT_BUFFER_SIZE).await {
            Ok(bytes) => {
                tracing::debug!(stream = name, bytes, "Remote stream ended");
            }
            Err(e) => {
                tracing::warn!(stream = name, error = %e, "Output relay failed");
                record(&result, format!("{} relay failed: {}", name, e));
            }
        }
    })
}

/// Spawns the relay forwarding local input to the remote stdin.
///
/// Input is read in chunks of `buffer_size` bytes. A read or write error
/// records the relay result and stops this relay only; the session itself
/// stays up. End of local input closes the remote stdin.
pub fn spawn_input_relay<R, W>(
    mut reader: R,
    mut writer: W,
    buffer_size: usize,
    result: RelayResult,
) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut buffer = vec![0u8; buffer_size];

        loop {
            let n = match reader.read(&mut buffer).await {
                Ok(0) => {
                    tracing::debug!("Local input closed");
                    let _ = writer.shutdown().await;
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read local input");
                    record(&result, format!("failed to read local input: {}", e));
                    break;
                }
            };

            let written = async {
                writer.write_all(&buffer[..n]).await?;
                writer.flush().await
            };
            if let Err(e) = written.await {
                tracing::warn!(error = %e, "Failed to send input to remote");
                record(&result, format!("failed to send input: {}", e));
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::duplex;

    /// Reader that fails on first use.
    struct BrokenReader;

    impl AsyncRead for BrokenReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "tty vanished")))
        }
    }

    /// Writer that rejects every write.
    struct BrokenWriter;

    impl AsyncWrite for BrokenWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn test_record_keeps_first_message() {
        let result = OnceLock::new();
        record(&result, "first".to_string());
        record(&result, "second".to_string());
        assert_eq!(result.get().map(String::as_str), Some("first"));
    }

    #[tokio::test]
    async fn test_output_relay_copies_until_eof() {
        let result = RelayResult::default();
        let (mut local_out, local_in) = duplex(64);

        let handle =
            spawn_output_relay("stdout", &b"hello remote"[..], local_in, result.clone());
        handle.await.unwrap();

        let mut copied = Vec::new();
        local_out.read_to_end(&mut copied).await.unwrap();
        assert_eq!(copied, b"hello remote");
        assert!(result.get().is_none());
    }

    #[tokio::test]
    async fn test_output_relay_records_write_error() {
        let result = RelayResult::default();
        let handle = spawn_output_relay("stderr", &b"oops"[..], BrokenWriter, result.clone());
        handle.await.unwrap();

        let message = result.get().unwrap();
        assert!(message.starts_with("stderr relay failed"));
    }

    #[tokio::test]
    async fn test_input_relay_forwards_in_chunks() {
        let result = RelayResult::default();
        let (remote_side, mut remote_end) = duplex(1024);

        let handle = spawn_input_relay(&b"ls -la\r"[..], remote_side, 4, result.clone());
        handle.await.unwrap();

        let mut forwarded = Vec::new();
        remote_end.read_to_end(&mut forwarded).await.unwrap();
        assert_eq!(forwarded, b"ls -la\r");
        assert!(result.get().is_none());
    }

    #[tokio::test]
    async fn test_input_relay_records_read_error() {
        let result = RelayResult::default();
        let (remote_side, _remote_end) = duplex(64);

        spawn_input_relay(BrokenReader, remote_side, 128, result.clone())
            .await
            .unwrap();

        assert_eq!(
            result.get().map(String::as_str),
            Some("failed to read local input: tty vanished")
        );
    }

    #[tokio::test]
    async fn test_input_relay_records_write_error() {
        let result = RelayResult::default();

        spawn_input_relay(&b"exit\r"[..], BrokenWriter, 128, result.clone())
            .await
            .unwrap();

        assert_eq!(
            result.get().map(String::as_str),
            Some("failed to send input: broken pipe")
        );
    }
}
