//! Chunked streaming between remote handles and local streams.
//!
//! The engine never holds a whole object in memory: bytes move through one
//! reusable buffer of `buffer_size` bytes per call.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::error::Result;

/// Default transfer chunk size: 16 KiB.
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

/// How a remote write stream is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDisposition {
    /// Create the file, truncating any existing content.
    Overwrite,
    /// Open without truncation and start writing at the given offset.
    Resume(u64),
    /// Open positioned at the current end of file.
    Append,
}

/// Byte-level progress update, sent after every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub transferred_bytes: u64,
    pub total_bytes: Option<u64>,
}

/// Parameters of a single download.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Bytes to skip at the start of the remote object.
    pub skip: u64,
    /// Maximum number of bytes to move, `None` for everything up to EOF.
    pub max_length: Option<u64>,
    pub buffer_size: usize,
    /// Shut down the destination once the transfer finishes.
    pub close_on_completion: bool,
    pub progress: Option<UnboundedSender<TransferProgress>>,
}

impl Default for TransferRequest {
    fn default() -> Self {
        Self {
            skip: 0,
            max_length: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            close_on_completion: false,
            progress: None,
        }
    }
}

impl TransferRequest {
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn max_length(mut self, max_length: u64) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    pub fn close_on_completion(mut self, close: bool) -> Self {
        self.close_on_completion = close;
        self
    }

    pub fn progress(mut self, sender: UnboundedSender<TransferProgress>) -> Self {
        self.progress = Some(sender);
        self
    }
}

/// Chunk layout for a bounded read: `full_chunks` reads of `buffer_size`
/// bytes followed by one read of `remainder` bytes when it is non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub full_chunks: u64,
    pub remainder: usize,
    pub buffer_size: usize,
}

impl ChunkPlan {
    pub fn new(max_length: u64, buffer_size: usize) -> Self {
        let buffer_size = buffer_size.max(1);
        let size = buffer_size as u64;
        Self {
            full_chunks: max_length / size,
            remainder: (max_length % size) as usize,
            buffer_size,
        }
    }

    /// Sizes of the individual reads, in order.
    pub fn chunks(&self) -> impl Iterator<Item = usize> + use<> {
        let tail = (self.remainder > 0).then_some(self.remainder);
        std::iter::repeat_n(self.buffer_size, self.full_chunks as usize).chain(tail)
    }
}

fn report(
    progress: Option<&UnboundedSender<TransferProgress>>,
    transferred: u64,
    total: Option<u64>,
) {
    if let Some(tx) = progress {
        // A dropped receiver only means nobody is watching any more
        let _ = tx.send(TransferProgress {
            transferred_bytes: transferred,
            total_bytes: total,
        });
    }
}

/// Fill `buf` from `reader`, stopping early only at end of data.
async fn read_chunk<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Move bytes from `reader` to `writer` and flush the writer.
///
/// With `max_length` set, exactly that many bytes are moved unless the
/// reader hits end of data first; the returned count is what was actually
/// written in either case. Neither side is closed here.
pub async fn copy_chunked<R, W>(
    reader: &mut R,
    writer: &mut W,
    max_length: Option<u64>,
    buffer_size: usize,
    progress: Option<&UnboundedSender<TransferProgress>>,
) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut total = 0u64;

    match max_length {
        None => loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).await?;
            total += n as u64;
            report(progress, total, None);
        },
        Some(len) => {
            for chunk in ChunkPlan::new(len, buf.len()).chunks() {
                let n = read_chunk(reader, &mut buf[..chunk]).await?;
                if n > 0 {
                    writer.write_all(&buf[..n]).await?;
                    total += n as u64;
                    report(progress, total, Some(len));
                }
                if n < chunk {
                    debug!("end of data after {} of {} bytes", total, len);
                    break;
                }
            }
        }
    }

    writer.flush().await?;
    Ok(total)
}

/// Download direction: drain `reader` (already positioned at the requested
/// offset) into `writer`.
///
/// The reader is consumed and released when this returns, whatever the
/// outcome. The writer is shut down only when the request asks for it.
pub async fn download<R, W>(reader: R, writer: &mut W, request: &TransferRequest) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut reader = reader;
    let copied = copy_chunked(
        &mut reader,
        writer,
        request.max_length,
        request.buffer_size,
        request.progress.as_ref(),
    )
    .await;
    drop(reader);

    if request.close_on_completion {
        let closed = writer.shutdown().await;
        let n = copied?;
        closed?;
        return Ok(n);
    }
    copied
}

/// Upload direction: drain `reader` into the remote `writer`, then flush and
/// release the remote handle. The handle is shut down even when the copy
/// fails; the copy error takes precedence.
pub async fn upload<R, W>(
    reader: &mut R,
    writer: W,
    buffer_size: usize,
    progress: Option<&UnboundedSender<TransferProgress>>,
) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin,
{
    let mut writer = writer;
    let copied = copy_chunked(reader, &mut writer, None, buffer_size, progress).await;
    let closed = writer.shutdown().await;
    let n = copied?;
    closed?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    fn payload(len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut data);
        data
    }

    #[test]
    fn test_chunk_plan() {
        let plan = ChunkPlan::new(10, 4);
        assert_eq!(plan.chunks().collect::<Vec<_>>(), vec![4, 4, 2]);

        let plan = ChunkPlan::new(8, 4);
        assert_eq!(plan.chunks().collect::<Vec<_>>(), vec![4, 4]);

        let plan = ChunkPlan::new(3, 4);
        assert_eq!(plan.chunks().collect::<Vec<_>>(), vec![3]);

        assert_eq!(ChunkPlan::new(0, 4).chunks().count(), 0);
    }

    #[tokio::test]
    async fn test_copy_unbounded_any_buffer_size() {
        let data = payload(10_000);
        for size in [1, 7, 512, 4096, 20_000] {
            let mut out = Vec::new();
            let n = copy_chunked(&mut data.as_slice(), &mut out, None, size, None)
                .await
                .unwrap();
            assert_eq!(n, data.len() as u64);
            assert_eq!(out, data);
        }
    }

    #[tokio::test]
    async fn test_copy_bounded() {
        let data = payload(1000);
        let mut out = Vec::new();
        let n = copy_chunked(&mut data.as_slice(), &mut out, Some(300), 128, None)
            .await
            .unwrap();
        assert_eq!(n, 300);
        assert_eq!(out, &data[..300]);
    }

    #[tokio::test]
    async fn test_copy_bounded_past_end_stops_at_eof() {
        let data = payload(100);
        let mut out = Vec::new();
        let n = copy_chunked(&mut data.as_slice(), &mut out, Some(1000), 64, None)
            .await
            .unwrap();
        assert_eq!(n, 100);
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_short_reads_still_fill_chunks() {
        // Reader that hands out at most 3 bytes per call
        let data = payload(50);
        let mut reader = tokio_test_reader(&data, 3);
        let mut out = Vec::new();
        let n = copy_chunked(&mut reader, &mut out, Some(40), 16, None)
            .await
            .unwrap();
        assert_eq!(n, 40);
        assert_eq!(out, &data[..40]);
    }

    fn tokio_test_reader(data: &[u8], step: usize) -> impl AsyncRead + Unpin + use<> {
        let (mut tx, rx) = tokio::io::duplex(step);
        let data = data.to_vec();
        tokio::spawn(async move {
            for piece in data.chunks(step) {
                if tx.write_all(piece).await.is_err() {
                    break;
                }
            }
        });
        rx
    }

    #[tokio::test]
    async fn test_progress_reports() {
        let data = payload(10);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut out = Vec::new();
        copy_chunked(&mut data.as_slice(), &mut out, Some(10), 4, Some(&tx))
            .await
            .unwrap();
        drop(tx);

        let mut seen = Vec::new();
        while let Some(p) = rx.recv().await {
            seen.push(p.transferred_bytes);
            assert_eq!(p.total_bytes, Some(10));
        }
        assert_eq!(seen, vec![4, 8, 10]);
    }

    #[tokio::test]
    async fn test_download_honours_close_flag() {
        let data = payload(32);
        let (mut client, mut server) = tokio::io::duplex(64);

        let request = TransferRequest::default().close_on_completion(true);
        let n = download(data.as_slice(), &mut client, &request).await.unwrap();
        assert_eq!(n, 32);

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, data);
    }

    #[tokio::test]
    async fn test_download_leaves_writer_open_by_default() {
        let data = payload(32);
        let (mut client, mut server) = tokio::io::duplex(64);

        let request = TransferRequest::default();
        assert!(!request.close_on_completion);
        let n = download(data.as_slice(), &mut client, &request).await.unwrap();
        assert_eq!(n, 32);

        // The caller still owns the writer and can keep using it
        client.write_all(b"more").await.unwrap();
        client.shutdown().await.unwrap();

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(&received[..32], data.as_slice());
        assert_eq!(&received[32..], b"more");
    }
}
