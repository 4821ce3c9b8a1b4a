//! Streaming reads and writes of remote file content.

use std::io::SeekFrom;
use std::path::Path;

use tokio::io::{AsyncRead, AsyncSeekExt, AsyncWrite};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use super::Executor;
use crate::error::{AppError, Result};
use crate::filesystem::RemoteSession;
use crate::transfer::{self, TransferProgress, TransferRequest, WriteDisposition};

impl<S: RemoteSession> Executor<S> {
    /// A download request preset with the configured buffer size.
    pub fn transfer_request(&self) -> TransferRequest {
        TransferRequest::default().buffer_size(self.settings.buffer_size)
    }

    /// Stream the remote file at `p` into `writer`.
    pub async fn download_to<W>(
        &self,
        p: &str,
        writer: &mut W,
        request: &TransferRequest,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let target = self.resolve(p);
        let reader = self.session.open_read(&target, request.skip).await?;
        let n = transfer::download(reader, writer, request).await?;
        debug!("downloaded {} bytes from {}", n, target);
        Ok(n)
    }

    /// Download into a local file, replacing it.
    pub async fn download_file(
        &self,
        p: &str,
        local: &Path,
        request: &TransferRequest,
    ) -> Result<u64> {
        let mut file = tokio::fs::File::create(local).await.map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("Failed to create local file '{}': {e}", local.display()),
            )
        })?;
        let n = self.download_to(p, &mut file, request).await?;
        file.sync_all().await?;
        info!("downloaded {} -> {} ({} bytes)", p, local.display(), n);
        Ok(n)
    }

    /// Up to `length` bytes starting at `skip`, or everything after `skip`.
    pub async fn read_range(&self, p: &str, skip: u64, length: Option<u64>) -> Result<Vec<u8>> {
        let mut request = self.transfer_request().skip(skip);
        request.max_length = length;
        let mut out = Vec::new();
        self.download_to(p, &mut out, &request).await?;
        Ok(out)
    }

    pub async fn read_bytes(&self, p: &str) -> Result<Vec<u8>> {
        self.read_range(p, 0, None).await
    }

    pub async fn read_string(&self, p: &str) -> Result<String> {
        let bytes = self.read_bytes(p).await?;
        String::from_utf8(bytes).map_err(|e| {
            AppError::IOError(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }

    pub async fn read_lines(&self, p: &str) -> Result<Vec<String>> {
        let content = self.read_string(p).await?;
        Ok(content.lines().map(str::to_string).collect())
    }

    /// Stream `reader` into the remote file at `p`, creating missing parent
    /// directories first.
    pub async fn upload_from<R>(
        &self,
        reader: &mut R,
        p: &str,
        disposition: WriteDisposition,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        self.upload_from_with_progress(reader, p, disposition, None)
            .await
    }

    pub async fn upload_from_with_progress<R>(
        &self,
        reader: &mut R,
        p: &str,
        disposition: WriteDisposition,
        progress: Option<&UnboundedSender<TransferProgress>>,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let target = self.resolve(p);
        self.ensure_parent(&target).await?;
        self.write_stream(reader, &target, disposition, progress)
            .await
    }

    /// Open `target` and stream into it. The parent must already exist.
    pub(super) async fn write_stream<R>(
        &self,
        reader: &mut R,
        target: &str,
        disposition: WriteDisposition,
        progress: Option<&UnboundedSender<TransferProgress>>,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let writer = self.session.open_write(target, disposition).await?;
        let n = transfer::upload(reader, writer, self.settings.buffer_size, progress).await?;
        debug!("uploaded {} bytes to {} ({:?})", n, target, disposition);
        Ok(n)
    }

    pub async fn write(&self, p: &str, data: &[u8], disposition: WriteDisposition) -> Result<u64> {
        let mut reader = data;
        self.upload_from(&mut reader, p, disposition).await
    }

    /// Write each line followed by `terminator`.
    pub async fn write_lines<I, L>(
        &self,
        p: &str,
        disposition: WriteDisposition,
        lines: I,
        terminator: &str,
    ) -> Result<u64>
    where
        I: IntoIterator<Item = L>,
        L: AsRef<str>,
    {
        let mut content = String::new();
        for line in lines {
            content.push_str(line.as_ref());
            content.push_str(terminator);
        }
        self.write(p, content.as_bytes(), disposition).await
    }

    pub async fn append(&self, p: &str, data: &[u8]) -> Result<u64> {
        self.write(p, data, WriteDisposition::Append).await
    }

    pub async fn upload_file(
        &self,
        local: &Path,
        p: &str,
        disposition: WriteDisposition,
    ) -> Result<u64> {
        let mut file = open_local(local).await?;
        let n = self.upload_from(&mut file, p, disposition).await?;
        info!("uploaded {} -> {} ({} bytes)", local.display(), p, n);
        Ok(n)
    }

    /// Continue an interrupted upload: only the bytes beyond the current
    /// remote size are sent. Returns the number of bytes sent.
    pub async fn upload_resume(&self, local: &Path, p: &str) -> Result<u64> {
        let offset = self.size(p).await?.unwrap_or(0);
        let mut file = open_local(local).await?;
        let local_len = file.metadata().await?.len();
        if offset >= local_len {
            debug!("{} already holds {} of {} bytes", p, offset, local_len);
            return Ok(0);
        }

        file.seek(SeekFrom::Start(offset)).await?;
        let n = self
            .upload_from(&mut file, p, WriteDisposition::Resume(offset))
            .await?;
        info!("resumed {} at {} ({} bytes sent)", p, offset, n);
        Ok(n)
    }

    /// Copy one remote file to another remote path on the same session.
    pub async fn transfer(&self, source: &str, target: &str) -> Result<u64> {
        let source = self.resolve(source);
        let target = self.resolve(target);
        let mut reader = self.session.open_read(&source, 0).await?;
        self.ensure_parent(&target).await?;
        let n = self
            .write_stream(&mut reader, &target, WriteDisposition::Overwrite, None)
            .await?;
        info!("copied {} -> {} ({} bytes)", source, target, n);
        Ok(n)
    }
}

async fn open_local(local: &Path) -> Result<tokio::fs::File> {
    tokio::fs::File::open(local).await.map_err(|e| {
        AppError::IOError(std::io::Error::new(
            e.kind(),
            format!("Failed to open local file '{}': {e}", local.display()),
        ))
    })
}
