//! SFTP file handles using russh_sftp's built-in File type.
//!
//! Thin helpers that open `russh_sftp::client::fs::File` handles positioned
//! for each transfer direction and write disposition.

use std::io::SeekFrom;

use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use tokio::io::AsyncSeekExt;

use crate::error::Result;
use crate::transfer::WriteDisposition;

/// Re-export the built-in File type which already implements AsyncRead/AsyncWrite
pub type SftpFile = russh_sftp::client::fs::File;

/// Open an SFTP file for reading, positioned `skip` bytes in
pub async fn open_for_read(session: &SftpSession, path: &str, skip: u64) -> Result<SftpFile> {
    let mut file = session.open_with_flags(path, OpenFlags::READ).await?;
    if skip > 0 {
        file.seek(SeekFrom::Start(skip)).await?;
    }
    Ok(file)
}

/// Open an SFTP file for writing according to `disposition`
pub async fn open_for_write(
    session: &SftpSession,
    path: &str,
    disposition: WriteDisposition,
) -> Result<SftpFile> {
    match disposition {
        // Creates new file or truncates existing
        WriteDisposition::Overwrite => Ok(session
            .open_with_flags(
                path,
                OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
            )
            .await?),
        WriteDisposition::Resume(offset) => {
            let mut file = session
                .open_with_flags(path, OpenFlags::WRITE | OpenFlags::CREATE)
                .await?;
            if offset > 0 {
                file.seek(SeekFrom::Start(offset)).await?;
            }
            Ok(file)
        }
        WriteDisposition::Append => {
            let mut file = session
                .open_with_flags(
                    path,
                    OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::APPEND,
                )
                .await?;
            // Not every server honours APPEND, so position explicitly as well
            let len = file.metadata().await?.len();
            file.seek(SeekFrom::Start(len)).await?;
            Ok(file)
        }
    }
}
