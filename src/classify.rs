//! Error classification.
//!
//! Every backend failure is folded into one of four classes here. Call sites
//! only ever ask whether an error is [`ErrorClass::NotFound`] (or, for link
//! lookups, [`ErrorClass::BadReference`]); the status codes and io error kinds
//! of the individual backends are never inspected anywhere else.

use std::io::ErrorKind;

use russh_sftp::client::error::Error as SftpError;
use russh_sftp::protocol::StatusCode;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The remote path does not exist.
    NotFound,
    /// The operation was attempted on a malformed reference, e.g. reading the
    /// target of something that is not a link.
    BadReference,
    /// The session or channel failed; the outcome of the call is unknown.
    Transport,
    Generic,
}

pub fn classify(err: &AppError) -> ErrorClass {
    match err {
        AppError::NotFound(_) => ErrorClass::NotFound,
        AppError::BadReference(_) => ErrorClass::BadReference,
        AppError::NotConnected | AppError::SshConnectionError(_) | AppError::RusshError(_) => {
            ErrorClass::Transport
        }
        AppError::IOError(e) => classify_io(e.kind()),
        AppError::RusshSftpError(e) => classify_sftp(e),
        _ => ErrorClass::Generic,
    }
}

fn classify_sftp(err: &SftpError) -> ErrorClass {
    match err {
        SftpError::Status(status) => match status.status_code {
            StatusCode::NoSuchFile => ErrorClass::NotFound,
            StatusCode::NoConnection | StatusCode::ConnectionLost | StatusCode::BadMessage => {
                ErrorClass::Transport
            }
            _ => ErrorClass::Generic,
        },
        SftpError::Timeout | SftpError::IO(_) | SftpError::UnexpectedPacket => {
            ErrorClass::Transport
        }
        _ => ErrorClass::Generic,
    }
}

fn classify_io(kind: ErrorKind) -> ErrorClass {
    match kind {
        ErrorKind::NotFound => ErrorClass::NotFound,
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected
        | ErrorKind::BrokenPipe
        | ErrorKind::TimedOut
        | ErrorKind::UnexpectedEof => ErrorClass::Transport,
        _ => ErrorClass::Generic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh_sftp::protocol::Status;

    fn status(code: StatusCode) -> AppError {
        AppError::RusshSftpError(SftpError::Status(Status {
            id: 1,
            status_code: code,
            error_message: String::new(),
            language_tag: "en-US".to_string(),
        }))
    }

    #[test]
    fn test_sftp_status_codes() {
        assert_eq!(classify(&status(StatusCode::NoSuchFile)), ErrorClass::NotFound);
        assert_eq!(classify(&status(StatusCode::BadMessage)), ErrorClass::Transport);
        assert_eq!(classify(&status(StatusCode::ConnectionLost)), ErrorClass::Transport);
        assert_eq!(classify(&status(StatusCode::NoConnection)), ErrorClass::Transport);
        assert_eq!(classify(&status(StatusCode::Failure)), ErrorClass::Generic);
        assert_eq!(classify(&status(StatusCode::PermissionDenied)), ErrorClass::Generic);
    }

    #[test]
    fn test_sftp_channel_failures_are_transport() {
        let err = AppError::RusshSftpError(SftpError::Timeout);
        assert_eq!(err.class(), ErrorClass::Transport);
        let err = AppError::RusshSftpError(SftpError::IO("channel closed".to_string()));
        assert_eq!(err.class(), ErrorClass::Transport);
    }

    #[test]
    fn test_io_kinds() {
        let err = AppError::from(std::io::Error::from(ErrorKind::NotFound));
        assert!(err.is_not_found());
        let err = AppError::from(std::io::Error::from(ErrorKind::BrokenPipe));
        assert_eq!(err.class(), ErrorClass::Transport);
        let err = AppError::from(std::io::Error::from(ErrorKind::PermissionDenied));
        assert_eq!(err.class(), ErrorClass::Generic);
    }

    #[test]
    fn test_crate_variants() {
        assert!(AppError::NotFound("/x".to_string()).is_not_found());
        assert_eq!(
            AppError::BadReference("/x".to_string()).class(),
            ErrorClass::BadReference
        );
        assert_eq!(AppError::NotConnected.class(), ErrorClass::Transport);
        assert_eq!(
            AppError::AlreadyExists("/x".to_string()).class(),
            ErrorClass::Generic
        );
        assert_eq!(
            AppError::IsADirectory("/x".to_string()).class(),
            ErrorClass::Generic
        );
    }
}
