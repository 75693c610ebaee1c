// Consistent exit codes for the strata CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error, or an operation refused before any call
//   11 = authentication error
//   12 = conflict with the server's tree
//   13 = network error
//   14 = path, layer or document not found

use std::process;

use strata_client::{ClientError, ErrorKind};

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    Auth = 11,
    Conflict = 12,
    Network = 13,
    NotFound = 14,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(client_err) = cause.downcast_ref::<ClientError>() {
                return Self::from_kind(client_err.kind());
            }
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
                return match io_err.kind() {
                    std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::TimedOut => {
                        Self::Network
                    }
                    _ => Self::Error,
                };
            }
        }

        // Errors raised by the CLI itself before any client call.
        let msg = format!("{err:#}");
        if msg.contains("unauthorized") || msg.contains("STRATA_TOKEN") {
            return Self::Auth;
        }

        Self::Error
    }

    pub fn from_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::Conflict => Self::Conflict,
            ErrorKind::InvalidOperation => Self::Usage,
            ErrorKind::Network => Self::Network,
            ErrorKind::Unauthorized => Self::Auth,
            ErrorKind::Remote | ErrorKind::Decode => Self::Error,
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}
