use std::fmt;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed CONNECT, or a packet arriving outside the state that
    /// permits it.
    ProtocolError,
    /// An `authenticate`/`authorizePublish`/`authorizeSubscribe` hook
    /// returned an error (as opposed to a `false` verdict).
    AuthError,
    /// A hook returned a `false` verdict.
    AuthDenied,
    /// A QoS-1 packet exhausted its 10 retransmit attempts.
    DeliveryExhausted,
    /// The persistence store failed a read or a non-offline-packet write.
    PersistenceError,
    /// The keepalive watchdog fired.
    KeepaliveExpired,
    /// The bus or the listener reported a failure unrelated to a single
    /// client.
    UpstreamError,
    IoError,
    ConfigError,
    EncodeError,
    DecodeError,
    ChannelError,
    LoggerError,
}

#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, message: &str) -> Self {
        Self {
            kind,
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn from_string(kind: ErrorKind, message: String) -> Self {
        Self { kind, message }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::from_string(ErrorKind::IoError, err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::from_string(ErrorKind::ConfigError, err.to_string())
    }
}

impl From<log::SetLoggerError> for Error {
    fn from(err: log::SetLoggerError) -> Self {
        Self::from_string(ErrorKind::LoggerError, err.to_string())
    }
}

/// Generates `From<mpsc::error::SendError<$cmd_type>>` impls so `?` works
/// across every actor boundary without a manual conversion at each call
/// site.
macro_rules! convert_send_error {
    ($cmd_type:ty) => {
        impl From<tokio::sync::mpsc::error::SendError<$cmd_type>> for Error {
            fn from(err: tokio::sync::mpsc::error::SendError<$cmd_type>) -> Self {
                Self::from_string(ErrorKind::ChannelError, err.to_string())
            }
        }
    };
}

convert_send_error!(crate::commands::ListenerToDispatcherCmd);
convert_send_error!(crate::commands::DispatcherToListenerCmd);
convert_send_error!(crate::commands::ListenerToSessionCmd);
convert_send_error!(crate::commands::SessionToListenerCmd);
convert_send_error!(crate::commands::ListenerToStorageCmd);
convert_send_error!(crate::commands::StorageToListenerCmd);
convert_send_error!(crate::commands::DispatcherToStorageCmd);
convert_send_error!(crate::commands::StorageToDispatcherCmd);
