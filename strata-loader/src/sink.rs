use tracing::error;

use crate::LoaderError;

/// Receives every error the state machine swallows or classifies,
/// with the origin it belongs to. The production deployment plugs an
/// error-tracking service in here.
pub trait ErrorSink: Send + Sync {
    fn capture(&self, origin: &str, error: &LoaderError);
}

/// Default sink: log and move on.
#[derive(Debug, Default)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn capture(&self, origin: &str, error: &LoaderError) {
        error!(origin, %error, "loader error captured");
    }
}
