//! Error types for the binary runtime.

use thiserror::Error;

use recode_proxy::ProxyError;

use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}
