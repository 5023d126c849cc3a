use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid seat layout: {0}")]
    InvalidSeatLayout(String),
    #[error("booking cannot move from {from} to {to}")]
    IllegalStatusTransition { from: String, to: String },
    #[error("unknown booking status: {0}")]
    UnknownBookingStatus(String),
    #[error("unknown payment status: {0}")]
    UnknownPaymentStatus(String),
    #[error("unknown log level: {0}")]
    UnknownLogLevel(String),
    #[error("unknown otp purpose: {0}")]
    UnknownOtpPurpose(String),
    #[error("unknown auth provider: {0}")]
    UnknownAuthProvider(String),
}
