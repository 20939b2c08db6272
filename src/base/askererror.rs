use crate::base::context::Diagnostics;
use crate::socket::transport::TransportError;
use std::io;
use thiserror::Error;

/// Boxed error returned by user supplied hooks such as body encoders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Numeric identifiers of the error taxonomy.
///
/// Codes are stable and exported so callers can match on them without
/// caring about the payload carried by [`AskerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    QueueTimeout,
    SocketTimeout,
    UnexpectedStatusCode,
    HttpClientRequestError,
    RequestAlreadyRunning,
    RetriesLimitExceeded,
    GunzipError,
    AgentNameAlreadyInUse,
    BodyEncoderNotExist,
    UnexpectedBodyType,
    UnexpectedEncoderError,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 11] = [
        ErrorCode::QueueTimeout,
        ErrorCode::SocketTimeout,
        ErrorCode::UnexpectedStatusCode,
        ErrorCode::HttpClientRequestError,
        ErrorCode::RequestAlreadyRunning,
        ErrorCode::RetriesLimitExceeded,
        ErrorCode::GunzipError,
        ErrorCode::AgentNameAlreadyInUse,
        ErrorCode::BodyEncoderNotExist,
        ErrorCode::UnexpectedBodyType,
        ErrorCode::UnexpectedEncoderError,
    ];

    pub fn as_u16(&self) -> u16 {
        match self {
            ErrorCode::QueueTimeout => 902,
            ErrorCode::SocketTimeout => 903,
            ErrorCode::UnexpectedStatusCode => 904,
            ErrorCode::HttpClientRequestError => 905,
            ErrorCode::RequestAlreadyRunning => 906,
            ErrorCode::RetriesLimitExceeded => 907,
            ErrorCode::GunzipError => 908,
            ErrorCode::AgentNameAlreadyInUse => 909,
            ErrorCode::BodyEncoderNotExist => 910,
            ErrorCode::UnexpectedBodyType => 911,
            ErrorCode::UnexpectedEncoderError => 912,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::QueueTimeout => "QUEUE_TIMEOUT",
            ErrorCode::SocketTimeout => "SOCKET_TIMEOUT",
            ErrorCode::UnexpectedStatusCode => "UNEXPECTED_STATUS_CODE",
            ErrorCode::HttpClientRequestError => "HTTP_CLIENT_REQUEST_ERROR",
            ErrorCode::RequestAlreadyRunning => "REQUEST_ALREADY_RUNNING",
            ErrorCode::RetriesLimitExceeded => "RETRIES_LIMIT_EXCEEDED",
            ErrorCode::GunzipError => "GUNZIP_ERROR",
            ErrorCode::AgentNameAlreadyInUse => "AGENT_NAME_ALREADY_IN_USE",
            ErrorCode::BodyEncoderNotExist => "BODY_ENCODER_NOT_EXIST",
            ErrorCode::UnexpectedBodyType => "UNEXPECTED_BODY_TYPE",
            ErrorCode::UnexpectedEncoderError => "UNEXPECTED_ENCODER_ERROR",
        }
    }

    pub fn from_u16(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_u16() == code)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AskerError {
    #[error("Queue timeout {context}")]
    QueueTimeout { context: Diagnostics },

    #[error("Socket timeout {context}")]
    SocketTimeout { context: Diagnostics },

    #[error("Unexpected status code {{CODE:{status_code}}} in the response for request {context}")]
    UnexpectedStatusCode {
        status_code: u16,
        context: Diagnostics,
    },

    #[error("http client request error for request {context}: {source}")]
    HttpClientRequestError {
        #[source]
        source: TransportError,
        context: Diagnostics,
    },

    #[error("Request {context} is already running")]
    RequestAlreadyRunning { context: Diagnostics },

    #[error("Retries limit {{LIMIT:{max_retries}}} exceeded for request {context}")]
    RetriesLimitExceeded {
        max_retries: u32,
        #[source]
        reason: Box<AskerError>,
        context: Diagnostics,
    },

    #[error("Response body deflating error for request {context}: {source}")]
    GunzipError {
        #[source]
        source: io::Error,
        context: Diagnostics,
    },

    #[error("Agent with name \"{agent_name}\" already in the agents pool")]
    AgentNameAlreadyInUse { agent_name: String },

    #[error("Body encoder \"{encoder}\" is not defined")]
    BodyEncoderNotExist { encoder: String },

    #[error("Unexpected type \"{found}\" of the option \"body\" in the body encoder \"{encoder}\". Expected {{{expected}}}")]
    UnexpectedBodyType {
        found: &'static str,
        encoder: String,
        expected: &'static str,
    },

    #[error("Unexpected error during \"{encoder}\" body encoder execution: {source}")]
    UnexpectedEncoderError {
        encoder: String,
        #[source]
        source: BoxError,
    },
}

impl AskerError {
    pub fn queue_timeout() -> Self {
        AskerError::QueueTimeout {
            context: Diagnostics::default(),
        }
    }

    pub fn socket_timeout() -> Self {
        AskerError::SocketTimeout {
            context: Diagnostics::default(),
        }
    }

    pub fn unexpected_status(status_code: u16) -> Self {
        AskerError::UnexpectedStatusCode {
            status_code,
            context: Diagnostics::default(),
        }
    }

    pub fn client_request(source: impl Into<TransportError>) -> Self {
        AskerError::HttpClientRequestError {
            source: source.into(),
            context: Diagnostics::default(),
        }
    }

    pub fn retries_limit_exceeded(max_retries: u32, reason: AskerError) -> Self {
        AskerError::RetriesLimitExceeded {
            max_retries,
            reason: Box::new(reason),
            context: Diagnostics::default(),
        }
    }

    pub fn gunzip(source: io::Error) -> Self {
        AskerError::GunzipError {
            source,
            context: Diagnostics::default(),
        }
    }

    pub fn unexpected_body_type(
        found: &'static str,
        encoder: impl Into<String>,
        expected: &'static str,
    ) -> Self {
        AskerError::UnexpectedBodyType {
            found,
            encoder: encoder.into(),
            expected,
        }
    }

    /// Turn an encoder failure into a taxonomy error.
    ///
    /// Errors that already belong to the taxonomy pass through untouched,
    /// anything else is wrapped as `UNEXPECTED_ENCODER_ERROR`.
    pub fn from_encoder_failure(encoder: &str, err: BoxError) -> Self {
        match err.downcast::<AskerError>() {
            Ok(known) => *known,
            Err(source) => AskerError::UnexpectedEncoderError {
                encoder: encoder.to_string(),
                source,
            },
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AskerError::QueueTimeout { .. } => ErrorCode::QueueTimeout,
            AskerError::SocketTimeout { .. } => ErrorCode::SocketTimeout,
            AskerError::UnexpectedStatusCode { .. } => ErrorCode::UnexpectedStatusCode,
            AskerError::HttpClientRequestError { .. } => ErrorCode::HttpClientRequestError,
            AskerError::RequestAlreadyRunning { .. } => ErrorCode::RequestAlreadyRunning,
            AskerError::RetriesLimitExceeded { .. } => ErrorCode::RetriesLimitExceeded,
            AskerError::GunzipError { .. } => ErrorCode::GunzipError,
            AskerError::AgentNameAlreadyInUse { .. } => ErrorCode::AgentNameAlreadyInUse,
            AskerError::BodyEncoderNotExist { .. } => ErrorCode::BodyEncoderNotExist,
            AskerError::UnexpectedBodyType { .. } => ErrorCode::UnexpectedBodyType,
            AskerError::UnexpectedEncoderError { .. } => ErrorCode::UnexpectedEncoderError,
        }
    }

    /// Request diagnostics attached to execution errors.
    pub fn context(&self) -> Option<&Diagnostics> {
        match self {
            AskerError::QueueTimeout { context }
            | AskerError::SocketTimeout { context }
            | AskerError::UnexpectedStatusCode { context, .. }
            | AskerError::HttpClientRequestError { context, .. }
            | AskerError::RequestAlreadyRunning { context }
            | AskerError::RetriesLimitExceeded { context, .. }
            | AskerError::GunzipError { context, .. } => Some(context),
            _ => None,
        }
    }

    fn context_mut(&mut self) -> Option<&mut Diagnostics> {
        match self {
            AskerError::QueueTimeout { context }
            | AskerError::SocketTimeout { context }
            | AskerError::UnexpectedStatusCode { context, .. }
            | AskerError::HttpClientRequestError { context, .. }
            | AskerError::RequestAlreadyRunning { context }
            | AskerError::RetriesLimitExceeded { context, .. }
            | AskerError::GunzipError { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Attach request diagnostics. The wrapped reason of a
    /// `RETRIES_LIMIT_EXCEEDED` error is bound as well.
    pub fn bind(mut self, diagnostics: &Diagnostics) -> Self {
        self.bind_in_place(diagnostics);
        self
    }

    fn bind_in_place(&mut self, diagnostics: &Diagnostics) {
        if let Some(context) = self.context_mut() {
            *context = diagnostics.clone();
        }
        if let AskerError::RetriesLimitExceeded { reason, .. } = self {
            reason.bind_in_place(diagnostics);
        }
    }

    /// The error that exhausted the retry budget.
    pub fn reason(&self) -> Option<&AskerError> {
        match self {
            AskerError::RetriesLimitExceeded { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// The HTTP status that caused the error, looking through
    /// `RETRIES_LIMIT_EXCEEDED`.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AskerError::UnexpectedStatusCode { status_code, .. } => Some(*status_code),
            AskerError::RetriesLimitExceeded { reason, .. } => reason.status_code(),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            AskerError::QueueTimeout { .. } | AskerError::SocketTimeout { .. }
        )
    }
}
