use thiserror::Error;

/// Closed set of ways a single tool invocation can fail. Every variant is
/// recovered at the tool boundary and rendered as reply text.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("could not find `{subject}`")]
    NotFound { subject: String, message: String },
    #[error("{service} responded with status {status}")]
    UpstreamFailure { service: &'static str, status: u16, message: String },
    #[error("{category} quota exhausted")]
    QuotaExceeded { category: &'static str, message: String },
    #[error("malformed expression: {detail}")]
    MalformedExpression { detail: String },
    #[error("no smart-home domain could be resolved")]
    NoDomain,
    #[error("no {domain} devices matched the request")]
    NoMatch { domain: &'static str },
    #[error("no action could be resolved for {devices} matched device(s)")]
    NoAction { devices: usize },
    #[error("{integration} is not linked")]
    Unauthenticated { integration: &'static str },
    #[error("{0}")]
    Internal(String),
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::UpstreamFailure { .. } => "upstream_failure",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::MalformedExpression { .. } => "malformed_expression",
            Self::NoDomain => "no_domain",
            Self::NoMatch { .. } => "no_match",
            Self::NoAction { .. } => "no_action",
            Self::Unauthenticated { .. } => "unauthenticated",
            Self::Internal(_) => "internal",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { message, .. }
            | Self::UpstreamFailure { message, .. }
            | Self::QuotaExceeded { message, .. } => message.clone(),
            Self::MalformedExpression { .. } => {
                "I couldn't calculate that. Please check the syntax of your expression.".to_string()
            }
            Self::NoDomain => {
                "I couldn't tell which kind of device you meant. Try mentioning a light, fan, switch, scene or script."
                    .to_string()
            }
            Self::NoMatch { domain } => {
                format!("I couldn't find a {domain} matching your request.")
            }
            Self::NoAction { .. } => {
                "I found the device but couldn't tell what to do with it. Try saying turn on or turn off."
                    .to_string()
            }
            Self::Unauthenticated { integration } => {
                format!("Please link your {integration} account first, then try again.")
            }
            Self::Internal(_) => "Sorry, there was an error handling that request.".to_string(),
        }
    }

    pub fn is_quota_refusal(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
