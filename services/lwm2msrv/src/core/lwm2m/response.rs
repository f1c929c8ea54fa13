//! Request-scoped read/write results

use std::fmt;

use super::node::LwM2mResource;

/// CoAP response codes used by the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Content,
    Changed,
    BadRequest,
    NotFound,
    InternalServerError,
}

impl ResponseCode {
    /// `class.detail` form, e.g. `2.05`
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseCode::Content => "2.05",
            ResponseCode::Changed => "2.04",
            ResponseCode::BadRequest => "4.00",
            ResponseCode::NotFound => "4.04",
            ResponseCode::InternalServerError => "5.00",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, ResponseCode::Content | ResponseCode::Changed)
    }

    /// Equivalent HTTP status
    pub fn http_status(self) -> u16 {
        match self {
            ResponseCode::Content | ResponseCode::Changed => 200,
            ResponseCode::BadRequest => 400,
            ResponseCode::NotFound => 404,
            ResponseCode::InternalServerError => 500,
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadResponse {
    Content(LwM2mResource),
    /// No mapping for the resource
    NotFound,
    InternalServerError(String),
}

impl ReadResponse {
    pub fn code(&self) -> ResponseCode {
        match self {
            ReadResponse::Content(_) => ResponseCode::Content,
            ReadResponse::NotFound => ResponseCode::NotFound,
            ReadResponse::InternalServerError(_) => ResponseCode::InternalServerError,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code().is_success()
    }

    pub fn content(&self) -> Option<&LwM2mResource> {
        match self {
            ReadResponse::Content(r) => Some(r),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteResponse {
    Changed,
    /// No mapping, or the register type is read-only
    NotFound,
    /// Value does not fit the register type
    BadRequest(String),
    InternalServerError(String),
}

impl WriteResponse {
    pub fn code(&self) -> ResponseCode {
        match self {
            WriteResponse::Changed => ResponseCode::Changed,
            WriteResponse::NotFound => ResponseCode::NotFound,
            WriteResponse::BadRequest(_) => ResponseCode::BadRequest,
            WriteResponse::InternalServerError(_) => ResponseCode::InternalServerError,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code().is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(ReadResponse::NotFound.code().as_str(), "4.04");
        assert_eq!(
            ReadResponse::InternalServerError("timeout".into()).code(),
            ResponseCode::InternalServerError
        );
        assert_eq!(WriteResponse::Changed.code().to_string(), "2.04");
        assert_eq!(WriteResponse::BadRequest("x".into()).code().http_status(), 400);
        assert!(WriteResponse::Changed.is_success());
        assert!(!WriteResponse::NotFound.is_success());
    }
}
