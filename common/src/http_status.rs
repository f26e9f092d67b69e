//! HTTP-style status codes as they appear on the messaging wire and in the
//! deployment token API.

/// A numeric status from an HTTP response or a wire envelope `code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HttpStatusCode(pub u16);

impl HttpStatusCode {
    pub const UNAUTHORIZED: HttpStatusCode = HttpStatusCode(401);
    pub const FORBIDDEN: HttpStatusCode = HttpStatusCode(403);

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.0)
    }

    /// 4xx; the request itself is wrong and retrying it unchanged won't help.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.0)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.0)
    }

    /// Any code from 400 up. Backend error codes are four-digit (4000-6002)
    /// and fall outside the 4xx/5xx ranges.
    pub fn is_error(&self) -> bool {
        self.0 >= 400
    }

    /// The credential was rejected or has expired.
    pub fn is_unauthorized(&self) -> bool {
        self.0 == Self::UNAUTHORIZED.0
    }
}

impl From<u16> for HttpStatusCode {
    fn from(code: u16) -> Self {
        HttpStatusCode(code)
    }
}

impl std::fmt::Display for HttpStatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
