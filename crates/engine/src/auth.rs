//! Authentication strategy lookup.

/// Authentication method a bundle source requires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMethod {
    None,
    BasicAuth,
    ApiKeyInRequest,
    ApiKeyInHeader,
    ApiKeyInCookie,
    ClientCert,
    BearerToken,
}

impl AuthMethod {
    pub fn as_u32(self) -> u32 {
        match self {
            Self::None => 0,
            Self::BasicAuth => 1,
            Self::ApiKeyInRequest => 2,
            Self::ApiKeyInHeader => 3,
            Self::ApiKeyInCookie => 4,
            Self::ClientCert => 5,
            Self::BearerToken => 6,
        }
    }
}

/// Resolve the authentication strategy for a bundle source.
///
/// The device integration supplies the real lookup; this build assumes
/// plain HTTP and the install worker refuses anything else. The other
/// methods are reserved for future extension.
pub fn authentication_method(_app_type: &str, _id: &str, _url: &str) -> AuthMethod {
    AuthMethod::None
}
