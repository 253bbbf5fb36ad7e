//! Error types for the session layer.

/// Errors that can occur while authenticating a session.
///
/// The first four come from the [`Authenticator`](crate::Authenticator)
/// itself. The last three describe how a login ended, and are shared by
/// the client and server so both sides report the same outcome.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No challenge has been generated or accepted yet, or the one we have
    /// is too short to be real.
    #[error("no challenge has been set")]
    NoChallenge,

    /// No secret is configured, so there is nothing to compute a response
    /// with.
    #[error("no secret has been set")]
    NoSecret,

    /// The peer sent a challenge or response that isn't valid base64.
    #[error("bad base64 encoding: {0}")]
    BadEncoding(#[from] base64::DecodeError),

    /// The system random source failed while generating a challenge.
    #[error("random source failed: {0}")]
    Entropy(String),

    /// The server sent a challenge but we have no credentials to answer it.
    #[error("server requires authentication but no credentials were supplied")]
    AuthenticationRequired,

    /// The server refused our login.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The client didn't finish logging in before the deadline.
    #[error("login timed out")]
    LoginTimeout,
}
