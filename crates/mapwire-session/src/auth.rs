//! Challenge/response authentication.
//!
//! The server sends a random 32-byte challenge. Both sides then compute
//! the same hash chain over the challenge and a shared secret:
//!
//! ```text
//! d₀   = SHA-256(challenge ‖ secret)
//! dₖ₊₁ = SHA-256(secret ‖ dₖ)          for k in 0..P
//! ```
//!
//! where `P` is the first two challenge bytes read as a big-endian `u16`.
//! The client sends `d_P` back (base64), the server compares it with its
//! own. The secret itself never crosses the wire.
//!
//! Challenges generated here always have `P` between 64 and 4095, which
//! keeps the work bounded. Challenges accepted from a peer are used as-is.
//!
//! The same [`Authenticator`] type serves both roles. A client sets a
//! secret and answers challenges; a server sets a player secret, an
//! optional GM secret, and checks responses. A response that matches the
//! GM secret switches the authenticator into GM mode.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::TryRngCore as _;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::SessionError;

/// Length of a generated challenge, in bytes.
pub const CHALLENGE_LEN: usize = 32;

/// Anything shorter than this isn't accepted as a challenge.
const MIN_CHALLENGE_LEN: usize = 8;

/// Holds the secrets and current challenge for one login.
///
/// Not shared between connections: each login gets its own (the server
/// clones a template per connection).
#[derive(Clone, Default)]
pub struct Authenticator {
    secret: Vec<u8>,
    gm_secret: Vec<u8>,
    challenge: Vec<u8>,
    gm_mode: bool,
    username: String,
    client_name: String,
}

impl Authenticator {
    /// Creates a client-side authenticator for `username`.
    pub fn client(username: impl Into<String>, secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            username: username.into(),
            ..Self::default()
        }
    }

    /// Creates a server-side authenticator with the shared player secret
    /// and, optionally, a GM secret.
    pub fn server(player_secret: impl AsRef<[u8]>, gm_secret: Option<&[u8]>) -> Self {
        Self {
            secret: player_secret.as_ref().to_vec(),
            gm_secret: gm_secret.map(<[u8]>::to_vec).unwrap_or_default(),
            ..Self::default()
        }
    }

    /// Replaces the secret. Also forgets any GM secret and leaves GM mode,
    /// so this is how a server narrows validation to one user's personal
    /// password.
    pub fn set_secret(&mut self, secret: impl AsRef<[u8]>) {
        self.secret = secret.as_ref().to_vec();
        self.gm_secret.clear();
        self.gm_mode = false;
    }

    /// Sets the secret whose response grants GM privileges.
    pub fn set_gm_secret(&mut self, secret: impl AsRef<[u8]>) {
        self.gm_secret = secret.as_ref().to_vec();
    }

    /// Returns `true` if a player or GM secret is configured.
    pub fn has_secret(&self) -> bool {
        !self.secret.is_empty() || !self.gm_secret.is_empty()
    }

    /// Forgets the current challenge and leaves GM mode. Secrets are kept.
    pub fn reset(&mut self) {
        self.challenge.clear();
        self.gm_mode = false;
    }

    /// Generates a fresh challenge, remembers it, and returns it base64
    /// encoded for the `OK` message.
    ///
    /// # Errors
    /// [`SessionError::Entropy`] if the OS random source fails.
    pub fn generate_challenge(&mut self) -> Result<String, SessionError> {
        let mut bytes = [0u8; CHALLENGE_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| SessionError::Entropy(e.to_string()))?;
        // Clamp the round count to 64..=4095.
        bytes[0] &= 0x0f;
        bytes[1] |= 0x40;
        self.challenge = bytes.to_vec();
        self.gm_mode = false;
        Ok(STANDARD.encode(bytes))
    }

    /// Client role: stores a base64 challenge received from the server and
    /// returns the base64 response, ready for the `AUTH` message.
    ///
    /// # Errors
    /// [`SessionError::BadEncoding`] if the challenge isn't valid base64,
    /// plus anything [`calc_response`](Self::calc_response) returns.
    pub fn accept_challenge(&mut self, encoded: &str) -> Result<String, SessionError> {
        self.store_challenge(encoded)?;
        Ok(STANDARD.encode(self.calc_response()?))
    }

    fn store_challenge(&mut self, encoded: &str) -> Result<(), SessionError> {
        self.challenge = STANDARD.decode(encoded.trim())?;
        Ok(())
    }

    /// The current challenge, base64 encoded, if there is one.
    pub fn current_challenge(&self) -> Option<String> {
        (!self.challenge.is_empty()).then(|| STANDARD.encode(&self.challenge))
    }

    /// Computes the raw response to the current challenge.
    ///
    /// # Errors
    /// [`SessionError::NoChallenge`] if the challenge is missing or shorter
    /// than 8 bytes, [`SessionError::NoSecret`] if the secret is empty.
    pub fn calc_response(&self) -> Result<[u8; 32], SessionError> {
        if self.secret.is_empty() {
            return Err(SessionError::NoSecret);
        }
        hash_chain(&self.challenge, &self.secret)
    }

    /// Checks a base64 response against the current challenge.
    ///
    /// The player secret is tried first, then the GM secret. A GM match
    /// sets [`gm_mode`](Self::gm_mode). Comparisons are constant time.
    ///
    /// # Errors
    /// [`SessionError::NoChallenge`] if no challenge was generated,
    /// [`SessionError::NoSecret`] if no player secret is set, and
    /// [`SessionError::BadEncoding`] if the response isn't base64.
    pub fn validate_response(&mut self, encoded: &str) -> Result<bool, SessionError> {
        self.gm_mode = false;
        if self.challenge.len() < MIN_CHALLENGE_LEN {
            return Err(SessionError::NoChallenge);
        }
        if self.secret.is_empty() {
            return Err(SessionError::NoSecret);
        }
        let response = STANDARD.decode(encoded.trim())?;

        let expected = hash_chain(&self.challenge, &self.secret)?;
        if bool::from(expected.as_slice().ct_eq(&response)) {
            return Ok(true);
        }
        if !self.gm_secret.is_empty() {
            let expected = hash_chain(&self.challenge, &self.gm_secret)?;
            if bool::from(expected.as_slice().ct_eq(&response)) {
                tracing::debug!(user = %self.username, "response matched GM secret");
                self.gm_mode = true;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// `true` after a response matched the GM secret.
    pub fn gm_mode(&self) -> bool {
        self.gm_mode
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = username.into();
    }

    /// Client program name reported in `AUTH`.
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn set_client_name(&mut self, name: impl Into<String>) {
        self.client_name = name.into();
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("username", &self.username)
            .field("client_name", &self.client_name)
            .field("has_secret", &!self.secret.is_empty())
            .field("has_gm_secret", &!self.gm_secret.is_empty())
            .field("has_challenge", &!self.challenge.is_empty())
            .field("gm_mode", &self.gm_mode)
            .finish()
    }
}

fn hash_chain(challenge: &[u8], secret: &[u8]) -> Result<[u8; 32], SessionError> {
    if challenge.len() < MIN_CHALLENGE_LEN {
        return Err(SessionError::NoChallenge);
    }
    let rounds = u16::from_be_bytes([challenge[0], challenge[1]]);

    let mut digest: [u8; 32] = Sha256::new()
        .chain_update(challenge)
        .chain_update(secret)
        .finalize()
        .into();
    for _ in 0..rounds {
        digest = Sha256::new()
            .chain_update(secret)
            .chain_update(digest)
            .finalize()
            .into();
    }
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Vectors computed independently with a reference SHA-256.
    const CHALLENGE_64: &str = "AEAAAQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobHB0=";
    const RESPONSE_64_SEKRIT: &str = "OqZD2CdypS61sMVSV8hgWHbP0ZDLb8qHWxbggAZhU34=";
    const RESPONSE_64_GMSECRET: &str = "9N7KNuc5Kh4zODkwzxaG/rCdL8xNlOI4lHBTc32YF+I=";
    const CHALLENGE_258: &str = "AQKqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqo=";
    const RESPONSE_258_SEKRIT: &str = "K7EL2FUpODg92tWxMvMU4m1AOkAMzAAFUq9RkpZZxG4=";
    const CHALLENGE_ZERO_ROUNDS: &str = "AAAAAAAAAAA=";
    const RESPONSE_ZERO_ROUNDS_X: &str = "sZDIQdMVwOaqHIY1e17k9nw6sfLKAbLSt15TS2LPeJ4=";

    /// A server authenticator primed with a known challenge.
    fn server_with_challenge(challenge: &str, player: &str, gm: Option<&str>) -> Authenticator {
        let mut a = Authenticator::server(player, gm.map(str::as_bytes));
        a.store_challenge(challenge).unwrap();
        a
    }

    #[test]
    fn test_calc_response_known_vectors() {
        let mut client = Authenticator::client("alice", "sekrit");
        assert_eq!(client.accept_challenge(CHALLENGE_64).unwrap(), RESPONSE_64_SEKRIT);
        assert_eq!(client.accept_challenge(CHALLENGE_258).unwrap(), RESPONSE_258_SEKRIT);

        let mut client = Authenticator::client("bob", "x");
        assert_eq!(
            client.accept_challenge(CHALLENGE_ZERO_ROUNDS).unwrap(),
            RESPONSE_ZERO_ROUNDS_X
        );
    }

    #[test]
    fn test_calc_response_without_challenge_fails() {
        let client = Authenticator::client("alice", "sekrit");
        assert!(matches!(client.calc_response(), Err(SessionError::NoChallenge)));
    }

    #[test]
    fn test_calc_response_short_challenge_fails() {
        let mut client = Authenticator::client("alice", "sekrit");
        // Seven bytes.
        let err = client.accept_challenge("AQIDBAUGBw==").unwrap_err();
        assert!(matches!(err, SessionError::NoChallenge));
    }

    #[test]
    fn test_calc_response_without_secret_fails() {
        let mut client = Authenticator::client("alice", "");
        let err = client.accept_challenge(CHALLENGE_64).unwrap_err();
        assert!(matches!(err, SessionError::NoSecret));
    }

    #[test]
    fn test_accept_challenge_rejects_bad_base64() {
        let mut client = Authenticator::client("alice", "sekrit");
        let err = client.accept_challenge("not*base64!").unwrap_err();
        assert!(matches!(err, SessionError::BadEncoding(_)));
    }

    #[test]
    fn test_generated_challenge_round_count_is_bounded() {
        let mut server = Authenticator::server("p", None);
        for _ in 0..200 {
            let encoded = server.generate_challenge().unwrap();
            let bytes = STANDARD.decode(encoded).unwrap();
            assert_eq!(bytes.len(), CHALLENGE_LEN);
            let rounds = u16::from_be_bytes([bytes[0], bytes[1]]);
            assert!((64..=4095).contains(&rounds), "rounds = {rounds}");
        }
    }

    #[test]
    fn test_successive_challenges_differ() {
        let mut server = Authenticator::server("p", None);
        let a = server.generate_challenge().unwrap();
        let b = server.generate_challenge().unwrap();
        assert_ne!(a, b);
        assert_eq!(server.current_challenge().as_deref(), Some(b.as_str()));
    }

    #[test]
    fn test_validate_player_secret() {
        let mut server = server_with_challenge(CHALLENGE_64, "sekrit", Some("gmsecret"));
        assert!(server.validate_response(RESPONSE_64_SEKRIT).unwrap());
        assert!(!server.gm_mode());
    }

    #[test]
    fn test_validate_gm_secret_sets_gm_mode() {
        let mut server = server_with_challenge(CHALLENGE_64, "sekrit", Some("gmsecret"));
        assert!(server.validate_response(RESPONSE_64_GMSECRET).unwrap());
        assert!(server.gm_mode());
    }

    #[test]
    fn test_validate_wrong_response_rejected() {
        let mut server = server_with_challenge(CHALLENGE_64, "other", Some("also-other"));
        assert!(!server.validate_response(RESPONSE_64_SEKRIT).unwrap());
        assert!(!server.gm_mode());
    }

    #[test]
    fn test_validate_truncated_response_rejected() {
        let mut server = server_with_challenge(CHALLENGE_64, "sekrit", None);
        let full = STANDARD.decode(RESPONSE_64_SEKRIT).unwrap();
        let short = STANDARD.encode(&full[..16]);
        assert!(!server.validate_response(&short).unwrap());
    }

    #[test]
    fn test_validate_without_challenge_fails() {
        let mut server = Authenticator::server("sekrit", None);
        let err = server.validate_response(RESPONSE_64_SEKRIT).unwrap_err();
        assert!(matches!(err, SessionError::NoChallenge));
    }

    #[test]
    fn test_failed_validation_clears_gm_mode() {
        let mut server = server_with_challenge(CHALLENGE_64, "sekrit", Some("gmsecret"));
        assert!(server.validate_response(RESPONSE_64_GMSECRET).unwrap());
        assert!(server.gm_mode());

        server.store_challenge("AAAA").unwrap();
        let err = server.validate_response(RESPONSE_64_GMSECRET).unwrap_err();
        assert!(matches!(err, SessionError::NoChallenge));
        assert!(!server.gm_mode());
    }

    #[test]
    fn test_validate_without_player_secret_fails() {
        let mut server = server_with_challenge(CHALLENGE_64, "", Some("gmsecret"));
        let err = server.validate_response(RESPONSE_64_SEKRIT).unwrap_err();
        assert!(matches!(err, SessionError::NoSecret));
    }

    #[test]
    fn test_set_secret_drops_gm_secret() {
        let mut server = server_with_challenge(CHALLENGE_64, "sekrit", Some("gmsecret"));
        server.set_secret("sekrit");
        assert!(!server.validate_response(RESPONSE_64_GMSECRET).unwrap());
        assert!(!server.gm_mode());
        assert!(server.validate_response(RESPONSE_64_SEKRIT).unwrap());
    }

    #[test]
    fn test_reset_clears_challenge_and_gm_mode() {
        let mut server = server_with_challenge(CHALLENGE_64, "sekrit", Some("gmsecret"));
        assert!(server.validate_response(RESPONSE_64_GMSECRET).unwrap());
        server.reset();
        assert!(!server.gm_mode());
        assert!(server.current_challenge().is_none());
        assert!(server.has_secret());
    }

    #[test]
    fn test_client_and_server_agree_on_fresh_challenge() {
        let mut server = Authenticator::server("p", Some(b"g".as_slice()));
        let mut player = Authenticator::client("pat", "p");
        let mut gm = Authenticator::client("gail", "g");

        let challenge = server.generate_challenge().unwrap();
        let player_answer = player.accept_challenge(&challenge).unwrap();
        let gm_answer = gm.accept_challenge(&challenge).unwrap();

        assert!(server.validate_response(&player_answer).unwrap());
        assert!(!server.gm_mode());
        assert!(server.validate_response(&gm_answer).unwrap());
        assert!(server.gm_mode());
    }

    #[test]
    fn test_stale_response_fails_against_new_challenge() {
        let mut server = Authenticator::server("p", None);
        let mut client = Authenticator::client("pat", "p");

        let first = server.generate_challenge().unwrap();
        let stale = client.accept_challenge(&first).unwrap();
        server.reset();

        let second = server.generate_challenge().unwrap();
        assert_ne!(first, second);
        assert!(!server.validate_response(&stale).unwrap());

        let fresh = client.accept_challenge(&second).unwrap();
        assert!(server.validate_response(&fresh).unwrap());
    }

    #[test]
    fn test_debug_output_hides_secrets() {
        let a = Authenticator::client("alice", "hunter2");
        let shown = format!("{a:?}");
        assert!(shown.contains("alice"));
        assert!(!shown.contains("hunter2"));
    }
}
