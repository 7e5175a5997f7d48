//! Identity verification against the external provider.
//!
//! A credential arrives as a bearer header, a session cookie, or a query
//! parameter. Verification tries a session lookup first (when the credential
//! decodes as a JWT with a session claim), then direct token verification;
//! verdicts are cached for five minutes keyed by a short credential prefix.

pub mod credential;
pub mod verifier;

pub use {
    credential::extract_credential,
    verifier::{IdentityVerifier, VerifiedIdentity, VerifyOutcome},
};
