//! Sign-in delegation
//!
//! Handles:
//! - Calling the session authority's social sign-in endpoint
//! - Resolving the caller's callback URL
//! - Rewriting authority cookies for cross-origin delivery

mod authority;
mod callback;
mod cookie;
mod initiate;

pub use authority::{AuthorityClient, AuthorityResponse, SocialSignInRequest};
pub use callback::{OAUTH_INIT_FAILED, error_location, resolve_callback_url};
pub use cookie::{RewrittenCookie, rewrite_for_cross_origin};
pub use initiate::{
    CallerContext, InitiationOutcome, InitiationParams, InitiationRequest, Initiator,
};
