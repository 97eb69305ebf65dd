//! Sign-in, sessions and authorization.
//! Keep the public surface thin and split implementation across sub-modules.

mod authorizer;
mod request_context;
mod session;
mod verifier;

pub use authorizer::{can_act_as, require_admin, require_editable, require_student_access, role_of, Role};
pub use request_context::RequestContext;
pub use session::{SessionRegistry, SessionToken};
pub use verifier::{
    check_token_info, GoogleTokenVerifier, IdentityVerifier, StaticIdentityVerifier, TokenInfo, VerifiedIdentity,
    VerifyError,
};
