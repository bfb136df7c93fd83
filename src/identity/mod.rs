//! Identity for the portal: tokens, principals, gates, login and user management.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod token;
mod resolver;
mod authorizer;
mod provider;
mod directory;

pub use principal::{Principal, Role, UserView};
pub use token::{Claims, TokenError, TokenIssuer, ValidatedToken, FALLBACK_TTL, TOKEN_TYPE};
pub use resolver::{resolve, ResolveError};
pub use authorizer::{admit_admin, admit_authenticated, bearer_token, grant_admin, AdminGrant};
pub use provider::{LocalAuthProvider, LoginRequest, LoginResponse};
pub use directory::{
    change_own_password, create_user, delete_user, list_users, update_user, ChangePasswordRequest, CreateUserRequest,
    UpdateUserRequest,
};
