pub mod authenticator;
pub mod extractors;
pub mod middleware;
pub mod password;
pub mod store;
pub mod token;

pub use authenticator::{AuthError, Authenticator};
pub use extractors::{CurrentPrincipal, CurrentUser};
pub use middleware::{Admission, Authorize};
pub use password::{hash_password, verify_password};
pub use store::{TokenError, TokenStore};
