pub mod error;
pub mod jwt;
pub mod middleware;
pub mod session;

pub use error::AuthError;
pub use jwt::{Claims, JwtSessionVerifier};
pub use middleware::{bearer_token, session_middleware};
pub use session::{Principal, SessionVerifier};
