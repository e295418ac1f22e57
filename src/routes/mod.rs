mod health_check;
mod token;
mod user;

pub use health_check::health_check;
pub use token::{token, TokenRequest, TokenResponse};
pub use user::{get_current_user, logout};
