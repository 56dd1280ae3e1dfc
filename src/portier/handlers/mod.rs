pub mod health;
pub use self::health::health;

pub mod auth;
pub use self::auth::{login, logout};

pub mod proxy;
pub use self::proxy::proxy;
