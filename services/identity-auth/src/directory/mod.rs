//! External collaborators consulted by the authorization core: users,
//! registered clients and login sessions. In-memory implementations back
//! tests and single-instance deployments.

pub mod clients;
pub mod sessions;
pub mod users;

pub use clients::{ClientRegistry, InMemoryClientRegistry, RegisteredClient};
pub use sessions::{InMemorySessionRegistry, SessionRegistry};
pub use users::{InMemoryUserDirectory, User, UserDirectory};
