pub mod group;
pub mod session;
pub mod social;
pub mod user;
