pub mod prelude;

pub mod groups;
pub mod sessions;
pub mod social_identities;
pub mod user_groups;
pub mod users;
