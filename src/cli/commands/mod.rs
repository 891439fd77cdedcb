//! Command handlers

mod admin;
mod users;

pub use admin::cmd_create_admin;
pub use users::{cmd_list_users, cmd_unsuspend};
