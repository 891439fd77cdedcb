pub use super::groups::Entity as Groups;
pub use super::sessions::Entity as Sessions;
pub use super::social_identities::Entity as SocialIdentities;
pub use super::user_groups::Entity as UserGroups;
pub use super::users::Entity as Users;
