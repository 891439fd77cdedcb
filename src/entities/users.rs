use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Stored lowercased; lookups normalise before comparing.
    #[sea_orm(unique)]
    pub email: String,

    pub first_name: String,

    pub last_name: String,

    /// Argon2id PHC string (salt and parameters included)
    pub password_hash: String,

    /// JSON object of explicit per-user permission overrides (`{"admin": false}`)
    pub permissions: String,

    pub activated: bool,

    pub activation_code: Option<String>,

    /// Wrong codes submitted against the outstanding activation code.
    pub activation_attempts: i32,

    pub activated_at: Option<DateTimeUtc>,

    pub reset_code: Option<String>,

    pub reset_code_issued_at: Option<DateTimeUtc>,

    /// Consecutive failed logins inside the current throttle window.
    pub failed_attempts: i32,

    pub last_failed_at: Option<DateTimeUtc>,

    pub suspended_until: Option<DateTimeUtc>,

    /// Temporary lockouts since the last successful login; drives ban escalation.
    pub suspension_count: i32,

    pub banned_at: Option<DateTimeUtc>,

    pub last_login_at: Option<DateTimeUtc>,

    /// Optimistic concurrency token, bumped on every write.
    pub version: i32,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_groups::Entity")]
    UserGroups,
    #[sea_orm(has_many = "super::sessions::Entity")]
    Sessions,
    #[sea_orm(has_many = "super::social_identities::Entity")]
    SocialIdentities,
}

impl Related<super::user_groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserGroups.def()
    }
}

impl Related<super::sessions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sessions.def()
    }
}

impl Related<super::social_identities::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SocialIdentities.def()
    }
}

impl Related<super::groups::Entity> for Entity {
    fn to() -> RelationDef {
        super::user_groups::Relation::Group.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::user_groups::Relation::User.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
