//! Domain events for the identity system.
//!
//! Services publish these on the event bus; the audit listener turns them into
//! structured log lines. Payloads never carry passwords or codes.

use serde::Serialize;

use super::{GroupId, UserId};

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum IdentityEvent {
    UserRegistered {
        user_id: UserId,
        email: String,
    },
    UserActivated {
        user_id: UserId,
    },
    ActivationFailed {
        user_id: UserId,
        code_burnt: bool,
    },
    LoginSucceeded {
        user_id: UserId,
        remember: bool,
    },
    LoginFailed {
        user_id: Option<UserId>,
        reason: String,
    },
    UserSuspended {
        user_id: UserId,
        until: String,
    },
    UserUnsuspended {
        user_id: UserId,
    },
    UserBanned {
        user_id: UserId,
    },
    LoggedOut {
        user_id: UserId,
    },
    PasswordResetRequested {
        user_id: UserId,
    },
    PasswordReset {
        user_id: UserId,
    },
    PasswordChanged {
        user_id: UserId,
    },
    SocialIdentityLinked {
        user_id: UserId,
        provider: String,
    },
    UserCreated {
        user_id: UserId,
        by: Option<UserId>,
    },
    UserUpdated {
        user_id: UserId,
        by: UserId,
    },
    UserDeleted {
        user_id: UserId,
        by: UserId,
    },
    GroupCreated {
        group_id: GroupId,
        name: String,
    },
    GroupUpdated {
        group_id: GroupId,
    },
    GroupDeleted {
        group_id: GroupId,
    },
    MembershipChanged {
        user_id: UserId,
        group_id: GroupId,
        member: bool,
    },
}

impl IdentityEvent {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::UserRegistered { .. } => "user_registered",
            Self::UserActivated { .. } => "user_activated",
            Self::ActivationFailed { .. } => "activation_failed",
            Self::LoginSucceeded { .. } => "login_succeeded",
            Self::LoginFailed { .. } => "login_failed",
            Self::UserSuspended { .. } => "user_suspended",
            Self::UserUnsuspended { .. } => "user_unsuspended",
            Self::UserBanned { .. } => "user_banned",
            Self::LoggedOut { .. } => "logged_out",
            Self::PasswordResetRequested { .. } => "password_reset_requested",
            Self::PasswordReset { .. } => "password_reset",
            Self::PasswordChanged { .. } => "password_changed",
            Self::SocialIdentityLinked { .. } => "social_identity_linked",
            Self::UserCreated { .. } => "user_created",
            Self::UserUpdated { .. } => "user_updated",
            Self::UserDeleted { .. } => "user_deleted",
            Self::GroupCreated { .. } => "group_created",
            Self::GroupUpdated { .. } => "group_updated",
            Self::GroupDeleted { .. } => "group_deleted",
            Self::MembershipChanged { .. } => "membership_changed",
        }
    }

    /// Security-relevant events are logged at warn level.
    #[must_use]
    pub const fn is_security_alert(&self) -> bool {
        matches!(
            self,
            Self::LoginFailed { .. } | Self::UserSuspended { .. } | Self::UserBanned { .. }
        )
    }
}
