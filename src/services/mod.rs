pub mod access;
pub use access::{AccessController, AccessError};

pub mod audit;
pub use audit::AuditService;

pub mod mailer;
pub use mailer::{ChannelMailer, MailRequest, MailTemplate, Mailer};

pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{AuthError, AuthService, Session, SocialFailure, SocialProfile};
pub use auth_service_impl::SeaOrmAuthService;

pub mod account_service;
pub mod account_service_impl;
pub use account_service::{AccountError, AccountService, Registration};
pub use account_service_impl::SeaOrmAccountService;

pub mod directory_service;
pub mod directory_service_impl;
pub use directory_service::{
    DirectoryError, DirectoryService, GroupDetail, UserDetail, UserForm, UserPage,
};
pub use directory_service_impl::SeaOrmDirectoryService;
