pub mod permissions {

    pub const ADMIN: &str = "admin";

    pub const SUPERUSER: &str = "superuser";

    pub const ADMINISTRATORS_GROUP: &str = "Administrators";
}

pub mod session_keys {

    /// Opaque domain-session token stored in the cookie session.
    pub const LOGIN_TOKEN: &str = "login_token";

    /// Path requested before the login form interrupted the user.
    pub const LOGIN_REDIRECT: &str = "login_redirect";

    pub const FLASH: &str = "flash";

    pub const OLD_INPUT: &str = "old_input";
}

pub mod limits {

    pub const USERS_PER_PAGE: u64 = 10;

    pub const ADMIN_NAME_MIN_LENGTH: usize = 3;

    pub const NAME_MAX_LENGTH: usize = 100;

    pub const GROUP_NAME_MAX_LENGTH: usize = 50;

    /// Retries of an optimistic user update before giving up.
    pub const VERSION_CONFLICT_RETRIES: usize = 8;

    pub const EVENT_BUS_CAPACITY: usize = 256;
}
