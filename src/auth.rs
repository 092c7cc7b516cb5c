use crate::requests::MethodRequest;
use chrono::{DateTime, Local, TimeZone};
use sha2::{Digest, Sha512};

/// Default shared secret for user tokens.
pub const SALT: &str = "Otus";
/// Default secret for admin tokens.
pub const ADMIN_SALT: &str = "42";

/// Checks envelope tokens against SHA-512 digests.
///
/// Users sign `account + login + salt`. The admin signs the current hour
/// (`YYYYMMDDHH`, local time) followed by the admin salt, so admin tokens
/// expire on the hour.
#[derive(Debug, Clone)]
pub struct Authenticator {
    salt: String,
    admin_salt: String,
}

impl Default for Authenticator {
    fn default() -> Self {
        Self::new(SALT, ADMIN_SALT)
    }
}

impl Authenticator {
    pub fn new(salt: impl Into<String>, admin_salt: impl Into<String>) -> Self {
        Self {
            salt: salt.into(),
            admin_salt: admin_salt.into(),
        }
    }

    /// Returns true when the envelope token matches the expected digest.
    pub fn check(&self, request: &MethodRequest) -> bool {
        self.check_at(request, Local::now())
    }

    pub fn check_at<Tz: TimeZone>(&self, request: &MethodRequest, now: DateTime<Tz>) -> bool
    where
        Tz::Offset: std::fmt::Display,
    {
        let expected = if request.is_admin() {
            self.admin_token(now)
        } else {
            self.user_token(
                request.account.as_deref().unwrap_or_default(),
                request.login.as_deref().unwrap_or_default(),
            )
        };

        let token = request.token.as_deref().unwrap_or_default();
        constant_time_compare(token, &expected)
    }

    /// Expected token for a regular user.
    pub fn user_token(&self, account: &str, login: &str) -> String {
        sha512_hex(&format!("{}{}{}", account, login, self.salt))
    }

    /// Expected admin token for the hour containing `now`.
    pub fn admin_token<Tz: TimeZone>(&self, now: DateTime<Tz>) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        sha512_hex(&format!("{}{}", now.format("%Y%m%d%H"), self.admin_salt))
    }
}

fn sha512_hex(input: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time string comparison
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
