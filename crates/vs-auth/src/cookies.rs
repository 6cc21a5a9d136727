use std::collections::BTreeMap;
use std::fmt;

use reqwest::header::{HeaderMap, SET_COOKIE};
use tracing::trace;

use crate::config::SESSION_COOKIE_NAME;

/// Cookies collected across the steps of one login flow
///
/// The identity provider ties the password and MFA steps to the cookies it
/// set during bootstrap, so each response's `Set-Cookie` headers are folded
/// in here and replayed on the next request.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthCookies {
    cookies: BTreeMap<String, String>,
}

impl AuthCookies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold every `Set-Cookie` header into the jar
    ///
    /// A cookie set to an empty value is removed.
    pub fn absorb(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(SET_COOKIE) {
            if let Ok(cookie_str) = value.to_str()
                && let Some(cookie_part) = cookie_str.split(';').next()
                && let Some((name, value)) = cookie_part.split_once('=')
            {
                let name = name.trim();
                let value = value.trim();
                if name.is_empty() {
                    continue;
                }
                trace!(cookie = name, "storing cookie");
                if value.is_empty() {
                    self.cookies.remove(name);
                } else {
                    self.cookies.insert(name.to_owned(), value.to_owned());
                }
            }
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// The long-lived `ssid` cookie, if the provider issued one
    pub fn session_cookie(&self) -> Option<&str> {
        self.get(SESSION_COOKIE_NAME)
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Value for a `Cookie` request header
    pub fn header_value(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

impl fmt::Debug for AuthCookies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCookies")
            .field("names", &self.cookies.keys().collect::<Vec<_>>())
            .finish()
    }
}
