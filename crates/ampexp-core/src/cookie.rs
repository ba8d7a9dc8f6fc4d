// Copyright (c) 2026 ampexp Contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Lifetime of a persisted experiment toggle.
pub const EXPERIMENT_COOKIE_MAX_AGE_DAYS: i64 = 180;

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieAttributes {
    pub path: String,
    pub domain: String,
    pub expires: DateTime<Utc>,
}

impl CookieAttributes {
    /// Attributes for the experiment cookie written at `now`.
    pub fn experiment(domain: &str, now: DateTime<Utc>) -> Self {
        let expires = now
            .checked_add_signed(Duration::days(EXPERIMENT_COOKIE_MAX_AGE_DAYS))
            .unwrap_or(now);
        Self {
            path: "/".to_string(),
            domain: domain.to_string(),
            expires,
        }
    }

    /// `expires` in IMF-fixdate form, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
    pub fn expires_http_date(&self) -> String {
        self.expires.format(HTTP_DATE_FORMAT).to_string()
    }

    pub fn set_cookie_header(&self, name: &str, value: &str) -> String {
        format!(
            "{name}={value}; path={}; domain={}; expires={}",
            self.path,
            self.domain,
            self.expires_http_date()
        )
    }
}

/// Read/write access to the page's cookies.
pub trait CookieStore: Send {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&mut self, name: &str, value: &str, attributes: &CookieAttributes);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCookie {
    pub value: String,
    pub attributes: Option<CookieAttributes>,
}

/// In-process cookie jar. Clones share the same cookies.
#[derive(Debug, Clone, Default)]
pub struct MemoryCookieJar {
    cookies: Arc<Mutex<BTreeMap<String, StoredCookie>>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a cookie without attributes, as if already present in the page.
    pub fn with_cookie(self, name: &str, value: &str) -> Self {
        self.cookies.lock().insert(
            name.to_string(),
            StoredCookie {
                value: value.to_string(),
                attributes: None,
            },
        );
        self
    }

    pub fn stored(&self, name: &str) -> Option<StoredCookie> {
        self.cookies.lock().get(name).cloned()
    }
}

impl CookieStore for MemoryCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        self.cookies.lock().get(name).map(|c| c.value.clone())
    }

    fn set(&mut self, name: &str, value: &str, attributes: &CookieAttributes) {
        self.cookies.lock().insert(
            name.to_string(),
            StoredCookie {
                value: value.to_string(),
                attributes: Some(attributes.clone()),
            },
        );
    }
}
