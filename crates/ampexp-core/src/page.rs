// Copyright (c) 2026 ampexp Contributors
// SPDX-License-Identifier: Apache-2.0

//! Page-side collaborators: document meta tags, location and clock.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use url::{form_urlencoded, Url};

use crate::error::{ExperimentError, ExperimentResult};

/// Meta tag listing experiments the document opts into.
pub const OPT_IN_META: &str = "amp-experiments-opt-in";
/// Meta tag carrying a signed origin-experiment token.
pub const ORIGIN_TOKEN_META: &str = "amp-experiment-token";

pub trait Document: Send {
    /// `content` of every `<meta name=...>` with this name, in document order.
    fn meta_contents(&self, name: &str) -> Vec<String>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticDocument {
    metas: Vec<(String, String)>,
}

impl StaticDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_meta(mut self, name: &str, content: &str) -> Self {
        self.metas.push((name.to_string(), content.to_string()));
        self
    }
}

impl Document for StaticDocument {
    fn meta_contents(&self, name: &str) -> Vec<String> {
        self.metas
            .iter()
            .filter(|(meta, _)| meta == name)
            .map(|(_, content)| content.clone())
            .collect()
    }
}

/// Parsed page URL; only the parts experiment resolution reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    url: Url,
}

impl Location {
    /// Accepts absolute URLs with a host and a tuple origin (http, https, ws, ...).
    pub fn parse(href: &str) -> ExperimentResult<Self> {
        let invalid = || ExperimentError::InvalidLocation(href.to_string());
        let url = Url::parse(href).map_err(|_| invalid())?;
        if url.host_str().is_none() || !url.origin().is_tuple() {
            return Err(invalid());
        }
        Ok(Self { url })
    }

    pub fn host_name(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Scheme, host and non-default port; never the path.
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    /// `#a=1&b=2` as a map. The first occurrence of a key wins.
    pub fn hash_params(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        let Some(fragment) = self.url.fragment() else {
            return params;
        };
        for (key, value) in form_urlencoded::parse(fragment.as_bytes()) {
            params
                .entry(key.into_owned())
                .or_insert_with(|| value.into_owned());
        }
        params
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
