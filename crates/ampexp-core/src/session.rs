// Copyright (c) 2026 ampexp Contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::config::HostConfig;
use crate::cookie::{CookieStore, MemoryCookieJar};
use crate::origin::SignatureVerifier;
use crate::page::{Clock, Document, Location, StaticDocument, SystemClock};
use crate::random::{OsRandom, RandomSource};

/// Per-page experiment state plus the collaborators it reads from.
///
/// The decision cache, branch map and origin-experiment cache are only
/// mutated through the resolver, toggle, branch and origin operations.
pub struct Session {
    location: Location,
    config: HostConfig,
    cookies: Box<dyn CookieStore>,
    document: Box<dyn Document>,
    random: Box<dyn RandomSource>,
    clock: Box<dyn Clock>,
    verifier: Option<Arc<dyn SignatureVerifier>>,
    pub(crate) toggles: BTreeMap<String, bool>,
    pub(crate) branches: BTreeMap<String, Option<String>>,
    pub(crate) origin_experiments: Option<BTreeSet<String>>,
}

impl Session {
    pub fn builder(location: Location) -> SessionBuilder {
        SessionBuilder::new(location)
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn host_name(&self) -> &str {
        self.location.host_name()
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn cookies(&self) -> &dyn CookieStore {
        self.cookies.as_ref()
    }

    pub fn document(&self) -> &dyn Document {
        self.document.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn verifier(&self) -> Option<&Arc<dyn SignatureVerifier>> {
        self.verifier.as_ref()
    }

    /// Decisions made so far this session.
    pub fn cached_decisions(&self) -> &BTreeMap<String, bool> {
        &self.toggles
    }

    pub fn cached_decision(&self, name: &str) -> Option<bool> {
        self.toggles.get(name).copied()
    }

    /// Branch decisions so far; `None` marks an experiment processed without a branch.
    pub fn branch_decisions(&self) -> &BTreeMap<String, Option<String>> {
        &self.branches
    }

    pub(crate) fn cookies_mut(&mut self) -> &mut dyn CookieStore {
        self.cookies.as_mut()
    }

    pub(crate) fn random_mut(&mut self) -> &mut dyn RandomSource {
        self.random.as_mut()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("location", &self.location)
            .field("config", &self.config)
            .field("verifier", &self.verifier.is_some())
            .field("toggles", &self.toggles)
            .field("branches", &self.branches)
            .field("origin_experiments", &self.origin_experiments)
            .finish_non_exhaustive()
    }
}

pub struct SessionBuilder {
    location: Location,
    config: HostConfig,
    cookies: Box<dyn CookieStore>,
    document: Box<dyn Document>,
    random: Box<dyn RandomSource>,
    clock: Box<dyn Clock>,
    verifier: Option<Arc<dyn SignatureVerifier>>,
}

impl SessionBuilder {
    pub fn new(location: Location) -> Self {
        Self {
            location,
            config: HostConfig::default(),
            cookies: Box::new(MemoryCookieJar::new()),
            document: Box::new(StaticDocument::new()),
            random: Box::new(OsRandom),
            clock: Box::new(SystemClock),
            verifier: None,
        }
    }

    pub fn config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cookies(mut self, cookies: impl CookieStore + 'static) -> Self {
        self.cookies = Box::new(cookies);
        self
    }

    pub fn document(mut self, document: impl Document + 'static) -> Self {
        self.document = Box::new(document);
        self
    }

    pub fn random(mut self, random: impl RandomSource + 'static) -> Self {
        self.random = Box::new(random);
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn build(self) -> Session {
        Session {
            location: self.location,
            config: self.config,
            cookies: self.cookies,
            document: self.document,
            random: self.random,
            clock: self.clock,
            verifier: self.verifier,
            toggles: BTreeMap::new(),
            branches: BTreeMap::new(),
            origin_experiments: None,
        }
    }
}
