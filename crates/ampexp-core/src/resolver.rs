// Copyright (c) 2026 ampexp Contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};

use crate::overrides::{OverrideList, EXPERIMENT_COOKIE};
use crate::page::OPT_IN_META;
use crate::session::Session;

/// Prefix of URL-hash override parameters (`#e-name=1`).
pub const URL_OVERRIDE_PREFIX: &str = "e-";

/// Which input decided an experiment's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    Cache,
    UrlHash,
    DocumentOptIn,
    Cookie,
    HostConfig,
    Default,
}

pub fn is_experiment_on(session: &mut Session, name: &str) -> bool {
    resolve_experiment(session, name).0
}

/// Resolves `name`, recording the result in the session's decision cache.
///
/// Precedence: cache, URL hash, document opt-in, cookie, host config, off.
/// Sources past the cache are read at most once per name per session.
pub fn resolve_experiment(session: &mut Session, name: &str) -> (bool, DecisionSource) {
    if let Some(on) = session.cached_decision(name) {
        return (on, DecisionSource::Cache);
    }

    let (on, source) = if let Some(on) = url_override(session, name) {
        (on, DecisionSource::UrlHash)
    } else if document_opts_in(session, name) {
        (true, DecisionSource::DocumentOptIn)
    } else if let Some(on) = cookie_overrides(session).get(name) {
        (on, DecisionSource::Cookie)
    } else if let Some(frequency) = session.config().frequency(name) {
        (frequency.resolve(session.random_mut()), DecisionSource::HostConfig)
    } else {
        (false, DecisionSource::Default)
    };

    tracing::debug!(experiment = %name, on, source = ?source, "resolved experiment");
    session.toggles.insert(name.to_string(), on);
    (on, source)
}

/// Resolves every experiment any source knows about and returns the cache.
pub fn experiment_toggles(session: &mut Session) -> BTreeMap<String, bool> {
    let mut names: BTreeSet<String> = session.config().experiments.keys().cloned().collect();
    names.extend(
        cookie_overrides(session)
            .iter()
            .map(|(name, _)| name.to_string()),
    );
    names.extend(
        opt_in_names(session)
            .into_iter()
            .filter(|name| session.config().allows_doc_opt_in(name)),
    );
    names.extend(
        session
            .location()
            .hash_params()
            .keys()
            .filter_map(|key| key.strip_prefix(URL_OVERRIDE_PREFIX))
            .filter(|name| session.config().allows_url_opt_in(name))
            .map(str::to_string),
    );
    for name in &names {
        resolve_experiment(session, name);
    }
    session.toggles.clone()
}

/// Forgets every cached decision so the next lookup re-reads live sources.
/// Branch decisions are kept.
pub fn reset_experiment_toggles(session: &mut Session) {
    tracing::debug!(cleared = session.toggles.len(), "resetting experiment toggles");
    session.toggles.clear();
    session.origin_experiments = None;
}

pub(crate) fn cookie_overrides(session: &Session) -> OverrideList {
    OverrideList::parse(session.cookies().get(EXPERIMENT_COOKIE).as_deref())
}

fn url_override(session: &Session, name: &str) -> Option<bool> {
    if !session.config().allows_url_opt_in(name) {
        return None;
    }
    let params = session.location().hash_params();
    match params.get(&format!("{URL_OVERRIDE_PREFIX}{name}"))?.as_str() {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

fn document_opts_in(session: &Session, name: &str) -> bool {
    session.config().allows_doc_opt_in(name) && opt_in_names(session).iter().any(|n| n == name)
}

fn opt_in_names(session: &Session) -> Vec<String> {
    session
        .document()
        .meta_contents(OPT_IN_META)
        .iter()
        .flat_map(|content| content.split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Frequency, HostConfig};
    use crate::cookie::{CookieAttributes, CookieStore, MemoryCookieJar};
    use crate::page::{Location, StaticDocument};
    use crate::random::ScriptedRandom;

    fn session(href: &str, config: HostConfig, cookie: Option<&str>) -> Session {
        let mut jar = MemoryCookieJar::new();
        if let Some(cookie) = cookie {
            jar = jar.with_cookie(EXPERIMENT_COOKIE, cookie);
        }
        Session::builder(Location::parse(href).unwrap())
            .config(config)
            .cookies(jar)
            .random(ScriptedRandom::default())
            .build()
    }

    #[test]
    fn unknown_experiment_defaults_off() {
        let mut s = session("https://a.test/", HostConfig::default(), None);
        assert_eq!(
            resolve_experiment(&mut s, "nope"),
            (false, DecisionSource::Default)
        );
        assert_eq!(
            resolve_experiment(&mut s, "nope"),
            (false, DecisionSource::Cache)
        );
    }

    #[test]
    fn url_override_requires_allow_list() {
        let href = "https://a.test/#e-x=1&e-y=0";
        let mut config = HostConfig::default().with_experiment("y", Frequency::Fixed(true));
        config.allow_url_opt_in.insert("y".to_string());
        let mut s = session(href, config, Some("x,y"));
        assert_eq!(
            resolve_experiment(&mut s, "x"),
            (true, DecisionSource::Cookie)
        );
        assert_eq!(
            resolve_experiment(&mut s, "y"),
            (false, DecisionSource::UrlHash)
        );
    }

    #[test]
    fn url_override_ignores_other_values() {
        let mut config = HostConfig::default();
        config.allow_url_opt_in.insert("x".to_string());
        let mut s = session("https://a.test/#e-x=yes", config, Some("-x"));
        assert_eq!(
            resolve_experiment(&mut s, "x"),
            (false, DecisionSource::Cookie)
        );
    }

    #[test]
    fn document_opt_in_beats_cookie_when_allowed() {
        let mut config = HostConfig::default();
        config.allow_doc_opt_in.insert("d".to_string());
        let mut s = Session::builder(Location::parse("https://a.test/").unwrap())
            .config(config)
            .cookies(MemoryCookieJar::new().with_cookie(EXPERIMENT_COOKIE, "-d,-e"))
            .document(StaticDocument::new().with_meta(OPT_IN_META, "d, e"))
            .build();
        assert_eq!(
            resolve_experiment(&mut s, "d"),
            (true, DecisionSource::DocumentOptIn)
        );
        assert_eq!(
            resolve_experiment(&mut s, "e"),
            (false, DecisionSource::Cookie)
        );
    }

    #[test]
    fn url_override_beats_document_opt_in() {
        let mut config = HostConfig::default();
        config.allow_url_opt_in.insert("x".to_string());
        config.allow_doc_opt_in.insert("x".to_string());
        let mut s = Session::builder(Location::parse("https://a.test/#e-x=0").unwrap())
            .config(config)
            .document(StaticDocument::new().with_meta(OPT_IN_META, "x"))
            .build();
        assert_eq!(
            resolve_experiment(&mut s, "x"),
            (false, DecisionSource::UrlHash)
        );
    }

    #[test]
    fn reset_forces_rederivation() {
        let jar = MemoryCookieJar::new().with_cookie(EXPERIMENT_COOKIE, "x");
        let mut s = Session::builder(Location::parse("https://a.test/").unwrap())
            .cookies(jar.clone())
            .build();
        assert!(is_experiment_on(&mut s, "x"));

        let mut writer = jar;
        writer.set(
            EXPERIMENT_COOKIE,
            "-x",
            &CookieAttributes::experiment("a.test", chrono::Utc::now()),
        );
        assert!(is_experiment_on(&mut s, "x"), "cache hides live change");

        reset_experiment_toggles(&mut s);
        assert!(s.cached_decisions().is_empty());
        assert!(!is_experiment_on(&mut s, "x"));
    }
}
