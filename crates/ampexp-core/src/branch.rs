// Copyright (c) 2026 ampexp Contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use crate::resolver::is_experiment_on;
use crate::session::Session;
use crate::toggle::toggle_experiment;

pub type EligibilityFn = Box<dyn Fn(&Session) -> bool + Send + Sync>;

/// Experiment with branch variants, supplied by the caller.
pub struct ExperimentDescriptor {
    /// Without a predicate the experiment is never eligible.
    pub is_traffic_eligible: Option<EligibilityFn>,
    pub branches: Vec<String>,
}

impl ExperimentDescriptor {
    pub fn new<I, S>(branches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            is_traffic_eligible: None,
            branches: branches.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_eligibility(
        mut self,
        predicate: impl Fn(&Session) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.is_traffic_eligible = Some(Box::new(predicate));
        self
    }

    fn is_eligible(&self, session: &Session) -> bool {
        self.is_traffic_eligible
            .as_ref()
            .is_some_and(|predicate| predicate(session))
    }
}

impl std::fmt::Debug for ExperimentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentDescriptor")
            .field("is_traffic_eligible", &self.is_traffic_eligible.is_some())
            .field("branches", &self.branches)
            .finish()
    }
}

/// Index of the bucket holding `draw` when `[0, 1)` is cut into `buckets`
/// equal parts. A draw exactly on a boundary stays in the lower bucket.
pub fn bucket_index(draw: f64, buckets: usize) -> usize {
    if buckets == 0 {
        return 0;
    }
    let scaled = (draw * buckets as f64).ceil();
    let index = if scaled.is_finite() && scaled >= 1.0 {
        scaled as usize - 1
    } else {
        0
    };
    index.min(buckets - 1)
}

/// Assigns a branch to every experiment that has no decision yet this session.
///
/// Experiments that are ineligible or inactive are recorded with no branch and
/// never reconsidered. Each selection takes exactly one draw. Returns every
/// experiment in `experiments` that holds a branch after the call.
pub fn randomly_select_unset_experiments(
    session: &mut Session,
    experiments: &BTreeMap<String, ExperimentDescriptor>,
) -> BTreeMap<String, String> {
    let mut selected = BTreeMap::new();
    for (name, descriptor) in experiments {
        if let Some(decision) = session.branches.get(name) {
            if let Some(branch) = decision {
                selected.insert(name.clone(), branch.clone());
            }
            continue;
        }

        if !descriptor.is_eligible(session) {
            tracing::debug!(experiment = %name, "not traffic eligible; no branch");
            session.branches.insert(name.clone(), None);
            continue;
        }
        if descriptor.branches.is_empty() || !is_experiment_on(session, name) {
            session.branches.insert(name.clone(), None);
            continue;
        }

        let draw = session.random_mut().next_f64();
        let branch = descriptor.branches[bucket_index(draw, descriptor.branches.len())].clone();
        tracing::info!(experiment = %name, branch = %branch, "selected experiment branch");
        session.branches.insert(name.clone(), Some(branch.clone()));
        selected.insert(name.clone(), branch);
    }
    selected
}

pub fn get_experiment_branch<'a>(session: &'a Session, name: &str) -> Option<&'a str> {
    session.branches.get(name).and_then(|branch| branch.as_deref())
}

/// Pins `name` to `branch` for this session, overriding any earlier decision.
///
/// The experiment is transiently toggled on, or off when `branch` is `None`.
pub fn force_experiment_branch(session: &mut Session, name: &str, branch: Option<&str>) {
    toggle_experiment(session, name, Some(branch.is_some()), true);
    tracing::info!(experiment = %name, branch = ?branch, "forced experiment branch");
    session
        .branches
        .insert(name.to_string(), branch.map(str::to_string));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Frequency, HostConfig};
    use crate::page::Location;
    use crate::random::ScriptedRandom;
    use proptest::prelude::*;

    fn session(config: HostConfig, random: ScriptedRandom) -> Session {
        Session::builder(Location::parse("https://a.test/").unwrap())
            .config(config)
            .random(random)
            .build()
    }

    fn on(names: &[&str]) -> HostConfig {
        names.iter().fold(HostConfig::default(), |config, name| {
            config.with_experiment(*name, Frequency::Fixed(true))
        })
    }

    #[test]
    fn boundary_draw_stays_in_lower_bucket() {
        assert_eq!(bucket_index(0.0, 2), 0);
        assert_eq!(bucket_index(0.5, 2), 0);
        assert_eq!(bucket_index(0.500_001, 2), 1);
        assert_eq!(bucket_index(0.999_999_999, 2), 1);
        assert_eq!(bucket_index(1.0, 2), 1);
        assert_eq!(bucket_index(f64::NAN, 3), 0);
        assert_eq!(bucket_index(0.4, 1), 0);
    }

    #[test]
    fn selects_by_draw_and_records_once() {
        let random = ScriptedRandom::new([0.3, 0.6]);
        let mut s = session(on(&["a", "b"]), random.clone());
        let mut experiments = BTreeMap::new();
        experiments.insert(
            "a".to_string(),
            ExperimentDescriptor::new(["a-control", "a-treatment"]).with_eligibility(|_| true),
        );
        experiments.insert(
            "b".to_string(),
            ExperimentDescriptor::new(["b-control", "b-treatment"]).with_eligibility(|_| true),
        );

        let selected = randomly_select_unset_experiments(&mut s, &experiments);
        assert_eq!(selected.get("a").map(String::as_str), Some("a-control"));
        assert_eq!(selected.get("b").map(String::as_str), Some("b-treatment"));
        assert_eq!(random.calls(), 2);

        let again = randomly_select_unset_experiments(&mut s, &experiments);
        assert_eq!(again, selected);
        assert_eq!(random.calls(), 2);
    }

    #[test]
    fn missing_predicate_means_not_eligible() {
        let random = ScriptedRandom::new([0.9]);
        let mut s = session(on(&["x"]), random.clone());
        let mut experiments = BTreeMap::new();
        experiments.insert("x".to_string(), ExperimentDescriptor::new(["c", "t"]));
        assert!(randomly_select_unset_experiments(&mut s, &experiments).is_empty());
        assert_eq!(s.branch_decisions().get("x"), Some(&None));
        assert_eq!(random.calls(), 0);
    }

    #[test]
    fn ineligible_decision_is_final() {
        let mut s = session(on(&["x"]), ScriptedRandom::new([0.1]));
        let mut first = BTreeMap::new();
        first.insert(
            "x".to_string(),
            ExperimentDescriptor::new(["c", "t"]).with_eligibility(|_| false),
        );
        randomly_select_unset_experiments(&mut s, &first);

        let mut second = BTreeMap::new();
        second.insert(
            "x".to_string(),
            ExperimentDescriptor::new(["c", "t"]).with_eligibility(|_| true),
        );
        assert!(randomly_select_unset_experiments(&mut s, &second).is_empty());
        assert_eq!(get_experiment_branch(&s, "x"), None);
    }

    #[test]
    fn inactive_experiment_gets_no_branch() {
        let random = ScriptedRandom::new([0.1]);
        let mut s = session(HostConfig::default(), random.clone());
        let mut experiments = BTreeMap::new();
        experiments.insert(
            "off".to_string(),
            ExperimentDescriptor::new(["c", "t"]).with_eligibility(|_| true),
        );
        assert!(randomly_select_unset_experiments(&mut s, &experiments).is_empty());
        assert_eq!(s.branch_decisions().get("off"), Some(&None));
        assert_eq!(random.calls(), 0);
    }

    #[test]
    fn eligibility_sees_session_context() {
        let mut s = session(on(&["x"]), ScriptedRandom::new([0.2]));
        let mut experiments = BTreeMap::new();
        experiments.insert(
            "x".to_string(),
            ExperimentDescriptor::new(["c", "t"])
                .with_eligibility(|session| session.host_name() == "a.test"),
        );
        let selected = randomly_select_unset_experiments(&mut s, &experiments);
        assert_eq!(selected.get("x").map(String::as_str), Some("c"));
    }

    #[test]
    fn forced_branch_overrides_prior_decision() {
        let mut s = session(on(&["x"]), ScriptedRandom::new([0.9]));
        let mut experiments = BTreeMap::new();
        experiments.insert(
            "x".to_string(),
            ExperimentDescriptor::new(["c", "t"]).with_eligibility(|_| true),
        );
        randomly_select_unset_experiments(&mut s, &experiments);
        assert_eq!(get_experiment_branch(&s, "x"), Some("t"));

        force_experiment_branch(&mut s, "x", Some("c"));
        assert_eq!(get_experiment_branch(&s, "x"), Some("c"));
        assert!(is_experiment_on(&mut s, "x"));

        force_experiment_branch(&mut s, "x", None);
        assert_eq!(get_experiment_branch(&s, "x"), None);
        assert!(!is_experiment_on(&mut s, "x"));
    }

    proptest! {
        #[test]
        fn interior_draws_land_in_their_bucket(n in 1usize..32, k_seed in 0usize..1024, frac in 0.01f64..0.99) {
            let k = k_seed % n;
            let draw = (k as f64 + frac) / n as f64;
            prop_assert_eq!(bucket_index(draw, n), k);
        }
    }
}
