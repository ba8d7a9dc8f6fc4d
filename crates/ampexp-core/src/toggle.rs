// Copyright (c) 2026 ampexp Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::cookie::CookieAttributes;
use crate::overrides::{OverrideList, EXPERIMENT_COOKIE};
use crate::resolver::{cookie_overrides, is_experiment_on};
use crate::session::Session;

/// Sets `name` to `force` or flips its resolved state, and returns the new state.
///
/// The decision cache is updated before returning. Unless `transient`, the
/// override cookie is rewritten with every other entry left as it was.
pub fn toggle_experiment(
    session: &mut Session,
    name: &str,
    force: Option<bool>,
    transient: bool,
) -> bool {
    let on = match force {
        Some(on) => on,
        None => !is_experiment_on(session, name),
    };
    session.toggles.insert(name.to_string(), on);

    if transient {
        tracing::debug!(experiment = %name, on, "transient experiment toggle");
        return on;
    }
    if !OverrideList::can_hold(name) {
        tracing::warn!(experiment = %name, on, "name cannot be stored in the override cookie; not persisted");
        return on;
    }

    let mut overrides = cookie_overrides(session);
    overrides.set(name, on);
    let value = overrides.serialize();
    let attributes = CookieAttributes::experiment(session.host_name(), session.clock().now());
    session
        .cookies_mut()
        .set(EXPERIMENT_COOKIE, &value, &attributes);
    tracing::info!(experiment = %name, on, cookie = %value, "persisted experiment toggle");
    on
}
