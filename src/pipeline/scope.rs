//! Audit scope gate.

use crate::config::SCOPE_WILDCARD;

/// Whether an event falls inside the configured audit scope.
///
/// Group events are matched against `group_scope` by group id, private events
/// against `private_scope` by user id. The wildcard `"0"` matches everything;
/// an empty list matches nothing.
pub fn in_scope(
    is_group: bool,
    group_id: &str,
    user_id: &str,
    group_scope: &[String],
    private_scope: &[String],
) -> bool {
    if is_group {
        matches_scope(group_scope, group_id)
    } else {
        matches_scope(private_scope, user_id)
    }
}

fn matches_scope(scope: &[String], id: &str) -> bool {
    scope.iter().any(|entry| entry == SCOPE_WILDCARD || entry == id)
}
