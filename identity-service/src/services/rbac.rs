//! RBAC resolver - wildcard permission matching, role inheritance, and
//! tenant-scoped custom roles.
//!
//! Permissions are dot-delimited strings (e.g. "orders.view",
//! "creators.payments.approve"). Matching is a small pure-function
//! matcher over parsed segments, not regex matching. Authorization
//! decisions always run `has_permission` against the unexpanded held
//! set; `expand_wildcards` exists for UI enumeration only.

use once_cell::sync::Lazy;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::store::IdentityStore;

/// Predefined role codes. These sets are immutable; everything else is
/// a tenant-scoped custom role.
pub mod role_codes {
    pub const OWNER: &str = "owner";
    pub const ADMIN: &str = "admin";
    pub const MEMBER: &str = "member";
}

static PREDEFINED_ROLES: Lazy<HashMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    HashMap::from([
        (role_codes::OWNER, vec!["*"]),
        (
            role_codes::ADMIN,
            vec![
                "orders.*",
                "creators.*",
                "surveys.*",
                "payouts.view",
                "payouts.approve",
                "members.*",
                "settings.*",
            ],
        ),
        (
            role_codes::MEMBER,
            vec!["dashboard.view", "orders.view", "creators.view", "surveys.view"],
        ),
    ])
});

/// Parsed permission pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionPattern<'a> {
    /// `*` - matches every permission.
    Full,
    /// `category.*` - matches everything under the category, at any depth.
    Category(&'a str),
    /// `*.action` - matches the action across categories, but only for
    /// permissions with exactly two segments.
    Action(&'a str),
    /// A fully literal path of any depth.
    Exact(&'a str),
}

/// Parse a held permission string into its pattern form.
pub fn parse_pattern(held: &str) -> PermissionPattern<'_> {
    if held == "*" {
        return PermissionPattern::Full;
    }
    if let Some(prefix) = held.strip_suffix(".*") {
        if !prefix.is_empty() && !prefix.contains('*') {
            return PermissionPattern::Category(prefix);
        }
    }
    if let Some(action) = held.strip_prefix("*.") {
        if !action.is_empty() && !action.contains('*') && !action.contains('.') {
            return PermissionPattern::Action(action);
        }
    }
    PermissionPattern::Exact(held)
}

/// Check whether one held permission matches a required permission.
pub fn pattern_matches(held: &str, required: &str) -> bool {
    match parse_pattern(held) {
        PermissionPattern::Full => true,
        PermissionPattern::Category(prefix) => required
            .strip_prefix(prefix)
            .map(|rest| rest.starts_with('.') && rest.len() > 1)
            .unwrap_or(false),
        PermissionPattern::Action(action) => {
            let mut segments = required.split('.');
            match (segments.next(), segments.next(), segments.next()) {
                (Some(category), Some(last), None) => !category.is_empty() && last == action,
                _ => false,
            }
        }
        PermissionPattern::Exact(p) => p == required,
    }
}

/// Check whether any held permission grants the required one.
/// An empty or absent held set never grants anything.
pub fn has_permission<S: AsRef<str>>(held: &[S], required: &str) -> bool {
    held.iter().any(|h| pattern_matches(h.as_ref(), required))
}

/// OR composition over a required set.
pub fn has_any_permission<S: AsRef<str>, R: AsRef<str>>(held: &[S], required: &[R]) -> bool {
    required.iter().any(|r| has_permission(held, r.as_ref()))
}

/// AND composition over a required set.
pub fn has_all_permissions<S: AsRef<str>, R: AsRef<str>>(held: &[S], required: &[R]) -> bool {
    required.iter().all(|r| has_permission(held, r.as_ref()))
}

/// Merge a role's explicit permission set with its inherited parent
/// set, deduplicated, child entries first.
pub fn resolve_permissions(role_perms: &[String], parent_perms: Option<&[String]>) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for perm in role_perms
        .iter()
        .chain(parent_perms.unwrap_or_default().iter())
    {
        if !merged.iter().any(|p| p == perm) {
            merged.push(perm.clone());
        }
    }
    merged
}

/// Materialize wildcard entries against a concrete permission universe.
///
/// For UI enumeration only; authorization goes through `has_permission`
/// so it cannot be defeated by a stale universe.
pub fn expand_wildcards<S: AsRef<str>>(held: &[S], universe: &[S]) -> Vec<String> {
    universe
        .iter()
        .filter(|u| has_permission(held, u.as_ref()))
        .map(|u| u.as_ref().to_string())
        .collect()
}

/// Permissions of a predefined role, if the code names one.
pub fn predefined_role_permissions(role_code: &str) -> Option<Vec<String>> {
    PREDEFINED_ROLES
        .get(role_code)
        .map(|perms| perms.iter().map(|p| p.to_string()).collect())
}

/// Resolves a membership's role code to its effective permission set,
/// following custom-role inheritance chains through the store.
#[derive(Clone)]
pub struct RoleResolver {
    store: Arc<dyn IdentityStore>,
}

impl RoleResolver {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Effective permissions for a role code within a tenant.
    ///
    /// The code is either a predefined role or the id of a custom role
    /// owned by the same tenant. Unknown codes and cross-tenant role
    /// ids resolve to the empty set (which grants nothing).
    pub async fn permissions_for_role(
        &self,
        organization_id: Uuid,
        role_code: &str,
    ) -> Result<Vec<String>, AppError> {
        if let Some(perms) = predefined_role_permissions(role_code) {
            return Ok(perms);
        }

        let mut permissions: Vec<String> = Vec::new();
        let mut next = Some(role_code.to_string());
        let mut visited: Vec<Uuid> = Vec::new();

        while let Some(code) = next.take() {
            if let Some(parent_perms) = predefined_role_permissions(&code) {
                permissions = resolve_permissions(&permissions, Some(&parent_perms));
                break;
            }

            let Ok(role_id) = code.parse::<Uuid>() else {
                tracing::warn!(role_code = %code, "Unknown role code in inheritance chain");
                break;
            };
            // Cycle guard
            if visited.contains(&role_id) {
                tracing::warn!(role_id = %role_id, "Role inheritance cycle detected");
                break;
            }
            visited.push(role_id);

            let Some(role) = self.store.find_custom_role(role_id).await? else {
                break;
            };
            if role.organization_id != organization_id {
                tracing::warn!(role_id = %role_id, "Custom role referenced across tenants");
                break;
            }

            permissions = resolve_permissions(&permissions, Some(&role.permissions.0));
            next = role.parent_role_code.clone();
        }

        Ok(permissions)
    }

    /// Check a single permission for a role code within a tenant.
    pub async fn role_has_permission(
        &self,
        organization_id: Uuid,
        role_code: &str,
        required: &str,
    ) -> Result<bool, AppError> {
        let permissions = self
            .permissions_for_role(organization_id, role_code)
            .await?;
        Ok(has_permission(&permissions, required))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held(perms: &[&str]) -> Vec<String> {
        perms.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_full_wildcard_matches_anything() {
        let held = held(&["*"]);
        assert!(has_permission(&held, "orders.view"));
        assert!(has_permission(&held, "creators.payments.approve"));
        assert!(has_permission(&held, "anything"));
    }

    #[test]
    fn test_category_wildcard() {
        let held = held(&["orders.*"]);
        assert!(has_permission(&held, "orders.view"));
        assert!(has_permission(&held, "orders.export.csv"));
        assert!(!has_permission(&held, "creators.view"));
        // The category itself is not a grantable permission
        assert!(!has_permission(&held, "orders"));
        // Prefix must match on a segment boundary
        assert!(!has_permission(&held, "ordersx.view"));
    }

    #[test]
    fn test_action_wildcard_only_matches_two_segments() {
        let held = held(&["*.view"]);
        assert!(has_permission(&held, "orders.view"));
        assert!(has_permission(&held, "creators.view"));
        assert!(!has_permission(&held, "creators.payments.view"));
        assert!(!has_permission(&held, "view"));
    }

    #[test]
    fn test_exact_match() {
        let held = held(&["creators.payments.approve"]);
        assert!(has_permission(&held, "creators.payments.approve"));
        assert!(!has_permission(&held, "creators.payments.view"));
    }

    #[test]
    fn test_empty_held_set_grants_nothing() {
        let held: Vec<String> = Vec::new();
        assert!(!has_permission(&held, "orders.view"));
    }

    #[test]
    fn test_any_and_all_composition() {
        let held = held(&["orders.*", "dashboard.view"]);
        assert!(has_any_permission(&held, &["creators.view", "orders.edit"]));
        assert!(!has_any_permission(&held, &["creators.view", "payouts.view"]));
        assert!(has_all_permissions(&held, &["orders.view", "dashboard.view"]));
        assert!(!has_all_permissions(&held, &["orders.view", "creators.view"]));
    }

    #[test]
    fn test_resolve_permissions_deduplicates() {
        let child = held(&["orders.view", "orders.edit"]);
        let parent = held(&["orders.view", "dashboard.view"]);
        let merged = resolve_permissions(&child, Some(&parent));
        assert_eq!(
            merged,
            held(&["orders.view", "orders.edit", "dashboard.view"])
        );
    }

    #[test]
    fn test_expand_wildcards_against_universe() {
        let patterns = held(&["orders.*", "*.view"]);
        let universe = held(&[
            "orders.view",
            "orders.edit",
            "creators.view",
            "creators.payments.view",
            "payouts.approve",
        ]);
        assert_eq!(
            expand_wildcards(&patterns, &universe),
            held(&["orders.view", "orders.edit", "creators.view"])
        );
    }

    #[test]
    fn test_parse_pattern_forms() {
        assert_eq!(parse_pattern("*"), PermissionPattern::Full);
        assert_eq!(parse_pattern("orders.*"), PermissionPattern::Category("orders"));
        assert_eq!(parse_pattern("*.view"), PermissionPattern::Action("view"));
        assert_eq!(
            parse_pattern("orders.view"),
            PermissionPattern::Exact("orders.view")
        );
        // Degenerate forms fall back to exact matching
        assert_eq!(parse_pattern("*.a.b"), PermissionPattern::Exact("*.a.b"));
        assert_eq!(parse_pattern("*.*"), PermissionPattern::Exact("*.*"));
    }

    #[test]
    fn test_predefined_roles() {
        assert!(predefined_role_permissions(role_codes::OWNER).is_some());
        assert!(predefined_role_permissions("no-such-role").is_none());

        let owner = predefined_role_permissions(role_codes::OWNER).unwrap();
        assert!(has_permission(&owner, "creators.payments.approve"));

        let member = predefined_role_permissions(role_codes::MEMBER).unwrap();
        assert!(has_permission(&member, "orders.view"));
        assert!(!has_permission(&member, "orders.edit"));
    }
}
