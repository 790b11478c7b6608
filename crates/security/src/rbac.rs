//! The RBAC predicate (spec.md section 4.9): permissions and roles are
//! themselves tags on the user entity, so `authorize` is a pure function
//! over `Entity.tags` plus `*`-wildcard segment matching. Stateless
//! beyond whatever reads already happened to produce the `Entity`.

use entitydb_core::Entity;

/// Whether `user` holds a permission tag granting `resource:action`,
/// either directly (`rbac:perm:resource:action`) or via a role that
/// implies it (`rbac:role:admin` implies `rbac:perm:*:*`).
///
/// `*` in a permission segment matches any single required segment; the
/// segment counts must still agree, so `rbac:perm:entity:*` does not
/// match a three-segment requirement.
pub fn authorize_entity(user: &Entity, resource: &str, action: &str) -> bool {
    let required = [resource, action];
    for tag in &user.tags {
        if tag.text.namespace() != "rbac" {
            continue;
        }
        let Some(rest) = tag.text.value_after_namespace() else {
            continue;
        };
        let segments: Vec<&str> = rest.split(':').collect();
        match segments.as_slice() {
            ["role", "admin"] => return true,
            ["role", ..] => continue,
            ["perm", granted @ ..] => {
                if granted.len() == required.len()
                    && granted.iter().zip(required.iter()).all(|(g, r)| *g == "*" || g == r)
                {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}
