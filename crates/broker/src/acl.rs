//! Authorization seam. Mirrors `thoonk/pubsub.py`'s `ACL` class: a set of
//! hooks a real authorization layer would need, wired into the broker as a
//! pass-through but never consulted by the feed/queue/job operations
//! themselves — callers that want enforcement gate at the call site.

/// Identity-gated authorization checks for broker operations. The default
/// [`PermissiveAcl`] always allows; a real deployment swaps in its own
/// implementation without touching [`crate::broker::Broker`].
pub trait Acl: Send + Sync {
    fn can_create(&self, identity: &str, feed: &str) -> bool;
    fn can_delete(&self, identity: &str, feed: &str) -> bool;
    fn can_publish(&self, identity: &str, feed: &str) -> bool;
    fn can_retract(&self, identity: &str, feed: &str) -> bool;
    fn can_subscribe(&self, identity: &str, feed: &str) -> bool;
}

/// Always permits. The broker's default when no `Acl` is supplied.
#[derive(Clone, Copy, Debug, Default)]
pub struct PermissiveAcl;

impl Acl for PermissiveAcl {
    fn can_create(&self, _identity: &str, _feed: &str) -> bool {
        true
    }

    fn can_delete(&self, _identity: &str, _feed: &str) -> bool {
        true
    }

    fn can_publish(&self, _identity: &str, _feed: &str) -> bool {
        true
    }

    fn can_retract(&self, _identity: &str, _feed: &str) -> bool {
        true
    }

    fn can_subscribe(&self, _identity: &str, _feed: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissive_acl_always_allows() {
        let acl = PermissiveAcl;
        assert!(acl.can_create("anyone", "feed"));
        assert!(acl.can_delete("anyone", "feed"));
        assert!(acl.can_publish("anyone", "feed"));
        assert!(acl.can_retract("anyone", "feed"));
        assert!(acl.can_subscribe("anyone", "feed"));
    }
}
