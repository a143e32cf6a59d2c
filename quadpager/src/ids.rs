//! Stable integer identities for scene objects.
//!
//! Drawables, selectables, textures and shader programs are all referred to
//! by a [`SimpleIdentity`]. Identities are allocated from a process-wide
//! counter so they never collide across components.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// Integer identity shared by every scene object.
pub type SimpleIdentity = u64;

/// The identity that never refers to anything.
pub const EMPTY_IDENTITY: SimpleIdentity = 0;

/// An ordered set of identities.
pub type SimpleIdSet = BTreeSet<SimpleIdentity>;

/// Global counter. Starts at 1 so [`EMPTY_IDENTITY`] is never handed out.
static IDENTITY_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Allocates a fresh, never-before-seen identity.
pub fn next_identity() -> SimpleIdentity {
    IDENTITY_COUNTER.fetch_add(1, Ordering::Relaxed)
}
