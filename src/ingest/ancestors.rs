//! Top-ancestor resolution over a batch of casts

use std::collections::HashMap;
use std::collections::HashSet;

use crate::models::Cast;
use crate::models::CastHash;
use crate::models::ParentRef;
use crate::models::TopAncestor;

/// Root reached from `cast` when walking no further
fn terminal_top(cast: &Cast) -> TopAncestor {
    TopAncestor {
        id: cast.id.clone(),
        channel_url: cast.parent_url().map(str::to_string),
    }
}

/// What a stored cast contributes when the walk reaches it
fn stored_top(cast: &Cast) -> TopAncestor {
    cast.top.clone().unwrap_or_else(|| terminal_top(cast))
}

/// Resolve the top ancestor of every cast in `batch`
///
/// `batch` holds new and freshly fetched casts; `stored` holds parents that
/// were already in the store and carry their own resolved top. A walk ends at
/// a cast with no parent cast, at a stored parent, or at a cast whose parent is
/// in neither map; in the last case that cast is its own top and every
/// descendant inherits it.
#[must_use]
pub fn resolve_tops(
    batch: &HashMap<CastHash, Cast>,
    stored: &HashMap<CastHash, Cast>,
) -> HashMap<CastHash, TopAncestor> {
    let mut resolved: HashMap<CastHash, TopAncestor> = HashMap::with_capacity(batch.len());

    for (start, first) in batch {
        if resolved.contains_key(start) {
            continue;
        }

        let mut path: Vec<&CastHash> = Vec::new();
        let mut on_path: HashSet<&CastHash> = HashSet::new();
        let mut cast = first;

        let top = loop {
            path.push(&cast.id.hash);
            on_path.insert(&cast.id.hash);

            let Some(ParentRef::Cast(parent)) = &cast.parent else {
                break terminal_top(cast);
            };
            if on_path.contains(&parent.hash) {
                tracing::warn!("Reply cycle through {}; treating it as a root", cast.id);
                break terminal_top(cast);
            }
            if let Some(known) = resolved.get(&parent.hash) {
                break known.clone();
            }
            if let Some(next) = batch.get(&parent.hash) {
                cast = next;
                continue;
            }
            match stored.get(&parent.hash) {
                Some(parent_cast) => break stored_top(parent_cast),
                None => break terminal_top(cast),
            }
        };

        for hash in path {
            resolved.insert(hash.clone(), top.clone());
        }
    }
    resolved
}
