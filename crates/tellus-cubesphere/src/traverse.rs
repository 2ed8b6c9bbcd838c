//! Pre-order traversal of the implicit quadtree.

use crate::{CubeFace, Patch};

/// Visit patches depth-first, face by face in canonical order.
///
/// The visitor is called on each patch in pre-order and returns `true` to
/// descend into its four children (in symbol order) or `false` to stop at
/// this patch. Descent also stops at [`PatchId::MAX_DEPTH`](crate::PatchId::MAX_DEPTH).
pub fn traverse<F>(mut visitor: F)
where
    F: FnMut(&Patch) -> bool,
{
    for face in CubeFace::ALL {
        traverse_from(Patch::root(face), &mut visitor);
    }
}

/// Visit `root` and its descendants in pre-order.
pub fn traverse_from<F>(root: Patch, visitor: &mut F)
where
    F: FnMut(&Patch) -> bool,
{
    let mut stack = vec![root];
    while let Some(patch) = stack.pop() {
        if visitor(&patch) && patch.depth() < crate::PatchId::MAX_DEPTH {
            // Reversed so `a` is popped first.
            stack.extend(patch.children().into_iter().rev());
        }
    }
}
