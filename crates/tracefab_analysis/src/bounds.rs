//! Static worst-case bounds.
//!
//! All three analyses run memoised DFS over operations, which is sound
//! because the topology is a DAG: a subtree's bound is independent of the
//! path that reached it. Bounds are conservative: conditional and
//! probabilistic calls count as if they always fire, and every retry is
//! assumed to happen.

use std::collections::HashMap;
use tracefab_topology::{OpId, Topology};

/// Ceiling for the span-count bound; each multiplication is guarded
/// against it.
pub const MAX_SPANS_CAP: u64 = i32::MAX as u64;

/// The deepest root-to-leaf chain, in edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthBound {
    /// Edge count of the longest chain.
    pub depth: u32,
    /// Operation refs along that chain, root first.
    pub path: Vec<String>,
}

/// The largest per-operation fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOutBound {
    /// `Σ max(count, 1) · (1 + retries)` over the operation's calls.
    pub fan_out: u64,
    /// The operation owning that fan-out.
    pub op_ref: String,
}

/// All static bounds of one topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticBounds {
    /// Longest root-to-leaf chain.
    pub depth: DepthBound,
    /// Largest per-operation fan-out.
    pub fan_out: FanOutBound,
    /// Worst-case spans in a single trace, capped at [`MAX_SPANS_CAP`].
    pub spans: u64,
}

/// Computes every static bound.
#[must_use]
pub fn analyze(topo: &Topology) -> StaticBounds {
    StaticBounds {
        depth: max_depth(topo),
        fan_out: max_fan_out(topo),
        spans: max_spans(topo),
    }
}

/// Longest root-to-leaf chain in edges, with its path.
#[must_use]
pub fn max_depth(topo: &Topology) -> DepthBound {
    // Memoises (subtree depth, deepest child) per operation.
    fn depth_of(
        topo: &Topology,
        id: OpId,
        memo: &mut HashMap<OpId, (u32, Option<OpId>)>,
    ) -> (u32, Option<OpId>) {
        if let Some(&cached) = memo.get(&id) {
            return cached;
        }
        let mut best: (u32, Option<OpId>) = (0, None);
        for call in &topo.op(id).calls {
            let (child_depth, _) = depth_of(topo, call.target, memo);
            if child_depth + 1 > best.0 {
                best = (child_depth + 1, Some(call.target));
            }
        }
        memo.insert(id, best);
        best
    }

    let mut memo = HashMap::new();
    let mut best_root: Option<(u32, OpId)> = None;
    for &root in topo.roots() {
        let (depth, _) = depth_of(topo, root, &mut memo);
        if best_root.is_none() || depth > best_root.map_or(0, |(d, _)| d) {
            best_root = Some((depth, root));
        }
    }

    let Some((depth, root)) = best_root else {
        return DepthBound {
            depth: 0,
            path: Vec::new(),
        };
    };

    let mut path = vec![topo.op(root).op_ref.clone()];
    let mut cursor = root;
    while let Some(&(_, Some(next))) = memo.get(&cursor) {
        path.push(topo.op(next).op_ref.clone());
        cursor = next;
    }

    DepthBound { depth, path }
}

/// The operation with the largest fan-out, and that fan-out.
#[must_use]
pub fn max_fan_out(topo: &Topology) -> FanOutBound {
    let mut best = FanOutBound {
        fan_out: 0,
        op_ref: String::new(),
    };
    for (_, op) in topo.ops() {
        let fan_out: u64 = op
            .calls
            .iter()
            .map(|call| u64::from(call.count.max(1)) * u64::from(call.retries + 1))
            .sum();
        if fan_out > best.fan_out || best.op_ref.is_empty() {
            best = FanOutBound {
                fan_out,
                op_ref: op.op_ref.clone(),
            };
        }
    }
    best
}

/// Worst-case span count of one trace, capped at [`MAX_SPANS_CAP`].
///
/// Counts both on-error and on-success branches, so it is a conservative
/// upper bound no single walk can exceed.
#[must_use]
pub fn max_spans(topo: &Topology) -> u64 {
    fn spans_of(topo: &Topology, id: OpId, memo: &mut HashMap<OpId, u64>) -> u64 {
        if let Some(&cached) = memo.get(&id) {
            return cached;
        }
        let mut total: u64 = 1;
        for call in &topo.op(id).calls {
            let attempts = u64::from(call.count.max(1)) * u64::from(call.retries + 1);
            let child = spans_of(topo, call.target, memo);
            let contribution = attempts
                .checked_mul(child)
                .map_or(MAX_SPANS_CAP, |c| c.min(MAX_SPANS_CAP));
            total = total
                .checked_add(contribution)
                .map_or(MAX_SPANS_CAP, |t| t.min(MAX_SPANS_CAP));
        }
        memo.insert(id, total);
        total
    }

    let mut memo = HashMap::new();
    topo.roots()
        .iter()
        .map(|&root| spans_of(topo, root, &mut memo))
        .max()
        .unwrap_or(0)
}
