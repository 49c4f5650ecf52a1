//! MANIAC: the per-plane adaptive decision tree that selects a chance
//! context for each pixel's residual.
//!
//! See: §4.6 MANIAC Tree, §4.7 MANIAC Leaf Lookup.

use crate::chance::ChanceContext;
use crate::constants::{MANIAC_TREE_BASE_SIZE, MANIAC_TREE_MAX_COUNT, MANIAC_TREE_MIN_COUNT};
use crate::error::{Error, Result};
use crate::rangecoder::{ByteSource, RangeCoder};

/// The three chance banks shared by every node of a single tree while it is
/// being read: property selector, split count, split value.
#[derive(Default)]
pub struct ManiacChances {
    pub property: ChanceContext,
    pub count: ChanceContext,
    pub split_val: ChanceContext,
}

/// One node of a decoded MANIAC tree.
///
/// `property == -1` marks a leaf. `leaf_id` is populated lazily, the first
/// time traffic through this node needs a chance context (see
/// [`find_leaf`]).
#[derive(Clone, Copy)]
pub struct ManiacNode {
    pub property: i32,
    pub count: i32,
    pub split_val: i32,
    pub child_id: usize,
    pub leaf_id: Option<usize>,
}

impl Default for ManiacNode {
    fn default() -> Self {
        ManiacNode {
            property: -1,
            count: 0,
            split_val: 0,
            child_id: 0,
            leaf_id: None,
        }
    }
}

/// A single plane's decoded tree: internal nodes plus the growing arena of
/// leaf chance contexts they reference.
pub struct ManiacTree {
    nodes: Vec<ManiacNode>,
    leaves: Vec<ChanceContext>,
}

impl ManiacTree {
    pub fn node(&self, id: usize) -> &ManiacNode {
        &self.nodes[id]
    }
}

enum Adjustment {
    Min(usize, i32),
    Max(usize, i32),
}

enum StackItem {
    Visit {
        node_id: usize,
        adjustment: Option<Adjustment>,
    },
    Revisit {
        prop: usize,
        old_min: i32,
        old_max: i32,
    },
}

#[derive(Default)]
struct PartialVisit {
    property_plus1: Option<i32>,
    count: Option<i32>,
}

/// Resumable pre-order reader that builds a [`ManiacTree`] from the
/// bitstream. One instance is created per non-constant plane; `advance`
/// drives it to completion across as many suspensions as needed.
pub struct ManiacReader {
    stack: Vec<StackItem>,
    prop_ranges: Vec<(i32, i32)>,
    num_properties: usize,
    current: Option<PartialVisit>,
    tree: ManiacTree,
}

impl ManiacReader {
    pub fn new(prop_ranges: Vec<(i32, i32)>) -> Self {
        let num_properties = prop_ranges.len();
        ManiacReader {
            stack: vec![StackItem::Visit {
                node_id: 0,
                adjustment: None,
            }],
            prop_ranges,
            num_properties,
            current: None,
            tree: ManiacTree {
                nodes: Vec::with_capacity(MANIAC_TREE_BASE_SIZE),
                leaves: Vec::with_capacity(MANIAC_TREE_BASE_SIZE),
            }
            .with_root(),
        }
    }

    /// Drives tree construction until it completes or the byte source is
    /// exhausted.
    pub fn advance(
        &mut self,
        rc: &mut RangeCoder,
        src: &mut ByteSource,
        chances: &mut ManiacChances,
    ) -> Result<Option<()>> {
        loop {
            match self.stack.last() {
                None => return Ok(Some(())),
                Some(StackItem::Revisit { .. }) => {
                    if let Some(StackItem::Revisit {
                        prop,
                        old_min,
                        old_max,
                    }) = self.stack.pop()
                    {
                        self.prop_ranges[prop] = (old_min, old_max);
                    }
                }
                Some(StackItem::Visit { node_id, .. }) => {
                    let node_id = *node_id;
                    if self.current.is_none() {
                        if let Some(StackItem::Visit {
                            adjustment: Some(adj),
                            ..
                        }) = self.stack.last()
                        {
                            match adj {
                                Adjustment::Min(p, v) => self.prop_ranges[*p].0 = *v,
                                Adjustment::Max(p, v) => self.prop_ranges[*p].1 = *v,
                            }
                        }
                        self.current = Some(PartialVisit::default());
                    }

                    if self.current.as_ref().unwrap().property_plus1.is_none() {
                        let v = match rc.read_gnz_int(
                            src,
                            &mut chances.property,
                            0,
                            self.num_properties as i32,
                        ) {
                            Some(v) => v,
                            None => return Ok(None),
                        };
                        self.current.as_mut().unwrap().property_plus1 = Some(v);
                    }
                    let property_plus1 = self.current.as_ref().unwrap().property_plus1.unwrap();

                    if property_plus1 == 0 {
                        self.tree.nodes[node_id].property = -1;
                        self.current = None;
                        self.stack.pop();
                        continue;
                    }
                    let prop_idx = (property_plus1 - 1) as usize;

                    if self.current.as_ref().unwrap().count.is_none() {
                        let v = match rc.read_gnz_int(
                            src,
                            &mut chances.count,
                            MANIAC_TREE_MIN_COUNT,
                            MANIAC_TREE_MAX_COUNT,
                        ) {
                            Some(v) => v,
                            None => return Ok(None),
                        };
                        self.current.as_mut().unwrap().count = Some(v);
                    }
                    let count = self.current.as_ref().unwrap().count.unwrap();

                    let (range_min, range_max) = self.prop_ranges[prop_idx];
                    if range_min >= range_max {
                        return Err(Error::InvalidData(
                            "MANIAC split property range is degenerate".into(),
                        ));
                    }
                    let split_val =
                        match rc.read_gnz_int(src, &mut chances.split_val, range_min, range_max - 1)
                        {
                            Some(v) => v,
                            None => return Ok(None),
                        };

                    let child_id = self.tree.nodes.len();
                    self.tree.nodes.push(ManiacNode::default());
                    self.tree.nodes.push(ManiacNode::default());
                    self.tree.nodes[node_id] = ManiacNode {
                        property: prop_idx as i32,
                        count,
                        split_val,
                        child_id,
                        leaf_id: None,
                    };

                    self.stack.pop();
                    self.current = None;
                    self.stack.push(StackItem::Revisit {
                        prop: prop_idx,
                        old_min: range_min,
                        old_max: range_max,
                    });
                    self.stack.push(StackItem::Visit {
                        node_id: child_id + 1,
                        adjustment: Some(Adjustment::Max(prop_idx, split_val)),
                    });
                    self.stack.push(StackItem::Visit {
                        node_id: child_id,
                        adjustment: Some(Adjustment::Min(prop_idx, split_val + 1)),
                    });
                }
            }
        }
    }

    pub fn into_tree(self) -> ManiacTree {
        self.tree
    }
}

impl ManiacTree {
    fn with_root(mut self) -> Self {
        self.nodes.push(ManiacNode::default());
        self
    }
}

/// Walks `tree` from the root using property vector `prop`, per §4.7.
///
/// Lazily materializes leaf chance contexts: a node that has never been
/// visited gets a fresh default context; a split node whose `count`
/// countdown reaches zero clones its context into the chosen child before
/// handing traffic onward.
pub fn find_leaf(tree: &mut ManiacTree, prop: &[i32]) -> usize {
    let mut node_id = 0;
    loop {
        let node = tree.nodes[node_id];
        if node.property == -1 {
            return ensure_leaf(tree, node_id);
        }
        if node.count > 0 {
            tree.nodes[node_id].count -= 1;
            return ensure_leaf(tree, node_id);
        }
        let goes_left = prop[node.property as usize] > node.split_val;
        let child = if goes_left {
            node.child_id
        } else {
            node.child_id + 1
        };
        if node.count < 0 {
            node_id = child;
            continue;
        }
        // count == 0: split this node's traffic into both children. The
        // left child inherits the pre-split context outright; the right
        // child gets a freshly cloned copy. Both must be valid before
        // either sees traffic.
        tree.nodes[node_id].count = -1;
        let old_leaf = ensure_leaf(tree, node_id);
        let cloned = tree.leaves[old_leaf].clone();
        let new_leaf_id = tree.leaves.len();
        tree.leaves.push(cloned);
        tree.nodes[node.child_id].leaf_id = Some(old_leaf);
        tree.nodes[node.child_id + 1].leaf_id = Some(new_leaf_id);
        node_id = child;
    }
}

fn ensure_leaf(tree: &mut ManiacTree, node_id: usize) -> usize {
    if let Some(id) = tree.nodes[node_id].leaf_id {
        return id;
    }
    let id = tree.leaves.len();
    tree.leaves.push(ChanceContext::new());
    tree.nodes[node_id].leaf_id = Some(id);
    id
}

/// Resumable per-pixel MANIAC integer read: finds (and possibly splits) the
/// leaf for `prop` exactly once, caching it across a suspended
/// [`RangeCoder::read_gnz_int`] so a retry doesn't re-walk the tree.
#[derive(Default)]
pub struct PixelRead {
    leaf: Option<usize>,
}

impl PixelRead {
    pub fn read(
        &mut self,
        rc: &mut RangeCoder,
        src: &mut ByteSource,
        tree: &mut ManiacTree,
        prop: &[i32],
        lo: i32,
        hi: i32,
    ) -> Option<i32> {
        let leaf = *self.leaf.get_or_insert_with(|| find_leaf(tree, prop));
        let result = rc.read_gnz_int(src, &mut tree.leaves[leaf], lo, hi)?;
        self.leaf = None;
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_property_tree_reads_as_leaf_on_zero_bit() {
        // property_plus1 = 0 is encoded by the NZ-int ZERO bit, so a stream
        // that immediately signals "zero" yields a root leaf with no splits.
        let mut reader = ManiacReader::new(vec![(0, 10)]);
        let mut rc = RangeCoder::new();
        let mut src = ByteSource::new();
        let mut chances = ManiacChances::default();
        // Not enough bytes to even complete RAC init; must suspend cleanly.
        assert!(matches!(reader.advance(&mut rc, &mut src, &mut chances), Ok(None)));
    }

    #[test]
    fn find_leaf_on_trivial_leaf_tree_returns_same_context_repeatedly() {
        let mut tree = ManiacTree {
            nodes: vec![ManiacNode::default()],
            leaves: Vec::new(),
        };
        let a = find_leaf(&mut tree, &[]);
        let b = find_leaf(&mut tree, &[]);
        assert_eq!(a, b);
    }
}
