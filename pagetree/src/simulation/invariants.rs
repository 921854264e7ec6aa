//! Structural invariant checking for B-trees.
//!
//! `check_tree` walks every node (loading any that are not cached yet) and
//! reports each broken invariant instead of stopping at the first one.

use crate::storage::btree::{BTree, BTreeError, MAX_ENTRIES, Node};
use crate::storage::{PageOffset, Storage};

/// A detected invariant violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    /// Offset of the offending node, if it has one.
    pub offset: Option<PageOffset>,
    /// Height at which the node was reached.
    pub height: u32,
    /// Human-readable description of the violation.
    pub message: String,
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "node {:?} at height {}: {}",
            self.offset, self.height, self.message
        )
    }
}

/// Key range a subtree must stay inside: `lower <= key < upper`.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    lower: Option<i32>,
    upper: Option<i32>,
}

impl Bounds {
    const UNBOUNDED: Self = Self {
        lower: None,
        upper: None,
    };

    fn contains(self, key: i32) -> bool {
        self.lower.is_none_or(|lower| key >= lower) && self.upper.is_none_or(|upper| key < upper)
    }
}

struct Checker {
    violations: Vec<InvariantViolation>,
    leaf_keys: u64,
}

impl Checker {
    fn report(&mut self, node: &Node, height: u32, message: String) {
        self.violations.push(InvariantViolation {
            offset: node.offset(),
            height,
            message,
        });
    }

    fn check_node<S: Storage>(
        &mut self,
        storage: &mut S,
        node: &mut Node,
        height: u32,
        bounds: Bounds,
        is_root: bool,
    ) -> Result<(), BTreeError> {
        if node.len() >= MAX_ENTRIES {
            self.report(
                node,
                height,
                format!("holds {} entries (splits at {MAX_ENTRIES})", node.len()),
            );
        }
        if node.offset().is_none() {
            self.report(node, height, "was never saved".to_string());
        }
        if node.is_empty() {
            if !is_root || height > 0 {
                self.report(node, height, "is empty".to_string());
            }
            return Ok(());
        }

        // The first entry of an internal node never takes part in routing,
        // so its key is not ordered against the others.
        let ordered_from = usize::from(height > 0);
        let keys: Vec<i32> = node.entries()[ordered_from..]
            .iter()
            .map(|e| e.key)
            .collect();
        if keys.windows(2).any(|pair| pair[0] >= pair[1]) {
            self.report(node, height, format!("keys out of order: {keys:?}"));
        }
        if let Some(&key) = keys.iter().find(|&&key| !bounds.contains(key)) {
            self.report(node, height, format!("key {key} outside {bounds:?}"));
        }

        if height == 0 {
            for entry in node.entries() {
                if entry.child_offset.is_some() {
                    self.report(
                        node,
                        height,
                        format!("leaf entry {} has a child offset", entry.key),
                    );
                }
            }
            self.leaf_keys += node.len() as u64;
            return Ok(());
        }

        for index in 0..node.len() {
            let child_bounds = Bounds {
                lower: if index == 0 {
                    bounds.lower
                } else {
                    Some(node.entries()[index].key)
                },
                upper: node
                    .entries()
                    .get(index + 1)
                    .map_or(bounds.upper, |next| Some(next.key)),
            };

            let Some(entry) = node.entry_mut(index) else {
                break;
            };
            if entry.value.is_some() {
                let message = format!("internal entry {} carries a value", entry.key);
                self.report(node, height, message);
                continue;
            }
            let recorded = entry.child_offset;
            let child = entry.resolve(storage)?;
            if child.offset() != recorded {
                let message = format!(
                    "cached child offset {:?} does not match recorded {recorded:?}",
                    child.offset()
                );
                self.violations.push(InvariantViolation {
                    offset: child.offset(),
                    height: height - 1,
                    message,
                });
            }
            self.check_node(storage, child, height - 1, child_bounds, false)?;
        }

        Ok(())
    }
}

/// Check every structural invariant of `tree`.
///
/// Returns the list of violations; an empty list means the tree is sound.
/// Errors only if a node cannot be loaded.
pub fn check_tree<S: Storage>(
    tree: &mut BTree<S>,
) -> Result<Vec<InvariantViolation>, BTreeError> {
    let (storage, root, header) = tree.parts_mut();
    let mut checker = Checker {
        violations: Vec::new(),
        leaf_keys: 0,
    };

    checker.check_node(storage, root, header.height, Bounds::UNBOUNDED, true)?;

    if checker.leaf_keys != u64::from(header.count) {
        checker.violations.push(InvariantViolation {
            offset: Some(header.root_offset),
            height: header.height,
            message: format!(
                "header count {} but leaves hold {} keys",
                header.count, checker.leaf_keys
            ),
        });
    }
    if root.offset() != Some(header.root_offset) {
        checker.violations.push(InvariantViolation {
            offset: root.offset(),
            height: header.height,
            message: format!("header points at root {}", header.root_offset),
        });
    }

    Ok(checker.violations)
}
