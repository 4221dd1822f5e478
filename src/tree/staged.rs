use std::collections::HashMap;

use super::NodeStore;
use super::TreeRead;
use super::TreeWrite;
use super::Znode;

/// Dry-run view over a [`NodeStore`].
///
/// Writes land in a private change set (`None` marks a removal) and reads
/// consult that change set first, so later ops of a batch observe the
/// effects of earlier ones while the base tree stays untouched.
#[derive(Debug)]
pub(crate) struct StagedTree<'a> {
    base: &'a NodeStore,
    changes: HashMap<String, Option<Znode>>,
}

impl<'a> StagedTree<'a> {
    pub(crate) fn new(base: &'a NodeStore) -> Self {
        Self {
            base,
            changes: HashMap::new(),
        }
    }
}

impl TreeRead for StagedTree<'_> {
    fn node(
        &self,
        path: &str,
    ) -> Option<&Znode> {
        match self.changes.get(path) {
            Some(staged) => staged.as_ref(),
            None => self.base.node(path),
        }
    }

    fn max_data_bytes(&self) -> usize {
        self.base.max_data_bytes()
    }
}

impl TreeWrite for StagedTree<'_> {
    fn put_node(
        &mut self,
        path: String,
        node: Znode,
    ) {
        self.changes.insert(path, Some(node));
    }

    fn remove_node(
        &mut self,
        path: &str,
    ) {
        self.changes.insert(path.to_string(), None);
    }
}
