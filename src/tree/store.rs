//! NodeStore
//!
//! Owns the znode tree as a single ordered map from path to node record.
//! Parent/child relationships are never stored as links: a node's children
//! are the keys directly under its path prefix, and `num_children`/`cversion`
//! in the parent's [`Stat`] are kept in step on every create and delete.
//!
//! Every mutating operation is split in two:
//!
//! 1. `plan_*` evaluates the rules against a [`TreeRead`] view and produces a
//!    fully computed [`Mutation`] (or a [`KeeperError`]).
//! 2. [`TreeWrite::apply`] writes that mutation.
//!
//! The live [`NodeStore`] and the dry-run [`StagedTree`](super::StagedTree)
//! both implement [`TreeWrite`], so validation and commit go through the very
//! same rule code.

use std::collections::BTreeMap;
use std::ops::Bound;

use bytes::Bytes;
use tracing::trace;

use super::path::child_prefix;
use super::path::parent_of;
use super::path::validate_path;
use super::CreateMode;
use super::StagedTree;
use super::Stat;
use super::Znode;
use crate::constants::ANY_VERSION;
use crate::constants::ROOT_PATH;
use crate::constants::SEQUENTIAL_SUFFIX_WIDTH;
use crate::txn::TxnHeader;
use crate::KeeperError;

/// Read access shared by the live tree and the dry-run overlay.
pub trait TreeRead {
    fn node(
        &self,
        path: &str,
    ) -> Option<&Znode>;

    /// Largest accepted payload in bytes
    fn max_data_bytes(&self) -> usize;
}

/// Write access; the default methods are the only way nodes change.
pub(crate) trait TreeWrite: TreeRead {
    fn put_node(
        &mut self,
        path: String,
        node: Znode,
    );

    fn remove_node(
        &mut self,
        path: &str,
    );

    fn apply(
        &mut self,
        mutation: &Mutation,
    ) {
        match mutation {
            Mutation::Create {
                path,
                node,
                parent_path,
                parent,
            } => {
                self.put_node(parent_path.clone(), parent.clone());
                self.put_node(path.clone(), node.clone());
            }
            Mutation::SetData { path, node } => {
                self.put_node(path.clone(), node.clone());
            }
            Mutation::Delete {
                path,
                parent_path,
                parent,
                ..
            } => {
                self.remove_node(path);
                self.put_node(parent_path.clone(), parent.clone());
            }
            Mutation::Check { .. } => {}
        }
    }

    fn create(
        &mut self,
        header: &TxnHeader,
        path: &str,
        data: Bytes,
        mode: CreateMode,
    ) -> Result<Mutation, KeeperError> {
        let mutation = plan_create(self, header, path, data, mode)?;
        self.apply(&mutation);
        Ok(mutation)
    }

    fn set_data(
        &mut self,
        header: &TxnHeader,
        path: &str,
        data: Bytes,
        expected_version: i32,
    ) -> Result<Mutation, KeeperError> {
        let mutation = plan_set_data(self, header, path, data, expected_version)?;
        self.apply(&mutation);
        Ok(mutation)
    }

    fn delete(
        &mut self,
        header: &TxnHeader,
        path: &str,
        expected_version: i32,
    ) -> Result<Mutation, KeeperError> {
        let mutation = plan_delete(self, header, path, expected_version)?;
        self.apply(&mutation);
        Ok(mutation)
    }

    fn check(
        &mut self,
        path: &str,
        expected_version: i32,
    ) -> Result<Mutation, KeeperError> {
        plan_check(self, path, expected_version)
    }
}

/// A validated change, ready to be written.
///
/// Carries the complete post-images of every node it touches so that
/// applying it needs no further rule evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Create {
        /// Actual path (sequential suffix included)
        path: String,
        node: Znode,
        parent_path: String,
        parent: Znode,
    },
    SetData {
        path: String,
        node: Znode,
    },
    Delete {
        path: String,
        /// Pre-image of the removed node
        removed: Znode,
        parent_path: String,
        parent: Znode,
    },
    Check {
        path: String,
        stat: Stat,
    },
}

impl Mutation {
    pub fn path(&self) -> &str {
        match self {
            Mutation::Create { path, .. }
            | Mutation::SetData { path, .. }
            | Mutation::Delete { path, .. }
            | Mutation::Check { path, .. } => path,
        }
    }

    /// Stat of the target after the mutation (`None` once deleted).
    pub fn stat(&self) -> Option<Stat> {
        match self {
            Mutation::Create { node, .. } | Mutation::SetData { node, .. } => Some(node.stat),
            Mutation::Check { stat, .. } => Some(*stat),
            Mutation::Delete { .. } => None,
        }
    }
}

fn check_version(
    path: &str,
    current: &Stat,
    expected: i32,
) -> Result<(), KeeperError> {
    if expected != ANY_VERSION && expected != current.version {
        return Err(KeeperError::BadVersion {
            path: path.to_string(),
            expected,
            actual: current.version,
        });
    }
    Ok(())
}

fn check_data_len(
    view: &(impl TreeRead + ?Sized),
    path: &str,
    data: &Bytes,
) -> Result<(), KeeperError> {
    let limit = view.max_data_bytes();
    if data.len() > limit {
        return Err(KeeperError::DataTooLarge {
            path: path.to_string(),
            len: data.len(),
            limit,
        });
    }
    Ok(())
}

fn lookup<'a>(
    view: &'a (impl TreeRead + ?Sized),
    path: &str,
) -> Result<&'a Znode, KeeperError> {
    view.node(path).ok_or_else(|| KeeperError::NoNode {
        path: path.to_string(),
    })
}

pub(crate) fn plan_create(
    view: &(impl TreeRead + ?Sized),
    header: &TxnHeader,
    path: &str,
    data: Bytes,
    mode: CreateMode,
) -> Result<Mutation, KeeperError> {
    validate_path(path)?;
    check_data_len(view, path, &data)?;

    let Some(parent_path) = parent_of(path) else {
        return Err(KeeperError::NodeExists {
            path: path.to_string(),
        });
    };
    let parent = view.node(parent_path).ok_or_else(|| KeeperError::NoParent {
        path: path.to_string(),
    })?;
    if parent.is_ephemeral() {
        return Err(KeeperError::ParentIsEphemeral {
            path: path.to_string(),
            parent: parent_path.to_string(),
        });
    }

    let actual_path = if mode.is_sequential() {
        format!(
            "{path}{:0width$}",
            parent.stat.cversion,
            width = SEQUENTIAL_SUFFIX_WIDTH
        )
    } else {
        path.to_string()
    };
    if view.node(&actual_path).is_some() {
        return Err(KeeperError::NodeExists { path: actual_path });
    }

    let owner = mode.is_ephemeral().then_some(header.session_id);
    let node = Znode::new(data, mode, owner, header.zxid, header.time);

    let mut parent = parent.clone();
    parent.stat.cversion = parent.stat.cversion.wrapping_add(1);
    parent.stat.num_children += 1;
    parent.stat.pzxid = header.zxid;

    Ok(Mutation::Create {
        path: actual_path,
        node,
        parent_path: parent_path.to_string(),
        parent,
    })
}

pub(crate) fn plan_set_data(
    view: &(impl TreeRead + ?Sized),
    header: &TxnHeader,
    path: &str,
    data: Bytes,
    expected_version: i32,
) -> Result<Mutation, KeeperError> {
    validate_path(path)?;
    let current = lookup(view, path)?;
    check_version(path, &current.stat, expected_version)?;
    check_data_len(view, path, &data)?;

    let mut node = current.clone();
    node.stat.version = node.stat.version.wrapping_add(1);
    node.stat.mzxid = header.zxid;
    node.stat.mtime = header.time;
    node.stat.data_length = data.len() as u32;
    node.data = data;

    Ok(Mutation::SetData {
        path: path.to_string(),
        node,
    })
}

pub(crate) fn plan_delete(
    view: &(impl TreeRead + ?Sized),
    header: &TxnHeader,
    path: &str,
    expected_version: i32,
) -> Result<Mutation, KeeperError> {
    validate_path(path)?;
    let Some(parent_path) = parent_of(path) else {
        return Err(KeeperError::BadArguments("the root node cannot be deleted".into()));
    };
    let current = lookup(view, path)?;
    check_version(path, &current.stat, expected_version)?;
    if current.stat.num_children > 0 {
        return Err(KeeperError::NotEmpty {
            path: path.to_string(),
        });
    }

    let mut parent = lookup(view, parent_path)?.clone();
    parent.stat.cversion = parent.stat.cversion.wrapping_add(1);
    parent.stat.num_children = parent.stat.num_children.saturating_sub(1);
    parent.stat.pzxid = header.zxid;

    Ok(Mutation::Delete {
        path: path.to_string(),
        removed: current.clone(),
        parent_path: parent_path.to_string(),
        parent,
    })
}

pub(crate) fn plan_check(
    view: &(impl TreeRead + ?Sized),
    path: &str,
    expected_version: i32,
) -> Result<Mutation, KeeperError> {
    validate_path(path)?;
    let current = lookup(view, path)?;
    check_version(path, &current.stat, expected_version)?;
    Ok(Mutation::Check {
        path: path.to_string(),
        stat: current.stat,
    })
}

/// The authoritative znode tree.
#[derive(Debug)]
pub struct NodeStore {
    nodes: BTreeMap<String, Znode>,
    max_data_bytes: usize,
}

impl NodeStore {
    pub fn new(max_data_bytes: usize) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(ROOT_PATH.to_string(), Znode::root());
        Self {
            nodes,
            // data_length is a u32
            max_data_bytes: max_data_bytes.min(u32::MAX as usize),
        }
    }

    /// Copy-on-write overlay for validating a batch without touching the tree.
    pub(crate) fn dry_run(&self) -> StagedTree<'_> {
        StagedTree::new(self)
    }

    pub fn exists(
        &self,
        path: &str,
    ) -> Result<Option<&Znode>, KeeperError> {
        validate_path(path)?;
        Ok(self.nodes.get(path))
    }

    pub fn get_data(
        &self,
        path: &str,
    ) -> Result<(Bytes, Stat), KeeperError> {
        validate_path(path)?;
        let node = lookup(self, path)?;
        Ok((node.data.clone(), node.stat))
    }

    /// Sorted child names, derived by prefix lookup.
    pub fn get_children(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, Stat), KeeperError> {
        validate_path(path)?;
        let node = lookup(self, path)?;
        let prefix = child_prefix(path);

        let children = self
            .nodes
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(&prefix))
            .map(|key| &key[prefix.len()..])
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .collect();

        Ok((children, node.stat))
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// The root is always present, so the tree is never empty.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl TreeRead for NodeStore {
    fn node(
        &self,
        path: &str,
    ) -> Option<&Znode> {
        self.nodes.get(path)
    }

    fn max_data_bytes(&self) -> usize {
        self.max_data_bytes
    }
}

impl TreeWrite for NodeStore {
    fn put_node(
        &mut self,
        path: String,
        node: Znode,
    ) {
        trace!(%path, version = node.stat.version, "Znode written");
        self.nodes.insert(path, node);
    }

    fn remove_node(
        &mut self,
        path: &str,
    ) {
        trace!(%path, "Znode removed");
        self.nodes.remove(path);
    }
}
