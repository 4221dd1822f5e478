//! TransactionCoordinator
//!
//! Two-phase, all-or-nothing execution of an op batch:
//!
//! 1. **prepare**: every op is evaluated in order on a dry-run overlay of the
//!    tree, so op `n` sees the effects of ops `0..n`. The first failure aborts
//!    the batch and the overlay is dropped.
//! 2. **commit**: the prepared mutations are written to the live tree in
//!    order. Each already carries its complete post-image, so commit cannot
//!    fail and never re-evaluates a rule.
//!
//! The caller owns the serialization point; nothing here locks.

use tracing::debug;

use super::OpResult;
use super::Operation;
use super::TxnHeader;
use crate::tree::Mutation;
use crate::tree::NodeStore;
use crate::tree::TreeWrite;
use crate::KeeperError;
use crate::TransactionAborted;

#[derive(Debug, Default, Clone, Copy)]
pub struct TransactionCoordinator;

impl TransactionCoordinator {
    /// Run one op against any tree view; the view is updated on success.
    pub(crate) fn execute<T: TreeWrite + ?Sized>(
        tree: &mut T,
        header: &TxnHeader,
        op: &Operation,
    ) -> Result<Mutation, KeeperError> {
        match op {
            Operation::Create { path, data, mode } => tree.create(header, path, data.clone(), *mode),
            Operation::SetData { path, data, version } => tree.set_data(header, path, data.clone(), *version),
            Operation::Delete { path, version } => tree.delete(header, path, *version),
            Operation::Check { path, version } => tree.check(path, *version),
        }
    }

    /// Validate the whole batch without touching `store`.
    pub fn prepare(
        store: &NodeStore,
        header: &TxnHeader,
        ops: &[Operation],
    ) -> Result<Vec<Mutation>, TransactionAborted> {
        let mut staged = store.dry_run();
        let mut mutations = Vec::with_capacity(ops.len());

        for (index, op) in ops.iter().enumerate() {
            match Self::execute(&mut staged, header, op) {
                Ok(mutation) => mutations.push(mutation),
                Err(error) => {
                    debug!(
                        index,
                        op = op.kind(),
                        path = op.path(),
                        %error,
                        "Transaction rejected during validation"
                    );
                    return Err(Self::abort(ops.len(), index, error));
                }
            }
        }
        Ok(mutations)
    }

    /// Write prepared mutations to the live tree, in order.
    pub fn commit(
        store: &mut NodeStore,
        mutations: &[Mutation],
    ) {
        for mutation in mutations {
            store.apply(mutation);
        }
    }

    /// `prepare` then `commit`. On error the store is unchanged.
    pub fn multi(
        store: &mut NodeStore,
        header: &TxnHeader,
        ops: &[Operation],
    ) -> Result<Vec<Mutation>, TransactionAborted> {
        let mutations = Self::prepare(store, header, ops)?;
        Self::commit(store, &mutations);
        Ok(mutations)
    }

    /// Per-op status list for a batch that failed at `index`.
    fn abort(
        len: usize,
        index: usize,
        error: KeeperError,
    ) -> TransactionAborted {
        let results = (0..len)
            .map(|i| {
                if i == index {
                    OpResult::Error { error: error.clone() }
                } else {
                    OpResult::Aborted
                }
            })
            .collect();
        TransactionAborted {
            index,
            error,
            results,
        }
    }
}
