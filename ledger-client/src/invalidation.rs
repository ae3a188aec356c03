//! Which cached views a write dirties.
//!
//! One row per [`MutationKind`]. The rule for adding a row: dirty every view
//! whose displayed numbers could change. Balances are computed by the server,
//! so a write to an expense reaches all the way up to the user's totals.
use std::collections::BTreeSet;

use crate::cache::{CacheKey, EXPENSES, GROUPS, ITEMS, USER_INFO, USERS};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MutationKind {
    CreateGroup,
    DeleteGroup,
    AddMember,
    CreateExpense,
    UpdateExpense,
    DeleteExpense,
    FinalizeExpense,
    AddItem,
    UpdateItem,
    DeleteItem,
    UpdateProfile,
}

impl MutationKind {
    pub const ALL: [MutationKind; 11] = [
        MutationKind::CreateGroup,
        MutationKind::DeleteGroup,
        MutationKind::AddMember,
        MutationKind::CreateExpense,
        MutationKind::UpdateExpense,
        MutationKind::DeleteExpense,
        MutationKind::FinalizeExpense,
        MutationKind::AddItem,
        MutationKind::UpdateItem,
        MutationKind::DeleteItem,
        MutationKind::UpdateProfile,
    ];
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AffectedIds {
    pub group_id: Option<String>,
    pub expense_id: Option<String>,
    pub item_id: Option<String>,
}

/// Describes one write. Built per call, consumed by the mutation coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationDescriptor {
    pub kind: MutationKind,
    pub affected: AffectedIds,
}

impl MutationDescriptor {
    pub fn new(kind: MutationKind) -> Self {
        Self {
            kind,
            affected: AffectedIds::default(),
        }
    }

    pub fn group(mut self, id: impl Into<String>) -> Self {
        self.affected.group_id = Some(id.into());
        self
    }

    pub fn expense(mut self, id: impl Into<String>) -> Self {
        self.affected.expense_id = Some(id.into());
        self
    }

    pub fn item(mut self, id: impl Into<String>) -> Self {
        self.affected.item_id = Some(id.into());
        self
    }
}

#[derive(Clone, Copy, Debug)]
enum Id {
    Group,
    Expense,
    Item,
}

/// A row entry: a collection root, optionally narrowed to one id.
#[derive(Clone, Copy, Debug)]
struct Pattern {
    root: &'static str,
    id: Option<Id>,
}

const fn all(root: &'static str) -> Pattern {
    Pattern { root, id: None }
}

const fn one(root: &'static str, id: Id) -> Pattern {
    Pattern { root, id: Some(id) }
}

const EXPENSE_WRITE: &[Pattern] = &[
    all(EXPENSES),
    one(GROUPS, Id::Group),
    all(GROUPS),
    all(USER_INFO),
];

const ITEM_WRITE: &[Pattern] = &[one(EXPENSES, Id::Expense), one(ITEMS, Id::Item)];

const GROUP_WRITE: &[Pattern] = &[all(GROUPS), one(GROUPS, Id::Group), all(USER_INFO)];

// the group's expenses go away with it
const GROUP_DELETE: &[Pattern] = &[
    all(GROUPS),
    one(GROUPS, Id::Group),
    all(USER_INFO),
    all(EXPENSES),
];

const PROFILE_WRITE: &[Pattern] = &[all(USER_INFO), all(USERS)];

#[derive(Clone, Copy, Debug, Default)]
pub struct InvalidationGraph;

impl InvalidationGraph {
    fn row(kind: MutationKind) -> &'static [Pattern] {
        match kind {
            MutationKind::CreateExpense
            | MutationKind::UpdateExpense
            | MutationKind::DeleteExpense
            | MutationKind::FinalizeExpense => EXPENSE_WRITE,
            MutationKind::AddItem | MutationKind::UpdateItem | MutationKind::DeleteItem => {
                ITEM_WRITE
            }
            MutationKind::CreateGroup | MutationKind::AddMember => GROUP_WRITE,
            MutationKind::DeleteGroup => GROUP_DELETE,
            MutationKind::UpdateProfile => PROFILE_WRITE,
        }
    }

    /// Concrete keys to invalidate for `descriptor`, deduplicated.
    ///
    /// Keys match by prefix, so a key already covered by a shorter one in the
    /// set is dropped. A pattern that needs an id the descriptor lacks widens
    /// to its whole collection rather than being skipped.
    pub fn resolve(&self, descriptor: &MutationDescriptor) -> BTreeSet<CacheKey> {
        let affected = &descriptor.affected;
        let keys: BTreeSet<CacheKey> = Self::row(descriptor.kind)
            .iter()
            .map(|pattern| {
                let root = CacheKey::root(pattern.root);
                let id = pattern.id.and_then(|id| match id {
                    Id::Group => affected.group_id.as_deref(),
                    Id::Expense => affected.expense_id.as_deref(),
                    Id::Item => affected.item_id.as_deref(),
                });
                match id {
                    Some(id) => root.child(id),
                    None => root,
                }
            })
            .collect();

        keys.iter()
            .filter(|key| {
                !keys
                    .iter()
                    .any(|other| other != *key && key.starts_with(other))
            })
            .cloned()
            .collect()
    }
}
