//! Constraint definitions for Tabula table schemas.
//!
//! Constraints refer to columns by ordinal. A constraint installed on behalf
//! of a relation records the relation's id in [`Constraint::installer`] so
//! that removing the relation removes exactly the constraints it created.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

static NEXT_CONSTRAINT_ID: AtomicU32 = AtomicU32::new(1);

/// Gets the next unique constraint ID.
pub fn next_constraint_id() -> ConstraintId {
    ConstraintId(NEXT_CONSTRAINT_ID.fetch_add(1, Ordering::SeqCst))
}

/// Identifier of a table within a data set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

/// Identifier of a relation within a data set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationId(pub u32);

/// Identifier of a constraint within a data set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Action applied to child rows when a parent key is deleted or changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Rule {
    /// Delete or update the child rows along with the parent.
    #[default]
    Cascade,
    /// Set the child key columns to null.
    SetNull,
    /// Set the child key columns to their default values.
    SetDefault,
    /// Reject the change while child rows exist.
    None,
}

/// Whether accepting or rejecting a parent row does the same to its children.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum AcceptRejectRule {
    #[default]
    None,
    Cascade,
}

/// No two live rows may share a non-null tuple on `columns`.
#[derive(Clone, Debug, PartialEq)]
pub struct UniqueConstraint {
    pub name: String,
    pub columns: Vec<usize>,
    pub is_primary_key: bool,
}

/// Every non-null child tuple must match a live parent tuple.
#[derive(Clone, Debug, PartialEq)]
pub struct ForeignKeyConstraint {
    pub name: String,
    pub parent_table: TableId,
    pub parent_columns: Vec<usize>,
    pub child_columns: Vec<usize>,
    pub delete_rule: Rule,
    pub update_rule: Rule,
    pub accept_reject_rule: AcceptRejectRule,
}

impl ForeignKeyConstraint {
    /// Shifts parent column ordinals after a parent column is dropped.
    pub fn shift_parent_columns(&mut self, removed: usize) {
        for c in self.parent_columns.iter_mut() {
            if *c > removed {
                *c -= 1;
            }
        }
    }
}

/// The invariant a constraint enforces.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstraintKind {
    Unique(UniqueConstraint),
    ForeignKey(ForeignKeyConstraint),
}

/// A constraint owned by one table.
#[derive(Clone, Debug, PartialEq)]
pub struct Constraint {
    pub id: ConstraintId,
    pub kind: ConstraintKind,
    /// The relation that installed this constraint, if any.
    pub installer: Option<RelationId>,
}

impl Constraint {
    /// Returns the constraint name.
    pub fn name(&self) -> &str {
        match &self.kind {
            ConstraintKind::Unique(u) => &u.name,
            ConstraintKind::ForeignKey(fk) => &fk.name,
        }
    }

    /// Returns the unique definition, if this is a unique constraint.
    pub fn as_unique(&self) -> Option<&UniqueConstraint> {
        match &self.kind {
            ConstraintKind::Unique(u) => Some(u),
            _ => None,
        }
    }

    /// Returns the foreign key definition, if this is a foreign key.
    pub fn as_foreign_key(&self) -> Option<&ForeignKeyConstraint> {
        match &self.kind {
            ConstraintKind::ForeignKey(fk) => Some(fk),
            _ => None,
        }
    }

    /// Returns the local columns the constraint covers.
    pub fn columns(&self) -> &[usize] {
        match &self.kind {
            ConstraintKind::Unique(u) => &u.columns,
            ConstraintKind::ForeignKey(fk) => &fk.child_columns,
        }
    }

    /// Shifts column ordinals after the column at `removed` is dropped.
    pub fn shift_columns(&mut self, removed: usize) {
        let shift = |cols: &mut Vec<usize>| {
            for c in cols.iter_mut() {
                if *c > removed {
                    *c -= 1;
                }
            }
        };
        match &mut self.kind {
            ConstraintKind::Unique(u) => shift(&mut u.columns),
            ConstraintKind::ForeignKey(fk) => shift(&mut fk.child_columns),
        }
    }
}

/// Returns true if both ordinal lists name the same set of columns.
pub fn same_columns(a: &[usize], b: &[usize]) -> bool {
    a.len() == b.len() && a.iter().all(|c| b.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_default_rules() {
        assert_eq!(Rule::default(), Rule::Cascade);
        assert_eq!(AcceptRejectRule::default(), AcceptRejectRule::None);
    }

    #[test]
    fn test_shift_columns() {
        let mut c = Constraint {
            id: ConstraintId(1),
            kind: ConstraintKind::Unique(UniqueConstraint {
                name: "uq".into(),
                columns: vec![0, 2, 3],
                is_primary_key: false,
            }),
            installer: None,
        };
        c.shift_columns(1);
        assert_eq!(c.columns(), &[0, 1, 2]);
        assert_eq!(c.name(), "uq");
        assert!(c.as_foreign_key().is_none());
    }

    #[test]
    fn test_same_columns() {
        assert!(same_columns(&[1, 2], &[2, 1]));
        assert!(!same_columns(&[1, 2], &[1]));
        assert!(!same_columns(&[1, 2], &[1, 3]));
    }
}
