//! Parent/child relations between tables.
//!
//! A [`Relation`] pairs column lists of two tables. It may install a unique
//! constraint on the parent side and a foreign key on the child side; the
//! ids of what it installed are kept so that removing the relation removes
//! exactly those constraints.

use alloc::string::String;
use alloc::vec::Vec;
use tabula_core::schema::{AcceptRejectRule, ConstraintId, RelationId, Rule, TableId};

/// A named pairing of parent and child columns.
#[derive(Clone, Debug, PartialEq)]
pub struct Relation {
    pub(crate) id: RelationId,
    pub(crate) name: String,
    pub(crate) parent_table: TableId,
    pub(crate) parent_columns: Vec<usize>,
    pub(crate) child_table: TableId,
    pub(crate) child_columns: Vec<usize>,
    pub(crate) nested: bool,
    /// Unique constraint on the parent side, if any.
    pub(crate) parent_key: Option<ConstraintId>,
    /// Foreign key on the child side, if any.
    pub(crate) foreign_key: Option<ConstraintId>,
}

impl Relation {
    #[inline]
    pub fn id(&self) -> RelationId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn parent_table(&self) -> TableId {
        self.parent_table
    }

    #[inline]
    pub fn parent_columns(&self) -> &[usize] {
        &self.parent_columns
    }

    #[inline]
    pub fn child_table(&self) -> TableId {
        self.child_table
    }

    #[inline]
    pub fn child_columns(&self) -> &[usize] {
        &self.child_columns
    }

    /// Serialization hint only.
    #[inline]
    pub fn is_nested(&self) -> bool {
        self.nested
    }

    #[inline]
    pub fn parent_key(&self) -> Option<ConstraintId> {
        self.parent_key
    }

    #[inline]
    pub fn foreign_key(&self) -> Option<ConstraintId> {
        self.foreign_key
    }

    /// Returns true if the relation covers `column` of `table` on either side.
    pub fn uses_column(&self, table: TableId, column: usize) -> bool {
        (self.parent_table == table && self.parent_columns.contains(&column))
            || (self.child_table == table && self.child_columns.contains(&column))
    }

    pub(crate) fn shift_columns(&mut self, table: TableId, removed: usize) {
        let shift = |cols: &mut Vec<usize>| {
            for c in cols.iter_mut() {
                if *c > removed {
                    *c -= 1;
                }
            }
        };
        if self.parent_table == table {
            shift(&mut self.parent_columns);
        }
        if self.child_table == table {
            shift(&mut self.child_columns);
        }
    }
}

/// Definition of a relation to add, by table and column name.
#[derive(Clone, Debug)]
pub struct RelationDef {
    pub(crate) name: String,
    pub(crate) parent_table: String,
    pub(crate) parent_columns: Vec<String>,
    pub(crate) child_table: String,
    pub(crate) child_columns: Vec<String>,
    pub(crate) nested: bool,
}

impl RelationDef {
    /// Creates a definition. An empty name is replaced by `Relation{n}`.
    pub fn new(
        name: impl Into<String>,
        parent_table: impl Into<String>,
        parent_columns: &[&str],
        child_table: impl Into<String>,
        child_columns: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            parent_table: parent_table.into(),
            parent_columns: parent_columns.iter().map(|c| String::from(*c)).collect(),
            child_table: child_table.into(),
            child_columns: child_columns.iter().map(|c| String::from(*c)).collect(),
            nested: false,
        }
    }

    pub fn nested(mut self, nested: bool) -> Self {
        self.nested = nested;
        self
    }
}

/// Definition of a foreign key to add, by table and column name.
#[derive(Clone, Debug)]
pub struct ForeignKeyDef {
    pub(crate) name: String,
    pub(crate) parent_table: String,
    pub(crate) parent_columns: Vec<String>,
    pub(crate) child_table: String,
    pub(crate) child_columns: Vec<String>,
    pub(crate) delete_rule: Rule,
    pub(crate) update_rule: Rule,
    pub(crate) accept_reject_rule: AcceptRejectRule,
}

impl ForeignKeyDef {
    /// Creates a definition with cascading delete and update rules. An
    /// empty name is replaced by `Constraint{n}`.
    pub fn new(
        name: impl Into<String>,
        parent_table: impl Into<String>,
        parent_columns: &[&str],
        child_table: impl Into<String>,
        child_columns: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            parent_table: parent_table.into(),
            parent_columns: parent_columns.iter().map(|c| String::from(*c)).collect(),
            child_table: child_table.into(),
            child_columns: child_columns.iter().map(|c| String::from(*c)).collect(),
            delete_rule: Rule::default(),
            update_rule: Rule::default(),
            accept_reject_rule: AcceptRejectRule::default(),
        }
    }

    pub fn delete_rule(mut self, rule: Rule) -> Self {
        self.delete_rule = rule;
        self
    }

    pub fn update_rule(mut self, rule: Rule) -> Self {
        self.update_rule = rule;
        self
    }

    pub fn accept_reject_rule(mut self, rule: AcceptRejectRule) -> Self {
        self.accept_reject_rule = rule;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn relation() -> Relation {
        Relation {
            id: RelationId(1),
            name: "r".into(),
            parent_table: TableId(1),
            parent_columns: vec![0, 2],
            child_table: TableId(2),
            child_columns: vec![3],
            nested: false,
            parent_key: None,
            foreign_key: None,
        }
    }

    #[test]
    fn test_uses_column() {
        let r = relation();
        assert!(r.uses_column(TableId(1), 2));
        assert!(!r.uses_column(TableId(1), 3));
        assert!(r.uses_column(TableId(2), 3));
    }

    #[test]
    fn test_shift_columns() {
        let mut r = relation();
        r.shift_columns(TableId(1), 1);
        assert_eq!(r.parent_columns(), &[0, 1]);
        assert_eq!(r.child_columns(), &[3]);
    }

    #[test]
    fn test_fk_def_defaults() {
        let def = ForeignKeyDef::new("", "p", &["id"], "c", &["pid"]).delete_rule(Rule::None);
        assert_eq!(def.delete_rule, Rule::None);
        assert_eq!(def.update_rule, Rule::Cascade);
        assert_eq!(def.accept_reject_rule, AcceptRejectRule::None);
    }
}
