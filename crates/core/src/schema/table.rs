//! Table schema definition for Tabula.

use super::column::Column;
use super::constraint::{
    next_constraint_id, same_columns, Constraint, ConstraintId, ConstraintKind,
    ForeignKeyConstraint, UniqueConstraint,
};
use crate::error::{Error, Result};
use crate::types::DataType;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// Returns true if two names are equal under the given case rule.
pub fn names_match(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.chars()
            .flat_map(char::to_lowercase)
            .eq(b.chars().flat_map(char::to_lowercase))
    }
}

/// Shape of a table: its columns and the constraints it owns.
#[derive(Clone, Debug)]
pub struct TableSchema {
    /// Table name.
    name: String,
    /// Column definitions, indexed by ordinal.
    columns: Vec<Column>,
    /// Unique and foreign key constraints.
    constraints: Vec<Constraint>,
    /// The unique constraint flagged as primary key.
    primary_key: Option<ConstraintId>,
}

impl TableSchema {
    /// Creates an empty schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            constraints: Vec::new(),
            primary_key: None,
        }
    }

    /// Returns the table name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Returns the columns.
    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the column at `ordinal`.
    #[inline]
    pub fn column(&self, ordinal: usize) -> Option<&Column> {
        self.columns.get(ordinal)
    }

    pub fn column_mut(&mut self, ordinal: usize) -> Option<&mut Column> {
        self.columns.get_mut(ordinal)
    }

    /// Returns the number of columns.
    #[inline]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Finds a column by name.
    ///
    /// An exact match wins; otherwise a single case-insensitive match is
    /// accepted. Several case-insensitive matches count as no match.
    pub fn find_column(&self, name: &str) -> Option<usize> {
        if let Some(i) = self.columns.iter().position(|c| c.name() == name) {
            return Some(i);
        }
        let mut found = None;
        for (i, c) in self.columns.iter().enumerate() {
            if names_match(c.name(), name, false) {
                if found.is_some() {
                    return None;
                }
                found = Some(i);
            }
        }
        found
    }

    /// Returns the ordinal of a column whose name collides with `name`.
    pub fn conflicting_column(&self, name: &str, case_sensitive: bool) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| names_match(c.name(), name, case_sensitive))
    }

    /// Resolves a column name or fails with `ColumnNotFound`.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.find_column(name)
            .ok_or_else(|| Error::column_not_found(&self.name, name))
    }

    /// Appends a column, assigning its ordinal.
    pub fn push_column(&mut self, mut column: Column) -> usize {
        let ordinal = self.columns.len();
        column.set_ordinal(ordinal);
        self.columns.push(column);
        ordinal
    }

    /// Removes a column and renumbers everything that follows it.
    pub fn remove_column(&mut self, ordinal: usize) -> Option<Column> {
        if ordinal >= self.columns.len() {
            return None;
        }
        let removed = self.columns.remove(ordinal);
        for (i, c) in self.columns.iter_mut().enumerate() {
            c.set_ordinal(i);
        }
        for c in &mut self.constraints {
            c.shift_columns(ordinal);
        }
        Some(removed)
    }

    /// Returns the constraints.
    #[inline]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn constraints_mut(&mut self) -> &mut [Constraint] {
        &mut self.constraints
    }

    /// Gets a constraint by id.
    pub fn constraint(&self, id: ConstraintId) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.id == id)
    }

    /// Gets a constraint by name, ignoring case.
    pub fn constraint_by_name(&self, name: &str) -> Option<&Constraint> {
        self.constraints
            .iter()
            .find(|c| c.name() == name)
            .or_else(|| self.constraints.iter().find(|c| names_match(c.name(), name, false)))
    }

    /// Adds a constraint.
    pub fn push_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    /// Removes a constraint by id.
    pub fn remove_constraint(&mut self, id: ConstraintId) -> Option<Constraint> {
        let pos = self.constraints.iter().position(|c| c.id == id)?;
        if self.primary_key == Some(id) {
            self.primary_key = None;
        }
        Some(self.constraints.remove(pos))
    }

    /// Iterates over the unique constraints.
    pub fn unique_constraints(&self) -> impl Iterator<Item = (ConstraintId, &UniqueConstraint)> {
        self.constraints
            .iter()
            .filter_map(|c| c.as_unique().map(|u| (c.id, u)))
    }

    /// Iterates over the foreign keys this table holds as child.
    pub fn foreign_keys(&self) -> impl Iterator<Item = (ConstraintId, &ForeignKeyConstraint)> {
        self.constraints
            .iter()
            .filter_map(|c| c.as_foreign_key().map(|fk| (c.id, fk)))
    }

    /// Finds a unique constraint covering exactly `columns`.
    pub fn find_unique(&self, columns: &[usize]) -> Option<ConstraintId> {
        self.unique_constraints()
            .find(|(_, u)| same_columns(&u.columns, columns))
            .map(|(id, _)| id)
    }

    /// Returns the primary key constraint id.
    #[inline]
    pub fn primary_key_id(&self) -> Option<ConstraintId> {
        self.primary_key
    }

    /// Returns the primary key columns, empty when none is declared.
    pub fn primary_key(&self) -> &[usize] {
        self.primary_key
            .and_then(|id| self.constraint(id))
            .and_then(Constraint::as_unique)
            .map(|u| u.columns.as_slice())
            .unwrap_or(&[])
    }

    /// Flags `id` as the primary key, clearing the flag on any previous one.
    pub fn set_primary_key_id(&mut self, id: Option<ConstraintId>) {
        for c in &mut self.constraints {
            if let ConstraintKind::Unique(u) = &mut c.kind {
                u.is_primary_key = Some(c.id) == id;
            }
        }
        self.primary_key = id;
    }

    /// Returns `Constraint{n}` for the smallest n not yet taken.
    pub fn next_constraint_name(&self) -> String {
        (1..)
            .map(|n| format!("Constraint{}", n))
            .find(|name| self.constraint_by_name(name).is_none())
            .unwrap_or_default()
    }

    /// Joins column names for diagnostics.
    pub fn column_names(&self, ordinals: &[usize]) -> String {
        ordinals
            .iter()
            .filter_map(|&i| self.columns.get(i).map(|c| c.name().to_string()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Builder for creating table schemas.
pub struct TableBuilder {
    name: String,
    columns: Vec<Column>,
    primary_key: Vec<String>,
    uniques: Vec<Vec<String>>,
}

impl TableBuilder {
    /// Creates a new table builder.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        Ok(Self {
            name,
            columns: Vec::new(),
            primary_key: Vec::new(),
            uniques: Vec::new(),
        })
    }

    /// Validates a name follows naming rules.
    pub fn check_naming_rules(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::invalid_schema("Name cannot be empty"));
        }
        if name.chars().any(char::is_control) {
            return Err(Error::invalid_schema(format!(
                "Name contains control characters: {:?}",
                name
            )));
        }
        Ok(())
    }

    /// Adds a nullable column of the given type.
    pub fn add_column(self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        self.column(Column::new(name, data_type))
    }

    /// Adds a fully configured column.
    pub fn column(mut self, mut column: Column) -> Result<Self> {
        Self::check_naming_rules(column.name())?;
        if self
            .columns
            .iter()
            .any(|c| names_match(c.name(), column.name(), false))
        {
            return Err(Error::DuplicateColumn {
                table: self.name.clone(),
                column: column.name().into(),
            });
        }
        column.validate()?;
        self.columns.push(column);
        Ok(self)
    }

    /// Sets the primary key.
    pub fn add_primary_key(mut self, columns: &[&str]) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::invalid_schema("Primary key needs at least one column"));
        }
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        Ok(self)
    }

    /// Adds a unique constraint over several columns.
    pub fn add_unique(mut self, columns: &[&str]) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::invalid_schema("Unique constraint needs at least one column"));
        }
        self.uniques.push(columns.iter().map(|c| c.to_string()).collect());
        Ok(self)
    }

    /// Builds the schema.
    pub fn build(self) -> Result<TableSchema> {
        let mut schema = TableSchema::new(self.name);
        for column in self.columns {
            schema.push_column(column);
        }

        let resolve = |schema: &TableSchema, names: &[String]| -> Result<Vec<usize>> {
            names.iter().map(|n| schema.column_index(n)).collect()
        };

        let mut unique_sets: Vec<Vec<usize>> = Vec::new();
        for i in 0..schema.width() {
            if schema.columns[i].is_unique() {
                unique_sets.push(alloc::vec![i]);
            }
        }
        for names in &self.uniques {
            unique_sets.push(resolve(&schema, names)?);
        }
        for columns in unique_sets {
            if schema.find_unique(&columns).is_none() {
                add_unique(&mut schema, columns, false)?;
            }
        }

        if !self.primary_key.is_empty() {
            let columns = resolve(&schema, &self.primary_key)?;
            let id = match schema.find_unique(&columns) {
                Some(id) => id,
                None => add_unique(&mut schema, columns.clone(), true)?,
            };
            schema.set_primary_key_id(Some(id));
            for &c in &columns {
                let col = &mut schema.columns[c];
                col.set_allow_null(false);
                col.set_read_only(true);
                if columns.len() == 1 {
                    col.set_unique(true);
                }
            }
        }
        Ok(schema)
    }
}

fn add_unique(schema: &mut TableSchema, columns: Vec<usize>, is_primary_key: bool) -> Result<ConstraintId> {
    for &c in &columns {
        if schema.columns[c].expression_text().is_some() {
            return Err(Error::invalid_schema(format!(
                "Computed column '{}' cannot be part of a unique constraint",
                schema.columns[c].name()
            )));
        }
    }
    let id = next_constraint_id();
    let name = schema.next_constraint_name();
    schema.push_constraint(Constraint {
        id,
        kind: ConstraintKind::Unique(UniqueConstraint {
            name,
            columns,
            is_primary_key,
        }),
        installer: None,
    });
    Ok(id)
}
