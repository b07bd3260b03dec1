//! Columnar event trees.
//!
//! A tree is an ordered, finite sequence of events. Each branch is either a
//! scalar column (one value per event) or a jagged column (one vector per
//! event). A jagged branch `X` has the companion scalar `nX` carrying its
//! per-event length, maintained automatically on write.

use std::collections::BTreeMap;

use pico_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Branch payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Column {
    /// Scalar floating-point branch.
    F64(Vec<f64>),
    /// Scalar integer branch.
    I64(Vec<i64>),
    /// Jagged floating-point branch.
    JaggedF64(Vec<Vec<f64>>),
    /// Jagged integer branch.
    JaggedI64(Vec<Vec<i64>>),
}

impl Column {
    /// Number of events stored in this column.
    pub fn len(&self) -> usize {
        match self {
            Column::F64(v) => v.len(),
            Column::I64(v) => v.len(),
            Column::JaggedF64(v) => v.len(),
            Column::JaggedI64(v) => v.len(),
        }
    }

    /// True if no events are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True for jagged columns.
    pub fn is_jagged(&self) -> bool {
        matches!(self, Column::JaggedF64(_) | Column::JaggedI64(_))
    }

    /// Schema tag used for merge compatibility checks.
    pub fn kind(&self) -> &'static str {
        match self {
            Column::F64(_) => "f64",
            Column::I64(_) => "i64",
            Column::JaggedF64(_) => "jagged_f64",
            Column::JaggedI64(_) => "jagged_i64",
        }
    }

    fn append_from(&mut self, other: &Column) -> bool {
        match (self, other) {
            (Column::F64(a), Column::F64(b)) => a.extend_from_slice(b),
            (Column::I64(a), Column::I64(b)) => a.extend_from_slice(b),
            (Column::JaggedF64(a), Column::JaggedF64(b)) => a.extend_from_slice(b),
            (Column::JaggedI64(a), Column::JaggedI64(b)) => a.extend_from_slice(b),
            _ => return false,
        }
        true
    }
}

/// A single value to be written into one branch of one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Scalar floating-point value.
    F64(f64),
    /// Scalar integer value.
    I64(i64),
    /// Jagged floating-point vector.
    VecF64(Vec<f64>),
    /// Jagged integer vector.
    VecI64(Vec<i64>),
}

/// Columnar event tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    /// Tree name (`Events` by convention).
    pub name: String,
    nevents: u64,
    branches: BTreeMap<String, Column>,
}

impl Tree {
    /// Create an empty tree.
    pub fn new(name: impl Into<String>) -> Self {
        Tree { name: name.into(), nevents: 0, branches: BTreeMap::new() }
    }

    /// Number of events.
    pub fn nevents(&self) -> u64 {
        self.nevents
    }

    /// Branch names in deterministic order.
    pub fn branch_names(&self) -> impl Iterator<Item = &str> {
        self.branches.keys().map(|s| s.as_str())
    }

    /// Whether a branch exists.
    pub fn has_branch(&self, name: &str) -> bool {
        self.branches.contains_key(name)
    }

    /// Access a branch column.
    pub fn branch(&self, name: &str) -> Result<&Column> {
        self.branches
            .get(name)
            .ok_or_else(|| Error::EventFile(format!("tree '{}' has no branch '{}'", self.name, name)))
    }

    /// Declare a branch with an empty column of the given kind. Re-declaring
    /// an existing branch with the same kind is a no-op; a kind change is an
    /// error.
    pub fn declare(&mut self, name: &str, column: Column) -> Result<()> {
        if let Some(existing) = self.branches.get(name) {
            if existing.kind() != column.kind() {
                return Err(Error::EventFile(format!(
                    "branch '{}' re-declared as {} (was {})",
                    name,
                    column.kind(),
                    existing.kind()
                )));
            }
            return Ok(());
        }
        if self.nevents > 0 {
            return Err(Error::EventFile(format!(
                "cannot declare branch '{}' on tree '{}' with {} events already filled",
                name, self.name, self.nevents
            )));
        }
        self.branches.insert(name.to_string(), column);
        Ok(())
    }

    /// Read a scalar branch as `f64`, coercing integers.
    pub fn scalar_f64(&self, name: &str) -> Result<Vec<f64>> {
        match self.branch(name)? {
            Column::F64(v) => Ok(v.clone()),
            Column::I64(v) => Ok(v.iter().map(|&x| x as f64).collect()),
            _ => Err(Error::EventFile(format!(
                "branch '{}' of tree '{}' is jagged, expected scalar",
                name, self.name
            ))),
        }
    }

    /// Append one event. Every declared branch must receive a cell of its
    /// kind; missing branches are padded with `0`/empty so that partially
    /// filled records stay rectangular.
    pub fn fill(&mut self, row: &BTreeMap<String, Cell>) -> Result<()> {
        for (name, cell) in row {
            if !self.branches.contains_key(name) {
                return Err(Error::EventFile(format!(
                    "fill of undeclared branch '{}' on tree '{}'",
                    name, self.name
                )));
            }
            let column = self.branches.get_mut(name).unwrap();
            let ok = match (column, cell) {
                (Column::F64(v), Cell::F64(x)) => {
                    v.push(*x);
                    true
                }
                (Column::I64(v), Cell::I64(x)) => {
                    v.push(*x);
                    true
                }
                (Column::JaggedF64(v), Cell::VecF64(x)) => {
                    v.push(x.clone());
                    true
                }
                (Column::JaggedI64(v), Cell::VecI64(x)) => {
                    v.push(x.clone());
                    true
                }
                _ => false,
            };
            if !ok {
                return Err(Error::EventFile(format!(
                    "type mismatch filling branch '{}' on tree '{}'",
                    name, self.name
                )));
            }
        }
        // Pad branches the row did not set.
        let target = self.nevents as usize + 1;
        for column in self.branches.values_mut() {
            match column {
                Column::F64(v) => {
                    if v.len() < target {
                        v.push(0.0)
                    }
                }
                Column::I64(v) => {
                    if v.len() < target {
                        v.push(0)
                    }
                }
                Column::JaggedF64(v) => {
                    if v.len() < target {
                        v.push(Vec::new())
                    }
                }
                Column::JaggedI64(v) => {
                    if v.len() < target {
                        v.push(Vec::new())
                    }
                }
            }
        }
        self.nevents += 1;
        Ok(())
    }

    /// Concatenate another tree with an identical schema.
    pub fn concat(&mut self, other: &Tree) -> Result<()> {
        if self.branches.len() != other.branches.len()
            || !self
                .branches
                .iter()
                .all(|(k, v)| other.branches.get(k).is_some_and(|o| o.kind() == v.kind()))
        {
            return Err(Error::Merge(format!(
                "tree '{}' branch schema mismatch between inputs",
                self.name
            )));
        }
        for (name, column) in &mut self.branches {
            if !column.append_from(&other.branches[name]) {
                return Err(Error::Merge(format!(
                    "branch '{}' of tree '{}' changed kind between inputs",
                    name, self.name
                )));
            }
        }
        self.nevents += other.nevents;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[(&str, Cell)]) -> BTreeMap<String, Cell> {
        cells.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn fill_and_read() {
        let mut tree = Tree::new("Events");
        tree.declare("pt_1", Column::F64(Vec::new())).unwrap();
        tree.declare("q_1", Column::I64(Vec::new())).unwrap();
        tree.fill(&row(&[("pt_1", Cell::F64(31.5)), ("q_1", Cell::I64(-1))])).unwrap();
        tree.fill(&row(&[("pt_1", Cell::F64(45.0))])).unwrap(); // q_1 padded
        assert_eq!(tree.nevents(), 2);
        assert_eq!(tree.scalar_f64("pt_1").unwrap(), vec![31.5, 45.0]);
        assert_eq!(tree.scalar_f64("q_1").unwrap(), vec![-1.0, 0.0]);
    }

    #[test]
    fn fill_undeclared_branch_fails() {
        let mut tree = Tree::new("Events");
        tree.declare("pt_1", Column::F64(Vec::new())).unwrap();
        let err = tree.fill(&row(&[("eta_1", Cell::F64(0.5))])).unwrap_err();
        assert!(err.to_string().contains("undeclared"));
    }

    #[test]
    fn concat_checks_schema() {
        let mut a = Tree::new("Events");
        a.declare("pt_1", Column::F64(Vec::new())).unwrap();
        a.fill(&row(&[("pt_1", Cell::F64(1.0))])).unwrap();

        let mut b = Tree::new("Events");
        b.declare("pt_1", Column::F64(Vec::new())).unwrap();
        b.fill(&row(&[("pt_1", Cell::F64(2.0))])).unwrap();
        a.concat(&b).unwrap();
        assert_eq!(a.nevents(), 2);

        let mut c = Tree::new("Events");
        c.declare("pt_1", Column::I64(Vec::new())).unwrap();
        assert!(a.concat(&c).is_err());
    }
}
