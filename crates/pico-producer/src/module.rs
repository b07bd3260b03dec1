//! The pluggable analysis-module contract and its option map.

use std::collections::BTreeMap;

use pico_core::{Error, Result};
use pico_nano::{Cell, Event, NanoFile, Tree};

/// A module option value, inferred from its string spelling.
#[derive(Debug, Clone, PartialEq)]
pub enum OptValue {
    /// `true` / `false`.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Floating-point literal.
    Float(f64),
    /// Anything else.
    Str(String),
}

impl OptValue {
    /// Infer the type of a raw option string.
    pub fn infer(raw: &str) -> OptValue {
        match raw {
            "true" | "True" => OptValue::Bool(true),
            "false" | "False" => OptValue::Bool(false),
            _ => {
                if let Ok(i) = raw.parse::<i64>() {
                    OptValue::Int(i)
                } else if let Ok(f) = raw.parse::<f64>() {
                    OptValue::Float(f)
                } else {
                    OptValue::Str(raw.to_string())
                }
            }
        }
    }
}

/// String-keyed options passed to a module constructor, parsed from
/// `key=value` arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleOptions(BTreeMap<String, OptValue>);

impl ModuleOptions {
    /// Empty option set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a list of `key=value` strings.
    pub fn parse(pairs: &[String]) -> Result<Self> {
        let mut map = BTreeMap::new();
        for pair in pairs {
            let (key, val) = pair.split_once('=').ok_or_else(|| {
                Error::Config(format!("module option '{pair}' is not of the form key=value"))
            })?;
            map.insert(key.to_string(), OptValue::infer(val));
        }
        Ok(ModuleOptions(map))
    }

    /// Insert an option.
    pub fn set(&mut self, key: impl Into<String>, value: OptValue) {
        self.0.insert(key.into(), value);
    }

    /// Raw lookup.
    pub fn get(&self, key: &str) -> Option<&OptValue> {
        self.0.get(key)
    }

    /// Float lookup with default (integers coerce).
    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        match self.0.get(key) {
            Some(OptValue::Float(f)) => *f,
            Some(OptValue::Int(i)) => *i as f64,
            _ => default,
        }
    }

    /// Bool lookup with default.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.0.get(key) {
            Some(OptValue::Bool(b)) => *b,
            _ => default,
        }
    }

    /// String lookup with default.
    pub fn get_str(&self, key: &str, default: &str) -> String {
        match self.0.get(key) {
            Some(OptValue::Str(s)) => s.clone(),
            Some(OptValue::Int(i)) => i.to_string(),
            Some(OptValue::Float(f)) => f.to_string(),
            Some(OptValue::Bool(b)) => b.to_string(),
            None => default.to_string(),
        }
    }

    /// Iterate options in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Re-encode as `key=value` strings (for task lists and sidecars).
    pub fn encode(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|(k, v)| {
                let val = match v {
                    OptValue::Bool(b) => b.to_string(),
                    OptValue::Int(i) => i.to_string(),
                    OptValue::Float(f) => f.to_string(),
                    OptValue::Str(s) => s.clone(),
                };
                format!("{k}={val}")
            })
            .collect()
    }
}

/// Hook context at file boundaries: the opened input and the output under
/// construction. Modules declare their output branches here.
pub struct FileContext<'a> {
    /// The input file.
    pub in_file: &'a NanoFile,
    /// The input event tree.
    pub in_tree: &'a Tree,
    /// The output container (for extra histograms).
    pub out_file: &'a mut NanoFile,
    /// The output event tree.
    pub out_tree: &'a mut Tree,
}

/// Per-event context handed to `analyze`: the input event, explicit branch
/// overrides, and the output record for this event.
pub struct EventContext<'a> {
    /// The input event view.
    pub event: Event<'a>,
    overrides: BTreeMap<String, Cell>,
    output: BTreeMap<String, Cell>,
}

impl<'a> EventContext<'a> {
    /// Wrap an event.
    pub fn new(event: Event<'a>) -> Self {
        EventContext { event, overrides: BTreeMap::new(), output: BTreeMap::new() }
    }

    /// Scalar read honoring overrides written by an earlier module.
    pub fn f64(&self, branch: &str) -> Result<f64> {
        match self.overrides.get(branch) {
            Some(Cell::F64(v)) => Ok(*v),
            Some(Cell::I64(v)) => Ok(*v as f64),
            _ => self.event.f64(branch),
        }
    }

    /// Explicitly override a branch of the running event for downstream
    /// modules.
    pub fn override_branch(&mut self, branch: impl Into<String>, value: Cell) {
        self.overrides.insert(branch.into(), value);
    }

    /// Queue a value for the output record of this event.
    pub fn fill_output(&mut self, branch: impl Into<String>, value: Cell) {
        self.output.insert(branch.into(), value);
    }

    /// The output record accumulated so far.
    pub fn output(&self) -> &BTreeMap<String, Cell> {
        &self.output
    }

    /// Consume into the output record.
    pub fn into_output(self) -> BTreeMap<String, Cell> {
        self.output
    }
}

/// A per-event analysis step.
///
/// Hooks run in declaration order; `analyze` returning `false` stops the
/// chain and drops the event from the output.
pub trait AnalysisModule: Send {
    /// Module identifier (as registered).
    fn name(&self) -> &str;

    /// Called once before any file is opened.
    fn begin_job(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called after opening each input file; declare output branches here.
    fn begin_file(&mut self, _ctx: &mut FileContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Process one event; `Ok(true)` passes it on.
    fn analyze(&mut self, ctx: &mut EventContext<'_>) -> Result<bool>;

    /// Called before closing each input file.
    fn end_file(&mut self, _ctx: &mut FileContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Called once after the last file.
    fn end_job(&mut self) -> Result<()> {
        Ok(())
    }
}
