//! Declarative procedure tables.
//!
//! Both sides of an exchange declare the same ordered table; a procedure's
//! id is its 1-based position in it (id 0 is the batch's call-count cell).
//! The `endpoint` field names the side that decodes and executes the
//! procedure; the opposite side encodes it. Entries without an endpoint are
//! symmetric: either side may encode them and either side decodes them.

use std::collections::HashSet;
use std::fmt;

use crate::error::{Error, Result};

/// Parameter kind of a procedure argument. All kinds occupy 32-bit cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    /// 32-bit signed integer.
    Int,
    /// 32-bit float.
    Float,
    /// Length-prefixed string, one Unicode scalar value per cell.
    Str,
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgKind::Int => "int",
            ArgKind::Float => "float",
            ArgKind::Str => "str",
        };
        f.write_str(name)
    }
}

/// A procedure argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    Str(String),
}

impl Value {
    /// The kind this value encodes as.
    pub fn kind(&self) -> ArgKind {
        match self {
            Value::Int(_) => ArgKind::Int,
            Value::Float(_) => ArgKind::Float,
            Value::Str(_) => ArgKind::Str,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// One entry of a procedure table.
#[derive(Debug, Clone)]
pub struct ProcedureDef {
    name: String,
    args: Vec<ArgKind>,
    instance: Option<String>,
    endpoint: Option<String>,
}

impl ProcedureDef {
    pub fn new(name: &str, args: &[ArgKind]) -> Self {
        Self {
            name: name.to_string(),
            args: args.to_vec(),
            instance: None,
            endpoint: None,
        }
    }

    /// Mark the procedure as instanced: encoded calls carry an instance id
    /// selecting an object from the named registry on the receiving side.
    pub fn instanced(mut self, registry: &str) -> Self {
        self.instance = Some(registry.to_string());
        self
    }

    /// Name the endpoint that decodes and executes this procedure.
    pub fn endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[ArgKind] {
        &self.args
    }

    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    pub fn receiver(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }
}

/// An ordered, validated procedure table.
#[derive(Debug, Clone)]
pub struct ProcedureTable {
    entries: Vec<ProcedureDef>,
}

impl ProcedureTable {
    /// Validate and build a table.
    ///
    /// Names must be non-empty and unique per `(instance, endpoint)` pair.
    pub fn new(entries: Vec<ProcedureDef>) -> Result<Self> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if entry.name.is_empty() {
                return Err(Error::Setup("procedure name is empty".to_string()));
            }
            let key = (
                entry.name.clone(),
                entry.instance.clone(),
                entry.endpoint.clone(),
            );
            if !seen.insert(key) {
                return Err(Error::Setup(format!(
                    "duplicate procedure {:?} for the same instance and endpoint",
                    entry.name
                )));
            }
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by its 1-based id.
    pub fn get(&self, id: u32) -> Option<&ProcedureDef> {
        (id as usize)
            .checked_sub(1)
            .and_then(|idx| self.entries.get(idx))
    }

    pub fn entries(&self) -> &[ProcedureDef] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_one_based() {
        let table = ProcedureTable::new(vec![
            ProcedureDef::new("a", &[ArgKind::Int]),
            ProcedureDef::new("b", &[]),
        ])
        .unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.get(0).is_none());
        assert_eq!(table.get(1).unwrap().name(), "a");
        assert_eq!(table.get(2).unwrap().name(), "b");
        assert!(table.get(3).is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let result = ProcedureTable::new(vec![
            ProcedureDef::new("f", &[]).endpoint("worker"),
            ProcedureDef::new("f", &[]).endpoint("worker"),
        ]);
        assert!(matches!(result, Err(Error::Setup(_))));
    }

    #[test]
    fn test_same_name_different_scope_allowed() {
        let table = ProcedureTable::new(vec![
            ProcedureDef::new("f", &[]).endpoint("worker"),
            ProcedureDef::new("f", &[]).endpoint("main"),
            ProcedureDef::new("f", &[]).instanced("ents").endpoint("worker"),
        ]);
        assert!(table.is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = ProcedureTable::new(vec![ProcedureDef::new("", &[])]);
        assert!(matches!(result, Err(Error::Setup(_))));
    }

    #[test]
    fn test_value_kinds() {
        assert_eq!(Value::from(1).kind(), ArgKind::Int);
        assert_eq!(Value::from(1.0f32).kind(), ArgKind::Float);
        assert_eq!(Value::from("x").kind(), ArgKind::Str);
    }
}
