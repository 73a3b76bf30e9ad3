//! Module representation for the Mx* IR.
//!
//! A module owns the global variables, the content-addressed string literal
//! table, the class layouts, and the functions. Names are globally unique
//! symbols; class methods are lowered to free functions named
//! `Class.method`.

use std::fmt;

use rustc_hash::FxHashMap;

use super::function::Function;

/// Layout of a class: an ordered list of field names, each occupying one
/// 4-byte slot. The field's position is its slot index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLayout {
    pub name: String,
    pub fields: Vec<String>,
}

impl ClassLayout {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field_index(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }

    /// Object size in bytes.
    pub fn size(&self) -> usize {
        self.fields.len() * 4
    }
}

/// A global variable. `init` is the word emitted into `.data`; initializers
/// that are not pure constants store through `__init` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalVar {
    pub name: String,
    pub init: i32,
}

/// A complete IR module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub globals: Vec<GlobalVar>,
    /// Interned string literal bodies, indexed by `Value::Str`.
    pub strings: Vec<String>,
    string_index: FxHashMap<String, usize>,
    pub classes: FxHashMap<String, ClassLayout>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string literal, returning its table index. Identical bodies
    /// share one entry.
    pub fn intern_string(&mut self, body: &str) -> usize {
        if let Some(&idx) = self.string_index.get(body) {
            return idx;
        }
        let idx = self.strings.len();
        self.strings.push(body.to_string());
        self.string_index.insert(body.to_string(), idx);
        idx
    }

    pub fn add_function(&mut self, func: Function) {
        self.functions.push(func);
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn get_function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for g in &self.globals {
            writeln!(f, "global @{} = {}", g.name, g.init)?;
        }
        for (i, s) in self.strings.iter().enumerate() {
            writeln!(f, "@.str.{} = {:?}", i, s)?;
        }
        if !self.globals.is_empty() || !self.strings.is_empty() {
            writeln!(f)?;
        }
        for (i, func) in self.functions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::Ty;

    #[test]
    fn test_string_interning_dedups() {
        let mut m = Module::new();
        let a = m.intern_string("hello");
        let b = m.intern_string("world");
        let c = m.intern_string("hello");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(m.strings.len(), 2);
    }

    #[test]
    fn test_class_layout() {
        let mut layout = ClassLayout::new("P");
        layout.fields.push("x".into());
        layout.fields.push("y".into());
        assert_eq!(layout.field_index("y"), Some(1));
        assert_eq!(layout.field_index("z"), None);
        assert_eq!(layout.size(), 8);
    }

    #[test]
    fn test_function_lookup() {
        let mut m = Module::new();
        m.add_function(Function::new("main", Ty::I32));
        assert!(m.get_function("main").is_some());
        assert!(m.get_function("missing").is_none());
    }
}
