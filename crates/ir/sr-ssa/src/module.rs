//! Modules, functions, blocks and globals

use crate::{BlockId, Constant, FunctionId, GlobalId, Instruction, LocalId, Terminator, Type};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Function holding a module's top-level code
pub const ENTRY_FUNCTION: &str = "__global__";

/// Symbol visibility
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Linkage {
    /// Visible to other modules
    #[default]
    External,
    /// Local to the module
    Internal,
    /// Local to the module and absent from the symbol table
    Private,
}

/// Compilation unit
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Module identifier
    pub name: String,
    /// Named struct types and their fields, in declaration order
    pub struct_types: IndexMap<String, Vec<Type>>,
    /// Global data objects
    pub globals: Vec<Global>,
    /// Functions in definition order
    pub functions: Vec<Function>,
}

/// Module-level data object
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    /// Symbol name
    pub name: String,
    /// Type of the stored value
    pub ty: Type,
    /// Initial value
    pub initializer: Constant,
    /// Whether the object is read-only
    pub constant: bool,
    /// Visibility
    pub linkage: Linkage,
    /// Whether the address is insignificant (`unnamed_addr`)
    pub unnamed_addr: bool,
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Register name
    pub name: String,
    /// Parameter type
    pub ty: Type,
}

/// Instruction result register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Local {
    /// Register name, unique in the function
    pub name: String,
    /// Result type
    pub ty: Type,
}

/// A function definition, or a declaration when it has no blocks
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Symbol name
    pub name: String,
    /// Parameters
    pub params: Vec<Param>,
    /// Return type
    pub return_type: Type,
    /// Visibility
    pub linkage: Linkage,
    /// Basic blocks; the first is the entry block
    pub blocks: Vec<BasicBlock>,
    /// Instruction result registers
    pub locals: Vec<Local>,
    /// Every name used by a parameter, register or block label
    names: FxHashSet<String>,
}

/// Straight-line instruction sequence
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    /// Label, unique in the function
    pub label: String,
    /// Instructions in order
    pub instructions: Vec<Instruction>,
    /// Control transfer ending the block, once emitted
    pub terminator: Option<Terminator>,
}

impl Module {
    /// Creates an empty module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            struct_types: IndexMap::new(),
            globals: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// Function by id
    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.0 as usize)
    }

    /// Global by id
    pub fn global(&self, id: GlobalId) -> Option<&Global> {
        self.globals.get(id.0 as usize)
    }

    /// Function id by symbol name
    pub fn function_by_name(&self, name: &str) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|function| function.name == name)
            .map(|index| FunctionId(index as u32))
    }

    /// Global id by symbol name
    pub fn global_by_name(&self, name: &str) -> Option<GlobalId> {
        self.globals
            .iter()
            .position(|global| global.name == name)
            .map(|index| GlobalId(index as u32))
    }

    /// Whether a function or global already uses `name`
    pub fn symbol_exists(&self, name: &str) -> bool {
        self.function_by_name(name).is_some() || self.global_by_name(name).is_some()
    }

    /// Type of element `index` of an aggregate type
    pub fn element_type(&self, aggregate: &Type, index: u64) -> Option<Type> {
        match aggregate {
            Type::Array { element, len } if index < *len => Some((**element).clone()),
            Type::Struct(fields) => fields.get(index as usize).cloned(),
            Type::Named(name) => self.struct_types.get(name)?.get(index as usize).cloned(),
            _ => None,
        }
    }

    /// Number of elements of an aggregate type
    pub fn element_count(&self, aggregate: &Type) -> Option<u64> {
        match aggregate {
            Type::Array { len, .. } => Some(*len),
            Type::Struct(fields) => Some(fields.len() as u64),
            Type::Named(name) => self.struct_types.get(name).map(|fields| fields.len() as u64),
            _ => None,
        }
    }
}

impl Function {
    /// Creates a function without blocks
    pub fn new(
        name: impl Into<String>,
        params: Vec<Param>,
        return_type: Type,
        linkage: Linkage,
    ) -> Self {
        let names = params.iter().map(|param| param.name.clone()).collect();
        Self {
            name: name.into(),
            params,
            return_type,
            linkage,
            blocks: Vec::new(),
            locals: Vec::new(),
            names,
        }
    }

    /// Whether the function is only declared
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Block by id
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.0 as usize)
    }

    /// Register by id
    pub fn local(&self, id: LocalId) -> Option<&Local> {
        self.locals.get(id.0 as usize)
    }

    /// Claims a function-unique name derived from `base`.
    ///
    /// Registers and labels share one namespace; a taken name gets a
    /// `.N` suffix.
    pub fn claim_name(&mut self, base: &str) -> String {
        let base = if base.is_empty() { "tmp" } else { base };
        if self.names.insert(base.to_string()) {
            return base.to_string();
        }
        let mut suffix = 1_u32;
        loop {
            let candidate = format!("{base}.{suffix}");
            if self.names.insert(candidate.clone()) {
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Blocks branching to `target`, in block order, one entry per edge source
    pub fn predecessors(&self, target: BlockId) -> Vec<BlockId> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| {
                block
                    .terminator
                    .as_ref()
                    .is_some_and(|terminator| terminator.successors().contains(&target))
            })
            .map(|(index, _)| BlockId(index as u32))
            .collect()
    }
}

impl BasicBlock {
    /// Creates an empty, unterminated block
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instructions: Vec::new(),
            terminator: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_name_suffixes_collisions() {
        let mut function = Function::new(
            "f",
            vec![Param {
                name: "a".into(),
                ty: Type::I32,
            }],
            Type::Void,
            Linkage::External,
        );
        assert_eq!(function.claim_name("a"), "a.1");
        assert_eq!(function.claim_name("entry"), "entry");
        assert_eq!(function.claim_name("entry"), "entry.1");
        assert_eq!(function.claim_name(""), "tmp");
    }

    #[test]
    fn test_element_type_of_named_struct() {
        let mut module = Module::new("m");
        module
            .struct_types
            .insert("P".into(), vec![Type::I32, Type::Float]);
        assert_eq!(
            module.element_type(&Type::Named("P".into()), 1),
            Some(Type::Float)
        );
        assert_eq!(module.element_type(&Type::Named("P".into()), 2), None);
        assert_eq!(module.element_count(&Type::array(Type::I32, 4)), Some(4));
    }
}
