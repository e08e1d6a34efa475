//! Textual IR output in LLVM assembly syntax

use crate::{
    Constant, Function, Global, Instruction, InstructionKind, Linkage, Module, Terminator, Value,
    ValueKind,
};
use std::fmt::{self, Write};

/// Writes `sigil` followed by `name`, quoting names LLVM cannot read bare
pub(crate) fn write_ident(out: &mut impl Write, sigil: char, name: &str) -> fmt::Result {
    let bare = !name.is_empty()
        && !name.starts_with(|character: char| character.is_ascii_digit())
        && name
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || "-$._".contains(character));
    out.write_char(sigil)?;
    if bare {
        return out.write_str(name);
    }
    out.write_char('"')?;
    write_escaped(out, name.as_bytes())?;
    out.write_char('"')
}

fn write_escaped(out: &mut impl Write, bytes: &[u8]) -> fmt::Result {
    for &byte in bytes {
        if byte.is_ascii_graphic() && byte != b'"' && byte != b'\\' || byte == b' ' {
            out.write_char(char::from(byte))?;
        } else {
            write!(out, "\\{byte:02X}")?;
        }
    }
    Ok(())
}

fn linkage_prefix(linkage: Linkage) -> &'static str {
    match linkage {
        Linkage::External => "",
        Linkage::Internal => "internal ",
        Linkage::Private => "private ",
    }
}

/// Writes the body of a constant, without its type
fn write_constant(out: &mut impl Write, constant: &Constant) -> fmt::Result {
    match constant {
        Constant::Int { bits: 1, value } => {
            out.write_str(if *value == 0 { "false" } else { "true" })
        }
        Constant::Int { value, .. } => write!(out, "{value}"),
        Constant::Float(value) => write!(out, "0x{:016X}", value.to_bits()),
        Constant::Null => out.write_str("null"),
        Constant::Undef(_) => out.write_str("undef"),
        Constant::Zero(_) => out.write_str("zeroinitializer"),
        Constant::Array { elements, .. } => {
            out.write_char('[')?;
            write_typed_constants(out, elements)?;
            out.write_char(']')
        }
        Constant::Struct { fields, .. } if fields.is_empty() => out.write_str("{}"),
        Constant::Struct { fields, .. } => {
            out.write_str("{ ")?;
            write_typed_constants(out, fields)?;
            out.write_str(" }")
        }
        Constant::Bytes(bytes) => {
            out.write_str("c\"")?;
            write_escaped(out, bytes)?;
            out.write_char('"')
        }
    }
}

fn write_typed_constants(out: &mut impl Write, constants: &[Constant]) -> fmt::Result {
    for (index, constant) in constants.iter().enumerate() {
        if index > 0 {
            out.write_str(", ")?;
        }
        write!(out, "{} ", constant.ty())?;
        write_constant(out, constant)?;
    }
    Ok(())
}

impl fmt::Display for Module {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(formatter, "; ModuleID = '{}'", self.name)?;
        write!(formatter, "source_filename = \"")?;
        write_escaped(formatter, self.name.as_bytes())?;
        writeln!(formatter, "\"")?;

        if !self.struct_types.is_empty() {
            writeln!(formatter)?;
        }
        for (name, fields) in &self.struct_types {
            write_ident(formatter, '%', name)?;
            writeln!(formatter, " = type {}", crate::Type::Struct(fields.clone()))?;
        }

        if !self.globals.is_empty() {
            writeln!(formatter)?;
        }
        for global in &self.globals {
            write_global(formatter, global)?;
        }

        for function in &self.functions {
            writeln!(formatter)?;
            FunctionPrinter {
                module: self,
                function,
            }
            .write(formatter)?;
        }
        Ok(())
    }
}

fn write_global(out: &mut impl Write, global: &Global) -> fmt::Result {
    write_ident(out, '@', &global.name)?;
    write!(
        out,
        " = {}{}{} {} ",
        linkage_prefix(global.linkage),
        if global.unnamed_addr { "unnamed_addr " } else { "" },
        if global.constant { "constant" } else { "global" },
        global.ty
    )?;
    write_constant(out, &global.initializer)?;
    writeln!(out)
}

struct FunctionPrinter<'a> {
    module: &'a Module,
    function: &'a Function,
}

impl FunctionPrinter<'_> {
    fn write(&self, out: &mut impl Write) -> fmt::Result {
        let function = self.function;
        let keyword = if function.is_declaration() {
            "declare"
        } else {
            "define"
        };
        write!(
            out,
            "{keyword} {}{} ",
            linkage_prefix(function.linkage),
            function.return_type
        )?;
        write_ident(out, '@', &function.name)?;
        out.write_char('(')?;
        for (index, param) in function.params.iter().enumerate() {
            if index > 0 {
                out.write_str(", ")?;
            }
            write!(out, "{}", param.ty)?;
            if !function.is_declaration() {
                out.write_char(' ')?;
                write_ident(out, '%', &param.name)?;
            }
        }
        out.write_char(')')?;
        if function.is_declaration() {
            return writeln!(out);
        }

        writeln!(out, " {{")?;
        for (index, block) in function.blocks.iter().enumerate() {
            if index > 0 {
                writeln!(out)?;
            }
            self.write_label(out, &block.label)?;
            writeln!(out, ":")?;
            for instruction in &block.instructions {
                out.write_str("  ")?;
                self.write_instruction(out, instruction)?;
                writeln!(out)?;
            }
            if let Some(terminator) = &block.terminator {
                out.write_str("  ")?;
                self.write_terminator(out, terminator)?;
                writeln!(out)?;
            }
        }
        writeln!(out, "}}")
    }

    fn write_label(&self, out: &mut impl Write, label: &str) -> fmt::Result {
        let bare = label
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || "-$._".contains(character))
            && !label.is_empty();
        if bare {
            out.write_str(label)
        } else {
            out.write_char('"')?;
            write_escaped(out, label.as_bytes())?;
            out.write_char('"')
        }
    }

    fn write_block_ref(&self, out: &mut impl Write, block: crate::BlockId) -> fmt::Result {
        let label = self
            .function
            .block(block)
            .map_or("<invalid>", |block| block.label.as_str());
        write_ident(out, '%', label)
    }

    fn write_value(&self, out: &mut impl Write, value: &Value) -> fmt::Result {
        match &value.kind {
            ValueKind::Constant(constant) => write_constant(out, constant),
            ValueKind::Local(id) => {
                let name = self
                    .function
                    .local(*id)
                    .map_or("<invalid>", |local| local.name.as_str());
                write_ident(out, '%', name)
            }
            ValueKind::Param(index) => {
                let name = self
                    .function
                    .params
                    .get(*index as usize)
                    .map_or("<invalid>", |param| param.name.as_str());
                write_ident(out, '%', name)
            }
            ValueKind::Global(id) => {
                let name = self
                    .module
                    .global(*id)
                    .map_or("<invalid>", |global| global.name.as_str());
                write_ident(out, '@', name)
            }
            ValueKind::Function(id) => {
                let name = self
                    .module
                    .function(*id)
                    .map_or("<invalid>", |function| function.name.as_str());
                write_ident(out, '@', name)
            }
        }
    }

    fn write_typed(&self, out: &mut impl Write, value: &Value) -> fmt::Result {
        write!(out, "{} ", value.ty)?;
        self.write_value(out, value)
    }

    fn write_instruction(&self, out: &mut impl Write, instruction: &Instruction) -> fmt::Result {
        if let Some(result) = instruction.result {
            let name = self
                .function
                .local(result)
                .map_or("<invalid>", |local| local.name.as_str());
            write_ident(out, '%', name)?;
            out.write_str(" = ")?;
        }

        match &instruction.kind {
            InstructionKind::Alloca { ty } => write!(out, "alloca {ty}"),
            InstructionKind::Load { ty, pointer } => {
                write!(out, "load {ty}, ")?;
                self.write_typed(out, pointer)
            }
            InstructionKind::Store { value, pointer } => {
                out.write_str("store ")?;
                self.write_typed(out, value)?;
                out.write_str(", ")?;
                self.write_typed(out, pointer)
            }
            InstructionKind::Binary { op, lhs, rhs } => {
                write!(out, "{} ", op.mnemonic())?;
                self.write_typed(out, lhs)?;
                out.write_str(", ")?;
                self.write_value(out, rhs)
            }
            InstructionKind::FNeg { operand } => {
                out.write_str("fneg ")?;
                self.write_typed(out, operand)
            }
            InstructionKind::ICmp {
                predicate,
                lhs,
                rhs,
            } => {
                write!(out, "icmp {} ", predicate.mnemonic())?;
                self.write_typed(out, lhs)?;
                out.write_str(", ")?;
                self.write_value(out, rhs)
            }
            InstructionKind::FCmp {
                predicate,
                lhs,
                rhs,
            } => {
                write!(out, "fcmp {} ", predicate.mnemonic())?;
                self.write_typed(out, lhs)?;
                out.write_str(", ")?;
                self.write_value(out, rhs)
            }
            InstructionKind::Cast { op, value, to } => {
                write!(out, "{} ", op.mnemonic())?;
                self.write_typed(out, value)?;
                write!(out, " to {to}")
            }
            InstructionKind::Phi { ty, incoming } => {
                write!(out, "phi {ty} ")?;
                for (index, (value, block)) in incoming.iter().enumerate() {
                    if index > 0 {
                        out.write_str(", ")?;
                    }
                    out.write_str("[ ")?;
                    self.write_value(out, value)?;
                    out.write_str(", ")?;
                    self.write_block_ref(out, *block)?;
                    out.write_str(" ]")?;
                }
                Ok(())
            }
            InstructionKind::Call { callee, args } => {
                let callee = self.module.function(*callee);
                let return_type = callee.map_or(crate::Type::Void, |callee| {
                    callee.return_type.clone()
                });
                write!(out, "call {return_type} ")?;
                write_ident(out, '@', callee.map_or("<invalid>", |callee| &callee.name))?;
                out.write_char('(')?;
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        out.write_str(", ")?;
                    }
                    self.write_typed(out, arg)?;
                }
                out.write_char(')')
            }
            InstructionKind::GetElementPtr {
                pointee,
                pointer,
                indices,
            } => {
                write!(out, "getelementptr inbounds {pointee}, ")?;
                self.write_typed(out, pointer)?;
                for index in indices {
                    out.write_str(", ")?;
                    self.write_typed(out, index)?;
                }
                Ok(())
            }
            InstructionKind::ExtractValue { aggregate, index } => {
                out.write_str("extractvalue ")?;
                self.write_typed(out, aggregate)?;
                write!(out, ", {index}")
            }
            InstructionKind::InsertValue {
                aggregate,
                element,
                index,
            } => {
                out.write_str("insertvalue ")?;
                self.write_typed(out, aggregate)?;
                out.write_str(", ")?;
                self.write_typed(out, element)?;
                write!(out, ", {index}")
            }
        }
    }

    fn write_terminator(&self, out: &mut impl Write, terminator: &Terminator) -> fmt::Result {
        match terminator {
            Terminator::Br(target) => {
                out.write_str("br label ")?;
                self.write_block_ref(out, *target)
            }
            Terminator::CondBr {
                condition,
                then_block,
                else_block,
            } => {
                out.write_str("br ")?;
                self.write_typed(out, condition)?;
                out.write_str(", label ")?;
                self.write_block_ref(out, *then_block)?;
                out.write_str(", label ")?;
                self.write_block_ref(out, *else_block)
            }
            Terminator::Ret(Some(value)) => {
                out.write_str("ret ")?;
                self.write_typed(out, value)
            }
            Terminator::Ret(None) => out.write_str("ret void"),
            Terminator::Unreachable => out.write_str("unreachable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Builder, Param, Type};
    use expect_test::expect;

    #[test]
    fn test_print_add_function() {
        let mut builder = Builder::new("__module__");
        let add = builder
            .add_function(
                "add",
                vec![
                    Param {
                        name: "a".into(),
                        ty: Type::I32,
                    },
                    Param {
                        name: "b".into(),
                        ty: Type::I32,
                    },
                ],
                Type::I32,
                Linkage::External,
            )
            .unwrap();
        let entry = builder.append_block(add, "entry").unwrap();
        builder.position_at_end(add, entry);
        let lhs = builder.param(0).unwrap();
        let rhs = builder.param(1).unwrap();
        let sum = builder
            .binary(crate::BinaryOp::Add, lhs, rhs, "_tmp_add0")
            .unwrap();
        builder.ret(Some(sum)).unwrap();

        expect![[r#"
            ; ModuleID = '__module__'
            source_filename = "__module__"

            define i32 @add(i32 %a, i32 %b) {
            entry:
              %_tmp_add0 = add i32 %a, %b
              ret i32 %_tmp_add0
            }
        "#]]
        .assert_eq(&builder.finish().to_string());
    }

    #[test]
    fn test_print_constants() {
        let mut text = String::new();
        write_constant(&mut text, &Constant::Bytes(b"hi\n\0".to_vec())).unwrap();
        assert_eq!(text, r#"c"hi\0A\00""#);

        text.clear();
        write_constant(&mut text, &Constant::float(1.5)).unwrap();
        assert_eq!(text, "0x3FF8000000000000");

        text.clear();
        write_constant(
            &mut text,
            &Constant::Array {
                element: Type::I32,
                elements: vec![Constant::int(32, 1), Constant::int(32, -2)],
            },
        )
        .unwrap();
        assert_eq!(text, "[i32 1, i32 -2]");
    }

    #[test]
    fn test_global_line() {
        let mut text = String::new();
        write_global(
            &mut text,
            &Global {
                name: "strtmp0".into(),
                ty: Type::array(Type::BYTE, 3),
                initializer: Constant::Bytes(b"ok\0".to_vec()),
                constant: true,
                linkage: Linkage::Private,
                unnamed_addr: true,
            },
        )
        .unwrap();
        assert_eq!(
            text,
            "@strtmp0 = private unnamed_addr constant [3 x i8] c\"ok\\00\"\n"
        );
    }

    #[test]
    fn test_quoted_identifiers() {
        let mut text = String::new();
        write_ident(&mut text, '%', "naïve").unwrap();
        assert_eq!(text, "%\"na\\C3\\AFve\"");
    }
}
