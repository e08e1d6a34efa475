//! End-to-end behaviour of the compile pipeline

use expect_test::expect;
use integration_tests::{call, compile, run_globals};
use sr_codegen::CodegenError;
use sr_driver::{CompileOptions, DriverError, SemanticGate};
use sr_interpreter::RtValue;
use sr_ssa::{InstructionKind, verify_module};

const ADD: &str = "fn add(a: int, b: int) -> int:\n    return a + b\nresult = add(2, 3)\n";

fn global(source: &str, name: &str) -> String {
    let compilation = compile(source).unwrap();
    run_globals(&compilation.module)
        .unwrap()
        .into_iter()
        .find(|(global, _)| global == name)
        .map(|(_, value)| value)
        .unwrap()
}

#[test]
fn test_add_program_has_two_functions_and_evaluates() {
    let compilation = compile(ADD).unwrap();
    let names: Vec<&str> = compilation
        .module
        .functions
        .iter()
        .map(|function| function.name.as_str())
        .collect();
    assert_eq!(names, vec!["__global__", "add"]);
    assert_eq!(global(ADD, "result"), "5");
    assert_eq!(call(ADD, "add", &[40, 2]).unwrap(), RtValue::i32(42));
}

#[test]
fn test_comparison_chain_compares_adjacent_pairs() {
    let source = concat!(
        "a = 5\nb = 3\nc = 4\n",
        "falling = a > b > c\n",
        "d = 1\ne = 3\nf = 2\n",
        "peak = d < e > f\n",
    );
    assert_eq!(global(source, "falling"), "false");
    assert_eq!(global(source, "peak"), "true");
}

#[test]
fn test_most_negative_int_literal() {
    assert_eq!(global("low = -2147483648\n", "low"), "-2147483648");
    assert_eq!(global("low = -2147483648\nhigh = -low - 1\n", "high"), "2147483647");
}

#[test]
fn test_add_program_ir() {
    let compilation = compile("fn add(a: int, b: int) -> int:\n    return a + b\n").unwrap();
    let add = compilation
        .ir
        .split("define ")
        .find(|chunk| chunk.starts_with("i32 @add"))
        .unwrap();
    expect![[r#"
        i32 @add(i32 %a, i32 %b) {
        entry:
          %_arg_a0 = alloca i32
          %_arg_b0 = alloca i32
          store i32 %a, ptr %_arg_a0
          store i32 %b, ptr %_arg_b0
          %_tmp_load_a0 = load i32, ptr %_arg_a0
          %_tmp_load_b0 = load i32, ptr %_arg_b0
          %_tmp_add0 = add i32 %_tmp_load_a0, %_tmp_load_b0
          ret i32 %_tmp_add0
        }
    "#]]
    .assert_eq(add);
}

#[test]
fn test_short_circuit_skips_side_effects() {
    let source = "\
count = 0
fn bump() -> bool:
    count += 1
    return True
a = False and bump()
b = True or bump()
c = True and bump()
";
    assert_eq!(global(source, "count"), "1");
    assert_eq!(global(source, "a"), "false");
    assert_eq!(global(source, "b"), "true");
    assert_eq!(global(source, "c"), "true");
}

#[test]
fn test_or_yields_operand_values() {
    assert_eq!(global("x = 0 or 7\n", "x"), "7");
    assert_eq!(global("x = 3 and 0\n", "x"), "0");
}

#[test]
fn test_chained_assignment_does_not_alias() {
    let source = "a = b = 1\na += 10\n";
    assert_eq!(global(source, "a"), "11");
    assert_eq!(global(source, "b"), "1");
}

#[test]
fn test_conditional_expression_takes_false_branch() {
    assert_eq!(global("x = 10 if 1 > 2 else 20\n", "x"), "20");
    assert_eq!(global("x = 1.5 if True else 2\n", "x"), "1.5");
}

#[test]
fn test_augmented_assignment_to_undefined_name_is_fatal() {
    let error = compile("total += 1\n").unwrap_err();
    let driver = error.downcast_ref::<DriverError>().unwrap();
    assert!(matches!(
        driver,
        DriverError::Codegen(CodegenError::UndefinedVariable(name)) if name == "total"
    ));
}

#[test]
fn test_generated_modules_verify() {
    for source in [
        ADD,
        "x = 1\nwhile x < 100:\n    x = x * 2\n",
        "s = 'text'\nt = (1, 2.5, True)\n",
        concat!(
            "fn f(n: int) -> int:\n",
            "    if n > 0:\n",
            "        return 1\n",
            "    elif n < 0:\n",
            "        return -1\n",
            "    return 0\n",
        ),
    ] {
        let compilation = compile(source).unwrap();
        verify_module(&compilation.module).unwrap();
    }
}

#[test]
fn test_allocas_stay_in_entry_block() {
    let source = concat!(
        "fn f(n: int) -> int:\n",
        "    while n > 0:\n",
        "        m = n - 1\n",
        "        n = m\n",
        "    return n\n",
    );
    let compilation = compile(source).unwrap();
    let id = compilation.module.function_by_name("f").unwrap();
    let function = compilation.module.function(id).unwrap();
    for block in function.blocks.iter().skip(1) {
        assert!(
            !block
                .instructions
                .iter()
                .any(|instruction| matches!(instruction.kind, InstructionKind::Alloca { .. })),
            "alloca outside the entry block in `{}`",
            block.label
        );
    }
}

#[test]
fn test_semantic_gate() {
    let source = "x = 1\ny = x\nz = missing if False else 2\n";

    let proceed = sr_driver::analyze_source(source, &CompileOptions::default()).unwrap();
    assert_eq!(proceed.diagnostics.len(), 1);

    let strict = CompileOptions {
        semantic_gate: SemanticGate::Abort,
        ..CompileOptions::default()
    };
    assert!(matches!(
        sr_driver::compile_source(source, &strict),
        Err(DriverError::SemanticGate { errors }) if errors.len() == 1
    ));
}

#[test]
fn test_config_file_drives_compilation() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join(sr_driver::CONFIG_FILE);
    std::fs::write(&config, "module_name = \"configured\"\nsemantic_gate = \"abort\"\n").unwrap();

    let options = CompileOptions::find_in_dir(dir.path()).unwrap().unwrap();
    let compilation = sr_driver::compile_source("x = 1\n", &options).unwrap();
    assert_eq!(compilation.module.name, "configured");
    assert!(matches!(
        sr_driver::compile_source("x = y\n", &options),
        Err(DriverError::SemanticGate { .. })
    ));

    let empty = tempfile::tempdir().unwrap();
    assert!(CompileOptions::find_in_dir(empty.path()).unwrap().is_none());
}

#[test]
fn test_text_backend_writes_module() {
    let dir = tempfile::tempdir().unwrap();
    let compilation = compile(ADD).unwrap();
    let request = sr_driver::ArtifactRequest {
        target: sr_driver::Target::Ir,
        opt_level: 0,
        basename: dir.path().join("add"),
    };
    let artifact = sr_driver::backend_for(request.target)
        .emit(&compilation.ir, &request)
        .unwrap();
    let written = std::fs::read_to_string(artifact.path).unwrap();
    assert_eq!(written, compilation.ir);
}
