//! Lowering suite: TAC shapes for each construct plus the static error
//! catalog, driven by hand-built parse trees (the parser lives
//! upstream).

use minima_compiler::compile;
use minima_compiler::compiler::tac::{Opcode, Operand, Program};
use minima_compiler::compiler::tree::ParseNode;
use minima_compiler::CompileError;

// ── Parse-tree builders ─────────────────────────────────────────────

fn n(kind: &str, children: Vec<ParseNode>) -> ParseNode {
    ParseNode::new(kind, children)
}

fn nv(kind: &str, value: &str, children: Vec<ParseNode>) -> ParseNode {
    ParseNode::with_value(kind, value, children)
}

fn int(v: i64) -> ParseNode {
    ParseNode::leaf("int", v.to_string())
}

fn text(s: &str) -> ParseNode {
    ParseNode::leaf("text", s)
}

fn state(b: bool) -> ParseNode {
    ParseNode::leaf("state", if b { "YES" } else { "NO" })
}

fn ident(name: &str) -> ParseNode {
    ParseNode::leaf("ident", name)
}

fn bin(op: &str, lhs: ParseNode, rhs: ParseNode) -> ParseNode {
    nv("binary", op, vec![lhs, rhs])
}

fn declare(name: &str, init: ParseNode) -> ParseNode {
    n("var_decl", vec![nv("declarator", name, vec![init])])
}

fn declare_fixed(name: &str, init: ParseNode) -> ParseNode {
    nv(
        "var_decl",
        "fixed",
        vec![nv("declarator", name, vec![init])],
    )
}

fn assign(name: &str, value: ParseNode) -> ParseNode {
    nv("assign", "=", vec![ident(name), value])
}

fn show(value: ParseNode) -> ParseNode {
    n("show", vec![value])
}

fn block(stmts: Vec<ParseNode>) -> ParseNode {
    n("block", stmts)
}

fn program(stmts: Vec<ParseNode>) -> ParseNode {
    n("program", stmts)
}

fn func_def(name: &str, params: &[&str], body: Vec<ParseNode>) -> ParseNode {
    nv(
        "func_def",
        name,
        vec![
            n(
                "params",
                params.iter().map(|p| ident(p)).collect(),
            ),
            block(body),
        ],
    )
}

fn call(name: &str, args: Vec<ParseNode>) -> ParseNode {
    nv("call", name, args)
}

fn compile_ok(tree: &ParseNode) -> Program {
    match compile(tree) {
        Ok(program) => program,
        Err(err) => panic!("expected compile to succeed, got: {}", err),
    }
}

fn opcodes(compiled: &Program) -> Vec<Opcode> {
    compiled.instructions.iter().map(|i| i.op).collect()
}

// ── Error cases ─────────────────────────────────────────────────────

struct ErrorCase {
    id: &'static str,
    tree: ParseNode,
    expect_substring: &'static str,
}

fn assert_compile_err(case: ErrorCase) {
    match compile(&case.tree) {
        Ok(_) => panic!("case '{}' unexpectedly compiled", case.id),
        Err(err) => {
            let rendered: Vec<String> = err
                .diagnostics()
                .iter()
                .map(|d| d.render_plain())
                .collect();
            let joined = rendered.join("\n").to_lowercase();
            assert!(
                joined.contains(&case.expect_substring.to_lowercase()),
                "case '{}' error mismatch\nexpected substring: {}\nactual:\n{}",
                case.id,
                case.expect_substring,
                joined
            );
        }
    }
}

#[test]
fn static_error_catalog() {
    let cases = vec![
        ErrorCase {
            id: "redeclaration",
            tree: program(vec![declare("a", int(1)), declare("a", int(2))]),
            expect_substring: "redeclaration of 'a'",
        },
        ErrorCase {
            id: "fixed_reassignment",
            tree: program(vec![declare_fixed("a", int(1)), assign("a", int(2))]),
            expect_substring: "fixed variable 'a'",
        },
        ErrorCase {
            id: "undefined_identifier",
            tree: program(vec![show(ident("ghost"))]),
            expect_substring: "undefined identifier 'ghost'",
        },
        ErrorCase {
            id: "undefined_function",
            tree: program(vec![show(call("nope", vec![]))]),
            expect_substring: "undefined identifier 'nope'",
        },
        ErrorCase {
            id: "break_outside_loop",
            tree: program(vec![n("break", vec![])]),
            expect_substring: "outside of a loop",
        },
        ErrorCase {
            id: "throw_outside_function",
            tree: program(vec![n("throw", vec![int(1)])]),
            expect_substring: "outside of a function",
        },
        ErrorCase {
            id: "function_redefinition",
            tree: program(vec![
                func_def("f", &[], vec![]),
                func_def("f", &[], vec![]),
            ]),
            expect_substring: "already defined",
        },
        ErrorCase {
            id: "function_variable_clash",
            tree: program(vec![func_def("f", &[], vec![]), declare("f", int(1))]),
            expect_substring: "cannot name both",
        },
        ErrorCase {
            id: "function_as_value",
            tree: program(vec![func_def("f", &[], vec![]), show(ident("f"))]),
            expect_substring: "used as a value",
        },
        ErrorCase {
            id: "builtin_arity",
            tree: program(vec![show(call("length", vec![int(1), int(2)]))]),
            expect_substring: "'length' expects 1",
        },
        ErrorCase {
            id: "user_function_arity",
            tree: program(vec![
                func_def("f", &["x", "y"], vec![]),
                show(call("f", vec![int(1)])),
            ]),
            expect_substring: "'f' expects 2",
        },
        ErrorCase {
            id: "text_subtraction",
            tree: program(vec![declare("a", bin("-", text("x"), int(1)))]),
            expect_substring: "invalid operands for '-'",
        },
        ErrorCase {
            id: "duplicate_case",
            tree: program(vec![n(
                "match",
                vec![
                    int(1),
                    n("case", vec![int(2), block(vec![])]),
                    n("case", vec![int(2), block(vec![])]),
                ],
            )]),
            expect_substring: "duplicate case value 2",
        },
        ErrorCase {
            id: "duplicate_group_key",
            tree: program(vec![declare(
                "g",
                n(
                    "group",
                    vec![
                        n("pair", vec![text("k"), int(1)]),
                        n("pair", vec![text("k"), int(2)]),
                    ],
                ),
            )]),
            expect_substring: "duplicate group key",
        },
        ErrorCase {
            id: "ten_digit_literal",
            tree: program(vec![declare("a", int(1_000_000_000))]),
            expect_substring: "exceeds 9 digits",
        },
    ];
    for case in cases {
        assert_compile_err(case);
    }
}

#[test]
fn every_independent_error_is_reported() {
    let tree = program(vec![
        show(ident("ghost")),
        n("break", vec![]),
        declare("a", bin("-", text("x"), int(1))),
    ]);
    let err = compile(&tree).unwrap_err();
    assert_eq!(err.diagnostics().len(), 3);
}

#[test]
fn identical_errors_dedup_to_one() {
    // The same missing name twice in one expression, same line.
    let tree = program(vec![show(bin("+", ident("ghost"), ident("ghost")))]);
    let err = compile(&tree).unwrap_err();
    match &err {
        CompileError::Lower(errors) => assert_eq!(errors.len(), 2),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(err.diagnostics().len(), 1);
}

// ── Opcode classification ───────────────────────────────────────────

#[test]
fn text_plus_text_is_concat() {
    let tree = program(vec![declare("a", bin("+", text("x"), text("y")))]);
    let compiled = compile_ok(&tree);
    assert!(opcodes(&compiled).contains(&Opcode::Concat));
    assert!(!opcodes(&compiled).contains(&Opcode::Add));
}

#[test]
fn list_plus_list_is_list_concat() {
    let tree = program(vec![declare(
        "a",
        bin(
            "+",
            n("list", vec![int(1)]),
            n("list", vec![int(2)]),
        ),
    )]);
    let compiled = compile_ok(&tree);
    assert!(opcodes(&compiled).contains(&Opcode::ListConcat));
}

#[test]
fn numeric_plus_is_add() {
    let tree = program(vec![declare("a", bin("+", int(1), int(2)))]);
    let compiled = compile_ok(&tree);
    assert!(opcodes(&compiled).contains(&Opcode::Add));
    assert!(!opcodes(&compiled).contains(&Opcode::Concat));
}

#[test]
fn logical_ops_lower_to_branches_not_opcodes() {
    let tree = program(vec![declare("a", bin("||", state(true), state(false)))]);
    let compiled = compile_ok(&tree);
    let ops = opcodes(&compiled);
    // Short-circuit shape: assign left, branch, assign right, label.
    assert!(ops.contains(&Opcode::IfTrue));
    assert!(ops.contains(&Opcode::Label));
    assert_eq!(
        ops.iter().filter(|op| **op == Opcode::Assign).count(),
        3,
        "left into temp, right into temp, temp into variable"
    );

    let tree = program(vec![declare("a", bin("&&", state(true), state(false)))]);
    let ops = opcodes(&compile_ok(&tree));
    assert!(ops.contains(&Opcode::IfFalse));
}

#[test]
fn division_emits_div() {
    let tree = program(vec![declare("a", bin("/", int(10), int(2)))]);
    assert!(opcodes(&compile_ok(&tree)).contains(&Opcode::Div));
}

#[test]
fn empty_list_literal_still_creates() {
    let tree = program(vec![declare("a", n("list", vec![]))]);
    let compiled = compile_ok(&tree);
    let ops = opcodes(&compiled);
    assert!(ops.contains(&Opcode::ListCreate));
    assert!(!ops.contains(&Opcode::ListAppend));
}

#[test]
fn function_definition_shape() {
    let tree = program(vec![func_def(
        "add",
        &["x", "y"],
        vec![n("throw", vec![bin("+", ident("x"), ident("y"))])],
    )]);
    let compiled = compile_ok(&tree);
    let ops = opcodes(&compiled);
    // GOTO over the body, begin marker, entry label, body, implicit
    // return, end marker, resume label.
    assert_eq!(ops[0], Opcode::Goto);
    assert_eq!(ops[1], Opcode::Function);
    assert_eq!(ops[2], Opcode::Label);
    assert!(ops.contains(&Opcode::EndFunction));
    assert_eq!(
        ops.iter().filter(|op| **op == Opcode::Return).count(),
        2,
        "explicit throw plus the implicit return"
    );
    let info = compiled.functions.get("add").expect("function table entry");
    assert_eq!(info.params, vec!["x".to_string(), "y".to_string()]);
    assert!(compiled.label_index().contains_key(&info.entry));
}

#[test]
fn call_emits_params_left_to_right() {
    let tree = program(vec![
        func_def("f", &["x", "y"], vec![]),
        show(call("f", vec![int(7), int(8)])),
    ]);
    let compiled = compile_ok(&tree);
    let params: Vec<_> = compiled
        .instructions
        .iter()
        .filter(|i| i.op == Opcode::Param)
        .collect();
    assert_eq!(params.len(), 2);
    assert_eq!(
        params[0].a,
        Some(Operand::Literal(
            minima_compiler::compiler::tac::Constant::Int(7)
        ))
    );
    let call_pos = compiled
        .instructions
        .iter()
        .position(|i| i.op == Opcode::Call)
        .unwrap();
    let first_param_pos = compiled
        .instructions
        .iter()
        .position(|i| i.op == Opcode::Param)
        .unwrap();
    assert!(first_param_pos < call_pos);
}

#[test]
fn for_loop_checks_condition_after_body() {
    let tree = program(vec![n(
        "for",
        vec![
            declare("i", int(0)),
            bin("<", ident("i"), int(3)),
            assign("i", bin("+", ident("i"), int(1))),
            block(vec![show(ident("i"))]),
        ],
    )]);
    let compiled = compile_ok(&tree);
    let ops = opcodes(&compiled);
    // Header: init assign, then the unconditional jump to the check.
    assert_eq!(ops[0], Opcode::Assign);
    assert_eq!(ops[1], Opcode::Goto);
    // The backward jump to the body is a conditional, placed after it.
    let if_true_pos = ops.iter().rposition(|op| *op == Opcode::IfTrue).unwrap();
    let print_pos = ops.iter().position(|op| *op == Opcode::Print).unwrap();
    assert!(print_pos < if_true_pos);
}

#[test]
fn get_initializer_emits_input_then_assign() {
    let tree = program(vec![declare("n", n("get", vec![text("n:")]))]);
    let compiled = compile_ok(&tree);
    let ops = opcodes(&compiled);
    assert_eq!(ops, vec![Opcode::Input, Opcode::Assign]);
}

#[test]
fn indexed_compound_assign_reads_then_writes() {
    let tree = program(vec![
        declare("l", n("list", vec![int(1)])),
        nv(
            "assign",
            "+=",
            vec![nv("index", "l", vec![int(0)]), int(5)],
        ),
    ]);
    let compiled = compile_ok(&tree);
    let ops = opcodes(&compiled);
    let access = ops.iter().position(|op| *op == Opcode::ListAccess).unwrap();
    let set = ops.iter().position(|op| *op == Opcode::ListSet).unwrap();
    let add = ops.iter().position(|op| *op == Opcode::Add).unwrap();
    assert!(access < add && add < set);
}

#[test]
fn listing_renders_numbered_instructions() {
    let tree = program(vec![declare("a", int(3)), show(ident("a"))]);
    let listing = compile_ok(&tree).listing();
    assert_eq!(listing, "0: ASSIGN 3, a\n1: PRINT a");
}

// ── End-to-end smoke (compile + run) ────────────────────────────────

#[test]
fn compiled_program_runs() {
    use minima_vm::vm::{Outcome, Vm};

    let tree = program(vec![
        declare("a", bin("+", int(1), bin("*", int(2), int(3)))),
        show(ident("a")),
    ]);
    let mut vm = Vm::new(compile_ok(&tree));
    match vm.run().unwrap() {
        Outcome::Complete { output } => assert_eq!(output, "7"),
        other => panic!("unexpected outcome: {:?}", other),
    }
}
