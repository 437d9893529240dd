//! Structural invariants of the lowered IR: terminator discipline and
//! single static assignment at the register level.

mod common;

use nanocc_core::compiler::ast::{Function, Program};
use nanocc_core::compiler::ir::instruction::Opcode;

/// Every block is non-empty and ends with exactly one control-flow
/// instruction; no terminator appears mid-block.
fn assert_terminator_discipline(func: &Function) {
    for (bi, block) in func.blocks.iter().enumerate() {
        assert!(
            !block.insts.is_empty(),
            "{}: block {} is empty",
            func.name,
            bi
        );
        let last = block.insts.last().expect("checked non-empty");
        assert!(
            last.op.is_terminator(),
            "{}: block {} ends with {:?}",
            func.name,
            bi,
            last.op
        );
        for (ii, inst) in block.insts[..block.insts.len() - 1].iter().enumerate() {
            assert!(
                !inst.op.is_terminator(),
                "{}: block {} has terminator {:?} at position {}",
                func.name,
                bi,
                inst.op,
                ii
            );
        }
    }
}

/// Exactly one definition per virtual register; block parameters count.
fn assert_ssa(func: &Function) {
    let mut defs = vec![0usize; func.regs.len()];
    for block in &func.blocks {
        if let Some(param) = block.param {
            defs[param.idx()] += 1;
        }
        for inst in &block.insts {
            if let Some(r0) = inst.r0 {
                defs[r0.idx()] += 1;
            }
        }
    }
    for (i, &count) in defs.iter().enumerate() {
        assert_eq!(
            count, 1,
            "{}: virtual register {} has {} definitions",
            func.name,
            i + 1,
            count
        );
    }
}

fn assert_lowering_invariants(program: &Program) {
    for func in &program.functions {
        assert!(!func.blocks.is_empty(), "{}: no blocks", func.name);
        // The entry block only jumps to the first real block.
        let entry = &func.blocks[0];
        assert_eq!(entry.insts.len(), 1, "{}: entry block not empty", func.name);
        assert_eq!(entry.insts[0].op, Opcode::Jmp);

        assert_terminator_discipline(func);
        assert_ssa(func);

        assert!(
            func.body.is_none(),
            "{}: statement tree should be dropped after lowering",
            func.name
        );
    }
}

#[test]
fn test_scenarios_lower_clean() {
    for (_name, source, _) in common::scenarios() {
        let program = common::lowered(source);
        assert_lowering_invariants(&program);
    }
}

#[test]
fn test_switch_lowering() {
    let program = common::lowered(
        "int main(){ int x=2; switch(x){ case 1: return 10; case 2: return 20; \
         default: return 30; } return 0; }",
    );
    assert_lowering_invariants(&program);

    // Two comparisons, one per non-default case.
    let func = &program.functions[0];
    let eqs = func
        .blocks
        .iter()
        .flat_map(|b| &b.insts)
        .filter(|i| i.op == Opcode::Eq)
        .count();
    assert_eq!(eqs, 2, "one Eq per non-default case");
}

#[test]
fn test_logical_chain_lowering() {
    let program = common::lowered(
        "int main(){ int a=1; int b=0; int c=1; if(a && b && c) return 1; \
         if(a || b) return 2; return 3; }",
    );
    assert_lowering_invariants(&program);

    // Each chain ends in a merge block with a parameter.
    let func = &program.functions[0];
    let merges = func.blocks.iter().filter(|b| b.param.is_some()).count();
    assert_eq!(merges, 2, "one block parameter per logical chain");
}

#[test]
fn test_ternary_produces_block_parameter() {
    let program = common::lowered("int main(){ int x=1; return (x==1)?42:0; }");
    let func = &program.functions[0];
    let merges = func.blocks.iter().filter(|b| b.param.is_some()).count();
    assert_eq!(merges, 1, "the ternary merge block owns one parameter");

    // Both arms feed the merge block through jump arguments.
    let jmp_args = func
        .blocks
        .iter()
        .flat_map(|b| &b.insts)
        .filter(|i| i.op == Opcode::Jmp && i.bb_arg.is_some())
        .count();
    assert_eq!(jmp_args, 2, "each ternary arm carries a jump argument");
}

#[test]
fn test_every_function_ends_with_return() {
    let program = common::lowered("int noret(int x){ x = x + 1; } int main(){ return 0; }");
    for func in &program.functions {
        let returns = func
            .blocks
            .iter()
            .flat_map(|b| &b.insts)
            .filter(|i| i.op == Opcode::Return)
            .count();
        assert!(
            returns >= 1,
            "{}: implicit return 0 must terminate the body",
            func.name
        );
    }
}

#[test]
fn test_param_store_marks_address_taken() {
    let program = common::lowered("int id(int x){ return x; } int main(){ return id(5); }");
    let func = program
        .functions
        .iter()
        .find(|f| f.name == "id")
        .expect("id should exist");
    let stores = func
        .blocks
        .iter()
        .flat_map(|b| &b.insts)
        .filter(|i| i.op == Opcode::StoreArg)
        .count();
    assert_eq!(stores, 1, "one STORE_ARG per parameter");
    let param = &func.vars[func.params[0].idx()];
    assert!(param.address_taken, "parameters must not be promoted");
}
