//! Allocator invariants: two-address shape, physical slot ranges, and
//! spill bracketing.

mod common;

use nanocc_core::compiler::ast::{Function, Program};
use nanocc_core::compiler::codegen::NUM_REGS;
use nanocc_core::compiler::ir::instruction::{Inst, Opcode, RegId};

/// A program with far more simultaneously live values than physical
/// registers, to force spilling.
const SPILL_HEAVY: &str = "int main(){ \
    int a=1; int b=2; int c=3; int d=4; int e=5; \
    int f=6; int g=7; int h=8; int i=9; int j=10; \
    return a+b+c+d+e+f+g+h+i+j; }";

fn referenced_regs(inst: &Inst) -> Vec<RegId> {
    let mut regs: Vec<RegId> = Vec::new();
    for r in [inst.r0, inst.r1, inst.r2, inst.bb_arg] {
        if let Some(r) = r {
            regs.push(r);
        }
    }
    regs.extend(inst.args.iter().copied());
    regs
}

fn assert_allocation_invariants(program: &Program) {
    for func in &program.functions {
        for block in &func.blocks {
            if let Some(param) = block.param {
                let real = func.regs[param.idx()].real;
                assert!(
                    (0..NUM_REGS as i32).contains(&real),
                    "{}: block parameter outside the physical register file",
                    func.name
                );
            }
            for inst in &block.insts {
                for r in referenced_regs(inst) {
                    let real = func.regs[r.idx()].real;
                    assert!(
                        (0..NUM_REGS as i32).contains(&real),
                        "{}: register v{} has slot {}",
                        func.name,
                        func.regs[r.idx()].vn,
                        real
                    );
                }
                // Two-address form: destination coalesces with the first
                // operand.
                if let (Some(r0), Some(r1)) = (inst.r0, inst.r1) {
                    assert_eq!(
                        r0, r1,
                        "{}: {:?} not in two-address form",
                        func.name, inst.op
                    );
                }
            }
        }
    }
}

/// Spilled registers sit in the reserved staging slot and are bracketed by
/// reloads and saves at each reference.
fn assert_spill_bracketing(func: &Function) {
    for block in &func.blocks {
        for (ii, inst) in block.insts.iter().enumerate() {
            if matches!(inst.op, Opcode::LoadSpill | Opcode::StoreSpill) {
                continue;
            }
            for operand in [inst.r1, inst.r2, inst.bb_arg].into_iter().flatten() {
                if !func.regs[operand.idx()].spill {
                    continue;
                }
                // Walk the contiguous run of LOAD_SPILLs directly above.
                let reloaded = block.insts[..ii]
                    .iter()
                    .rev()
                    .take_while(|i| i.op == Opcode::LoadSpill)
                    .any(|i| i.r0 == Some(operand));
                assert!(
                    reloaded,
                    "{}: spilled operand v{} used without a reload",
                    func.name,
                    func.regs[operand.idx()].vn
                );
            }
            if let Some(r0) = inst.r0 {
                if func.regs[r0.idx()].spill {
                    let saved = block.insts.get(ii + 1).map(|i| (i.op, i.r1));
                    assert_eq!(
                        saved,
                        Some((Opcode::StoreSpill, Some(r0))),
                        "{}: spilled definition of v{} not followed by a save",
                        func.name,
                        func.regs[r0.idx()].vn
                    );
                }
            }
        }
    }
}

/// One save per definition and one reload per use of each spilled register.
fn assert_spill_counts(func: &Function) {
    for (ri, reg) in func.regs.iter().enumerate() {
        if !reg.spill {
            continue;
        }
        let r = RegId(ri as u32);
        let mut defs = 0usize;
        let mut uses = 0usize;
        let mut saves = 0usize;
        let mut reloads = 0usize;
        for block in &func.blocks {
            for inst in &block.insts {
                match inst.op {
                    Opcode::LoadSpill => {
                        if inst.r0 == Some(r) {
                            reloads += 1;
                        }
                    }
                    Opcode::StoreSpill => {
                        if inst.r1 == Some(r) {
                            saves += 1;
                        }
                    }
                    _ => {
                        if inst.r0 == Some(r) {
                            defs += 1;
                        }
                        for operand in [inst.r1, inst.r2, inst.bb_arg].into_iter().flatten() {
                            if operand == r {
                                uses += 1;
                            }
                        }
                    }
                }
            }
        }
        assert_eq!(saves, defs, "{}: saves != defs for spilled v{}", func.name, reg.vn);
        assert_eq!(reloads, uses, "{}: reloads != uses for spilled v{}", func.name, reg.vn);
        assert_eq!(
            reg.real,
            (NUM_REGS - 1) as i32,
            "{}: spilled v{} must live in the reserved slot",
            func.name,
            reg.vn
        );
        assert!(reg.spill_slot.is_some(), "spilled register without a stack slot");
    }
}

#[test]
fn test_scenarios_allocate_clean() {
    for (_name, source, _) in common::scenarios() {
        let program = common::allocated(source);
        assert_allocation_invariants(&program);
        for func in &program.functions {
            assert_spill_bracketing(func);
            assert_spill_counts(func);
        }
    }
}

#[test]
fn test_register_pressure_forces_spills() {
    let program = common::allocated(SPILL_HEAVY);
    let func = &program.functions[0];

    let spilled = func.regs.iter().filter(|r| r.spill).count();
    assert!(
        spilled > 0,
        "ten simultaneously live values cannot fit seven registers"
    );

    // Every spill reserved a stack slot in the frame.
    let slots = func.vars.iter().filter(|v| v.name == "spill").count();
    assert_eq!(slots, spilled, "one stack slot per spilled register");

    assert_allocation_invariants(&program);
    assert_spill_bracketing(func);
    assert_spill_counts(func);
}

#[test]
fn test_unspilled_registers_avoid_the_reserved_slot() {
    // Without register pressure nothing may claim the staging slot through
    // the free-slot search.
    let program = common::allocated("int main(){ int x=1; int y=2; return x+y; }");
    let func = &program.functions[0];
    for reg in &func.regs {
        if reg.real < 0 {
            continue; // never referenced
        }
        if !reg.spill {
            assert!(
                (reg.real as usize) < NUM_REGS - 1 || reg.last_use == 0,
                "unspilled register v{} landed in the reserved slot",
                reg.vn
            );
        }
    }
}
