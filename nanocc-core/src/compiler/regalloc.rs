//! Linear-Scan Register Allocator
//!
//! Before this pass the IR assumes an infinite supply of virtual registers;
//! this pass maps them onto the finite physical set the emitter knows.
//!
//! # Algorithm
//! 1. **Two-address rewrite.** Every `A = B op C` is split into
//!    `A = B; A = A op C`, so each surviving arithmetic instruction matches
//!    x86's destructive two-operand form and the destination coalesces with
//!    the first operand.
//! 2. **Collection.** A single walk over all blocks in emission order
//!    assigns each register its definition index and the index of its last
//!    use; a register is considered live over that range. Registers live-out
//!    of a block have their last use extended to the block's final index.
//! 3. **Scan.** Registers are placed in definition order. At a definition
//!    with no free slot, one occupant (possibly the incoming register
//!    itself) is spilled to the stack; the heuristic picks the register
//!    whose last use is furthest. The last physical slot is reserved as the
//!    staging register for spills.
//! 4. **Spill materialization.** Each spilled register gets an `int*`-sized
//!    stack slot; every use is preceded by `LOAD_SPILL` and every def
//!    followed by `STORE_SPILL`, so the reserved slot holds the live
//!    operand only across a single instruction.

use crate::compiler::ast::{Function, Program, Type, Var, VarId};
use crate::compiler::codegen::NUM_REGS;
use crate::compiler::ir::instruction::{Block, Inst, Opcode, Reg, RegId};

/// Allocate physical registers for every function of the program.
pub fn allocate(program: &mut Program) {
    for func in program.functions.iter_mut() {
        // Convert SSA to x86-ish two-address form.
        for block in func.blocks.iter_mut() {
            to_two_address(block);
        }

        // Decide placements and which registers to spill.
        let order = collect_regs(func);
        scan(&mut func.regs, &order);

        // Reserve a stack slot for each spilled register.
        let mut spills: usize = 0;
        for &r in &order {
            if !func.regs[r.idx()].spill {
                continue;
            }
            let slot = VarId(func.vars.len() as u32);
            func.vars.push(Var::local(Type::ptr_to(Type::Int), "spill"));
            func.regs[r.idx()].spill_slot = Some(slot);
            spills += 1;
        }

        // Convert accesses to spilled registers into loads and stores.
        let regs = &func.regs;
        for block in func.blocks.iter_mut() {
            emit_spill(block, regs);
        }

        log::debug!(
            "{}: allocated {} register(s), {} spilled",
            func.name,
            order.len(),
            spills
        );
    }
}

/// Rewrite `A = B op C` to `A = B; A = A op C`.
fn to_two_address(block: &mut Block) {
    let old = std::mem::take(&mut block.insts);
    let mut insts: Vec<Inst> = Vec::with_capacity(old.len());

    for mut inst in old {
        let (r0, r1) = match (inst.r0, inst.r1) {
            (Some(r0), Some(r1)) => (r0, r1),
            _ => {
                insts.push(inst);
                continue;
            }
        };
        assert_ne!(r0, r1, "two-address rewrite on a self-referential def");

        insts.push(Inst {
            op: Opcode::Mov,
            r0: Some(r0),
            r2: Some(r1),
            ..Inst::default()
        });
        inst.r1 = Some(r0);
        insts.push(inst);
    }
    block.insts = insts;
}

fn set_last_use(regs: &mut [Reg], r: Option<RegId>, ic: u32) {
    if let Some(r) = r {
        if regs[r.idx()].last_use < ic {
            regs[r.idx()].last_use = ic;
        }
    }
}

/// Walk all instructions in emission order, recording each register's
/// definition index and last use. Returns the registers in definition
/// order, which is the order the scan places them.
fn collect_regs(func: &mut Function) -> Vec<RegId> {
    let mut order: Vec<RegId> = Vec::new();
    let regs = &mut func.regs;
    let mut ic: u32 = 1; // instruction counter

    for block in func.blocks.iter() {
        if let Some(param) = block.param {
            regs[param.idx()].def = ic;
            order.push(param);
        }

        for inst in &block.insts {
            if let Some(r0) = inst.r0 {
                if regs[r0.idx()].def == 0 {
                    regs[r0.idx()].def = ic;
                    order.push(r0);
                }
            }
            set_last_use(regs, inst.r1, ic);
            set_last_use(regs, inst.r2, ic);
            set_last_use(regs, inst.bb_arg, ic);
            if inst.op == Opcode::Call {
                for &arg in &inst.args {
                    set_last_use(regs, Some(arg), ic);
                }
            }
            ic += 1;
        }

        // A register live-out of the block is in use until its end.
        for r in block.live_out.iter_ones() {
            set_last_use(regs, Some(RegId(r as u32)), ic);
        }
    }

    order
}

/// Index of the occupant with the furthest last use, the spill victim.
fn choose_to_spill(regs: &[Reg], used: &[Option<RegId>]) -> usize {
    let mut k: usize = 0;
    for i in 1..used.len() {
        let cur = used[k].expect("spill scan over a free slot");
        let cand = used[i].expect("spill scan over a free slot");
        if regs[cur.idx()].last_use < regs[cand.idx()].last_use {
            k = i;
        }
    }
    k
}

/// Assign a physical slot to every register, spilling when full.
fn scan(regs: &mut [Reg], order: &[RegId]) {
    let mut used: Vec<Option<RegId>> = vec![None; NUM_REGS];

    for &r in order {
        // Find a free slot among the non-reserved ones. A slot whose
        // occupant's last use precedes this definition is free again.
        let mut placed = false;
        for i in 0..NUM_REGS - 1 {
            if let Some(occupant) = used[i] {
                if regs[r.idx()].def < regs[occupant.idx()].last_use {
                    continue;
                }
            }
            regs[r.idx()].real = i as i32;
            used[i] = Some(r);
            placed = true;
            break;
        }
        if placed {
            continue;
        }

        // All full: park the newcomer in the reserved slot, then evict the
        // occupant (possibly the newcomer itself) whose last use is
        // furthest.
        used[NUM_REGS - 1] = Some(r);
        let k = choose_to_spill(regs, &used);

        let victim = used[k].expect("victim slot cannot be free");
        regs[r.idx()].real = k as i32;
        regs[victim.idx()].real = (NUM_REGS - 1) as i32;
        regs[victim.idx()].spill = true;
        used[k] = Some(r);
    }
}

fn spilled_slot(regs: &[Reg], r: Option<RegId>) -> Option<(RegId, VarId)> {
    let r = r?;
    if !regs[r.idx()].spill {
        return None;
    }
    Some((r, regs[r.idx()].spill_slot.expect("spilled register without a slot")))
}

/// Bracket every reference to a spilled register with a reload before the
/// instruction and a save after it.
fn emit_spill(block: &mut Block, regs: &[Reg]) {
    let old = std::mem::take(&mut block.insts);
    let mut insts: Vec<Inst> = Vec::with_capacity(old.len());

    for inst in old {
        for operand in [inst.r1, inst.r2, inst.bb_arg] {
            if let Some((r, slot)) = spilled_slot(regs, operand) {
                insts.push(Inst {
                    op: Opcode::LoadSpill,
                    r0: Some(r),
                    var: Some(slot),
                    ..Inst::default()
                });
            }
        }
        let store = spilled_slot(regs, inst.r0);
        insts.push(inst);
        if let Some((r, slot)) = store {
            insts.push(Inst {
                op: Opcode::StoreSpill,
                r1: Some(r),
                var: Some(slot),
                ..Inst::default()
            });
        }
    }
    block.insts = insts;
}
