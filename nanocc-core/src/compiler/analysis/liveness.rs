//! Liveness Analysis
//!
//! Computes, for every block, the set of registers defined in it (`defs`)
//! and the live-in/live-out sets, by back-propagating each operand use
//! through the predecessor relation. The propagation is driven entirely by
//! newly added members, so it reaches a monotone fixed point in one pass
//! over the instructions.
//!
//! Liveness sets are bit vectors with one bit per virtual register: cheap
//! membership tests and no allocation per member.
//!
//! Registers still live-in at the entry block correspond to variables used
//! before any assignment. Each one gets a dummy `IMM r ← 0` definition at
//! the top of the entry block, which both restores the "every use has a
//! def" invariant for the allocator and gives uninitialized locals a
//! deterministic zero.

use bitvec::prelude::*;

use crate::compiler::analysis::control_flow::add_edges;
use crate::compiler::ir::instruction::{Block, Inst, Opcode, RegId};
use crate::compiler::ast::Program;

/// Run liveness over every function of the program.
pub fn analyze(program: &mut Program) {
    for func in program.functions.iter_mut() {
        add_edges(&mut func.blocks, 0);

        let nregs = func.regs.len();
        for block in func.blocks.iter_mut() {
            block.defs = bitvec![u32, Lsb0; 0; nregs];
            block.live_in = bitvec![u32, Lsb0; 0; nregs];
            block.live_out = bitvec![u32, Lsb0; 0; nregs];

            if let Some(param) = block.param {
                block.defs.set(param.idx(), true);
            }
            for inst in &block.insts {
                if let Some(r0) = inst.r0 {
                    block.defs.set(r0.idx(), true);
                }
            }
        }

        for bi in 0..func.blocks.len() {
            for ii in 0..func.blocks[bi].insts.len() {
                let (r1, r2, bb_arg, args) = {
                    let inst: &Inst = &func.blocks[bi].insts[ii];
                    let args = if inst.op == Opcode::Call {
                        inst.args.clone()
                    } else {
                        Default::default()
                    };
                    (inst.r1, inst.r2, inst.bb_arg, args)
                };
                propagate(&mut func.blocks, bi, r1);
                propagate(&mut func.blocks, bi, r2);
                propagate(&mut func.blocks, bi, bb_arg);
                for arg in args {
                    propagate(&mut func.blocks, bi, Some(arg));
                }
            }
        }

        // Dummy zero-definitions for registers live-in at the entry.
        let entry_in: Vec<usize> = func.blocks[0].live_in.iter_ones().collect();
        for (i, &r) in entry_in.iter().enumerate() {
            let inst = Inst {
                op: Opcode::Imm,
                r0: Some(RegId(r as u32)),
                imm: 0,
                ..Inst::default()
            };
            func.blocks[0].insts.insert(i, inst);
            func.blocks[0].defs.set(r, true);
        }
        func.blocks[0].live_in = bitvec![u32, Lsb0; 0; nregs];

        if !entry_in.is_empty() {
            log::debug!(
                "{}: {} register(s) live-in at entry, zero-initialized",
                func.name,
                entry_in.len()
            );
        }
    }
}

/// Back-propagate a use of `r` in `bb`: stop at a defining block, otherwise
/// union into `live_in` and push through every predecessor whose `live_out`
/// did not already contain it.
fn propagate(blocks: &mut [Block], bb: usize, r: Option<RegId>) {
    let r = match r {
        Some(r) => r,
        None => return,
    };
    if blocks[bb].defs[r.idx()] {
        return;
    }
    if blocks[bb].live_in[r.idx()] {
        return;
    }
    blocks[bb].live_in.set(r.idx(), true);

    let preds = blocks[bb].pred.clone();
    for pred in preds {
        if !blocks[pred.idx()].live_out[r.idx()] {
            blocks[pred.idx()].live_out.set(r.idx(), true);
            propagate(blocks, pred.idx(), Some(r));
        }
    }
}
