//! Scalar Replacement
//!
//! Promotes `int` locals whose address is never taken into pure virtual
//! registers, eliminating their stack traffic. The rewrite works on the
//! `BPREL` / `LOAD` / `STORE` triples the lowering stage emits:
//!
//! ```text
//! BPREL r1, <local>        NOP                  (r1 aliases the promoted reg)
//! STORE *r1 ← r2     →     MOV promoted ← r2
//! LOAD  r3 ← *r1           MOV r3 ← promoted
//! ```
//!
//! Parameters and anything touched by `&` carry `address_taken` and are
//! left in memory.

use crate::compiler::ast::{Program, Type};
use crate::compiler::ir::instruction::{Opcode, Reg, RegId};

/// Run scalar replacement over the whole program.
pub fn optimize(program: &mut Program) {
    for func in program.functions.iter_mut() {
        let name = func.name.clone();
        let mut promoted: usize = 0;

        let vars = &mut func.vars;
        let regs = &mut func.regs;
        for block in func.blocks.iter_mut() {
            for inst in block.insts.iter_mut() {
                match inst.op {
                    Opcode::Bprel => {
                        let vid = inst.var.expect("BPREL without a variable");
                        let var = &mut vars[vid.idx()];
                        if var.address_taken || var.ty != Type::Int {
                            continue;
                        }
                        let alias = match var.promoted {
                            Some(r) => r,
                            None => {
                                let r = RegId(regs.len() as u32);
                                regs.push(Reg::new(r.0 + 1));
                                var.promoted = Some(r);
                                promoted += 1;
                                r
                            }
                        };
                        inst.op = Opcode::Nop;
                        let r0 = inst.r0.expect("BPREL without a destination");
                        regs[r0.idx()].promoted = Some(alias);
                    }
                    Opcode::Load => {
                        let addr = inst.r2.expect("LOAD without an address");
                        if let Some(alias) = regs[addr.idx()].promoted {
                            inst.op = Opcode::Mov;
                            inst.r2 = Some(alias);
                        }
                    }
                    Opcode::Store => {
                        let addr = inst.r1.expect("STORE without an address");
                        if let Some(alias) = regs[addr.idx()].promoted {
                            inst.op = Opcode::Mov;
                            inst.r0 = Some(alias);
                            inst.r1 = None;
                        }
                    }
                    _ => {}
                }
            }
        }

        if promoted > 0 {
            log::debug!("{}: promoted {} scalar local(s)", name, promoted);
        }
    }
}
