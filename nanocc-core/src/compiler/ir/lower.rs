//! Lowering (AST → IR)
//!
//! Walks the typed AST of each function and emits three-address IR into a
//! freshly built control-flow graph. Every expression yields a fresh virtual
//! register; merges use block parameters instead of phi nodes: short-circuit
//! `&&`/`||` chains and `?:` jump to a merge block whose single parameter
//! register is supplied by each predecessor's `Jmp` through `bb_arg`.
//!
//! The entry block of every function is block 0, holds only a jump to the
//! first real block, and has no predecessors. Parameters are spilled to
//! their stack slots with `StoreArg`, and every body ends with an implicit
//! `return 0` so the liveness pass always sees a terminal. Once a function
//! is lowered its statement tree is dropped; later passes depend only on
//! the IR.

use smallvec::SmallVec;

use crate::compiler::ast::{
    Expr, ExprKind, Function, LabelCounter, LogicalOp, Program, Stmt, SwitchCase, UnOp, Var,
    VarId, VarRef,
};
use crate::compiler::ir::instruction::{Block, BlockId, Inst, Opcode, Reg, RegId};

/// Lower every function of the program.
pub fn lower(program: &mut Program, labels: &mut LabelCounter) {
    let globals: &[Var] = &program.globals;

    for func in program.functions.iter_mut() {
        let body = func.body.take().expect("function lowered twice");
        let params = func.params.clone();

        let mut lowerer = Lowerer {
            func: &mut *func,
            globals,
            labels: &mut *labels,
            out: BlockId(0),
            breaks: Vec::new(),
            continues: Vec::new(),
            switches: Vec::new(),
        };
        lowerer.run(&params, &body);

        log::debug!(
            "lowered {}: {} blocks, {} virtual registers",
            func.name,
            func.blocks.len(),
            func.regs.len()
        );
    }
}

/// Per-function lowering state: the current output block and the
/// break/continue/switch target stacks.
struct Lowerer<'a> {
    func: &'a mut Function,
    globals: &'a [Var],
    labels: &'a mut LabelCounter,
    /// Block currently being appended to.
    out: BlockId,
    breaks: Vec<BlockId>,
    continues: Vec<BlockId>,
    /// Per-switch case target blocks, indexed by the case's table position.
    switches: Vec<Vec<BlockId>>,
}

impl<'a> Lowerer<'a> {
    fn run(&mut self, params: &[VarId], body: &Stmt) {
        // An empty entry block makes the later analyses easy: it has no
        // predecessors and only jumps to the first real block.
        let entry = self.new_bb();
        let first = self.new_bb();
        self.out = entry;
        self.emit_jmp(first);
        self.out = first;

        for (i, &param) in params.iter().enumerate() {
            self.gen_param(param, i);
        }

        self.gen_stmt(body);

        // Always end with a return so liveness is terminal.
        let r = self.emit_imm(0);
        self.push(Inst {
            op: Opcode::Return,
            r2: Some(r),
            ..Inst::default()
        });
    }

    // --- construction helpers --------------------------------------------

    fn new_bb(&mut self) -> BlockId {
        let id = BlockId(self.func.blocks.len() as u32);
        self.func.blocks.push(Block::new(self.labels.next()));
        id
    }

    fn new_reg(&mut self) -> RegId {
        let id = RegId(self.func.regs.len() as u32);
        self.func.regs.push(Reg::new(id.0 + 1));
        id
    }

    fn push(&mut self, inst: Inst) {
        self.func.blocks[self.out.idx()].insts.push(inst);
    }

    fn emit_imm(&mut self, imm: i64) -> RegId {
        let r = self.new_reg();
        self.push(Inst {
            op: Opcode::Imm,
            r0: Some(r),
            imm,
            ..Inst::default()
        });
        r
    }

    fn emit_jmp(&mut self, target: BlockId) {
        self.push(Inst {
            op: Opcode::Jmp,
            bb1: Some(target),
            ..Inst::default()
        });
    }

    /// Jump carrying a value into the target's block parameter.
    fn emit_jmp_arg(&mut self, target: BlockId, arg: RegId) {
        self.push(Inst {
            op: Opcode::Jmp,
            bb1: Some(target),
            bb_arg: Some(arg),
            ..Inst::default()
        });
    }

    fn emit_br(&mut self, cond: RegId, then: BlockId, els: BlockId) {
        self.push(Inst {
            op: Opcode::Br,
            r2: Some(cond),
            bb1: Some(then),
            bb2: Some(els),
            ..Inst::default()
        });
    }

    fn emit_load(&mut self, dst: RegId, addr: RegId, size: usize) {
        self.push(Inst {
            op: Opcode::Load,
            r0: Some(dst),
            r2: Some(addr),
            size,
            ..Inst::default()
        });
    }

    // --- expressions ------------------------------------------------------

    /// Evaluate an expression as an lvalue: the address it designates.
    ///
    /// `&` suppresses the lvalue-to-rvalue load by routing through this
    /// function directly.
    fn gen_lval(&mut self, e: &Expr) -> RegId {
        match &e.kind {
            ExprKind::Deref(inner) => self.gen_expr(inner),
            ExprKind::VarRef(VarRef::Local(vid)) => {
                let r = self.new_reg();
                self.push(Inst {
                    op: Opcode::Bprel,
                    r0: Some(r),
                    var: Some(*vid),
                    ..Inst::default()
                });
                r
            }
            ExprKind::VarRef(VarRef::Global(gi)) => {
                let r = self.new_reg();
                self.push(Inst {
                    op: Opcode::LabelAddr,
                    r0: Some(r),
                    name: Some(self.globals[*gi].name.clone()),
                    ..Inst::default()
                });
                r
            }
            ExprKind::Member { .. } => {
                unreachable!("member access is rejected by the front end")
            }
            _ => unreachable!("expression is not an lvalue"),
        }
    }

    fn gen_unop(&mut self, op: UnOp, operand: &Expr) -> RegId {
        let r0 = self.new_reg();
        let r = self.gen_expr(operand);
        match op {
            // !x is x == 0.
            UnOp::Not => {
                let zero = self.emit_imm(0);
                self.push(Inst {
                    op: Opcode::Eq,
                    r0: Some(r0),
                    r1: Some(r),
                    r2: Some(zero),
                    ..Inst::default()
                });
            }
            // ~x is x ^ -1.
            UnOp::BitNot => {
                let ones = self.emit_imm(-1);
                self.push(Inst {
                    op: Opcode::Xor,
                    r0: Some(r0),
                    r1: Some(r),
                    r2: Some(ones),
                    ..Inst::default()
                });
            }
        }
        r0
    }

    /// Short-circuit chain: every non-final operand branches either to the
    /// next operand or to the short-circuit sink; both sinks jump to a merge
    /// block carrying 0 or 1 as its parameter.
    fn gen_logical(&mut self, op: LogicalOp, exprs: &[Expr]) -> RegId {
        let set0 = self.new_bb();
        let set1 = self.new_bb();
        let last = self.new_bb();

        let (init, tail) = exprs.split_at(exprs.len() - 1);
        for e in init {
            let r = self.gen_expr(e);
            let next = self.new_bb();
            match op {
                LogicalOp::And => self.emit_br(r, next, set0),
                LogicalOp::Or => self.emit_br(r, set1, next),
            }
            self.out = next;
        }
        let r = self.gen_expr(&tail[0]);
        self.emit_br(r, set1, set0);

        self.out = set0;
        let zero = self.emit_imm(0);
        self.emit_jmp_arg(last, zero);

        self.out = set1;
        let one = self.emit_imm(1);
        self.emit_jmp_arg(last, one);

        self.out = last;
        let param = self.new_reg();
        self.func.blocks[last.idx()].param = Some(param);
        param
    }

    fn gen_cond(&mut self, cond: &Expr, then: &Expr, els: &Expr) -> RegId {
        let then_bb = self.new_bb();
        let els_bb = self.new_bb();
        let last = self.new_bb();

        let c = self.gen_expr(cond);
        self.emit_br(c, then_bb, els_bb);

        self.out = then_bb;
        let t = self.gen_expr(then);
        self.emit_jmp_arg(last, t);

        self.out = els_bb;
        let e = self.gen_expr(els);
        self.emit_jmp_arg(last, e);

        self.out = last;
        let param = self.new_reg();
        self.func.blocks[last.idx()].param = Some(param);
        param
    }

    /// Evaluate an expression; yields the register holding its value.
    fn gen_expr(&mut self, e: &Expr) -> RegId {
        match &e.kind {
            ExprKind::Num(v) => self.emit_imm(*v),
            ExprKind::Binop { op, lhs, rhs } => {
                let r0 = self.new_reg();
                let r1 = self.gen_expr(lhs);
                let r2 = self.gen_expr(rhs);
                self.push(Inst {
                    op: Opcode::from(*op),
                    r0: Some(r0),
                    r1: Some(r1),
                    r2: Some(r2),
                    ..Inst::default()
                });
                r0
            }
            ExprKind::Unop { op, operand } => self.gen_unop(*op, operand),
            ExprKind::Logical { op, exprs } => self.gen_logical(*op, exprs),
            ExprKind::Comma(exprs) => {
                let (init, tail) = exprs.split_at(exprs.len() - 1);
                for e in init {
                    self.gen_expr(e);
                }
                self.gen_expr(&tail[0])
            }
            ExprKind::Cond { cond, then, els } => self.gen_cond(cond, then, els),
            ExprKind::VarRef(_) => {
                let r = self.new_reg();
                let addr = self.gen_lval(e);
                self.emit_load(r, addr, e.ctype.size());
                r
            }
            ExprKind::Addr(inner) => self.gen_lval(inner),
            ExprKind::Deref(inner) => {
                let r = self.new_reg();
                let addr = self.gen_expr(inner);
                self.emit_load(r, addr, e.ctype.size());
                r
            }
            ExprKind::Member { .. } => {
                unreachable!("member access is rejected by the front end")
            }
            ExprKind::Call { name, args } => {
                // Arguments evaluate left to right.
                let mut regs: SmallVec<[RegId; 6]> = SmallVec::new();
                for arg in args {
                    regs.push(self.gen_expr(arg));
                }
                let r0 = self.new_reg();
                self.push(Inst {
                    op: Opcode::Call,
                    r0: Some(r0),
                    name: Some(name.clone()),
                    args: regs,
                    ..Inst::default()
                });
                r0
            }
            ExprKind::StmtExpr { stmts, last } => {
                for s in stmts {
                    self.gen_stmt(s);
                }
                self.gen_expr(last)
            }
            ExprKind::Assign { lhs, rhs } => {
                let value = self.gen_expr(rhs);
                let addr = self.gen_lval(lhs);
                self.push(Inst {
                    op: Opcode::Store,
                    r1: Some(addr),
                    r2: Some(value),
                    size: e.ctype.size(),
                    ..Inst::default()
                });
                value
            }
        }
    }

    // --- statements -------------------------------------------------------

    fn gen_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Null => {}
            Stmt::If { cond, then, els } => {
                let then_bb = self.new_bb();
                let els_bb = self.new_bb();
                let last = self.new_bb();

                let c = self.gen_expr(cond);
                self.emit_br(c, then_bb, els_bb);

                self.out = then_bb;
                self.gen_stmt(then);
                self.emit_jmp(last);

                self.out = els_bb;
                if let Some(els) = els {
                    self.gen_stmt(els);
                }
                self.emit_jmp(last);

                self.out = last;
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                let cond_bb = self.new_bb();
                let cont_bb = self.new_bb();
                let body_bb = self.new_bb();
                let break_bb = self.new_bb();

                if let Some(init) = init {
                    self.gen_expr(init);
                }
                self.emit_jmp(cond_bb);

                self.out = cond_bb;
                match cond {
                    Some(cond) => {
                        let r = self.gen_expr(cond);
                        self.emit_br(r, body_bb, break_bb);
                    }
                    None => self.emit_jmp(body_bb),
                }

                self.out = body_bb;
                self.breaks.push(break_bb);
                self.continues.push(cont_bb);
                self.gen_stmt(body);
                self.breaks.pop();
                self.continues.pop();
                self.emit_jmp(cont_bb);

                self.out = cont_bb;
                if let Some(step) = step {
                    self.gen_expr(step);
                }
                self.emit_jmp(cond_bb);

                self.out = break_bb;
            }
            Stmt::DoWhile { cond, body } => {
                let cont_bb = self.new_bb();
                let body_bb = self.new_bb();
                let break_bb = self.new_bb();

                self.emit_jmp(body_bb);

                self.out = body_bb;
                self.breaks.push(break_bb);
                self.continues.push(cont_bb);
                self.gen_stmt(body);
                self.breaks.pop();
                self.continues.pop();
                self.emit_jmp(cont_bb);

                self.out = cont_bb;
                let r = self.gen_expr(cond);
                self.emit_br(r, body_bb, break_bb);

                self.out = break_bb;
            }
            Stmt::Switch { cond, cases, body } => self.gen_switch(cond, cases, body),
            Stmt::Case { index, body } => {
                let bb = self.switches.last().expect("stray case survived parsing")[*index];
                self.emit_jmp(bb);
                self.out = bb;
                self.gen_stmt(body);
            }
            Stmt::Break => {
                let target = *self.breaks.last().expect("stray break survived parsing");
                self.emit_jmp(target);
                self.out = self.new_bb();
            }
            Stmt::Continue => {
                let target = *self
                    .continues
                    .last()
                    .expect("stray continue survived parsing");
                self.emit_jmp(target);
                self.out = self.new_bb();
            }
            Stmt::Return(value) => {
                let r = match value {
                    Some(e) => self.gen_expr(e),
                    None => self.emit_imm(0),
                };
                self.push(Inst {
                    op: Opcode::Return,
                    r2: Some(r),
                    ..Inst::default()
                });
                // Anything after a return lowers into a fresh, dead block.
                self.out = self.new_bb();
            }
            Stmt::Expr(e) => {
                self.gen_expr(e);
            }
            Stmt::Block(stmts) => {
                for s in stmts {
                    self.gen_stmt(s);
                }
            }
        }
    }

    /// Lower a `switch` as an `Eq`-compare chain over the non-default case
    /// constants; on no match control falls to the `default` block if one
    /// was registered, else to the break target. Case bodies are emitted
    /// inline after the chain so textual fall-through is preserved.
    fn gen_switch(&mut self, cond: &Expr, cases: &[SwitchCase], body: &Stmt) {
        let break_bb = self.new_bb();
        let r = self.gen_expr(cond);

        let mut case_bbs: Vec<BlockId> = Vec::with_capacity(cases.len());
        for case in cases {
            let case_bb = self.new_bb();
            case_bbs.push(case_bb);
            let value = match case.value {
                Some(v) => v,
                None => continue,
            };
            let next = self.new_bb();
            let r2 = self.new_reg();
            let rv = self.emit_imm(value);
            self.push(Inst {
                op: Opcode::Eq,
                r0: Some(r2),
                r1: Some(r),
                r2: Some(rv),
                ..Inst::default()
            });
            self.emit_br(r2, case_bb, next);
            self.out = next;
        }

        let fallback = cases
            .iter()
            .position(|c| c.value.is_none())
            .map(|i| case_bbs[i])
            .unwrap_or(break_bb);
        self.emit_jmp(fallback);

        // Statements before the first case label are unreachable; give them
        // a block of their own so the dispatch block keeps a single
        // terminator.
        self.out = self.new_bb();

        self.breaks.push(break_bb);
        self.switches.push(case_bbs);
        self.gen_stmt(body);
        self.switches.pop();
        self.breaks.pop();

        self.emit_jmp(break_bb);
        self.out = break_bb;
    }

    /// Spill parameter `i` from its ABI register to the stack. Parameters
    /// count as address-taken so scalar replacement leaves them in memory.
    fn gen_param(&mut self, param: VarId, i: usize) {
        let size = self.func.vars[param.idx()].ty.size();
        self.push(Inst {
            op: Opcode::StoreArg,
            var: Some(param),
            imm: i as i64,
            size,
            ..Inst::default()
        });
        self.func.vars[param.idx()].address_taken = true;
    }
}
