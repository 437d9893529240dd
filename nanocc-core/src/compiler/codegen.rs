//! x86-64 Code Emission
//!
//! Translates allocated IR into GNU-assembler Intel syntax
//! (`.intel_syntax noprefix`). Emission order is `.data`/`.bss` records for
//! the globals, then one `.text` body per function.
//!
//! # Frame layout
//! Locals are assigned negative offsets from `rbp` in declaration order,
//! each rounded up to the variable's alignment; the final frame is rounded
//! up to 16 bytes. The prologue is
//! `push rbp; mov rbp, rsp; sub rsp, <frame>; push r12..r15`, and each
//! function ends at a unique `.Lend<N>` label holding the matching
//! epilogue.
//!
//! # Calling convention
//! Up to six integer arguments travel in `rdi, rsi, rdx, rcx, r8, r9`;
//! results return in `rax`. The two scratch registers `r10`/`r11` are
//! caller-saved around every call, and `rax` is zeroed before calls for the
//! variadic ABI convention.

use crate::compiler::ast::{Function, LabelCounter, Program, Var};
use crate::compiler::ir::instruction::{Inst, Opcode};

/// Physical registers handed out by the allocator. The last one doubles as
/// the spill staging slot.
pub const REGS: [&str; 7] = ["r10", "r11", "rbx", "r12", "r13", "r14", "r15"];
const REGS8: [&str; 7] = ["r10b", "r11b", "bl", "r12b", "r13b", "r14b", "r15b"];
const REGS32: [&str; 7] = ["r10d", "r11d", "ebx", "r12d", "r13d", "r14d", "r15d"];

/// Number of allocatable slots, including the reserved spill slot.
pub const NUM_REGS: usize = REGS.len();

const ARG_REGS: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];
const ARG_REGS8: [&str; 6] = ["dil", "sil", "dl", "cl", "r8b", "r9b"];
const ARG_REGS32: [&str; 6] = ["edi", "esi", "edx", "ecx", "r8d", "r9d"];

fn round_up(x: usize, align: usize) -> usize {
    (x + align - 1) & !(align - 1)
}

/// Pick the register name for a physical slot at a given memory width.
fn reg(r: usize, size: usize) -> &'static str {
    match size {
        1 => REGS8[r],
        4 => REGS32[r],
        8 => REGS[r],
        _ => panic!("unsupported operand size {}", size),
    }
}

fn argreg(i: usize, size: usize) -> &'static str {
    match size {
        1 => ARG_REGS8[i],
        4 => ARG_REGS32[i],
        8 => ARG_REGS[i],
        _ => panic!("unsupported argument size {}", size),
    }
}

/// Assign frame offsets to every local of the function.
fn assign_offsets(func: &mut Function) -> usize {
    let mut off: usize = 0;
    for var in func.vars.iter_mut() {
        off += var.ty.size();
        off = round_up(off, var.ty.align());
        var.offset = -(off as i32);
    }
    off
}

/// Escape initializer bytes for an `.ascii` directive with C backslash
/// escapes; non-graphic bytes become octal `\NNN`.
fn backslash_escape(data: &[u8]) -> String {
    let mut out = String::new();
    for &b in data {
        match b {
            0x08 => out.push_str("\\b"),
            0x0c => out.push_str("\\f"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'"' => out.push_str("\\\""),
            b if b.is_ascii_graphic() || b == b' ' => out.push(b as char),
            b => out.push_str(&format!("\\{:03o}", b)),
        }
    }
    out
}

/// Streaming assembly writer. Directives and labels go through `p`,
/// instructions through `emit` which prefixes a tab.
pub struct CodeGenerator {
    out: String,
}

impl CodeGenerator {
    pub fn new() -> Self {
        CodeGenerator { out: String::new() }
    }

    /// Emit the whole program, consuming the generator.
    pub fn generate(mut self, program: &mut Program, labels: &mut LabelCounter) -> String {
        self.p(".intel_syntax noprefix");

        for var in &program.globals {
            if !var.is_extern {
                self.emit_data(var);
            }
        }

        for func in program.functions.iter_mut() {
            let frame = assign_offsets(func);
            self.emit_code(func, frame, labels);
        }
        self.out
    }

    fn p(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn emit(&mut self, line: &str) {
        self.out.push('\t');
        self.p(line);
    }

    /// `.data` record for an initialized global, `.bss` otherwise.
    fn emit_data(&mut self, var: &Var) {
        match &var.data {
            Some(data) => {
                self.p(".data");
                self.p(&format!("{}:", var.name));
                self.emit(&format!(".ascii \"{}\"", backslash_escape(data)));
            }
            None => {
                self.p(".bss");
                self.p(&format!("{}:", var.name));
                self.emit(&format!(".zero {}", var.ty.size()));
            }
        }
    }

    fn emit_code(&mut self, func: &Function, frame: usize, labels: &mut LabelCounter) {
        let ret = format!(".Lend{}", labels.next());

        self.p(".text");
        self.p(&format!(".global {}", func.name));
        self.p(&format!("{}:", func.name));
        self.emit("push rbp");
        self.emit("mov rbp, rsp");
        self.emit(&format!("sub rsp, {}", round_up(frame, 16)));
        self.emit("push r12");
        self.emit("push r13");
        self.emit("push r14");
        self.emit("push r15");

        for block in &func.blocks {
            self.p(&format!(".L{}:", block.label));
            for inst in &block.insts {
                self.emit_inst(inst, func, &ret);
            }
        }

        self.p(&format!("{}:", ret));
        self.emit("pop r15");
        self.emit("pop r14");
        self.emit("pop r13");
        self.emit("pop r12");
        self.emit("mov rsp, rbp");
        self.emit("pop rbp");
        self.emit("ret");
    }

    /// `cmp` + `set<cc>` + zero-extension for the comparison opcodes.
    fn emit_cmp(&mut self, insn: &str, inst: &Inst, func: &Function) {
        let r0 = slot(inst.r0, func);
        let r1 = slot(inst.r1, func);
        let r2 = slot(inst.r2, func);

        self.emit(&format!("cmp {}, {}", REGS[r1], REGS[r2]));
        self.emit(&format!("{} {}", insn, REGS8[r0]));
        self.emit(&format!("movzb {}, {}", REGS[r0], REGS8[r0]));
    }

    fn emit_inst(&mut self, inst: &Inst, func: &Function, ret: &str) {
        let r0 = slot(inst.r0, func);
        let r1 = slot(inst.r1, func);
        let r2 = slot(inst.r2, func);

        match inst.op {
            Opcode::Imm => self.emit(&format!("mov {}, {}", REGS[r0], inst.imm)),
            Opcode::Bprel => {
                let var = &func.vars[inst.var.expect("BPREL without a variable").idx()];
                self.emit(&format!("lea {}, [rbp{}]", REGS[r0], var.offset));
            }
            Opcode::LabelAddr => {
                let name = inst.name.as_deref().expect("LABEL_ADDR without a symbol");
                self.emit(&format!("lea {}, {}", REGS[r0], name));
            }
            Opcode::Mov => self.emit(&format!("mov {}, {}", REGS[r0], REGS[r2])),
            Opcode::Load => {
                self.emit(&format!("mov {}, [{}]", reg(r0, inst.size), REGS[r2]));
                if inst.size == 1 {
                    self.emit(&format!("movzb {}, {}", REGS[r0], REGS8[r0]));
                }
            }
            Opcode::Store => {
                self.emit(&format!("mov [{}], {}", REGS[r1], reg(r2, inst.size)));
            }
            Opcode::StoreArg => {
                let var = &func.vars[inst.var.expect("STORE_ARG without a variable").idx()];
                self.emit(&format!(
                    "mov [rbp{}], {}",
                    var.offset,
                    argreg(inst.imm as usize, inst.size)
                ));
            }
            Opcode::LoadSpill => {
                let var = &func.vars[inst.var.expect("LOAD_SPILL without a slot").idx()];
                self.emit(&format!("mov {}, [rbp{}]", REGS[r0], var.offset));
            }
            Opcode::StoreSpill => {
                let var = &func.vars[inst.var.expect("STORE_SPILL without a slot").idx()];
                self.emit(&format!("mov [rbp{}], {}", var.offset, REGS[r1]));
            }
            Opcode::Add => self.emit(&format!("add {}, {}", REGS[r0], REGS[r2])),
            Opcode::Sub => self.emit(&format!("sub {}, {}", REGS[r0], REGS[r2])),
            Opcode::Mul => {
                self.emit(&format!("mov rax, {}", REGS[r2]));
                self.emit(&format!("imul {}", REGS[r0]));
                self.emit(&format!("mov {}, rax", REGS[r0]));
            }
            Opcode::Div => {
                self.emit(&format!("mov rax, {}", REGS[r0]));
                self.emit("cqo");
                self.emit(&format!("idiv {}", REGS[r2]));
                self.emit(&format!("mov {}, rax", REGS[r0]));
            }
            Opcode::Mod => {
                self.emit(&format!("mov rax, {}", REGS[r0]));
                self.emit("cqo");
                self.emit(&format!("idiv {}", REGS[r2]));
                self.emit(&format!("mov {}, rdx", REGS[r0]));
            }
            Opcode::And => self.emit(&format!("and {}, {}", REGS[r0], REGS[r2])),
            Opcode::Or => self.emit(&format!("or {}, {}", REGS[r0], REGS[r2])),
            Opcode::Xor => self.emit(&format!("xor {}, {}", REGS[r0], REGS[r2])),
            Opcode::Shl => {
                self.emit(&format!("mov cl, {}", REGS8[r2]));
                self.emit(&format!("shl {}, cl", REGS[r0]));
            }
            Opcode::Shr => {
                self.emit(&format!("mov cl, {}", REGS8[r2]));
                self.emit(&format!("shr {}, cl", REGS[r0]));
            }
            Opcode::Eq => self.emit_cmp("sete", inst, func),
            Opcode::Ne => self.emit_cmp("setne", inst, func),
            Opcode::Lt => self.emit_cmp("setl", inst, func),
            Opcode::Le => self.emit_cmp("setle", inst, func),
            Opcode::Jmp => {
                let target = inst.bb1.expect("JMP without a target");
                if let Some(arg) = inst.bb_arg {
                    let param = func.blocks[target.idx()]
                        .param
                        .expect("jump argument into a block without a parameter");
                    self.emit(&format!(
                        "mov {}, {}",
                        REGS[slot(Some(param), func)],
                        REGS[slot(Some(arg), func)]
                    ));
                }
                self.emit(&format!("jmp .L{}", func.blocks[target.idx()].label));
            }
            Opcode::Br => {
                let then = inst.bb1.expect("BR without a then target");
                let els = inst.bb2.expect("BR without an else target");
                self.emit(&format!("cmp {}, 0", REGS[r2]));
                self.emit(&format!("jne .L{}", func.blocks[then.idx()].label));
                self.emit(&format!("jmp .L{}", func.blocks[els.idx()].label));
            }
            Opcode::Call => {
                let name = inst.name.as_deref().expect("CALL without a callee");
                for (i, &arg) in inst.args.iter().enumerate() {
                    self.emit(&format!(
                        "mov {}, {}",
                        ARG_REGS[i],
                        REGS[slot(Some(arg), func)]
                    ));
                }
                self.emit("push r10");
                self.emit("push r11");
                self.emit("mov rax, 0");
                self.emit(&format!("call {}", name));
                self.emit("pop r11");
                self.emit("pop r10");
                self.emit(&format!("mov {}, rax", REGS[r0]));
            }
            Opcode::Return => {
                self.emit(&format!("mov rax, {}", REGS[r2]));
                self.emit(&format!("jmp {}", ret));
            }
            Opcode::Nop => {}
        }
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Physical slot of a register operand; unused operands read as slot 0,
/// which the opcodes that lack the operand never touch.
fn slot(r: Option<crate::compiler::ir::instruction::RegId>, func: &Function) -> usize {
    match r {
        Some(r) => {
            let real = func.regs[r.idx()].real;
            assert!(real >= 0, "unallocated register reached the emitter");
            real as usize
        }
        None => 0,
    }
}
