//! Assembly-level checks over the emitted text.

mod common;

#[test]
fn test_module_shape() {
    let asm = common::compiled("int main(){ return 0; }");
    assert!(asm.starts_with(".intel_syntax noprefix\n"));
    assert!(asm.contains(".text"), "code section missing");
    assert!(asm.contains(".global main"), "entry symbol not exported");
    assert!(asm.contains("main:"), "function label missing");
    assert!(asm.contains("\tpush rbp"), "prologue missing");
    assert!(asm.contains("\tmov rbp, rsp"), "frame pointer setup missing");
    assert!(asm.contains(".Lend"), "epilogue label missing");
    assert!(asm.contains("\tret"), "epilogue missing");
}

#[test]
fn test_constant_fold_scenario() {
    let asm = common::compiled("int main(){ return 2+3*4; }");
    assert!(
        asm.contains("mov r10, 14"),
        "2+3*4 should be folded to a single immediate:\n{asm}"
    );
    assert!(asm.contains("mov rax, r10"), "result should route through rax");
    assert!(!asm.contains("imul"), "no runtime multiply after folding");
}

#[test]
fn test_fib_scenario() {
    let asm = common::compiled(
        "int fib(int n){ if(n<2) return n; return fib(n-1)+fib(n-2); } \
         int main(){ return fib(10); }",
    );
    assert!(asm.contains(".global fib"));
    assert!(asm.contains("call fib"), "recursion emits calls");
    assert!(asm.contains("setl"), "n<2 compiles to setl");
    // Caller-saved scratch registers are preserved around every call.
    assert!(asm.contains("\tpush r10\n\tpush r11\n\tmov rax, 0\n\tcall fib"));
    assert!(asm.contains("\tpop r11\n\tpop r10"));
    assert!(asm.contains("mov rdi, "), "the argument travels in rdi");
}

#[test]
fn test_array_scenario_uses_scaled_addressing() {
    let asm = common::compiled(
        "int main(){ int a[4]; a[0]=1; a[1]=2; a[2]=3; a[3]=4; int s=0; \
         for(int i=0;i<4;i++) s+=a[i]; return s; }",
    );
    assert!(asm.contains("lea "), "array base is an address computation");
    assert!(asm.contains("imul"), "int subscripts scale by four");
    assert!(asm.contains("mov r10, 4") || asm.contains(", 4\n"), "the scale constant appears");
}

#[test]
fn test_pointer_scenario_keeps_memory_traffic() {
    let asm = common::compiled("int main(){ int x=7; int *p=&x; *p = *p + 1; return x; }");
    // x is address-taken: it must live in the frame, not a register.
    assert!(
        asm.contains("lea ") && asm.contains("[rbp-4]"),
        "address-taken local keeps its stack slot:\n{asm}"
    );
}

#[test]
fn test_promoted_scalar_has_no_frame_traffic() {
    let asm = common::compiled("int main(){ int x=7; return x; }");
    assert!(
        !asm.contains("[rbp-"),
        "an address-free int local should be promoted off the frame:\n{asm}"
    );
}

#[test]
fn test_comparisons_emit_setcc() {
    let asm = common::compiled(
        "int main(){ int a=1; int b=2; return (a==b) + (a!=b) + (a<b) + (a<=b); }",
    );
    for insn in ["sete", "setne", "setl", "setle"] {
        assert!(asm.contains(insn), "{insn} missing:\n{asm}");
    }
    assert!(asm.contains("movzb"), "comparison results are zero-extended");
}

#[test]
fn test_division_routes_through_rax() {
    let asm = common::compiled("int main(){ int a=7; int b=2; return a/b + a%b; }");
    assert!(asm.contains("cqo"), "signed division sign-extends");
    assert!(asm.contains("idiv"), "division uses idiv");
    assert!(asm.contains("mov r10, rdx") || asm.contains("rdx"), "modulo reads rdx");
}

#[test]
fn test_shift_counts_route_through_cl() {
    let asm = common::compiled("int main(){ int a=1; int b=3; return a<<b; }");
    assert!(asm.contains("mov cl, "), "variable shift count goes through cl");
    assert!(asm.contains("shl "), "shift emitted");
}

#[test]
fn test_ternary_copies_block_argument() {
    let asm = common::compiled("int main(){ int x=1; return (x==1)?42:0; }");
    assert!(asm.contains("sete"), "the condition compiles to sete");
    assert!(asm.contains(", 42"), "the then-arm immediate appears");
    // Both arms jump to the merge block.
    let jumps = asm.matches("jmp .L").count();
    assert!(jumps >= 2, "both ternary arms jump to the merge block:\n{asm}");
}

#[test]
fn test_string_literal_data_emission() {
    let asm = common::compiled(
        "int puts(char *s); int main(){ puts(\"hi\\n\"); return 0; }",
    );
    assert!(asm.contains(".data"), "initialized globals go to .data");
    assert!(
        asm.contains(".ascii \"hi\\n\\000\""),
        "string bytes escape with the NUL terminator:\n{asm}"
    );
}

#[test]
fn test_zero_initialized_global_goes_to_bss() {
    let asm = common::compiled("int g[4]; int main(){ g[0]=5; return g[0]; }");
    assert!(asm.contains(".bss"), "uninitialized globals go to .bss");
    assert!(asm.contains(".zero 16"), "int g[4] reserves sixteen bytes");
    assert!(asm.contains(", g"), "the global is addressed by label");
}

#[test]
fn test_extern_global_emits_no_storage() {
    let asm = common::compiled("extern int g; int main(){ return g; }");
    assert!(!asm.contains(".zero"), "extern globals reserve no storage");
    assert!(asm.contains(", g"), "extern globals are still addressable");
}

#[test]
fn test_parameters_spill_into_the_frame() {
    let asm = common::compiled("int add(int a, int b){ return a+b; } int main(){ return add(1,2); }");
    assert!(asm.contains("mov [rbp-4], edi"), "first int parameter spills from edi");
    assert!(asm.contains("mov [rbp-8], esi"), "second int parameter spills from esi");
}

#[test]
fn test_spill_heavy_program_touches_spill_slots() {
    let asm = common::compiled(
        "int main(){ \
         int a=1; int b=2; int c=3; int d=4; int e=5; \
         int f=6; int g=7; int h=8; int i=9; int j=10; \
         return a+b+c+d+e+f+g+h+i+j; }",
    );
    assert!(
        asm.contains("mov r15, [rbp-") && asm.contains("], r15"),
        "spills stage through the reserved register:\n{asm}"
    );
}

#[test]
fn test_char_load_zero_extends() {
    let asm = common::compiled("int main(){ char c; char *p = &c; return *p; }");
    assert!(asm.contains("movzb"), "byte loads zero-extend:\n{asm}");
}
