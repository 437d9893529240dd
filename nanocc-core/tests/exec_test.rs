//! End-to-end execution tests: compile, assemble with the host toolchain,
//! run, and assert the exit status. Skipped when no suitable host
//! toolchain is present or the host is not x86-64 Linux.

mod common;

use std::path::PathBuf;
use std::process::Command;

fn host_can_execute() -> bool {
    if !cfg!(all(target_arch = "x86_64", target_os = "linux")) {
        eprintln!("skipping execution tests: host is not x86-64 Linux");
        return false;
    }
    let available = Command::new("cc")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !available {
        eprintln!("skipping execution tests: no cc on PATH");
    }
    available
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("nanocc-exec-{}-{}", std::process::id(), name));
    std::fs::create_dir_all(&dir).expect("scratch dir should be creatable");
    dir
}

fn run_scenario(name: &str, source: &str, expected: i32) {
    let asm = nanocc_core::compile(&format!("{name}.c"), source)
        .unwrap_or_else(|e| panic!("{name} failed to compile: {e}"));

    let dir = scratch_dir(name);
    let asm_path = dir.join(format!("{name}.s"));
    let bin_path = dir.join(name);
    std::fs::write(&asm_path, &asm).expect("assembly should be writable");

    let assembled = Command::new("cc")
        .arg("-no-pie")
        .arg("-o")
        .arg(&bin_path)
        .arg(&asm_path)
        .output()
        .expect("cc should run");
    assert!(
        assembled.status.success(),
        "{name}: cc rejected the assembly:\n{}\n{}",
        String::from_utf8_lossy(&assembled.stderr),
        asm
    );

    let run = Command::new(&bin_path).output().expect("binary should run");
    assert_eq!(
        run.status.code(),
        Some(expected),
        "{name}: wrong exit status\n{asm}"
    );

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_execute_scenarios() {
    if !host_can_execute() {
        return;
    }
    for (name, source, expected) in common::scenarios() {
        run_scenario(name, source, expected);
    }
}

#[test]
fn test_execute_switch_dispatch() {
    if !host_can_execute() {
        return;
    }
    run_scenario(
        "switch",
        "int main(){ int x=2; switch(x){ case 1: return 10; case 2: return 20; \
         default: return 30; } return 0; }",
        20,
    );
    run_scenario(
        "switch_default",
        "int main(){ int x=9; switch(x){ case 1: return 10; default: return 30; } return 0; }",
        30,
    );
    run_scenario(
        "switch_fallthrough",
        "int main(){ int x=1; int n=0; switch(x){ case 1: n+=1; case 2: n+=2; } return n; }",
        3,
    );
}

#[test]
fn test_execute_short_circuit() {
    if !host_can_execute() {
        return;
    }
    run_scenario(
        "logic_and",
        "int side(int *p){ *p = *p + 1; return 1; } \
         int main(){ int n=0; int r = 0 && side(&n); return n*10 + r; }",
        0,
    );
    run_scenario(
        "logic_or",
        "int side(int *p){ *p = *p + 1; return 0; } \
         int main(){ int n=0; int r = 1 || side(&n); return n*10 + r; }",
        1,
    );
}

#[test]
fn test_execute_spill_pressure() {
    if !host_can_execute() {
        return;
    }
    run_scenario(
        "spill",
        "int main(){ \
         int a=1; int b=2; int c=3; int d=4; int e=5; \
         int f=6; int g=7; int h=8; int i=9; int j=10; \
         return a+b+c+d+e+f+g+h+i+j; }",
        55,
    );
}

#[test]
fn test_execute_do_while_and_continue() {
    if !host_can_execute() {
        return;
    }
    run_scenario(
        "do_while",
        "int main(){ int n=0; int i=0; do { i=i+1; n=n+i; } while(i<4); return n; }",
        10,
    );
    run_scenario(
        "continue",
        "int main(){ int n=0; for(int i=0;i<5;i=i+1){ if(i==2) continue; n=n+i; } return n; }",
        8,
    );
}
