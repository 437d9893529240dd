//! Control Flow Analysis
//!
//! Derives the successor and predecessor relations of each function's
//! blocks from the `bb1`/`bb2` targets on block terminators. Edges are
//! computed depth-first from the entry block, so blocks unreachable from
//! the entry keep empty edge sets and are skipped by liveness.

use crate::compiler::ir::instruction::{Block, BlockId};

/// Fill `succ` and `pred` for every block reachable from `bb`.
pub fn add_edges(blocks: &mut [Block], bb: usize) {
    if !blocks[bb].succ.is_empty() {
        return;
    }
    assert!(!blocks[bb].insts.is_empty(), "empty basic block");

    let last = &blocks[bb].insts[blocks[bb].insts.len() - 1];
    let (bb1, bb2) = (last.bb1, last.bb2);

    if let Some(target) = bb1 {
        blocks[bb].succ.push(target);
        blocks[target.idx()].pred.push(BlockId(bb as u32));
        add_edges(blocks, target.idx());
    }
    if let Some(target) = bb2 {
        blocks[bb].succ.push(target);
        blocks[target.idx()].pred.push(BlockId(bb as u32));
        add_edges(blocks, target.idx());
    }
}
