//! Block scope (spec §3 "Block scope"), grounded on the teacher's block
//! chain concept in `compiler/helpers.rs` and spec §4.E's control-flow
//! section.

use crate::limits::JMP_NONE;

/// One lexical block within a function body. Blocks nest via a stack kept
/// on [`super::func_state::FuncState`]; `break` walks that stack outward to
/// find the innermost loop.
#[derive(Debug)]
pub struct BlockScope {
    /// Index into the owning `FuncState`'s locals array at block entry;
    /// locals declared after this point go out of scope when the block
    /// ends.
    pub first_local: usize,
    pub is_loop: bool,
    /// Head of the jump list `break` statements in this loop append to.
    pub break_list: i32,
}

impl BlockScope {
    pub fn new(first_local: usize, is_loop: bool) -> Self {
        BlockScope {
            first_local,
            is_loop,
            break_list: JMP_NONE,
        }
    }
}
