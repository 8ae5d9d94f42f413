//! Per-function compile-time scope (spec §3 "Function scope"), grounded on
//! the teacher's `FuncState` concept (`compiler/func_state.rs`) and spec
//! §4.E's slot allocator.

use crate::bytecode::Instruction;
use crate::error::{LuaError, SourcePos};
use crate::limits::MAX_LOCALS;
use crate::value::{FunctionProto, Value};

use super::block::BlockScope;

pub struct FuncState {
    pub proto: FunctionProto,
    /// Named locals in declaration order; slot == index.
    pub locals: Vec<String>,
    /// Highest slot reserved so far (locals + live temporaries).
    pub num_stack: usize,
    /// High-water mark of `num_stack` across the function's whole body,
    /// surviving block exits that shrink `num_stack` back down; copied into
    /// `proto.max_stack` once the body is fully compiled.
    pub max_stack: usize,
    pub blocks: Vec<BlockScope>,
}

impl FuncState {
    pub fn new(chunk_name: String) -> Self {
        FuncState {
            proto: FunctionProto::new(chunk_name),
            locals: Vec::new(),
            num_stack: 0,
            max_stack: 0,
            blocks: vec![BlockScope::new(0, false)],
        }
    }

    pub fn num_locals(&self) -> usize {
        self.locals.len()
    }

    /// Limits on locals/constants/jump offsets are all syntax errors (spec
    /// §7: ">65 536 constants", ">253 locals", "jump offset too large" are
    /// all classified under the syntax kind, not runtime).
    fn syntax_err(&self, line: i32, msg: impl std::fmt::Display) -> LuaError {
        LuaError::syntax(&SourcePos::new(self.proto.chunk_name.clone(), line, 0), msg)
    }

    /// Declares a new named local occupying the next free slot, per spec's
    /// slot allocator: "Locals occupy slots 0..num_locals-1".
    pub fn new_local(&mut self, name: impl Into<String>, line: i32) -> Result<u8, LuaError> {
        if self.locals.len() >= MAX_LOCALS {
            return Err(self.syntax_err(line, "too many local variables"));
        }
        let slot = self.reserve_slot(line)?;
        debug_assert_eq!(slot as usize, self.locals.len());
        self.locals.push(name.into());
        Ok(slot)
    }

    /// Binds a name to a slot already reserved by the caller (spec's local
    /// declaration: the initializer's values are materialized into the
    /// target slots *before* the names become visible, so `local x = x`
    /// reads the outer `x`).
    pub fn bind_local(&mut self, name: impl Into<String>) {
        self.locals.push(name.into());
    }

    pub fn resolve_local(&self, name: &str) -> Option<u8> {
        self.locals.iter().position(|n| n == name).map(|i| i as u8)
    }

    /// Reserves one more stack slot for a temporary, bumping `num_stack`
    /// (spec: "too many local variables" at 254).
    pub fn reserve_slot(&mut self, line: i32) -> Result<u8, LuaError> {
        use crate::limits::MAX_STACK_SLOTS;
        if self.num_stack as u32 >= MAX_STACK_SLOTS {
            return Err(self.syntax_err(line, "too many local variables"));
        }
        let slot = self.num_stack;
        self.num_stack += 1;
        self.max_stack = self.max_stack.max(self.num_stack);
        Ok(slot as u8)
    }

    /// Frees a slot only if it is exactly the current top and not a named
    /// local (spec's slot allocator contract).
    pub fn free_slot(&mut self, slot: u8) {
        if slot as usize + 1 == self.num_stack && slot as usize >= self.locals.len() {
            self.num_stack -= 1;
        }
    }

    /// Enforces "after every statement, num_stack == num_locals" (spec §8
    /// invariant 3).
    pub fn reset_to_locals(&mut self) {
        self.num_stack = self.locals.len();
    }

    pub fn enter_block(&mut self, is_loop: bool) {
        self.blocks.push(BlockScope::new(self.locals.len(), is_loop));
    }

    pub fn leave_block(&mut self) -> BlockScope {
        let block = self.blocks.pop().expect("unbalanced block scope");
        self.locals.truncate(block.first_local);
        self.num_stack = self.locals.len();
        block
    }

    pub fn innermost_loop(&mut self) -> Option<&mut BlockScope> {
        self.blocks.iter_mut().rev().find(|b| b.is_loop)
    }

    pub fn pc(&self) -> usize {
        self.proto.instructions.len()
    }

    pub fn emit(&mut self, ins: Instruction, line: i32) -> usize {
        self.proto.instructions.push(ins);
        self.proto.line_info.push(line);
        self.pc() - 1
    }

    pub fn instr(&self, pc: usize) -> Instruction {
        self.proto.instructions[pc]
    }

    pub fn instr_mut(&mut self, pc: usize) -> &mut Instruction {
        &mut self.proto.instructions[pc]
    }

    /// Appends a constant and returns its index; numeric constants are
    /// deduplicated by bit pattern (strings are not interned, spec §5).
    pub fn add_const(&mut self, v: Value, line: i32) -> Result<usize, LuaError> {
        use crate::limits::MAX_CONSTANTS;
        if v.is_num() {
            if let Some(i) = self.proto.constants.iter().position(|c| c.is_num() && c.bits() == v.bits()) {
                return Ok(i);
            }
        }
        if self.proto.constants.len() >= MAX_CONSTANTS {
            return Err(self.syntax_err(line, "too many constants"));
        }
        self.proto.constants.push(v);
        Ok(self.proto.constants.len() - 1)
    }
}
