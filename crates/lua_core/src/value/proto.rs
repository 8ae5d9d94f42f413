//! Function prototype (spec §3 "Function prototype"), grounded on
//! `value.h`'s `Fn` struct. A prototype is immutable once compilation ends
//! (spec §9's "Ownership of instruction lists" note); the compiler builds it
//! through `FuncState` and hands back the finished `Rc<FunctionProto>`.

use crate::bytecode::Instruction;
use crate::value::{LuaStr, Value};

#[derive(Debug)]
pub struct FunctionProto {
    /// `None` for the top-level chunk and anonymous function literals.
    pub name: Option<LuaStr>,
    pub chunk_name: String,
    pub start_line: i32,
    pub end_line: i32,
    pub num_params: u8,
    /// High-water mark of `FuncState::num_stack` over the whole body; the
    /// VM reserves this many stack slots above the call's base before
    /// running (spec §4.E slot allocator).
    pub max_stack: u8,
    pub instructions: Vec<Instruction>,
    /// Parallel to `instructions`: source line of the statement/expression
    /// that emitted each instruction (spec §3 invariant: same length).
    pub line_info: Vec<i32>,
    pub constants: Vec<Value>,
}

impl FunctionProto {
    pub fn new(chunk_name: String) -> Self {
        FunctionProto {
            name: None,
            chunk_name,
            start_line: 0,
            end_line: 0,
            num_params: 0,
            max_stack: 0,
            instructions: Vec::new(),
            line_info: Vec::new(),
            constants: Vec::new(),
        }
    }
}
