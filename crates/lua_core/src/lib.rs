// lua_core: a single-pass Lua 5.4-compatible bytecode compiler and register VM.
//
// Pipeline: Reader -> Lexer -> Parser/codegen -> FunctionProto -> LuaVm.
// Tables, metatables, upvalues, globals, coroutines and GC are out of scope;
// see DESIGN.md for what is and isn't implemented.

pub mod bytecode;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod limits;
pub mod reader;
pub mod state;
pub mod value;
pub mod vm;

pub use compiler::Compiler;
pub use error::{LuaError, Status};
pub use state::LuaState;
pub use value::{FunctionProto, LuaStr, Value};
pub use vm::LuaVm;

/// Compile and run a chunk of Lua source, returning the VM's final state on
/// success. Convenience wrapper around [`Compiler::compile`] + [`LuaVm::run`],
/// mirroring the teacher crate's top-level `execute` helper.
pub fn execute(source: &str, chunk_name: &str) -> Result<(), LuaError> {
    let mut state = LuaState::new();
    let proto = Compiler::compile(&mut state, reader::StrSource::new(source), chunk_name)?;
    let mut vm = LuaVm::new();
    vm.call_proto(&mut state, proto, &[])?;
    Ok(())
}
