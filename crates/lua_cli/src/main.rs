//! Minimal `prog <file>` front end over `lua_core`'s public load/call API
//! (spec §6), styled after the teacher's `luars_interpreter/src/bin/main.rs`
//! but scoped to just the one collaborator spec.md's Non-goals leave in:
//! no REPL, no `-e`, no module loading.

use std::env;
use std::fs;
use std::process::ExitCode;

use lua_core::{Compiler, LuaError, LuaVm, Status, reader::StrSource};

fn print_usage(prog: &str) {
    eprintln!("usage: {prog} <script.lua>");
}

fn run(path: &str) -> Result<(), LuaError> {
    let source = fs::read_to_string(path).map_err(|e| LuaError::runtime_unlocated(format!("cannot open {path}: {e}")))?;

    let mut state = lua_core::LuaState::new();
    let proto = Compiler::compile(&mut state, StrSource::new(&source), path)?;
    let mut vm = LuaVm::new();
    vm.call_proto(&mut state, proto, &[])?;
    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("lua");

    let script = match args.get(1) {
        Some(path) => path,
        None => {
            print_usage(prog);
            return ExitCode::from(Status::ErrSyntax as u8);
        }
    };

    match run(script) {
        Ok(()) => ExitCode::from(Status::Ok as u8),
        Err(e) => {
            eprintln!("{prog}: {e}");
            ExitCode::from(e.status as u8)
        }
    }
}
