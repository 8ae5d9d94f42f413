//! Status codes and error values, mirroring the teacher's split between a
//! small `Copy` status enum used for control flow and a richer error value
//! carrying the formatted message (`lua_vm::lua_error::{LuaError, LuaFullError}`).

/// Stable status codes returned across the load/call API (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    Yield = 1,
    ErrRun = 2,
    ErrSyntax = 3,
    ErrMem = 4,
    ErrErr = 5,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Ok => "ok",
            Status::Yield => "yield",
            Status::ErrRun => "runtime error",
            Status::ErrSyntax => "syntax error",
            Status::ErrMem => "out of memory",
            Status::ErrErr => "error in error handling",
        };
        write!(f, "{s}")
    }
}

/// A position in source used to prefix formatted error messages
/// (spec §6: "chunk:line:col: " / "chunk:line: " / "chunk: ").
#[derive(Debug, Clone, Default)]
pub struct SourcePos {
    pub chunk_name: String,
    pub line: i32,
    pub col: i32,
}

impl SourcePos {
    pub fn new(chunk_name: impl Into<String>, line: i32, col: i32) -> Self {
        Self {
            chunk_name: chunk_name.into(),
            line,
            col,
        }
    }

    pub fn unknown() -> Self {
        Self {
            chunk_name: "?".to_string(),
            line: 0,
            col: 0,
        }
    }

    fn format_prefix(&self) -> String {
        if self.line >= 1 && self.col >= 1 {
            format!("{}:{}:{}: ", self.chunk_name, self.line, self.col)
        } else if self.line >= 1 {
            format!("{}:{}: ", self.chunk_name, self.line)
        } else {
            format!("{}: ", self.chunk_name)
        }
    }
}

/// A fully-formatted Lua error: a status code plus the `chunk:line[:col]:
/// message` string that would sit on top of the evaluation stack (spec §7).
#[derive(Debug, Clone)]
pub struct LuaError {
    pub status: Status,
    pub message: String,
}

impl LuaError {
    pub fn syntax(pos: &SourcePos, message: impl std::fmt::Display) -> Self {
        Self {
            status: Status::ErrSyntax,
            message: format!("{}{}", pos.format_prefix(), message),
        }
    }

    pub fn runtime(pos: &SourcePos, message: impl std::fmt::Display) -> Self {
        Self {
            status: Status::ErrRun,
            message: format!("{}{}", pos.format_prefix(), message),
        }
    }

    pub fn runtime_unlocated(message: impl std::fmt::Display) -> Self {
        Self {
            status: Status::ErrRun,
            message: message.to_string(),
        }
    }

    pub fn memory() -> Self {
        Self {
            status: Status::ErrMem,
            message: "out of memory".to_string(),
        }
    }
}

impl std::fmt::Display for LuaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for LuaError {}
