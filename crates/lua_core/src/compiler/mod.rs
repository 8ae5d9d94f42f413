//! Recursive-descent parser and code generator (spec §4.E), grounded on
//! the teacher's `Compiler`/`FuncState` split for structure, but hand-rolled
//! against `original_source/src/parser.c`'s grammar instead of the
//! teacher's `emmylua_parser`-backed draft (that dependency never appears
//! in any `Cargo.toml` in the retrieved snapshot; see `DESIGN.md`).

mod assign;
mod block;
mod code;
mod expdesc;
mod expr;
mod func_state;
mod stmt;

use std::rc::Rc;

use crate::error::LuaError;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::reader::ChunkSource;
use crate::state::LuaState;
use crate::value::FunctionProto;

use func_state::FuncState;

pub use assign::Assignable;

/// Entry point: compiles a full chunk of Lua source into a top-level
/// function prototype (spec §6 `load`).
pub struct Compiler;

impl Compiler {
    pub fn compile(
        state: &mut LuaState,
        source: impl ChunkSource,
        chunk_name: impl Into<String>,
    ) -> Result<Rc<FunctionProto>, LuaError> {
        let chunk_name = chunk_name.into();
        let lexer = Lexer::new(source, chunk_name.clone())?;
        let mut parser = Parser {
            lexer,
            state,
            funcs: vec![FuncState::new(chunk_name)],
        };
        parser.parse_chunk()
    }
}

pub(crate) struct Parser<'src, 'st> {
    lexer: Lexer<'src>,
    state: &'st mut LuaState,
    funcs: Vec<FuncState>,
}

impl<'src, 'st> Parser<'src, 'st> {
    fn fs(&mut self) -> &mut FuncState {
        self.funcs.last_mut().expect("no active function scope")
    }

    fn cur(&self) -> &Token {
        self.lexer.peek_tk()
    }

    fn cur_kind(&self) -> TokenKind {
        self.cur().kind
    }

    fn cur_line(&self) -> i32 {
        self.cur().line
    }

    fn advance(&mut self) -> Result<(), LuaError> {
        self.lexer.read_tk()?;
        Ok(())
    }

    fn err(&self, msg: impl std::fmt::Display) -> LuaError {
        let tok = self.cur();
        LuaError::syntax(
            &crate::error::SourcePos::new(self.chunk_name(), tok.line, tok.col),
            msg,
        )
    }

    fn chunk_name(&self) -> String {
        self.funcs[0].proto.chunk_name.clone()
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, LuaError> {
        let chunk_name = self.chunk_name();
        let tok = self.cur().clone();
        if tok.kind == kind {
            self.advance()?;
            Ok(tok)
        } else {
            Err(LuaError::syntax(
                &crate::error::SourcePos::new(chunk_name, tok.line, tok.col),
                format!(
                    "expected {}, found {}",
                    crate::lexer::tk2str(kind),
                    crate::lexer::tk2str(tok.kind)
                ),
            ))
        }
    }

    fn check_sym(&self, ch: u8) -> bool {
        self.cur_kind() == TokenKind::Sym(ch)
    }

    fn expect_sym(&mut self, ch: u8) -> Result<(), LuaError> {
        self.expect(TokenKind::Sym(ch))?;
        Ok(())
    }

    /// `RET0`/`RET1`/`RET` with no arguments appended implicitly at chunk
    /// and function-body end (spec §4.E "Function bodies and calls").
    fn emit_implicit_ret0(&mut self) {
        let line = self.cur_line();
        let fs = self.fs();
        fs.emit(crate::bytecode::Instruction::bare(crate::bytecode::OpCode::Ret0), line);
    }

    fn parse_chunk(&mut self) -> Result<Rc<FunctionProto>, LuaError> {
        self.parse_block()?;
        self.expect(TokenKind::Eof)?;
        self.emit_implicit_ret0();
        let mut fs = self.funcs.pop().expect("chunk scope missing");
        fs.proto.max_stack = fs.max_stack as u8;
        Ok(Rc::new(fs.proto))
    }

    fn block_follows(&self) -> bool {
        matches!(
            self.cur_kind(),
            TokenKind::Eof | TokenKind::End | TokenKind::Else | TokenKind::Elseif | TokenKind::Until
        )
    }
}
