//! Statement parsing (spec §4.E grammar coverage), grounded on
//! `original_source/src/parser.c`'s statement dispatch, adapted to this
//! register-machine codegen rather than the original's AST-then-lower
//! pipeline.

use crate::bytecode::{Instruction, OpCode};
use crate::error::LuaError;
use crate::lexer::TokenKind;
use crate::limits::JMP_NONE;

use super::assign::Assignable;
use super::code;
use super::expdesc::ExpKind;
use super::Parser;

impl<'src, 'st> Parser<'src, 'st> {
    /// Parses statements until a block terminator or `return` (spec:
    /// "blocks terminated by any of {EOF, `end`, `else`, `elseif`,
    /// `until`}"). `return` must be the block's last statement.
    pub(super) fn parse_block(&mut self) -> Result<(), LuaError> {
        loop {
            if self.block_follows() {
                break;
            }
            if self.cur_kind() == TokenKind::Return {
                self.parse_return_stmt()?;
                break;
            }
            self.parse_statement()?;
            self.fs().reset_to_locals();
        }
        Ok(())
    }

    fn parse_statement(&mut self) -> Result<(), LuaError> {
        match self.cur_kind() {
            TokenKind::Sym(b';') => {
                self.advance()?;
                Ok(())
            }
            TokenKind::Local => self.parse_local_stmt(),
            TokenKind::If => self.parse_if_stmt(),
            TokenKind::While => self.parse_while_stmt(),
            TokenKind::Repeat => self.parse_repeat_stmt(),
            TokenKind::Break => self.parse_break_stmt(),
            TokenKind::Do => {
                self.advance()?;
                self.fs().enter_block(false);
                self.parse_block()?;
                self.fs().leave_block();
                self.expect(TokenKind::End)?;
                Ok(())
            }
            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_local_stmt(&mut self) -> Result<(), LuaError> {
        self.advance()?; // 'local'
        if self.cur_kind() == TokenKind::Function {
            self.advance()?;
            let tok = self.expect(TokenKind::Ident)?;
            let crate::lexer::TokenValue::Text(name) = tok.value else {
                unreachable!("name token without text payload")
            };
            // Declared before the body compiles, so the function can call
            // itself recursively.
            let line = self.cur_line();
            self.fs().new_local(name.clone(), line)?;
            let slot = self.fs().resolve_local(&name).expect("just declared");
            let mut e = self.parse_function_body(Some(name))?;
            code::to_slot(self.fs(), self.state, &mut e, slot, line)?;
            return Ok(());
        }

        let mut names = Vec::new();
        loop {
            let tok = self.expect(TokenKind::Ident)?;
            let crate::lexer::TokenValue::Text(name) = tok.value else {
                unreachable!("name token without text payload")
            };
            names.push(name);
            if self.check_sym(b',') {
                self.advance()?;
            } else {
                break;
            }
        }

        let n = names.len();
        let line = self.cur_line();
        let base = self.fs().reserve_slot(line)?;
        for _ in 1..n {
            self.fs().reserve_slot(line)?;
        }

        if self.check_sym(b'=') {
            self.advance()?;
            self.parse_and_adjust(base, n)?;
        } else {
            let line = self.cur_line();
            code::emit_ad(self.fs(), OpCode::KNil, base, base as u16 + n as u16 - 1, line);
        }

        for name in names {
            self.fs().bind_local(name);
        }
        Ok(())
    }

    fn parse_if_stmt(&mut self) -> Result<(), LuaError> {
        self.advance()?; // 'if'
        let mut end_jmps = JMP_NONE;
        loop {
            let false_list = self.parse_cond_expr()?;
            self.expect(TokenKind::Then)?;
            self.fs().enter_block(false);
            self.parse_block()?;
            self.fs().leave_block();

            if matches!(self.cur_kind(), TokenKind::Elseif | TokenKind::Else) {
                let line = self.cur_line();
                let j = code::emit_jmp(self.fs(), line) as i32;
                end_jmps = code::append_jmp(self.fs(), end_jmps, j);
            }
            let here = self.fs().pc();
            code::patch_jmps(self.fs(), false_list, here)?;

            if self.cur_kind() == TokenKind::Elseif {
                self.advance()?;
                continue;
            } else if self.cur_kind() == TokenKind::Else {
                self.advance()?;
                self.fs().enter_block(false);
                self.parse_block()?;
                self.fs().leave_block();
            }
            break;
        }
        self.expect(TokenKind::End)?;
        let here = self.fs().pc();
        code::patch_jmps(self.fs(), end_jmps, here)?;
        Ok(())
    }

    fn parse_while_stmt(&mut self) -> Result<(), LuaError> {
        self.advance()?; // 'while'
        let loop_start = self.fs().pc();
        let false_list = self.parse_cond_expr()?;
        self.expect(TokenKind::Do)?;
        self.fs().enter_block(true);
        self.parse_block()?;
        let block = self.fs().leave_block();

        let line = self.cur_line();
        let back = code::emit_jmp(self.fs(), line);
        code::patch_jmp(self.fs(), back, loop_start)?;

        self.expect(TokenKind::End)?;
        let here = self.fs().pc();
        code::patch_jmps(self.fs(), false_list, here)?;
        code::patch_jmps(self.fs(), block.break_list, here)?;
        Ok(())
    }

    fn parse_repeat_stmt(&mut self) -> Result<(), LuaError> {
        self.advance()?; // 'repeat'
        let loop_start = self.fs().pc();
        self.fs().enter_block(true);
        self.parse_block()?;
        self.expect(TokenKind::Until)?;
        // The condition is compiled while the body's block (and its
        // locals) is still in scope: `repeat local x = ... until x`.
        let false_list = self.parse_cond_expr()?;
        let block = self.fs().leave_block();

        code::patch_jmps(self.fs(), false_list, loop_start)?;
        let here = self.fs().pc();
        code::patch_jmps(self.fs(), block.break_list, here)?;
        Ok(())
    }

    fn parse_break_stmt(&mut self) -> Result<(), LuaError> {
        let line = self.cur_line();
        self.advance()?; // 'break'
        let j = code::emit_jmp(self.fs(), line) as i32;
        let old = match self.fs().innermost_loop() {
            Some(block) => block.break_list,
            None => return Err(self.err("no loop to break")),
        };
        let new_list = code::append_jmp(self.fs(), old, j);
        self.fs()
            .innermost_loop()
            .expect("checked above")
            .break_list = new_list;
        Ok(())
    }

    fn parse_return_stmt(&mut self) -> Result<(), LuaError> {
        let line = self.cur_line();
        self.advance()?; // 'return'
        if self.block_follows() || self.check_sym(b';') {
            if self.check_sym(b';') {
                self.advance()?;
            }
            self.fs().emit(Instruction::bare(OpCode::Ret0), line);
            return Ok(());
        }

        let base = self.fs().num_stack as u8;
        let mut count: u16 = 0;
        loop {
            let line = self.cur_line();
            let mut e = self.parse_expr(0)?;
            code::to_next_slot(self.fs(), self.state, &mut e, line)?;
            count += 1;
            if self.check_sym(b',') {
                self.advance()?;
            } else {
                break;
            }
        }
        if self.check_sym(b';') {
            self.advance()?;
        }

        if count == 1 {
            code::emit_ad(self.fs(), OpCode::Ret1, 0, base as u16, line);
        } else {
            let count: u16 = count;
            code::emit_ad(self.fs(), OpCode::Ret, base, count, line);
        }
        Ok(())
    }

    fn parse_expr_stmt(&mut self) -> Result<(), LuaError> {
        let e = self.parse_suffixed_expr()?;
        if self.check_sym(b'=') || self.check_sym(b',') {
            let first = self.expr_to_assignable(e)?;
            self.parse_assignment(first)
        } else if let ExpKind::Call(pc) = e.kind {
            self.fs().instr_mut(pc).set_c(0);
            Ok(())
        } else {
            Err(self.err("syntax error (expected statement)"))
        }
    }

    fn parse_assignment(&mut self, first: Assignable) -> Result<(), LuaError> {
        let mut targets = vec![first];
        while self.check_sym(b',') {
            self.advance()?;
            let e = self.parse_suffixed_expr()?;
            targets.push(self.expr_to_assignable(e)?);
        }
        self.expect_sym(b'=')?;

        let n = targets.len();
        let line = self.cur_line();
        let base = self.fs().reserve_slot(line)?;
        for _ in 1..n {
            self.fs().reserve_slot(line)?;
        }
        self.parse_and_adjust(base, n)?;

        let line = self.cur_line();
        for (i, target) in targets.iter().enumerate().rev() {
            match target {
                Assignable::Local(slot) => {
                    let src = base + i as u8;
                    if *slot != src {
                        code::emit_ad(self.fs(), OpCode::Mov, *slot, src as u16, line);
                    }
                }
                Assignable::Global(name) => {
                    return Err(LuaError::runtime_unlocated(format!(
                        "global variables are not supported (attempt to assign to '{name}')"
                    )));
                }
            }
        }
        self.fs().reset_to_locals();
        Ok(())
    }
}
