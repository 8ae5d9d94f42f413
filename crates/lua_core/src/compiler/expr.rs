//! Expression parsing and code generation (spec §4.E "Grammar and codegen
//! contract"): precedence-climbing binary operators, constant folding,
//! commutative/inlining selection between the `VV`/`VN`/`NV` opcode forms,
//! and `and`/`or`/`not` short-circuit emission. Grounded on
//! `original_source/src/parser.c`'s `subexpr`/`expr` priority table, since
//! the teacher's own expression parser targets a different AST-walking
//! backend rather than this register-machine codegen.

use crate::bytecode::OpCode;
use crate::error::LuaError;
use crate::lexer::{TokenKind, TokenValue};
use crate::limits::{JMP_NONE, UNARY_PRIORITY};
use crate::value::{prim_tag, LuaStr, Value};

use super::code;
use super::expdesc::{ExpDesc, ExpKind};
use super::Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// `(left_priority, right_priority)`; a right priority lower than the left
/// one makes the operator right-associative (spec: "`..` and `^` are
/// right-associative").
fn priorities(op: BinOp) -> (u8, u8) {
    match op {
        BinOp::Or => (1, 1),
        BinOp::And => (2, 2),
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => (3, 3),
        BinOp::Concat => (9, 8),
        BinOp::Add | BinOp::Sub => (10, 10),
        BinOp::Mul | BinOp::Div | BinOp::Mod => (11, 11),
        BinOp::Pow => (14, 13),
    }
}

fn token_to_binop(kind: TokenKind) -> Option<BinOp> {
    Some(match kind {
        TokenKind::Or => BinOp::Or,
        TokenKind::And => BinOp::And,
        TokenKind::Eq => BinOp::Eq,
        TokenKind::Ne => BinOp::Ne,
        TokenKind::Le => BinOp::Le,
        TokenKind::Ge => BinOp::Ge,
        TokenKind::Sym(b'<') => BinOp::Lt,
        TokenKind::Sym(b'>') => BinOp::Gt,
        TokenKind::Concat => BinOp::Concat,
        TokenKind::Sym(b'+') => BinOp::Add,
        TokenKind::Sym(b'-') => BinOp::Sub,
        TokenKind::Sym(b'*') => BinOp::Mul,
        TokenKind::Sym(b'/') => BinOp::Div,
        TokenKind::Sym(b'%') => BinOp::Mod,
        TokenKind::Sym(b'^') => BinOp::Pow,
        _ => return None,
    })
}

fn flip_order(op: BinOp) -> BinOp {
    match op {
        BinOp::Lt => BinOp::Gt,
        BinOp::Gt => BinOp::Lt,
        BinOp::Le => BinOp::Ge,
        BinOp::Ge => BinOp::Le,
        other => other,
    }
}

fn const_compare(op: BinOp, l: &ExpDesc, r: &ExpDesc) -> Option<bool> {
    match op {
        BinOp::Eq | BinOp::Ne => {
            let eq = match (&l.kind, &r.kind) {
                (ExpKind::Prim(a), ExpKind::Prim(b)) => a == b,
                (ExpKind::Num(a), ExpKind::Num(b)) => a == b,
                (ExpKind::Str(a), ExpKind::Str(b)) => a == b,
                _ => false,
            };
            Some(if op == BinOp::Eq { eq } else { !eq })
        }
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let (ExpKind::Num(a), ExpKind::Num(b)) = (&l.kind, &r.kind) else {
                return None;
            };
            Some(match op {
                BinOp::Lt => a < b,
                BinOp::Le => a <= b,
                BinOp::Gt => a > b,
                BinOp::Ge => a >= b,
                _ => unreachable!(),
            })
        }
        _ => None,
    }
}

impl BinOp {
    fn is_commutative(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Mul)
    }

    fn opcode_vv(self) -> OpCode {
        match self {
            BinOp::Add => OpCode::AddVV,
            BinOp::Sub => OpCode::SubVV,
            BinOp::Mul => OpCode::MulVV,
            BinOp::Div => OpCode::DivVV,
            BinOp::Mod => OpCode::ModVV,
            BinOp::Pow => OpCode::Pow,
            _ => unreachable!("opcode_vv called on non-arithmetic op"),
        }
    }

    fn opcode_vn(self) -> OpCode {
        match self {
            BinOp::Add => OpCode::AddVN,
            BinOp::Sub => OpCode::SubVN,
            BinOp::Mul => OpCode::MulVN,
            BinOp::Div => OpCode::DivVN,
            BinOp::Mod => OpCode::ModVN,
            _ => unreachable!("opcode_vn called on non-inlinable op"),
        }
    }

    fn opcode_nv(self) -> OpCode {
        match self {
            BinOp::Add => OpCode::AddNV,
            BinOp::Sub => OpCode::SubNV,
            BinOp::Mul => OpCode::MulNV,
            BinOp::Div => OpCode::DivNV,
            BinOp::Mod => OpCode::ModNV,
            _ => unreachable!("opcode_nv called on non-inlinable op"),
        }
    }

    fn eval(self, a: f64, b: f64) -> f64 {
        match self {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
            BinOp::Mod => a - (a / b).floor() * b,
            BinOp::Pow => a.powf(b),
            _ => unreachable!("eval called on non-arithmetic op"),
        }
    }
}

impl<'src, 'st> Parser<'src, 'st> {
    /// Top-level expression entry point, `parse_expr(0)`.
    pub(super) fn parse_expr(&mut self, limit: u8) -> Result<ExpDesc, LuaError> {
        let mut e = self.parse_unary_expr()?;
        loop {
            let Some(op) = token_to_binop(self.cur_kind()) else {
                break;
            };
            let (left_pri, right_pri) = priorities(op);
            if left_pri <= limit {
                break;
            }
            let line = self.cur_line();
            self.advance()?;
            e = match op {
                BinOp::And => {
                    let cond = self.branch_on_condition(e, line, false, true)?;
                    let right = self.parse_expr(right_pri)?;
                    self.combine_and(cond, right)
                }
                BinOp::Or => {
                    let cond = self.branch_on_condition(e, line, true, true)?;
                    let right = self.parse_expr(right_pri)?;
                    self.combine_or(cond, right)
                }
                BinOp::Concat => {
                    let right = self.parse_expr(right_pri)?;
                    self.apply_concat(e, right, line)?
                }
                BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                    let right = self.parse_expr(right_pri)?;
                    self.apply_compare(op, e, right, line)?
                }
                _ => {
                    let right = self.parse_expr(right_pri)?;
                    self.apply_arith(op, e, right, line)?
                }
            };
        }
        Ok(e)
    }

    fn parse_unary_expr(&mut self) -> Result<ExpDesc, LuaError> {
        match self.cur_kind() {
            TokenKind::Not => {
                let line = self.cur_line();
                self.advance()?;
                let e = self.parse_expr(UNARY_PRIORITY)?;
                self.apply_not(e, line)
            }
            TokenKind::Sym(b'-') => {
                let line = self.cur_line();
                self.advance()?;
                let e = self.parse_expr(UNARY_PRIORITY)?;
                self.apply_neg(e, line)
            }
            _ => self.parse_simple_expr(),
        }
    }

    fn parse_simple_expr(&mut self) -> Result<ExpDesc, LuaError> {
        match self.cur_kind() {
            TokenKind::Nil => {
                self.advance()?;
                Ok(ExpDesc::new_prim(prim_tag::NIL))
            }
            TokenKind::True => {
                self.advance()?;
                Ok(ExpDesc::new_prim(prim_tag::TRUE))
            }
            TokenKind::False => {
                self.advance()?;
                Ok(ExpDesc::new_prim(prim_tag::FALSE))
            }
            TokenKind::Num => {
                let n = match self.cur().value {
                    TokenValue::Num(n) => n,
                    _ => unreachable!("NUM token without a numeric payload"),
                };
                self.advance()?;
                Ok(ExpDesc::new_num(n))
            }
            TokenKind::Str => {
                let s = match &self.cur().value {
                    TokenValue::Text(s) => s.clone(),
                    _ => unreachable!("STR token without a text payload"),
                };
                self.advance()?;
                Ok(ExpDesc::new_str(s))
            }
            TokenKind::Function => {
                self.advance()?;
                self.parse_function_body(None)
            }
            _ => self.parse_suffixed_expr(),
        }
    }

    fn parse_primary_expr(&mut self) -> Result<ExpDesc, LuaError> {
        match self.cur_kind() {
            TokenKind::Ident => {
                let name = match &self.cur().value {
                    TokenValue::Text(s) => s.clone(),
                    _ => unreachable!("name token without text payload"),
                };
                self.advance()?;
                Ok(self.resolve_name(name))
            }
            TokenKind::Sym(b'(') => {
                self.advance()?;
                let e = self.parse_expr(0)?;
                self.expect_sym(b')')?;
                Ok(e)
            }
            other => Err(self.err(format!("unexpected symbol near {}", crate::lexer::tk2str(other)))),
        }
    }

    pub(super) fn parse_suffixed_expr(&mut self) -> Result<ExpDesc, LuaError> {
        let mut e = self.parse_primary_expr()?;
        loop {
            if self.check_sym(b'(') {
                e = self.parse_call_suffix(e)?;
            } else {
                break;
            }
        }
        Ok(e)
    }

    fn resolve_name(&mut self, name: String) -> ExpDesc {
        match self.fs().resolve_local(&name) {
            Some(slot) => ExpDesc::new_local(slot),
            None => ExpDesc::new_global(name),
        }
    }

    fn parse_call_suffix(&mut self, callee: ExpDesc) -> Result<ExpDesc, LuaError> {
        let line = self.cur_line();
        let mut fn_e = callee;
        let base_slot = code::to_next_slot(self.fs(), self.state, &mut fn_e, line)?;
        self.expect_sym(b'(')?;
        let mut num_args: u16 = 0;
        if !self.check_sym(b')') {
            loop {
                let line = self.cur_line();
                let mut arg = self.parse_expr(0)?;
                code::to_next_slot(self.fs(), self.state, &mut arg, line)?;
                num_args += 1;
                if self.check_sym(b',') {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }
        self.expect_sym(b')')?;
        let b: u8 = (num_args + 1)
            .try_into()
            .map_err(|_| LuaError::runtime_unlocated("too many arguments in a function call"))?;
        let pc = code::emit_abc(self.fs(), OpCode::Call, base_slot, b, 1, line);
        self.fs().num_stack = base_slot as usize + 1;
        Ok(ExpDesc::new_call(pc))
    }

    /// Parses `function (params) block end` (the `function` keyword itself
    /// already consumed by the caller); `name` becomes the prototype's debug
    /// name for `local function` sugar.
    pub(super) fn parse_function_body(&mut self, name: Option<String>) -> Result<ExpDesc, LuaError> {
        let start_line = self.cur_line();
        self.expect_sym(b'(')?;
        let mut params = Vec::new();
        if !self.check_sym(b')') {
            loop {
                let tok = self.expect(TokenKind::Ident)?;
                let TokenValue::Text(pname) = tok.value else {
                    unreachable!("name token without text payload")
                };
                params.push(pname);
                if self.check_sym(b',') {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }
        self.expect_sym(b')')?;

        let chunk_name = self.chunk_name();
        let mut new_fs = super::func_state::FuncState::new(chunk_name);
        new_fs.proto.start_line = start_line;
        self.funcs.push(new_fs);
        for p in params {
            self.fs().new_local(p, start_line)?;
        }
        self.fs().proto.num_params = self.fs().num_locals() as u8;

        self.parse_block()?;
        let end_line = self.cur_line();
        self.expect(TokenKind::End)?;
        self.emit_implicit_ret0();

        let mut built = self.funcs.pop().expect("function scope pushed above");
        built.proto.end_line = end_line;
        built.proto.name = name.map(LuaStr::new);
        built.proto.max_stack = built.max_stack as u8;
        let proto = std::rc::Rc::new(built.proto);
        let v = self.state.alloc_fn(proto);
        let k = self.fs().add_const(v, start_line)?;
        let chunk_name = self.chunk_name();
        let k: u16 = k.try_into().map_err(|_| {
            LuaError::syntax(&crate::error::SourcePos::new(chunk_name, start_line, 0), "too many constants")
        })?;
        Ok(code::emit_reloc_ad(self.fs(), OpCode::KFn, k, start_line))
    }

    fn apply_not(&mut self, mut e: ExpDesc, line: i32) -> Result<ExpDesc, LuaError> {
        code::discard_val_list(self.fs(), e.true_list);
        code::discard_val_list(self.fs(), e.false_list);
        std::mem::swap(&mut e.true_list, &mut e.false_list);
        match e.kind {
            ExpKind::Jmp(pc) => {
                code::invert_test(self.fs(), pc);
                Ok(e)
            }
            ExpKind::Prim(tag) => Ok(ExpDesc::new_prim(if tag == prim_tag::TRUE {
                prim_tag::FALSE
            } else {
                prim_tag::TRUE
            })),
            // Any other statically-known constant is truthy, so `not` of it
            // folds to `false` (spec §4.E folding rules); neither kind ever
            // carries a jump list, so there's nothing to merge.
            ExpKind::Num(_) | ExpKind::Str(_) => Ok(ExpDesc::new_prim(prim_tag::FALSE)),
            _ => {
                // Materialize the plain value without disturbing `e`'s
                // (already swapped) jump lists: a prior `and`/`or` may have
                // left outstanding short-circuit branches that must survive
                // onto the result, not be consumed here.
                let saved_true = e.true_list;
                let saved_false = e.false_list;
                e.true_list = JMP_NONE;
                e.false_list = JMP_NONE;
                let slot = code::to_any_slot(self.fs(), self.state, &mut e, line)?;
                let mut desc = code::emit_reloc_ad(self.fs(), OpCode::Not, slot as u16, line);
                desc.true_list = saved_true;
                desc.false_list = saved_false;
                Ok(desc)
            }
        }
    }

    fn apply_neg(&mut self, mut e: ExpDesc, line: i32) -> Result<ExpDesc, LuaError> {
        if let ExpKind::Num(n) = e.kind {
            return Ok(ExpDesc::new_num(-n));
        }
        let slot = code::to_any_slot(self.fs(), self.state, &mut e, line)?;
        Ok(code::emit_reloc_ad(self.fs(), OpCode::Neg, slot as u16, line))
    }

    fn apply_arith(&mut self, op: BinOp, mut l: ExpDesc, mut r: ExpDesc, line: i32) -> Result<ExpDesc, LuaError> {
        if l.is_numeral() && r.is_numeral() {
            let a = l.as_num().expect("checked is_numeral");
            let b = r.as_num().expect("checked is_numeral");
            return Ok(ExpDesc::new_num(op.eval(a, b)));
        }
        if op.is_commutative() && l.is_numeral() && !r.is_numeral() {
            std::mem::swap(&mut l, &mut r);
        }
        if op != BinOp::Pow {
            if r.is_numeral() {
                if let Some(idx) = code::inline_uint8_num(self.fs(), &r, line)? {
                    let left_slot = code::to_any_slot(self.fs(), self.state, &mut l, line)?;
                    return Ok(code::emit_reloc_abc(self.fs(), op.opcode_vn(), left_slot, idx, line));
                }
            } else if l.is_numeral() {
                if let Some(idx) = code::inline_uint8_num(self.fs(), &l, line)? {
                    let right_slot = code::to_any_slot(self.fs(), self.state, &mut r, line)?;
                    return Ok(code::emit_reloc_abc(self.fs(), op.opcode_nv(), idx, right_slot, line));
                }
            }
        }
        let left_slot = code::to_any_slot(self.fs(), self.state, &mut l, line)?;
        let right_slot = code::to_any_slot(self.fs(), self.state, &mut r, line)?;
        Ok(code::emit_reloc_abc(self.fs(), op.opcode_vv(), left_slot, right_slot, line))
    }

    /// `CONCAT A,B,C` concatenates the contiguous slot range `B..=C`; a
    /// binary `..` always spans exactly two slots (spec §4.D).
    fn apply_concat(&mut self, mut l: ExpDesc, mut r: ExpDesc, line: i32) -> Result<ExpDesc, LuaError> {
        if let (ExpKind::Str(a), ExpKind::Str(b)) = (&l.kind, &r.kind) {
            return Ok(ExpDesc::new_str(format!("{a}{b}")));
        }
        let left_slot = code::to_next_slot(self.fs(), self.state, &mut l, line)?;
        let right_slot = code::to_next_slot(self.fs(), self.state, &mut r, line)?;
        debug_assert_eq!(right_slot, left_slot + 1);
        Ok(code::emit_reloc_abc(self.fs(), OpCode::Concat, left_slot, right_slot, line))
    }

    fn apply_compare(&mut self, op: BinOp, mut l: ExpDesc, mut r: ExpDesc, line: i32) -> Result<ExpDesc, LuaError> {
        if l.is_const() && r.is_const() {
            if let Some(b) = const_compare(op, &l, &r) {
                return Ok(ExpDesc::new_prim(if b { prim_tag::TRUE } else { prim_tag::FALSE }));
            }
        }

        let is_order = matches!(op, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge);
        let mut op = op;
        if is_order {
            // No NV comparison form exists (Open Question resolution #2):
            // a constant left operand is swapped to the right, flipping the
            // operator to preserve meaning.
            if l.is_numeral() && !r.is_numeral() {
                std::mem::swap(&mut l, &mut r);
                op = flip_order(op);
            }
        } else if l.is_const() && !r.is_const() {
            std::mem::swap(&mut l, &mut r);
        }

        let left_slot = code::to_any_slot(self.fs(), self.state, &mut l, line)?;
        let negated = op == BinOp::Ne;

        let (test_op, d) = if is_order {
            let vn_op = match op {
                BinOp::Lt => OpCode::LtVN,
                BinOp::Le => OpCode::LeVN,
                BinOp::Gt => OpCode::GtVN,
                BinOp::Ge => OpCode::GeVN,
                _ => unreachable!(),
            };
            let vv_op = match op {
                BinOp::Lt => OpCode::LtVV,
                BinOp::Le => OpCode::LeVV,
                BinOp::Gt => OpCode::GtVV,
                BinOp::Ge => OpCode::GeVV,
                _ => unreachable!(),
            };
            if let ExpKind::Num(n) = r.kind {
                match code::inline_uint16_const(self.fs(), Value::from_f64(n), line)? {
                    Some(idx) => (vn_op, idx),
                    None => {
                        let slot = code::to_any_slot(self.fs(), self.state, &mut r, line)?;
                        (vv_op, slot as u16)
                    }
                }
            } else {
                let slot = code::to_any_slot(self.fs(), self.state, &mut r, line)?;
                (vv_op, slot as u16)
            }
        } else {
            match r.kind.clone() {
                ExpKind::Prim(tag) => (if negated { OpCode::NeqVP } else { OpCode::EqVP }, tag),
                ExpKind::Num(n) => match code::inline_uint16_const(self.fs(), Value::from_f64(n), line)? {
                    Some(idx) => (if negated { OpCode::NeqVN } else { OpCode::EqVN }, idx),
                    None => {
                        let slot = code::to_any_slot(self.fs(), self.state, &mut r, line)?;
                        (if negated { OpCode::NeqVV } else { OpCode::EqVV }, slot as u16)
                    }
                },
                ExpKind::Str(s) => {
                    let v = self.state.intern_str(LuaStr::new(s));
                    let idx = code::inline_uint16_const(self.fs(), v, line)?
                        .expect("a fresh string constant always fits a 16-bit index");
                    (if negated { OpCode::NeqVS } else { OpCode::EqVS }, idx)
                }
                _ => {
                    let slot = code::to_any_slot(self.fs(), self.state, &mut r, line)?;
                    (if negated { OpCode::NeqVV } else { OpCode::EqVV }, slot as u16)
                }
            }
        };

        code::emit_ad(self.fs(), test_op, left_slot, d, line);
        let jmp_pc = code::emit_jmp(self.fs(), line);
        Ok(ExpDesc::new_jmp(jmp_pc))
    }

    /// Splices a comparison/test jump onto the false-list (`and`'s left
    /// operand, or an `if`/`while` condition) or the true-list (`or`'s left
    /// operand), and patches the other, unused list to fall through to the
    /// code that follows. `keep_value` selects `ISTC`/`ISFC` (the value is
    /// still wanted, spec's "attached value" contract) over plain `IST`/`ISF`
    /// (a bare condition, whose truth value is never materialized).
    pub(super) fn branch_on_condition(
        &mut self,
        mut e: ExpDesc,
        line: i32,
        want_true: bool,
        keep_value: bool,
    ) -> Result<ExpDesc, LuaError> {
        match e.kind.clone() {
            ExpKind::Jmp(pc) => {
                if !want_true {
                    code::invert_test(self.fs(), pc);
                }
                if want_true {
                    e.true_list = code::append_jmp(self.fs(), e.true_list, pc as i32);
                } else {
                    e.false_list = code::append_jmp(self.fs(), e.false_list, pc as i32);
                }
            }
            _ => {
                let slot = code::to_any_slot(self.fs(), self.state, &mut e, line)?;
                let op = match (want_true, keep_value) {
                    (true, true) => OpCode::Istc,
                    (true, false) => OpCode::Ist,
                    (false, true) => OpCode::Isfc,
                    (false, false) => OpCode::Isf,
                };
                let a = if keep_value { crate::limits::NO_SLOT } else { 0 };
                code::emit_ad(self.fs(), op, a, slot as u16, line);
                let jmp_pc = code::emit_jmp(self.fs(), line);
                if want_true {
                    e.true_list = code::append_jmp(self.fs(), e.true_list, jmp_pc as i32);
                } else {
                    e.false_list = code::append_jmp(self.fs(), e.false_list, jmp_pc as i32);
                }
            }
        }
        let here = self.fs().pc();
        if want_true {
            code::patch_jmps_discard(self.fs(), e.false_list, here)?;
            e.false_list = JMP_NONE;
        } else {
            code::patch_jmps_discard(self.fs(), e.true_list, here)?;
            e.true_list = JMP_NONE;
        }
        Ok(e)
    }

    fn combine_and(&mut self, cond: ExpDesc, right: ExpDesc) -> ExpDesc {
        let mut result = right;
        result.false_list = code::append_jmp(self.fs(), result.false_list, cond.false_list);
        result
    }

    fn combine_or(&mut self, cond: ExpDesc, right: ExpDesc) -> ExpDesc {
        let mut result = right;
        result.true_list = code::append_jmp(self.fs(), result.true_list, cond.true_list);
        result
    }

    /// Parses a condition for `if`/`while`/`repeat...until` and returns the
    /// outstanding false-jump list (spec's `parse_cond_expr`).
    pub(super) fn parse_cond_expr(&mut self) -> Result<i32, LuaError> {
        let line = self.cur_line();
        let e = self.parse_expr(0)?;
        let e = self.branch_on_condition(e, line, false, false)?;
        Ok(e.false_list)
    }

    /// Parses a comma-separated expression list and materializes it into
    /// exactly `n` contiguous slots starting at `base` (spec's
    /// `adjust_assign`, shared by `local` declarations, plain assignment's
    /// RHS, and (via its own caller) `return`): a trailing `CALL` is
    /// adjusted to produce the remaining targets in one shot; a shorter
    /// list is zero-filled with `KNIL`; a longer one evaluates (and
    /// discards) the extras for their side effects.
    pub(super) fn parse_and_adjust(&mut self, base: u8, n: usize) -> Result<(), LuaError> {
        let mut i: usize = 0;
        loop {
            let line = self.cur_line();
            let mut e = self.parse_expr(0)?;
            let has_more = self.check_sym(b',');
            if has_more {
                self.advance()?;
            }
            if has_more {
                if i < n {
                    code::to_slot(self.fs(), self.state, &mut e, base + i as u8, line)?;
                } else {
                    code::to_any_slot(self.fs(), self.state, &mut e, line)?;
                }
                i += 1;
                continue;
            }

            // Last expression.
            if i >= n {
                code::to_any_slot(self.fs(), self.state, &mut e, line)?;
                break;
            }
            let remaining = n - i;
            if remaining > 1 {
                if let ExpKind::Call(pc) = e.kind {
                    let want: u8 = remaining
                        .try_into()
                        .map_err(|_| LuaError::runtime_unlocated("too many targets in assignment"))?;
                    self.fs().instr_mut(pc).set_c(want);
                    self.fs().num_stack = base as usize + n;
                } else {
                    code::to_slot(self.fs(), self.state, &mut e, base + i as u8, line)?;
                    let from = base + i as u8 + 1;
                    let to = base as u16 + n as u16 - 1;
                    code::emit_ad(self.fs(), OpCode::KNil, from, to, line);
                    self.fs().num_stack = base as usize + n;
                }
            } else {
                code::to_slot(self.fs(), self.state, &mut e, base + i as u8, line)?;
            }
            break;
        }
        if n == 0 {
            return Ok(());
        }
        if self.fs().num_stack < base as usize + n {
            self.fs().num_stack = base as usize + n;
        }
        Ok(())
    }

    pub(super) fn expr_to_assignable(&mut self, e: ExpDesc) -> Result<super::Assignable, LuaError> {
        match e.kind {
            ExpKind::Local(slot) => Ok(super::Assignable::Local(slot)),
            ExpKind::Global(name) => Ok(super::Assignable::Global(name)),
            _ => Err(self.err("cannot assign to this expression")),
        }
    }
}
