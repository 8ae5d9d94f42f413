//! Code emission, jump-list back-patching, and expression materialization
//! (spec §4.E "Jump-list back-patching" / "Materialization contracts"),
//! grounded on the teacher's `compiler::code` module
//! (`code_abc`/`code_abx`/`jump`/`patchlist`/`concat`/`exp2reg`) and on
//! spec §4.D/§4.E's exact contracts.

use crate::bytecode::{Instruction, OpCode};
use crate::error::{LuaError, SourcePos};
use crate::limits::{JMP_BIAS, JMP_NONE, MAX_JMP_OFFSET, NO_SLOT};
use crate::value::{prim_tag, Value};

use super::expdesc::{ExpDesc, ExpKind};
use super::func_state::FuncState;

/// Limits on constants/jump offsets are syntax errors (spec §7), not
/// runtime ones; shared by the call sites below that don't already have a
/// `FuncState` method to route through.
fn syntax_err(fs: &FuncState, line: i32, msg: impl std::fmt::Display) -> LuaError {
    LuaError::syntax(&SourcePos::new(fs.proto.chunk_name.clone(), line, 0), msg)
}

pub fn emit_abc(fs: &mut FuncState, op: OpCode, a: u8, b: u8, c: u8, line: i32) -> usize {
    fs.emit(Instruction::abc(op, a, b, c), line)
}

pub fn emit_ad(fs: &mut FuncState, op: OpCode, a: u8, d: u16, line: i32) -> usize {
    fs.emit(Instruction::ad(op, a, d), line)
}

/// Emits a relocatable instruction: destination `A` is `NO_SLOT` until a
/// later `to_slot` patches it (GLOSSARY "Relocatable instruction").
pub fn emit_reloc_ad(fs: &mut FuncState, op: OpCode, d: u16, line: i32) -> ExpDesc {
    let pc = emit_ad(fs, op, NO_SLOT, d, line);
    ExpDesc::new_reloc(pc)
}

pub fn emit_reloc_abc(fs: &mut FuncState, op: OpCode, b: u8, c: u8, line: i32) -> ExpDesc {
    let pc = emit_abc(fs, op, NO_SLOT, b, c, line);
    ExpDesc::new_reloc(pc)
}

/// Appends an unconditional `JMP` with a self-terminated list ("sentinel")
/// and returns its pc (spec `emit_jmp`).
pub fn emit_jmp(fs: &mut FuncState, line: i32) -> usize {
    let pc = fs.emit(Instruction::e(OpCode::Jmp, 0), line);
    fs.instr_mut(pc).set_jmp_delta(JMP_NONE);
    pc
}

/// Reads a `JMP`'s biased offset as a pc-delta to discover the next node in
/// its list; `JMP_NONE` means "end" (spec `follow_jmp`).
pub fn follow_jmp(fs: &FuncState, pc: usize) -> i32 {
    let delta = fs.instr(pc).jmp_delta();
    if delta == JMP_NONE {
        JMP_NONE
    } else {
        pc as i32 + 1 + delta
    }
}

fn link_jmp(fs: &mut FuncState, pc: usize, next: i32) {
    let delta = if next == JMP_NONE {
        JMP_NONE
    } else {
        next - (pc as i32 + 1)
    };
    fs.instr_mut(pc).set_jmp_delta(delta);
}

/// Splices `to_add`'s list onto the front of `head`'s list (spec
/// `append_jmp`): walks `to_add` to its tail and patches that tail to
/// point at `head`. Returns the new combined list head.
pub fn append_jmp(fs: &mut FuncState, head: i32, to_add: i32) -> i32 {
    if to_add == JMP_NONE {
        return head;
    }
    if head == JMP_NONE {
        return to_add;
    }
    let mut tail = to_add;
    loop {
        let next = follow_jmp(fs, tail as usize);
        if next == JMP_NONE {
            break;
        }
        tail = next;
    }
    link_jmp(fs, tail as usize, head);
    to_add
}

/// Rewrites a `JMP`'s `E` field to branch to `target` (spec `patch_jmp`);
/// raises "control structure too long" past the 24-bit biased range.
pub fn patch_jmp(fs: &mut FuncState, pc: usize, target: usize) -> Result<(), LuaError> {
    let delta = target as i64 - (pc as i64 + 1);
    let biased = delta + JMP_BIAS as i64;
    if !(0..=MAX_JMP_OFFSET as i64).contains(&biased) {
        let line = fs.proto.line_info[pc];
        return Err(syntax_err(fs, line, "control structure too long"));
    }
    fs.instr_mut(pc).set_jmp_delta(delta as i32);
    Ok(())
}

/// Walks a jump list patching every entry to `target` (spec `patch_jmps`).
pub fn patch_jmps(fs: &mut FuncState, head: i32, target: usize) -> Result<(), LuaError> {
    let mut pc = head;
    while pc != JMP_NONE {
        let next = follow_jmp(fs, pc as usize);
        patch_jmp(fs, pc as usize, target)?;
        pc = next;
    }
    Ok(())
}

fn carries_value(fs: &FuncState, jmp_pc: usize) -> bool {
    if jmp_pc == 0 {
        return false;
    }
    let prev = fs.instr(jmp_pc - 1);
    matches!(prev.opcode(), OpCode::Istc | OpCode::Isfc) || prev.a() == NO_SLOT
}

/// For each jump in the list: if the preceding instruction already carries
/// an attached value (`ISTC`/`ISFC`, or a relocatable instruction awaiting
/// its destination), binds that destination to `dst` and patches the jump
/// to `val_target`; otherwise patches to `jmp_target` (spec
/// `patch_jmps_and_vals`).
pub fn patch_jmps_and_vals(
    fs: &mut FuncState,
    head: i32,
    jmp_target: usize,
    dst: u8,
    val_target: usize,
) -> Result<(), LuaError> {
    let mut pc = head;
    while pc != JMP_NONE {
        let cur = pc as usize;
        let next = follow_jmp(fs, cur);
        if carries_value(fs, cur) {
            fs.instr_mut(cur - 1).set_a(dst);
            patch_jmp(fs, cur, val_target)?;
        } else {
            patch_jmp(fs, cur, jmp_target)?;
        }
        pc = next;
    }
    Ok(())
}

/// Walks a jump list patching every entry to `target`, first stripping any
/// attached value (spec's "Not" operation and plain `if`/`while` conditions:
/// the continuation path never needs the comparison's boolean copy).
pub fn patch_jmps_discard(fs: &mut FuncState, head: i32, target: usize) -> Result<(), LuaError> {
    let mut pc = head;
    while pc != JMP_NONE {
        let next = follow_jmp(fs, pc as usize);
        discard_val(fs, pc as usize);
        patch_jmp(fs, pc as usize, target)?;
        pc = next;
    }
    Ok(())
}

/// Flips a test/comparison opcode's sense in place (spec: "if the left is a
/// JMP, invert its condition so the branch goes to the false case"; also
/// used by `not` and by `if`/`while` conditions, which want a false-jump).
pub fn invert_test(fs: &mut FuncState, jmp_pc: usize) {
    if jmp_pc == 0 {
        return;
    }
    let prev_pc = jmp_pc - 1;
    let op = fs.instr(prev_pc).opcode();
    let inverted = match op {
        OpCode::Ist => OpCode::Isf,
        OpCode::Isf => OpCode::Ist,
        OpCode::Istc => OpCode::Isfc,
        OpCode::Isfc => OpCode::Istc,
        OpCode::EqVV => OpCode::NeqVV,
        OpCode::NeqVV => OpCode::EqVV,
        OpCode::EqVP => OpCode::NeqVP,
        OpCode::NeqVP => OpCode::EqVP,
        OpCode::EqVN => OpCode::NeqVN,
        OpCode::NeqVN => OpCode::EqVN,
        OpCode::EqVS => OpCode::NeqVS,
        OpCode::NeqVS => OpCode::EqVS,
        OpCode::LtVV => OpCode::GeVV,
        OpCode::GeVV => OpCode::LtVV,
        OpCode::LtVN => OpCode::GeVN,
        OpCode::GeVN => OpCode::LtVN,
        OpCode::LeVV => OpCode::GtVV,
        OpCode::GtVV => OpCode::LeVV,
        OpCode::LeVN => OpCode::GtVN,
        OpCode::GtVN => OpCode::LeVN,
        other => other,
    };
    fs.instr_mut(prev_pc).set_opcode(inverted);
}

/// Demotes `ISTC -> IST`, `ISFC -> ISF`, or replaces a relocatable
/// instruction awaiting a destination with `NOP` (spec `discard_val`, the
/// dual of `patch_jmps_and_vals`: used when a jump list is patched to a
/// target where the attached value is never needed).
pub fn discard_val(fs: &mut FuncState, jmp_pc: usize) {
    if jmp_pc == 0 {
        return;
    }
    let prev_pc = jmp_pc - 1;
    let prev = fs.instr(prev_pc);
    match prev.opcode() {
        OpCode::Istc => *fs.instr_mut(prev_pc) = Instruction::ad(OpCode::Ist, 0, prev.d()),
        OpCode::Isfc => *fs.instr_mut(prev_pc) = Instruction::ad(OpCode::Isf, 0, prev.d()),
        _ if prev.a() == NO_SLOT => *fs.instr_mut(prev_pc) = Instruction::bare(OpCode::Nop),
        _ => {}
    }
}

/// Calls [`discard_val`] on every node in a jump list, without patching the
/// jumps themselves (spec's `not`: both lists are neutralized before the
/// true/false roles are swapped).
pub fn discard_val_list(fs: &mut FuncState, head: i32) {
    let mut pc = head;
    while pc != JMP_NONE {
        let next = follow_jmp(fs, pc as usize);
        discard_val(fs, pc as usize);
        pc = next;
    }
}

/// Materializes a number constant into a `KINT` (if integral and
/// representable in 16 bits) or a `KNUM` via the constants table
/// (spec's "KINT's D is a 16-bit unsigned integer converted to double").
fn emit_num_load(fs: &mut FuncState, dst: u8, n: f64, line: i32) -> Result<(), LuaError> {
    if n.fract() == 0.0 && n >= 0.0 && n <= u16::MAX as f64 {
        emit_ad(fs, OpCode::KInt, dst, n as u16, line);
    } else {
        let k = fs.add_const(Value::from_f64(n), line)?;
        let k: u16 = k.try_into().map_err(|_| syntax_err(fs, line, "too many constants"))?;
        emit_ad(fs, OpCode::KNum, dst, k, line);
    }
    Ok(())
}

fn emit_str_load(fs: &mut FuncState, dst: u8, s: &str, state: &mut crate::state::LuaState, line: i32) -> Result<(), LuaError> {
    let v = state.intern_str(crate::value::LuaStr::new(s));
    let k = fs.add_const(v, line)?;
    let k: u16 = k.try_into().map_err(|_| syntax_err(fs, line, "too many constants"))?;
    emit_ad(fs, OpCode::KStr, dst, k, line);
    Ok(())
}

/// Discharges the expression into `dst`, returning whether a real value was
/// written to `dst` along the fallthrough path (false for a bare comparison
/// whose `JMP` still needs a later boolean materialization epilogue).
fn discharge(
    fs: &mut FuncState,
    state: &mut crate::state::LuaState,
    e: &mut ExpDesc,
    dst: u8,
    line: i32,
) -> Result<bool, LuaError> {
    match e.kind.clone() {
        ExpKind::Prim(tag) => {
            emit_ad(fs, OpCode::KPrim, dst, tag, line);
            Ok(true)
        }
        ExpKind::Num(n) => {
            emit_num_load(fs, dst, n, line)?;
            Ok(true)
        }
        ExpKind::Str(s) => {
            emit_str_load(fs, dst, &s, state, line)?;
            Ok(true)
        }
        ExpKind::Local(slot) => {
            if slot != dst {
                emit_ad(fs, OpCode::Mov, dst, slot as u16, line);
            }
            Ok(true)
        }
        ExpKind::NonReloc(slot) => {
            if slot != dst {
                emit_ad(fs, OpCode::Mov, dst, slot as u16, line);
            }
            Ok(true)
        }
        ExpKind::Reloc(pc) => {
            fs.instr_mut(pc).set_a(dst);
            Ok(true)
        }
        ExpKind::Call(pc) => {
            let call_base = fs.instr(pc).a();
            if call_base != dst {
                emit_ad(fs, OpCode::Mov, dst, call_base as u16, line);
            }
            Ok(true)
        }
        ExpKind::Jmp(_) => Ok(false),
        ExpKind::Global(name) => Err(LuaError::runtime_unlocated(format!(
            "global variables are not supported (attempt to use '{name}')"
        ))),
    }
}

/// `to_slot(e, dst)` (spec): discharges `e` into `dst`, prepends a bare
/// `JMP` descriptor onto the true-list, and if any jump list remains
/// non-empty, materializes a boolean value through the load-false/load-true
/// epilogue.
pub fn to_slot(
    fs: &mut FuncState,
    state: &mut crate::state::LuaState,
    e: &mut ExpDesc,
    dst: u8,
    line: i32,
) -> Result<(), LuaError> {
    if let ExpKind::Jmp(pc) = e.kind {
        e.true_list = append_jmp(fs, e.true_list, pc as i32);
    }
    let produced_value = discharge(fs, state, e, dst, line)?;

    if e.has_jmp() {
        let mut skip_over = JMP_NONE;
        if produced_value {
            skip_over = emit_jmp(fs, line) as i32;
        }
        let false_pc = fs.pc();
        emit_ad(fs, OpCode::KPrim, dst, prim_tag::FALSE, line);
        let over_true = emit_jmp(fs, line);
        let true_pc = fs.pc();
        emit_ad(fs, OpCode::KPrim, dst, prim_tag::TRUE, line);
        let here = fs.pc();
        patch_jmp(fs, over_true, here)?;
        if skip_over != JMP_NONE {
            patch_jmp(fs, skip_over as usize, here)?;
        }
        patch_jmps_and_vals(fs, e.false_list, false_pc, dst, here)?;
        patch_jmps_and_vals(fs, e.true_list, true_pc, dst, here)?;
        e.true_list = JMP_NONE;
        e.false_list = JMP_NONE;
    }
    e.kind = ExpKind::NonReloc(dst);
    Ok(())
}

/// `to_next_slot(e)`: frees `e`'s slot if it sits at the current top,
/// reserves a fresh one, and discharges into it.
pub fn to_next_slot(
    fs: &mut FuncState,
    state: &mut crate::state::LuaState,
    e: &mut ExpDesc,
    line: i32,
) -> Result<u8, LuaError> {
    if let ExpKind::NonReloc(slot) = e.kind {
        fs.free_slot(slot);
    }
    let dst = fs.reserve_slot(line)?;
    to_slot(fs, state, e, dst, line)?;
    Ok(dst)
}

/// `to_any_slot(e)`: keeps an already-settled `NonReloc` without jumps in
/// place; otherwise behaves like `to_next_slot`.
pub fn to_any_slot(
    fs: &mut FuncState,
    state: &mut crate::state::LuaState,
    e: &mut ExpDesc,
    line: i32,
) -> Result<u8, LuaError> {
    if let ExpKind::NonReloc(slot) = e.kind {
        if !e.has_jmp() {
            return Ok(slot);
        }
    }
    to_next_slot(fs, state, e, line)
}

/// `inline_uint8_num`: if `e` is a number constant whose constants-table
/// index fits an 8-bit operand, returns that index; otherwise `None`
/// (caller must spill to a slot and use the `VV` instruction form).
pub fn inline_uint8_num(fs: &mut FuncState, e: &ExpDesc, line: i32) -> Result<Option<u8>, LuaError> {
    let ExpKind::Num(n) = e.kind else { return Ok(None) };
    let k = fs.add_const(Value::from_f64(n), line)?;
    Ok(u8::try_from(k).ok())
}

/// `inline_uint16_const`: like `inline_uint8_num` but for a 16-bit operand
/// (comparisons' `D` field, or a string constant).
pub fn inline_uint16_const(fs: &mut FuncState, v: Value, line: i32) -> Result<Option<u16>, LuaError> {
    let k = fs.add_const(v, line)?;
    Ok(u16::try_from(k).ok())
}
