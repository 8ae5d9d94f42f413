//! Threaded-dispatch register VM (spec §4.F), grounded on the teacher's
//! `lua_vm::vm` interpreter loop and on `original_source/src/vm.c` (the
//! call/return + `CONCAT` draft spec §9 singles out as authoritative).
//! The teacher dispatches over a tree-walked AST; this dispatches over the
//! flat bytecode buffer `compiler::code` emits, so only the overall shape
//! (a `match` per opcode, state threaded through loop locals rather than a
//! struct) is kept.

use std::rc::Rc;

use crate::bytecode::OpCode;
use crate::error::{LuaError, SourcePos};
use crate::state::{CallFrame, LuaState};
use crate::value::{Heap, LuaStr, FunctionProto, Value};

/// Builds the `chunk:line:` position of the instruction just dispatched
/// (spec.md:170 requires `err_run` to prefix every runtime error). `ip` has
/// already been incremented past that instruction by the time any opcode
/// arm runs, so its line lives at `ip - 1`.
fn pos_at(proto: &FunctionProto, ip: usize) -> SourcePos {
    SourcePos::new(proto.chunk_name.clone(), proto.line_info[ip - 1], 0)
}

/// Stateless outside of the `LuaState` it's handed; exists so call sites
/// read as `LuaVm::new().call_proto(...)`.
#[derive(Debug, Default)]
pub struct LuaVm;

enum RetOutcome {
    Continue,
    Done(Vec<Value>),
}

impl LuaVm {
    pub fn new() -> Self {
        LuaVm
    }

    /// Calls `proto` with `args` (spec §6 `call`): pushes the function and
    /// its arguments onto the evaluation stack, runs until that call
    /// unwinds, and replaces the function+arguments region with the
    /// produced return values.
    pub fn call_proto(
        &mut self,
        state: &mut LuaState,
        proto: Rc<FunctionProto>,
        args: &[Value],
    ) -> Result<Vec<Value>, LuaError> {
        state.check_call_depth()?;
        let fn_slot = state.stack.len();
        let fn_val = state.alloc_fn(proto.clone());
        state.stack.push(fn_val);
        state.stack.extend_from_slice(args);

        let base = fn_slot + 1;
        reserve_frame(state, base, &proto);
        nil_fill_missing_params(state, base, args.len(), &proto);

        let entry_depth = state.frames.len();
        let result = self.run(state, proto, base, entry_depth);
        state.stack.truncate(fn_slot);
        if let Ok(values) = &result {
            state.stack.extend_from_slice(values);
        }
        result
    }

    fn run(
        &mut self,
        state: &mut LuaState,
        proto: Rc<FunctionProto>,
        base: usize,
        entry_depth: usize,
    ) -> Result<Vec<Value>, LuaError> {
        let mut proto = proto;
        let mut base = base;
        let mut ip: usize = 0;

        loop {
            let ins = proto.instructions[ip];
            ip += 1;

            match ins.opcode() {
                OpCode::Nop => {}

                OpCode::Mov => {
                    let v = state.stack[base + ins.d() as usize];
                    state.stack[base + ins.a() as usize] = v;
                }
                OpCode::KPrim => {
                    state.stack[base + ins.a() as usize] = Value::from_prim_tag(ins.d());
                }
                OpCode::KInt => {
                    state.stack[base + ins.a() as usize] = Value::from_f64(ins.d() as f64);
                }
                OpCode::KNum | OpCode::KStr | OpCode::KFn => {
                    let k = proto.constants[ins.d() as usize];
                    state.stack[base + ins.a() as usize] = k;
                }
                OpCode::KNil => {
                    for i in ins.a() as usize..=ins.d() as usize {
                        state.stack[base + i] = Value::nil();
                    }
                }

                OpCode::Neg => {
                    let v = state.stack[base + ins.d() as usize];
                    let n = check_num(&state.heap, v, "perform arithmetic on", &pos_at(&proto, ip))?;
                    state.stack[base + ins.a() as usize] = Value::from_f64(-n);
                }
                OpCode::Not => {
                    let v = state.stack[base + ins.d() as usize];
                    state.stack[base + ins.a() as usize] = Value::from_bool(!v.compares_true());
                }

                OpCode::AddVV | OpCode::SubVV | OpCode::MulVV | OpCode::DivVV | OpCode::ModVV | OpCode::Pow => {
                    let op = ins.opcode();
                    let l = state.stack[base + ins.b() as usize];
                    let r = state.stack[base + ins.c() as usize];
                    let verb = arith_verb(op);
                    let pos = pos_at(&proto, ip);
                    let a = check_num(&state.heap, l, verb, &pos)?;
                    let b = check_num(&state.heap, r, verb, &pos)?;
                    state.stack[base + ins.a() as usize] = Value::from_f64(apply_arith(op, a, b));
                }
                OpCode::AddVN | OpCode::SubVN | OpCode::MulVN | OpCode::DivVN | OpCode::ModVN => {
                    let op = ins.opcode();
                    let l = state.stack[base + ins.b() as usize];
                    let r = proto.constants[ins.c() as usize];
                    let a = check_num(&state.heap, l, arith_verb(op), &pos_at(&proto, ip))?;
                    state.stack[base + ins.a() as usize] = Value::from_f64(apply_arith(op, a, r.as_f64()));
                }
                OpCode::AddNV | OpCode::SubNV | OpCode::MulNV | OpCode::DivNV | OpCode::ModNV => {
                    let op = ins.opcode();
                    let l = proto.constants[ins.b() as usize];
                    let r = state.stack[base + ins.c() as usize];
                    let b = check_num(&state.heap, r, arith_verb(op), &pos_at(&proto, ip))?;
                    state.stack[base + ins.a() as usize] = Value::from_f64(apply_arith(op, l.as_f64(), b));
                }

                OpCode::Concat => {
                    let (a, b, c) = (ins.a() as usize, ins.b() as usize, ins.c() as usize);
                    let mut buf = String::new();
                    for i in b..=c {
                        let v = state.stack[base + i];
                        match v.as_str(&state.heap) {
                            Some(s) => buf.push_str(s.as_str()),
                            None => {
                                return Err(LuaError::runtime(
                                    &pos_at(&proto, ip),
                                    format!("attempt to concatenate a {} value", v.type_name(&state.heap)),
                                ))
                            }
                        }
                    }
                    let s = state.intern_str(LuaStr::new(buf));
                    state.stack[base + a] = s;
                }

                OpCode::Ist | OpCode::Isf => {
                    let v = state.stack[base + ins.d() as usize];
                    let want = ins.opcode() == OpCode::Ist;
                    if v.compares_true() != want {
                        ip += 1;
                    }
                }
                OpCode::Istc | OpCode::Isfc => {
                    let v = state.stack[base + ins.d() as usize];
                    let want = ins.opcode() == OpCode::Istc;
                    if v.compares_true() == want {
                        state.stack[base + ins.a() as usize] = v;
                    } else {
                        ip += 1;
                    }
                }

                OpCode::EqVV | OpCode::NeqVV => {
                    let l = state.stack[base + ins.a() as usize];
                    let r = state.stack[base + ins.d() as usize];
                    let eq = values_equal(l, r, &state.heap);
                    if eq == (ins.opcode() == OpCode::NeqVV) {
                        ip += 1;
                    }
                }
                OpCode::EqVP | OpCode::NeqVP => {
                    let l = state.stack[base + ins.a() as usize];
                    let eq = l.bits() == Value::from_prim_tag(ins.d()).bits();
                    if eq == (ins.opcode() == OpCode::NeqVP) {
                        ip += 1;
                    }
                }
                OpCode::EqVN | OpCode::NeqVN | OpCode::EqVS | OpCode::NeqVS => {
                    let l = state.stack[base + ins.a() as usize];
                    let r = proto.constants[ins.d() as usize];
                    let eq = values_equal(l, r, &state.heap);
                    let is_neq = matches!(ins.opcode(), OpCode::NeqVN | OpCode::NeqVS);
                    if eq == is_neq {
                        ip += 1;
                    }
                }

                OpCode::LtVV | OpCode::LeVV | OpCode::GtVV | OpCode::GeVV => {
                    let l = state.stack[base + ins.a() as usize];
                    let r = state.stack[base + ins.d() as usize];
                    let pos = pos_at(&proto, ip);
                    let a = check_num(&state.heap, l, "compare", &pos)?;
                    let b = check_num(&state.heap, r, "compare", &pos)?;
                    if !order_take(ins.opcode(), a, b) {
                        ip += 1;
                    }
                }
                OpCode::LtVN | OpCode::LeVN | OpCode::GtVN | OpCode::GeVN => {
                    let l = state.stack[base + ins.a() as usize];
                    let r = proto.constants[ins.d() as usize];
                    let a = check_num(&state.heap, l, "compare", &pos_at(&proto, ip))?;
                    if !order_take(ins.opcode(), a, r.as_f64()) {
                        ip += 1;
                    }
                }

                OpCode::Jmp => {
                    ip = (ip as i64 + ins.jmp_delta() as i64) as usize;
                }

                OpCode::Call => {
                    let (a, b, c) = (ins.a(), ins.b(), ins.c());
                    let fn_val = state.stack[base + a as usize];
                    let callee = fn_val.as_fn(&state.heap).cloned().ok_or_else(|| {
                        LuaError::runtime(
                            &pos_at(&proto, ip),
                            format!("attempt to call a {} value", fn_val.type_name(&state.heap)),
                        )
                    })?;
                    state.check_call_depth()?;

                    let new_base = base + a as usize + 1;
                    let num_args = (b as usize).saturating_sub(1);
                    reserve_frame(state, new_base, &callee);
                    nil_fill_missing_params(state, new_base, num_args, &callee);

                    state.frames.push(CallFrame {
                        proto: proto.clone(),
                        return_ip: ip,
                        saved_base: base,
                        result_slot: a as usize,
                        requested: c,
                    });
                    proto = callee;
                    base = new_base;
                    ip = 0;
                }

                OpCode::Ret0 => match finish_return(state, &mut proto, &mut base, &mut ip, entry_depth, base, 0) {
                    RetOutcome::Done(values) => return Ok(values),
                    RetOutcome::Continue => {}
                },
                OpCode::Ret1 => {
                    let src = base + ins.d() as usize;
                    match finish_return(state, &mut proto, &mut base, &mut ip, entry_depth, src, 1) {
                        RetOutcome::Done(values) => return Ok(values),
                        RetOutcome::Continue => {}
                    }
                }
                OpCode::Ret => {
                    let src = base + ins.a() as usize;
                    let count = ins.d() as usize;
                    match finish_return(state, &mut proto, &mut base, &mut ip, entry_depth, src, count) {
                        RetOutcome::Done(values) => return Ok(values),
                        RetOutcome::Continue => {}
                    }
                }
            }
        }
    }
}

/// Grows the evaluation stack so the frame about to run at `base` has all
/// of `proto.max_stack` slots available, nil-filling any newly created
/// ones (spec §5: "the evaluation stack grows on demand").
fn reserve_frame(state: &mut LuaState, base: usize, proto: &FunctionProto) {
    let needed = base + proto.max_stack as usize;
    if state.stack.len() < needed {
        state.stack.resize(needed, Value::nil());
    }
}

/// Fills param slots beyond the number of arguments actually supplied with
/// `nil`; those slots may hold stale values from a reclaimed frame rather
/// than fresh zeroed memory, so this can't be folded into `reserve_frame`'s
/// grow-only resize.
fn nil_fill_missing_params(state: &mut LuaState, base: usize, num_args: usize, proto: &FunctionProto) {
    let num_params = proto.num_params as usize;
    for i in num_args..num_params {
        state.stack[base + i] = Value::nil();
    }
}

/// Pops the call frame this return unwinds into (spec §4.F `RET0/RET1/RET`):
/// copies `count` values starting at `src_base` into the caller's requested
/// destination, nil-fills any shortfall, and reclaims the returning frame's
/// stack space. Returns `Done` once the frame stack unwinds back to the
/// depth `call_proto` started at.
fn finish_return(
    state: &mut LuaState,
    proto: &mut Rc<FunctionProto>,
    base: &mut usize,
    ip: &mut usize,
    entry_depth: usize,
    src_base: usize,
    count: usize,
) -> RetOutcome {
    let values: Vec<Value> = state.stack[src_base..src_base + count].to_vec();
    if state.frames.len() == entry_depth {
        return RetOutcome::Done(values);
    }

    let frame = state.frames.pop().expect("checked against entry_depth above");
    let requested = frame.requested as usize;
    let dst = frame.saved_base + frame.result_slot;
    let copied = requested.min(values.len());
    state.stack[dst..dst + copied].copy_from_slice(&values[..copied]);
    for slot in state.stack[dst + copied..dst + requested].iter_mut() {
        *slot = Value::nil();
    }
    // Never shrink past the caller's own reserved frame: `dst + requested`
    // can fall short of it when the call discards most of its results, and
    // the caller still owns slots out to its `max_stack` high-water mark.
    let caller_floor = frame.saved_base + frame.proto.max_stack as usize;
    let keep = (dst + requested).max(caller_floor);
    if state.stack.len() > keep {
        state.stack.truncate(keep);
    }

    *proto = frame.proto;
    *base = frame.saved_base;
    *ip = frame.return_ip;
    RetOutcome::Continue
}

fn check_num(heap: &Heap, v: Value, verb: &str, pos: &SourcePos) -> Result<f64, LuaError> {
    if v.is_num() {
        Ok(v.as_f64())
    } else {
        Err(LuaError::runtime(
            pos,
            format!("attempt to {verb} a {} value", v.type_name(heap)),
        ))
    }
}

fn arith_verb(op: OpCode) -> &'static str {
    match op {
        OpCode::AddVV | OpCode::AddVN | OpCode::AddNV => "add",
        OpCode::SubVV | OpCode::SubVN | OpCode::SubNV => "subtract",
        OpCode::MulVV | OpCode::MulVN | OpCode::MulNV => "multiply",
        OpCode::DivVV | OpCode::DivVN | OpCode::DivNV => "divide",
        _ => "perform arithmetic on",
    }
}

/// Matches `compiler::expr`'s constant-folding `BinOp::eval` exactly (spec
/// §8 invariant 4 requires folded and executed code to agree): Lua 5.4's
/// `%` is floor modulo, not C's `fmod`, despite `original_source/vm.c`
/// calling the latter (see DESIGN.md).
fn apply_arith(op: OpCode, a: f64, b: f64) -> f64 {
    match op {
        OpCode::AddVV | OpCode::AddVN | OpCode::AddNV => a + b,
        OpCode::SubVV | OpCode::SubVN | OpCode::SubNV => a - b,
        OpCode::MulVV | OpCode::MulVN | OpCode::MulNV => a * b,
        OpCode::DivVV | OpCode::DivVN | OpCode::DivNV => a / b,
        OpCode::ModVV | OpCode::ModVN | OpCode::ModNV => a - (a / b).floor() * b,
        OpCode::Pow => a.powf(b),
        _ => unreachable!("apply_arith called on non-arithmetic opcode"),
    }
}

fn order_take(op: OpCode, a: f64, b: f64) -> bool {
    match op {
        OpCode::LtVV | OpCode::LtVN => a < b,
        OpCode::LeVV | OpCode::LeVN => a <= b,
        OpCode::GtVV | OpCode::GtVN => a > b,
        OpCode::GeVV | OpCode::GeVN => a >= b,
        _ => unreachable!("order_take called on non-order opcode"),
    }
}

/// `EQVS` compares string operands by content (length+bytes, spec §8
/// invariant 5); every other pair compares by raw bit pattern, which is
/// correct identity for numbers, primitives, and (reference) functions.
fn values_equal(a: Value, b: Value, heap: &Heap) -> bool {
    match (a.as_str(heap), b.as_str(heap)) {
        (Some(sa), Some(sb)) => sa == sb,
        _ => a.bits() == b.bits(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::reader::StrSource;

    fn run(src: &str) -> (LuaState, Vec<Value>) {
        let mut state = LuaState::new();
        let proto = Compiler::compile(&mut state, StrSource::new(src), "test").unwrap();
        let mut vm = LuaVm::new();
        let values = vm.call_proto(&mut state, proto, &[]).unwrap();
        (state, values)
    }

    #[test]
    fn arithmetic_and_locals() {
        let (_state, values) = run("local a = 2 local b = a + 3 return b");
        assert_eq!(values[0].as_f64(), 5.0);
    }

    #[test]
    fn while_loop_accumulates() {
        let (_state, values) = run("local s = 0 local i = 1 while i <= 3 do s = s + i i = i + 1 end return s, i");
        assert_eq!(values[0].as_f64(), 6.0);
        assert_eq!(values[1].as_f64(), 4.0);
    }

    #[test]
    fn if_else_picks_the_taken_branch() {
        let (_state, values) = run("local x = 10 if x > 5 then x = 1 else x = 2 end return x");
        assert_eq!(values[0].as_f64(), 1.0);
    }

    #[test]
    fn repeat_until_runs_body_at_least_once() {
        let (_state, values) = run("local n = 0 repeat n = n + 1 until true return n");
        assert_eq!(values[0].as_f64(), 1.0);
    }

    #[test]
    fn calling_a_function_value() {
        let mut state = LuaState::new();
        let proto = Compiler::compile(
            &mut state,
            StrSource::new("local f = function(x) return x + 1 end return f"),
            "test",
        )
        .unwrap();
        let mut vm = LuaVm::new();
        let results = vm.call_proto(&mut state, proto, &[]).unwrap();
        let f = results[0].as_fn(&state.heap).expect("returned value is a function").clone();
        let results = vm.call_proto(&mut state, f, &[Value::from_f64(41.0)]).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_f64(), 42.0);
    }

    #[test]
    fn adding_nil_is_a_runtime_error() {
        let mut state = LuaState::new();
        let proto = Compiler::compile(&mut state, StrSource::new("local x = nil + 1"), "test").unwrap();
        let mut vm = LuaVm::new();
        let err = vm.call_proto(&mut state, proto, &[]).unwrap_err();
        assert!(err.message.starts_with("test:1:"));
        assert!(err.message.contains("attempt to add"));
        assert!(err.message.contains("nil"));
    }

    #[test]
    fn concat_builds_expected_string() {
        let mut state = LuaState::new();
        let proto = Compiler::compile(&mut state, StrSource::new("local s = \"a\" .. \"bc\" return s"), "test").unwrap();
        let mut vm = LuaVm::new();
        let results = vm.call_proto(&mut state, proto, &[]).unwrap();
        let s = results[0].as_str(&state.heap).expect("concat result is a string");
        assert_eq!(s.as_str(), "abc");
        assert_eq!(s.len(), 3);
    }
}
