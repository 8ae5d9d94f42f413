//! Host state: evaluation stack, call-frame stack, and the protected-call
//! mechanism (spec §4.G), grounded on `original_source/src/state.c`'s
//! `State`/`ErrCtx`/`pcall`. The original's linked list of longjmp frames
//! becomes ordinary `Result<T, LuaError>` propagation (spec §9's
//! "Non-local escape for errors" note permits structured unwinding when
//! intermediate frames are simple value-only records, which ours are); the
//! saved-stack-depth/re-push-error-after ordering is preserved exactly.

use std::rc::Rc;

use crate::error::LuaError;
use crate::limits::{INITIAL_FRAME_CAPACITY, INITIAL_STACK_SIZE, MAX_CALL_DEPTH};
use crate::value::{FunctionProto, Heap, LuaStr, Value};

/// A saved Lua call, mirroring `state.c`'s bookkeeping for `CALL`/`RET*`
/// (spec §3 "Host state").
#[derive(Debug)]
pub struct CallFrame {
    pub proto: Rc<FunctionProto>,
    pub return_ip: usize,
    pub saved_base: usize,
    /// Slot (relative to the caller's base) the call result lands in.
    pub result_slot: usize,
    /// Requested return count: `0` means "discard all", `n` means "exactly
    /// `n`" (spec §4.D `CALL A,B,C`).
    pub requested: u8,
}

/// Owns everything a running chunk touches: the evaluation stack, the heap
/// arena, and the active call frames.
pub struct LuaState {
    pub stack: Vec<Value>,
    pub heap: Heap,
    pub frames: Vec<CallFrame>,
}

impl LuaState {
    pub fn new() -> Self {
        LuaState {
            stack: Vec::with_capacity(INITIAL_STACK_SIZE),
            heap: Heap::new(),
            frames: Vec::with_capacity(INITIAL_FRAME_CAPACITY),
        }
    }

    pub fn intern_str(&mut self, s: impl Into<LuaStr>) -> Value {
        let r = self.heap.alloc_str(s.into());
        Value::from_heap_ref(r)
    }

    pub fn alloc_fn(&mut self, proto: Rc<FunctionProto>) -> Value {
        let r = self.heap.alloc_fn(proto);
        Value::from_heap_ref(r)
    }

    pub fn call_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn check_call_depth(&self) -> Result<(), LuaError> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            Err(LuaError::runtime_unlocated("stack overflow"))
        } else {
            Ok(())
        }
    }

    /// Runs `f` as a protected call (spec §4.G `pcall`): on error, the
    /// stack is truncated back to its depth before `f` ran and the error
    /// object is re-pushed on top, leaving exactly one value above the
    /// caller's original top.
    pub fn protected_call<T>(
        &mut self,
        f: impl FnOnce(&mut LuaState) -> Result<T, LuaError>,
    ) -> Result<T, LuaError> {
        let saved_top = self.stack.len();
        let saved_frames = self.frames.len();
        match f(self) {
            Ok(v) => Ok(v),
            Err(e) => {
                self.stack.truncate(saved_top);
                self.frames.truncate(saved_frames);
                let msg = self.intern_str(LuaStr::new(e.message.clone()));
                self.stack.push(msg);
                Err(e)
            }
        }
    }
}

impl Default for LuaState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_call_restores_depth_then_pushes_error() {
        let mut state = LuaState::new();
        state.stack.push(Value::nil());
        let result: Result<(), LuaError> = state.protected_call(|s| {
            s.stack.push(Value::from_f64(1.0));
            s.stack.push(Value::from_f64(2.0));
            Err(LuaError::runtime_unlocated("boom"))
        });
        assert!(result.is_err());
        assert_eq!(state.stack.len(), 2);
        assert!(state.stack[1].as_str(&state.heap).is_some());
    }

    #[test]
    fn protected_call_success_leaves_stack_untouched_by_recovery() {
        let mut state = LuaState::new();
        let result = state.protected_call(|s| {
            s.stack.push(Value::from_f64(1.0));
            Ok(42)
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(state.stack.len(), 1);
    }
}
