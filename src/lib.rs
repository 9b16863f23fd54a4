// Lua Runtime
// A compact Lua VM implementation with bytecode compiler and GC

#[cfg(test)]
mod test;

pub(crate) mod branch;
pub mod compiler;
pub mod gc;
pub mod lib_registry;
pub mod lua_value;
pub mod lua_vm;
#[cfg(feature = "serde")]
pub mod serde;
pub mod stdlib;
pub use compiler::Compiler;
pub use gc::*;
pub use lib_registry::LibraryRegistry;
pub use lua_value::{Chunk, LuaFunction, LuaString, LuaTable, LuaValue};
pub use lua_vm::{CreateResult, Instruction, LuaResult, LuaVM, OpCode, SafeOption};
use std::rc::Rc;

/// Main entry point for executing Lua code. Uses default stack/call-depth/memory
/// limits and the full standard library set.
pub fn execute(source: &str) -> LuaResult<LuaValue> {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_libs()?;
    execute_with_vm(&mut vm, source)
}

/// Compile and run `source` against an already-configured VM instance, returning
/// the last of the chunk's result values (or nil if it returned none).
pub fn execute_with_vm(vm: &mut LuaVM, source: &str) -> LuaResult<LuaValue> {
    let chunk = vm.compile(source)?;
    let results = vm.execute(Rc::new(chunk))?;
    Ok(results.into_iter().last().unwrap_or_else(LuaValue::nil))
}
