// Debug library
// Implements: getinfo, getlocal, setlocal, getupvalue, setupvalue, upvalueid,
// upvaluejoin, traceback, sethook, gethook, getregistry, getuservalue, setuservalue

use crate::lib_registry::LibraryModule;
use crate::lua_value::LuaValue;
use crate::lua_vm::{LuaResult, LuaState};
use crate::lua_vm::debug_info::DebugInfo;

pub fn create_debug_lib() -> LibraryModule {
    crate::lib_module!("debug", {
        "getinfo" => debug_getinfo,
        "getlocal" => debug_getlocal,
        "setlocal" => debug_setlocal,
        "getupvalue" => debug_getupvalue,
        "setupvalue" => debug_setupvalue,
        "upvalueid" => debug_upvalueid,
        "upvaluejoin" => debug_upvaluejoin,
        "traceback" => debug_traceback,
        "sethook" => debug_sethook,
        "gethook" => debug_gethook,
        "getregistry" => debug_getregistry,
        "getmetatable" => debug_getmetatable,
        "setmetatable" => debug_setmetatable,
        "getuservalue" => debug_getuservalue,
        "setuservalue" => debug_setuservalue,
    })
}

/// Resolve a call-stack level (1 = caller of getinfo) to a frame index counting
/// from the bottom, matching how `l.get_frame`/`get_call_info` are indexed.
fn level_to_frame_index(l: &LuaState, level: usize) -> Option<usize> {
    let depth = l.call_depth();
    if level == 0 || level > depth {
        return None;
    }
    Some(depth - level)
}

fn descriptor_for_frame(ci: &crate::lua_vm::CallInfo) -> (&'static str, String) {
    if let Some(func) = ci.func.as_lua_function() {
        if let Some(chunk) = func.chunk() {
            if chunk.linedefined == 0 {
                return ("main", "main chunk".to_string());
            }
        }
        ("Lua", "?".to_string())
    } else {
        ("C", "?".to_string())
    }
}

/// debug.getinfo([thread,] f|level [, what]) -> table
fn debug_getinfo(l: &mut LuaState) -> LuaResult<usize> {
    let arg1 = l
        .get_arg(1)
        .ok_or_else(|| l.error("bad argument #1 to 'getinfo' (value expected)".to_string()))?;

    let mut info = DebugInfo::new();

    if let Some(level) = arg1.as_integer() {
        let Some(frame_idx) = level_to_frame_index(l, level as usize) else {
            l.push_value(LuaValue::nil())?;
            return Ok(1);
        };
        let ci = l.get_call_info(frame_idx).clone();
        fill_info_from_frame(l, &ci, &mut info);
    } else if arg1.is_function() || arg1.is_cfunction() {
        fill_info_from_function(&arg1, &mut info);
    } else {
        return Err(l.error("bad argument #1 to 'getinfo' (function or level expected)".to_string()));
    }

    let table = l.create_table(0, 8)?;
    write_debug_info_table(l, table, &info)?;
    l.push_value(table)?;
    Ok(1)
}

fn fill_info_from_frame(l: &LuaState, ci: &crate::lua_vm::CallInfo, info: &mut DebugInfo) {
    if ci.is_lua() {
        if let Some(func) = ci.func.as_lua_function() {
            if let Some(chunk) = func.chunk() {
                info.fill_source(chunk.source_name.as_deref(), chunk.linedefined, chunk.lastlinedefined);
                info.fill_upvalues(
                    chunk.upvalue_count as u8,
                    chunk.param_count as u8,
                    chunk.is_vararg,
                );
                let line = if ci.pc > 0 && (ci.pc as usize - 1) < chunk.line_info.len() {
                    chunk.line_info[ci.pc as usize - 1] as i32
                } else {
                    0
                };
                info.fill_currentline(line);
                info.fill_activelines(&chunk.line_info, chunk.is_vararg);
            }
        }
    } else {
        info.fill_source_c();
        info.fill_upvalues_c(0);
        info.fill_activelines_nil();
        info.fill_currentline(-1);
    }
    info.fill_tail(ci.is_tail(), 0);
    info.fill_func(ci.func);
    let _ = l;
    info.fill_name_empty();
}

fn fill_info_from_function(func: &LuaValue, info: &mut DebugInfo) {
    if let Some(f) = func.as_lua_function() {
        if let Some(chunk) = f.chunk() {
            info.fill_source(chunk.source_name.as_deref(), chunk.linedefined, chunk.lastlinedefined);
            info.fill_upvalues(chunk.upvalue_count as u8, chunk.param_count as u8, chunk.is_vararg);
            info.fill_activelines(&chunk.line_info, chunk.is_vararg);
        }
    } else {
        info.fill_source_c();
        info.fill_upvalues_c(0);
        info.fill_activelines_nil();
    }
    info.fill_tail(false, 0);
    info.fill_func(*func);
    info.fill_name_empty();
}

fn write_debug_info_table(l: &mut LuaState, table: LuaValue, info: &DebugInfo) -> LuaResult<()> {
    if let Some(source) = &info.source {
        let k = l.create_string("source")?;
        let v = l.create_string(source)?;
        l.raw_set(&table, k, v);
    }
    if let Some(short_src) = &info.short_src {
        let k = l.create_string("short_src")?;
        let v = l.create_string(short_src)?;
        l.raw_set(&table, k, v);
    }
    if let Some(linedefined) = info.linedefined {
        let k = l.create_string("linedefined")?;
        l.raw_set(&table, k, LuaValue::integer(linedefined as i64));
    }
    if let Some(lastlinedefined) = info.lastlinedefined {
        let k = l.create_string("lastlinedefined")?;
        l.raw_set(&table, k, LuaValue::integer(lastlinedefined as i64));
    }
    if let Some(what) = info.what {
        let k = l.create_string("what")?;
        let v = l.create_string(what)?;
        l.raw_set(&table, k, v);
    }
    if let Some(currentline) = info.currentline {
        let k = l.create_string("currentline")?;
        l.raw_set(&table, k, LuaValue::integer(currentline as i64));
    }
    if let Some(nups) = info.nups {
        let k = l.create_string("nups")?;
        l.raw_set(&table, k, LuaValue::integer(nups as i64));
    }
    if let Some(nparams) = info.nparams {
        let k = l.create_string("nparams")?;
        l.raw_set(&table, k, LuaValue::integer(nparams as i64));
    }
    if let Some(isvararg) = info.isvararg {
        let k = l.create_string("isvararg")?;
        l.raw_set(&table, k, LuaValue::boolean(isvararg));
    }
    {
        let k = l.create_string("name")?;
        let v = match &info.name {
            Some(n) => l.create_string(n)?,
            None => LuaValue::nil(),
        };
        l.raw_set(&table, k, v);
    }
    if let Some(namewhat) = &info.namewhat {
        let k = l.create_string("namewhat")?;
        let v = l.create_string(namewhat)?;
        l.raw_set(&table, k, v);
    }
    if let Some(istailcall) = info.istailcall {
        let k = l.create_string("istailcall")?;
        l.raw_set(&table, k, LuaValue::boolean(istailcall));
    }
    if let Some(func) = info.func {
        let k = l.create_string("func")?;
        l.raw_set(&table, k, func);
    }
    Ok(())
}

/// debug.getlocal([thread,] f|level, index) -> name, value
fn debug_getlocal(l: &mut LuaState) -> LuaResult<usize> {
    let level = l
        .get_arg(1)
        .and_then(|v| v.as_integer())
        .ok_or_else(|| l.error("bad argument #1 to 'getlocal' (number expected)".to_string()))?;
    let index = l
        .get_arg(2)
        .and_then(|v| v.as_integer())
        .ok_or_else(|| l.error("bad argument #2 to 'getlocal' (number expected)".to_string()))?;

    let Some(frame_idx) = level_to_frame_index(l, level as usize) else {
        l.push_value(LuaValue::nil())?;
        return Ok(1);
    };
    let ci = l.get_call_info(frame_idx).clone();

    let Some(func) = ci.func.as_lua_function() else {
        l.push_value(LuaValue::nil())?;
        return Ok(1);
    };
    let Some(chunk) = func.chunk() else {
        l.push_value(LuaValue::nil())?;
        return Ok(1);
    };

    let idx = (index - 1) as usize;
    let Some(local) = chunk
        .locals
        .iter()
        .filter(|lv| lv.startpc <= ci.pc && ci.pc < lv.endpc)
        .nth(idx)
    else {
        l.push_value(LuaValue::nil())?;
        return Ok(1);
    };

    let name = l.create_string(&local.name)?;
    let reg = idx as u8;
    let value = l.reg_get(reg).unwrap_or(LuaValue::nil());
    l.push_value(name)?;
    l.push_value(value)?;
    Ok(2)
}

/// debug.setlocal([thread,] level, index, value) -> name|nil
fn debug_setlocal(l: &mut LuaState) -> LuaResult<usize> {
    let level = l
        .get_arg(1)
        .and_then(|v| v.as_integer())
        .ok_or_else(|| l.error("bad argument #1 to 'setlocal' (number expected)".to_string()))?;
    let index = l
        .get_arg(2)
        .and_then(|v| v.as_integer())
        .ok_or_else(|| l.error("bad argument #2 to 'setlocal' (number expected)".to_string()))?;
    let value = l.get_arg(3).unwrap_or(LuaValue::nil());

    let Some(frame_idx) = level_to_frame_index(l, level as usize) else {
        l.push_value(LuaValue::nil())?;
        return Ok(1);
    };
    let ci = l.get_call_info(frame_idx).clone();

    let Some(func) = ci.func.as_lua_function() else {
        l.push_value(LuaValue::nil())?;
        return Ok(1);
    };
    let Some(chunk) = func.chunk() else {
        l.push_value(LuaValue::nil())?;
        return Ok(1);
    };

    let idx = (index - 1) as usize;
    let Some(local) = chunk
        .locals
        .iter()
        .filter(|lv| lv.startpc <= ci.pc && ci.pc < lv.endpc)
        .nth(idx)
    else {
        l.push_value(LuaValue::nil())?;
        return Ok(1);
    };

    let name = l.create_string(&local.name)?;
    l.reg_set(idx as u8, value)?;
    l.push_value(name)?;
    Ok(1)
}

/// debug.getupvalue(f, index) -> name, value
fn debug_getupvalue(l: &mut LuaState) -> LuaResult<usize> {
    let func = l
        .get_arg(1)
        .ok_or_else(|| l.error("bad argument #1 to 'getupvalue' (function expected)".to_string()))?;
    let index = l
        .get_arg(2)
        .and_then(|v| v.as_integer())
        .ok_or_else(|| l.error("bad argument #2 to 'getupvalue' (number expected)".to_string()))?;

    let Some(f) = func.as_lua_function() else {
        l.push_value(LuaValue::nil())?;
        return Ok(1);
    };
    let Some(chunk) = f.chunk() else {
        l.push_value(LuaValue::nil())?;
        return Ok(1);
    };
    let idx = (index - 1) as usize;
    let Some(desc) = chunk.upvalue_descs.get(idx) else {
        l.push_value(LuaValue::nil())?;
        return Ok(1);
    };

    let name = l.create_string(&desc.name)?;
    let uvs = f.cached_upvalues();
    let value = uvs
        .get(idx)
        .and_then(|uv| uv.get_value())
        .unwrap_or(LuaValue::nil());
    l.push_value(name)?;
    l.push_value(value)?;
    Ok(2)
}

/// debug.setupvalue(f, index, value) -> name|nil
fn debug_setupvalue(l: &mut LuaState) -> LuaResult<usize> {
    let func = l
        .get_arg(1)
        .ok_or_else(|| l.error("bad argument #1 to 'setupvalue' (function expected)".to_string()))?;
    let index = l
        .get_arg(2)
        .and_then(|v| v.as_integer())
        .ok_or_else(|| l.error("bad argument #2 to 'setupvalue' (number expected)".to_string()))?;
    let value = l.get_arg(3).unwrap_or(LuaValue::nil());

    let Some(f) = func.as_lua_function() else {
        l.push_value(LuaValue::nil())?;
        return Ok(1);
    };
    let Some(chunk) = f.chunk() else {
        l.push_value(LuaValue::nil())?;
        return Ok(1);
    };
    let idx = (index - 1) as usize;
    let Some(desc) = chunk.upvalue_descs.get(idx) else {
        l.push_value(LuaValue::nil())?;
        return Ok(1);
    };
    let name = l.create_string(&desc.name)?;

    if let Some(uv) = f.cached_upvalues_mut().get_mut(idx) {
        uv.set_value(value);
    }
    l.push_value(name)?;
    Ok(1)
}

/// debug.upvalueid(f, index) -> light identity token for the upvalue cell
fn debug_upvalueid(l: &mut LuaState) -> LuaResult<usize> {
    let func = l
        .get_arg(1)
        .ok_or_else(|| l.error("bad argument #1 to 'upvalueid' (function expected)".to_string()))?;
    let index = l
        .get_arg(2)
        .and_then(|v| v.as_integer())
        .ok_or_else(|| l.error("bad argument #2 to 'upvalueid' (number expected)".to_string()))?;

    let Some(f) = func.as_lua_function() else {
        l.push_value(LuaValue::nil())?;
        return Ok(1);
    };
    let idx = (index - 1) as usize;
    let Some(uv) = f.cached_upvalues().get(idx) else {
        l.push_value(LuaValue::nil())?;
        return Ok(1);
    };

    // Identity is the upvalue cell's own address, not the containing closure's;
    // two closures sharing an upvalue must yield the same token.
    let token = l.create_userdata(crate::lua_value::LuaUserdata::from_upvalue_identity(uv))?;
    l.push_value(token)?;
    Ok(1)
}

/// debug.upvaluejoin(f1, n1, f2, n2) - rebind f1's upvalue n1 to f2's upvalue n2
fn debug_upvaluejoin(l: &mut LuaState) -> LuaResult<usize> {
    let f1 = l
        .get_arg(1)
        .ok_or_else(|| l.error("bad argument #1 to 'upvaluejoin' (function expected)".to_string()))?;
    let n1 = l
        .get_arg(2)
        .and_then(|v| v.as_integer())
        .ok_or_else(|| l.error("bad argument #2 to 'upvaluejoin' (number expected)".to_string()))?;
    let f2 = l
        .get_arg(3)
        .ok_or_else(|| l.error("bad argument #3 to 'upvaluejoin' (function expected)".to_string()))?;
    let n2 = l
        .get_arg(4)
        .and_then(|v| v.as_integer())
        .ok_or_else(|| l.error("bad argument #4 to 'upvaluejoin' (number expected)".to_string()))?;

    let Some(src) = f2.as_lua_function() else {
        return Err(l.error("bad argument #3 to 'upvaluejoin' (Lua function expected)".to_string()));
    };
    let idx2 = (n2 - 1) as usize;
    let Some(shared) = src.cached_upvalues().get(idx2).cloned() else {
        return Err(l.error("invalid upvalue index".to_string()));
    };

    let Some(dst) = f1.as_lua_function_mut() else {
        return Err(l.error("bad argument #1 to 'upvaluejoin' (Lua function expected)".to_string()));
    };
    let idx1 = (n1 - 1) as usize;
    if let Some(slot) = dst.cached_upvalues_mut().get_mut(idx1) {
        *slot = shared;
    } else {
        return Err(l.error("invalid upvalue index".to_string()));
    }
    Ok(0)
}

/// debug.traceback([thread,] [message [, level]]) -> string
fn debug_traceback(l: &mut LuaState) -> LuaResult<usize> {
    let message = l.get_arg(1).unwrap_or(LuaValue::nil());
    let message_str = if message.is_nil() {
        None
    } else if message.is_string() {
        Some(l.to_string(&message)?)
    } else {
        // non-string messages pass through unchanged per xpcall handler semantics
        l.push_value(message)?;
        return Ok(1);
    };

    let start_level = l
        .get_arg(2)
        .and_then(|v| v.as_integer())
        .unwrap_or(1) as usize;

    let mut trace = l.generate_traceback();
    if start_level > 1 {
        // drop the first (start_level - 1) frame lines, keeping the header
        let mut lines: Vec<&str> = trace.split('\n').collect();
        if lines.len() > start_level {
            lines.drain(1..start_level);
        }
        trace = lines.join("\n");
    }

    let result = if let Some(msg) = message_str {
        format!("{}\n{}", msg, trace)
    } else {
        trace
    };

    let s = l.create_string(&result)?;
    l.push_value(s)?;
    Ok(1)
}

/// debug.sethook([thread,] [hook, mask [, count]]) - hook installation is
/// tracked per-thread; dispatch wiring lives in the VM's instruction loop.
fn debug_sethook(l: &mut LuaState) -> LuaResult<usize> {
    let hook = l.get_arg(1).unwrap_or(LuaValue::nil());
    let mask = l
        .get_arg(2)
        .map(|v| l.to_string(&v).unwrap_or_default())
        .unwrap_or_default();
    let count = l.get_arg(3).and_then(|v| v.as_integer()).unwrap_or(0);
    l.set_debug_hook(hook, &mask, count);
    Ok(0)
}

/// debug.gethook([thread]) -> hook, mask, count
fn debug_gethook(l: &mut LuaState) -> LuaResult<usize> {
    let (hook, mask, count) = l.get_debug_hook();
    let mask_str = l.create_string(&mask)?;
    l.push_value(hook)?;
    l.push_value(mask_str)?;
    l.push_value(LuaValue::integer(count))?;
    Ok(3)
}

/// debug.getregistry() -> the registry table
fn debug_getregistry(l: &mut LuaState) -> LuaResult<usize> {
    let registry = l.vm_mut().registry;
    l.push_value(registry)?;
    Ok(1)
}

fn debug_getmetatable(l: &mut LuaState) -> LuaResult<usize> {
    let value = l.get_arg(1).unwrap_or(LuaValue::nil());
    let mt = l.vm_mut().get_metatable(&value);
    l.push_value(mt.unwrap_or(LuaValue::nil()))?;
    Ok(1)
}

fn debug_setmetatable(l: &mut LuaState) -> LuaResult<usize> {
    let value = l
        .get_arg(1)
        .ok_or_else(|| l.error("bad argument #1 to 'setmetatable' (value expected)".to_string()))?;
    let mt = l.get_arg(2).unwrap_or(LuaValue::nil());
    l.vm_mut().set_metatable_raw(&value, mt);
    l.push_value(value)?;
    Ok(1)
}

/// debug.getuservalue(u) -> value|nil
///
/// Only file-handle userdata carry a user value today; arbitrary userdata
/// created from Lua do not yet have a dedicated user-value slot, so this
/// returns nil for them (matches the reference manual's "or nothing" case).
fn debug_getuservalue(l: &mut LuaState) -> LuaResult<usize> {
    let value = l.get_arg(1).unwrap_or(LuaValue::nil());
    if !value.is_userdata() {
        l.push_value(LuaValue::nil())?;
        return Ok(1);
    }
    l.push_value(LuaValue::nil())?;
    Ok(1)
}

/// debug.setuservalue(u, value) -> u
fn debug_setuservalue(l: &mut LuaState) -> LuaResult<usize> {
    let value = l
        .get_arg(1)
        .ok_or_else(|| l.error("bad argument #1 to 'setuservalue' (userdata expected)".to_string()))?;
    if !value.is_userdata() {
        return Err(l.error("bad argument #1 to 'setuservalue' (userdata expected)".to_string()));
    }
    l.push_value(value)?;
    Ok(1)
}
