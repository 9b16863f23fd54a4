#[cfg(test)]
use crate::lua_vm::LuaVM;
use crate::lua_vm::SafeOption;

#[test]
fn test_getinfo_function_fields() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_libs();

    let result = vm.execute_string(
        r#"
        local function f(a, b, ...) return a end
        local info = debug.getinfo(f, "Su")
        assert(info.what == "Lua")
        assert(info.nparams == 2)
        assert(info.isvararg == true)
        "#,
    );
    assert!(result.is_ok(), "getinfo fields failed: {:?}", result);
}

#[test]
fn test_getinfo_level_reports_caller() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_libs();

    let result = vm.execute_string(
        r#"
        local function inner()
            local info = debug.getinfo(1, "n")
            return info
        end
        local info = inner()
        assert(info ~= nil)
        "#,
    );
    assert!(result.is_ok(), "getinfo level failed: {:?}", result);
}

#[test]
fn test_getlocal_reads_named_local() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_libs();

    let result = vm.execute_string(
        r#"
        local function f()
            local x = 42
            local name, value = debug.getlocal(1, 1)
            return name, value
        end
        local name, value = f()
        assert(name == "x")
        assert(value == 42)
        "#,
    );
    assert!(result.is_ok(), "getlocal failed: {:?}", result);
}

#[test]
fn test_setlocal_writes_named_local() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_libs();

    let result = vm.execute_string(
        r#"
        local function f()
            local x = 1
            debug.setlocal(1, 1, 99)
            return x
        end
        assert(f() == 99)
        "#,
    );
    assert!(result.is_ok(), "setlocal failed: {:?}", result);
}

#[test]
fn test_getupvalue_and_setupvalue() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_libs();

    let result = vm.execute_string(
        r#"
        local captured = 10
        local function f() return captured end
        local name, value = debug.getupvalue(f, 1)
        assert(name == "captured")
        assert(value == 10)
        debug.setupvalue(f, 1, 20)
        assert(f() == 20)
        "#,
    );
    assert!(result.is_ok(), "getupvalue/setupvalue failed: {:?}", result);
}

#[test]
fn test_upvalueid_distinguishes_fresh_closures_per_iteration() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_libs();

    let result = vm.execute_string(
        r#"
        local closures = {}
        for i = 1, 3 do
            closures[i] = { get = function() return i end }
        end
        assert(closures[1].get() == 1)
        assert(closures[2].get() == 2)
        assert(closures[3].get() == 3)
        local id1 = debug.upvalueid(closures[1].get, 1)
        local id2 = debug.upvalueid(closures[2].get, 1)
        assert(id1 ~= id2)
        "#,
    );
    assert!(result.is_ok(), "upvalueid freshness failed: {:?}", result);
}

#[test]
fn test_upvaluejoin_rebinds_shared_cell() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_libs();

    let result = vm.execute_string(
        r#"
        local a = 1
        local b = 2
        local function fa() return a end
        local function fb() return b end
        debug.upvaluejoin(fa, 1, fb, 1)
        assert(fa() == 2)
        "#,
    );
    assert!(result.is_ok(), "upvaluejoin failed: {:?}", result);
}

#[test]
fn test_traceback_contains_marker_and_message() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_libs();

    let result = vm.execute_string(
        r#"
        local tb = debug.traceback("boom")
        assert(string.find(tb, "boom", 1, true) ~= nil)
        assert(string.find(tb, "stack traceback:", 1, true) ~= nil)
        "#,
    );
    assert!(result.is_ok(), "traceback formatting failed: {:?}", result);
}

#[test]
fn test_xpcall_handler_sees_traceback() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_libs();

    let result = vm.execute_string(
        r#"
        local function fails() error("kaboom") end
        local ok, msg = xpcall(fails, debug.traceback)
        assert(ok == false)
        assert(string.find(msg, "kaboom", 1, true) ~= nil)
        assert(string.find(msg, "stack traceback:", 1, true) ~= nil)
        "#,
    );
    assert!(result.is_ok(), "xpcall + debug.traceback failed: {:?}", result);
}

#[test]
fn test_sethook_count_fires() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_libs();

    let result = vm.execute_string(
        r#"
        local hits = 0
        debug.sethook(function() hits = hits + 1 end, "", 1)
        local sum = 0
        for i = 1, 50 do sum = sum + i end
        debug.sethook()
        assert(hits > 0)
        "#,
    );
    assert!(result.is_ok(), "count hook failed: {:?}", result);
}

#[test]
fn test_sethook_call_and_return_fire() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_libs();

    let result = vm.execute_string(
        r#"
        local events = {}
        local function f(x) return x + 1 end
        debug.sethook(function(ev) events[#events + 1] = ev end, "cr")
        local r = f(41)
        debug.sethook()
        assert(r == 42)
        local saw_call, saw_return = false, false
        for _, ev in ipairs(events) do
            if ev == "call" then saw_call = true end
            if ev == "return" then saw_return = true end
        end
        assert(saw_call, "expected a call event")
        assert(saw_return, "expected a return event")
        "#,
    );
    assert!(result.is_ok(), "call/return hook failed: {:?}", result);
}

#[test]
fn test_sethook_line_fires_per_line() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_libs();

    let result = vm.execute_string(
        r#"
        local lines = 0
        debug.sethook(function(ev) lines = lines + 1 end, "l")
        local x = 1
        x = x + 1
        x = x + 1
        debug.sethook()
        assert(lines >= 3, "expected at least one line event per statement, got " .. lines)
        "#,
    );
    assert!(result.is_ok(), "line hook failed: {:?}", result);
}

#[test]
fn test_sethook_tailcall_event() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_libs();

    let result = vm.execute_string(
        r#"
        local events = {}
        local function g(n) return n end
        local function f(n) return g(n) end
        debug.sethook(function(ev) events[#events + 1] = ev end, "c")
        local r = f(7)
        debug.sethook()
        assert(r == 7)
        local saw_tail = false
        for _, ev in ipairs(events) do
            if ev == "tail call" then saw_tail = true end
        end
        assert(saw_tail, "expected a tail call event")
        "#,
    );
    assert!(result.is_ok(), "tail call hook failed: {:?}", result);
}
