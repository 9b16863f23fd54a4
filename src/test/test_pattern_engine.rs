// Tests for the Lua pattern-matching engine (find/match/gmatch/gsub).
use crate::*;

#[test]
fn test_find_plain_and_pattern() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local s, e = string.find("hello world", "wor")
        assert(s == 7 and e == 9)
        assert(string.find("hello", "xyz") == nil)
        local s2, e2 = string.find("hello world", "%w+$")
        assert(s2 == 7 and e2 == 11)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_match_with_captures() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local k, v = string.match("foo=123", "(%w+)=(%d+)")
        assert(k == "foo")
        assert(v == "123")
        assert(string.match("hello", "(%a+)") == "hello")
        assert(string.match("   ", "%a+") == nil)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_gmatch_iteration() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local words = {}
        for w in string.gmatch("the quick brown fox", "%a+") do
            table.insert(words, w)
        end
        assert(#words == 4)
        assert(words[1] == "the")
        assert(words[4] == "fox")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_gmatch_empty_match_advances() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    // an empty-matching pattern must still terminate instead of looping forever
    let result = vm.execute_string(
        r#"
        local count = 0
        for _ in string.gmatch("abc", "") do
            count = count + 1
            if count > 10 then break end
        end
        assert(count == 4) -- positions 1,2,3,4 (before each char and at the end)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_gsub_function_replacement() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    // scenario 4 from the end-to-end spec
    let result = vm.execute_string(
        r#"
        local r = (string.gsub("hello world", "(%w+)", function(w) return w:upper() end))
        assert(r == "HELLO WORLD")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_gsub_table_replacement() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local subs = {foo = "bar", baz = "qux"}
        local r, n = string.gsub("foo and baz", "%a+", subs)
        assert(r == "bar and qux")
        assert(n == 3) -- foo, and (no sub -> kept), baz
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_gsub_anchor_exactly_one_replacement() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local s = "hello"
        local r, n = string.gsub(s, "^", "x")
        assert(r == "x" .. s)
        assert(n == 1)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_gsub_limit_count() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local r, n = string.gsub("aaaa", "a", "b", 2)
        assert(r == "bbaa")
        assert(n == 2)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_balanced_and_frontier_patterns() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        assert(string.match("(nested (parens))", "%b()") == "(nested (parens))")
        local s, e = string.find("THE (quick) fox", "%f[%l]%l+")
        assert(s ~= nil and string.sub("THE (quick) fox", s, e) == "quick")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_character_classes_and_sets() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        assert(string.match("abc123", "%d+") == "123")
        assert(string.match("abc123", "%a+") == "abc")
        assert(string.match("  x", "%s+") == "  ")
        assert(string.match("hello", "[aeiou]+") == "e")
        assert(string.match("hello", "[^aeiou]+") == "h")
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}
