// Lua 5.4 Standard Libraries Implementation

pub mod basic;
pub mod coroutine;
pub mod debug;
pub mod io;
pub mod math;
pub mod os;
pub mod package;
pub mod string;
pub mod table;
pub mod utf8;

/// Selects which standard library modules `LuaVM::open_stdlib` installs.
/// `Basic` always brings in `package` alongside the base functions so that
/// `require`/`package.loaded` are available to whichever module is under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stdlib {
    All,
    Basic,
    Math,
    String,
    Table,
}
