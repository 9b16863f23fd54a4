// Tag-method indices shared between the compiler and the metamethod
// dispatcher (mirrors the ordering of `TmKind` in lua_vm::execute::metamethod).
// Kept as named constants so code-gen sites document which metamethod an
// MMBIN/MMBINI/MMBINK operand refers to instead of a bare number.

pub const TM_INDEX: u8 = 0;
pub const TM_NEWINDEX: u8 = 1;
pub const TM_GC: u8 = 2;
pub const TM_MODE: u8 = 3;
pub const TM_LEN: u8 = 4;
pub const TM_EQ: u8 = 5;
pub const TM_ADD: u8 = 6;
pub const TM_SUB: u8 = 7;
pub const TM_MUL: u8 = 8;
pub const TM_MOD: u8 = 9;
pub const TM_POW: u8 = 10;
pub const TM_DIV: u8 = 11;
pub const TM_IDIV: u8 = 12;
pub const TM_BAND: u8 = 13;
pub const TM_BOR: u8 = 14;
pub const TM_BXOR: u8 = 15;
pub const TM_SHL: u8 = 16;
pub const TM_SHR: u8 = 17;
pub const TM_UNM: u8 = 18;
pub const TM_BNOT: u8 = 19;
pub const TM_LT: u8 = 20;
pub const TM_LE: u8 = 21;
pub const TM_CONCAT: u8 = 22;
pub const TM_CALL: u8 = 23;
pub const TM_CLOSE: u8 = 24;
pub const TM_TOSTRING: u8 = 25;

/// Tag-method index for the opcode used by an arithmetic/bitwise MMBIN family
/// instruction. Returns `None` for opcodes that never carry a tag-method
/// operand (e.g. plain MOVE).
pub fn for_opcode(op: crate::lua_vm::OpCode) -> Option<u8> {
    use crate::lua_vm::OpCode;
    Some(match op {
        OpCode::Add | OpCode::AddI | OpCode::AddK => TM_ADD,
        OpCode::Sub | OpCode::SubK => TM_SUB,
        OpCode::Mul | OpCode::MulK => TM_MUL,
        OpCode::Mod | OpCode::ModK => TM_MOD,
        OpCode::Pow | OpCode::PowK => TM_POW,
        OpCode::Div | OpCode::DivK => TM_DIV,
        OpCode::IDiv | OpCode::IDivK => TM_IDIV,
        OpCode::BAnd | OpCode::BAndK => TM_BAND,
        OpCode::BOr | OpCode::BOrK => TM_BOR,
        OpCode::BXor | OpCode::BXorK => TM_BXOR,
        OpCode::Shl | OpCode::ShlI => TM_SHL,
        OpCode::Shr | OpCode::ShrI => TM_SHR,
        _ => return None,
    })
}
