/// string.format implementation: C-printf-compatible specifiers
/// `d i u o x X f e E g G a A c s q p %` with flags, width and precision.
use crate::lua_value::{format_g, format_hex_float};
use crate::{LuaResult, LuaValue, lua_vm::LuaState};

const MAX_WIDTH_OR_PRECISION: usize = 99;

#[derive(Default, Clone, Copy)]
struct FormatSpec {
    minus: bool,
    plus: bool,
    space: bool,
    hash: bool,
    zero: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

/// string.format(formatstring, ...) - Format with various specifiers
pub fn string_format(l: &mut LuaState) -> LuaResult<usize> {
    // Get format string
    let format_str_value = l
        .get_arg(1)
        .ok_or_else(|| l.error("bad argument #1 to 'format' (string expected)".to_string()))?;

    let format_str_id = format_str_value
        .as_string_id()
        .ok_or_else(|| l.error("bad argument #1 to 'format' (string expected)".to_string()))?;

    // Copy format string once to avoid borrow conflicts
    let format = {
        let vm = l.vm_mut();
        vm.object_pool
            .get_string(format_str_id)
            .map(|s| s.as_str().to_string())
            .ok_or_else(|| l.error("invalid string".to_string()))?
    };

    // Collect arguments
    let args = l.get_args();
    let mut arg_index = 1;

    // Pre-allocate result (estimate: format length + 50% for expansions)
    let mut result = String::with_capacity(format.len() + format.len() / 2);
    let mut chars = format.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '%' {
            result.push(ch);
            continue;
        }

        // Check for %%
        if matches!(chars.peek(), Some(&'%')) {
            chars.next();
            result.push('%');
            continue;
        }

        let (spec, fmt_char) = parse_spec(&mut chars)
            .map_err(|_| l.error("invalid conversion to 'format'".to_string()))?;

        if fmt_char == '%' {
            // %% handled above, but "%<flags>%" (e.g. "%-%") is not valid in real Lua;
            // reject rather than silently emitting a literal '%'.
            return Err(l.error("invalid conversion to 'format'".to_string()));
        }

        // Get argument
        let arg = args.get(arg_index).cloned().ok_or_else(|| {
            l.error(format!(
                "bad argument #{} to 'format' (no value)",
                arg_index + 1
            ))
        })?;
        let this_arg = arg_index + 1;
        arg_index += 1;

        format_one(&mut result, fmt_char, &spec, &arg, this_arg, l)?;
    }

    let result_str = l.create_string_owned(result)?;
    l.push_value(result_str)?;
    Ok(1)
}

/// Parses flags, width and precision starting right after a bare `%`, then
/// consumes the conversion character itself. Errs on a width/precision over
/// 99 or a conversion missing its character entirely.
fn parse_spec(chars: &mut std::iter::Peekable<std::str::Chars>) -> Result<(FormatSpec, char), ()> {
    let mut spec = FormatSpec::default();

    loop {
        match chars.peek() {
            Some('-') => {
                spec.minus = true;
                chars.next();
            }
            Some('+') => {
                spec.plus = true;
                chars.next();
            }
            Some(' ') => {
                spec.space = true;
                chars.next();
            }
            Some('#') => {
                spec.hash = true;
                chars.next();
            }
            Some('0') => {
                spec.zero = true;
                chars.next();
            }
            _ => break,
        }
    }

    let mut width_digits = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            width_digits.push(c);
            chars.next();
        } else {
            break;
        }
    }
    if !width_digits.is_empty() {
        let w: usize = width_digits.parse().map_err(|_| ())?;
        if w > MAX_WIDTH_OR_PRECISION {
            return Err(());
        }
        spec.width = Some(w);
    }

    if matches!(chars.peek(), Some('.')) {
        chars.next();
        let mut prec_digits = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() {
                prec_digits.push(c);
                chars.next();
            } else {
                break;
            }
        }
        let p: usize = if prec_digits.is_empty() {
            0
        } else {
            prec_digits.parse().map_err(|_| ())?
        };
        if p > MAX_WIDTH_OR_PRECISION {
            return Err(());
        }
        spec.precision = Some(p);
    }

    let fmt_char = chars.next().ok_or(())?;
    Ok((spec, fmt_char))
}

fn format_one(
    result: &mut String,
    fmt_char: char,
    spec: &FormatSpec,
    arg: &LuaValue,
    arg_num: usize,
    l: &mut LuaState,
) -> LuaResult<()> {
    match fmt_char {
        'c' => format_char(result, spec, arg, arg_num, l),
        'd' | 'i' => format_signed(result, spec, arg, arg_num, l),
        'u' => format_unsigned(result, spec, arg, arg_num, 10, false, l),
        'o' => format_unsigned(result, spec, arg, arg_num, 8, false, l),
        'x' => format_unsigned(result, spec, arg, arg_num, 16, false, l),
        'X' => format_unsigned(result, spec, arg, arg_num, 16, true, l),
        'f' => format_fixed(result, spec, arg, arg_num, l),
        'e' => format_scientific(result, spec, arg, arg_num, false, l),
        'E' => format_scientific(result, spec, arg, arg_num, true, l),
        'g' => format_general(result, spec, arg, arg_num, false, l),
        'G' => format_general(result, spec, arg, arg_num, true, l),
        'a' => format_hex_float_spec(result, spec, arg, arg_num, false, l),
        'A' => format_hex_float_spec(result, spec, arg, arg_num, true, l),
        's' => format_string(result, spec, arg, l),
        'q' => format_quoted(result, spec, arg, arg_num, l),
        'p' => format_pointer(result, spec, arg),
        _ => Err(l.error(format!("invalid option '%{}' to 'format'", fmt_char))),
    }
}

/// Pads `body` (already including any sign/prefix) out to `spec.width`.
/// `zero_ok` gates whether the `0` flag is honored (suppressed for `%c`/`%s`
/// and for integer conversions that were given an explicit precision).
fn apply_width(body: String, spec: &FormatSpec, zero_ok: bool) -> String {
    let width = spec.width.unwrap_or(0);
    let len = body.chars().count();
    if len >= width {
        return body;
    }
    let pad = width - len;
    if spec.minus {
        format!("{}{}", body, " ".repeat(pad))
    } else if spec.zero && zero_ok {
        if let Some(rest) = body.strip_prefix('-') {
            format!("-{}{}", "0".repeat(pad), rest)
        } else if let Some(rest) = body.strip_prefix('+') {
            format!("+{}{}", "0".repeat(pad), rest)
        } else if let Some(rest) = body.strip_prefix(' ') {
            format!(" {}{}", "0".repeat(pad), rest)
        } else if let Some(rest) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
            format!("{}{}{}", &body[..2], "0".repeat(pad), rest)
        } else {
            format!("{}{}", "0".repeat(pad), body)
        }
    } else {
        format!("{}{}", " ".repeat(pad), body)
    }
}

fn bad_argument(l: &mut LuaState, arg_num: usize, what: &str) -> LuaResult<()> {
    Err(l.error(format!(
        "bad argument #{} to 'format' ({})",
        arg_num, what
    )))
}

fn no_modifiers(spec: &FormatSpec) -> bool {
    !spec.minus
        && !spec.plus
        && !spec.space
        && !spec.hash
        && !spec.zero
        && spec.width.is_none()
        && spec.precision.is_none()
}

/// Coerces `arg` to an exactly-representable integer, or raises.
fn checked_int(arg: &LuaValue, arg_num: usize) -> Result<i64, String> {
    if let Some(i) = arg.as_integer_strict() {
        return Ok(i);
    }
    if arg.as_number().is_some() {
        return arg.as_integer().ok_or_else(|| {
            format!(
                "bad argument #{} to 'format' (number has no integer representation)",
                arg_num
            )
        });
    }
    Err(format!(
        "bad argument #{} to 'format' (number expected, got {})",
        arg_num,
        arg.type_name()
    ))
}

fn checked_num(arg: &LuaValue, arg_num: usize) -> Result<f64, String> {
    arg.as_number().ok_or_else(|| {
        format!(
            "bad argument #{} to 'format' (number expected, got {})",
            arg_num,
            arg.type_name()
        )
    })
}

fn format_char(
    result: &mut String,
    spec: &FormatSpec,
    arg: &LuaValue,
    arg_num: usize,
    l: &mut LuaState,
) -> LuaResult<()> {
    if spec.plus || spec.space || spec.hash || spec.zero || spec.precision.is_some() {
        return Err(l.error("invalid conversion to 'format'".to_string()));
    }
    let num = checked_int(arg, arg_num).map_err(|e| l.error(e))?;
    let ch = (num as i64 as u8) as char;
    result.push_str(&apply_width(ch.to_string(), spec, false));
    Ok(())
}

fn format_signed(
    result: &mut String,
    spec: &FormatSpec,
    arg: &LuaValue,
    arg_num: usize,
    l: &mut LuaState,
) -> LuaResult<()> {
    let num = checked_int(arg, arg_num).map_err(|e| l.error(e))?;
    let mut digits = num.unsigned_abs().to_string();
    if let Some(prec) = spec.precision {
        if prec == 0 && num == 0 {
            digits.clear();
        } else if digits.len() < prec {
            digits = format!("{}{}", "0".repeat(prec - digits.len()), digits);
        }
    }
    let sign = if num < 0 {
        "-"
    } else if spec.plus {
        "+"
    } else if spec.space {
        " "
    } else {
        ""
    };
    let body = format!("{}{}", sign, digits);
    let zero_ok = spec.precision.is_none();
    result.push_str(&apply_width(body, spec, zero_ok));
    Ok(())
}

fn format_unsigned(
    result: &mut String,
    spec: &FormatSpec,
    arg: &LuaValue,
    arg_num: usize,
    radix: u32,
    upper: bool,
    l: &mut LuaState,
) -> LuaResult<()> {
    let num = checked_int(arg, arg_num).map_err(|e| l.error(e))? as u64;
    let mut digits = match radix {
        8 => format!("{:o}", num),
        16 => {
            if upper {
                format!("{:X}", num)
            } else {
                format!("{:x}", num)
            }
        }
        _ => format!("{}", num),
    };
    if let Some(prec) = spec.precision {
        if prec == 0 && num == 0 {
            digits.clear();
        } else if digits.len() < prec {
            digits = format!("{}{}", "0".repeat(prec - digits.len()), digits);
        }
    }
    if spec.hash {
        if radix == 8 && !digits.starts_with('0') {
            digits = format!("0{}", digits);
        } else if radix == 16 && num != 0 {
            digits = format!("{}{}", if upper { "0X" } else { "0x" }, digits);
        }
    }
    let zero_ok = spec.precision.is_none();
    result.push_str(&apply_width(digits, spec, zero_ok));
    Ok(())
}

fn sign_prefix(spec: &FormatSpec, negative: bool) -> &'static str {
    if negative {
        "-"
    } else if spec.plus {
        "+"
    } else if spec.space {
        " "
    } else {
        ""
    }
}

fn format_fixed(
    result: &mut String,
    spec: &FormatSpec,
    arg: &LuaValue,
    arg_num: usize,
    l: &mut LuaState,
) -> LuaResult<()> {
    let num = checked_num(arg, arg_num).map_err(|e| l.error(e))?;
    let precision = spec.precision.unwrap_or(6);
    let body = if num.is_nan() {
        "nan".to_string()
    } else if num.is_infinite() {
        "inf".to_string()
    } else {
        let mut digits = format!("{:.*}", precision, num.abs());
        if spec.hash && precision == 0 {
            digits.push('.');
        }
        format!("{}{}", sign_prefix(spec, num.is_sign_negative()), digits)
    };
    result.push_str(&apply_width(body, spec, true));
    Ok(())
}

fn format_scientific(
    result: &mut String,
    spec: &FormatSpec,
    arg: &LuaValue,
    arg_num: usize,
    upper: bool,
    l: &mut LuaState,
) -> LuaResult<()> {
    let num = checked_num(arg, arg_num).map_err(|e| l.error(e))?;
    let precision = spec.precision.unwrap_or(6);
    let body = if num.is_nan() {
        if upper { "NAN".to_string() } else { "nan".to_string() }
    } else if num.is_infinite() {
        if upper { "INF".to_string() } else { "inf".to_string() }
    } else {
        let mantissa_abs = format!("{:.*e}", precision, num.abs());
        let epos = mantissa_abs.find('e').expect("scientific notation has 'e'");
        let mut mantissa = mantissa_abs[..epos].to_string();
        if spec.hash && precision == 0 && !mantissa.contains('.') {
            mantissa.push('.');
        }
        let exp: i32 = mantissa_abs[epos + 1..].parse().unwrap_or(0);
        let e = if upper { 'E' } else { 'e' };
        format!(
            "{}{}{}{}{:02}",
            sign_prefix(spec, num.is_sign_negative()),
            mantissa,
            e,
            if exp < 0 { "-" } else { "+" },
            exp.abs()
        )
    };
    result.push_str(&apply_width(body, spec, true));
    Ok(())
}

fn format_general(
    result: &mut String,
    spec: &FormatSpec,
    arg: &LuaValue,
    arg_num: usize,
    upper: bool,
    l: &mut LuaState,
) -> LuaResult<()> {
    let num = checked_num(arg, arg_num).map_err(|e| l.error(e))?;
    let precision = spec.precision.unwrap_or(14).max(1);
    let body = if num.is_nan() || num.is_infinite() {
        let g = format_g(num, precision, upper, spec.hash);
        g
    } else {
        let sign = sign_prefix(spec, num.is_sign_negative());
        format!("{}{}", sign, format_g(num.abs(), precision, upper, spec.hash))
    };
    result.push_str(&apply_width(body, spec, true));
    Ok(())
}

fn format_hex_float_spec(
    result: &mut String,
    spec: &FormatSpec,
    arg: &LuaValue,
    arg_num: usize,
    upper: bool,
    l: &mut LuaState,
) -> LuaResult<()> {
    let num = checked_num(arg, arg_num).map_err(|e| l.error(e))?;
    let body = format_hex_float(num, spec.precision, upper);
    let body = if num.is_finite() && !num.is_sign_negative() {
        format!("{}{}", sign_prefix(spec, false), body)
    } else {
        body
    };
    result.push_str(&apply_width(body, spec, true));
    Ok(())
}

fn format_string(result: &mut String, spec: &FormatSpec, arg: &LuaValue, l: &mut LuaState) -> LuaResult<()> {
    let mut s = l.to_string(arg)?;
    if let Some(prec) = spec.precision {
        if s.len() > prec {
            s = s.chars().take(prec).collect();
        }
    }
    result.push_str(&apply_width(s, spec, false));
    Ok(())
}

fn format_pointer(result: &mut String, spec: &FormatSpec, arg: &LuaValue) -> LuaResult<()> {
    let is_value_type = arg.is_nil()
        || arg.as_bool().is_some()
        || arg.as_number().is_some()
        || arg.as_string_id().is_some();
    let body = if is_value_type {
        "(null)".to_string()
    } else {
        format!("{}", arg)
    };
    result.push_str(&apply_width(body, spec, false));
    Ok(())
}

fn format_quoted(
    result: &mut String,
    spec: &FormatSpec,
    arg: &LuaValue,
    arg_num: usize,
    l: &mut LuaState,
) -> LuaResult<()> {
    if !no_modifiers(spec) {
        return Err(l.error("invalid conversion to 'format'".to_string()));
    }

    if let Some(str_id) = arg.as_string_id() {
        let s = l
            .vm_mut()
            .object_pool
            .get_string(str_id)
            .map(|s| s.as_str().to_string())
            .ok_or_else(|| l.error("invalid string".to_string()))?;

        result.push('"');
        for ch in s.chars() {
            match ch {
                '"' => result.push_str("\\\""),
                '\\' => result.push_str("\\\\"),
                '\n' => result.push_str("\\n"),
                '\r' => result.push_str("\\r"),
                '\0' => result.push_str("\\000"),
                c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                    result.push_str(&format!("\\{:03}", c as u32))
                }
                c => result.push(c),
            }
        }
        result.push('"');
        return Ok(());
    }

    if arg.is_nil() {
        result.push_str("nil");
        return Ok(());
    }
    if let Some(b) = arg.as_bool() {
        result.push_str(if b { "true" } else { "false" });
        return Ok(());
    }
    if let Some(i) = arg.as_integer_strict() {
        if i == i64::MIN {
            result.push_str(&format!("0x{:x}", i as u64));
        } else {
            result.push_str(&i.to_string());
        }
        return Ok(());
    }
    if let Some(f) = arg.as_number() {
        if f.is_nan() {
            result.push_str("(0/0)");
        } else if f.is_infinite() {
            result.push_str(if f < 0.0 { "-1e9999" } else { "1e9999" });
        } else {
            result.push_str(&format_hex_float(f, None, false));
        }
        return Ok(());
    }

    bad_argument(l, arg_num, "value has no literal form")
}
