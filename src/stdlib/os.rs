// OS library
// Implements: clock, date, difftime, execute, exit, getenv, remove, rename,
// setlocale, time, tmpname

use crate::lib_registry::LibraryModule;
use crate::lib_registry::get_arg;
use crate::lua_value::{LuaValue, MultiValue};
use crate::lua_vm::LuaResult;
use crate::lua_vm::LuaVM;
use chrono::{Datelike, Local, TimeZone, Timelike, Utc};

/// Reads a string-valued argument out of the object pool; `None` if `v` isn't a string.
fn lua_string_arg(vm: &LuaVM, v: &LuaValue) -> Option<String> {
    v.as_string_id()
        .and_then(|id| vm.object_pool.get_string(id))
        .map(|s| s.as_str().to_string())
}

pub fn create_os_lib() -> LibraryModule {
    crate::lib_module!("os", {
        "clock" => os_clock,
        "time" => os_time,
        "date" => os_date,
        "difftime" => os_difftime,
        "execute" => os_execute,
        "exit" => os_exit,
        "getenv" => os_getenv,
        "remove" => os_remove,
        "rename" => os_rename,
        "setlocale" => os_setlocale,
        "tmpname" => os_tmpname,
    })
}

fn os_clock(_vm: &mut LuaVM) -> LuaResult<MultiValue> {
    use std::time::Instant;

    // Use a thread-local static to track start time
    thread_local! {
        static START_TIME: std::cell::RefCell<Option<Instant>> = std::cell::RefCell::new(None);
    }

    let elapsed = START_TIME.with(|start| {
        let mut start_ref = start.borrow_mut();
        if start_ref.is_none() {
            *start_ref = Some(Instant::now());
        }
        start_ref.unwrap().elapsed().as_secs_f64()
    });

    Ok(MultiValue::single(LuaValue::float(elapsed)))
}

fn os_time(_vm: &mut LuaVM) -> LuaResult<MultiValue> {
    use std::time::SystemTime;

    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs();

    Ok(MultiValue::single(LuaValue::integer(timestamp as i64)))
}

fn os_date(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    use std::time::SystemTime;

    let mut format = get_arg(vm, 1)
        .and_then(|v| lua_string_arg(vm, &v))
        .unwrap_or_else(|| "%c".to_string());

    let timestamp = get_arg(vm, 2).and_then(|v| v.as_integer()).unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    });

    let as_utc = format.starts_with('!');
    if as_utc {
        format = format.split_off(1);
    }

    if as_utc {
        let dt = Utc
            .timestamp_opt(timestamp, 0)
            .single()
            .ok_or_else(|| vm.error("date: time out of range".to_string()))?;
        build_date_result(vm, dt, &format, false)
    } else {
        let dt = Local
            .timestamp_opt(timestamp, 0)
            .single()
            .ok_or_else(|| vm.error("date: time out of range".to_string()))?;
        build_date_result(vm, dt, &format, false)
    }
}

/// Shared by UTC and local `os.date`: either builds the `"*t"` field table or
/// formats `format` as a chrono strftime pattern (chrono's directives match
/// the C ones `os.date` documents: `%Y %m %d %H %M %S %p %A %a %B %b %j %c
/// %x %X %%`).
fn build_date_result<Tz: chrono::TimeZone>(
    vm: &mut LuaVM,
    dt: chrono::DateTime<Tz>,
    format: &str,
    is_dst: bool,
) -> LuaResult<MultiValue>
where
    Tz::Offset: std::fmt::Display,
{
    if format == "*t" {
        let table = vm.create_table(0, 9);
        let table_id = table.as_table_id().unwrap();

        let year_key = vm.create_string("year");
        let month_key = vm.create_string("month");
        let day_key = vm.create_string("day");
        let hour_key = vm.create_string("hour");
        let min_key = vm.create_string("min");
        let sec_key = vm.create_string("sec");
        let wday_key = vm.create_string("wday");
        let yday_key = vm.create_string("yday");
        let isdst_key = vm.create_string("isdst");

        let wday = dt.weekday().num_days_from_sunday() as i64 + 1;
        let yday = dt.ordinal() as i64;

        let tbl = vm.object_pool.get_table_mut(table_id).unwrap();
        tbl.raw_set(&year_key, LuaValue::integer(dt.year() as i64));
        tbl.raw_set(&month_key, LuaValue::integer(dt.month() as i64));
        tbl.raw_set(&day_key, LuaValue::integer(dt.day() as i64));
        tbl.raw_set(&hour_key, LuaValue::integer(dt.hour() as i64));
        tbl.raw_set(&min_key, LuaValue::integer(dt.minute() as i64));
        tbl.raw_set(&sec_key, LuaValue::integer(dt.second() as i64));
        tbl.raw_set(&wday_key, LuaValue::integer(wday));
        tbl.raw_set(&yday_key, LuaValue::integer(yday));
        tbl.raw_set(&isdst_key, LuaValue::boolean(is_dst));

        Ok(MultiValue::single(table))
    } else {
        let formatted = dt.format(format).to_string();
        let result = vm.create_string(&formatted);
        Ok(MultiValue::single(result))
    }
}

fn os_exit(_vm: &mut LuaVM) -> LuaResult<MultiValue> {
    std::process::exit(0);
}

fn os_difftime(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let t2 = get_arg(vm, 1)
        .and_then(|v| v.as_integer())
        .ok_or(vm.error(
            "difftime: argument 1 must be a number".to_string(),
        ))?;
    let t1 = get_arg(vm, 2)
        .and_then(|v| v.as_integer())
        .ok_or(vm.error(
            "difftime: argument 2 must be a number".to_string(),
        ))?;

    let diff = t2 - t1;
    Ok(MultiValue::single(LuaValue::integer(diff)))
}

fn os_execute(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    use std::process::Command;

    let cmd = get_arg(vm, 1)
        .and_then(|v| lua_string_arg(vm, &v))
        .ok_or(vm.error(
            "execute: argument 1 must be a string".to_string(),
        ))?;

    let output = Command::new("sh").arg("-c").arg(cmd.as_str()).output();

    match output {
        Ok(result) => {
            let exit_code = result.status.code().unwrap_or(-1);
            Ok(MultiValue::multiple(vec![
                LuaValue::boolean(result.status.success()),
                vm.create_string("exit"),
                LuaValue::integer(exit_code as i64),
            ]))
        }
        Err(_) => Ok(MultiValue::single(LuaValue::nil())),
    }
}

fn os_getenv(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let varname = get_arg(vm, 1)
        .and_then(|v| lua_string_arg(vm, &v))
        .ok_or(vm.error(
            "getenv: argument 1 must be a string".to_string(),
        ))?;

    match std::env::var(varname.as_str()) {
        Ok(value) => {
            let result = vm.create_string(&value);
            Ok(MultiValue::single(result))
        }
        Err(_) => Ok(MultiValue::single(LuaValue::nil())),
    }
}

fn os_remove(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let filename = get_arg(vm, 1)
        .and_then(|v| lua_string_arg(vm, &v))
        .ok_or(vm.error(
            "remove: argument 1 must be a string".to_string(),
        ))?;

    match std::fs::remove_file(filename.as_str()) {
        Ok(_) => Ok(MultiValue::single(LuaValue::boolean(true))),
        Err(e) => {
            let err_msg = vm.create_string(&format!("{}", e));
            Ok(MultiValue::multiple(vec![LuaValue::nil(), err_msg]))
        }
    }
}

fn os_rename(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let oldname = get_arg(vm, 1)
        .and_then(|v| lua_string_arg(vm, &v))
        .ok_or(vm.error(
            "rename: argument 1 must be a string".to_string(),
        ))?;
    let newname = get_arg(vm, 2)
        .and_then(|v| lua_string_arg(vm, &v))
        .ok_or(vm.error(
            "rename: argument 2 must be a string".to_string(),
        ))?;

    match std::fs::rename(oldname.as_str(), newname.as_str()) {
        Ok(_) => Ok(MultiValue::single(LuaValue::boolean(true))),
        Err(e) => {
            let err_msg = vm.create_string(&format!("{}", e));
            Ok(MultiValue::multiple(vec![LuaValue::nil(), err_msg]))
        }
    }
}

fn os_setlocale(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    // Only the "C" locale is supported; requests for others are reported but ignored.
    let locale = get_arg(vm, 1)
        .and_then(|v| lua_string_arg(vm, &v))
        .unwrap_or_else(|| "C".to_string());

    let result = vm.create_string(&locale);
    Ok(MultiValue::single(result))
}

fn os_tmpname(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    use std::time::SystemTime;

    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_nanos();

    let tmpname = format!("/tmp/lua_tmp_{}", timestamp);
    let result = vm.create_string(&tmpname);
    Ok(MultiValue::single(result))
}
