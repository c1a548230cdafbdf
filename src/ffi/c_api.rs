//! C API over [`LiveRunner`]
//!
//! Status codes: `0` ok, `-1` invalid argument or null pointer, `-2`
//! library not found, `-3` unknown identifier, `-4` engine fault. The text
//! of the last failure on the calling thread is kept for
//! `liverunner_last_error`. Strings returned to the caller are owned by it
//! and must go back through `liverunner_free_string`; nodes go back through
//! `liverunner_node_free`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::path::Path;
use std::ptr;
use std::sync::Arc;

use serde::Serialize;

use crate::ast::{AstNode, CallSite, NodeKind};
use crate::core::MethodRef;
use crate::engine::UpdateSummary;
use crate::errors::{Result, RunnerError};
use crate::frontend::config::RunnerConfig;
use crate::host::{HostHandle, HostRegistry};
use crate::runner::LiveRunner;

pub const STATUS_OK: i32 = 0;
pub const STATUS_INVALID_ARGUMENT: i32 = -1;

/// Completion callback of `liverunner_update_async`: user data, status and
/// a JSON payload (the update summary, or the error text on failure). The
/// payload pointer is only valid during the call.
///
/// The callback runs exactly once per queued update, on a worker thread.
/// If the runner is freed before the update finishes it still runs, with
/// status `-4`, possibly after `liverunner_free` has returned; `user_data`
/// must stay valid until then.
pub type UpdateCallback = extern "C" fn(user_data: *mut c_void, status: i32, payload: *const c_char);

/// A runner as seen from C, with the handle table its call nodes resolve
/// receivers and selections through.
pub struct FfiRunner {
    runner: LiveRunner,
    handles: Arc<HostRegistry>,
}

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = RefCell::new(None);
}

fn set_last_error(message: impl Into<String>) {
    let text = message.into().replace('\0', " ");
    LAST_ERROR.with(|slot| *slot.borrow_mut() = CString::new(text).ok());
}

fn fail(error: &RunnerError) -> i32 {
    set_last_error(error.to_string());
    error.status_code()
}

fn invalid(message: &str) -> i32 {
    set_last_error(message);
    STATUS_INVALID_ARGUMENT
}

/// # Safety
/// `ptr` is null or a NUL-terminated string valid for the call.
unsafe fn read_str<'a>(ptr: *const c_char, what: &str) -> std::result::Result<&'a str, String> {
    if ptr.is_null() {
        return Err(format!("{} is null", what));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| format!("{} is not valid UTF-8", what))
}

/// # Safety
/// `items` is null (only when `count` is zero) or points at `count` strings
/// valid for the call.
unsafe fn read_str_array<'a>(
    items: *const *const c_char,
    count: usize,
    what: &str,
) -> std::result::Result<Vec<&'a str>, String> {
    if count == 0 {
        return Ok(Vec::new());
    }
    if items.is_null() {
        return Err(format!("{} is null", what));
    }
    (0..count).map(|i| read_str(*items.add(i), what)).collect()
}

fn into_c_string(text: String) -> *mut c_char {
    CString::new(text.replace('\0', " "))
        .map(CString::into_raw)
        .unwrap_or(ptr::null_mut())
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| RunnerError::engine_fault(format!("failed to serialize result: {}", e)))
}

/// Write `value` as JSON into `out` when `out` is non-null.
///
/// # Safety
/// `out` is null or valid for a pointer write.
unsafe fn write_json<T: Serialize>(value: &T, out: *mut *mut c_char) -> i32 {
    if out.is_null() {
        return STATUS_OK;
    }
    match to_json(value) {
        Ok(json) => {
            *out = into_c_string(json);
            STATUS_OK
        }
        Err(e) => fail(&e),
    }
}

fn into_node(result: Result<AstNode>) -> *mut AstNode {
    match result {
        Ok(node) => Box::into_raw(Box::new(node)),
        Err(e) => {
            fail(&e);
            ptr::null_mut()
        }
    }
}

/// Create a runner. `config_path` may be null for the default configuration.
/// Returns null on failure.
#[no_mangle]
pub unsafe extern "C" fn liverunner_new(config_path: *const c_char) -> *mut FfiRunner {
    let config = if config_path.is_null() {
        RunnerConfig::default()
    } else {
        let path = match read_str(config_path, "config path") {
            Ok(p) => p,
            Err(e) => {
                set_last_error(e);
                return ptr::null_mut();
            }
        };
        match RunnerConfig::load(Path::new(path)) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(e);
                return ptr::null_mut();
            }
        }
    };

    let handles = Arc::new(HostRegistry::new());
    match LiveRunner::builder(config).bridge(handles.clone()).build() {
        Ok(runner) => Box::into_raw(Box::new(FfiRunner { runner, handles })),
        Err(e) => {
            set_last_error(e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a runner. Pending async callbacks still run; see [`UpdateCallback`].
#[no_mangle]
pub unsafe extern "C" fn liverunner_free(runner: *mut FfiRunner) {
    if !runner.is_null() {
        drop(Box::from_raw(runner));
    }
}

#[no_mangle]
pub unsafe extern "C" fn liverunner_update(runner: *const FfiRunner, code: *const c_char) -> i32 {
    let Some(ffi) = runner.as_ref() else {
        return invalid("runner is null");
    };
    let code = match read_str(code, "code") {
        Ok(c) => c,
        Err(e) => return invalid(&e),
    };

    match ffi.runner.update(code) {
        Ok(_) => STATUS_OK,
        Err(e) => fail(&e),
    }
}

struct CallbackTarget {
    callback: UpdateCallback,
    user_data: *mut c_void,
    done: bool,
}

// The caller hands `user_data` over for the duration of the update.
unsafe impl Send for CallbackTarget {}

impl CallbackTarget {
    fn complete(mut self, result: Result<UpdateSummary>) {
        self.done = true;
        let (status, payload) = match result.and_then(|summary| to_json(&summary)) {
            Ok(json) => (STATUS_OK, json),
            Err(e) => (e.status_code(), e.to_string()),
        };
        self.call(status, payload);
    }

    fn call(&self, status: i32, payload: String) {
        let payload = CString::new(payload.replace('\0', " ")).unwrap_or_default();
        (self.callback)(self.user_data, status, payload.as_ptr());
    }
}

impl Drop for CallbackTarget {
    // the waiting task was dropped with the runtime
    fn drop(&mut self) {
        if !self.done {
            let error = RunnerError::engine_fault("runner was freed before the update completed");
            self.call(error.status_code(), error.to_string());
        }
    }
}

/// Queue an update. Returns its ticket id (positive), or a negative status
/// when the arguments are invalid. `callback` runs on a worker thread once
/// the update finishes.
#[no_mangle]
pub unsafe extern "C" fn liverunner_update_async(
    runner: *const FfiRunner,
    code: *const c_char,
    callback: Option<UpdateCallback>,
    user_data: *mut c_void,
) -> i64 {
    let Some(ffi) = runner.as_ref() else {
        return invalid("runner is null") as i64;
    };
    let code = match read_str(code, "code") {
        Ok(c) => c,
        Err(e) => return invalid(&e) as i64,
    };

    let ticket = ffi.runner.update_async(code);
    let id = ticket.id() as i64;

    if let Some(callback) = callback {
        let target = CallbackTarget {
            callback,
            user_data,
            done: false,
        };
        ffi.runner.runtime_handle().spawn(async move {
            target.complete(ticket.await);
        });
    }

    id
}

/// Import `count` libraries. On success the imported symbols are written as
/// JSON to `out_json` when it is non-null.
#[no_mangle]
pub unsafe extern "C" fn liverunner_import(
    runner: *const FfiRunner,
    names: *const *const c_char,
    count: usize,
    out_json: *mut *mut c_char,
) -> i32 {
    let Some(ffi) = runner.as_ref() else {
        return invalid("runner is null");
    };
    let libraries = match read_str_array(names, count, "library name") {
        Ok(names) => names,
        Err(e) => return invalid(&e),
    };

    match ffi.runner.import_libraries(&libraries) {
        Ok(symbols) => write_json(&symbols, out_json),
        Err(e) => fail(&e),
    }
}

/// Reinitialize, then import `count` libraries. The reset happens even when
/// the import fails.
#[no_mangle]
pub unsafe extern "C" fn liverunner_reset_and_import(
    runner: *const FfiRunner,
    names: *const *const c_char,
    count: usize,
    out_json: *mut *mut c_char,
) -> i32 {
    let Some(ffi) = runner.as_ref() else {
        return invalid("runner is null");
    };
    let libraries = match read_str_array(names, count, "library name") {
        Ok(names) => names,
        Err(e) => return invalid(&e),
    };

    match ffi.runner.reset_and_import(&libraries) {
        Ok(symbols) => write_json(&symbols, out_json),
        Err(e) => fail(&e),
    }
}

/// Write the value of `name` as JSON to `out_json`.
#[no_mangle]
pub unsafe extern "C" fn liverunner_inspect(
    runner: *const FfiRunner,
    name: *const c_char,
    out_json: *mut *mut c_char,
) -> i32 {
    let Some(ffi) = runner.as_ref() else {
        return invalid("runner is null");
    };
    if out_json.is_null() {
        return invalid("out_json is null");
    }
    let name = match read_str(name, "name") {
        Ok(n) => n,
        Err(e) => return invalid(&e),
    };

    match ffi.runner.inspect(name) {
        Ok(value) => write_json(&value, out_json),
        Err(e) => fail(&e),
    }
}

/// Parameters of `class.method` (or of the global function `method` when
/// `class` is null), written to `out_json` as `[[name, type], ...]`.
#[no_mangle]
pub unsafe extern "C" fn liverunner_function_args(
    runner: *const FfiRunner,
    class: *const c_char,
    method: *const c_char,
    out_json: *mut *mut c_char,
) -> i32 {
    let Some(ffi) = runner.as_ref() else {
        return invalid("runner is null");
    };
    if out_json.is_null() {
        return invalid("out_json is null");
    }
    let method = match read_str(method, "method") {
        Ok(m) => m,
        Err(e) => return invalid(&e),
    };
    let target = if class.is_null() {
        MethodRef::function(method)
    } else {
        match read_str(class, "class") {
            Ok(class) => MethodRef::member(class, method),
            Err(e) => return invalid(&e),
        }
    };

    match ffi.runner.function_args(&target) {
        Ok(params) => {
            let pairs: Vec<(&str, String)> = params
                .iter()
                .map(|p| (p.name.as_str(), p.ty.to_string()))
                .collect();
            write_json(&pairs, out_json)
        }
        Err(e) => fail(&e),
    }
}

/// Hand out a handle standing for `expression` in built call nodes.
/// Returns `0` on failure.
#[no_mangle]
pub unsafe extern "C" fn liverunner_register_handle(
    runner: *const FfiRunner,
    expression: *const c_char,
) -> u64 {
    let Some(ffi) = runner.as_ref() else {
        invalid("runner is null");
        return 0;
    };
    match read_str(expression, "expression") {
        Ok(expression) => ffi.handles.register(expression).as_raw(),
        Err(e) => {
            invalid(&e);
            0
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn liverunner_release_handle(runner: *const FfiRunner, handle: u64) -> i32 {
    let Some(ffi) = runner.as_ref() else {
        return invalid("runner is null");
    };
    match ffi.handles.release(HostHandle::from_raw(handle)) {
        Some(_) => STATUS_OK,
        None => invalid("unknown handle"),
    }
}

/// Build a call node.
///
/// `kind` is one of `function`, `constructor`, `static`, `method`,
/// `property`. `instance` is a registered handle or `0` for none.
/// `format` may be null. Returns null on failure.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn liverunner_build_ast(
    runner: *const FfiRunner,
    kind: *const c_char,
    instance: u64,
    method: *const c_char,
    selection: *const u64,
    selection_count: usize,
    inputs: *const *const c_char,
    input_count: usize,
    format: *const c_char,
) -> *mut AstNode {
    let Some(ffi) = runner.as_ref() else {
        invalid("runner is null");
        return ptr::null_mut();
    };
    let site = match call_site(kind, instance, method, selection, selection_count, inputs, input_count, format) {
        Ok(site) => site,
        Err(e) => {
            invalid(&e);
            return ptr::null_mut();
        }
    };
    into_node(ffi.runner.build_ast(&site))
}

#[allow(clippy::too_many_arguments)]
unsafe fn call_site(
    kind: *const c_char,
    instance: u64,
    method: *const c_char,
    selection: *const u64,
    selection_count: usize,
    inputs: *const *const c_char,
    input_count: usize,
    format: *const c_char,
) -> std::result::Result<CallSite, String> {
    let kind: NodeKind = read_str(kind, "kind")?
        .parse()
        .map_err(|e: RunnerError| e.to_string())?;
    let mut site = CallSite::new(kind, read_str(method, "method")?);

    if instance != 0 {
        site = site.instance(HostHandle::from_raw(instance));
    }
    if selection_count > 0 {
        if selection.is_null() {
            return Err("selection is null".to_string());
        }
        let raw = std::slice::from_raw_parts(selection, selection_count);
        site = site.selection(raw.iter().map(|h| HostHandle::from_raw(*h)));
    }
    site = site.inputs(read_str_array(inputs, input_count, "input")?);
    if !format.is_null() {
        site = site.format(read_str(format, "format")?);
    }
    Ok(site)
}

/// Build an array node from `count` element expressions. Returns null on
/// failure.
#[no_mangle]
pub unsafe extern "C" fn liverunner_build_array(
    runner: *const FfiRunner,
    inputs: *const *const c_char,
    count: usize,
) -> *mut AstNode {
    let Some(ffi) = runner.as_ref() else {
        invalid("runner is null");
        return ptr::null_mut();
    };
    match read_str_array(inputs, count, "input") {
        Ok(inputs) => into_node(ffi.runner.build_array_node(&inputs)),
        Err(e) => {
            invalid(&e);
            ptr::null_mut()
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn liverunner_node_free(node: *mut AstNode) {
    if !node.is_null() {
        drop(Box::from_raw(node));
    }
}

/// Variable name the node binds, or null when `node` is null.
#[no_mangle]
pub unsafe extern "C" fn liverunner_node_name(node: *const AstNode) -> *mut c_char {
    match node.as_ref() {
        Some(node) => into_c_string(node.name().to_string()),
        None => {
            set_last_error("node is null");
            ptr::null_mut()
        }
    }
}

/// Script text of the node's expression, or null when `node` is null.
#[no_mangle]
pub unsafe extern "C" fn liverunner_node_code(node: *const AstNode) -> *mut c_char {
    match node.as_ref() {
        Some(node) => into_c_string(node.code().to_string()),
        None => {
            set_last_error("node is null");
            ptr::null_mut()
        }
    }
}

/// Push a built node into the graph as `name = code;`.
#[no_mangle]
pub unsafe extern "C" fn liverunner_update_graph(runner: *const FfiRunner, node: *const AstNode) -> i32 {
    let Some(ffi) = runner.as_ref() else {
        return invalid("runner is null");
    };
    let Some(node) = node.as_ref() else {
        return invalid("node is null");
    };

    match ffi.runner.update_graph(node) {
        Ok(_) => STATUS_OK,
        Err(e) => fail(&e),
    }
}

/// Human-readable engine state, or null when `runner` is null.
#[no_mangle]
pub unsafe extern "C" fn liverunner_dump(runner: *const FfiRunner) -> *mut c_char {
    match runner.as_ref() {
        Some(ffi) => into_c_string(ffi.runner.dump_state()),
        None => {
            set_last_error("runner is null");
            ptr::null_mut()
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn liverunner_reinitialize(runner: *const FfiRunner) -> i32 {
    match runner.as_ref() {
        Some(ffi) => {
            ffi.runner.reinitialize();
            STATUS_OK
        }
        None => invalid("runner is null"),
    }
}

/// Copy of the last error text on this thread, or null if there is none.
#[no_mangle]
pub extern "C" fn liverunner_last_error() -> *mut c_char {
    LAST_ERROR.with(|slot| {
        slot.borrow()
            .as_ref()
            .map_or(ptr::null_mut(), |message| message.clone().into_raw())
    })
}

#[no_mangle]
pub unsafe extern "C" fn liverunner_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ExecutionSession, ExtensionApplication};
    use std::sync::mpsc;
    use std::time::Duration;

    fn c(text: &str) -> CString {
        CString::new(text).unwrap()
    }

    unsafe fn take(s: *mut c_char) -> String {
        assert!(!s.is_null());
        let text = CStr::from_ptr(s).to_str().unwrap().to_string();
        liverunner_free_string(s);
        text
    }

    #[test]
    fn test_update_and_inspect() {
        unsafe {
            let runner = liverunner_new(ptr::null());
            assert!(!runner.is_null());

            let math = c("Math");
            let names = [math.as_ptr()];
            let mut symbols = ptr::null_mut();
            assert_eq!(liverunner_import(runner, names.as_ptr(), 1, &mut symbols), 0);
            assert!(take(symbols).contains("\"Math\""));

            assert_eq!(liverunner_update(runner, c("x = Math.Sqrt(4);").as_ptr()), 0);

            let mut json = ptr::null_mut();
            assert_eq!(liverunner_inspect(runner, c("x").as_ptr(), &mut json), 0);
            let value: serde_json::Value = serde_json::from_str(&take(json)).unwrap();
            assert_eq!(value["type"], "double");
            assert_eq!(value["value"], 2.0);

            assert!(take(liverunner_dump(runner)).contains("x = Math.Sqrt(4);"));
            liverunner_free(runner);
        }
    }

    #[test]
    fn test_status_codes_and_last_error() {
        unsafe {
            assert_eq!(liverunner_update(ptr::null(), c("x = 1;").as_ptr()), -1);
            assert!(take(liverunner_last_error()).contains("runner is null"));

            let runner = liverunner_new(ptr::null());
            let mut json = ptr::null_mut();
            assert_eq!(liverunner_inspect(runner, c("nothing").as_ptr(), &mut json), -3);
            assert!(json.is_null());

            let bogus = c("NoSuchLibrary");
            let names = [bogus.as_ptr()];
            assert_eq!(liverunner_import(runner, names.as_ptr(), 1, ptr::null_mut()), -2);
            assert!(take(liverunner_last_error()).contains("NoSuchLibrary"));

            assert_eq!(liverunner_update(runner, c("y = 1 +;").as_ptr()), -4);

            assert_eq!(liverunner_update(runner, c("z = 3;").as_ptr()), 0);
            assert_eq!(liverunner_reinitialize(runner), 0);
            assert_eq!(liverunner_inspect(runner, c("z").as_ptr(), &mut json), -3);

            liverunner_free(runner);
        }
    }

    extern "C" fn on_done(user_data: *mut c_void, status: i32, payload: *const c_char) {
        let tx = unsafe { &*(user_data as *const mpsc::Sender<(i32, String)>) };
        let text = unsafe { CStr::from_ptr(payload) }.to_str().unwrap().to_string();
        tx.send((status, text)).unwrap();
    }

    #[test]
    fn test_update_async_callback() {
        let (tx, rx) = mpsc::channel::<(i32, String)>();
        unsafe {
            let runner = liverunner_new(ptr::null());
            let user_data = &tx as *const _ as *mut c_void;

            let first = liverunner_update_async(runner, c("a = 20;").as_ptr(), Some(on_done), user_data);
            let second =
                liverunner_update_async(runner, c("b = a + 1;").as_ptr(), Some(on_done), user_data);
            assert!(first > 0 && second > first);

            let mut payloads = Vec::new();
            for _ in 0..2 {
                let (status, payload) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
                assert_eq!(status, 0);
                payloads.push(payload);
            }
            assert!(payloads.iter().any(|p| p.contains("\"defined\":[\"a\"]")));

            let mut json = ptr::null_mut();
            assert_eq!(liverunner_inspect(runner, c("b").as_ptr(), &mut json), 0);
            assert!(take(json).contains("21"));

            liverunner_free(runner);
        }
    }

    fn pointers(strings: &[CString]) -> Vec<*const c_char> {
        strings.iter().map(|s| s.as_ptr()).collect()
    }

    #[test]
    fn test_build_nodes_and_update_graph() {
        unsafe {
            let runner = liverunner_new(ptr::null());
            let geometry = [c("Geometry")];
            assert_eq!(liverunner_import(runner, pointers(&geometry).as_ptr(), 1, ptr::null_mut()), 0);

            let point_class = liverunner_register_handle(runner, c("Point").as_ptr());
            assert!(point_class > 0);
            let inputs = [c("3"), c("4"), c("0")];
            let point = liverunner_build_ast(
                runner,
                c("static").as_ptr(),
                point_class,
                c("ByCoordinates").as_ptr(),
                ptr::null(),
                0,
                pointers(&inputs).as_ptr(),
                3,
                ptr::null(),
            );
            assert!(!point.is_null());
            assert_eq!(take(liverunner_node_name(point)), "var1");
            assert_eq!(take(liverunner_node_code(point)), "Point.ByCoordinates(3, 4, 0)");
            assert_eq!(liverunner_update_graph(runner, point), 0);

            let receiver = liverunner_register_handle(runner, c("var1").as_ptr());
            let x = liverunner_build_ast(
                runner,
                c("property").as_ptr(),
                receiver,
                c("X").as_ptr(),
                ptr::null(),
                0,
                ptr::null(),
                0,
                ptr::null(),
            );
            assert_eq!(take(liverunner_node_code(x)), "var1.X");
            assert_eq!(liverunner_update_graph(runner, x), 0);

            let mut json = ptr::null_mut();
            assert_eq!(liverunner_inspect(runner, c("var2").as_ptr(), &mut json), 0);
            let value: serde_json::Value = serde_json::from_str(&take(json)).unwrap();
            assert_eq!(value["value"], 3.0);

            let items = [c("1"), c("2")];
            let array = liverunner_build_array(runner, pointers(&items).as_ptr(), 2);
            assert_eq!(take(liverunner_node_code(array)), "[1,2]");
            assert_eq!(take(liverunner_node_name(array)), "var3");

            let bad_kind = liverunner_build_ast(
                runner,
                c("lambda").as_ptr(),
                0,
                c("f").as_ptr(),
                ptr::null(),
                0,
                ptr::null(),
                0,
                ptr::null(),
            );
            assert!(bad_kind.is_null());
            assert!(take(liverunner_last_error()).contains("lambda"));

            assert_eq!(liverunner_release_handle(runner, receiver), 0);
            assert_eq!(liverunner_release_handle(runner, receiver), -1);

            liverunner_node_free(point);
            liverunner_node_free(x);
            liverunner_node_free(array);
            liverunner_free(runner);
        }
    }

    #[test]
    fn test_function_args_and_reset_and_import() {
        unsafe {
            let runner = liverunner_new(ptr::null());
            let geometry = [c("Geometry")];
            let names = pointers(&geometry);
            let mut first = ptr::null_mut();
            assert_eq!(liverunner_import(runner, names.as_ptr(), 1, &mut first), 0);

            let mut json = ptr::null_mut();
            assert_eq!(
                liverunner_function_args(runner, c("Point").as_ptr(), c("ByCoordinates").as_ptr(), &mut json),
                0
            );
            let pairs: Vec<(String, String)> = serde_json::from_str(&take(json)).unwrap();
            let expected: Vec<(String, String)> = ["x", "y", "z"]
                .iter()
                .map(|n| (n.to_string(), "double".to_string()))
                .collect();
            assert_eq!(pairs, expected);

            assert_eq!(
                liverunner_function_args(runner, c("Point").as_ptr(), c("Nope").as_ptr(), &mut json),
                -3
            );

            let items = [c("1")];
            let node = liverunner_build_array(runner, pointers(&items).as_ptr(), 1);

            let mut second = ptr::null_mut();
            assert_eq!(liverunner_reset_and_import(runner, names.as_ptr(), 1, &mut second), 0);
            assert_eq!(take(first), take(second));

            // built before the reset
            assert_eq!(liverunner_update_graph(runner, node), -1);

            liverunner_node_free(node);
            liverunner_free(runner);
        }
    }

    #[test]
    fn test_null_arguments() {
        unsafe {
            let mut json = ptr::null_mut();
            assert!(liverunner_build_array(ptr::null(), ptr::null(), 0).is_null());
            assert!(liverunner_node_name(ptr::null()).is_null());
            assert!(liverunner_node_code(ptr::null()).is_null());
            assert_eq!(liverunner_update_graph(ptr::null(), ptr::null()), -1);
            assert_eq!(
                liverunner_function_args(ptr::null(), ptr::null(), c("f").as_ptr(), &mut json),
                -1
            );
            assert_eq!(liverunner_reset_and_import(ptr::null(), ptr::null(), 0, &mut json), -1);
            assert_eq!(liverunner_register_handle(ptr::null(), c("p").as_ptr()), 0);

            let runner = liverunner_new(ptr::null());
            assert_eq!(liverunner_update_graph(runner, ptr::null()), -1);
            assert!(take(liverunner_last_error()).contains("node is null"));
            assert_eq!(liverunner_import(runner, ptr::null(), 2, ptr::null_mut()), -1);
            assert!(liverunner_build_array(runner, ptr::null(), 3).is_null());
            liverunner_free(runner);
        }
    }

    /// Holds every mutation until released.
    struct Gate(parking_lot::Mutex<mpsc::Receiver<()>>);

    impl ExtensionApplication for Gate {
        fn on_begin_execution(&self, _session: &ExecutionSession) {
            let _ = self.0.lock().recv_timeout(Duration::from_secs(5));
        }
    }

    #[test]
    fn test_free_with_pending_updates_still_calls_back() {
        let (release, gate) = mpsc::channel();
        let handles = Arc::new(HostRegistry::new());
        let runner = LiveRunner::builder(RunnerConfig::default())
            .bridge(handles.clone())
            .extension(Arc::new(Gate(parking_lot::Mutex::new(gate))))
            .build()
            .unwrap();
        let ffi = Box::into_raw(Box::new(FfiRunner { runner, handles }));

        let (tx, rx) = mpsc::channel::<(i32, String)>();
        let user_data = &tx as *const _ as *mut c_void;
        unsafe {
            liverunner_update_async(ffi, c("a = 1;").as_ptr(), Some(on_done), user_data);
            liverunner_update_async(ffi, c("b = 2;").as_ptr(), Some(on_done), user_data);
            liverunner_free(ffi);
        }
        let _ = release.send(());
        let _ = release.send(());

        let mut statuses = Vec::new();
        for _ in 0..2 {
            let (status, _) = rx.recv_timeout(Duration::from_secs(10)).unwrap();
            statuses.push(status);
        }
        assert!(statuses.iter().all(|s| *s == 0 || *s == -4), "{:?}", statuses);
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }
}
