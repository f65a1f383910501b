//! QNTX sync WASM bridge
//!
//! Exposes the content hasher and Merkle tree through raw exports for hosts
//! that drive WASM through linear memory (wazero on the Go server, plain
//! `WebAssembly.instantiate` in the browser). Strings are passed as
//! (pointer, length) pairs.
//!
//! The host allocates via [`wasm_alloc`], writes bytes, calls the function,
//! reads the result, then frees via [`wasm_free`].
//!
//! Return values pack pointer and length into a single u64:
//! `(ptr << 32) | len`
//!
//! Trees are created with [`sync_tree_new`] and addressed by the returned
//! handle. A module instance can hold any number of them.

use std::cell::RefCell;
use std::collections::HashMap;

use qntx_sync_core::TreeBridge;

// ============================================================================
// Memory management
// ============================================================================

/// Allocate `size` bytes in WASM linear memory. Returns a pointer.
/// The host must call `wasm_free` to release.
#[no_mangle]
pub extern "C" fn wasm_alloc(size: u32) -> u32 {
    let layout = match std::alloc::Layout::from_size_align(size as usize, 1) {
        Ok(l) => l,
        Err(_) => return 0,
    };
    if layout.size() == 0 {
        return 0;
    }
    let ptr = unsafe { std::alloc::alloc(layout) };
    if ptr.is_null() {
        return 0;
    }
    ptr as u32
}

/// Free a buffer previously allocated by `wasm_alloc` or returned by an
/// export function.
#[no_mangle]
pub extern "C" fn wasm_free(ptr: u32, size: u32) {
    if ptr == 0 || size == 0 {
        return;
    }
    let layout = match std::alloc::Layout::from_size_align(size as usize, 1) {
        Ok(l) => l,
        Err(_) => return,
    };
    unsafe {
        std::alloc::dealloc(ptr as *mut u8, layout);
    }
}

/// Read a UTF-8 string from WASM memory.
///
/// # Safety
/// `ptr..ptr+len` must be a live allocation written by the host.
unsafe fn read_str(ptr: u32, len: u32) -> Result<&'static str, String> {
    if len == 0 {
        return Ok("");
    }
    let slice = std::slice::from_raw_parts(ptr as *const u8, len as usize);
    std::str::from_utf8(slice).map_err(|e| format!("input is not UTF-8: {}", e))
}

/// Write a string into newly allocated WASM memory and return packed u64.
/// The caller (host) is responsible for freeing via `wasm_free`.
fn write_result(s: &str) -> u64 {
    let bytes = s.as_bytes();
    let len = bytes.len() as u32;
    let ptr = wasm_alloc(len);
    if ptr == 0 {
        return 0;
    }
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr as *mut u8, len as usize);
    }
    ((ptr as u64) << 32) | (len as u64)
}

fn error_json(msg: &str) -> String {
    serde_json::json!({ "error": msg }).to_string()
}

// ============================================================================
// Tree handles
// ============================================================================

/// Live trees of this module instance, keyed by handle. WASM is
/// single-threaded, so each instance has exactly one table.
#[derive(Default)]
struct TreeTable {
    next: u32,
    trees: HashMap<u32, TreeBridge>,
}

thread_local! {
    static TREES: RefCell<TreeTable> = RefCell::new(TreeTable::default());
}

fn new_tree() -> u32 {
    TREES.with(|table| {
        let mut table = table.borrow_mut();
        // 0 is never a valid handle
        table.next = table.next.wrapping_add(1).max(1);
        while table.trees.contains_key(&table.next) {
            table.next = table.next.wrapping_add(1).max(1);
        }
        let handle = table.next;
        table.trees.insert(handle, TreeBridge::new());
        handle
    })
}

fn free_tree(handle: u32) -> bool {
    TREES.with(|table| table.borrow_mut().trees.remove(&handle).is_some())
}

fn with_tree(handle: u32, f: impl FnOnce(&mut TreeBridge) -> String) -> String {
    TREES.with(|table| match table.borrow_mut().trees.get_mut(&handle) {
        Some(bridge) => f(bridge),
        None => error_json(&format!("unknown tree handle {}", handle)),
    })
}

/// Resolve a tree and an input string, then run `f`.
fn call(handle: u32, ptr: u32, len: u32, f: impl FnOnce(&mut TreeBridge, &str) -> String) -> u64 {
    let input = match unsafe { read_str(ptr, len) } {
        Ok(s) => s,
        Err(e) => return write_result(&error_json(&e)),
    };
    write_result(&with_tree(handle, |bridge| f(bridge, input)))
}

// ============================================================================
// Exports
// ============================================================================

/// Get the bridge version as a packed string.
#[no_mangle]
pub extern "C" fn sync_version() -> u64 {
    write_result(env!("CARGO_PKG_VERSION"))
}

/// Create an empty tree. Returns its handle (never 0).
#[no_mangle]
pub extern "C" fn sync_tree_new() -> u32 {
    new_tree()
}

/// Drop a tree. Returns 1 if the handle existed, 0 otherwise.
#[no_mangle]
pub extern "C" fn sync_tree_free(handle: u32) -> u32 {
    free_tree(handle) as u32
}

/// Content hash of a JSON attestation.
/// Returns `{"hash":"<64-char hex>"}` or `{"error":"..."}`.
#[no_mangle]
pub extern "C" fn sync_content_hash(ptr: u32, len: u32) -> u64 {
    match unsafe { read_str(ptr, len) } {
        Ok(input) => write_result(&qntx_sync_core::sync::content_hash_json(input)),
        Err(e) => write_result(&error_json(&e)),
    }
}

/// Index a JSON attestation under all of its groups.
#[no_mangle]
pub extern "C" fn sync_merkle_insert_attestation(handle: u32, ptr: u32, len: u32) -> u64 {
    call(handle, ptr, len, |tree, input| tree.insert_attestation(input))
}

/// Remove a JSON attestation from all of its groups.
#[no_mangle]
pub extern "C" fn sync_merkle_remove_attestation(handle: u32, ptr: u32, len: u32) -> u64 {
    call(handle, ptr, len, |tree, input| tree.remove_attestation(input))
}

/// Input: `{"actor":"...","context":"...","content_hash":"<hex>"}`
#[no_mangle]
pub extern "C" fn sync_merkle_insert(handle: u32, ptr: u32, len: u32) -> u64 {
    call(handle, ptr, len, |tree, input| tree.insert(input))
}

/// Input: `{"actor":"...","context":"...","content_hash":"<hex>"}`
#[no_mangle]
pub extern "C" fn sync_merkle_remove(handle: u32, ptr: u32, len: u32) -> u64 {
    call(handle, ptr, len, |tree, input| tree.remove(input))
}

/// Input: `{"content_hash":"<hex>"}`, optionally scoped by `"group_key_hash"`.
#[no_mangle]
pub extern "C" fn sync_merkle_contains(handle: u32, ptr: u32, len: u32) -> u64 {
    call(handle, ptr, len, |tree, input| tree.contains(input))
}

#[no_mangle]
pub extern "C" fn sync_merkle_root(handle: u32) -> u64 {
    write_result(&with_tree(handle, |tree| tree.root()))
}

#[no_mangle]
pub extern "C" fn sync_merkle_group_hashes(handle: u32) -> u64 {
    write_result(&with_tree(handle, |tree| tree.group_hashes()))
}

/// Input: `{"remote":{"<gkh hex>":"<group hash hex>"}}`
#[no_mangle]
pub extern "C" fn sync_merkle_diff(handle: u32, ptr: u32, len: u32) -> u64 {
    call(handle, ptr, len, |tree, input| tree.diff(input))
}

/// Input: `{"group_key_hash":"<hex>"}`
#[no_mangle]
pub extern "C" fn sync_merkle_find_group_key(handle: u32, ptr: u32, len: u32) -> u64 {
    call(handle, ptr, len, |tree, input| tree.find_group_key(input))
}
