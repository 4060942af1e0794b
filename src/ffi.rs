// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Bindings to the engine's C interface.
//!
//! Compiled only with the `native` feature; requires `libarrayrt` at link
//! time. [`NativeEngine`] implements [`NativeRuntime`] directly over the
//! `axr_*` entry points, one trait method per C function.
//!
//! ## Ownership Conventions
//!
//! The C interface is reference-counted: `axr_array_retain` adds a
//! reference, `axr_array_free` drops one, and containers retain on push and
//! release their contents when freed. [`NativeArray`] mirrors this with
//! `Clone` (retain) and `Drop` (release), so each Rust value owns exactly
//! one reference. Container, closure, exporter, and function handles are
//! released through the matching `axr_*_free`, driven by the guards and
//! facades in this crate.
//!
//! Host closures cross the boundary as a trampoline plus a boxed payload;
//! the engine calls the payload destructor when the closure is freed. A
//! panic in host code is caught at the trampoline and reported to the
//! engine as a null result, which it surfaces as a failed trace.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::ptr::{self, NonNull};

use crate::error::{BridgeError, Result};
use crate::runtime::{NativeRuntime, TraceFn};

/// Raw declarations for the engine's C interface.
pub mod sys {
    #![allow(non_camel_case_types, missing_docs, clippy::missing_safety_doc)]

    use std::ffi::{c_char, c_int, c_void};

    #[repr(C)]
    pub struct axr_array {
        _unused: [u8; 0],
    }
    #[repr(C)]
    pub struct axr_vector {
        _unused: [u8; 0],
    }
    #[repr(C)]
    pub struct axr_map {
        _unused: [u8; 0],
    }
    #[repr(C)]
    pub struct axr_closure {
        _unused: [u8; 0],
    }
    #[repr(C)]
    pub struct axr_exporter {
        _unused: [u8; 0],
    }
    #[repr(C)]
    pub struct axr_function {
        _unused: [u8; 0],
    }

    /// Host callback invoked by the engine during tracing. Returns a new
    /// result vector, or null if the host function failed.
    pub type axr_trampoline =
        unsafe extern "C" fn(args: *const axr_vector, payload: *mut c_void) -> *mut axr_vector;

    /// Destructor for the trampoline payload, called when the closure is
    /// freed.
    pub type axr_payload_dtor = unsafe extern "C" fn(payload: *mut c_void);

    #[link(name = "arrayrt")]
    extern "C" {
        pub fn axr_array_retain(array: *mut axr_array) -> *mut axr_array;
        pub fn axr_array_free(array: *mut axr_array);

        pub fn axr_vector_new() -> *mut axr_vector;
        pub fn axr_vector_push(vector: *mut axr_vector, value: *mut axr_array);
        pub fn axr_vector_len(vector: *const axr_vector) -> usize;
        pub fn axr_vector_get(vector: *const axr_vector, index: usize) -> *mut axr_array;
        pub fn axr_vector_free(vector: *mut axr_vector);

        pub fn axr_map_new() -> *mut axr_map;
        pub fn axr_map_insert(map: *mut axr_map, key: *const c_char, value: *mut axr_array);
        pub fn axr_map_free(map: *mut axr_map);

        pub fn axr_closure_new(
            trampoline: axr_trampoline,
            payload: *mut c_void,
            dtor: axr_payload_dtor,
        ) -> *mut axr_closure;
        pub fn axr_closure_new_kwargs(
            keys: *const *const c_char,
            num_keys: usize,
            trampoline: axr_trampoline,
            payload: *mut c_void,
            dtor: axr_payload_dtor,
        ) -> *mut axr_closure;
        pub fn axr_closure_free(closure: *mut axr_closure);

        pub fn axr_export_function(
            destination: *const c_char,
            closure: *const axr_closure,
            positional: *const axr_vector,
            keywords: *const axr_map,
            shapeless: bool,
        ) -> c_int;

        pub fn axr_exporter_new(
            destination: *const c_char,
            closure: *const axr_closure,
            shapeless: bool,
        ) -> *mut axr_exporter;
        pub fn axr_exporter_apply(
            exporter: *mut axr_exporter,
            positional: *const axr_vector,
            keywords: *const axr_map,
        ) -> c_int;
        pub fn axr_exporter_free(exporter: *mut axr_exporter);

        pub fn axr_function_load(source: *const c_char) -> *mut axr_function;
        pub fn axr_function_apply(
            function: *const axr_function,
            positional: *const axr_vector,
            keywords: *const axr_map,
            result: *mut *mut axr_vector,
        ) -> c_int;
        pub fn axr_function_free(function: *mut axr_function);

        /// Message for the most recent failure on this thread. Borrowed;
        /// valid until the next failing call.
        pub fn axr_last_error() -> *const c_char;
    }
}

/// An engine array value.
///
/// Owns exactly one reference to the underlying engine array: `Clone`
/// retains, `Drop` releases. Not `Send`; engine arrays are bound to the
/// thread that created them unless the engine documents otherwise.
pub struct NativeArray {
    raw: NonNull<sys::axr_array>,
}

impl NativeArray {
    /// Wrap a raw engine array, taking ownership of one reference.
    ///
    /// Returns `None` for a null pointer.
    ///
    /// # Safety
    ///
    /// `raw` must be a valid engine array whose reference the caller
    /// transfers to the returned value.
    #[must_use]
    pub unsafe fn from_raw(raw: *mut sys::axr_array) -> Option<Self> {
        NonNull::new(raw).map(|raw| Self { raw })
    }

    /// Raw pointer to the engine array. The reference stays owned by
    /// `self`.
    #[must_use]
    pub fn as_ptr(&self) -> *mut sys::axr_array {
        self.raw.as_ptr()
    }
}

impl Clone for NativeArray {
    fn clone(&self) -> Self {
        // Retain returns its argument; the pointer is already non-null.
        unsafe { sys::axr_array_retain(self.raw.as_ptr()) };
        Self { raw: self.raw }
    }
}

impl Drop for NativeArray {
    fn drop(&mut self) {
        unsafe { sys::axr_array_free(self.raw.as_ptr()) };
    }
}

/// Engine array list handle.
pub struct NativeVector {
    raw: *mut sys::axr_vector,
}

/// Engine keyword map handle.
pub struct NativeMap {
    raw: *mut sys::axr_map,
}

/// Engine closure handle.
pub struct NativeClosure {
    raw: *mut sys::axr_closure,
}

/// Open multi-shot exporter handle.
pub struct NativeExporter {
    raw: *mut sys::axr_exporter,
}

/// Imported function handle.
pub struct NativeFunction {
    raw: *mut sys::axr_function,
}

fn last_error() -> String {
    let ptr = unsafe { sys::axr_last_error() };
    if ptr.is_null() {
        "unknown engine error".to_string()
    } else {
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }
}

fn check_status(status: c_int) -> Result<()> {
    if status == 0 {
        Ok(())
    } else {
        Err(BridgeError::native(last_error()))
    }
}

fn path_to_cstring(path: &Path) -> Result<CString> {
    let utf8 = path.to_str().ok_or_else(|| {
        BridgeError::invalid_config(format!("path is not valid UTF-8: {}", path.display()))
    })?;
    CString::new(utf8).map_err(|_| {
        BridgeError::invalid_config(format!("path contains a NUL byte: {}", path.display()))
    })
}

type Payload = TraceFn<NativeArray>;

/// Copy the arrays out of an engine vector, retaining each.
unsafe fn vector_to_vec(vector: *const sys::axr_vector) -> Vec<NativeArray> {
    let len = sys::axr_vector_len(vector);
    let mut out = Vec::with_capacity(len);
    for index in 0..len {
        let raw = sys::axr_array_retain(sys::axr_vector_get(vector, index));
        if let Some(array) = NativeArray::from_raw(raw) {
            out.push(array);
        }
    }
    out
}

/// Build an engine vector from host arrays; push retains each value.
unsafe fn vec_to_vector(values: &[NativeArray]) -> *mut sys::axr_vector {
    let vector = sys::axr_vector_new();
    for value in values {
        sys::axr_vector_push(vector, value.as_ptr());
    }
    vector
}

unsafe extern "C" fn trampoline(
    args: *const sys::axr_vector,
    payload: *mut c_void,
) -> *mut sys::axr_vector {
    let function = &*payload.cast::<Payload>();
    // Unwinding across the C boundary is undefined; a null result tells the
    // engine the host function failed.
    match catch_unwind(AssertUnwindSafe(|| {
        let inputs = vector_to_vec(args);
        let outputs = function(&inputs);
        vec_to_vector(&outputs)
    })) {
        Ok(vector) => vector,
        Err(_) => ptr::null_mut(),
    }
}

unsafe extern "C" fn drop_payload(payload: *mut c_void) {
    drop(Box::from_raw(payload.cast::<Payload>()));
}

/// The linked engine as a [`NativeRuntime`].
///
/// A zero-sized token: the engine itself is process-global state inside
/// `libarrayrt`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeEngine;

impl NativeEngine {
    /// Create a token for the linked engine.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl NativeRuntime for NativeEngine {
    type Array = NativeArray;
    type Vector = NativeVector;
    type Map = NativeMap;
    type Closure = NativeClosure;
    type Exporter = NativeExporter;
    type Function = NativeFunction;

    fn vector_new(&self) -> NativeVector {
        NativeVector {
            raw: unsafe { sys::axr_vector_new() },
        }
    }

    fn vector_push(&self, vector: &mut NativeVector, value: &NativeArray) {
        unsafe { sys::axr_vector_push(vector.raw, value.as_ptr()) };
    }

    fn vector_values(&self, vector: &NativeVector) -> Vec<NativeArray> {
        unsafe { vector_to_vec(vector.raw) }
    }

    fn vector_free(&self, vector: NativeVector) {
        unsafe { sys::axr_vector_free(vector.raw) };
    }

    fn map_new(&self) -> NativeMap {
        NativeMap {
            raw: unsafe { sys::axr_map_new() },
        }
    }

    fn map_insert(&self, map: &mut NativeMap, key: &str, value: &NativeArray) {
        let Ok(key) = CString::new(key) else {
            tracing::warn!(key = %key, "dropping keyword with interior NUL byte");
            return;
        };
        unsafe { sys::axr_map_insert(map.raw, key.as_ptr(), value.as_ptr()) };
    }

    fn map_free(&self, map: NativeMap) {
        unsafe { sys::axr_map_free(map.raw) };
    }

    fn closure_new(&self, function: TraceFn<NativeArray>) -> NativeClosure {
        let payload = Box::into_raw(Box::new(function)).cast::<c_void>();
        NativeClosure {
            raw: unsafe { sys::axr_closure_new(trampoline, payload, drop_payload) },
        }
    }

    fn closure_new_with_keywords(
        &self,
        keys: &[String],
        function: TraceFn<NativeArray>,
    ) -> NativeClosure {
        let keys: Vec<CString> = keys
            .iter()
            .filter_map(|key| match CString::new(key.as_str()) {
                Ok(key) => Some(key),
                Err(_) => {
                    tracing::warn!(key = %key, "dropping keyword name with interior NUL byte");
                    None
                }
            })
            .collect();
        let key_ptrs: Vec<*const c_char> = keys.iter().map(|key| key.as_ptr()).collect();

        let payload = Box::into_raw(Box::new(function)).cast::<c_void>();
        NativeClosure {
            raw: unsafe {
                sys::axr_closure_new_kwargs(
                    key_ptrs.as_ptr(),
                    key_ptrs.len(),
                    trampoline,
                    payload,
                    drop_payload,
                )
            },
        }
    }

    fn closure_free(&self, closure: NativeClosure) {
        unsafe { sys::axr_closure_free(closure.raw) };
    }

    fn export_function(
        &self,
        destination: &Path,
        closure: &NativeClosure,
        positional: &NativeVector,
        keywords: &NativeMap,
        shapeless: bool,
    ) -> Result<()> {
        let destination = path_to_cstring(destination)?;
        let status = unsafe {
            sys::axr_export_function(
                destination.as_ptr(),
                closure.raw,
                positional.raw,
                keywords.raw,
                shapeless,
            )
        };
        check_status(status)
    }

    fn exporter_new(
        &self,
        destination: &Path,
        closure: &NativeClosure,
        shapeless: bool,
    ) -> Result<NativeExporter> {
        let destination = path_to_cstring(destination)?;
        let raw = unsafe { sys::axr_exporter_new(destination.as_ptr(), closure.raw, shapeless) };
        if raw.is_null() {
            return Err(BridgeError::native(last_error()));
        }
        Ok(NativeExporter { raw })
    }

    fn exporter_apply(
        &self,
        exporter: &mut NativeExporter,
        positional: &NativeVector,
        keywords: &NativeMap,
    ) -> Result<()> {
        let status =
            unsafe { sys::axr_exporter_apply(exporter.raw, positional.raw, keywords.raw) };
        check_status(status)
    }

    fn exporter_free(&self, exporter: NativeExporter) {
        unsafe { sys::axr_exporter_free(exporter.raw) };
    }

    fn function_load(&self, source: &Path) -> Result<NativeFunction> {
        let source = path_to_cstring(source)?;
        let raw = unsafe { sys::axr_function_load(source.as_ptr()) };
        if raw.is_null() {
            return Err(BridgeError::native(last_error()));
        }
        Ok(NativeFunction { raw })
    }

    fn function_apply(
        &self,
        function: &NativeFunction,
        positional: &NativeVector,
        keywords: &NativeMap,
    ) -> Result<NativeVector> {
        let mut result: *mut sys::axr_vector = ptr::null_mut();
        let status = unsafe {
            sys::axr_function_apply(function.raw, positional.raw, keywords.raw, &mut result)
        };
        check_status(status)?;
        if result.is_null() {
            return Err(BridgeError::native("engine returned no result list"));
        }
        Ok(NativeVector { raw: result })
    }

    fn function_free(&self, function: NativeFunction) {
        unsafe { sys::axr_function_free(function.raw) };
    }
}
