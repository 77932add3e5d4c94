//! C ABI
//!
//! 每个句柄是一个堆上的 `Object`，持有对象的一份引用：
//! - 返回句柄的函数把这份引用交给调用方，调用方用 `orb_release` 归还
//! - 传入空指针得到中性结果（空句柄、0、false），不会崩溃
//! - 失败时记录日志并返回空句柄

use std::ffi::CStr;
use std::os::raw::c_char;

use crate::array::OrbArray;
use crate::error::Result;
use crate::map::OrbMap;
use crate::rc::{equals, hash_of, Object};
use crate::string::OrbString;
use crate::value::OrbInt;

/// 对象句柄
pub struct OrbHandle(Object);

fn into_handle(obj: Object) -> *mut OrbHandle {
    Box::into_raw(Box::new(OrbHandle(obj)))
}

fn handle_or_null(result: Result<Object>, what: &'static str) -> *mut OrbHandle {
    match result {
        Ok(obj) => into_handle(obj),
        Err(e) => {
            tracing::warn!(what, error = %e, "ffi call failed");
            std::ptr::null_mut()
        }
    }
}

/// # Safety
/// `handle` 必须为空或来自本模块且尚未释放
unsafe fn object<'a>(handle: *const OrbHandle) -> Option<&'a Object> {
    handle.as_ref().map(|h| &h.0)
}

// ============ 构造 ============

#[no_mangle]
pub extern "C" fn orb_int_new(value: i64) -> *mut OrbHandle {
    handle_or_null(OrbInt::object(value), "int")
}

/// 复制一份 UTF-8 文本；非法 UTF-8 返回空句柄
///
/// # Safety
/// `text` 必须为空或指向以 NUL 结尾的字符串
#[no_mangle]
pub unsafe extern "C" fn orb_string_new(text: *const c_char) -> *mut OrbHandle {
    if text.is_null() {
        return std::ptr::null_mut();
    }
    match CStr::from_ptr(text).to_str() {
        Ok(text) => handle_or_null(OrbString::object(text), "string"),
        Err(e) => {
            tracing::warn!(error = %e, "string is not valid UTF-8");
            std::ptr::null_mut()
        }
    }
}

#[no_mangle]
pub extern "C" fn orb_map_new() -> *mut OrbHandle {
    handle_or_null(OrbMap::create(Vec::new()).map(Into::into), "map")
}

#[no_mangle]
pub extern "C" fn orb_array_new() -> *mut OrbHandle {
    handle_or_null(OrbArray::create(Vec::new()).map(Into::into), "array")
}

// ============ 哈希表 ============

/// 查找；未命中或参数为空返回空句柄
///
/// # Safety
/// 句柄参数必须为空或来自本模块且尚未释放
#[no_mangle]
pub unsafe extern "C" fn orb_map_get(map: *const OrbHandle, key: *const OrbHandle) -> *mut OrbHandle {
    let (Some(map), Some(key)) = (object(map), object(key)) else {
        return std::ptr::null_mut();
    };
    map.downcast_ref::<OrbMap>()
        .and_then(|map| map.get(key))
        .map_or(std::ptr::null_mut(), into_handle)
}

/// 设置；`value` 为空时删除键
///
/// # Safety
/// 句柄参数必须为空或来自本模块且尚未释放
#[no_mangle]
pub unsafe extern "C" fn orb_map_set(
    map: *const OrbHandle,
    key: *const OrbHandle,
    value: *const OrbHandle,
) -> bool {
    let (Some(map), Some(key)) = (object(map), object(key)) else {
        return false;
    };
    let Some(map) = map.downcast_ref::<OrbMap>() else {
        return false;
    };
    match map.set(key, object(value)) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "orb_map_set failed");
            false
        }
    }
}

/// # Safety
/// 句柄参数必须为空或来自本模块且尚未释放
#[no_mangle]
pub unsafe extern "C" fn orb_map_len(map: *const OrbHandle) -> usize {
    object(map)
        .and_then(|map| map.downcast_ref::<OrbMap>())
        .map_or(0, OrbMap::len)
}

// ============ 数组 ============

/// # Safety
/// 句柄参数必须为空或来自本模块且尚未释放
#[no_mangle]
pub unsafe extern "C" fn orb_array_push(array: *const OrbHandle, obj: *const OrbHandle) -> bool {
    let (Some(array), Some(obj)) = (object(array), object(obj)) else {
        return false;
    };
    let Some(array) = array.downcast_ref::<OrbArray>() else {
        return false;
    };
    match array.push(obj) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "orb_array_push failed");
            false
        }
    }
}

/// # Safety
/// 句柄参数必须为空或来自本模块且尚未释放
#[no_mangle]
pub unsafe extern "C" fn orb_array_get(array: *const OrbHandle, index: usize) -> *mut OrbHandle {
    object(array)
        .and_then(|array| array.downcast_ref::<OrbArray>())
        .and_then(|array| array.get(index))
        .map_or(std::ptr::null_mut(), into_handle)
}

/// # Safety
/// 句柄参数必须为空或来自本模块且尚未释放
#[no_mangle]
pub unsafe extern "C" fn orb_array_len(array: *const OrbHandle) -> usize {
    object(array)
        .and_then(|array| array.downcast_ref::<OrbArray>())
        .map_or(0, OrbArray::len)
}

// ============ 通用 ============

/// 返回指向同一对象的新句柄
///
/// # Safety
/// 句柄参数必须为空或来自本模块且尚未释放
#[no_mangle]
pub unsafe extern "C" fn orb_retain(handle: *const OrbHandle) -> *mut OrbHandle {
    object(handle).map_or(std::ptr::null_mut(), |obj| into_handle(obj.retain()))
}

/// 归还句柄
///
/// # Safety
/// `handle` 必须为空或来自本模块且尚未释放；之后不得再使用
#[no_mangle]
pub unsafe extern "C" fn orb_release(handle: *mut OrbHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// # Safety
/// 句柄参数必须为空或来自本模块且尚未释放
#[no_mangle]
pub unsafe extern "C" fn orb_equal(a: *const OrbHandle, b: *const OrbHandle) -> bool {
    equals(object(a), object(b))
}

/// # Safety
/// 句柄参数必须为空或来自本模块且尚未释放
#[no_mangle]
pub unsafe extern "C" fn orb_hash(handle: *const OrbHandle) -> u32 {
    hash_of(object(handle))
}

/// # Safety
/// 句柄参数必须为空或来自本模块且尚未释放
#[no_mangle]
pub unsafe extern "C" fn orb_ref_count(handle: *const OrbHandle) -> u32 {
    object(handle).map_or(0, |obj| obj.ref_count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::ptr;

    #[test]
    fn test_map_through_handles() {
        unsafe {
            let map = orb_map_new();
            let text = CString::new("answer").unwrap();
            let key = orb_string_new(text.as_ptr());
            let value = orb_int_new(42);

            assert!(orb_map_set(map, key, value));
            assert_eq!(orb_map_len(map), 1);
            assert_eq!(orb_ref_count(value), 2);

            let found = orb_map_get(map, key);
            assert!(orb_equal(found, value));
            assert_eq!(orb_hash(found), 42);
            orb_release(found);

            assert!(orb_map_set(map, key, ptr::null()));
            assert_eq!(orb_map_len(map), 0);
            assert!(orb_map_get(map, key).is_null());

            orb_release(value);
            orb_release(key);
            orb_release(map);
        }
    }

    #[test]
    fn test_array_through_handles() {
        unsafe {
            let array = orb_array_new();
            let item = orb_int_new(7);
            assert!(orb_array_push(array, item));
            assert!(orb_array_push(array, item));
            assert_eq!(orb_array_len(array), 2);

            let got = orb_array_get(array, 1);
            assert!(orb_equal(got, item));
            assert!(orb_array_get(array, 2).is_null());

            // 类型不符时是中性结果
            assert!(!orb_array_push(item, array));
            assert_eq!(orb_map_len(array), 0);

            orb_release(got);
            orb_release(item);
            orb_release(array);
        }
    }

    #[test]
    fn test_null_inputs_are_neutral() {
        unsafe {
            assert!(orb_string_new(ptr::null()).is_null());
            assert!(orb_map_get(ptr::null(), ptr::null()).is_null());
            assert!(!orb_map_set(ptr::null(), ptr::null(), ptr::null()));
            assert_eq!(orb_map_len(ptr::null()), 0);
            assert_eq!(orb_array_len(ptr::null()), 0);
            assert!(orb_retain(ptr::null()).is_null());
            assert!(orb_equal(ptr::null(), ptr::null()));
            assert_eq!(orb_hash(ptr::null()), 0);
            assert_eq!(orb_ref_count(ptr::null()), 0);
            orb_release(ptr::null_mut());
        }
    }

    #[test]
    fn test_retain_release_handles() {
        unsafe {
            let a = orb_int_new(1);
            let b = orb_retain(a);
            assert_eq!(orb_ref_count(a), 2);
            assert!(orb_equal(a, b));
            orb_release(b);
            assert_eq!(orb_ref_count(a), 1);
            orb_release(a);
        }
    }
}
