//! Structured storage.
//!
//! A handle is `w(Array[prefix, size, prefix_parts])`: the namespace prefix,
//! how many key parts are still missing, and the parts already fixed by
//! `at`. An entry lives at
//! `prefix ++ serialize(part_1) ++ .. ++ serialize(part_n)`, cut to the
//! configured maximum key length. Values are stored as serialized wrapped
//! values, so they come back with their tag.
//!
//! Namespaces: `[0x00] ++ name` for a plain property, `[0x01] ++ name ++
//! [0x00]` for a collection, `[0x02] ++ "deployed"` for the deploy flag.

use crate::bytecode::{JumpKind, Op, Syscall};
use crate::compile::ctx::{CResult, Ctx};
use crate::compile::helpers::Helper;
use crate::compile::helpers::control::arr_reduce;
use crate::compile::helpers::types::{push_undefined, unwrap, wrap};
use crate::lang::ValueKind;

pub const COMMON_PREFIX: u8 = 0x00;
pub const COLLECTION_PREFIX: u8 = 0x01;
pub const INTERNAL_PREFIX: u8 = 0x02;

/// Key of a plain storage property.
pub fn common_key(name: &str) -> Vec<u8> {
    let mut key = vec![COMMON_PREFIX];
    key.extend_from_slice(name.as_bytes());
    key
}

/// Prefix of a storage collection.
pub fn collection_prefix(name: &str) -> Vec<u8> {
    let mut key = vec![COLLECTION_PREFIX];
    key.extend_from_slice(name.as_bytes());
    key.push(0x00);
    key
}

/// Key of the flag `deploy` sets.
pub fn deployed_key() -> Vec<u8> {
    let mut key = vec![INTERNAL_PREFIX];
    key.extend_from_slice(b"deployed");
    key
}

fn syscall(ctx: &mut Ctx, call: Syscall) {
    ctx.em.emit(Op::Syscall(call));
}

/// ( -- w(handle) ) handle of a collection property
pub fn push_handle(ctx: &mut Ctx, kind: ValueKind, name: &str, key_parts: usize) {
    ctx.em.push_int(0);
    ctx.em.emit(Op::NewArray);
    ctx.em.push_int(key_parts as i64);
    ctx.em.push_bytes(&collection_prefix(name));
    ctx.em.pack(3);
    wrap(ctx, kind);
}

pub fn raw_parts(ctx: &mut Ctx, kind: ValueKind) -> CResult {
    unwrap(ctx);
    if kind == ValueKind::Array {
        // A tuple key contributes each element as one part.
        ctx.em.push_int(0);
        ctx.em.emit(Op::NewArray);
        arr_reduce(ctx, &mut |ctx| {
            ctx.em.emit(Op::Drop);
            unwrap(ctx);
            ctx.em.emit(Op::Over);
            ctx.em.emit(Op::Swap);
            ctx.em.emit(Op::Append);
            Ok(())
        })?;
    } else {
        ctx.em.pack(1);
    }
    Ok(())
}

/// ( key part i -- key' )
fn append_part(ctx: &mut Ctx) -> CResult {
    ctx.em.emit(Op::Drop);
    syscall(ctx, Syscall::Serialize);
    ctx.em.emit(Op::Cat);
    Ok(())
}

pub fn storage_key(ctx: &mut Ctx) -> CResult {
    // handle parts fixed prefix
    ctx.em.emit(Op::Over);
    ctx.em.push_int(0);
    ctx.em.emit(Op::PickItem);
    ctx.em.push_int(2);
    ctx.em.emit(Op::Pick);
    ctx.em.push_int(2);
    ctx.em.emit(Op::PickItem);
    ctx.em.emit(Op::Swap);
    arr_reduce(ctx, &mut append_part)?;
    arr_reduce(ctx, &mut append_part)?;
    ctx.em.emit(Op::Nip);
    ctx.em.push_int(ctx.config.max_storage_key_len as i64);
    ctx.em.emit(Op::Left);
    Ok(())
}

pub fn storage_get(ctx: &mut Ctx) -> CResult {
    let found = ctx.em.new_label();
    let end = ctx.em.new_label();
    syscall(ctx, Syscall::StorageGet);
    ctx.em.emit(Op::Dup);
    ctx.em.emit(Op::Size);
    ctx.em.jump(JumpKind::IfTrue, found);
    ctx.em.emit(Op::Drop);
    push_undefined(ctx);
    ctx.em.jump(JumpKind::Always, end);
    ctx.em.mark(found);
    syscall(ctx, Syscall::Deserialize);
    ctx.em.mark(end);
    Ok(())
}

pub fn storage_put(ctx: &mut Ctx) {
    syscall(ctx, Syscall::Serialize);
    syscall(ctx, Syscall::StoragePut);
}

/// ( handle -- key ) key of the handle itself, with no further parts
fn own_key(ctx: &mut Ctx) -> CResult {
    ctx.em.push_int(0);
    ctx.em.emit(Op::NewArray);
    ctx.helper(Helper::StorageKey)
}

pub fn array_storage_length(ctx: &mut Ctx) -> CResult {
    let zero = ctx.em.new_label();
    let end = ctx.em.new_label();
    own_key(ctx)?;
    syscall(ctx, Syscall::StorageGet);
    ctx.em.emit(Op::Dup);
    ctx.em.emit(Op::Size);
    ctx.em.jump(JumpKind::IfFalse, zero);
    syscall(ctx, Syscall::Deserialize);
    unwrap(ctx);
    ctx.em.jump(JumpKind::Always, end);
    ctx.em.mark(zero);
    ctx.em.emit(Op::Drop);
    ctx.em.push_int(0);
    ctx.em.mark(end);
    Ok(())
}

pub fn set_array_storage_length(ctx: &mut Ctx) -> CResult {
    wrap(ctx, ValueKind::Number);
    ctx.em.emit(Op::Swap);
    own_key(ctx)?;
    ctx.em.emit(Op::Swap);
    ctx.helper(Helper::StoragePut)
}

// =============================================================================
// Common properties
// =============================================================================

/// ( -- w )
pub fn load_common(ctx: &mut Ctx, name: &str) -> CResult {
    let mut key = common_key(name);
    key.truncate(ctx.config.max_storage_key_len);
    ctx.em.push_bytes(&key);
    ctx.helper(Helper::StorageGet)
}

/// ( w -- )
pub fn store_common(ctx: &mut Ctx, name: &str) -> CResult {
    let mut key = common_key(name);
    key.truncate(ctx.config.max_storage_key_len);
    ctx.em.push_bytes(&key);
    ctx.em.emit(Op::Swap);
    ctx.helper(Helper::StoragePut)
}

// =============================================================================
// MapStorage
// =============================================================================

/// ( w(handle) w(key) -- key )
fn entry_key(ctx: &mut Ctx, key_kind: ValueKind) -> CResult {
    ctx.em.emit(Op::Swap);
    unwrap(ctx);
    ctx.em.emit(Op::Swap);
    ctx.helpers(&[Helper::RawParts(key_kind), Helper::StorageKey])
}

/// ( w(handle) w(key) -- w ) undefined when absent
pub fn map_get(ctx: &mut Ctx, key_kind: ValueKind) -> CResult {
    entry_key(ctx, key_kind)?;
    ctx.helper(Helper::StorageGet)
}

/// ( w(handle) w(key) w -- w(handle) )
pub fn map_set(ctx: &mut Ctx, key_kind: ValueKind) -> CResult {
    ctx.em.emit(Op::Rot);
    ctx.em.emit(Op::Dup);
    unwrap(ctx);
    ctx.em.push_int(3);
    ctx.em.emit(Op::Roll);
    ctx.helpers(&[Helper::RawParts(key_kind), Helper::StorageKey])?;
    ctx.em.emit(Op::Rot);
    ctx.helper(Helper::StoragePut)
}

/// ( w(handle) w(key) -- w(boolean) )
pub fn map_has(ctx: &mut Ctx, key_kind: ValueKind) -> CResult {
    entry_key(ctx, key_kind)?;
    syscall(ctx, Syscall::StorageGet);
    ctx.em.emit(Op::Size);
    ctx.em.push_int(0);
    ctx.em.emit(Op::Gt);
    wrap(ctx, ValueKind::Boolean);
    Ok(())
}

/// ( w(handle) w(key) -- w(boolean) ) whether an entry was removed
pub fn map_delete(ctx: &mut Ctx, key_kind: ValueKind) -> CResult {
    entry_key(ctx, key_kind)?;
    ctx.em.emit(Op::Dup);
    syscall(ctx, Syscall::StorageGet);
    ctx.em.emit(Op::Size);
    ctx.em.push_int(0);
    ctx.em.emit(Op::Gt);
    ctx.em.emit(Op::Swap);
    syscall(ctx, Syscall::StorageDelete);
    wrap(ctx, ValueKind::Boolean);
    Ok(())
}

/// ( w(handle) w(part) -- w(handle) ) fix the next key part
pub fn map_at(ctx: &mut Ctx) {
    ctx.em.emit(Op::Swap);
    unwrap(ctx);
    // part handle
    ctx.em.emit(Op::Dup);
    ctx.em.push_int(2);
    ctx.em.emit(Op::PickItem);
    ctx.em.copy_array();
    ctx.em.emit(Op::Rot);
    unwrap(ctx);
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Swap);
    ctx.em.emit(Op::Append);
    // handle fixed' size-1
    ctx.em.emit(Op::Over);
    ctx.em.push_int(1);
    ctx.em.emit(Op::PickItem);
    ctx.em.emit(Op::Dec);
    ctx.em.emit(Op::Rot);
    ctx.em.push_int(0);
    ctx.em.emit(Op::PickItem);
    ctx.em.pack(3);
    wrap(ctx, ValueKind::MapStorage);
}

/// ( w(handle) w(fn) -- w(undefined) ) calls `fn(value, key)` in key order
pub fn map_for_each(ctx: &mut Ctx, key_kind: ValueKind) -> CResult {
    let top = ctx.em.new_label();
    let exit = ctx.em.new_label();

    ctx.helper(Helper::GetCallable)?;
    ctx.em.emit(Op::Swap);
    unwrap(ctx);
    own_key(ctx)?;
    // callable prefix_len iterator
    ctx.em.emit(Op::Dup);
    ctx.em.emit(Op::Size);
    ctx.em.emit(Op::Swap);
    syscall(ctx, Syscall::StorageFind);

    ctx.em.mark(top);
    ctx.em.emit(Op::Dup);
    syscall(ctx, Syscall::IteratorNext);
    ctx.em.jump(JumpKind::IfFalse, exit);
    ctx.em.emit(Op::Dup);
    syscall(ctx, Syscall::IteratorValue);
    syscall(ctx, Syscall::Deserialize);
    ctx.em.emit(Op::Over);
    syscall(ctx, Syscall::IteratorKey);
    // The key suffix past the prefix is the one serialized part.
    ctx.em.emit(Op::Dup);
    ctx.em.emit(Op::Size);
    ctx.em.push_int(4);
    ctx.em.emit(Op::Pick);
    ctx.em.emit(Op::Sub);
    ctx.em.emit(Op::Right);
    syscall(ctx, Syscall::Deserialize);
    wrap(ctx, key_kind);
    ctx.helper(Helper::PackArgs(2))?;
    push_undefined(ctx);
    ctx.em.push_int(4);
    ctx.em.emit(Op::Pick);
    ctx.helpers(&[Helper::Invoke, Helper::CheckThrow])?;
    ctx.em.emit(Op::Drop);
    ctx.em.jump(JumpKind::Always, top);

    ctx.em.mark(exit);
    ctx.em.emit_all(&[Op::Drop, Op::Drop, Op::Drop]);
    push_undefined(ctx);
    Ok(())
}

// =============================================================================
// ArrayStorage
// =============================================================================

/// ( w(handle) -- w(number) )
pub fn array_length(ctx: &mut Ctx) -> CResult {
    unwrap(ctx);
    ctx.helper(Helper::ArrayStorageLength)?;
    wrap(ctx, ValueKind::Number);
    Ok(())
}

/// ( handle i -- key )
fn element_key(ctx: &mut Ctx) -> CResult {
    ctx.em.pack(1);
    ctx.helper(Helper::StorageKey)
}

/// ( w(handle) w(index) -- w ) undefined past the end
pub fn array_get(ctx: &mut Ctx) -> CResult {
    ctx.em.emit(Op::Swap);
    unwrap(ctx);
    ctx.em.emit(Op::Swap);
    unwrap(ctx);
    element_key(ctx)?;
    ctx.helper(Helper::StorageGet)
}

/// ( w(handle) w(index) w -- ) grows the length to cover the index
pub fn array_set(ctx: &mut Ctx) -> CResult {
    let inside = ctx.em.new_label();
    ctx.em.emit(Op::Rot);
    unwrap(ctx);
    ctx.em.emit(Op::Rot);
    unwrap(ctx);
    // value handle i
    ctx.em.emit(Op::Over);
    ctx.helper(Helper::ArrayStorageLength)?;
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Gt);
    ctx.em.jump(JumpKind::IfTrue, inside);
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Inc);
    ctx.helper(Helper::SetArrayStorageLength)?;
    ctx.em.mark(inside);
    element_key(ctx)?;
    ctx.em.emit(Op::Swap);
    ctx.helper(Helper::StoragePut)
}

/// ( w(handle) w -- w(number) ) new length
pub fn array_push(ctx: &mut Ctx) -> CResult {
    ctx.em.emit(Op::Swap);
    unwrap(ctx);
    ctx.em.emit(Op::Dup);
    ctx.helper(Helper::ArrayStorageLength)?;
    // value handle n
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Over);
    element_key(ctx)?;
    ctx.em.push_int(3);
    ctx.em.emit(Op::Roll);
    ctx.helper(Helper::StoragePut)?;
    ctx.em.emit(Op::Inc);
    ctx.em.emit(Op::Tuck);
    ctx.helper(Helper::SetArrayStorageLength)?;
    wrap(ctx, ValueKind::Number);
    Ok(())
}

/// ( w(handle) -- w ) removes and returns the last element
pub fn array_pop(ctx: &mut Ctx) -> CResult {
    let empty = ctx.em.new_label();
    let end = ctx.em.new_label();
    unwrap(ctx);
    ctx.em.emit(Op::Dup);
    ctx.helper(Helper::ArrayStorageLength)?;
    ctx.em.emit(Op::Dup);
    ctx.em.jump(JumpKind::IfFalse, empty);
    ctx.em.emit(Op::Dec);
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Over);
    ctx.helper(Helper::SetArrayStorageLength)?;
    element_key(ctx)?;
    ctx.em.emit(Op::Dup);
    ctx.helper(Helper::StorageGet)?;
    ctx.em.emit(Op::Swap);
    syscall(ctx, Syscall::StorageDelete);
    ctx.em.jump(JumpKind::Always, end);
    ctx.em.mark(empty);
    ctx.em.emit_all(&[Op::Drop, Op::Drop]);
    push_undefined(ctx);
    ctx.em.mark(end);
    Ok(())
}

/// ( w(handle) w(fn) -- w(undefined) ) calls `fn(value, index)`
pub fn array_for_each(ctx: &mut Ctx) -> CResult {
    let top = ctx.em.new_label();
    let exit = ctx.em.new_label();

    ctx.helper(Helper::GetCallable)?;
    ctx.em.emit(Op::Swap);
    unwrap(ctx);
    ctx.em.emit(Op::Dup);
    ctx.helper(Helper::ArrayStorageLength)?;
    ctx.em.push_int(0);

    // callable handle n i
    ctx.em.mark(top);
    ctx.em.emit(Op::Dup);
    ctx.em.push_int(2);
    ctx.em.emit(Op::Pick);
    ctx.em.emit(Op::Lt);
    ctx.em.jump(JumpKind::IfFalse, exit);
    ctx.em.push_int(2);
    ctx.em.emit(Op::Pick);
    ctx.em.emit(Op::Over);
    element_key(ctx)?;
    ctx.helper(Helper::StorageGet)?;
    ctx.em.emit(Op::Over);
    wrap(ctx, ValueKind::Number);
    ctx.helper(Helper::PackArgs(2))?;
    push_undefined(ctx);
    ctx.em.push_int(5);
    ctx.em.emit(Op::Pick);
    ctx.helpers(&[Helper::Invoke, Helper::CheckThrow])?;
    ctx.em.emit(Op::Drop);
    ctx.em.emit(Op::Inc);
    ctx.em.jump(JumpKind::Always, top);

    ctx.em.mark(exit);
    ctx.em.emit_all(&[Op::Drop, Op::Drop, Op::Drop, Op::Drop]);
    push_undefined(ctx);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::helpers::tests::{run_with, run_with_host};
    use crate::runtime::{MemoryHost, StackItem};
    use crate::runtime::serialize::serialize;

    fn handle(parts: usize) -> StackItem {
        StackItem::wrap(
            ValueKind::MapStorage,
            StackItem::array(vec![
                StackItem::bytes(collection_prefix("m")),
                StackItem::Integer(parts as i64),
                StackItem::array(vec![]),
            ]),
        )
    }

    fn pair(a: i64, b: i64) -> StackItem {
        StackItem::wrap(
            ValueKind::Array,
            StackItem::array(vec![StackItem::number(a), StackItem::number(b)]),
        )
    }

    #[test]
    fn test_key_is_prefix_then_serialized_parts() {
        let out = run_with(vec![handle(2), pair(1, 2)], |ctx| {
            ctx.em.emit(Op::Swap);
            unwrap(ctx);
            ctx.em.emit(Op::Swap);
            ctx.helpers(&[Helper::RawParts(ValueKind::Array), Helper::StorageKey])
        })
        .unwrap();
        let mut expected = collection_prefix("m");
        expected.extend(serialize(&StackItem::Integer(1)).unwrap());
        expected.extend(serialize(&StackItem::Integer(2)).unwrap());
        assert_eq!(out, vec![StackItem::ByteString(expected)]);
    }

    #[test]
    fn test_same_parts_give_same_key() {
        let key_of = |a, b| {
            run_with(vec![handle(2), pair(a, b)], |ctx| {
                ctx.em.emit(Op::Swap);
                unwrap(ctx);
                ctx.em.emit(Op::Swap);
                ctx.helpers(&[Helper::RawParts(ValueKind::Array), Helper::StorageKey])
            })
            .unwrap()
        };
        assert_eq!(key_of(1, 2), key_of(1, 2));
        assert_ne!(key_of(1, 2), key_of(1, 3));
        assert_ne!(key_of(1, 2), key_of(2, 1));
    }

    #[test]
    fn test_put_then_get_under_tuple_key() {
        let (out, host) = run_with_host(
            MemoryHost::new(),
            vec![handle(2), pair(1, 2), StackItem::string("v")],
            |ctx| {
                map_set(ctx, ValueKind::Array)?;
                ctx.em.emit(Op::Drop);
                Ok(())
            },
        )
        .unwrap();
        assert!(out.is_empty());
        assert_eq!(host.storage.len(), 1);

        let (out, _) = run_with_host(host, vec![handle(2), pair(1, 2), handle(2), pair(1, 3)], |ctx| {
            map_get(ctx, ValueKind::Array)?;
            ctx.em.emit(Op::Rot);
            ctx.em.emit(Op::Rot);
            map_get(ctx, ValueKind::Array)
        })
        .unwrap();
        assert_eq!(out, vec![StackItem::undefined(), StackItem::string("v")]);
    }

    #[test]
    fn test_at_fixes_leading_parts() {
        let (_, host) = run_with_host(
            MemoryHost::new(),
            vec![handle(2), pair(4, 5), StackItem::number(9)],
            |ctx| {
                map_set(ctx, ValueKind::Array)?;
                ctx.em.emit(Op::Drop);
                Ok(())
            },
        )
        .unwrap();
        let (out, host) = run_with_host(
            host,
            vec![handle(2), StackItem::number(4), StackItem::number(5)],
            |ctx| {
                ctx.em.emit(Op::Rot);
                ctx.em.emit(Op::Rot);
                map_at(ctx);
                ctx.em.emit(Op::Swap);
                ctx.em.emit(Op::Over);
                ctx.em.emit(Op::Swap);
                map_has(ctx, ValueKind::Number)?;
                ctx.em.emit(Op::Swap);
                ctx.em.push_int(5);
                wrap(ctx, ValueKind::Number);
                map_delete(ctx, ValueKind::Number)
            },
        )
        .unwrap();
        assert_eq!(out, vec![StackItem::boolean(true), StackItem::boolean(true)]);
        assert!(host.storage.is_empty());
    }

    #[test]
    fn test_key_is_truncated_to_limit() {
        let long = "n".repeat(100);
        let out = run_with(vec![], |ctx| {
            ctx.em.push_int(0);
            ctx.em.emit(Op::NewArray);
            ctx.em.push_int(1);
            ctx.em.push_bytes(&collection_prefix(&long));
            ctx.em.pack(3);
            ctx.em.push_int(7);
            ctx.em.pack(1);
            ctx.helper(Helper::StorageKey)
        })
        .unwrap();
        match &out[0] {
            StackItem::ByteString(key) => assert_eq!(key.len(), 64),
            other => panic!("expected bytes, got {:?}", other),
        }
    }

    #[test]
    fn test_array_storage_push_pop_length() {
        let arr = StackItem::wrap(
            ValueKind::ArrayStorage,
            StackItem::array(vec![
                StackItem::bytes(collection_prefix("a")),
                StackItem::Integer(0),
                StackItem::array(vec![]),
            ]),
        );
        let (out, _) = run_with_host(MemoryHost::new(), vec![arr], |ctx| {
            for n in [10, 20] {
                ctx.em.emit(Op::Dup);
                ctx.em.push_int(n);
                wrap(ctx, ValueKind::Number);
                array_push(ctx)?;
                ctx.em.emit(Op::Drop);
            }
            ctx.em.emit(Op::Dup);
            array_pop(ctx)?;
            ctx.em.emit(Op::Swap);
            array_length(ctx)
        })
        .unwrap();
        assert_eq!(out, vec![StackItem::number(20), StackItem::number(1)]);
    }
}
