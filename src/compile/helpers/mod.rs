//! # Helpers
//!
//! Reusable emission procedures with a fixed stack contract. Each variant of
//! [`Helper`] documents its effect as `( before -- after )`; the table in
//! [`Helper::contract`] is what [`Ctx::helper`] checks the emitted code
//! against, so every branch a helper takes must end in the same shape.
//!
//! Procedures that are parameterized by emission callbacks (conditionals,
//! loops over arrays, type dispatch) live in [`control`] as plain functions
//! taking `&mut dyn FnMut(&mut Ctx) -> CResult`.

pub mod array;
pub mod bind;
pub mod buffer;
pub mod call;
pub mod control;
pub mod iterator;
pub mod map;
pub mod object;
pub mod storage;
pub mod types;

use tracing::trace;

use crate::bytecode::{CompileError, Op};
use crate::compile::ctx::{CResult, Ctx, SharedBody};
use crate::compile::options::EmitOptions;
use crate::lang::ValueKind;

#[derive(Debug, Clone, PartialEq)]
pub enum Helper {
    // Values and types
    /// ( -- w(undefined) )
    PushUndefined,
    /// ( -- w(null) )
    PushNullValue,
    /// ( raw -- w )
    Wrap(ValueKind),
    /// ( w -- raw )
    Unwrap,
    /// ( w -- tag )
    TypeTag,
    /// ( w -- bool ) static when the kind is known
    ToBoolean(Option<ValueKind>),
    /// ( n -- bytes ) decimal digits
    NumberToString,
    /// ( w -- bytes )
    ToRawString(Option<ValueKind>),
    /// ( w -- w(string) )
    TypeOf,

    // Objects
    /// ( -- w(object) )
    NewObject,
    /// ( proto -- w(object) )
    NewObjectWithProto,
    /// ( map value -- map ) `map[key] = value`
    MapSetKeep(String),
    /// ( receiver key -- w ) own property, then the prototype chain
    FindObjectProperty,
    /// ( receiver key value -- )
    SetObjectProperty,
    /// ( w(key) w(object) -- w(boolean) )
    HasOwnProperty,
    /// ( w(object) w(class) -- w(boolean) )
    InstanceOf,
    /// ( callable -- w(function) )
    FunctionObject,

    // Calls and errors
    /// ( w(function) -- callable )
    GetCallable,
    /// ( args this callable -- kind value )
    Invoke,
    /// ( kind value -- value ) rethrows a throw completion
    CheckThrow,
    /// ( args -- args w )
    ArgOrUndefined(usize),
    /// ( xn-1 .. x0 -- array ) evaluation order becomes index order
    PackArgs(usize),
    /// ( w(message) -- w(error) )
    NewError,
    /// ( -- ) throws; nothing after it is reachable
    ThrowTypeError(String),

    // Arrays and storage
    /// ( w(array) w(index) -- w )
    ArrayGet,
    /// ( w(array) w(index) w -- )
    ArraySet,
    /// ( w(buffer) w(start) w(end) -- w(buffer) )
    BufferSlice,
    /// ( w(key) -- parts ) raw key components
    RawParts(ValueKind),
    /// ( handle parts -- key )
    StorageKey,
    /// ( key -- w ) undefined when absent
    StorageGet,
    /// ( key w -- )
    StoragePut,
    /// ( handle -- n )
    ArrayStorageLength,
    /// ( handle n -- )
    SetArrayStorageLength,

    // Iterators
    /// ( items -- w(iterator) )
    NewIterator,
    /// ( w(iterator) -- w(result) )
    IteratorNext,

    // Context
    /// ( -- w )
    PushThis,
    /// ( -- global )
    PushGlobal,
    /// ( -- )
    FramePush(usize),
    /// ( -- )
    FramePop,
}

impl Helper {
    /// (inputs, outputs)
    pub fn contract(&self) -> (i32, i32) {
        use Helper::*;
        match self {
            PushUndefined | PushNullValue | NewObject | PushThis | PushGlobal => (0, 1),
            Wrap(_) | Unwrap | TypeTag | ToBoolean(_) | NumberToString | ToRawString(_) => (1, 1),
            TypeOf | NewObjectWithProto | FunctionObject | GetCallable | NewError => (1, 1),
            MapSetKeep(_) | FindObjectProperty | HasOwnProperty | InstanceOf => (2, 1),
            SetObjectProperty => (3, 0),
            Invoke => (3, 2),
            CheckThrow => (2, 1),
            ArgOrUndefined(_) => (1, 2),
            PackArgs(n) => (*n as i32, 1),
            ThrowTypeError(_) => (0, 0),
            ArrayGet => (2, 1),
            ArraySet => (3, 0),
            BufferSlice => (3, 1),
            RawParts(_) | StorageGet | ArrayStorageLength => (1, 1),
            StorageKey => (2, 1),
            StoragePut | SetArrayStorageLength => (2, 0),
            NewIterator | IteratorNext => (1, 1),
            FramePush(_) | FramePop => (0, 0),
        }
    }

    fn emit(&self, ctx: &mut Ctx) -> CResult {
        use Helper::*;
        match self {
            PushUndefined => types::push_undefined(ctx),
            PushNullValue => types::push_null_value(ctx),
            Wrap(kind) => types::wrap(ctx, *kind),
            Unwrap => types::unwrap(ctx),
            TypeTag => types::type_tag(ctx),
            ToBoolean(kind) => types::to_boolean(ctx, *kind)?,
            NumberToString => types::number_to_string(ctx),
            ToRawString(kind) => types::to_raw_string(ctx, *kind)?,
            TypeOf => types::type_of(ctx),

            NewObject => object::new_object(ctx),
            NewObjectWithProto => object::new_object_with_proto(ctx),
            MapSetKeep(key) => object::map_set_keep(ctx, key),
            FindObjectProperty => object::find_object_property(ctx)?,
            SetObjectProperty => object::set_object_property(ctx)?,
            HasOwnProperty => object::has_own_property(ctx),
            InstanceOf => object::instance_of(ctx)?,
            FunctionObject => object::function_object(ctx),

            GetCallable => call::get_callable(ctx)?,
            Invoke => call::invoke(ctx),
            CheckThrow => call::check_throw(ctx),
            ArgOrUndefined(i) => call::arg_or_undefined(ctx, *i)?,
            PackArgs(n) => call::pack_args(ctx, *n),
            NewError => call::new_error(ctx),
            ThrowTypeError(message) => call::throw_type_error(ctx, message)?,

            ArrayGet => array::array_get(ctx)?,
            ArraySet => array::array_set(ctx),
            BufferSlice => buffer::slice(ctx)?,
            RawParts(kind) => storage::raw_parts(ctx, *kind)?,
            StorageKey => storage::storage_key(ctx)?,
            StorageGet => storage::storage_get(ctx)?,
            StoragePut => storage::storage_put(ctx),
            ArrayStorageLength => storage::array_storage_length(ctx)?,
            SetArrayStorageLength => storage::set_array_storage_length(ctx)?,

            NewIterator => iterator::new_iterator(ctx),
            IteratorNext => iterator::iterator_next(ctx)?,

            PushThis => {
                ctx.em.emit(Op::DupFromAlt);
                ctx.em.push_int(1);
                ctx.em.emit(Op::PickItem);
            }
            PushGlobal => {
                ctx.em.emit(Op::DupFromAlt);
                ctx.em.push_int(2);
                ctx.em.emit(Op::PickItem);
            }
            FramePush(slots) => crate::compile::scope::frame_push(ctx, *slots),
            FramePop => crate::compile::scope::frame_pop(ctx),
        }
        Ok(())
    }
}

impl Ctx<'_> {
    /// Emit `helper` leaving its result on the stack.
    pub fn helper(&mut self, helper: Helper) -> CResult {
        self.helper_with(helper, EmitOptions::VALUE)
    }

    /// Emit `helper` and verify that it kept its stack contract. With
    /// `push_value` unset the outputs are dropped again.
    pub fn helper_with(&mut self, helper: Helper, opts: EmitOptions) -> CResult {
        let (ins, outs) = helper.contract();
        let before = self.em.depth();
        trace!(?helper, depth = ?before, "helper");
        helper.emit(self)?;
        if let (Some(before), Some(after)) = (before, self.em.depth()) {
            if after != before - ins + outs {
                return Err(CompileError::stack_mismatch(
                    format!("helper {:?}", helper),
                    before - ins + outs,
                    after,
                ));
            }
        }
        if !opts.push_value && self.em.depth().is_some() {
            for _ in 0..outs {
                self.em.emit(Op::Drop);
            }
        }
        Ok(())
    }

    /// Emit the shared bodies requested so far. Each one is entered by a
    /// call, so this belongs after the last reachable instruction.
    pub fn emit_shared_bodies(&mut self) {
        loop {
            let pending = self.take_shared();
            if pending.is_empty() {
                break;
            }
            for (body, label) in pending {
                self.em.mark(label);
                match body {
                    SharedBody::IteratorNext => iterator::emit_next_body(self),
                }
            }
        }
    }

    /// Emit a sequence of helpers, each leaving its value.
    pub fn helpers(&mut self, helpers: &[Helper]) -> CResult {
        for helper in helpers {
            self.helper(helper.clone())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
