use serde::{Deserialize, Serialize};

use crate::runtime::runtime_error::RuntimeError;
use crate::runtime::value::StackItem;

/// Persisted form of a stack item, as written by `Runtime.Serialize`.
///
/// The variant order fixes the encoding of everything already in storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoredItem {
    Null,
    Boolean(bool),
    Integer(i64),
    Bytes(Vec<u8>),
    Array(Vec<StoredItem>),
    Struct(Vec<StoredItem>),
    Map(Vec<(StoredItem, StoredItem)>),
}

/// Nesting limit; cyclic structures hit it instead of overflowing.
const MAX_DEPTH: usize = 64;

impl StoredItem {
    pub fn from_stack(item: &StackItem) -> Result<StoredItem, RuntimeError> {
        Self::from_stack_at(item, 0)
    }

    fn from_stack_at(item: &StackItem, depth: usize) -> Result<StoredItem, RuntimeError> {
        if depth > MAX_DEPTH {
            return Err(RuntimeError::new("cannot serialize: item nested too deeply"));
        }
        let list = |items: &Vec<StackItem>| -> Result<Vec<StoredItem>, RuntimeError> {
            items
                .iter()
                .map(|i| Self::from_stack_at(i, depth + 1))
                .collect()
        };
        Ok(match item {
            StackItem::Null => StoredItem::Null,
            StackItem::Boolean(b) => StoredItem::Boolean(*b),
            StackItem::Integer(n) => StoredItem::Integer(*n),
            StackItem::ByteString(b) => StoredItem::Bytes(b.clone()),
            StackItem::Array(items) => StoredItem::Array(list(&items.borrow())?),
            StackItem::Struct(items) => StoredItem::Struct(list(&items.borrow())?),
            StackItem::Map(entries) => StoredItem::Map(
                entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| {
                        Ok((
                            Self::from_stack_at(k, depth + 1)?,
                            Self::from_stack_at(v, depth + 1)?,
                        ))
                    })
                    .collect::<Result<_, RuntimeError>>()?,
            ),
            other => {
                return Err(RuntimeError::new(&format!(
                    "cannot serialize {}",
                    other.type_name()
                )));
            }
        })
    }

    pub fn into_stack(self) -> StackItem {
        match self {
            StoredItem::Null => StackItem::Null,
            StoredItem::Boolean(b) => StackItem::Boolean(b),
            StoredItem::Integer(n) => StackItem::Integer(n),
            StoredItem::Bytes(b) => StackItem::ByteString(b),
            StoredItem::Array(items) => {
                StackItem::array(items.into_iter().map(StoredItem::into_stack).collect())
            }
            StoredItem::Struct(items) => {
                StackItem::structure(items.into_iter().map(StoredItem::into_stack).collect())
            }
            StoredItem::Map(entries) => StackItem::map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into_stack(), v.into_stack()))
                    .collect(),
            ),
        }
    }
}

pub fn serialize(item: &StackItem) -> Result<Vec<u8>, RuntimeError> {
    let stored = StoredItem::from_stack(item)?;
    postcard::to_allocvec(&stored)
        .map_err(|e| RuntimeError::new(&format!("cannot serialize: {}", e)))
}

pub fn deserialize(bytes: &[u8]) -> Result<StackItem, RuntimeError> {
    let stored: StoredItem = postcard::from_bytes(bytes)
        .map_err(|e| RuntimeError::new(&format!("cannot deserialize: {}", e)))?;
    Ok(stored.into_stack())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_encoding_is_stable() {
        assert_eq!(serialize(&StackItem::Integer(1)).unwrap(), vec![2, 2]);
        assert_eq!(serialize(&StackItem::Integer(-1)).unwrap(), vec![2, 1]);
    }

    #[test]
    fn test_array_encoding_is_stable() {
        let item = StackItem::array(vec![StackItem::Integer(1), StackItem::Integer(2)]);
        assert_eq!(serialize(&item).unwrap(), vec![4, 2, 2, 2, 2, 4]);
    }

    #[test]
    fn test_wrapped_string_survives_storage() {
        let item = StackItem::string("abc");
        let back = deserialize(&serialize(&item).unwrap()).unwrap();
        assert!(item.vm_equals(&back));
    }

    #[test]
    fn test_pointer_is_not_serializable() {
        let err = serialize(&StackItem::Pointer(3)).unwrap_err();
        assert!(err.message.contains("Pointer"));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let outer = StackItem::array(vec![]);
        if let StackItem::Array(items) = &outer {
            items.borrow_mut().push(outer.clone());
        }
        assert!(serialize(&outer).is_err());
        // break the cycle so the test doesn't leak
        if let StackItem::Array(items) = &outer {
            items.borrow_mut().clear();
        }
    }
}
