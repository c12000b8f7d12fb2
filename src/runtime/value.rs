use std::cell::RefCell;
use std::rc::Rc;

use crate::lang::ValueKind;

/// Cursor over a snapshot of storage entries, handed out by `Storage.Find`.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageIter {
    pub entries: Vec<(Vec<u8>, Vec<u8>)>,
    /// None before the first `Next`.
    pub pos: Option<usize>,
}

impl StorageIter {
    pub fn new(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        Self { entries, pos: None }
    }

    pub fn advance(&mut self) -> bool {
        let next = self.pos.map(|p| p + 1).unwrap_or(0);
        self.pos = Some(next);
        next < self.entries.len()
    }

    pub fn current(&self) -> Option<&(Vec<u8>, Vec<u8>)> {
        self.pos.and_then(|p| self.entries.get(p))
    }
}

/// An item on the VM evaluation stack.
///
/// Arrays, structs and maps are shared references: copying the item copies
/// the handle, not the contents. The derived `PartialEq` compares contents
/// and is meant for tests; the `EQUAL` instruction uses [`StackItem::vm_equals`].
#[derive(Debug, Clone, PartialEq)]
pub enum StackItem {
    Null,
    Boolean(bool),
    Integer(i64),
    ByteString(Vec<u8>),
    Pointer(u32),
    Array(Rc<RefCell<Vec<StackItem>>>),
    Struct(Rc<RefCell<Vec<StackItem>>>),
    /// Insertion-ordered key/value pairs.
    Map(Rc<RefCell<Vec<(StackItem, StackItem)>>>),
    Interop(Rc<RefCell<StorageIter>>),
}

impl StackItem {
    pub fn array(items: Vec<StackItem>) -> Self {
        StackItem::Array(Rc::new(RefCell::new(items)))
    }

    pub fn structure(items: Vec<StackItem>) -> Self {
        StackItem::Struct(Rc::new(RefCell::new(items)))
    }

    pub fn map(entries: Vec<(StackItem, StackItem)>) -> Self {
        StackItem::Map(Rc::new(RefCell::new(entries)))
    }

    pub fn bytes(b: impl AsRef<[u8]>) -> Self {
        StackItem::ByteString(b.as_ref().to_vec())
    }

    /// `Struct[tag, payload]`
    pub fn wrap(kind: ValueKind, payload: StackItem) -> Self {
        StackItem::structure(vec![StackItem::Integer(kind.tag()), payload])
    }

    pub fn undefined() -> Self {
        Self::wrap(ValueKind::Undefined, StackItem::Null)
    }

    pub fn number(n: i64) -> Self {
        Self::wrap(ValueKind::Number, StackItem::Integer(n))
    }

    pub fn string(s: &str) -> Self {
        Self::wrap(ValueKind::String, StackItem::bytes(s))
    }

    pub fn boolean(b: bool) -> Self {
        Self::wrap(ValueKind::Boolean, StackItem::Boolean(b))
    }

    /// Tag and payload of a wrapped value.
    pub fn unwrap_value(&self) -> Option<(ValueKind, StackItem)> {
        match self {
            StackItem::Struct(fields) => {
                let fields = fields.borrow();
                match fields.as_slice() {
                    [StackItem::Integer(tag), payload] => {
                        ValueKind::from_tag(*tag).map(|kind| (kind, payload.clone()))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            StackItem::Null => "Null",
            StackItem::Boolean(_) => "Boolean",
            StackItem::Integer(_) => "Integer",
            StackItem::ByteString(_) => "ByteString",
            StackItem::Pointer(_) => "Pointer",
            StackItem::Array(_) => "Array",
            StackItem::Struct(_) => "Struct",
            StackItem::Map(_) => "Map",
            StackItem::Interop(_) => "InteropInterface",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StackItem::Null)
    }

    pub fn to_bool(&self) -> bool {
        match self {
            StackItem::Null => false,
            StackItem::Boolean(b) => *b,
            StackItem::Integer(n) => *n != 0,
            StackItem::ByteString(b) => b.iter().any(|x| *x != 0),
            _ => true,
        }
    }

    pub fn to_int(&self) -> Option<i64> {
        match self {
            StackItem::Integer(n) => Some(*n),
            StackItem::Boolean(b) => Some(*b as i64),
            StackItem::ByteString(b) if b.len() <= 8 => Some(int_from_le(b)),
            _ => None,
        }
    }

    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        match self {
            StackItem::ByteString(b) => Some(b.clone()),
            StackItem::Integer(n) => Some(int_to_le(*n)),
            StackItem::Boolean(b) => Some(vec![*b as u8]),
            _ => None,
        }
    }

    /// Equality as seen by the `EQUAL` instruction.
    pub fn vm_equals(&self, other: &StackItem) -> bool {
        match (self, other) {
            (StackItem::Null, StackItem::Null) => true,
            (StackItem::Boolean(a), StackItem::Boolean(b)) => a == b,
            (StackItem::Integer(a), StackItem::Integer(b)) => a == b,
            (StackItem::ByteString(a), StackItem::ByteString(b)) => a == b,
            (StackItem::Pointer(a), StackItem::Pointer(b)) => a == b,
            (StackItem::Struct(a), StackItem::Struct(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.vm_equals(y))
            }
            (StackItem::Array(a), StackItem::Array(b)) => Rc::ptr_eq(a, b),
            (StackItem::Map(a), StackItem::Map(b)) => Rc::ptr_eq(a, b),
            (StackItem::Interop(a), StackItem::Interop(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Map keys must be primitive.
    pub fn is_key(&self) -> bool {
        matches!(
            self,
            StackItem::Boolean(_) | StackItem::Integer(_) | StackItem::ByteString(_)
        )
    }
}

/// Minimal little-endian two's complement; zero is the empty string.
pub fn int_to_le(n: i64) -> Vec<u8> {
    if n == 0 {
        return Vec::new();
    }
    let mut bytes = n.to_le_bytes().to_vec();
    while bytes.len() > 1 {
        let last = bytes[bytes.len() - 1];
        let prev = bytes[bytes.len() - 2];
        let redundant = (last == 0x00 && prev & 0x80 == 0) || (last == 0xff && prev & 0x80 != 0);
        if !redundant {
            break;
        }
        bytes.pop();
    }
    bytes
}

pub fn int_from_le(bytes: &[u8]) -> i64 {
    if bytes.is_empty() {
        return 0;
    }
    let fill = if bytes[bytes.len() - 1] & 0x80 != 0 { 0xff } else { 0x00 };
    let mut buf = [fill; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    i64::from_le_bytes(buf)
}

impl std::fmt::Display for StackItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StackItem::Null => write!(f, "null"),
            StackItem::Boolean(b) => write!(f, "{}", b),
            StackItem::Integer(n) => write!(f, "{}", n),
            StackItem::ByteString(b) => match std::str::from_utf8(b) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => {
                    write!(f, "0x")?;
                    for byte in b {
                        write!(f, "{:02x}", byte)?;
                    }
                    Ok(())
                }
            },
            StackItem::Pointer(p) => write!(f, "&{:04}", p),
            StackItem::Array(items) | StackItem::Struct(items) => {
                let open = if matches!(self, StackItem::Struct(_)) { "(" } else { "[" };
                let close = if open == "(" { ")" } else { "]" };
                write!(f, "{}", open)?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "{}", close)
            }
            StackItem::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            StackItem::Interop(_) => write!(f, "<iterator>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_le_encoding() {
        assert_eq!(int_to_le(0), Vec::<u8>::new());
        assert_eq!(int_to_le(48), vec![48]);
        assert_eq!(int_to_le(128), vec![0x80, 0x00]);
        assert_eq!(int_to_le(-1), vec![0xff]);
        assert_eq!(int_from_le(&[0x80, 0x00]), 128);
        assert_eq!(int_from_le(&[0xff]), -1);
    }

    #[test]
    fn test_structs_compare_by_content() {
        let a = StackItem::number(3);
        let b = StackItem::number(3);
        assert!(a.vm_equals(&b));
        assert!(!StackItem::number(3).vm_equals(&StackItem::string("3")));
    }

    #[test]
    fn test_arrays_compare_by_reference() {
        let a = StackItem::array(vec![StackItem::Integer(1)]);
        let b = StackItem::array(vec![StackItem::Integer(1)]);
        assert!(!a.vm_equals(&b));
        assert!(a.vm_equals(&a.clone()));
    }

    #[test]
    fn test_unwrap_value() {
        let (kind, payload) = StackItem::string("hi").unwrap_value().unwrap();
        assert_eq!(kind, ValueKind::String);
        assert_eq!(payload, StackItem::bytes("hi"));
        assert_eq!(StackItem::Integer(1).unwrap_value(), None);
    }

    #[test]
    fn test_storage_iter_advances_once_per_entry() {
        let mut it = StorageIter::new(vec![(vec![1], vec![2])]);
        assert!(it.current().is_none());
        assert!(it.advance());
        assert_eq!(it.current(), Some(&(vec![1], vec![2])));
        assert!(!it.advance());
    }
}
