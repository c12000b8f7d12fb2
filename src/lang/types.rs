use serde::{Deserialize, Serialize};

// =============================================================================
// VALUE KINDS - the runtime representations a value can have
// =============================================================================

/// Runtime representation of a value.
///
/// Every value the compiled program handles is a `Struct[tag, payload]` whose
/// tag is one of these discriminants. The numbering is part of the persisted
/// storage layout and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueKind {
    Undefined = 0,
    Null = 1,
    Boolean = 2,
    Number = 3,
    String = 4,
    Symbol = 5,
    Array = 6,
    Object = 7,
    Map = 8,
    IterableIterator = 9,
    IteratorResult = 10,
    Error = 11,
    Buffer = 12,
    MapStorage = 13,
    ArrayStorage = 14,
    Transaction = 15,
    Block = 16,
    Account = 17,
}

impl ValueKind {
    pub const ALL: [ValueKind; 18] = [
        ValueKind::Undefined,
        ValueKind::Null,
        ValueKind::Boolean,
        ValueKind::Number,
        ValueKind::String,
        ValueKind::Symbol,
        ValueKind::Array,
        ValueKind::Object,
        ValueKind::Map,
        ValueKind::IterableIterator,
        ValueKind::IteratorResult,
        ValueKind::Error,
        ValueKind::Buffer,
        ValueKind::MapStorage,
        ValueKind::ArrayStorage,
        ValueKind::Transaction,
        ValueKind::Block,
        ValueKind::Account,
    ];

    pub fn tag(self) -> i64 {
        self as u8 as i64
    }

    pub fn from_tag(tag: i64) -> Option<ValueKind> {
        ValueKind::ALL.iter().copied().find(|k| k.tag() == tag)
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Undefined => "undefined",
            ValueKind::Null => "null",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Symbol => "symbol",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
            ValueKind::Map => "map",
            ValueKind::IterableIterator => "iterable iterator",
            ValueKind::IteratorResult => "iterator result",
            ValueKind::Error => "error",
            ValueKind::Buffer => "buffer",
            ValueKind::MapStorage => "map storage",
            ValueKind::ArrayStorage => "array storage",
            ValueKind::Transaction => "transaction",
            ValueKind::Block => "block",
            ValueKind::Account => "account",
        }
    }

    /// Kinds whose payload is a single VM primitive (no compound item).
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            ValueKind::Undefined
                | ValueKind::Null
                | ValueKind::Boolean
                | ValueKind::Number
                | ValueKind::String
                | ValueKind::Symbol
                | ValueKind::Buffer
        )
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// TYPES - static types supplied by the frontend
// =============================================================================

/// A resolved static type, as produced by the frontend's type checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Symbol,
    Buffer,
    Array(Box<Type>),
    Tuple(Vec<Type>),
    /// A plain object or class instance.
    Object,
    /// A callable value and its return type.
    Function(Box<Type>),
    /// The constructor value of a class.
    Class(String),
    /// `this` inside a smart contract class.
    SmartContract(String),
    /// Another deployed contract, reached through `SmartContract.for<T>(hash)`.
    Contract(Box<ContractInterface>),
    Map(Box<Type>, Box<Type>),
    IterableIterator(Box<Type>),
    IteratorResult(Box<Type>),
    Error,
    MapStorage(Box<Type>, Box<Type>),
    ArrayStorage(Box<Type>),
    Transaction,
    Block,
    Account,
    /// The `Blockchain` namespace global.
    Blockchain,
    Void,
    Union(Vec<Type>),
    Unknown,
}

/// The public surface of a contract as the caller declares it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractInterface {
    pub name: String,
    pub methods: Vec<MethodSignature>,
    /// Readable properties, fetched through the getter case of the same name.
    pub properties: Vec<(String, Type)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSignature {
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Type,
}

impl ContractInterface {
    pub fn method(&self, name: &str) -> Option<&MethodSignature> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn property(&self, name: &str) -> Option<&Type> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ty)| ty)
    }
}

/// A type that does not resolve to exactly one runtime representation.
#[derive(Debug, Clone, PartialEq)]
pub struct AmbiguousKind {
    pub ty: Type,
    pub kinds: Vec<ValueKind>,
}

impl std::fmt::Display for AmbiguousKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.kinds.is_empty() {
            return write!(f, "type '{}' has no known runtime representation", self.ty);
        }
        let names: Vec<&str> = self.kinds.iter().map(|k| k.name()).collect();
        write!(
            f,
            "type '{}' may be any of [{}] at runtime",
            self.ty,
            names.join(", ")
        )
    }
}

impl std::error::Error for AmbiguousKind {}

impl Type {
    /// Classify the type as exactly one runtime representation.
    ///
    /// Unions whose members share one representation collapse to it; any
    /// other union is ambiguous.
    pub fn single_kind(&self) -> Result<ValueKind, AmbiguousKind> {
        match self {
            Type::Union(members) => {
                let mut kinds: Vec<ValueKind> = Vec::new();
                for member in members {
                    let kind = member.single_kind()?;
                    if !kinds.contains(&kind) {
                        kinds.push(kind);
                    }
                }
                match kinds.as_slice() {
                    [kind] => Ok(*kind),
                    _ => Err(AmbiguousKind {
                        ty: self.clone(),
                        kinds,
                    }),
                }
            }
            Type::Unknown | Type::Blockchain => Err(AmbiguousKind {
                ty: self.clone(),
                kinds: Vec::new(),
            }),
            other => Ok(other.kind_of_single()),
        }
    }

    fn kind_of_single(&self) -> ValueKind {
        match self {
            Type::Undefined | Type::Void => ValueKind::Undefined,
            Type::Null => ValueKind::Null,
            Type::Boolean => ValueKind::Boolean,
            Type::Number => ValueKind::Number,
            Type::String => ValueKind::String,
            Type::Symbol => ValueKind::Symbol,
            // A contract handle is its script hash.
            Type::Buffer | Type::Contract(_) => ValueKind::Buffer,
            Type::Array(_) | Type::Tuple(_) => ValueKind::Array,
            Type::Object | Type::Function(_) | Type::Class(_) | Type::SmartContract(_) => {
                ValueKind::Object
            }
            Type::Map(_, _) => ValueKind::Map,
            Type::IterableIterator(_) => ValueKind::IterableIterator,
            Type::IteratorResult(_) => ValueKind::IteratorResult,
            Type::Error => ValueKind::Error,
            Type::MapStorage(_, _) => ValueKind::MapStorage,
            Type::ArrayStorage(_) => ValueKind::ArrayStorage,
            Type::Transaction => ValueKind::Transaction,
            Type::Block => ValueKind::Block,
            Type::Account => ValueKind::Account,
            // Handled by single_kind before reaching here.
            Type::Union(_) | Type::Unknown | Type::Blockchain => ValueKind::Undefined,
        }
    }

    /// True when the type resolves to `kind` and nothing else.
    pub fn is_kind(&self, kind: ValueKind) -> bool {
        self.single_kind().map(|k| k == kind).unwrap_or(false)
    }

    /// True when any member of the type could be `kind` at runtime.
    pub fn may_be(&self, kind: ValueKind) -> bool {
        match self {
            Type::Union(members) => members.iter().any(|m| m.may_be(kind)),
            Type::Unknown => true,
            other => other.is_kind(kind),
        }
    }

    /// Element type of arrays, storage arrays and iterators.
    pub fn element(&self) -> Type {
        match self {
            Type::Array(inner)
            | Type::ArrayStorage(inner)
            | Type::IterableIterator(inner)
            | Type::IteratorResult(inner) => (**inner).clone(),
            _ => Type::Unknown,
        }
    }

    /// Return type when the value is called.
    pub fn return_type(&self) -> Type {
        match self {
            Type::Function(ret) => (**ret).clone(),
            _ => Type::Unknown,
        }
    }

    pub fn array(inner: Type) -> Type {
        Type::Array(Box::new(inner))
    }

    pub fn function(ret: Type) -> Type {
        Type::Function(Box::new(ret))
    }

    pub fn map_storage(key: Type, value: Type) -> Type {
        Type::MapStorage(Box::new(key), Box::new(value))
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Undefined => write!(f, "undefined"),
            Type::Null => write!(f, "null"),
            Type::Boolean => write!(f, "boolean"),
            Type::Number => write!(f, "number"),
            Type::String => write!(f, "string"),
            Type::Symbol => write!(f, "symbol"),
            Type::Buffer => write!(f, "Buffer"),
            Type::Array(inner) => write!(f, "Array<{}>", inner),
            Type::Tuple(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Type::Object => write!(f, "object"),
            Type::Function(ret) => write!(f, "(...) => {}", ret),
            Type::Class(name) => write!(f, "typeof {}", name),
            Type::SmartContract(name) => write!(f, "{}", name),
            Type::Contract(iface) => write!(f, "{}", iface.name),
            Type::Map(k, v) => write!(f, "Map<{}, {}>", k, v),
            Type::IterableIterator(inner) => write!(f, "IterableIterator<{}>", inner),
            Type::IteratorResult(inner) => write!(f, "IteratorResult<{}>", inner),
            Type::Error => write!(f, "Error"),
            Type::MapStorage(k, v) => write!(f, "MapStorage<{}, {}>", k, v),
            Type::ArrayStorage(inner) => write!(f, "ArrayStorage<{}>", inner),
            Type::Transaction => write!(f, "Transaction"),
            Type::Block => write!(f, "Block"),
            Type::Account => write!(f, "Account"),
            Type::Blockchain => write!(f, "Blockchain"),
            Type::Void => write!(f, "void"),
            Type::Union(members) => {
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}", m)?;
                }
                Ok(())
            }
            Type::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_stable() {
        assert_eq!(ValueKind::Undefined.tag(), 0);
        assert_eq!(ValueKind::Number.tag(), 3);
        assert_eq!(ValueKind::Object.tag(), 7);
        assert_eq!(ValueKind::Account.tag(), 17);
        for kind in ValueKind::ALL {
            assert_eq!(ValueKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(ValueKind::from_tag(99), None);
    }

    #[test]
    fn test_tuple_shares_array_representation() {
        let tuple = Type::Tuple(vec![Type::Number, Type::String]);
        assert_eq!(tuple.single_kind(), Ok(ValueKind::Array));
    }

    #[test]
    fn test_union_of_same_kind_collapses() {
        let ty = Type::Union(vec![Type::array(Type::Number), Type::array(Type::String)]);
        assert_eq!(ty.single_kind(), Ok(ValueKind::Array));
    }

    #[test]
    fn test_mixed_union_is_ambiguous() {
        let ty = Type::Union(vec![Type::Number, Type::String]);
        let err = ty.single_kind().unwrap_err();
        assert_eq!(err.kinds, vec![ValueKind::Number, ValueKind::String]);
        assert!(err.to_string().contains("number, string"));
        assert!(ty.may_be(ValueKind::String));
        assert!(!ty.may_be(ValueKind::Array));
    }

    #[test]
    fn test_unknown_is_ambiguous() {
        assert!(Type::Unknown.single_kind().is_err());
    }

    #[test]
    fn test_contract_handle_is_a_buffer() {
        let iface = ContractInterface {
            name: "Token".to_string(),
            methods: vec![MethodSignature {
                name: "balanceOf".to_string(),
                params: vec![Type::Buffer],
                ret: Type::Number,
            }],
            properties: vec![("symbol".to_string(), Type::String)],
        };
        let ty = Type::Contract(Box::new(iface));
        assert_eq!(ty.single_kind(), Ok(ValueKind::Buffer));
        assert_eq!(ty.to_string(), "Token");
        if let Type::Contract(iface) = &ty {
            assert_eq!(iface.method("balanceOf").map(|m| &m.ret), Some(&Type::Number));
            assert_eq!(iface.property("symbol"), Some(&Type::String));
            assert!(iface.method("symbol").is_none());
        }
    }

    #[test]
    fn test_void_is_undefined() {
        assert!(Type::Void.is_kind(ValueKind::Undefined));
    }
}
