use serde::{Deserialize, Serialize};

use crate::bytecode::syscall::Syscall;

// =============================================================================
// OP - VM instructions
// =============================================================================

/// One VM instruction.
///
/// Jump and address operands are absolute instruction indices once a script
/// is assembled. While emitting they hold a label handle and are patched by
/// the jump table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    // ==========================================================================
    // Push
    // ==========================================================================
    PushInt(i64),
    PushBool(bool),
    PushBytes(Vec<u8>),
    PushNull,
    /// ( -- ptr ) push a code address
    PushAddr(u32),

    // ==========================================================================
    // Stack shuffling
    // ==========================================================================
    Dup,  // ( a -- a a )
    Drop, // ( a -- )
    Nip,  // ( a b -- b )
    Swap, // ( a b -- b a )
    Over, // ( a b -- a b a )
    Rot,  // ( a b c -- b c a )
    Tuck, // ( a b -- b a b )
    /// ( xn .. x0 n -- xn .. x0 xn )
    Pick,
    /// ( xn .. x0 n -- xn-1 .. x0 xn )
    Roll,
    /// ( n -- ) swaps x0 with xn
    XSwap,
    /// ( n -- ) inserts a copy of x0 at depth n
    XTuck,
    Reverse3, // ( a b c -- c b a )
    Reverse4, // ( a b c d -- d c b a )
    /// ( xn-1 .. x0 n -- x0 .. xn-1 )
    ReverseN,

    // ==========================================================================
    // Arithmetic and logic
    // ==========================================================================
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Negate,
    Inc,
    Dec,
    NumEqual,
    NumNotEqual,
    Lt,
    Gt,
    Le,
    Ge,
    BoolAnd,
    BoolOr,
    Not,
    /// ( a b -- bool ) structs compare by content, other compounds by reference
    Equal,

    // ==========================================================================
    // Byte strings
    // ==========================================================================
    Cat,   // ( a b -- a++b )
    Left,  // ( bytes n -- prefix )
    Right, // ( bytes n -- suffix )
    /// ( x -- n ) byte length, or item count of a compound
    Size,

    // ==========================================================================
    // Compound items
    // ==========================================================================
    NewArray,  // ( n -- array ) n nulls
    NewStruct, // ( n -- struct )
    NewMap,    // ( -- map )
    /// ( xn-1 .. x0 n -- array ) x0 becomes index 0
    Pack,
    PackStruct,
    /// ( array -- xn-1 .. x0 n )
    Unpack,
    PickItem, // ( coll key -- item )
    SetItem,  // ( coll key value -- )
    Append,   // ( array item -- )
    Remove,   // ( coll key -- )
    HasKey,   // ( coll key -- bool )
    Keys,     // ( map -- array )
    Values,   // ( coll -- array )
    IsNull,   // ( x -- bool )

    // ==========================================================================
    // Alternate stack
    // ==========================================================================
    ToAlt,      // ( a -- ) alt: ( -- a )
    FromAlt,    // ( -- a ) alt: ( a -- )
    DupFromAlt, // ( -- a ) alt unchanged

    // ==========================================================================
    // Control
    // ==========================================================================
    Jmp(u32),
    JmpIf(u32),
    JmpIfNot(u32),
    /// ( args ptr -- kind value ) call a code address
    CallA,
    Ret,
    /// ( value -- ) abort execution with an uncaught value
    Throw,
    Syscall(Syscall),
}

impl Op {
    /// Returns (pops, pushes) for an op, or None if the effect depends on an
    /// operand only known at runtime.
    ///
    /// Ops that take a count operand report their net effect with the count
    /// included: `Pick` pops the index and pushes the copy.
    pub fn effect(&self) -> Option<(i32, i32)> {
        use Op::*;
        Some(match self {
            PushInt(_) | PushBool(_) | PushBytes(_) | PushNull | PushAddr(_) => (0, 1),

            Dup => (1, 2),
            Drop => (1, 0),
            Nip => (2, 1),
            Swap => (2, 2),
            Over => (2, 3),
            Rot => (3, 3),
            Tuck => (2, 3),
            Pick => (1, 1),
            Roll => (1, 0),
            XSwap => (1, 0),
            XTuck => (1, 1),
            Reverse3 => (3, 3),
            Reverse4 => (4, 4),
            ReverseN => (1, 0),

            Add | Sub | Mul | Div | Mod => (2, 1),
            Negate | Inc | Dec | Not => (1, 1),
            NumEqual | NumNotEqual | Lt | Gt | Le | Ge => (2, 1),
            BoolAnd | BoolOr | Equal => (2, 1),

            Cat | Left | Right => (2, 1),
            Size => (1, 1),

            NewArray | NewStruct => (1, 1),
            NewMap => (0, 1),
            PickItem => (2, 1),
            SetItem => (3, 0),
            Append | Remove => (2, 0),
            HasKey => (2, 1),
            Keys | Values | IsNull => (1, 1),

            ToAlt => (1, 0),
            FromAlt | DupFromAlt => (0, 1),

            Jmp(_) => (0, 0),
            JmpIf(_) | JmpIfNot(_) => (1, 0),
            CallA => (2, 2),
            Ret => (0, 0),
            Throw => (1, 0),
            Syscall(call) => call.effect(),

            Pack | PackStruct | Unpack => return None,
        })
    }

    /// The jump or address operand, if this op carries one.
    pub fn target(&self) -> Option<u32> {
        match self {
            Op::Jmp(t) | Op::JmpIf(t) | Op::JmpIfNot(t) | Op::PushAddr(t) => Some(*t),
            _ => None,
        }
    }

    pub(crate) fn set_target(&mut self, addr: u32) {
        match self {
            Op::Jmp(t) | Op::JmpIf(t) | Op::JmpIfNot(t) | Op::PushAddr(t) => *t = addr,
            _ => {}
        }
    }

    /// True when execution never falls through to the next op.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Op::Jmp(_) | Op::Ret | Op::Throw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_ops_have_no_static_effect() {
        assert_eq!(Op::Pack.effect(), None);
        assert_eq!(Op::Unpack.effect(), None);
        assert_eq!(Op::PackStruct.effect(), None);
    }

    #[test]
    fn test_conditional_jumps_pop_condition() {
        assert_eq!(Op::JmpIf(0).effect(), Some((1, 0)));
        assert_eq!(Op::JmpIfNot(0).effect(), Some((1, 0)));
        assert_eq!(Op::Jmp(0).effect(), Some((0, 0)));
    }

    #[test]
    fn test_set_target_only_touches_jumps() {
        let mut op = Op::JmpIfNot(3);
        op.set_target(17);
        assert_eq!(op, Op::JmpIfNot(17));

        let mut add = Op::Add;
        add.set_target(17);
        assert_eq!(add, Op::Add);
        assert_eq!(add.target(), None);
    }

    #[test]
    fn test_terminal_ops() {
        assert!(Op::Ret.is_terminal());
        assert!(Op::Throw.is_terminal());
        assert!(Op::Jmp(0).is_terminal());
        assert!(!Op::JmpIf(0).is_terminal());
        assert!(!Op::CallA.is_terminal());
    }
}
