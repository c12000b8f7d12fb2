use std::collections::HashMap;

use crate::bytecode::{Op, Script};

#[derive(Debug)]
pub struct StackCheckError {
    pub message: String,
}

impl std::fmt::Display for StackCheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stack-check error: {}", self.message)
    }
}

impl std::error::Error for StackCheckError {}

impl StackCheckError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A code region entry: where it starts, the height on entry, and the height
/// every `Ret` reachable from it must leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub addr: usize,
    pub height: i32,
    pub exit: i32,
}

/// Main entry: `( args -- result )`.
pub const MAIN_ENTRY: Entry = Entry {
    addr: 0,
    height: 1,
    exit: 1,
};

/// Returns (pops, pushes) for the op at `ip`, or None if the effect can't be
/// determined statically.
///
/// `Pack` is resolved from the `PushInt` count right before it, and an
/// `Unpack` immediately repacked is an array copy.
fn effect_at(ops: &[Op], ip: usize) -> Option<(i32, i32)> {
    let op = &ops[ip];
    match op {
        Op::Pack | Op::PackStruct => match ip.checked_sub(1).map(|p| &ops[p]) {
            Some(Op::PushInt(n)) if *n >= 0 => Some((*n as i32 + 1, 1)),
            Some(Op::Unpack) => Some((1, 1)),
            _ => None,
        },
        Op::Unpack => match ops.get(ip + 1) {
            Some(Op::Pack) => Some((1, 1)),
            _ => None,
        },
        other => other.effect(),
    }
}

/// Follow every path from `entry`, checking that heights never go negative,
/// agree wherever paths join, and match `entry.exit` at each `Ret`.
pub fn check_region(ops: &[Op], entry: Entry) -> Result<(), StackCheckError> {
    let mut heights: HashMap<usize, i32> = HashMap::new();
    let mut work: Vec<(usize, i32)> = vec![(entry.addr, entry.height)];

    while let Some((ip, h)) = work.pop() {
        let op = ops.get(ip).ok_or_else(|| {
            StackCheckError::new(format!("control falls off the end of the script at ip={}", ip))
        })?;

        match heights.get(&ip) {
            Some(&seen) if seen != h => {
                return Err(StackCheckError::new(format!(
                    "paths join at ip={} with heights {} and {}",
                    ip, seen, h
                )));
            }
            Some(_) => continue,
            None => {
                heights.insert(ip, h);
            }
        }

        let (pops, pushes) = match effect_at(ops, ip) {
            Some(effect) => effect,
            // Can't soundly reason past this op on this path.
            None => continue,
        };
        if h < pops {
            return Err(StackCheckError::new(format!(
                "stack underflow at ip={}, op={:?}, needed {} items",
                ip, op, pops
            )));
        }
        let next = h - pops + pushes;

        match op {
            Op::Jmp(t) => work.push((*t as usize, next)),
            Op::JmpIf(t) | Op::JmpIfNot(t) => {
                work.push((*t as usize, next));
                work.push((ip + 1, next));
            }
            Op::Ret => {
                if next != entry.exit {
                    return Err(StackCheckError::new(format!(
                        "RET at ip={} leaves {} items, expected {}",
                        ip, next, entry.exit
                    )));
                }
            }
            Op::Throw => {}
            _ => work.push((ip + 1, next)),
        }
    }

    Ok(())
}

/// Check the main region and every function body whose address the script
/// takes. Function bodies run `( args -- kind value )`.
pub fn check_script(script: &Script) -> Result<(), StackCheckError> {
    check_region(&script.ops, MAIN_ENTRY)?;

    let mut entries: Vec<usize> = script
        .ops
        .iter()
        .filter_map(|op| match op {
            Op::PushAddr(t) => Some(*t as usize),
            _ => None,
        })
        .collect();
    entries.sort_unstable();
    entries.dedup();

    for addr in entries {
        check_region(
            &script.ops,
            Entry {
                addr,
                height: 1,
                exit: 2,
            },
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(height: i32, exit: i32) -> Entry {
        Entry {
            addr: 0,
            height,
            exit,
        }
    }

    #[test]
    fn test_simple_ops() {
        let ops = vec![Op::PushInt(1), Op::PushInt(2), Op::Add, Op::Ret];
        assert!(check_region(&ops, region(0, 1)).is_ok());
    }

    #[test]
    fn test_underflow() {
        let ops = vec![Op::Add, Op::Ret];
        let result = check_region(&ops, region(0, 1));
        assert!(result.is_err());
        assert!(result.unwrap_err().message.contains("underflow"));
    }

    #[test]
    fn test_if_with_jumps_pattern() {
        let ops = vec![
            Op::PushBool(true),
            Op::JmpIfNot(4),
            Op::PushInt(10),
            Op::Jmp(5),
            Op::PushInt(20),
            Op::Ret,
        ];
        assert!(check_region(&ops, region(0, 1)).is_ok());
    }

    #[test]
    fn test_unbalanced_branches_are_rejected() {
        let ops = vec![
            Op::PushBool(true),
            Op::JmpIfNot(4),
            Op::PushInt(10),
            Op::PushInt(11),
            Op::Ret,
        ];
        let err = check_region(&ops, region(0, 1)).unwrap_err();
        assert!(err.message.contains("join") || err.message.contains("RET"));
    }

    #[test]
    fn test_loop_back_edge_must_balance() {
        // top: dup 0 > jmpifnot end ; dec ; jmp top ; end: ret
        let ops = vec![
            Op::Dup,
            Op::PushInt(0),
            Op::Gt,
            Op::JmpIfNot(6),
            Op::Dec,
            Op::Jmp(0),
            Op::Ret,
        ];
        assert!(check_region(&ops, region(1, 1)).is_ok());

        let leaky = vec![
            Op::Dup,
            Op::PushInt(0),
            Op::Gt,
            Op::JmpIfNot(6),
            Op::Dup,
            Op::Jmp(0),
            Op::Ret,
        ];
        assert!(check_region(&leaky, region(1, 1)).is_err());
    }

    #[test]
    fn test_pack_uses_preceding_count() {
        let ops = vec![
            Op::PushInt(1),
            Op::PushInt(2),
            Op::PushInt(2),
            Op::Pack,
            Op::Ret,
        ];
        assert!(check_region(&ops, region(0, 1)).is_ok());
    }

    #[test]
    fn test_array_copy_is_neutral() {
        let ops = vec![Op::Unpack, Op::Pack, Op::Ret];
        assert!(check_region(&ops, region(1, 1)).is_ok());
    }

    #[test]
    fn test_function_bodies_are_checked() {
        // main: pushaddr f ; drop ; ret    f: ( args -- kind value )
        let script = Script::new(vec![
            Op::PushAddr(3),
            Op::Drop,
            Op::Ret,
            Op::PushInt(0),
            Op::PushNull,
            Op::Rot,
            Op::Drop,
            Op::Ret,
        ]);
        assert!(check_script(&script).is_ok());

        // Body returns with nothing left instead of kind and value.
        let broken = Script::new(vec![
            Op::PushAddr(3),
            Op::Drop,
            Op::Ret,
            Op::Drop,
            Op::Ret,
        ]);
        assert!(check_script(&broken).is_err());

        // One item too many.
        let broken = Script::new(vec![
            Op::PushAddr(3),
            Op::Drop,
            Op::Ret,
            Op::PushInt(0),
            Op::PushInt(0),
            Op::Ret,
        ]);
        assert!(check_script(&broken).is_err());
    }
}
