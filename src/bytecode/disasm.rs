use crate::bytecode::{Op, Script};
use std::collections::{BTreeSet, HashMap};

fn collect_jump_targets(ops: &[Op]) -> BTreeSet<usize> {
    ops.iter()
        .filter_map(|op| op.target())
        .map(|t| t as usize)
        .collect()
}

// =============================================================================
// String output (for testing/logging)
// =============================================================================

/// Return disassembly as a String, with source positions where they change.
pub fn disassemble_to_string(script: &Script) -> String {
    let mut output = String::new();
    let jump_targets = collect_jump_targets(&script.ops);
    let mut last_span = None;

    for (ip, op) in script.ops.iter().enumerate() {
        if jump_targets.contains(&ip) {
            output.push_str("      ┌──────────────────────────────────\n");
        }

        output.push_str(&format!("{:04} ", ip));

        if jump_targets.contains(&ip) {
            output.push_str("► ");
        } else {
            output.push_str("  ");
        }

        output.push_str(&format_op_string(op, ip));

        let span = script.span_at(ip);
        if span.is_some() && span != last_span {
            if let Some(span) = span {
                output.push_str(&format!("    ; {}", span));
            }
            last_span = span;
        }
        output.push('\n');
    }

    output
}

fn format_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if s.chars().all(|c| !c.is_control()) => format!("\"{}\"", s),
        _ => {
            let hex: Vec<String> = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            format!("0x{}", hex.join(""))
        }
    }
}

fn format_target(ip: usize, target: u32) -> String {
    let arrow = if (target as usize) <= ip { "↑" } else { "↓" };
    format!("{:04} {}", target, arrow)
}

fn format_op_string(op: &Op, ip: usize) -> String {
    match op {
        Op::PushInt(n) => format!("PUSHINT     {}", n),
        Op::PushBool(b) => format!("PUSHBOOL    {}", b),
        Op::PushBytes(bytes) => format!("PUSHBYTES   {}", format_bytes(bytes)),
        Op::PushAddr(t) => format!("PUSHADDR    {:04}", t),
        Op::Jmp(t) => format!("JMP         {}", format_target(ip, *t)),
        Op::JmpIf(t) => format!("JMPIF       {}", format_target(ip, *t)),
        Op::JmpIfNot(t) => format!("JMPIFNOT    {}", format_target(ip, *t)),
        Op::ToAlt => "TOALTSTACK  ; ( a -- ) A:( -- a )".to_string(),
        Op::FromAlt => "FROMALTSTACK ; ( -- a ) A:( a -- )".to_string(),
        Op::DupFromAlt => "DUPFROMALTSTACK".to_string(),
        Op::CallA => "CALLA       ; ( args ptr -- kind value )".to_string(),
        Op::Syscall(call) => format!("SYSCALL     {}", call.name()),
        other => op_name(other).to_string(),
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Op names by how often they occur, most frequent first.
pub fn op_frequency(script: &Script) -> Vec<(&'static str, usize)> {
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    for op in &script.ops {
        *counts.entry(op_name(op)).or_insert(0) += 1;
    }
    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    counts
}

fn op_name(op: &Op) -> &'static str {
    match op {
        Op::PushInt(_) => "PUSHINT",
        Op::PushBool(_) => "PUSHBOOL",
        Op::PushBytes(_) => "PUSHBYTES",
        Op::PushNull => "PUSHNULL",
        Op::PushAddr(_) => "PUSHADDR",
        Op::Dup => "DUP",
        Op::Drop => "DROP",
        Op::Nip => "NIP",
        Op::Swap => "SWAP",
        Op::Over => "OVER",
        Op::Rot => "ROT",
        Op::Tuck => "TUCK",
        Op::Pick => "PICK",
        Op::Roll => "ROLL",
        Op::XSwap => "XSWAP",
        Op::XTuck => "XTUCK",
        Op::Reverse3 => "REVERSE3",
        Op::Reverse4 => "REVERSE4",
        Op::ReverseN => "REVERSEN",
        Op::Add => "ADD",
        Op::Sub => "SUB",
        Op::Mul => "MUL",
        Op::Div => "DIV",
        Op::Mod => "MOD",
        Op::Negate => "NEGATE",
        Op::Inc => "INC",
        Op::Dec => "DEC",
        Op::NumEqual => "NUMEQUAL",
        Op::NumNotEqual => "NUMNOTEQUAL",
        Op::Lt => "LT",
        Op::Gt => "GT",
        Op::Le => "LE",
        Op::Ge => "GE",
        Op::BoolAnd => "BOOLAND",
        Op::BoolOr => "BOOLOR",
        Op::Not => "NOT",
        Op::Equal => "EQUAL",
        Op::Cat => "CAT",
        Op::Left => "LEFT",
        Op::Right => "RIGHT",
        Op::Size => "SIZE",
        Op::NewArray => "NEWARRAY",
        Op::NewStruct => "NEWSTRUCT",
        Op::NewMap => "NEWMAP",
        Op::Pack => "PACK",
        Op::PackStruct => "PACKSTRUCT",
        Op::Unpack => "UNPACK",
        Op::PickItem => "PICKITEM",
        Op::SetItem => "SETITEM",
        Op::Append => "APPEND",
        Op::Remove => "REMOVE",
        Op::HasKey => "HASKEY",
        Op::Keys => "KEYS",
        Op::Values => "VALUES",
        Op::IsNull => "ISNULL",
        Op::ToAlt => "TOALTSTACK",
        Op::FromAlt => "FROMALTSTACK",
        Op::DupFromAlt => "DUPFROMALTSTACK",
        Op::Jmp(_) => "JMP",
        Op::JmpIf(_) => "JMPIF",
        Op::JmpIfNot(_) => "JMPIFNOT",
        Op::CallA => "CALLA",
        Op::Ret => "RET",
        Op::Throw => "THROW",
        Op::Syscall(_) => "SYSCALL",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Syscall;
    use crate::bytecode::ir::SourceMapEntry;
    use crate::lang::Span;

    #[test]
    fn test_jump_targets_are_marked() {
        let script = Script::new(vec![
            Op::PushBool(true),
            Op::JmpIfNot(3),
            Op::PushInt(1),
            Op::Ret,
        ]);
        let output = disassemble_to_string(&script);
        assert!(output.contains("JMPIFNOT    0003 ↓"));
        assert!(output.contains("0003 ► RET"));
    }

    #[test]
    fn test_backward_jump_arrow() {
        let script = Script::new(vec![Op::PushNull, Op::Jmp(0)]);
        let output = disassemble_to_string(&script);
        assert!(output.contains("0000 ↑"));
    }

    #[test]
    fn test_bytes_format_as_text_or_hex() {
        assert_eq!(format_bytes(b"deploy"), "\"deploy\"");
        assert_eq!(format_bytes(&[0x01, 0xff]), "0x01ff");
    }

    #[test]
    fn test_syscall_and_span_annotations() {
        let mut script = Script::new(vec![Op::Syscall(Syscall::StorageGet), Op::Drop]);
        script.source_map.push(SourceMapEntry {
            offset: 0,
            span: Span::new(7, 3),
        });
        let output = disassemble_to_string(&script);
        assert!(output.contains("System.Storage.Get"));
        assert!(output.contains("; 7:3"));
        assert_eq!(output.matches("; 7:3").count(), 1);
    }

    #[test]
    fn test_op_frequency_sorts_by_count() {
        let script = Script::new(vec![
            Op::PushInt(1),
            Op::PushInt(2),
            Op::Add,
            Op::PushInt(3),
            Op::Mul,
        ]);
        let counts = op_frequency(&script);
        assert_eq!(counts[0], ("PUSHINT", 3));
        assert_eq!(&counts[1..], &[("ADD", 1), ("MUL", 1)]);
    }
}
