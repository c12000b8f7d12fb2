use crate::bytecode::{JumpKind, Op};
use crate::compile::ctx::{CResult, Ctx};
use crate::compile::helpers::types::{unwrap, wrap};
use crate::lang::ValueKind;

/// ( len idx -- len idx ) negative counts from the end, then clamp to
/// `0..=len`
fn clamp_index(ctx: &mut Ctx) {
    let positive = ctx.em.new_label();
    let floor = ctx.em.new_label();
    let ceiling = ctx.em.new_label();

    ctx.em.emit(Op::Dup);
    ctx.em.push_int(0);
    ctx.em.emit(Op::Lt);
    ctx.em.jump(JumpKind::IfFalse, positive);
    ctx.em.emit(Op::Over);
    ctx.em.emit(Op::Add);
    ctx.em.mark(positive);

    ctx.em.emit(Op::Dup);
    ctx.em.push_int(0);
    ctx.em.emit(Op::Lt);
    ctx.em.jump(JumpKind::IfFalse, floor);
    ctx.em.emit(Op::Drop);
    ctx.em.push_int(0);
    ctx.em.mark(floor);

    ctx.em.emit(Op::Dup);
    ctx.em.push_int(2);
    ctx.em.emit(Op::Pick);
    ctx.em.emit(Op::Gt);
    ctx.em.jump(JumpKind::IfFalse, ceiling);
    ctx.em.emit(Op::Drop);
    ctx.em.emit(Op::Dup);
    ctx.em.mark(ceiling);
}

/// ( w(buffer) w(start) w(end) -- w(buffer) )
pub fn slice(ctx: &mut Ctx) -> CResult {
    let nonempty = ctx.em.new_label();
    let end = ctx.em.new_label();

    unwrap(ctx);
    ctx.em.emit(Op::Swap);
    unwrap(ctx);
    ctx.em.emit(Op::Swap);
    ctx.em.emit(Op::Rot);
    unwrap(ctx);
    ctx.em.emit_all(&[Op::Rot, Op::Rot]);

    // buf start end
    ctx.em.emit(Op::Swap);
    ctx.em.push_int(2);
    ctx.em.emit_all(&[Op::Pick, Op::Size, Op::Swap]);
    clamp_index(ctx);
    // buf end len start
    ctx.em.emit(Op::Rot);
    ctx.em.push_int(2);
    ctx.em.emit_all(&[Op::Pick, Op::Swap]);
    clamp_index(ctx);
    // buf len start len end
    ctx.em.emit_all(&[Op::Nip, Op::Rot, Op::Drop]);

    // buf start end
    ctx.em.emit_all(&[Op::Tuck, Op::Swap, Op::Sub]);
    ctx.em.emit(Op::Dup);
    ctx.em.push_int(0);
    ctx.em.emit(Op::Gt);
    ctx.em.jump(JumpKind::IfTrue, nonempty);
    ctx.em.emit_all(&[Op::Drop, Op::Drop, Op::Drop]);
    ctx.em.push_bytes(&[]);
    ctx.em.jump(JumpKind::Always, end);

    // buf end count
    ctx.em.mark(nonempty);
    ctx.em.emit_all(&[Op::Rot, Op::Rot, Op::Left, Op::Swap, Op::Right]);
    ctx.em.mark(end);
    wrap(ctx, ValueKind::Buffer);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::compile::helpers::Helper;
    use crate::compile::helpers::tests::run_helper;
    use crate::lang::ValueKind;
    use crate::runtime::StackItem;

    fn sliced(start: i64, end: i64) -> StackItem {
        let buffer = StackItem::wrap(ValueKind::Buffer, StackItem::bytes("abcdef"));
        let out = run_helper(
            vec![buffer, StackItem::number(start), StackItem::number(end)],
            &[Helper::BufferSlice],
        )
        .unwrap();
        out[0].clone()
    }

    fn buffer(s: &str) -> StackItem {
        StackItem::wrap(ValueKind::Buffer, StackItem::bytes(s))
    }

    #[test]
    fn test_slice_within_bounds() {
        assert_eq!(sliced(1, 4), buffer("bcd"));
        assert_eq!(sliced(0, 6), buffer("abcdef"));
    }

    #[test]
    fn test_slice_counts_negative_indices_from_the_end() {
        assert_eq!(sliced(-2, 6), buffer("ef"));
        assert_eq!(sliced(0, -1), buffer("abcde"));
        assert_eq!(sliced(-100, 2), buffer("ab"));
    }

    #[test]
    fn test_slice_clamps_and_empties() {
        assert_eq!(sliced(2, i64::MAX), buffer("cdef"));
        assert_eq!(sliced(4, 2), buffer(""));
        assert_eq!(sliced(6, 10), buffer(""));
    }
}
