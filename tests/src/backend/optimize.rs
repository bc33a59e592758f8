use quickcheck_macros::quickcheck;
use tcg_backend::optimize::optimize;
use tcg_core::op::Op;
use tcg_core::opcode::Opcode;
use tcg_core::temp::TempIdx;
use tcg_core::types::{Cond, Type};
use tcg_core::Context;

fn emit(ctx: &mut Context, opc: Opcode, ty: Type, args: &[TempIdx]) {
    let idx = ctx.next_op_idx();
    let op = Op::with_args(idx, opc, ty, args);
    ctx.emit_op(op);
}

fn mov(ctx: &mut Context, dst: TempIdx, src: TempIdx) {
    emit(ctx, Opcode::Mov, Type::I32, &[dst, src]);
}

fn is_movi(ctx: &Context, idx: usize, val: u64) -> bool {
    let op = ctx.op(tcg_core::op::OpIdx(idx as u32));
    op.opc == Opcode::Mov && ctx.temp(op.args[1]).is_const() && ctx.temp(op.args[1]).val == val
}

fn is_mov(ctx: &Context, idx: usize, dst: TempIdx, src: TempIdx) -> bool {
    let op = ctx.op(tcg_core::op::OpIdx(idx as u32));
    op.opc == Opcode::Mov && op.args[0] == dst && op.args[1] == src
}

fn is_nop(ctx: &Context, idx: usize) -> bool {
    ctx.op(tcg_core::op::OpIdx(idx as u32)).opc == Opcode::Nop
}

// ---- Concrete scenarios ----

#[test]
fn constant_fold_add() {
    let mut ctx = Context::new();
    let c1 = ctx.new_const(Type::I32, 2);
    let c2 = ctx.new_const(Type::I32, 3);
    let r = ctx.new_temp(Type::I32);
    emit(&mut ctx, Opcode::Add, Type::I32, &[r, c1, c2]);

    optimize(&mut ctx);

    assert!(is_movi(&ctx, 0, 5));
}

#[test]
fn copy_propagation_through_mov_chain() {
    // `a` is TB-scoped (a "local" per the representative-selection
    // priority) so the chain has somewhere better than itself to
    // collapse to; plain ebb-to-ebb copies have no preferred target
    // and are only caught by the ring walk in `are_copies`, not by
    // input substitution.
    let mut ctx = Context::new();
    let a = ctx.new_temp_tb(Type::I32);
    let b = ctx.new_temp(Type::I32);
    let c = ctx.new_temp(Type::I32);
    let r = ctx.new_temp(Type::I32);

    mov(&mut ctx, b, a); // b = a
    mov(&mut ctx, c, b); // c = b (propagates to a)
    emit(&mut ctx, Opcode::Add, Type::I32, &[r, c, c]); // r = c + c -> a + a

    optimize(&mut ctx);

    let op = ctx.op(tcg_core::op::OpIdx(2));
    assert_eq!(op.opc, Opcode::Add);
    assert_eq!(op.args[1], a);
    assert_eq!(op.args[2], a);
}

#[test]
fn algebraic_identity_add_zero() {
    let mut ctx = Context::new();
    let a = ctx.new_temp(Type::I32);
    let zero = ctx.new_const(Type::I32, 0);
    let r = ctx.new_temp(Type::I32);
    emit(&mut ctx, Opcode::Add, Type::I32, &[r, a, zero]);

    optimize(&mut ctx);

    assert!(is_mov(&ctx, 0, r, a));
}

#[test]
fn algebraic_identity_self_nop() {
    let mut ctx = Context::new();
    let a = ctx.new_temp(Type::I32);
    let zero = ctx.new_const(Type::I32, 0);
    emit(&mut ctx, Opcode::Add, Type::I32, &[a, a, zero]); // add a, a, 0 -> NOP

    optimize(&mut ctx);

    assert!(is_nop(&ctx, 0));
}

#[test]
fn commutativity_moves_constant_to_rhs() {
    let mut ctx = Context::new();
    let c = ctx.new_const(Type::I32, 7);
    let a = ctx.new_temp(Type::I32);
    let r = ctx.new_temp(Type::I32);
    emit(&mut ctx, Opcode::Add, Type::I32, &[r, c, a]);

    optimize(&mut ctx);

    let op = ctx.op(tcg_core::op::OpIdx(0));
    assert_eq!(op.opc, Opcode::Add, "unfoldable since `a` isn't const");
    assert_eq!(op.args[1], a, "constant operand must land on the RHS");
    assert_eq!(op.args[2], c);
}

#[test]
fn brcond_taken_rewrites_to_br_and_resets_table() {
    let mut ctx = Context::new();
    let c1 = ctx.new_const(Type::I32, 1);
    let c2 = ctx.new_const(Type::I32, 1);
    let label = TempIdx(4);
    let idx = ctx.next_op_idx();
    let mut op = Op::with_args(idx, Opcode::BrCond, Type::I32, &[c1, c2, TempIdx(8), label]);
    op.args[2] = TempIdx(8); // Cond::Eq
    ctx.emit_op(op);

    optimize(&mut ctx);

    let op = ctx.op(tcg_core::op::OpIdx(0));
    assert_eq!(op.opc, Opcode::Br);
    assert_eq!(op.args[0], label);
}

#[test]
fn brcond_not_taken_becomes_nop() {
    let mut ctx = Context::new();
    let c1 = ctx.new_const(Type::I32, 1);
    let c2 = ctx.new_const(Type::I32, 2);
    let label = TempIdx(7);
    let idx = ctx.next_op_idx();
    let mut op = Op::with_args(idx, Opcode::BrCond, Type::I32, &[c1, c2, TempIdx(8), label]);
    op.args[2] = TempIdx(8); // Cond::Eq
    ctx.emit_op(op);

    optimize(&mut ctx);

    assert!(is_nop(&ctx, 0));
}

#[test]
fn bb_end_resets_table_across_branch() {
    let mut ctx = Context::new();
    let a = ctx.new_temp(Type::I32);
    let c = ctx.new_const(Type::I32, 5);
    let r = ctx.new_temp(Type::I32);

    mov(&mut ctx, a, c); // a = 5
    ctx.new_label();
    emit(&mut ctx, Opcode::SetLabel, Type::I32, &[TempIdx(0)]);
    // After the label (a BB_END op), `a` must no longer be trusted as const.
    emit(&mut ctx, Opcode::Add, Type::I32, &[r, a, a]);

    optimize(&mut ctx);

    let op = ctx.op(tcg_core::op::OpIdx(2));
    assert_eq!(op.opc, Opcode::Add, "fold must not cross a BB_END op");
}

#[test]
fn call_invalidates_globals_not_locals() {
    let mut ctx = Context::new();
    let env = ctx.new_fixed(Type::I64, 0, "env");
    let glob = ctx.new_global(Type::I32, env, 0, "pc");
    let local = ctx.new_temp(Type::I32);
    let c = ctx.new_const(Type::I32, 1);
    let cres = ctx.new_const(Type::I32, 1);

    mov(&mut ctx, glob, c);
    mov(&mut ctx, local, cres);

    let idx = ctx.next_op_idx();
    let mut op = Op::new(idx, Opcode::Call, Type::I32);
    op.param1 = 0; // n_iargs
    op.param2 = 0; // n_oargs
    op.call_flags = tcg_core::op::CallFlags::NONE;
    ctx.emit_op(op);

    let r1 = ctx.new_temp(Type::I32);
    let r2 = ctx.new_temp(Type::I32);
    emit(&mut ctx, Opcode::Mov, Type::I32, &[r1, glob]);
    emit(&mut ctx, Opcode::Mov, Type::I32, &[r2, local]);

    optimize(&mut ctx);

    // glob's constant state is clobbered by the call; local survives.
    let glob_read = ctx.op(tcg_core::op::OpIdx(3));
    assert_eq!(glob_read.opc, Opcode::Mov);
    assert_eq!(glob_read.args[1], glob, "global must not fold through a call");

    assert!(is_movi(&ctx, 4, 1), "local constant survives an opaque call");
}

#[test]
fn double_word_add_folds_with_reserved_nop_slot() {
    let mut ctx = Context::new();
    let al = ctx.new_const(Type::I32, 0xFFFF_FFFF);
    let ah = ctx.new_const(Type::I32, 0);
    let bl = ctx.new_const(Type::I32, 1);
    let bh = ctx.new_const(Type::I32, 0);
    let rl = ctx.new_temp(Type::I32);
    let rh = ctx.new_temp(Type::I32);

    emit(&mut ctx, Opcode::Add2, Type::I32, &[rl, rh, al, ah, bl, bh]);
    emit(&mut ctx, Opcode::Nop, Type::I32, &[]); // reserved slot

    optimize(&mut ctx);

    assert!(is_movi(&ctx, 0, 0));
    assert!(is_movi(&ctx, 1, 1));
}

#[test]
fn brcond2_collapses_to_high_word_compare_against_zero() {
    let mut ctx = Context::new();
    let al = ctx.new_temp(Type::I32);
    let ah = ctx.new_temp(Type::I32);
    let bl = ctx.new_const(Type::I32, 0);
    let bh = ctx.new_const(Type::I32, 0);
    let label = TempIdx(3);

    let idx = ctx.next_op_idx();
    let mut op = Op::with_args(idx, Opcode::BrCond2I32, Type::I32, &[al, ah, bl, bh, TempIdx(10), label]);
    op.args[4] = TempIdx(10); // Cond::Lt
    ctx.emit_op(op);

    optimize(&mut ctx);

    let op = ctx.op(tcg_core::op::OpIdx(0));
    assert_eq!(op.opc, Opcode::BrCond);
    assert_eq!(op.args[0], ah);
    assert_eq!(op.args[1], bh);
}

#[test]
fn brcond2_canonicalizes_constant_side_to_rhs() {
    // Zero is on the `a` side here, with a cond (Gt) whose `.swap()` lands
    // on Lt — canonicalization must swap the (al,ah)/(bl,bh) pairs and the
    // cond so the zero ends up on the RHS in an orientation the high-word
    // collapse in `fold_brcond2` recognizes.
    let mut ctx = Context::new();
    let al = ctx.new_const(Type::I32, 0);
    let ah = ctx.new_const(Type::I32, 0);
    let bl = ctx.new_temp(Type::I32);
    let bh = ctx.new_temp(Type::I32);
    let label = TempIdx(3);

    let idx = ctx.next_op_idx();
    let mut op = Op::with_args(idx, Opcode::BrCond2I32, Type::I32, &[al, ah, bl, bh, TempIdx(13), label]);
    op.args[4] = TempIdx(13); // Cond::Gt
    ctx.emit_op(op);

    optimize(&mut ctx);

    let op = ctx.op(tcg_core::op::OpIdx(0));
    assert_eq!(op.opc, Opcode::BrCond, "collapses to a single high-word compare");
    assert_eq!(op.args[0], bh, "non-const high word ends up as the compared value");
    assert_eq!(op.args[1], ah, "zero constant ends up on the rhs");
    assert_eq!(op.args[2], TempIdx(10), "Gt.swap() == Lt");
}

#[test]
fn setcond2_canonicalizes_constant_side_to_rhs() {
    // Leu.swap() == Geu, which the zero-rhs shortcut resolves directly
    // to `true` without ever needing the (now-rhs) constant's value.
    let mut ctx = Context::new();
    let dst = ctx.new_temp(Type::I32);
    let al = ctx.new_const(Type::I32, 0);
    let ah = ctx.new_const(Type::I32, 0);
    let bl = ctx.new_temp(Type::I32);
    let bh = ctx.new_temp(Type::I32);

    let idx = ctx.next_op_idx();
    let mut op = Op::with_args(idx, Opcode::SetCond2I32, Type::I32, &[dst, al, ah, bl, bh, TempIdx(16)]);
    op.args[5] = TempIdx(16); // Cond::Leu
    ctx.emit_op(op);

    optimize(&mut ctx);

    assert!(is_movi(&ctx, 0, 1), "unsigned x <= 0 constant on the lhs canonicalizes to x >= 0, always true");
}

#[test]
fn movcond_canonicalizes_false_arm_to_destination() {
    let mut ctx = Context::new();
    let dst = ctx.new_temp(Type::I32);
    let a = ctx.new_temp(Type::I32);
    let b = ctx.new_temp(Type::I32);
    let vf = ctx.new_temp(Type::I32);

    let idx = ctx.next_op_idx();
    // movcond dst, a, b, dst, vf, Eq  (vt aliases dst, should swap with vf and invert)
    let mut op = Op::with_args(idx, Opcode::MovCond, Type::I32, &[dst, a, b, dst, vf, TempIdx(8)]);
    op.args[5] = TempIdx(8); // Cond::Eq
    ctx.emit_op(op);

    optimize(&mut ctx);

    let op = ctx.op(tcg_core::op::OpIdx(0));
    // Either fully rewritten (if operands allow folding the compare) or
    // still a movcond with vf aliasing dst and an inverted cond.
    if op.opc == Opcode::MovCond {
        assert_eq!(op.args[4], dst);
        assert_eq!(op.args[5], TempIdx(9)); // Cond::Ne
    }
}

#[test]
fn deposit_folds_when_base_and_value_const() {
    let mut ctx = Context::new();
    let base = ctx.new_const(Type::I32, 0xFFFF_FFFF);
    let value = ctx.new_const(Type::I32, 0xFF);
    let r = ctx.new_temp(Type::I32);
    emit(&mut ctx, Opcode::Deposit, Type::I32, &[r, base, value, TempIdx(0), TempIdx(8)]);

    optimize(&mut ctx);

    // Clear bits [0,8) of base, insert value's low 8 bits there.
    assert!(is_movi(&ctx, 0, 0xFFFF_FF00 | 0xFF));
}

#[test]
fn setcond_copy_equal_shortcut_without_values() {
    let mut ctx = Context::new();
    let a = ctx.new_temp(Type::I32);
    let b = ctx.new_temp(Type::I32);
    let dst = ctx.new_temp(Type::I32);

    mov(&mut ctx, b, a); // b copy-equal a
    let idx = ctx.next_op_idx();
    let mut op = Op::with_args(idx, Opcode::SetCond, Type::I32, &[dst, a, b, TempIdx(8)]);
    op.args[3] = TempIdx(8); // Cond::Eq
    ctx.emit_op(op);

    optimize(&mut ctx);

    assert!(is_movi(&ctx, 1, 1));
}

#[test]
fn ltu_zero_rhs_shortcut() {
    let mut ctx = Context::new();
    let a = ctx.new_temp(Type::I32);
    let zero = ctx.new_const(Type::I32, 0);
    let dst = ctx.new_temp(Type::I32);
    let idx = ctx.next_op_idx();
    let mut op = Op::with_args(idx, Opcode::SetCond, Type::I32, &[dst, a, zero, TempIdx(14)]);
    op.args[3] = TempIdx(14); // Cond::Ltu
    ctx.emit_op(op);

    optimize(&mut ctx);

    assert!(is_movi(&ctx, 0, 0), "nothing is unsigned-less-than zero");
}

#[test]
fn nop_never_carries_args_after_fold() {
    let mut ctx = Context::new();
    let a = ctx.new_temp(Type::I32);
    emit(&mut ctx, Opcode::Mov, Type::I32, &[a, a]);

    optimize(&mut ctx);

    let op = ctx.op(tcg_core::op::OpIdx(0));
    assert_eq!(op.opc, Opcode::Nop);
    assert_eq!(op.nargs, 0);
}

#[test]
fn output_arg_count_never_increases() {
    let mut ctx = Context::new();
    let a = ctx.new_temp(Type::I32);
    let b = ctx.new_temp(Type::I32);
    let orig_nargs = 2u8;
    emit(&mut ctx, Opcode::Mov, Type::I32, &[a, b]);
    optimize(&mut ctx);
    let op = ctx.op(tcg_core::op::OpIdx(0));
    assert!(op.nargs <= orig_nargs);
}

// ---- Quickcheck properties ----

#[quickcheck]
fn add_fold_matches_wrapping_add_u32(a: u32, b: u32) -> bool {
    let mut ctx = Context::new();
    let ca = ctx.new_const(Type::I32, a as u64);
    let cb = ctx.new_const(Type::I32, b as u64);
    let r = ctx.new_temp(Type::I32);
    emit(&mut ctx, Opcode::Add, Type::I32, &[r, ca, cb]);

    optimize(&mut ctx);

    let expected = a.wrapping_add(b) as u64;
    is_movi(&ctx, 0, expected)
}

#[quickcheck]
fn xor_self_is_always_zero(v: u32) -> bool {
    let mut ctx = Context::new();
    let a = if v % 2 == 0 {
        ctx.new_temp(Type::I32)
    } else {
        ctx.new_const(Type::I32, v as u64)
    };
    let r = ctx.new_temp(Type::I32);
    emit(&mut ctx, Opcode::Xor, Type::I32, &[r, a, a]);

    optimize(&mut ctx);

    is_movi(&ctx, 0, 0)
}

#[quickcheck]
fn idempotent_up_to_nop_placement(a: u32, b: u32) -> bool {
    let mut ctx = Context::new();
    let ca = ctx.new_const(Type::I32, a as u64);
    let cb = ctx.new_const(Type::I32, b as u64);
    let r = ctx.new_temp(Type::I32);
    emit(&mut ctx, Opcode::Add, Type::I32, &[r, ca, cb]);

    optimize(&mut ctx);
    let first_pass: Vec<Opcode> = ctx.ops().iter().map(|op| op.opc).collect();

    optimize(&mut ctx);
    let second_pass: Vec<Opcode> = ctx.ops().iter().map(|op| op.opc).collect();

    first_pass == second_pass
}

#[quickcheck]
fn setcond_eq_matches_values(a: i32, b: i32) -> bool {
    let mut ctx = Context::new();
    let ca = ctx.new_const(Type::I32, a as u32 as u64);
    let cb = ctx.new_const(Type::I32, b as u32 as u64);
    let dst = ctx.new_temp(Type::I32);
    let idx = ctx.next_op_idx();
    let mut op = Op::with_args(idx, Opcode::SetCond, Type::I32, &[dst, ca, cb, TempIdx(8)]);
    op.args[3] = TempIdx(8); // Cond::Eq
    ctx.emit_op(op);

    optimize(&mut ctx);

    let expected = if a == b { 1 } else { 0 };
    is_movi(&ctx, 0, expected)
}

fn cond_to_idx(c: Cond) -> TempIdx {
    TempIdx(c as u32)
}

#[quickcheck]
fn rotl_by_masked_zero_is_identity(v: u32) -> bool {
    let mut ctx = Context::new();
    let a = ctx.new_const(Type::I32, v as u64);
    let sh = ctx.new_const(Type::I32, 32); // 32 mod 32 == 0
    let r = ctx.new_temp(Type::I32);
    emit(&mut ctx, Opcode::RotL, Type::I32, &[r, a, sh]);

    optimize(&mut ctx);

    is_movi(&ctx, 0, v as u64)
}

#[test]
fn cond_helper_sanity() {
    assert_eq!(cond_to_idx(Cond::Eq), TempIdx(8));
}
