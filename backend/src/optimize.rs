// TCG IR optimizer — single-pass constant folding, copy propagation,
// algebraic simplification. Runs before liveness analysis.
//
// Reference: ~/qemu/tcg/optimize.c

use tcg_core::op::{CallFlags, OpIdx};
use tcg_core::opcode::{OpFlags, Opcode};
use tcg_core::temp::{TempIdx, TempKind};
use tcg_core::types::{Cond, Type};
use tcg_core::Context;

/// Per-temp state tag. Maps directly onto the three states a temp
/// can occupy between operations: nothing known, a known constant,
/// or membership in a copy-equivalence class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TempState {
    Undef,
    Const(u64),
    Copy,
}

/// One temp's entry in the table: its state plus ring links.
/// `prev`/`next` only carry meaning while `state == Copy`; otherwise
/// they point back to the temp itself.
#[derive(Clone, Copy, Debug)]
struct TempEntry {
    state: TempState,
    prev: TempIdx,
    next: TempIdx,
}

impl TempEntry {
    fn undef(self_idx: TempIdx) -> Self {
        TempEntry {
            state: TempState::Undef,
            prev: self_idx,
            next: self_idx,
        }
    }
}

/// Component B+C: the temp state table and its equivalence-class ring.
/// All mutation goes through `reset`/`set_const`/`join_copy` so the
/// ring invariants (symmetry, no singleton COPY classes) never lapse.
struct Table {
    entries: Vec<TempEntry>,
}

impl Table {
    fn new(n: usize) -> Self {
        let entries = (0..n).map(|i| TempEntry::undef(TempIdx(i as u32))).collect();
        Table { entries }
    }

    fn ensure(&mut self, idx: TempIdx) {
        let i = idx.0 as usize;
        if i >= self.entries.len() {
            let start = self.entries.len();
            self.entries.resize(i + 1, TempEntry::undef(TempIdx(0)));
            for (off, e) in self.entries[start..].iter_mut().enumerate() {
                *e = TempEntry::undef(TempIdx((start + off) as u32));
            }
        }
    }

    fn state(&self, t: TempIdx) -> TempState {
        let i = t.0 as usize;
        if i < self.entries.len() {
            self.entries[i].state
        } else {
            TempState::Undef
        }
    }

    fn is_const(&self, t: TempIdx) -> Option<u64> {
        match self.state(t) {
            TempState::Const(v) => Some(v),
            _ => None,
        }
    }

    /// Detach `t` from its ring, restoring ring-mate links; a size-2
    /// ring collapses its surviving mate back to UNDEF too, since a
    /// singleton COPY class is not a state this table represents.
    fn reset(&mut self, t: TempIdx) {
        self.ensure(t);
        let i = t.0 as usize;
        if self.entries[i].state != TempState::Copy {
            self.entries[i] = TempEntry::undef(t);
            return;
        }
        let prev = self.entries[i].prev;
        let next = self.entries[i].next;
        if prev == t {
            self.entries[i] = TempEntry::undef(t);
            return;
        }
        if prev == next {
            self.entries[prev.0 as usize] = TempEntry::undef(prev);
        } else {
            self.entries[prev.0 as usize].next = next;
            self.entries[next.0 as usize].prev = prev;
        }
        self.entries[i] = TempEntry::undef(t);
    }

    fn set_const(&mut self, t: TempIdx, v: u64) {
        self.reset(t);
        self.entries[t.0 as usize] = TempEntry {
            state: TempState::Const(v),
            prev: t,
            next: t,
        };
    }

    /// `join_copy`: no-op beyond the initial reset when declared
    /// widths differ — the caller still emits the `mov`, it just
    /// isn't trusted for propagation.
    fn join_copy(&mut self, dst: TempIdx, src: TempIdx, dst_ty: Type, src_ty: Type) {
        self.ensure(dst);
        self.ensure(src);
        self.reset(dst);
        if dst_ty.size_bits() != src_ty.size_bits() {
            return;
        }
        let si = src.0 as usize;
        if self.entries[si].state != TempState::Copy {
            self.entries[si] = TempEntry {
                state: TempState::Copy,
                prev: src,
                next: src,
            };
        }
        let old_next = self.entries[si].next;
        self.entries[dst.0 as usize] = TempEntry {
            state: TempState::Copy,
            prev: src,
            next: old_next,
        };
        self.entries[si].next = dst;
        self.entries[old_next.0 as usize].prev = dst;
    }

    fn are_copies(&self, a: TempIdx, b: TempIdx) -> bool {
        if a == b {
            return true;
        }
        if self.state(a) != TempState::Copy || self.state(b) != TempState::Copy {
            return false;
        }
        let mut cur = self.entries[a.0 as usize].next;
        while cur != a {
            if cur == b {
                return true;
            }
            cur = self.entries[cur.0 as usize].next;
        }
        false
    }

    /// §4.C: pick the representative to substitute for a COPY-state
    /// use — prefer globals, then (for non-local temps) locals, to
    /// hoist references toward longer-lived storage.
    fn representative(&self, ctx: &Context, t: TempIdx) -> TempIdx {
        if is_global(ctx, t) {
            return t;
        }
        if self.state(t) != TempState::Copy {
            return t;
        }
        let mut cur = self.entries[t.0 as usize].next;
        while cur != t {
            if is_global(ctx, cur) {
                return cur;
            }
            cur = self.entries[cur.0 as usize].next;
        }
        if !is_local(ctx, t) {
            let mut cur = self.entries[t.0 as usize].next;
            while cur != t {
                if is_local(ctx, cur) {
                    return cur;
                }
                cur = self.entries[cur.0 as usize].next;
            }
        }
        t
    }

    fn reset_all(&mut self) {
        for (i, e) in self.entries.iter_mut().enumerate() {
            *e = TempEntry::undef(TempIdx(i as u32));
        }
    }

    fn reset_globals(&mut self, ctx: &Context) {
        for i in 0..ctx.nb_globals() {
            self.reset(TempIdx(i));
        }
    }
}

fn is_global(ctx: &Context, t: TempIdx) -> bool {
    t.0 < ctx.nb_globals()
}

fn is_local(ctx: &Context, t: TempIdx) -> bool {
    ctx.temp(t).kind == TempKind::Tb
}

/// Decode a carg-encoded Cond value.
fn cond_from_carg(t: TempIdx) -> Cond {
    match t.0 {
        0 => Cond::Never,
        1 => Cond::Always,
        8 => Cond::Eq,
        9 => Cond::Ne,
        10 => Cond::Lt,
        11 => Cond::Ge,
        12 => Cond::Le,
        13 => Cond::Gt,
        14 => Cond::Ltu,
        15 => Cond::Geu,
        16 => Cond::Leu,
        17 => Cond::Gtu,
        18 => Cond::TstEq,
        19 => Cond::TstNe,
        _ => Cond::Never,
    }
}

fn cond_to_carg(c: Cond) -> TempIdx {
    let v = match c {
        Cond::Never => 0,
        Cond::Always => 1,
        Cond::Eq => 8,
        Cond::Ne => 9,
        Cond::Lt => 10,
        Cond::Ge => 11,
        Cond::Le => 12,
        Cond::Gt => 13,
        Cond::Ltu => 14,
        Cond::Geu => 15,
        Cond::Leu => 16,
        Cond::Gtu => 17,
        Cond::TstEq => 18,
        Cond::TstNe => 19,
    };
    TempIdx(v)
}

/// Evaluate a comparison on two constant operands.
fn eval_cond(a: u64, b: u64, cond: Cond, ty: Type) -> bool {
    let mask = ty.mask();
    let a = a & mask;
    let b = b & mask;
    match cond {
        Cond::Always => true,
        Cond::Never => false,
        Cond::Eq => a == b,
        Cond::Ne => a != b,
        Cond::Lt => (a as i64) < (b as i64),
        Cond::Ge => (a as i64) >= (b as i64),
        Cond::Le => (a as i64) <= (b as i64),
        Cond::Gt => (a as i64) > (b as i64),
        Cond::Ltu => a < b,
        Cond::Geu => a >= b,
        Cond::Leu => a <= b,
        Cond::Gtu => a > b,
        Cond::TstEq => (a & b) == 0,
        Cond::TstNe => (a & b) != 0,
    }
}

/// Comparison folding: copy-equality and zero-RHS shortcuts apply
/// even when the operands aren't fully constant.
fn fold_cond(table: &Table, a: TempIdx, b: TempIdx, cond: Cond, ty: Type) -> Option<bool> {
    if table.are_copies(a, b) {
        match cond {
            Cond::Eq | Cond::Le | Cond::Ge | Cond::Leu | Cond::Geu => return Some(true),
            Cond::Ne | Cond::Lt | Cond::Gt | Cond::Ltu | Cond::Gtu => return Some(false),
            _ => {}
        }
    }
    if table.is_const(b) == Some(0) {
        match cond {
            Cond::Ltu => return Some(false),
            Cond::Geu => return Some(true),
            _ => {}
        }
    }
    if let (Some(av), Some(bv)) = (table.is_const(a), table.is_const(b)) {
        return Some(eval_cond(av, bv, cond, ty));
    }
    None
}

fn sign_extend(v: u64, n: u32, bits: u32) -> u64 {
    let shift = 64 - n;
    let signed = ((v << shift) as i64) >> shift;
    (signed as u64) & if bits == 32 { 0xFFFF_FFFF } else { u64::MAX }
}

/// Evaluate a binary fold family (§4.D) on two constants. Only
/// called for opcodes this function recognizes.
fn eval_binary(opc: Opcode, a: u64, b: u64, ty: Type) -> u64 {
    let mask = ty.mask();
    let bits = ty.size_bits();
    let r = match opc {
        Opcode::Add => a.wrapping_add(b),
        Opcode::Sub => a.wrapping_sub(b),
        Opcode::Mul => a.wrapping_mul(b),
        Opcode::And => a & b,
        Opcode::Or => a | b,
        Opcode::Xor => a ^ b,
        Opcode::AndC => a & !b,
        Opcode::OrC => a | !b,
        Opcode::Eqv => !(a ^ b),
        Opcode::Nand => !(a & b),
        Opcode::Nor => !(a | b),
        Opcode::Shl => {
            let sh = (b as u32) & (bits - 1);
            a.wrapping_shl(sh)
        }
        Opcode::Shr => {
            let sh = (b as u32) & (bits - 1);
            (a & mask).wrapping_shr(sh)
        }
        Opcode::Sar => {
            let sh = (b as u32) & (bits - 1);
            if ty == Type::I32 {
                ((a as u32 as i32) >> sh) as u64
            } else {
                ((a as i64) >> sh) as u64
            }
        }
        // Guarded explicitly: rotating by a computed zero shift must
        // return the input unchanged rather than fall into a host
        // rotate-by-zero edge case.
        Opcode::RotL => {
            let sh = (b as u32) & (bits - 1);
            if sh == 0 {
                a
            } else if ty == Type::I32 {
                (a as u32).rotate_left(sh) as u64
            } else {
                a.rotate_left(sh)
            }
        }
        Opcode::RotR => {
            let sh = (b as u32) & (bits - 1);
            if sh == 0 {
                a
            } else if ty == Type::I32 {
                (a as u32).rotate_right(sh) as u64
            } else {
                a.rotate_right(sh)
            }
        }
        _ => {
            tracing::error!(?opc, "eval_binary called with non-foldable opcode");
            panic!("eval_binary: no fold-table entry for {:?}", opc);
        }
    };
    r & mask
}

/// Main optimizer entry point: the single linear pass over the op
/// stream (§4.E).
pub fn optimize(ctx: &mut Context) {
    let mut table = Table::new(ctx.nb_temps() as usize);

    for t in ctx.temps() {
        if t.is_const() {
            table.set_const(t.idx, t.val);
        }
    }

    let num_ops = ctx.num_ops();
    for oi in 0..num_ops {
        let op_idx = OpIdx(oi as u32);

        substitute_inputs(ctx, &table, op_idx);

        let opc = ctx.op(op_idx).opc;
        let op_type = ctx.op(op_idx).op_type;
        let def = opc.def();

        if opc == Opcode::Call {
            process_call(ctx, &mut table, op_idx);
        } else if def.flags.contains(OpFlags::SIDE_EFFECTS)
            || def.flags.contains(OpFlags::VECTOR)
            || matches!(opc, Opcode::Nop | Opcode::InsnStart | Opcode::Discard)
        {
            invalidate_oargs(ctx, &mut table, op_idx);
        } else {
            dispatch_fold(ctx, &mut table, op_idx, opc, op_type);
        }

        // A branch that survives folding (or one we couldn't resolve)
        // still ends the basic block; a branch proven never-taken,
        // now a plain Nop, does not.
        if ctx.op(op_idx).opc.def().flags.contains(OpFlags::BB_END) {
            table.reset_all();
        }
    }
}

/// Phase 1: replace every COPY-state input with its representative.
fn substitute_inputs(ctx: &mut Context, table: &Table, op_idx: OpIdx) {
    let op = ctx.op(op_idx);
    let start = op.oargs().len();
    let end = start + op.iargs().len();
    let args = op.args;

    let mut updates: Vec<(usize, TempIdx)> = Vec::new();
    for slot in start..end {
        let a = args[slot];
        if table.state(a) == TempState::Copy {
            let rep = table.representative(ctx, a);
            if rep != a {
                updates.push((slot, rep));
            }
        }
    }
    if !updates.is_empty() {
        let op = ctx.op_mut(op_idx);
        for (slot, rep) in updates {
            op.args[slot] = rep;
        }
    }
}

fn invalidate_oargs(ctx: &mut Context, table: &mut Table, op_idx: OpIdx) {
    let op = ctx.op(op_idx);
    let n = op.oargs().len();
    let oargs: Vec<TempIdx> = op.args[..n].to_vec();
    for t in oargs {
        table.reset(t);
    }
}

/// Call: the declared outputs are unknown-arbitrary, and unless the
/// helper promises not to touch CPU state, every global must be
/// treated the same way.
fn process_call(ctx: &mut Context, table: &mut Table, op_idx: OpIdx) {
    let op = ctx.op(op_idx);
    let flags = op.call_flags;
    let n = op.oargs().len();
    let oargs: Vec<TempIdx> = op.args[..n].to_vec();
    for t in oargs {
        table.reset(t);
    }
    let safe = flags.contains(CallFlags::NO_READ_GLOBALS) && flags.contains(CallFlags::NO_WRITE_GLOBALS);
    if !safe {
        table.reset_globals(ctx);
    }
}

fn dispatch_fold(ctx: &mut Context, table: &mut Table, op_idx: OpIdx, opc: Opcode, ty: Type) {
    match opc {
        Opcode::Mov => fold_mov(ctx, table, op_idx, ty),
        Opcode::Not
        | Opcode::Neg
        | Opcode::Ext8s
        | Opcode::Ext8u
        | Opcode::Ext16s
        | Opcode::Ext16u
        | Opcode::Ext32s
        | Opcode::Ext32u => fold_unary(ctx, table, op_idx, opc, ty),
        Opcode::ExtI32I64 | Opcode::ExtUI32I64 | Opcode::ExtrlI64I32 | Opcode::ExtrhI64I32 => {
            fold_widen(ctx, table, op_idx, opc)
        }
        Opcode::Add
        | Opcode::Sub
        | Opcode::Mul
        | Opcode::And
        | Opcode::Or
        | Opcode::Xor
        | Opcode::AndC
        | Opcode::OrC
        | Opcode::Eqv
        | Opcode::Nand
        | Opcode::Nor
        | Opcode::Shl
        | Opcode::Shr
        | Opcode::Sar
        | Opcode::RotL
        | Opcode::RotR => {
            canonicalize_commutative(ctx, table, op_idx, opc);
            fold_binary(ctx, table, op_idx, opc, ty);
        }
        Opcode::Deposit => fold_deposit(ctx, table, op_idx, ty),
        Opcode::SetCond => {
            canonicalize_cmp_operands(ctx, table, op_idx, 1, 2, 3);
            fold_setcond(ctx, table, op_idx, ty);
        }
        Opcode::NegSetCond => {
            canonicalize_cmp_operands(ctx, table, op_idx, 1, 2, 3);
            fold_negsetcond(ctx, table, op_idx, ty);
        }
        Opcode::MovCond => {
            canonicalize_movcond(ctx, table, op_idx);
            fold_movcond(ctx, table, op_idx, ty);
        }
        Opcode::BrCond => {
            canonicalize_cmp_operands(ctx, table, op_idx, 0, 1, 2);
            fold_brcond(ctx, table, op_idx, ty);
        }
        Opcode::Add2 => {
            canonicalize_add2(ctx, table, op_idx);
            fold_add2(ctx, table, op_idx);
        }
        // sub2 is not commutative: no operand swap.
        Opcode::Sub2 => fold_sub2(ctx, table, op_idx),
        Opcode::MulU2 => {
            canonicalize_mulu2(ctx, table, op_idx);
            fold_mulu2(ctx, table, op_idx);
        }
        Opcode::BrCond2I32 => {
            canonicalize_brcond2(ctx, table, op_idx);
            fold_brcond2(ctx, table, op_idx);
        }
        Opcode::SetCond2I32 => {
            canonicalize_setcond2(ctx, table, op_idx);
            fold_setcond2(ctx, table, op_idx);
        }
        _ => invalidate_oargs(ctx, table, op_idx),
    }
}

// ---- Emission helpers ----

/// Rewrite the op in place to `mov dst, <fresh const temp for val>`
/// and record `set_const`. This is how `movi` is represented — there
/// is no distinct opcode for it.
fn emit_movi(ctx: &mut Context, table: &mut Table, op_idx: OpIdx, dst: TempIdx, val: u64, ty: Type) {
    let masked = val & ty.mask();
    let c = ctx.new_const(ty, masked);
    let op = ctx.op_mut(op_idx);
    op.opc = Opcode::Mov;
    op.op_type = ty;
    op.args[0] = dst;
    op.args[1] = c;
    op.nargs = 2;
    table.set_const(c, masked);
    table.set_const(dst, masked);
}

/// `mov dst, src` — NOP if already copy-equal, `movi` if `src` is
/// constant, otherwise a real mov recording `join_copy`.
fn emit_mov_or_nop(ctx: &mut Context, table: &mut Table, op_idx: OpIdx, dst: TempIdx, src: TempIdx, ty: Type) {
    if table.are_copies(dst, src) {
        let op = ctx.op_mut(op_idx);
        op.opc = Opcode::Nop;
        op.nargs = 0;
        return;
    }
    if let Some(v) = table.is_const(src) {
        emit_movi(ctx, table, op_idx, dst, v, ty);
        return;
    }
    let op = ctx.op_mut(op_idx);
    op.opc = Opcode::Mov;
    op.op_type = ty;
    op.args[0] = dst;
    op.args[1] = src;
    op.nargs = 2;
    table.join_copy(dst, src, ctx.temp(dst).ty, ctx.temp(src).ty);
}

/// Split a folded 64-bit double-word result into its low/high
/// `movi_i32` halves. The second half reuses the NOP slot the
/// front-end is required to have reserved immediately after.
fn emit_double_movi(ctx: &mut Context, table: &mut Table, op_idx: OpIdx, lo_dst: TempIdx, hi_dst: TempIdx, composed: u64) {
    let lo = composed & 0xFFFF_FFFF;
    let hi = (composed >> 32) & 0xFFFF_FFFF;
    emit_movi(ctx, table, op_idx, lo_dst, lo, Type::I32);
    let next_idx = OpIdx(op_idx.0 + 1);
    assert!(
        (next_idx.0 as usize) < ctx.num_ops() && ctx.op(next_idx).opc == Opcode::Nop,
        "double-word fold at op {} requires a reserved NOP slot immediately after",
        op_idx.0
    );
    emit_movi(ctx, table, next_idx, hi_dst, hi, Type::I32);
}

// ---- Phase 2: commutativity canonicalization ----

fn canonicalize_commutative(ctx: &mut Context, table: &Table, op_idx: OpIdx, opc: Opcode) {
    if !matches!(
        opc,
        Opcode::Add | Opcode::Mul | Opcode::And | Opcode::Or | Opcode::Xor | Opcode::Eqv | Opcode::Nand | Opcode::Nor
    ) {
        return;
    }
    let args = ctx.op(op_idx).args;
    let dst = args[0];
    let a = args[1];
    let b = args[2];
    let a_const = table.is_const(a).is_some();
    let b_const = table.is_const(b).is_some();
    let want_swap = if a_const && !b_const {
        true
    } else if !(a_const ^ b_const) {
        // Tie: prefer destination aliasing the left operand.
        b == dst && a != dst
    } else {
        false
    };
    if want_swap {
        ctx.op_mut(op_idx).args.swap(1, 2);
    }
}

fn canonicalize_cmp_operands(ctx: &mut Context, table: &Table, op_idx: OpIdx, a_slot: usize, b_slot: usize, cond_slot: usize) {
    let args = ctx.op(op_idx).args;
    let a = args[a_slot];
    let b = args[b_slot];
    if table.is_const(a).is_some() && table.is_const(b).is_none() {
        let cond = cond_from_carg(args[cond_slot]);
        let op = ctx.op_mut(op_idx);
        op.args.swap(a_slot, b_slot);
        op.args[cond_slot] = cond_to_carg(cond.swap());
    }
}

fn canonicalize_movcond(ctx: &mut Context, table: &Table, op_idx: OpIdx) {
    canonicalize_cmp_operands(ctx, table, op_idx, 1, 2, 5);
    let args = ctx.op(op_idx).args;
    let dst = args[0];
    let vt = args[3];
    let vf = args[4];
    if vt == dst && vf != dst {
        let cond = cond_from_carg(args[5]);
        let op = ctx.op_mut(op_idx);
        op.args.swap(3, 4);
        op.args[5] = cond_to_carg(cond.invert());
    }
}

fn canonicalize_add2(ctx: &mut Context, table: &Table, op_idx: OpIdx) {
    let args = ctx.op(op_idx).args;
    let a_const = table.is_const(args[2]).is_some() && table.is_const(args[3]).is_some();
    let b_const = table.is_const(args[4]).is_some() && table.is_const(args[5]).is_some();
    if a_const && !b_const {
        let op = ctx.op_mut(op_idx);
        op.args.swap(2, 4);
        op.args.swap(3, 5);
    }
}

fn canonicalize_mulu2(ctx: &mut Context, table: &Table, op_idx: OpIdx) {
    let args = ctx.op(op_idx).args;
    let a_const = table.is_const(args[2]).is_some();
    let b_const = table.is_const(args[3]).is_some();
    if a_const && !b_const {
        ctx.op_mut(op_idx).args.swap(2, 3);
    }
}

/// `brcond2_i32 al,ah,bl,bh,cond,label` — joint swap of the two operand
/// pairs when only the (a) side is a full constant, mirroring
/// `canonicalize_add2`; the condition itself must also flip.
fn canonicalize_brcond2(ctx: &mut Context, table: &Table, op_idx: OpIdx) {
    let args = ctx.op(op_idx).args;
    let (al, ah, bl, bh) = (args[0], args[1], args[2], args[3]);
    let a_const = table.is_const(al).is_some() && table.is_const(ah).is_some();
    let b_const = table.is_const(bl).is_some() && table.is_const(bh).is_some();
    if a_const && !b_const {
        let cond = cond_from_carg(args[4]);
        let op = ctx.op_mut(op_idx);
        op.args.swap(0, 2);
        op.args.swap(1, 3);
        op.args[4] = cond_to_carg(cond.swap());
    }
}

fn canonicalize_setcond2(ctx: &mut Context, table: &Table, op_idx: OpIdx) {
    let args = ctx.op(op_idx).args;
    let (al, ah, bl, bh) = (args[1], args[2], args[3], args[4]);
    let a_const = table.is_const(al).is_some() && table.is_const(ah).is_some();
    let b_const = table.is_const(bl).is_some() && table.is_const(bh).is_some();
    if a_const && !b_const {
        let cond = cond_from_carg(args[5]);
        let op = ctx.op_mut(op_idx);
        op.args.swap(1, 3);
        op.args.swap(2, 4);
        op.args[5] = cond_to_carg(cond.swap());
    }
}

// ---- Phase 3/4: per-opcode simplification and folding ----

fn fold_mov(ctx: &mut Context, table: &mut Table, op_idx: OpIdx, ty: Type) {
    let args = ctx.op(op_idx).args;
    emit_mov_or_nop(ctx, table, op_idx, args[0], args[1], ty);
}

fn fold_unary(ctx: &mut Context, table: &mut Table, op_idx: OpIdx, opc: Opcode, ty: Type) {
    let args = ctx.op(op_idx).args;
    let dst = args[0];
    let src = args[1];
    if let Some(v) = table.is_const(src) {
        let mask = ty.mask();
        let bits = ty.size_bits();
        let val = match opc {
            Opcode::Not => (!v) & mask,
            Opcode::Neg => 0u64.wrapping_sub(v) & mask,
            Opcode::Ext8s => sign_extend(v, 8, bits),
            Opcode::Ext8u => v & 0xFF,
            Opcode::Ext16s => sign_extend(v, 16, bits),
            Opcode::Ext16u => v & 0xFFFF,
            Opcode::Ext32s => sign_extend(v, 32, bits),
            Opcode::Ext32u => v & 0xFFFF_FFFF,
            _ => {
                tracing::error!(?opc, op = op_idx.0, "fold_unary called with non-foldable opcode");
                panic!("fold_unary: no fold-table entry for {:?}", opc);
            }
        };
        emit_movi(ctx, table, op_idx, dst, val, ty);
    } else {
        table.reset(dst);
    }
}

/// The widening 32<->64 conversions — output width differs from the
/// op's own declared type, so they're kept distinct from `fold_unary`.
fn fold_widen(ctx: &mut Context, table: &mut Table, op_idx: OpIdx, opc: Opcode) {
    let args = ctx.op(op_idx).args;
    let dst = args[0];
    let src = args[1];
    if let Some(v) = table.is_const(src) {
        let (val, out_ty) = match opc {
            Opcode::ExtI32I64 => ((v as u32 as i32 as i64) as u64, Type::I64),
            Opcode::ExtUI32I64 => (v & 0xFFFF_FFFF, Type::I64),
            Opcode::ExtrlI64I32 => (v & 0xFFFF_FFFF, Type::I32),
            Opcode::ExtrhI64I32 => ((v >> 32) & 0xFFFF_FFFF, Type::I32),
            _ => {
                tracing::error!(?opc, op = op_idx.0, "fold_widen called with non-foldable opcode");
                panic!("fold_widen: no fold-table entry for {:?}", opc);
            }
        };
        emit_movi(ctx, table, op_idx, dst, val, out_ty);
    } else {
        table.reset(dst);
    }
}

fn fold_binary(ctx: &mut Context, table: &mut Table, op_idx: OpIdx, opc: Opcode, ty: Type) {
    let args = ctx.op(op_idx).args;
    let dst = args[0];
    let a = args[1];
    let b = args[2];
    let mask = ty.mask();

    if matches!(opc, Opcode::Shl | Opcode::Shr | Opcode::Sar | Opcode::RotL | Opcode::RotR)
        && table.is_const(a) == Some(0)
    {
        emit_movi(ctx, table, op_idx, dst, 0, ty);
        return;
    }
    if matches!(
        opc,
        Opcode::Add | Opcode::Sub | Opcode::Shl | Opcode::Shr | Opcode::Sar | Opcode::RotL | Opcode::RotR | Opcode::Or | Opcode::Xor
    ) && table.is_const(b) == Some(0)
    {
        emit_mov_or_nop(ctx, table, op_idx, dst, a, ty);
        return;
    }
    if matches!(opc, Opcode::And | Opcode::Mul) && table.is_const(b) == Some(0) {
        emit_movi(ctx, table, op_idx, dst, 0, ty);
        return;
    }
    if table.are_copies(a, b) {
        match opc {
            Opcode::Or | Opcode::And => {
                emit_mov_or_nop(ctx, table, op_idx, dst, a, ty);
                return;
            }
            Opcode::Sub | Opcode::Xor => {
                emit_movi(ctx, table, op_idx, dst, 0, ty);
                return;
            }
            _ => {}
        }
    }

    if let (Some(av), Some(bv)) = (table.is_const(a), table.is_const(b)) {
        let r = eval_binary(opc, av & mask, bv & mask, ty);
        emit_movi(ctx, table, op_idx, dst, r, ty);
        return;
    }

    table.reset(dst);
}

fn fold_deposit(ctx: &mut Context, table: &mut Table, op_idx: OpIdx, ty: Type) {
    let args = ctx.op(op_idx).args;
    let dst = args[0];
    let base = args[1];
    let value = args[2];
    let pos = args[3].0 as u64;
    let len = args[4].0 as u64;
    if let (Some(bv), Some(vv)) = (table.is_const(base), table.is_const(value)) {
        let fmask = if len >= 64 { u64::MAX } else { (1u64 << len) - 1 };
        let inserted = (vv & fmask) << pos;
        let cleared = bv & !(fmask << pos);
        emit_movi(ctx, table, op_idx, dst, (cleared | inserted) & ty.mask(), ty);
    } else {
        table.reset(dst);
    }
}

fn fold_setcond(ctx: &mut Context, table: &mut Table, op_idx: OpIdx, ty: Type) {
    let args = ctx.op(op_idx).args;
    let dst = args[0];
    let cond = cond_from_carg(args[3]);
    if let Some(result) = fold_cond(table, args[1], args[2], cond, ty) {
        emit_movi(ctx, table, op_idx, dst, if result { 1 } else { 0 }, ty);
    } else {
        table.reset(dst);
    }
}

fn fold_negsetcond(ctx: &mut Context, table: &mut Table, op_idx: OpIdx, ty: Type) {
    let args = ctx.op(op_idx).args;
    let dst = args[0];
    let cond = cond_from_carg(args[3]);
    if let Some(result) = fold_cond(table, args[1], args[2], cond, ty) {
        emit_movi(ctx, table, op_idx, dst, if result { ty.mask() } else { 0 }, ty);
    } else {
        table.reset(dst);
    }
}

fn fold_movcond(ctx: &mut Context, table: &mut Table, op_idx: OpIdx, ty: Type) {
    let args = ctx.op(op_idx).args;
    let dst = args[0];
    let cond = cond_from_carg(args[5]);
    if let Some(result) = fold_cond(table, args[1], args[2], cond, ty) {
        let v = if result { args[3] } else { args[4] };
        emit_mov_or_nop(ctx, table, op_idx, dst, v, ty);
    } else {
        table.reset(dst);
    }
}

fn fold_brcond(ctx: &mut Context, table: &mut Table, op_idx: OpIdx, ty: Type) {
    let args = ctx.op(op_idx).args;
    let cond = cond_from_carg(args[2]);
    let label = args[3];
    if let Some(result) = fold_cond(table, args[0], args[1], cond, ty) {
        apply_brcond_result(ctx, op_idx, result, label);
    }
    // Unresolved: op stays BrCond; the driver's BB_END reset still fires.
}

fn apply_brcond_result(ctx: &mut Context, op_idx: OpIdx, taken: bool, label: TempIdx) {
    let op = ctx.op_mut(op_idx);
    if taken {
        op.opc = Opcode::Br;
        op.args[0] = label;
        op.nargs = 1;
    } else {
        op.opc = Opcode::Nop;
        op.nargs = 0;
    }
}

fn compose64(lo: u64, hi: u64) -> u64 {
    ((hi & 0xFFFF_FFFF) << 32) | (lo & 0xFFFF_FFFF)
}

fn fold_add2(ctx: &mut Context, table: &mut Table, op_idx: OpIdx) {
    let args = ctx.op(op_idx).args;
    let (rl, rh) = (args[0], args[1]);
    let (al, ah, bl, bh) = (args[2], args[3], args[4], args[5]);
    if let (Some(alv), Some(ahv), Some(blv), Some(bhv)) =
        (table.is_const(al), table.is_const(ah), table.is_const(bl), table.is_const(bh))
    {
        let sum = compose64(alv, ahv).wrapping_add(compose64(blv, bhv));
        emit_double_movi(ctx, table, op_idx, rl, rh, sum);
    } else {
        table.reset(rl);
        table.reset(rh);
    }
}

fn fold_sub2(ctx: &mut Context, table: &mut Table, op_idx: OpIdx) {
    let args = ctx.op(op_idx).args;
    let (rl, rh) = (args[0], args[1]);
    let (al, ah, bl, bh) = (args[2], args[3], args[4], args[5]);
    if let (Some(alv), Some(ahv), Some(blv), Some(bhv)) =
        (table.is_const(al), table.is_const(ah), table.is_const(bl), table.is_const(bh))
    {
        let diff = compose64(alv, ahv).wrapping_sub(compose64(blv, bhv));
        emit_double_movi(ctx, table, op_idx, rl, rh, diff);
    } else {
        table.reset(rl);
        table.reset(rh);
    }
}

fn fold_mulu2(ctx: &mut Context, table: &mut Table, op_idx: OpIdx) {
    let args = ctx.op(op_idx).args;
    let (rl, rh) = (args[0], args[1]);
    let (a, b) = (args[2], args[3]);
    if let (Some(av), Some(bv)) = (table.is_const(a), table.is_const(b)) {
        let product = (av & 0xFFFF_FFFF).wrapping_mul(bv & 0xFFFF_FFFF);
        emit_double_movi(ctx, table, op_idx, rl, rh, product);
    } else {
        table.reset(rl);
        table.reset(rh);
    }
}

/// `LT`/`GE` against a zero RHS depends only on the sign bit of the
/// composed value — equivalently, the sign bit of the high word —
/// so these collapse to a single-word compare that doesn't need `al`.
fn fold_brcond2(ctx: &mut Context, table: &mut Table, op_idx: OpIdx) {
    let args = ctx.op(op_idx).args;
    let (al, ah, bl, bh) = (args[0], args[1], args[2], args[3]);
    let cond = cond_from_carg(args[4]);
    let label = args[5];

    if matches!(cond, Cond::Lt | Cond::Ge) && table.is_const(bl) == Some(0) && table.is_const(bh) == Some(0) {
        let op = ctx.op_mut(op_idx);
        op.opc = Opcode::BrCond;
        op.op_type = Type::I32;
        op.args[0] = ah;
        op.args[1] = bh;
        op.args[2] = cond_to_carg(cond);
        op.args[3] = label;
        op.nargs = 4;
        fold_brcond(ctx, table, op_idx, Type::I32);
        return;
    }

    if table.is_const(bl) == Some(0) && table.is_const(bh) == Some(0) {
        let shortcut = match cond {
            Cond::Ltu => Some(false),
            Cond::Geu => Some(true),
            _ => None,
        };
        if let Some(result) = shortcut {
            apply_brcond_result(ctx, op_idx, result, label);
            return;
        }
    }

    if let (Some(alv), Some(ahv), Some(blv), Some(bhv)) =
        (table.is_const(al), table.is_const(ah), table.is_const(bl), table.is_const(bh))
    {
        let result = eval_cond(compose64(alv, ahv), compose64(blv, bhv), cond, Type::I64);
        apply_brcond_result(ctx, op_idx, result, label);
    }
}

fn fold_setcond2(ctx: &mut Context, table: &mut Table, op_idx: OpIdx) {
    let args = ctx.op(op_idx).args;
    let dst = args[0];
    let (al, ah, bl, bh) = (args[1], args[2], args[3], args[4]);
    let cond = cond_from_carg(args[5]);

    if matches!(cond, Cond::Lt | Cond::Ge) && table.is_const(bl) == Some(0) && table.is_const(bh) == Some(0) {
        let op = ctx.op_mut(op_idx);
        op.opc = Opcode::SetCond;
        op.op_type = Type::I32;
        op.args[0] = dst;
        op.args[1] = ah;
        op.args[2] = bh;
        op.args[3] = cond_to_carg(cond);
        op.nargs = 4;
        fold_setcond(ctx, table, op_idx, Type::I32);
        return;
    }

    if table.is_const(bl) == Some(0) && table.is_const(bh) == Some(0) {
        let shortcut = match cond {
            Cond::Ltu => Some(false),
            Cond::Geu => Some(true),
            _ => None,
        };
        if let Some(result) = shortcut {
            emit_movi(ctx, table, op_idx, dst, if result { 1 } else { 0 }, Type::I32);
            return;
        }
    }

    if let (Some(alv), Some(ahv), Some(blv), Some(bhv)) =
        (table.is_const(al), table.is_const(ah), table.is_const(bl), table.is_const(bh))
    {
        let result = eval_cond(compose64(alv, ahv), compose64(blv, bhv), cond, Type::I64);
        emit_movi(ctx, table, op_idx, dst, if result { 1 } else { 0 }, Type::I32);
        return;
    }

    table.reset(dst);
}
