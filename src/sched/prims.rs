//! Suspension primitives, registered as host functions under the
//! `weft/strand` owner.
//!
//! Every primitive follows the restore-aware protocol: consume the resume
//! token first (true exactly once, on the re-execution after a resume),
//! then decide to complete or suspend. A primitive invoked beneath an
//! unwoven frame must not request a cooperative suspension (the chain
//! could not save itself) and instead blocks the carrier thread: the
//! degraded fallback of an analyzer false-negative, correct but costing a
//! carrier.
//!
//! Waiting loops live in the woven code's re-execution cycle: a wake
//! re-enters the primitive, which re-checks its condition and either
//! returns or parks again. Spurious wakeups are therefore harmless.

use std::time::{Duration, Instant};

use crate::error::{Result, WeftError};
use crate::names::MethodSig;
use crate::proc::{ValueKind, STRAND_OWNER};
use crate::rt::{HostCtx, RtEnv, SuspendReason, Value};
use crate::sched::strand::Strand;

pub const PARK_NAME: &str = "park";
pub const SLEEP_NAME: &str = "sleep";
pub const YIELD_NAME: &str = "yield";
pub const JOIN_NAME: &str = "join";
pub const JOIN_TIMEOUT_NAME: &str = "join_timeout";
pub const INTERRUPTED_NAME: &str = "interrupted";

/// Register all primitives into an environment's host registry.
///
/// [`Scheduler::new`](crate::sched::Scheduler::new) does this
/// automatically; call it directly when driving continuations by hand.
pub fn register(env: &mut RtEnv) {
    let park = env
        .module
        .names
        .method(STRAND_OWNER, PARK_NAME, MethodSig::void());
    let sleep = env.module.names.method(
        STRAND_OWNER,
        SLEEP_NAME,
        MethodSig::new(vec![ValueKind::Long], None),
    );
    let yield_ = env
        .module
        .names
        .method(STRAND_OWNER, YIELD_NAME, MethodSig::void());
    let join = env.module.names.method(
        STRAND_OWNER,
        JOIN_NAME,
        MethodSig::new(vec![ValueKind::Ref], None),
    );
    let join_timeout = env.module.names.method(
        STRAND_OWNER,
        JOIN_TIMEOUT_NAME,
        MethodSig::new(vec![ValueKind::Ref, ValueKind::Long], Some(ValueKind::Int)),
    );
    let interrupted = env.module.names.method(
        STRAND_OWNER,
        INTERRUPTED_NAME,
        MethodSig::new(vec![], Some(ValueKind::Int)),
    );

    env.hosts.register(park, prim_park);
    env.hosts.register(sleep, prim_sleep);
    env.hosts.register(yield_, prim_yield);
    env.hosts.register(join, prim_join);
    env.hosts.register(join_timeout, prim_join_timeout);
    env.hosts.register(interrupted, prim_interrupted);
}

fn prim_park(ctx: &mut HostCtx<'_>, _args: &[Value]) -> Result<Option<Value>> {
    if ctx.take_resumed() {
        return Ok(None);
    }
    if ctx.chain_woven {
        ctx.request_suspend(SuspendReason::Park);
    } else if let Some(strand) = ctx.strand {
        strand.block_park(None);
    }
    Ok(None)
}

fn prim_sleep(ctx: &mut HostCtx<'_>, args: &[Value]) -> Result<Option<Value>> {
    if ctx.take_resumed() {
        return Ok(None);
    }
    let millis = args
        .first()
        .ok_or(WeftError::StackUnderflow { at: 0 })?
        .as_long()?;
    let dur = Duration::from_millis(millis.max(0) as u64);
    if ctx.chain_woven {
        ctx.request_suspend(SuspendReason::TimedPark(dur));
    } else {
        match ctx.strand {
            Some(strand) => strand.block_park(Some(dur)),
            None => std::thread::sleep(dur),
        }
    }
    Ok(None)
}

fn prim_yield(ctx: &mut HostCtx<'_>, _args: &[Value]) -> Result<Option<Value>> {
    if ctx.take_resumed() {
        return Ok(None);
    }
    if ctx.chain_woven {
        ctx.request_suspend(SuspendReason::Yield);
    } else {
        std::thread::yield_now();
    }
    Ok(None)
}

fn prim_join(ctx: &mut HostCtx<'_>, args: &[Value]) -> Result<Option<Value>> {
    let target = strand_arg(args, 0)?;
    let _ = ctx.take_resumed();

    if target.is_terminated() {
        return Ok(None);
    }
    let me = match ctx.strand {
        Some(s) => s.clone(),
        None => {
            // Not on a strand: plain blocking join.
            target.wait_terminated(None);
            return Ok(None);
        }
    };
    // The wait observes the caller's interrupted flag and gives up.
    if me.is_interrupted() {
        return Ok(None);
    }

    if ctx.chain_woven {
        target.push_waiter(me);
        // Termination may have drained the list while we registered.
        if target.is_terminated() {
            return Ok(None);
        }
        ctx.request_suspend(SuspendReason::Park);
        Ok(None)
    } else {
        while !target.is_terminated() && !me.is_interrupted() {
            me.block_park(None);
        }
        Ok(None)
    }
}

fn join_done(me: Option<&Strand>, hit: bool) -> Result<Option<Value>> {
    if let Some(me) = me {
        me.clear_join_deadline();
    }
    Ok(Some(Value::Int(hit as i32)))
}

fn prim_join_timeout(ctx: &mut HostCtx<'_>, args: &[Value]) -> Result<Option<Value>> {
    let target = strand_arg(args, 0)?;
    let resumed = ctx.take_resumed();

    if target.is_terminated() {
        return join_done(ctx.strand, true);
    }
    let me = match ctx.strand {
        Some(s) => s.clone(),
        None => {
            let millis = args.get(1).ok_or(WeftError::StackUnderflow { at: 0 })?.as_long()?;
            let hit = target.wait_terminated(Some(Duration::from_millis(millis.max(0) as u64)));
            return Ok(Some(Value::Int(hit as i32)));
        }
    };
    if me.is_interrupted() {
        return join_done(Some(&me), false);
    }

    // The deadline survives suspensions in a per-strand slot; only one
    // timed wait is ever in flight per strand.
    let deadline = if resumed {
        me.join_deadline().unwrap_or_else(Instant::now)
    } else {
        let millis = args.get(1).ok_or(WeftError::StackUnderflow { at: 0 })?.as_long()?;
        let d = Instant::now() + Duration::from_millis(millis.max(0) as u64);
        me.set_join_deadline(d);
        d
    };

    let now = Instant::now();
    if now >= deadline {
        return join_done(Some(&me), false);
    }

    if ctx.chain_woven {
        target.push_waiter(me.clone());
        if target.is_terminated() {
            return join_done(Some(&me), true);
        }
        ctx.request_suspend(SuspendReason::TimedPark(deadline - now));
        // Placeholder; the unwind discards it.
        Ok(Some(Value::Int(0)))
    } else {
        while !target.is_terminated() && !me.is_interrupted() && Instant::now() < deadline {
            let left = deadline.saturating_duration_since(Instant::now());
            me.block_park(Some(left));
        }
        join_done(Some(&me), target.is_terminated())
    }
}

fn prim_interrupted(ctx: &mut HostCtx<'_>, _args: &[Value]) -> Result<Option<Value>> {
    let flag = ctx.strand.map(|s| s.is_interrupted()).unwrap_or(false);
    Ok(Some(Value::Int(flag as i32)))
}

fn strand_arg(args: &[Value], at: usize) -> Result<Strand> {
    let obj = args
        .get(at)
        .ok_or(WeftError::StackUnderflow { at })?
        .as_obj(at)?;
    obj.native_as::<Strand>()
        .cloned()
        .ok_or_else(|| WeftError::kind_mismatch("strand handle", "object"))
}
