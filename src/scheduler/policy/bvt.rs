/*!
 * BVT Policy
 *
 * Borrowed virtual time: every thread accrues actual virtual time (AVT) at
 * a rate inversely proportional to its weight, and the runqueue is ordered
 * by effective virtual time (EVT). A warped thread borrows against its
 * future by running with EVT = AVT - warp for a bounded episode, followed
 * by a cooldown during which it cannot warp again.
 *
 * Virtual time is kept in fixed point: a weight-1 thread running for one
 * minimum charging unit (MCU) gains `BVT_VT_SCALE`.
 */

use super::super::traits::{PolicyCtx, SchedPolicy};
use super::super::types::{SchedParams, SchedulerKind};
use super::SchedData;
use crate::core::types::{ThreadId, Ticks};
use crate::thread::ThreadObject;
use serde::Serialize;
use tracing::{debug, trace};

/// Virtual time gained per MCU by a weight-1 thread
pub const BVT_VT_SCALE: i64 = 256;

/// Per-thread BVT data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BvtData {
    pub weight: u8,
    /// Actual virtual time
    pub avt: i64,
    /// Effective virtual time, the runqueue key
    pub evt: i64,
    /// Charged time not yet converted into AVT
    residual: u64,
    /// EVT reduction while warped, in virtual time
    pub warp_value: i64,
    /// Longest warp episode, in MCUs
    pub warp_limit: u32,
    /// Cooldown after an episode, in MCUs
    pub unwarp_period: u32,
    pub warp_on: bool,
    pub warp_start: Ticks,
    warp_used: Ticks,
    /// No new warp before this time
    pub unwarp_until: Ticks,
    /// Ticks left before the running thread is preempted
    pub run_countdown: u64,
    /// Last time the thread was charged or dispatched
    pub start: Ticks,
}

impl BvtData {
    fn new(params: &SchedParams, avt: i64) -> Self {
        Self {
            weight: params.bvt_weight.max(1),
            avt,
            evt: avt,
            residual: 0,
            warp_value: i64::from(params.bvt_warp_value) * BVT_VT_SCALE,
            warp_limit: params.bvt_warp_limit,
            unwarp_period: params.bvt_unwarp_period,
            warp_on: false,
            warp_start: 0,
            warp_used: 0,
            unwarp_until: 0,
            run_countdown: 0,
            start: 0,
        }
    }

    #[inline]
    pub fn can_warp(&self) -> bool {
        self.warp_value > 0 && self.warp_limit > 0
    }

    #[inline(always)]
    fn refresh_evt(&mut self) {
        self.evt = if self.warp_on {
            self.avt - self.warp_value
        } else {
            self.avt
        };
    }

    fn end_warp(&mut self, now: Ticks, mcu: Ticks) {
        self.warp_on = false;
        self.warp_used = 0;
        self.unwarp_until = now.saturating_add(u64::from(self.unwarp_period) * mcu);
        self.refresh_evt();
    }

    /// Convert the time since `start` into AVT and warp budget
    fn charge(&mut self, now: Ticks, mcu: Ticks) {
        let elapsed = now.saturating_sub(self.start);
        self.start = now;
        if elapsed == 0 {
            return;
        }

        let divisor = u128::from(self.weight) * u128::from(mcu);
        let total = u128::from(elapsed) * BVT_VT_SCALE as u128 + u128::from(self.residual);
        self.avt += (total / divisor) as i64;
        self.residual = (total % divisor) as u64;

        if self.warp_on {
            self.warp_used += elapsed;
            if self.warp_used >= u64::from(self.warp_limit) * mcu {
                self.end_warp(now, mcu);
                return;
            }
        }
        self.refresh_evt();
    }

    /// MCUs of warp budget left in the current episode
    fn warp_remaining(&self, mcu: Ticks) -> u64 {
        let budget = u64::from(self.warp_limit) * mcu;
        budget.saturating_sub(self.warp_used).div_ceil(mcu).max(1)
    }
}

#[derive(Debug, Clone, Copy)]
struct BvtEntry {
    id: ThreadId,
    avt: i64,
    evt: i64,
}

/// EVT-ordered runqueue of one CPU
///
/// The running thread stays queued; ties keep FIFO order.
#[derive(Debug)]
pub struct BvtSched {
    runqueue: Vec<BvtEntry>,
    /// Scheduler virtual time, the minimum AVT seen at the last pick
    svt: i64,
    mcu: Ticks,
    csa_mcu: u64,
}

impl BvtSched {
    pub fn new(mcu: Ticks, csa_mcu: u64) -> Self {
        Self {
            runqueue: Vec::new(),
            svt: 0,
            mcu: mcu.max(1),
            csa_mcu,
        }
    }

    /// Length of one charging unit in clock ticks
    #[inline]
    pub fn mcu(&self) -> Ticks {
        self.mcu
    }

    #[inline]
    pub fn svt(&self) -> i64 {
        self.svt
    }

    #[inline]
    fn position(&self, id: ThreadId) -> Option<usize> {
        self.runqueue.iter().position(|entry| entry.id == id)
    }

    fn remove(&mut self, id: ThreadId) -> bool {
        match self.position(id) {
            Some(pos) => {
                self.runqueue.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Place `id` behind every entry with an EVT not above its own
    fn insert(&mut self, id: ThreadId, avt: i64, evt: i64) {
        self.remove(id);
        let pos = self.runqueue.partition_point(|entry| entry.evt <= evt);
        self.runqueue.insert(pos, BvtEntry { id, avt, evt });
    }

    /// Reposition `id` only if it is already queued
    fn requeue(&mut self, id: ThreadId, avt: i64, evt: i64) {
        if self.position(id).is_some() {
            self.insert(id, avt, evt);
        }
    }

    fn min_avt(&self) -> Option<i64> {
        self.runqueue.iter().map(|entry| entry.avt).min()
    }

    /// Charge the running thread for the time since its last accounting
    fn charge_current(&mut self, ctx: &PolicyCtx<'_>) {
        if let Some(cur) = ctx.current_non_idle() {
            let (avt, evt) = {
                let mut data = cur.data();
                let bvt = data.bvt_mut();
                bvt.charge(ctx.now, self.mcu);
                (bvt.avt, bvt.evt)
            };
            self.requeue(cur.id(), avt, evt);
        }
    }

    /// Ticks `id` may run before the best other thread becomes preferable
    fn countdown(&self, id: ThreadId, evt: i64, weight: u8) -> u64 {
        match self.runqueue.iter().find(|entry| entry.id != id) {
            None => u64::MAX,
            Some(runner_up) => {
                let gap = (runner_up.evt - evt).max(0) as u64;
                gap.saturating_mul(u64::from(weight)) / BVT_VT_SCALE as u64 + self.csa_mcu
            }
        }
    }

    /// Start a run of `obj` at `now`: reset its accounting and countdown
    fn start_run(&self, obj: &ThreadObject, now: Ticks) -> u64 {
        let mut data = obj.data();
        let bvt = data.bvt_mut();
        let mut countdown = self.countdown(obj.id(), bvt.evt, bvt.weight);
        if bvt.warp_on {
            countdown = countdown.min(bvt.warp_remaining(self.mcu));
        }
        bvt.run_countdown = countdown;
        bvt.start = now;
        countdown
    }
}

impl SchedPolicy for BvtSched {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Bvt
    }

    fn init(&mut self, ctx: &PolicyCtx<'_>) {
        ctx.platform.arm_tick(ctx.pcpu_id, self.mcu);
    }

    fn init_data(&mut self, _obj: &ThreadObject, params: &SchedParams) -> SchedData {
        let avt = self.min_avt().unwrap_or(self.svt);
        SchedData::Bvt(BvtData::new(params, avt))
    }

    fn pick_next(&mut self, ctx: &PolicyCtx<'_>) -> Option<ThreadId> {
        self.charge_current(ctx);
        if let Some(min) = self.min_avt() {
            self.svt = min;
        }

        let head = *self.runqueue.first()?;
        let next = ctx.threads.get(head.id);
        let countdown = self.start_run(next, ctx.now);

        trace!(
            pcpu = ctx.pcpu_id,
            thread = %next,
            evt = head.evt,
            svt = self.svt,
            countdown,
            "bvt pick"
        );
        Some(head.id)
    }

    fn dispatched(&mut self, obj: &ThreadObject, ctx: &PolicyCtx<'_>) {
        self.charge_current(ctx);
        if let Some(min) = self.min_avt() {
            self.svt = min;
        }
        if !obj.is_idle() {
            let countdown = self.start_run(obj, ctx.now);
            trace!(pcpu = ctx.pcpu_id, thread = %obj, countdown, "bvt direct dispatch");
        }
    }

    fn sleep(&mut self, obj: &ThreadObject, ctx: &PolicyCtx<'_>) {
        self.remove(obj.id());
        let mut data = obj.data();
        let bvt = data.bvt_mut();
        if bvt.warp_on {
            bvt.end_warp(ctx.now, self.mcu);
        }
    }

    fn wake(&mut self, obj: &ThreadObject, _ctx: &PolicyCtx<'_>) -> bool {
        let svt = self.min_avt().unwrap_or(self.svt);
        let (avt, evt) = {
            let mut data = obj.data();
            let bvt = data.bvt_mut();
            bvt.avt = bvt.avt.max(svt);
            bvt.refresh_evt();
            (bvt.avt, bvt.evt)
        };
        self.insert(obj.id(), avt, evt);
        true
    }

    fn yield_current(&mut self, ctx: &PolicyCtx<'_>) {
        // Charging requeues behind every peer with an equal EVT
        self.charge_current(ctx);
    }

    fn prioritize(&mut self, obj: &ThreadObject, ctx: &PolicyCtx<'_>) {
        let running = ctx.is_current(obj);
        let (avt, evt) = {
            let mut data = obj.data();
            let bvt = data.bvt_mut();
            if !bvt.can_warp() || bvt.warp_on || ctx.now < bvt.unwarp_until {
                return;
            }
            // Time run so far is charged unwarped
            if running {
                bvt.charge(ctx.now, self.mcu);
            }
            bvt.warp_on = true;
            bvt.warp_start = ctx.now;
            bvt.warp_used = 0;
            bvt.refresh_evt();
            (bvt.avt, bvt.evt)
        };
        self.requeue(obj.id(), avt, evt);
        if running {
            self.start_run(obj, ctx.now);
        }
        debug!(thread = %obj, evt, "bvt warp started");
    }

    fn deinit_data(&mut self, obj: &ThreadObject) {
        self.remove(obj.id());
    }

    fn deinit(&mut self, ctx: &PolicyCtx<'_>) {
        ctx.platform.disarm_tick(ctx.pcpu_id);
        self.runqueue.clear();
    }

    fn suspend(&mut self, ctx: &PolicyCtx<'_>) {
        ctx.platform.disarm_tick(ctx.pcpu_id);
    }

    fn resume(&mut self, ctx: &PolicyCtx<'_>) {
        ctx.platform.arm_tick(ctx.pcpu_id, self.mcu);
    }

    fn tick(&mut self, ctx: &PolicyCtx<'_>) -> bool {
        match ctx.current_non_idle() {
            None => !self.runqueue.is_empty(),
            Some(cur) => {
                let mut data = cur.data();
                let bvt = data.bvt_mut();
                if bvt.run_countdown == u64::MAX {
                    return false;
                }
                bvt.run_countdown = bvt.run_countdown.saturating_sub(1);
                bvt.run_countdown == 0
            }
        }
    }

    fn queued(&self) -> Vec<ThreadId> {
        self.runqueue.iter().map(|entry| entry.id).collect()
    }
}
