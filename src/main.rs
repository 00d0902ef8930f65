/*!
 * Hypervisor Scheduler Simulator - Main Entry Point
 *
 * Brings up the configured number of CPUs on the simulation platform,
 * drives a scripted VCPU workload through the dispatch engine, prints the
 * per-CPU statistics as JSON and takes every CPU offline again.
 *
 * Configuration comes from HVSCHED_POLICY, HVSCHED_IDLE_MODE and
 * HVSCHED_PCPUS.
 */

use hvsched::platform::Clock;
use hvsched::{
    init_tracing, span_pcpu, PcpuId, Platform, SchedConfig, SchedError, SchedParams, Scheduler,
    SchedulerKind, SimPlatform, ThreadObject, ThreadPriority,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

const VCPUS_PER_PCPU: usize = 3;
const STEPS: u64 = 200;

struct Vcpu {
    obj: Arc<ThreadObject>,
    exits: Arc<AtomicU64>,
}

fn spawn_vcpus(sched: &Scheduler, pcpu_id: PcpuId) -> Vec<Vcpu> {
    // A partitioned CPU hosts exactly one VCPU
    let count = match sched.config().policy {
        SchedulerKind::Noop => 1,
        _ => VCPUS_PER_PCPU,
    };
    (0..count)
        .map(|n| {
            let exits = Arc::new(AtomicU64::new(0));
            let counter = Arc::clone(&exits);
            let obj = ThreadObject::builder(&format!("vcpu{}.{}", pcpu_id, n), pcpu_id)
                .stack(0x1000 * (n + 1))
                .switch_out(move |_| {
                    counter.fetch_add(1, Ordering::Relaxed);
                })
                .build();

            let params = SchedParams {
                prio: if n == 0 {
                    ThreadPriority::High
                } else {
                    ThreadPriority::Low
                },
                bvt_weight: (n + 1) as u8,
                ..SchedParams::default()
            };
            sched.init_thread_data(&obj, &params);
            sched.wake_thread(&obj);
            Vcpu { obj, exits }
        })
        .collect()
}

/// Tick-driven run with periodic I/O waits
fn run_workload(sched: &Scheduler, platform: &SimPlatform, pcpu_id: PcpuId, vcpus: &[Vcpu]) {
    let span = span_pcpu("workload", pcpu_id);
    let _entered = span.enter();

    SimPlatform::bind_cpu(pcpu_id);
    sched.schedule();

    for step in 1..=STEPS {
        platform.advance_ms(1);
        if let Some(period) = platform.armed_period(pcpu_id) {
            if platform.now() % period == 0 {
                platform.fire_tick(sched, pcpu_id);
            }
        }

        if step % 7 == 0 {
            if let Some(cur) = sched.sched_get_current(pcpu_id).filter(|cur| !cur.is_idle()) {
                sched.sleep_thread(&cur);
            }
        }
        if step % 11 == 0 {
            for vcpu in vcpus.iter().filter(|vcpu| vcpu.obj.is_blocked()) {
                sched.wake_thread(&vcpu.obj);
            }
        }
        sched.schedule();
    }

    span.record_switches(sched.stats(pcpu_id).context_switches);
}

fn shutdown(sched: &Scheduler, pcpu_id: PcpuId, vcpus: &[Vcpu]) {
    SimPlatform::bind_cpu(pcpu_id);
    for vcpu in vcpus {
        sched.sleep_thread(&vcpu.obj);
    }
    sched.schedule();
    for vcpu in vcpus {
        sched.deinit_thread_data(&vcpu.obj);
        info!(
            pcpu = pcpu_id,
            thread = %vcpu.obj,
            exits = vcpu.exits.load(Ordering::Relaxed),
            "vcpu retired"
        );
    }

    sched.request_offline(pcpu_id);
    sched.run_idle_thread();
    sched.deinit_sched(pcpu_id);
}

fn main() -> miette::Result<()> {
    init_tracing();

    let config = SchedConfig::from_env()?;
    info!(
        policy = config.policy.as_str(),
        nr_pcpus = config.nr_pcpus,
        "hvsched simulator starting"
    );

    let platform = Arc::new(SimPlatform::new(config.nr_pcpus));
    let dyn_platform: Arc<dyn Platform> = platform.clone();
    let sched = Scheduler::new(config, dyn_platform)?;

    let mut workloads = Vec::with_capacity(sched.nr_pcpus());
    for pcpu in 0..sched.nr_pcpus() {
        let pcpu_id = pcpu as PcpuId;
        SimPlatform::bind_cpu(pcpu_id);
        sched.init_sched(pcpu_id);
        workloads.push((pcpu_id, spawn_vcpus(&sched, pcpu_id)));
    }

    for (pcpu_id, vcpus) in &workloads {
        run_workload(&sched, &platform, *pcpu_id, vcpus);
    }

    let report = serde_json::to_string_pretty(&sched.all_stats()).map_err(SchedError::from)?;
    println!("{}", report);

    for (pcpu_id, vcpus) in &workloads {
        shutdown(&sched, *pcpu_id, vcpus);
    }

    info!(switches = platform.switches().len(), "hvsched simulator finished");
    Ok(())
}
