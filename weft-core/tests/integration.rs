//! Integration tests for the reactive runtime.
//!
//! These exercise signals, memos, and effects together through the public
//! API: batching, deduplication, consistent propagation through diamonds,
//! dynamic dependency sets, disposal, and cycle detection.

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use weft_core::{Runtime, RuntimeConfig, RuntimeError};

/// A batched write to two inputs of one effect produces one run that sees
/// both new values — never one new and one old.
#[test]
fn batched_writes_are_observed_atomically() {
    let rt = Runtime::new();
    let a = rt.create_signal(1);
    let b = rt.create_signal(2);

    let observed: Arc<Mutex<Vec<(i32, i32)>>> = Arc::new(Mutex::new(Vec::new()));
    let (ea, eb, eo) = (a.clone(), b.clone(), observed.clone());
    let effect = rt
        .create_effect(move || {
            let pair = (ea.get()?, eb.get()?);
            eo.lock().push(pair);
            Ok(())
        })
        .unwrap();

    rt.batch(|| {
        a.set(10)?;
        b.set(20)?;
        Ok(())
    })
    .unwrap();

    assert_eq!(*observed.lock(), vec![(1, 2), (10, 20)]);
    assert_eq!(effect.run_count().unwrap(), 2);
}

/// However many of its dependencies change in one batch, a computation runs
/// once per flush.
#[test]
fn batched_writes_deduplicate() {
    let rt = Runtime::new();
    let x = rt.create_signal(0);
    let y = rt.create_signal(0);

    let runs = Arc::new(AtomicUsize::new(0));
    let (ex, ey, er) = (x.clone(), y.clone(), runs.clone());
    rt.create_effect(move || {
        ex.get()?;
        ey.get()?;
        er.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    rt.batch(|| {
        x.set(1)?;
        x.set(2)?;
        y.set(3)?;
        Ok(())
    })
    .unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Diamond: one source feeding two memos feeding one effect. A single write
/// recomputes each memo once and runs the effect once.
#[test]
fn diamond_settles_with_one_run_per_node() {
    let rt = Runtime::new();
    let source = rt.create_signal(1);

    let p_runs = Arc::new(AtomicUsize::new(0));
    let (ps, pr) = (source.clone(), p_runs.clone());
    let p = rt
        .create_memo(move || {
            pr.fetch_add(1, Ordering::SeqCst);
            Ok(ps.get()? + 10)
        })
        .unwrap();

    let q_runs = Arc::new(AtomicUsize::new(0));
    let (qs, qr) = (source.clone(), q_runs.clone());
    let q = rt
        .create_memo(move || {
            qr.fetch_add(1, Ordering::SeqCst);
            Ok(qs.get()? * 10)
        })
        .unwrap();

    let observed = Arc::new(AtomicI32::new(0));
    let (rp, rq, ro) = (p.clone(), q.clone(), observed.clone());
    let r = rt
        .create_effect(move || {
            ro.store(rp.get()? + rq.get()?, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    // Initial: 1 + 10 = 11, 1 * 10 = 10, sum 21.
    assert_eq!(observed.load(Ordering::SeqCst), 21);

    source.set(2).unwrap();

    // 12 + 20, with no node running twice.
    assert_eq!(observed.load(Ordering::SeqCst), 32);
    assert_eq!(p_runs.load(Ordering::SeqCst), 2);
    assert_eq!(q_runs.load(Ordering::SeqCst), 2);
    assert_eq!(r.run_count().unwrap(), 2);
}

/// An effect reading both a source and a memo derived from it never observes
/// the new source paired with the stale derivation.
#[test]
fn source_and_derivation_stay_consistent() {
    let rt = Runtime::new();
    let count = rt.create_signal(1);

    let mc = count.clone();
    let doubled = rt.create_memo(move || Ok(mc.get()? * 2)).unwrap();

    let observed: Arc<Mutex<Vec<(i32, i32)>>> = Arc::new(Mutex::new(Vec::new()));
    let (ec, ed, eo) = (count.clone(), doubled.clone(), observed.clone());
    rt.create_effect(move || {
        let pair = (ec.get()?, ed.get()?);
        eo.lock().push(pair);
        Ok(())
    })
    .unwrap();

    count.set(5).unwrap();

    assert_eq!(*observed.lock(), vec![(1, 2), (5, 10)]);
}

/// Writing an equal value invalidates nothing: no version bump, no run.
#[test]
fn equal_writes_are_invisible() {
    let rt = Runtime::new();
    let signal = rt.create_signal(42);

    let runs = Arc::new(AtomicUsize::new(0));
    let (es, er) = (signal.clone(), runs.clone());
    rt.create_effect(move || {
        es.get()?;
        er.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    assert!(!signal.set(42).unwrap());
    assert_eq!(signal.version().unwrap(), 0);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// A computation depends only on the branch it actually took; the signal on
/// the untaken branch can change freely.
#[test]
fn dependency_set_follows_the_branch_taken() {
    let rt = Runtime::new();
    let use_first = rt.create_signal(true);
    let first = rt.create_signal(10);
    let second = rt.create_signal(20);

    let runs = Arc::new(AtomicUsize::new(0));
    let (ef, e1, e2, er) = (
        use_first.clone(),
        first.clone(),
        second.clone(),
        runs.clone(),
    );
    let effect = rt
        .create_effect(move || {
            if ef.get()? {
                e1.get()?;
            } else {
                e2.get()?;
            }
            er.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    assert_eq!(effect.dependency_count().unwrap(), 2);

    // Flip the flag: the effect now reads `second` instead of `first`.
    use_first.set(false).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(effect.dependency_count().unwrap(), 2);
    assert_eq!(first.subscriber_count().unwrap(), 0);

    // The pruned branch is inert.
    first.set(11).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // The live branch still fires.
    second.set(21).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

/// After dispose, an effect's closure is never invoked again, no matter what
/// its former dependencies do.
#[test]
fn disposed_effect_is_silent() {
    let rt = Runtime::new();
    let a = rt.create_signal(0);
    let b = rt.create_signal(0);

    let runs = Arc::new(AtomicUsize::new(0));
    let (ea, eb, er) = (a.clone(), b.clone(), runs.clone());
    let effect = rt
        .create_effect(move || {
            ea.get()?;
            eb.get()?;
            er.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    effect.dispose().unwrap();
    a.set(1).unwrap();
    b.set(1).unwrap();
    rt.batch(|| {
        a.set(2)?;
        b.set(2)?;
        Ok(())
    })
    .unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(a.subscriber_count().unwrap(), 0);
}

/// Disposing a computation that is queued for the current flush cancels it.
#[test]
fn disposing_a_queued_computation_cancels_it() {
    let rt = Runtime::new();
    let a = rt.create_signal(0);
    let b = rt.create_signal(0);

    let victim_runs = Arc::new(AtomicUsize::new(0));
    let (vb, vr) = (b.clone(), victim_runs.clone());
    let victim = rt
        .create_effect(move || {
            vb.get()?;
            vr.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    let (ka, kv) = (a.clone(), victim.clone());
    rt.create_effect(move || {
        if ka.get()? > 0 {
            kv.dispose()?;
        }
        Ok(())
    })
    .unwrap();
    assert_eq!(victim_runs.load(Ordering::SeqCst), 1);

    // Both effects are queued; the first to run disposes the second.
    rt.batch(|| {
        a.set(1)?;
        b.set(1)?;
        Ok(())
    })
    .unwrap();

    assert!(victim.is_disposed());
    assert_eq!(victim_runs.load(Ordering::SeqCst), 1);
}

/// An effect whose run writes a signal it also reads keeps re-dirtying
/// itself; past the retry bound that is a cycle.
#[test]
fn self_write_past_the_retry_bound_is_a_cycle() {
    let rt = Runtime::new();
    let a = rt.create_signal(0);

    let ea = a.clone();
    rt.create_effect(move || {
        let v = ea.get()?;
        ea.set(v + 1)?;
        Ok(())
    })
    .unwrap();

    let err = a.set(5).unwrap_err();
    assert!(matches!(err, RuntimeError::CyclicDependency { .. }));
}

/// One self-stabilizing retry is tolerated: a run that writes its own
/// dependency once and then settles completes normally.
#[test]
fn self_stabilizing_write_settles() {
    let rt = Runtime::new();
    let a = rt.create_signal(0);

    // Round odd values up to even, then stop writing.
    let ea = a.clone();
    rt.create_effect(move || {
        let v = ea.get()?;
        if v % 2 == 1 {
            ea.set(v + 1)?;
        }
        Ok(())
    })
    .unwrap();

    a.set(1).unwrap();
    assert_eq!(a.get_untracked().unwrap(), 2);
}

/// Two effects feeding each other's inputs never settle; the flush operation
/// budget turns that into an error instead of a hang.
#[test]
fn mutual_writers_exhaust_the_flush_budget() {
    let rt = Runtime::with_config(RuntimeConfig {
        max_retries: 1,
        max_flush_ops: 64,
    });
    let a = rt.create_signal(0i64);
    let b = rt.create_signal(0i64);

    let (fa, fb) = (a.clone(), b.clone());
    rt.create_effect(move || {
        let v = fa.get()?;
        fb.set(v + 1)?;
        Ok(())
    })
    .unwrap();

    let (ga, gb) = (a.clone(), b.clone());
    rt.create_effect(move || {
        let v = gb.get()?;
        ga.set(v + 1)?;
        Ok(())
    })
    .unwrap();

    let err = a.set(10).unwrap_err();
    assert!(matches!(err, RuntimeError::CyclicDependency { .. }));
}

/// The canonical chain: count -> doubled -> logging effect. One write, one
/// recompute, one log line with the derived value.
#[test]
fn count_doubled_log_scenario() {
    let rt = Runtime::new();
    let count = rt.create_signal(0);

    let mc = count.clone();
    let doubled = rt.create_memo(move || Ok(mc.get()? * 2)).unwrap();

    let log: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
    let (ed, el) = (doubled.clone(), log.clone());
    let effect = rt
        .create_effect(move || {
            el.lock().push(ed.get()?);
            Ok(())
        })
        .unwrap();

    assert_eq!(*log.lock(), vec![0]);

    count.set(5).unwrap();

    assert_eq!(*log.lock(), vec![0, 10]);
    assert_eq!(effect.run_count().unwrap(), 2);
}

/// A dependency taken for the first time mid-flush is still observed fresh:
/// the stale memo recomputes synchronously inside the read.
#[test]
fn first_time_dependency_mid_flush_is_fresh() {
    let rt = Runtime::new();
    let enabled = rt.create_signal(false);
    let base = rt.create_signal(1);

    let mb = base.clone();
    let doubled = rt.create_memo(move || Ok(mb.get()? * 2)).unwrap();

    let observed: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
    let (ee, ed, eo) = (enabled.clone(), doubled.clone(), observed.clone());
    let effect = rt
        .create_effect(move || {
            if ee.get()? {
                eo.lock().push(ed.get()?);
            }
            Ok(())
        })
        .unwrap();
    assert!(observed.lock().is_empty());

    // The effect is queued before the memo and reads it for the first time
    // while the memo is still stale.
    rt.batch(|| {
        enabled.set(true)?;
        base.set(10)?;
        Ok(())
    })
    .unwrap();

    assert_eq!(*observed.lock(), vec![20]);
    assert_eq!(effect.run_count().unwrap(), 2);
}

/// A memo whose recomputed value is unchanged stops the wave: its
/// subscribers do not run.
#[test]
fn unchanged_memo_output_stops_propagation() {
    let rt = Runtime::new();
    let count = rt.create_signal(-5i32);

    let mc = count.clone();
    let sign = rt.create_memo(move || Ok(mc.get()?.signum())).unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let (es, er) = (sign.clone(), runs.clone());
    rt.create_effect(move || {
        es.get()?;
        er.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // Still negative: the memo recomputes but its output is unchanged.
    count.set(-9).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // Sign flip propagates.
    count.set(3).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Writes to a disposed signal fail immediately; disposal itself is
/// idempotent.
#[test]
fn disposed_signal_rejects_operations() {
    let rt = Runtime::new();
    let signal = rt.create_signal(0);

    signal.dispose().unwrap();
    assert!(signal.is_disposed());

    assert!(matches!(
        signal.set(1),
        Err(RuntimeError::UseAfterDispose { .. })
    ));
    assert!(matches!(
        signal.get(),
        Err(RuntimeError::UseAfterDispose { .. })
    ));

    signal.dispose().unwrap();
}

/// A computation cannot dispose itself from inside its own run.
#[test]
fn self_dispose_mid_run_is_invalid() {
    let rt = Runtime::new();
    let trigger = rt.create_signal(0);

    let slot: Arc<Mutex<Option<weft_core::Effect>>> = Arc::new(Mutex::new(None));
    let (et, es) = (trigger.clone(), slot.clone());
    let effect = rt
        .create_effect(move || {
            et.get()?;
            if let Some(handle) = es.lock().as_ref() {
                handle.dispose()?;
            }
            Ok(())
        })
        .unwrap();
    *slot.lock() = Some(effect.clone());

    let err = trigger.set(1).unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidState { .. }));
    assert!(!effect.is_disposed());
}

/// A failing computation aborts the flush but stays dirty; once its error
/// condition clears, the next flush retries it successfully.
#[test]
fn failed_computation_is_retried_by_a_later_flush() {
    let rt = Runtime::new();
    let value = rt.create_signal(0);

    let observed = Arc::new(AtomicI32::new(-1));
    let (ev, eo) = (value.clone(), observed.clone());
    let effect = rt
        .create_effect(move || {
            let v = ev.get()?;
            if v % 2 == 1 {
                return Err(RuntimeError::InvalidState {
                    reason: "odd values are rejected by this host",
                });
            }
            eo.store(v, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    // The failing flush surfaces the effect's error to the writer.
    let err = value.set(1).unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidState { .. }));
    assert_eq!(observed.load(Ordering::SeqCst), 0);

    // The effect stayed queued; an even value lets it through.
    value.set(2).unwrap();
    assert_eq!(observed.load(Ordering::SeqCst), 2);
    assert_eq!(effect.run_count().unwrap(), 2);
}
