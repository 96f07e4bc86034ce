//! Worker cycle tests
//!
//! These tests drive a single TemplateWorker against a scripted probe:
//! - Down hosts are registered after one cycle
//! - Recovery on the next cycle
//! - Stop signal mid-cycle
//! - Probe faults and hung probes

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use teamwatch::{
    actors::worker::{CycleOutcome, TemplateWorker},
    registry::DownEntry,
};

use crate::helpers::*;

#[tokio::test]
async fn test_down_team_registered_after_one_cycle() {
    let probe = Arc::new(ScriptedProbe::new());
    probe.always("10.2.1.5", Answer::Down);

    let (ctx, mut rx) = run_context(1, 3, fast_settings(), probe.clone());
    let registry = ctx.registry.clone();
    let worker = TemplateWorker::new(template("10.{team}.1.5"), vec![22], ctx);

    assert_eq!(worker.run_cycle().await, CycleOutcome::Completed);

    assert_eq!(registry.snapshot(), vec![DownEntry::new(2, "10.2.1.5")]);
    assert_eq!(probe.calls(), vec!["10.1.1.5", "10.2.1.5", "10.3.1.5"]);
    assert_eq!(
        alert_lines(&drain(&mut rx)),
        vec!["TEAM 2 - HOST 10.2.1.5 - POSSIBLE BOX RESET"]
    );
}

#[tokio::test]
async fn test_down_team_recovers_on_next_cycle() {
    let probe = Arc::new(ScriptedProbe::new());
    probe.then("10.2.1.5", Answer::Down);

    let (ctx, mut rx) = run_context(1, 3, fast_settings(), probe.clone());
    let registry = ctx.registry.clone();
    let worker = TemplateWorker::new(template("10.{team}.1.5"), vec![22], ctx);

    worker.run_cycle().await;
    assert_eq!(registry.len(), 1);

    worker.run_cycle().await;
    assert!(registry.is_empty());
    assert_eq!(
        alert_lines(&drain(&mut rx)),
        vec![
            "TEAM 2 - HOST 10.2.1.5 - POSSIBLE BOX RESET",
            "TEAM 2 - HOST 10.2.1.5 - RECOVERED",
        ]
    );
}

#[tokio::test]
async fn test_repeated_down_cycles_alert_once() {
    let probe = Arc::new(ScriptedProbe::new());
    probe.always("10.3.1.5", Answer::Down);

    let (ctx, mut rx) = run_context(1, 3, fast_settings(), probe.clone());
    let worker = TemplateWorker::new(template("10.{team}.1.5"), vec![22], ctx);

    for _ in 0..3 {
        worker.run_cycle().await;
    }

    assert_eq!(probe.calls_for("10.3.1.5"), 3);
    assert_eq!(alert_lines(&drain(&mut rx)).len(), 1);
}

#[tokio::test]
async fn test_stop_mid_cycle_abandons_remaining_teams() {
    let probe = Arc::new(ScriptedProbe::new());
    let (ctx, _rx) = run_context(1, 3, fast_settings(), probe.clone());
    probe.always("10.1.1.5", Answer::AnswerThenStop(true, ctx.stop.clone()));

    let worker = TemplateWorker::new(template("10.{team}.1.5"), vec![22], ctx);

    tokio::time::timeout(Duration::from_secs(5), worker.run())
        .await
        .expect("worker should exit once stopped");

    // team 1 only; no second cycle either
    assert_eq!(probe.calls(), vec!["10.1.1.5"]);
}

#[tokio::test]
async fn test_stop_before_cycle_probes_nothing() {
    let probe = Arc::new(ScriptedProbe::new());
    let (ctx, _rx) = run_context(1, 3, fast_settings(), probe.clone());
    ctx.stop.set();

    let worker = TemplateWorker::new(template("10.{team}.1.5"), vec![22], ctx);

    assert_eq!(worker.run_cycle().await, CycleOutcome::Stopped);
    assert!(probe.calls().is_empty());
}

#[tokio::test]
async fn test_fault_is_retried_at_same_team() {
    let probe = Arc::new(ScriptedProbe::new());
    probe.then("10.2.1.5", Answer::Fault);

    let (ctx, mut rx) = run_context(1, 3, fast_settings(), probe.clone());
    let registry = ctx.registry.clone();
    let worker = TemplateWorker::new(template("10.{team}.1.5"), vec![22], ctx);

    assert_eq!(worker.run_cycle().await, CycleOutcome::Completed);

    // the fault counts as down, the retry brings the host back
    assert_eq!(
        probe.calls(),
        vec!["10.1.1.5", "10.2.1.5", "10.2.1.5", "10.3.1.5"]
    );
    assert!(registry.is_empty());
    assert_eq!(
        alert_lines(&drain(&mut rx)),
        vec![
            "TEAM 2 - HOST 10.2.1.5 - POSSIBLE BOX RESET",
            "TEAM 2 - HOST 10.2.1.5 - RECOVERED",
        ]
    );
}

#[tokio::test]
async fn test_persistent_fault_moves_on_after_retries() {
    let probe = Arc::new(ScriptedProbe::new());
    probe.always("10.2.1.5", Answer::Fault);

    let mut settings = fast_settings();
    settings.fault_retries = 2;
    let (ctx, _rx) = run_context(1, 3, settings, probe.clone());
    let registry = ctx.registry.clone();
    let worker = TemplateWorker::new(template("10.{team}.1.5"), vec![22], ctx);

    assert_eq!(worker.run_cycle().await, CycleOutcome::Completed);

    assert_eq!(probe.calls_for("10.2.1.5"), 3);
    assert_eq!(probe.calls_for("10.3.1.5"), 1);
    assert_eq!(registry.snapshot(), vec![DownEntry::new(2, "10.2.1.5")]);
}

#[tokio::test]
async fn test_fault_does_not_stop_later_cycles() {
    let probe = Arc::new(ScriptedProbe::new());
    probe
        .then("10.2.1.5", Answer::Fault)
        .then("10.2.1.5", Answer::Fault);

    let (ctx, _rx) = run_context(1, 3, fast_settings(), probe.clone());
    let stop = ctx.stop.clone();
    let registry = ctx.registry.clone();
    let handle = TemplateWorker::new(template("10.{team}.1.5"), vec![22], ctx).spawn();

    // wait until host 2 has been probed again after its faults
    tokio::time::timeout(Duration::from_secs(5), async {
        while probe.calls_for("10.2.1.5") < 4 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("host should be probed again on schedule");

    stop.set();
    handle.await.unwrap();

    assert!(!registry.contains(2, "10.2.1.5"));
    assert!(probe.calls_for("10.3.1.5") >= 2);
}

#[tokio::test]
async fn test_panicking_probe_is_a_fault() {
    let probe = Arc::new(ScriptedProbe::new());
    probe.then("10.2.1.5", Answer::Panic);

    let (ctx, mut rx) = run_context(1, 3, fast_settings(), probe.clone());
    let registry = ctx.registry.clone();
    let worker = TemplateWorker::new(template("10.{team}.1.5"), vec![22], ctx);

    assert_eq!(worker.run_cycle().await, CycleOutcome::Completed);
    assert_eq!(worker.run_cycle().await, CycleOutcome::Completed);

    assert_eq!(probe.calls_for("10.2.1.5"), 3);
    assert_eq!(probe.calls_for("10.3.1.5"), 2);
    assert!(registry.is_empty());
    assert_eq!(
        alert_lines(&drain(&mut rx)),
        vec![
            "TEAM 2 - HOST 10.2.1.5 - POSSIBLE BOX RESET",
            "TEAM 2 - HOST 10.2.1.5 - RECOVERED",
        ]
    );
}

#[tokio::test]
async fn test_persistent_panic_keeps_worker_running() {
    let probe = Arc::new(ScriptedProbe::new());
    probe.always("10.1.1.5", Answer::Panic);

    let (ctx, _rx) = run_context(1, 2, fast_settings(), probe.clone());
    let stop = ctx.stop.clone();
    let handle = TemplateWorker::new(template("10.{team}.1.5"), vec![22], ctx).spawn();

    tokio::time::timeout(Duration::from_secs(5), async {
        while probe.calls_for("10.2.1.5") < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("worker should keep cycling past the panicking host");

    assert!(!handle.is_finished());
    stop.set();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_hung_probe_is_cut_off_as_fault() {
    let probe = Arc::new(ScriptedProbe::new());
    probe.then("10.1.1.5", Answer::Hang(Duration::from_secs(30)));

    let mut settings = fast_settings();
    settings.probe_timeout = Duration::from_millis(20);
    settings.fault_retries = 0;
    let (ctx, _rx) = run_context(1, 2, settings, probe.clone());
    let registry = ctx.registry.clone();
    let worker = TemplateWorker::new(template("10.{team}.1.5"), vec![22], ctx);

    let outcome = tokio::time::timeout(Duration::from_secs(5), worker.run_cycle())
        .await
        .expect("probe deadline should end the hung probe");

    assert_eq!(outcome, CycleOutcome::Completed);
    assert_eq!(registry.snapshot(), vec![DownEntry::new(1, "10.1.1.5")]);
    assert_eq!(probe.calls(), vec!["10.1.1.5", "10.2.1.5"]);
}

#[tokio::test]
async fn test_stop_during_fault_backoff_ends_cycle() {
    let probe = Arc::new(ScriptedProbe::new());
    probe.always("10.1.1.5", Answer::Fault);

    let mut settings = fast_settings();
    settings.fault_backoff = Duration::from_secs(60);
    let (ctx, _rx) = run_context(1, 3, settings, probe.clone());
    let stop = ctx.stop.clone();
    let worker = TemplateWorker::new(template("10.{team}.1.5"), vec![22], ctx);

    let cycle = tokio::spawn(async move { worker.run_cycle().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    stop.set();

    let outcome = tokio::time::timeout(Duration::from_secs(5), cycle)
        .await
        .expect("backoff should wake on stop")
        .unwrap();
    assert_eq!(outcome, CycleOutcome::Stopped);
    assert_eq!(probe.calls(), vec!["10.1.1.5"]);
}
