use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

use stepsim_env::FnTask;

fn noop() -> BoxedTask {
    FnTask::new(|| Ok(())).boxed()
}

fn scheduler(max_duration: u64) -> Scheduler {
    Scheduler::new(
        SchedulerConfig::new(max_duration)
            .with_threads(2)
            .with_watcher_poll(Duration::from_millis(5)),
    )
    .unwrap()
}

/// Marks the scheduler as started without taking the first step or
/// spawning the watcher, so steps can be driven by hand.
fn start_manually(scheduler: &Scheduler) {
    scheduler.inner.core.lock().lifecycle = SchedulerState::Started;
}

#[derive(Default)]
struct CountingObserver {
    started: AtomicUsize,
    killed: AtomicUsize,
    reached_end: AtomicUsize,
    no_more_work: AtomicUsize,
}

impl SchedulerObserver for CountingObserver {
    fn on_started(&self, _: &Scheduler) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_killed(&self, _: &Scheduler) {
        self.killed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_reached_end(&self, _: &Scheduler) {
        self.reached_end.fetch_add(1, Ordering::SeqCst);
    }
    fn on_no_more_work(&self, _: &Scheduler) {
        self.no_more_work.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_lifecycle_transitions_are_enforced() {
    let sched = scheduler(10);
    assert_eq!(sched.state(), SchedulerState::Created);
    assert!(matches!(sched.kill(), Err(SimError::InvalidState { .. })));

    sched.schedule_once(noop(), 1).unwrap();
    sched.start().unwrap();
    assert!(matches!(sched.start(), Err(SimError::InvalidState { .. })));

    assert!(sched.wait_until_ended_timeout(Duration::from_secs(5)));
    assert!(sched.is_killed());
    assert!(!sched.is_running());
    assert!(matches!(sched.kill(), Err(SimError::InvalidState { .. })));
}

#[test]
fn test_schedule_at_time_must_be_in_the_future() {
    let sched = scheduler(10);

    let err = sched.schedule_at_time(noop(), 0).unwrap_err();
    assert!(matches!(err, SimError::InvalidScheduleParameter(_)));

    sched.schedule_at_time(noop(), 1).unwrap();
    assert_eq!(sched.pending_tasks(), 1);
}

#[test]
fn test_zero_parameters_are_rejected() {
    let sched = scheduler(10);

    for (waiting, reps, step) in [(0, 1, 1), (1, 0, 1), (1, 1, 0)] {
        let result = sched.schedule_executable(noop(), waiting, ScheduleMode::Repeatedly, reps, step);
        assert!(matches!(result, Err(SimError::InvalidScheduleParameter(_))));
    }
    assert!(sched.schedule_once(noop(), 0).is_err());
    assert!(sched.schedule_infinitely(noop(), 1, 0).is_err());
    assert_eq!(sched.pending_tasks(), 0);
}

#[test]
fn test_scheduling_after_kill_is_rejected() {
    let sched = scheduler(10);
    sched.schedule_once(noop(), 5).unwrap();
    start_manually(&sched);
    sched.kill().unwrap();

    assert_eq!(sched.pending_tasks(), 0);
    assert!(matches!(
        sched.schedule_once(noop(), 1),
        Err(SimError::SchedulingRejected(_))
    ));
    assert!(sched.executor().is_shutdown());
}

#[test]
fn test_manual_steps_follow_bucket_order() {
    let sched = scheduler(10);
    let ran = Arc::new(AtomicUsize::new(0));
    for time in [5, 2, 2] {
        let ran = ran.clone();
        let task = FnTask::new(move || {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        sched.schedule_at_time(task.boxed(), time).unwrap();
    }
    start_manually(&sched);

    assert_eq!(sched.execute_next_step(), StepOutcome::Advanced { time: 2, tasks: 2 });
    assert_eq!(sched.current_time(), 2);
    sched.executor().await_quiescence();
    assert_eq!(ran.load(Ordering::SeqCst), 2);

    assert_eq!(sched.execute_next_step(), StepOutcome::Advanced { time: 5, tasks: 1 });
    sched.executor().await_quiescence();

    assert_eq!(sched.execute_next_step(), StepOutcome::NoMoreWork);
    assert!(sched.is_killed());
    assert_eq!(sched.current_time(), 5);
    assert_eq!(sched.steps(), 2);
    assert_eq!(sched.execute_next_step(), StepOutcome::Idle);
}

#[test]
fn test_reaching_end_kills_without_advancing() {
    let sched = scheduler(10);
    let observer = Arc::new(CountingObserver::default());
    sched.add_observer(observer.clone());

    sched.schedule_at_time(noop(), 15).unwrap();
    start_manually(&sched);

    assert_eq!(sched.execute_next_step(), StepOutcome::ReachedEnd { next_time: 15 });
    assert!(sched.is_killed());
    assert!(sched.is_ended());
    assert_eq!(sched.current_time(), 0);
    assert_eq!(sched.pending_tasks(), 0);

    // A second step cannot spin on the same bucket
    assert_eq!(sched.execute_next_step(), StepOutcome::Idle);
    assert_eq!(observer.reached_end.load(Ordering::SeqCst), 1);
    assert_eq!(observer.killed.load(Ordering::SeqCst), 1);
    assert_eq!(observer.no_more_work.load(Ordering::SeqCst), 0);
}

#[test]
fn test_start_without_work_ends_immediately() {
    let sched = scheduler(10);
    let observer = Arc::new(CountingObserver::default());
    let id = sched.add_observer(observer.clone());
    assert_eq!(sched.observer_count(), 1);

    sched.start().unwrap();

    assert!(sched.is_killed());
    assert!(sched.wait_until_ended_timeout(Duration::from_secs(1)));
    assert_eq!(observer.started.load(Ordering::SeqCst), 1);
    assert_eq!(observer.no_more_work.load(Ordering::SeqCst), 1);
    assert_eq!(observer.killed.load(Ordering::SeqCst), 1);

    assert!(sched.remove_observer(id));
    assert!(!sched.remove_observer(id));
}

#[test]
fn test_await_timeout_off_pool_schedules_nothing() {
    let sched = scheduler(10);
    let cond = sched.generate_condition();

    assert_eq!(
        sched.await_condition_timeout(&cond, 3),
        Err(SimError::ExecutorContextViolation)
    );
    assert_eq!(sched.pending_tasks(), 0);
    assert!(matches!(
        sched.await_condition_timeout(&cond, 0),
        Err(SimError::InvalidScheduleParameter(_))
    ));
}
