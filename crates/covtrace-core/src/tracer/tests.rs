use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;
use std::sync::Arc;

use super::*;
use crate::decision::TraceDecision;
use crate::error::DecisionError;
use crate::event::StepFrame;
use crate::hook::{HookSlot, StepHook};
use crate::sink::LineData;

type Hits = Rc<RefCell<LineData<Arc<str>>>>;

/// Decision function tracing everything except units starting with `skip`,
/// counting its invocations.
fn counting_decider(
    calls: Rc<Cell<usize>>,
) -> impl FnMut(&str, &StepFrame) -> std::result::Result<Option<Arc<str>>, DecisionError> {
    move |unit: &str, _: &StepFrame| {
        calls.set(calls.get() + 1);
        Ok((!unit.starts_with("skip")).then(|| Arc::from(unit)))
    }
}

fn frame(unit: &str, line: u32) -> StepFrame {
    StepFrame::new(unit, line)
}

fn lines(hits: &Hits, unit: &str) -> Vec<u32> {
    hits.borrow()
        .lines(&Arc::from(unit))
        .map(|lines| lines.iter().copied().collect())
        .unwrap_or_default()
}

#[test]
fn test_example_scenario() {
    let calls = Rc::new(Cell::new(0));
    let hits = Hits::default();
    let decide = {
        let calls = Rc::clone(&calls);
        move |unit: &str, _: &StepFrame| -> std::result::Result<Option<Arc<str>>, DecisionError> {
            calls.set(calls.get() + 1);
            Ok((unit == "a.py").then(|| Arc::from(unit)))
        }
    };
    let tracer = Tracer::new(decide, Rc::clone(&hits));

    tracer.trace(TraceEvent::Call, &frame("a.py", 1)).unwrap();
    tracer.trace(TraceEvent::Line, &frame("a.py", 10)).unwrap();
    tracer.trace(TraceEvent::Call, &frame("b.py", 1)).unwrap();
    tracer.trace(TraceEvent::Line, &frame("b.py", 5)).unwrap();
    tracer.trace(TraceEvent::Return, &frame("b.py", 5)).unwrap();
    tracer.trace(TraceEvent::Line, &frame("a.py", 11)).unwrap();
    tracer.trace(TraceEvent::Return, &frame("a.py", 11)).unwrap();

    assert_eq!(lines(&hits, "a.py"), [10, 11]);
    assert_eq!(hits.borrow().hit_count(), 2);
    assert_eq!(tracer.depth(), -1);
    assert_eq!(calls.get(), 2);
    assert_eq!(
        tracer.decisions().get("b.py"),
        Some(&TraceDecision::Skip)
    );
}

#[test]
fn test_balanced_calls_return_to_empty() {
    let hits = Hits::default();
    let tracer = Tracer::new(counting_decider(Rc::default()), Rc::clone(&hits));

    for depth in 0..5 {
        tracer
            .trace(TraceEvent::Call, &frame(&format!("m{depth}.py"), 1))
            .unwrap();
        assert_eq!(tracer.depth(), depth);
    }
    for _ in 0..5 {
        tracer.trace(TraceEvent::Return, &frame("any", 0)).unwrap();
    }
    assert_eq!(tracer.depth(), -1);
}

#[test]
fn test_decision_is_memoized_per_unit() {
    let calls = Rc::new(Cell::new(0));
    let tracer = Tracer::new(counting_decider(Rc::clone(&calls)), Hits::default());

    for _ in 0..100 {
        tracer.trace(TraceEvent::Call, &frame("hot.py", 1)).unwrap();
        tracer.trace(TraceEvent::Call, &frame("skip_me.py", 1)).unwrap();
        tracer.trace(TraceEvent::Return, &frame("skip_me.py", 1)).unwrap();
        tracer.trace(TraceEvent::Return, &frame("hot.py", 1)).unwrap();
    }

    assert_eq!(calls.get(), 2);
    assert_eq!(tracer.stats().new_units, 2);
    assert_eq!(tracer.stats().calls, 200);
    assert_eq!(tracer.decisions().len(), 2);
}

#[test]
fn test_skipped_unit_never_touches_results() {
    let hits = Hits::default();
    let tracer = Tracer::new(counting_decider(Rc::default()), Rc::clone(&hits));

    tracer.trace(TraceEvent::Call, &frame("skip.py", 1)).unwrap();
    tracer.trace(TraceEvent::Line, &frame("skip.py", 2)).unwrap();
    tracer.trace(TraceEvent::Line, &frame("skip.py", 3)).unwrap();
    tracer.trace(TraceEvent::Return, &frame("skip.py", 3)).unwrap();

    assert!(hits.borrow().is_empty());
    assert_eq!(tracer.stats().lines, 2);
}

#[test]
fn test_line_records_under_top_frame() {
    let hits = Hits::default();
    let tracer = Tracer::new(counting_decider(Rc::default()), Rc::clone(&hits));

    tracer.trace(TraceEvent::Call, &frame("outer.py", 1)).unwrap();
    tracer.trace(TraceEvent::Call, &frame("inner.py", 1)).unwrap();
    tracer.trace(TraceEvent::Line, &frame("inner.py", 7)).unwrap();
    tracer.trace(TraceEvent::Line, &frame("inner.py", 7)).unwrap();
    tracer.trace(TraceEvent::Return, &frame("inner.py", 7)).unwrap();
    tracer.trace(TraceEvent::Line, &frame("outer.py", 2)).unwrap();

    assert_eq!(lines(&hits, "inner.py"), [7]);
    assert_eq!(lines(&hits, "outer.py"), [2]);
}

#[test]
fn test_unbalanced_events_are_tolerated() {
    let hits = Hits::default();
    let tracer = Tracer::new(counting_decider(Rc::default()), Rc::clone(&hits));

    tracer.trace(TraceEvent::Return, &frame("a.py", 1)).unwrap();
    tracer.trace(TraceEvent::Line, &frame("a.py", 2)).unwrap();
    tracer.trace(TraceEvent::Exception, &frame("a.py", 2)).unwrap();

    assert_eq!(tracer.depth(), -1);
    assert!(hits.borrow().is_empty());
}

#[test]
fn test_exception_from_pyexpat_synthesizes_return() {
    let tracer = Tracer::new(counting_decider(Rc::default()), Hits::default());

    tracer
        .trace(TraceEvent::Call, &frame("Modules/pyexpat.c", 1))
        .unwrap();
    assert_eq!(tracer.depth(), 0);
    tracer
        .trace(TraceEvent::Exception, &frame("Modules/pyexpat.c", 1))
        .unwrap();

    assert_eq!(tracer.depth(), -1);
    let stats = tracer.stats();
    assert_eq!(stats.missed_returns, 1);
    assert_eq!(stats.returns, 1);
}

#[test]
fn test_ordinary_exception_keeps_frame() {
    let tracer = Tracer::new(counting_decider(Rc::default()), Hits::default());

    tracer.trace(TraceEvent::Call, &frame("app.py", 1)).unwrap();
    tracer.trace(TraceEvent::Exception, &frame("app.py", 4)).unwrap();
    assert_eq!(tracer.depth(), 0);
    tracer.trace(TraceEvent::Return, &frame("app.py", 4)).unwrap();
    assert_eq!(tracer.depth(), -1);
}

#[test]
fn test_missing_return_markers_are_configurable() {
    let config = TracerConfig::new()
        .without_missing_return_markers()
        .with_missing_return_marker("_elementtree");
    let tracer = Tracer::with_config(counting_decider(Rc::default()), Hits::default(), &config);

    tracer.trace(TraceEvent::Call, &frame("pyexpat.c", 1)).unwrap();
    tracer.trace(TraceEvent::Exception, &frame("pyexpat.c", 1)).unwrap();
    assert_eq!(tracer.depth(), 0);

    tracer.trace(TraceEvent::Call, &frame("_elementtree.c", 1)).unwrap();
    tracer
        .trace(TraceEvent::Exception, &frame("_elementtree.c", 1))
        .unwrap();
    assert_eq!(tracer.depth(), 0);
}

#[test]
fn test_stack_grows_past_initial_capacity() {
    let config = TracerConfig::new().with_stack_capacity(2);
    let hits = Hits::default();
    let tracer = Tracer::with_config(counting_decider(Rc::default()), Rc::clone(&hits), &config);

    for line in 1..=1000 {
        tracer.trace(TraceEvent::Call, &frame("deep.py", 1)).unwrap();
        tracer.trace(TraceEvent::Line, &frame("deep.py", line)).unwrap();
    }
    assert_eq!(tracer.depth(), 999);
    assert!(tracer.stats().stack_reallocs > 0);
    assert_eq!(hits.borrow().hit_count(), 1000);

    for _ in 0..1000 {
        tracer.trace(TraceEvent::Return, &frame("deep.py", 0)).unwrap();
    }
    assert_eq!(tracer.depth(), -1);
}

#[test]
fn test_oversized_initial_capacity_falls_back() {
    let config = TracerConfig::new().with_stack_capacity(usize::MAX);
    let hits = Hits::default();
    let tracer = Tracer::with_config(counting_decider(Rc::default()), Rc::clone(&hits), &config);

    tracer.trace(TraceEvent::Call, &frame("a.py", 1)).unwrap();
    tracer.trace(TraceEvent::Line, &frame("a.py", 4)).unwrap();
    assert_eq!(tracer.depth(), 0);
    assert_eq!(lines(&hits, "a.py"), [4]);
}

#[test]
fn test_failed_stack_growth_keeps_depth() {
    let config = TracerConfig::new().with_stack_capacity(2);
    let hits = Hits::default();
    let tracer = Tracer::with_config(counting_decider(Rc::default()), Rc::clone(&hits), &config);
    tracer.core.borrow_mut().fail_next_reserve = true;

    // Calls succeed until the stack is full and has to grow.
    let mut failure = None;
    for n in 0..64 {
        let before = tracer.depth();
        match tracer.trace(TraceEvent::Call, &frame(&format!("f{n}.py"), 1)) {
            Ok(()) => assert_eq!(tracer.depth(), before + 1),
            Err(err) => {
                assert_eq!(tracer.depth(), before);
                failure = Some((err, n));
                break;
            }
        }
    }
    let (err, failed_at) = failure.expect("stack growth never attempted");
    assert!(
        matches!(err, TraceError::StackAlloc { depth, .. } if depth == failed_at),
        "unexpected error {err:?}"
    );
    assert!(!tracer.is_poisoned());
    assert_eq!(tracer.stats().errors, 1);

    // The frame below keeps recording and the next call grows normally.
    let top = format!("f{}.py", failed_at - 1);
    tracer.trace(TraceEvent::Line, &frame(&top, 9)).unwrap();
    assert_eq!(lines(&hits, &top), [9]);
    tracer.trace(TraceEvent::Call, &frame("g.py", 1)).unwrap();
    assert_eq!(tracer.depth(), isize::try_from(failed_at).unwrap());
}

#[test]
fn test_decision_failure_poisons_until_stop() {
    let hits = Hits::default();
    let decide = |unit: &str, _: &StepFrame| -> std::result::Result<Option<Arc<str>>, DecisionError> {
        if unit == "broken.py" {
            Err(DecisionError::new("stat failed"))
        } else {
            Ok(Some(Arc::from(unit)))
        }
    };
    let mut tracer = Tracer::new(decide, Rc::clone(&hits));

    tracer.trace(TraceEvent::Call, &frame("ok.py", 1)).unwrap();
    let err = tracer
        .trace(TraceEvent::Call, &frame("broken.py", 1))
        .unwrap_err();
    assert!(matches!(err, TraceError::Decision { ref unit, .. } if &**unit == "broken.py"));
    assert!(tracer.is_poisoned());
    assert!(!tracer.decisions().contains("broken.py"));

    let err = tracer.trace(TraceEvent::Line, &frame("ok.py", 2)).unwrap_err();
    assert!(matches!(err, TraceError::Poisoned));
    assert!(hits.borrow().is_empty());

    tracer.stop();
    assert!(!tracer.is_poisoned());
    assert_eq!(tracer.depth(), -1);
    assert!(tracer.decisions().contains("ok.py"));
    assert_eq!(tracer.stats().errors, 1);

    tracer.trace(TraceEvent::Call, &frame("ok.py", 1)).unwrap();
    tracer.trace(TraceEvent::Line, &frame("ok.py", 3)).unwrap();
    assert_eq!(lines(&hits, "ok.py"), [3]);
}

#[test]
fn test_start_and_stop_register_with_host() {
    let host = HookSlot::<StepFrame>::new();
    let hits = Hits::default();
    let mut tracer = Tracer::new(counting_decider(Rc::default()), Rc::clone(&hits));
    assert!(!tracer.is_started());

    tracer.start(&host);
    assert!(tracer.is_started());
    assert!(host.is_installed());

    host.dispatch(TraceEvent::Call, &frame("a.py", 1)).unwrap();
    host.dispatch(TraceEvent::Line, &frame("a.py", 4)).unwrap();
    host.dispatch(TraceEvent::Return, &frame("a.py", 4)).unwrap();

    tracer.stop();
    assert!(!tracer.is_started());
    assert!(!host.is_installed());

    host.dispatch(TraceEvent::Call, &frame("a.py", 1)).unwrap();
    host.dispatch(TraceEvent::Line, &frame("a.py", 9)).unwrap();
    assert_eq!(lines(&hits, "a.py"), [4]);
    assert_eq!(tracer.depth(), -1);

    // Safe to repeat.
    tracer.stop();
    assert!(!tracer.is_started());
}

#[test]
fn test_restart_keeps_stack_and_cache() {
    let host = HookSlot::<StepFrame>::new();
    let calls = Rc::new(Cell::new(0));
    let mut tracer = Tracer::new(counting_decider(Rc::clone(&calls)), Hits::default());

    tracer.start(&host);
    host.dispatch(TraceEvent::Call, &frame("a.py", 1)).unwrap();
    tracer.stop();
    tracer.start(&host);
    host.dispatch(TraceEvent::Call, &frame("a.py", 1)).unwrap();

    assert_eq!(tracer.depth(), 1);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_start_on_new_host_leaves_old_one() {
    let first = HookSlot::<StepFrame>::new();
    let second = HookSlot::<StepFrame>::new();
    let hits = Hits::default();
    let mut tracer = Tracer::new(counting_decider(Rc::default()), Rc::clone(&hits));

    tracer.start(&first);
    tracer.start(&second);
    assert!(!first.is_installed());
    assert!(second.is_installed());

    tracer.stop();
    assert!(!second.is_installed());
    first.dispatch(TraceEvent::Call, &frame("a.py", 1)).unwrap();
    first.dispatch(TraceEvent::Line, &frame("a.py", 7)).unwrap();
    assert!(hits.borrow().is_empty());
    assert_eq!(tracer.depth(), -1);
}

#[test]
fn test_detach_leaves_host_hook() {
    let host = HookSlot::<StepFrame>::new();
    let mut tracer = Tracer::new(counting_decider(Rc::default()), Hits::default());
    tracer.start(&host);
    tracer.detach();

    assert!(!tracer.is_started());
    assert!(host.is_installed());
    drop(tracer);
    assert!(host.is_installed());
}

#[test]
fn test_start_twice_on_same_host_stays_registered() {
    let host = HookSlot::<StepFrame>::new();
    let hits = Hits::default();
    let mut tracer = Tracer::new(counting_decider(Rc::default()), Rc::clone(&hits));

    tracer.start(&host);
    host.dispatch(TraceEvent::Call, &frame("a.py", 1)).unwrap();
    tracer.start(&host);
    host.dispatch(TraceEvent::Line, &frame("a.py", 2)).unwrap();

    assert!(host.is_installed());
    assert_eq!(lines(&hits, "a.py"), [2]);
}

#[test]
fn test_drop_deregisters() {
    let host = HookSlot::<StepFrame>::new();
    {
        let mut tracer = Tracer::new(counting_decider(Rc::default()), Hits::default());
        tracer.start(&host);
        host.dispatch(TraceEvent::Call, &frame("a.py", 1)).unwrap();
        assert!(host.is_installed());
    }
    assert!(!host.is_installed());
}

#[test]
fn test_stop_clears_replaced_hook() {
    struct Other;
    impl StepHook<StepFrame> for Other {
        fn on_step(&mut self, _: TraceEvent, _: &StepFrame) -> Result<()> {
            Ok(())
        }
    }

    let host = HookSlot::<StepFrame>::new();
    let mut tracer = Tracer::new(counting_decider(Rc::default()), Hits::default());
    tracer.start(&host);
    host.set_trace(Some(Rc::new(RefCell::new(Other))));

    tracer.stop();
    assert!(!tracer.is_started());
    assert!(!host.is_installed());
}

#[test]
fn test_decision_reentering_host_is_rejected() {
    let host = Rc::new(HookSlot::<StepFrame>::new());
    let inner = Rc::clone(&host);
    let decide = move |unit: &str, f: &StepFrame| -> std::result::Result<Option<Arc<str>>, DecisionError> {
        inner
            .dispatch(TraceEvent::Line, f)
            .map_err(|e| DecisionError::with_source("nested dispatch", e))?;
        Ok(Some(Arc::from(unit)))
    };
    let mut tracer = Tracer::new(decide, Hits::default());
    tracer.start(&*host);

    match host.dispatch(TraceEvent::Call, &frame("a.py", 1)) {
        Err(TraceError::Decision { source, .. }) => {
            assert_eq!(source.message(), "nested dispatch");
        }
        other => panic!("expected decision error, got {other:?}"),
    }
    tracer.stop();
}

#[test]
fn test_results_view() {
    let mut data = LineData::new();
    {
        let tracer = Tracer::new(counting_decider(Rc::default()), &mut data);
        tracer.trace(TraceEvent::Call, &frame("v.py", 1)).unwrap();
        tracer.trace(TraceEvent::Line, &frame("v.py", 12)).unwrap();
        assert_eq!(tracer.results().hit_count(), 1);
    }
    assert_eq!(data.lines(&Arc::from("v.py")), Some(&BTreeSet::from([12])));
}
