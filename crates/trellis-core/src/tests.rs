#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::HashSet;
    use std::rc::Rc;

    use crate::memo::*;
    use crate::reactive::{self, EffectOptions};
    use crate::scope::*;
    use crate::signal::*;
    use crate::{batch, effect, effect_with, flush_effects, on_cleanup, transaction, untrack, watch};
    use proptest::prelude::*;

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn counter() -> (Rc<Cell<usize>>, impl Fn() + Clone) {
        let runs = Rc::new(Cell::new(0));
        let bump = {
            let runs = runs.clone();
            move || runs.set(runs.get() + 1)
        };
        (runs, bump)
    }

    #[test]
    fn test_effect_runs_per_write_until_disposed() {
        init_logs();
        let counter_sig = signal(0);
        let (runs, bump) = counter();
        let e = {
            let c = counter_sig.clone();
            effect(move || {
                let _ = c.get();
                bump();
            })
        };
        counter_sig.set(1);
        counter_sig.set(2);
        counter_sig.set(3);
        assert_eq!(runs.get(), 4);

        e.dispose();
        e.dispose();
        counter_sig.set(4);
        assert_eq!(runs.get(), 4);
        assert_eq!(counter_sig.observer_count(), 0);
    }

    #[test]
    fn test_memo_computes_lazily_once_per_change() {
        let s1 = signal(1);
        let s2 = signal(2);
        let s3 = signal(3);
        let computations = Rc::new(Cell::new(0));
        let m = {
            let (s1, s2, s3) = (s1.clone(), s2.clone(), s3.clone());
            let computations = computations.clone();
            memo(move || {
                computations.set(computations.get() + 1);
                s1.get() * s1.get() + s2.get() + s3.get()
            })
        };
        assert_eq!(computations.get(), 0);
        assert_eq!(m.get(), 6);
        assert_eq!(computations.get(), 1);

        s2.set(20);
        assert_eq!(m.get(), 24);
        assert_eq!(computations.get(), 2);

        assert_eq!(m.get(), 24);
        assert_eq!(m.peek(), 24);
        assert_eq!(computations.get(), 2);
        assert_eq!(m.version(), 2);
    }

    #[test]
    fn test_batch_coalesces_runs() {
        let s1 = signal(1);
        let s2 = signal(2);
        let (runs, bump) = counter();
        let _e = {
            let (s1, s2) = (s1.clone(), s2.clone());
            effect(move || {
                let _ = s1.get() + s2.get();
                bump();
            })
        };
        assert_eq!(runs.get(), 1);

        batch(|| {
            s1.set(10);
            s2.set(20);
            assert_eq!(runs.get(), 1);
        });
        assert_eq!(runs.get(), 2);

        s1.set(11);
        s2.set(21);
        assert_eq!(runs.get(), 4);
    }

    #[test]
    fn test_transaction_rollback_keeps_values_and_flushes() {
        let s = signal(0);
        let seen = Rc::new(Cell::new(-1));
        let _e = {
            let (s, seen) = (s.clone(), seen.clone());
            effect(move || seen.set(s.get()))
        };
        let tx = transaction();
        s.set(5);
        assert_eq!(seen.get(), 0);
        tx.rollback();
        assert_eq!(s.get(), 5);
        assert_eq!(seen.get(), 5);
    }

    #[test]
    fn test_self_write_converges() {
        init_logs();
        let count = signal(0);
        let (runs, bump) = counter();
        let _e = {
            let count = count.clone();
            effect(move || {
                bump();
                let v = count.get();
                if v < 10 {
                    count.set(v + 1);
                }
            })
        };
        assert_eq!(count.peek(), 10);
        assert_eq!(runs.get(), 11);
    }

    #[test]
    fn test_unbounded_self_write_is_capped() {
        init_logs();
        let count = signal(0u64);
        let e = {
            let count = count.clone();
            effect(move || count.set(count.get() + 1))
        };
        assert!(count.peek() as usize <= reactive::MAX_EFFECT_RERUNS + 2);
        assert!(e.is_dirty());
        e.dispose();
    }

    #[test]
    fn test_dynamic_dependencies_are_dropped() {
        let flag = signal(true);
        let a = signal(1);
        let b = signal(2);
        let (runs, bump) = counter();
        let e = {
            let (flag, a, b) = (flag.clone(), a.clone(), b.clone());
            effect(move || {
                bump();
                if flag.get() {
                    let _ = a.get();
                } else {
                    let _ = b.get();
                }
            })
        };
        assert_eq!(e.dependencies(), vec![flag.id(), a.id()]);
        flag.set(false);
        assert_eq!(runs.get(), 2);
        assert_eq!(e.dependencies(), vec![flag.id(), b.id()]);

        a.set(100);
        assert_eq!(runs.get(), 2);
        b.set(200);
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn test_equal_write_is_a_no_op() {
        let s = Signal::distinct(3);
        let (runs, bump) = counter();
        let _e = {
            let s = s.clone();
            effect(move || {
                let _ = s.get();
                bump();
            })
        };
        let v = s.version();
        s.set(3);
        assert_eq!(s.version(), v);
        assert_eq!(runs.get(), 1);
        s.set(4);
        assert_eq!(s.version(), v + 1);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn test_untrack_and_peek_do_not_subscribe() {
        let a = signal(1);
        let b = signal(1);
        let (runs, bump) = counter();
        let _e = {
            let (a, b) = (a.clone(), b.clone());
            effect(move || {
                let _ = a.peek();
                let _ = untrack(|| b.get());
                bump();
            })
        };
        a.set(2);
        b.set(2);
        assert_eq!(runs.get(), 1);
        assert_eq!(a.observer_count(), 0);
        assert_eq!(b.observer_count(), 0);
    }

    #[test]
    fn test_cleanups_run_before_rerun_and_on_dispose() {
        let s = signal(0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let e = {
            let (s, log) = (s.clone(), log.clone());
            effect(move || {
                let v = s.get();
                log.borrow_mut().push(format!("run {v}"));
                let log = log.clone();
                on_cleanup(move || log.borrow_mut().push(format!("clean {v}")));
            })
        };
        s.set(1);
        e.dispose();
        assert_eq!(
            *log.borrow(),
            vec!["run 0", "clean 0", "run 1", "clean 1"]
        );
    }

    #[test]
    fn test_panicking_body_stays_dirty_and_recovers() {
        let s = signal(0);
        let ok = Rc::new(Cell::new(0));
        let e = {
            let (s, ok) = (s.clone(), ok.clone());
            effect(move || {
                if s.get() == 1 {
                    panic!("boom");
                }
                ok.set(ok.get() + 1);
            })
        };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| s.set(1)));
        assert!(result.is_err());
        assert!(e.is_dirty());
        assert!(!e.is_running());
        assert!(reactive::current_effect().is_none());

        s.set(2);
        assert_eq!(ok.get(), 2);
        assert!(!e.is_dirty());
    }

    #[test]
    fn test_deferred_effects_wait_for_flush() {
        let s = signal(0);
        let hook_calls = Rc::new(Cell::new(0));
        {
            let hook_calls = hook_calls.clone();
            crate::set_schedule_hook(Some(Rc::new(move || hook_calls.set(hook_calls.get() + 1))));
        }
        let (runs, bump) = counter();
        let e = {
            let s = s.clone();
            effect_with(EffectOptions::deferred(), move || {
                let _ = s.get();
                bump();
            })
        };
        assert_eq!(runs.get(), 1);

        s.set(1);
        s.set(2);
        assert_eq!(runs.get(), 1);
        assert!(e.is_dirty());
        assert!(crate::has_pending_effects());
        assert_eq!(hook_calls.get(), 1);

        flush_effects();
        assert_eq!(runs.get(), 2);
        assert!(!crate::has_pending_effects());
        crate::set_schedule_hook(None);
    }

    #[test]
    fn test_lazy_effect_runs_on_first_flush() {
        let (runs, bump) = counter();
        let _e = effect_with(EffectOptions::lazy(), move || bump());
        assert_eq!(runs.get(), 0);
        flush_effects();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_scope_disposes_owned_effects() {
        let s = signal(0);
        let (runs, bump) = counter();
        let cleaned = Rc::new(Cell::new(false));
        let scope = Scope::new();
        scope.run(|| {
            let s = s.clone();
            let cleaned = cleaned.clone();
            effect(move || {
                let _ = s.get();
                bump();
                let cleaned = cleaned.clone();
                on_cleanup(move || cleaned.set(true));
            });
        });
        assert_eq!(scope.effect_count(), 1);
        s.set(1);
        assert_eq!(runs.get(), 2);

        scope.dispose();
        assert!(cleaned.get());
        s.set(2);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn test_watch_and_subscribe_unsubscribe() {
        let s = signal(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let unsub = {
            let seen = seen.clone();
            s.subscribe(move |v| seen.borrow_mut().push(*v))
        };
        let (runs, bump) = counter();
        let stop = {
            let s = s.clone();
            watch(move || {
                let _ = s.get();
                bump();
            })
        };
        s.set(1);
        unsub.run();
        stop.run();
        s.set(2);
        assert_eq!(*seen.borrow(), vec![1]);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn test_effect_reading_memo_reruns_on_upstream_change() {
        let base = signal(1);
        let doubled = {
            let base = base.clone();
            memo(move || base.get() * 2)
        };
        let seen = Rc::new(Cell::new(0));
        let _e = {
            let (doubled, seen) = (doubled.clone(), seen.clone());
            effect(move || seen.set(doubled.get()))
        };
        assert_eq!(seen.get(), 2);
        base.set(5);
        assert_eq!(seen.get(), 10);
    }

    #[test]
    fn test_effect_over_memo_and_its_source_runs_once_per_write() {
        let s = signal(1);
        let m = {
            let s = s.clone();
            memo(move || s.get() * 2)
        };
        let seen = Rc::new(RefCell::new(Vec::new()));
        let e = {
            let (s, m, seen) = (s.clone(), m.clone(), seen.clone());
            effect(move || seen.borrow_mut().push((m.get(), s.get())))
        };
        s.set(2);
        assert_eq!(*seen.borrow(), vec![(2, 1), (4, 2)]);
        s.set(3);
        assert_eq!(seen.borrow().len(), 3);
        e.dispose();
    }

    #[test]
    fn test_observer_is_dirty_or_queued_right_after_set() {
        let s = signal(0);
        let e = {
            let s = s.clone();
            effect_with(EffectOptions::deferred(), move || {
                let _ = s.get();
            })
        };
        s.set(1);
        assert!(e.is_dirty() || e.is_running());
        assert!(crate::has_pending_effects());
        flush_effects();

        let tx = transaction();
        s.set(2);
        assert!(e.is_dirty());
        tx.commit();
        flush_effects();
        assert!(!e.is_dirty());
    }

    proptest! {
        #[test]
        fn batch_runs_each_affected_effect_once(
            deps in prop::collection::vec(prop::collection::vec(0usize..6, 0..4), 1..8),
            writes in prop::collection::hash_set(0usize..6, 0..6),
        ) {
            let signals: Vec<Signal<i32>> = (0..6).map(|_| signal(0)).collect();
            let runs: Vec<Rc<Cell<usize>>> = deps.iter().map(|_| Rc::new(Cell::new(0))).collect();
            let effects: Vec<_> = deps
                .iter()
                .zip(&runs)
                .map(|(d, r)| {
                    let reads: Vec<Signal<i32>> = d.iter().map(|i| signals[*i].clone()).collect();
                    let r = r.clone();
                    effect(move || {
                        for s in &reads {
                            let _ = s.get();
                        }
                        r.set(r.get() + 1);
                    })
                })
                .collect();
            for r in &runs {
                r.set(0);
            }

            batch(|| {
                for w in &writes {
                    signals[*w].set(1);
                }
            });

            for (d, r) in deps.iter().zip(&runs) {
                let affected = d.iter().collect::<HashSet<_>>().iter().any(|i| writes.contains(*i));
                prop_assert_eq!(r.get(), usize::from(affected));
            }
            for e in effects {
                e.dispose();
            }
        }

        #[test]
        fn dependency_set_matches_reads_of_last_run(
            reads in prop::collection::vec(prop::collection::hash_set(0usize..5, 0..5), 1..5),
        ) {
            let signals: Vec<Signal<i32>> = (0..5).map(|_| signal(0)).collect();
            let plan = Rc::new(RefCell::new(reads[0].clone()));
            let e = {
                let signals = signals.clone();
                let plan = plan.clone();
                effect(move || {
                    for i in plan.borrow().iter() {
                        let _ = signals[*i].get();
                    }
                })
            };
            for step in &reads {
                *plan.borrow_mut() = step.clone();
                prop_assert!(e.run());
                prop_assert!(!e.is_dirty());
                let got: HashSet<_> = e.dependencies().into_iter().collect();
                let want: HashSet<_> = step.iter().map(|i| signals[*i].id()).collect();
                prop_assert_eq!(got, want);
            }
            e.dispose();
        }
    }
}
