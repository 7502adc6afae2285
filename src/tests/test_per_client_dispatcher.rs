use std::{sync::Arc, thread};

use super::{
    runtime::block_on,
    support::{T0, local_dispatcher, route},
};
use crate::{GlobalWindowMode, RejectionKind, Remaining, window};

#[test]
fn two_scope_scenario() {
    block_on(async {
        let (dispatcher, _store) = local_dispatcher(60, 2, GlobalWindowMode::PerClient).await;
        let a = route("GET", "/a", 1, 30);

        let d1 = dispatcher.check("1.2.3.4", &a, T0).await.unwrap();
        assert!(d1.is_allowed());
        assert_eq!(d1.route.remaining, Remaining::Available(0));
        assert_eq!(d1.global.remaining, Remaining::Available(1));
        assert_eq!(d1.route.reset_at, T0 + 30);
        assert_eq!(d1.global.reset_at, T0 + 60);

        let d2 = dispatcher.check("1.2.3.4", &a, T0 + 1).await.unwrap();
        assert!(!d2.is_allowed());
        assert_eq!(
            d2.rejection().unwrap().kind,
            RejectionKind::RouteLimitExceeded
        );
        assert_eq!(d2.route.remaining, Remaining::Exceeded);
        assert_eq!(d2.global.remaining, Remaining::Available(0));
        // Deadlines are those of the running windows, not the candidates.
        assert_eq!(d2.route.reset_at, T0 + 30);
        assert_eq!(d2.global.reset_at, T0 + 60);

        let d3 = dispatcher.check("1.2.3.4", &a, T0 + 2).await.unwrap();
        assert!(d3.global_exceeded());
        assert_eq!(
            d3.rejection().unwrap().kind,
            RejectionKind::GlobalLimitExceeded
        );

        // A fresh route with plenty of quota is still blocked by the global scope.
        let b = route("GET", "/b", 5, 30);
        let d4 = dispatcher.check("1.2.3.4", &b, T0 + 3).await.unwrap();
        assert_eq!(d4.route.remaining, Remaining::Available(4));
        assert_eq!(
            d4.rejection().unwrap().kind,
            RejectionKind::GlobalLimitExceeded
        );
    });
}

#[test]
fn remaining_counts_down_to_zero_then_rejects() {
    block_on(async {
        let (dispatcher, _store) = local_dispatcher(60, 100, GlobalWindowMode::PerClient).await;
        let r = route("POST", "/orders", 5, 30);

        for (i, expected) in (0..5).rev().enumerate() {
            let d = dispatcher.check("c", &r, T0 + i as i64).await.unwrap();
            assert!(d.is_allowed());
            assert_eq!(d.route.remaining, Remaining::Available(expected));
        }

        let d = dispatcher.check("c", &r, T0 + 5).await.unwrap();
        assert_eq!(d.rejection().unwrap().kind, RejectionKind::RouteLimitExceeded);
    });
}

#[test]
fn counter_restarts_after_its_deadline() {
    block_on(async {
        let (dispatcher, _store) = local_dispatcher(10, 2, GlobalWindowMode::PerClient).await;
        let r = route("GET", "/a", 1, 5);

        dispatcher.check("c", &r, T0).await.unwrap();
        dispatcher.check("c", &r, T0 + 1).await.unwrap();
        let exhausted = dispatcher.check("c", &r, T0 + 2).await.unwrap();
        assert!(exhausted.route_exceeded() && exhausted.global_exceeded());

        // Still inside both windows at their deadlines.
        let at_deadline = dispatcher.check("c", &r, T0 + 5).await.unwrap();
        assert!(at_deadline.route_exceeded());

        // Route window over, global window still running.
        let route_rolled = dispatcher.check("c", &r, T0 + 6).await.unwrap();
        assert_eq!(route_rolled.route.remaining, Remaining::Available(0));
        assert_eq!(route_rolled.route.reset_at, T0 + 11);
        assert!(route_rolled.global_exceeded());

        // Both windows over.
        let both_rolled = dispatcher.check("c", &r, T0 + 12).await.unwrap();
        assert!(both_rolled.is_allowed());
        assert_eq!(both_rolled.global.remaining, Remaining::Available(1));
        assert_eq!(both_rolled.global.reset_at, T0 + 22);
        assert_eq!(both_rolled.route.remaining, Remaining::Available(0));
    });
}

#[test]
fn clients_do_not_interfere() {
    block_on(async {
        let (dispatcher, _store) = local_dispatcher(60, 10, GlobalWindowMode::PerClient).await;
        let r = route("GET", "/a", 2, 30);

        for t in 0..3 {
            dispatcher.check("10.0.0.1", &r, T0 + t).await.unwrap();
        }
        let a = dispatcher.check("10.0.0.1", &r, T0 + 3).await.unwrap();
        assert!(a.route_exceeded());

        let b = dispatcher.check("10.0.0.2", &r, T0 + 3).await.unwrap();
        assert!(b.is_allowed());
        assert_eq!(b.route.remaining, Remaining::Available(1));
        assert_eq!(b.global.remaining, Remaining::Available(9));
    });
}

#[test]
fn routes_are_independent_but_share_the_global_counter() {
    block_on(async {
        let (dispatcher, _store) = local_dispatcher(60, 10, GlobalWindowMode::PerClient).await;
        let x = route("GET", "/x", 1, 30);
        let y = route("GET", "/y", 3, 30);

        dispatcher.check("c", &x, T0).await.unwrap();
        let x2 = dispatcher.check("c", &x, T0).await.unwrap();
        assert!(x2.route_exceeded());

        let y1 = dispatcher.check("c", &y, T0).await.unwrap();
        assert!(y1.is_allowed());
        assert_eq!(y1.route.remaining, Remaining::Available(2));
        assert_eq!(y1.global.remaining, Remaining::Available(7));
    });
}

#[test]
fn method_is_part_of_the_route_identity() {
    block_on(async {
        let (dispatcher, _store) = local_dispatcher(60, 10, GlobalWindowMode::PerClient).await;

        dispatcher.check("c", &route("GET", "/a", 1, 30), T0).await.unwrap();
        let post = dispatcher
            .check("c", &route("POST", "/a", 1, 30), T0)
            .await
            .unwrap();
        assert!(post.is_allowed());
    });
}

#[test]
fn global_windows_are_per_client() {
    block_on(async {
        let (dispatcher, _store) = local_dispatcher(60, 1, GlobalWindowMode::PerClient).await;
        let r = route("GET", "/a", 10, 30);

        dispatcher.check("early", &r, T0).await.unwrap();
        dispatcher.check("late", &r, T0 + 30).await.unwrap();

        // early's window ended at T0 + 60; late's runs until T0 + 90.
        let early = dispatcher.check("early", &r, T0 + 61).await.unwrap();
        assert!(early.is_allowed());
        assert_eq!(early.global.reset_at, T0 + 121);

        let late = dispatcher.check("late", &r, T0 + 61).await.unwrap();
        assert!(late.global_exceeded());
        assert_eq!(late.global.reset_at, T0 + 90);

        // No dispatcher-wide deadline exists in this mode.
        assert_eq!(dispatcher.global_deadline(), None);
    });
}

#[test]
fn accessors_do_not_touch_counters() {
    block_on(async {
        let (dispatcher, store) = local_dispatcher(60, 10, GlobalWindowMode::PerClient).await;
        let r = route("GET", "/a", 5, 30);

        dispatcher.check("c", &r, T0).await.unwrap();
        let before = store.count("limiter:{c}:global", T0);

        for _ in 0..3 {
            let _ = dispatcher.global_limit();
            let _ = dispatcher.global_window();
            let _ = dispatcher.global_deadline();
            let _ = dispatcher.global_deadline_string();
        }

        assert_eq!(before, Some(1));
        assert_eq!(store.count("limiter:{c}:global", T0), before);
        assert_eq!(store.count("limiter:{c}:route:GET:/a", T0), Some(1));
        assert_eq!(store.len(), 2);
    });
}

#[test]
fn forced_reset_restarts_both_counters() {
    block_on(async {
        let (dispatcher, store) = local_dispatcher(60, 3, GlobalWindowMode::PerClient).await;
        let r = route("GET", "/a", 1, 30);

        dispatcher.check("c", &r, T0).await.unwrap();
        assert!(dispatcher.check("c", &r, T0 + 1).await.unwrap().route_exceeded());

        let reset = dispatcher.reset("c", &r, T0 + 2).await.unwrap();
        assert!(reset.is_allowed());
        assert_eq!(reset.route.remaining, Remaining::Available(0));
        assert_eq!(reset.global.remaining, Remaining::Available(2));
        assert_eq!(reset.route.reset_at, T0 + 32);
        assert_eq!(reset.global.reset_at, T0 + 62);
        assert_eq!(store.count("limiter:{c}:global", T0 + 2), Some(1));

        let next = dispatcher.check("c", &r, T0 + 3).await.unwrap();
        assert!(next.route_exceeded());
        assert_eq!(next.global.remaining, Remaining::Available(1));
    });
}

#[test]
fn concurrent_checks_admit_exactly_the_limit() {
    let (dispatcher, _store) =
        block_on(local_dispatcher(60, 1_000, GlobalWindowMode::PerClient));
    let dispatcher = Arc::new(dispatcher);
    let r = route("GET", "/hot", 50, 30);

    let admitted: usize = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = Arc::clone(&dispatcher);
                let r = r.clone();
                scope.spawn(move || {
                    futures::executor::block_on(async {
                        let mut admitted = 0;
                        for _ in 0..25 {
                            let d = dispatcher.check("c", &r, T0).await.unwrap();
                            if d.is_allowed() {
                                admitted += 1;
                            }
                        }
                        admitted
                    })
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).sum()
    });

    assert_eq!(admitted, 50);

    let last = block_on(dispatcher.check("c", &r, T0)).unwrap();
    assert!(last.route_exceeded());
    assert_eq!(last.global.remaining, Remaining::Available(1_000 - 201));
}

#[test]
fn check_now_uses_wall_clock() {
    block_on(async {
        let (dispatcher, _store) = local_dispatcher(60, 10, GlobalWindowMode::PerClient).await;
        let before = window::unix_now();

        let d = dispatcher
            .check_now("c", &route("GET", "/a", 5, 30))
            .await
            .unwrap();

        assert!(d.is_allowed());
        assert!(d.route.reset_at >= before + 30);
        assert!(d.route.reset_at <= window::unix_now() + 30);
    });
}
