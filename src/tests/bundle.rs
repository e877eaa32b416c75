use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::time::{sleep, timeout, Instant};

use super::{reject, resolve};
use crate::{BundleConstructionError, DeferredBundle, EntryState, FieldSettlementError};

#[tokio::test(start_paused = true)]
async fn build_waits_for_critical_only() -> anyhow::Result<()> {
    let start = Instant::now();
    let bundle = DeferredBundle::builder()
        .value("critical0", "Immediate".to_string())
        .critical("critical1", resolve("Critical 1".to_string(), 250))
        .critical("critical2", resolve("Critical 2".to_string(), 500))
        .lazy("lazy1", resolve("Lazy 1".to_string(), 1000))
        .build()
        .await?;

    // the critical fields were awaited concurrently
    assert!(start.elapsed() >= Duration::from_millis(500));
    assert!(start.elapsed() < Duration::from_millis(750));
    assert_eq!(
        bundle.critical_value("critical2").map(String::as_str),
        Some("Critical 2"),
    );
    assert_eq!(bundle.critical().len(), 3);
    assert_eq!(bundle.pending_fields(), vec!["lazy1"]);
    assert!(!bundle.is_done());

    let states = bundle.settled().await;
    assert!(start.elapsed() >= Duration::from_millis(1000));
    assert!(matches!(&states["lazy1"], EntryState::Settled(v) if v == "Lazy 1"));
    assert!(bundle.is_done());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn lazy_computations_start_at_build() -> anyhow::Result<()> {
    let started = Arc::new(AtomicUsize::new(0));
    let lazy = {
        let started = Arc::clone(&started);
        async move {
            started.fetch_add(1, Ordering::SeqCst);
            resolve(1u32, 100).await
        }
    };
    let bundle = DeferredBundle::builder()
        .critical("c", resolve(0u32, 50))
        .lazy("l", lazy)
        .build()
        .await?;

    // the lazy computation ran while the critical one was awaited
    assert_eq!(started.load(Ordering::SeqCst), 1);

    // observing the field any number of times never triggers it again
    for _ in 0..3 {
        let outcome = bundle.lazy_entry("l").expect("lazy field").outcome().await;
        assert!(matches!(outcome, Some(Ok(1))));
    }
    assert_eq!(started.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn duplicate_field_rejected_before_triggering() {
    let started = Arc::new(AtomicUsize::new(0));
    let lazy = {
        let started = Arc::clone(&started);
        async move {
            started.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(1u32)
        }
    };
    let result = DeferredBundle::builder()
        .value("a", 0u32)
        .lazy("b", lazy)
        .critical("a", async { Ok::<_, Infallible>(2) })
        .build()
        .await;

    match result {
        Err(BundleConstructionError::DuplicateField { field }) => assert_eq!(field, "a"),
        other => panic!("unexpected result {other:?}"),
    }
    tokio::task::yield_now().await;
    assert_eq!(started.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn critical_failure_fails_bundle_and_cancels_lazy() {
    let finished = Arc::new(AtomicUsize::new(0));
    let lazy = {
        let finished = Arc::clone(&finished);
        async move {
            let value = resolve(1u32, 100).await;
            finished.fetch_add(1, Ordering::SeqCst);
            value
        }
    };
    let result = DeferredBundle::builder()
        .critical("good", resolve(0u32, 5))
        .critical("bad", reject("Kaboom!", 10))
        .lazy("lazy", lazy)
        .build()
        .await;

    let error = result.expect_err("critical failure must fail the bundle");
    assert_eq!(error.field(), "bad");
    assert_eq!(error.to_string(), "critical field `bad` failed: Kaboom!");

    // the lazy computation was aborted along with the bundle
    sleep(Duration::from_millis(500)).await;
    assert_eq!(finished.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn dropped_build_cancels_lazy() {
    let finished = Arc::new(AtomicUsize::new(0));
    let lazy = {
        let finished = Arc::clone(&finished);
        async move {
            let value = resolve(1u32, 100).await;
            finished.fetch_add(1, Ordering::SeqCst);
            value
        }
    };
    let build = DeferredBundle::builder()
        .critical("slow", resolve(0u32, 1000))
        .lazy("lazy", lazy)
        .build();

    // the caller gave up on the bundle while the critical field was pending
    assert!(timeout(Duration::from_millis(10), build).await.is_err());

    sleep(Duration::from_millis(500)).await;
    assert_eq!(finished.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn lazy_failure_is_captured() -> anyhow::Result<()> {
    let bundle = DeferredBundle::builder()
        .value("critical", "A".to_string())
        .lazy("lazy", resolve("B".to_string(), 10))
        .lazy("lazyError", reject("Kaboom!", 5))
        .build()
        .await?;

    let states = bundle.settled().await;
    assert!(matches!(&states["lazy"], EntryState::Settled(v) if v == "B"));
    match &states["lazyError"] {
        EntryState::Failed(FieldSettlementError::Failed { field, source }) => {
            assert_eq!(field, "lazyError");
            assert_eq!(source.to_string(), "Kaboom!");
        }
        other => panic!("unexpected state {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn field_names_cover_both_namespaces() -> anyhow::Result<()> {
    let bundle = DeferredBundle::builder()
        .lazy("l2", async { Ok::<_, Infallible>(2u32) })
        .value("c1", 1u32)
        .lazy("l1", async { Ok::<_, Infallible>(1u32) })
        .critical("c2", async { Ok::<_, Infallible>(2u32) })
        .build()
        .await?;

    assert_eq!(
        bundle.field_names().collect::<Vec<_>>(),
        vec!["c1", "c2", "l1", "l2"],
    );
    assert!(bundle.contains("l1"));
    assert!(bundle.contains("c2"));
    assert!(!bundle.contains("missing"));
    assert!(bundle.lazy_entry("c1").is_none());
    assert!(bundle.critical_value("l1").is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_pending_fields_only() -> anyhow::Result<()> {
    let bundle = DeferredBundle::builder()
        .lazy("fast", resolve(1u32, 5))
        .lazy("slow", resolve(2u32, 1000))
        .build()
        .await?;

    sleep(Duration::from_millis(10)).await;
    bundle.cancel();
    bundle.cancel();

    let fast = bundle.lazy_entry("fast").expect("fast field");
    let slow = bundle.lazy_entry("slow").expect("slow field");
    assert!(matches!(fast.state(), EntryState::Settled(1)));
    assert!(!fast.is_cancelled());
    assert!(slow.is_cancelled());
    assert!(bundle.is_done());

    // waiting on a cancelled bundle does not hang
    let states = timeout(Duration::from_millis(50), bundle.settled()).await?;
    assert!(states["slow"].is_pending());

    sleep(Duration::from_millis(2000)).await;
    assert!(slow.is_pending());
    Ok(())
}

#[tokio::test]
async fn panicking_lazy_is_abandoned() -> anyhow::Result<()> {
    let bundle = DeferredBundle::<u32>::builder()
        .lazy("unstable", async {
            if true {
                panic!("computation panicked");
            }
            Ok::<_, Infallible>(1)
        })
        .build()
        .await?;

    let outcome = bundle
        .lazy_entry("unstable")
        .expect("unstable field")
        .outcome()
        .await;
    assert!(matches!(
        outcome,
        Some(Err(FieldSettlementError::Abandoned { .. }))
    ));
    Ok(())
}
