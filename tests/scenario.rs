use std::time::Duration;

use leptos_deferred::{
    BoxError, DeferredBundle, ErrorReport, FieldDisplay, FieldPhase, Presenter, RenderOptions,
    Renderer,
};
use tokio::time::{sleep, Instant};

struct Text;

impl Presenter<&'static str> for Text {
    type View = String;

    fn critical(&self, _: &str, value: &&'static str) -> String {
        value.to_string()
    }

    fn placeholder(&self, _: &str) -> String {
        "...".to_string()
    }

    fn resolved(&self, _: &str, value: &&'static str) -> String {
        value.to_string()
    }

    fn errored(&self, report: &ErrorReport) -> String {
        report.message.clone()
    }
}

async fn after(
    ms: u64,
    outcome: Result<&'static str, &'static str>,
) -> Result<&'static str, BoxError> {
    sleep(Duration::from_millis(ms)).await;
    outcome.map_err(Into::into)
}

type Timeline = Vec<(String, Duration)>;

async fn run(l1_ms: u64, l2_ms: u64) -> anyhow::Result<(Timeline, Vec<FieldDisplay<String>>)> {
    let start = Instant::now();
    let bundle = DeferredBundle::builder()
        .value("c1", "A")
        .lazy("l1", after(l1_ms, Ok("B")))
        .lazy("l2", after(l2_ms, Err("boom")))
        .build()
        .await?;
    let mut renderer = Renderer::attach(&bundle, Text, RenderOptions::new());

    let initial = renderer.snapshot();
    assert_eq!(initial[0].phase, FieldPhase::Critical);
    assert_eq!(initial[0].view, "A");
    assert!(initial[1..]
        .iter()
        .all(|display| display.phase == FieldPhase::Placeholder));

    let mut updates = renderer.updates().expect("updates not yet taken");
    let mut timeline = Vec::new();
    while let Some(update) = updates.recv().await {
        timeline.push((update.field, start.elapsed()));
    }
    Ok((timeline, renderer.snapshot()))
}

#[tokio::test(start_paused = true)]
async fn critical_then_lazy_in_completion_order() -> anyhow::Result<()> {
    let (timeline, last) = run(10, 5).await?;

    assert_eq!(timeline.len(), 2);
    assert_eq!(timeline[0].0, "l2");
    assert!(timeline[0].1 >= Duration::from_millis(5));
    assert!(timeline[0].1 < Duration::from_millis(10));
    assert_eq!(timeline[1].0, "l1");
    assert!(timeline[1].1 >= Duration::from_millis(10));

    assert_eq!(
        last.iter()
            .map(|display| (display.field.as_str(), display.phase, display.view.as_str()))
            .collect::<Vec<_>>(),
        vec![
            ("c1", FieldPhase::Critical, "A"),
            ("l1", FieldPhase::Resolved, "B"),
            ("l2", FieldPhase::Errored, "boom"),
        ],
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn swapped_timings_reach_the_same_state() -> anyhow::Result<()> {
    let (forward, forward_last) = run(10, 5).await?;
    let (reverse, reverse_last) = run(5, 10).await?;

    assert_eq!(forward[0].0, "l2");
    assert_eq!(reverse[0].0, "l1");
    assert_eq!(forward_last, reverse_last);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_critical_produces_nothing() {
    let result = DeferredBundle::builder()
        .critical("c1", after(5, Err("critical boom")))
        .lazy("l1", after(1, Ok("B")))
        .build()
        .await;

    let error = result.expect_err("bundle must not be produced");
    assert_eq!(error.field(), "c1");
    assert_eq!(
        std::error::Error::source(&error).map(ToString::to_string),
        Some("critical boom".to_string()),
    );
}
