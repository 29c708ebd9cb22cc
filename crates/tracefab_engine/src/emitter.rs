//! Realtime replay of a planned trace.
//!
//! The emitter turns a plan list into a merged Start/End event schedule and
//! waits out each event at wall clock before acting on it. Cancellation
//! ends every open span, children first, with an error status.

use crate::export::{lock, SpanExporter};
use crate::observer::Observer;
use crate::plan::{duration_ns, materialize, span_id, SpanPlan, CANCELLED};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracefab_model::{Span, SpanInfo, SpanStatus};

/// Exporter shared between the engine and its per-trace emitter tasks.
pub type SharedExporter = Arc<Mutex<dyn SpanExporter>>;

/// Observer list shared between the engine and its per-trace emitter tasks.
pub type SharedObservers = Arc<Mutex<Vec<Box<dyn Observer>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Start,
    End,
}

#[derive(Debug, Clone, Copy)]
struct Event {
    at: Duration,
    kind: EventKind,
    index: usize,
}

/// Builds the merged, sorted event schedule for a plan list.
///
/// Ties at identical times resolve to keep emission well-nested: starts
/// precede ends; among starts the parent (lower index) goes first; among
/// ends the child (higher index) goes first.
fn build_events(plans: &[SpanPlan]) -> Vec<Event> {
    let mut events = Vec::with_capacity(plans.len() * 2);
    for plan in plans {
        events.push(Event {
            at: plan.start,
            kind: EventKind::Start,
            index: plan.index,
        });
        events.push(Event {
            at: plan.end,
            kind: EventKind::End,
            index: plan.index,
        });
    }
    events.sort_by(|a, b| {
        a.at.cmp(&b.at).then_with(|| match (a.kind, b.kind) {
            (EventKind::Start, EventKind::End) => std::cmp::Ordering::Less,
            (EventKind::End, EventKind::Start) => std::cmp::Ordering::Greater,
            (EventKind::Start, EventKind::Start) => a.index.cmp(&b.index),
            (EventKind::End, EventKind::End) => b.index.cmp(&a.index),
        })
    });
    events
}

/// Builds the observer payload for a finished span.
pub(crate) fn span_info(plan: &SpanPlan, span: &Span) -> SpanInfo {
    SpanInfo {
        service: plan.service.clone(),
        operation: plan.operation.clone(),
        timestamp: std::time::UNIX_EPOCH + Duration::from_nanos(span.end_time_ns),
        duration: plan.duration(),
        is_error: plan.is_error,
        kind: plan.kind,
        attributes: span.attributes.clone(),
        scenarios: plan.scenarios.clone(),
    }
}

/// Replays one planned trace at wall-clock times.
///
/// Plan offsets are measured from `anchor`; span timestamps are anchored at
/// `base_epoch_ns` (which already carries the engine's time offset). On
/// cancellation every open span ends immediately with status Error
/// "cancelled", children before parents, and remaining events are dropped.
pub async fn emit_plan(
    plans: Vec<SpanPlan>,
    trace_hex: String,
    trace_seed: u64,
    base_epoch_ns: u64,
    anchor: Instant,
    exporter: SharedExporter,
    observers: SharedObservers,
    mut shutdown: watch::Receiver<bool>,
) {
    let events = build_events(&plans);
    let mut open: Vec<usize> = Vec::new();

    for event in events {
        let cancelled = tokio::select! {
            () = tokio::time::sleep_until(anchor + event.at) => false,
            () = wait_for_shutdown(&mut shutdown) => true,
        };
        if cancelled {
            cancel_open(&plans, &open, &trace_hex, trace_seed, base_epoch_ns, anchor, &exporter);
            return;
        }

        match event.kind {
            EventKind::Start => open.push(event.index),
            EventKind::End => {
                open.retain(|&i| i != event.index);
                let plan = &plans[event.index];
                let span = materialize(plan, &trace_hex, trace_seed, base_epoch_ns);
                let info = span_info(plan, &span);
                for observer in lock(&observers).iter_mut() {
                    observer.on_span(&info);
                }
                lock(&exporter).export(span);
            }
        }
    }
}

/// Resolves when the shutdown channel signals `true`. A closed channel
/// means no cancellation can ever arrive, so the future stays pending.
pub(crate) async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|&stop| stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Ends every open span at the cancellation instant, children first.
fn cancel_open(
    plans: &[SpanPlan],
    open: &[usize],
    trace_hex: &str,
    trace_seed: u64,
    base_epoch_ns: u64,
    anchor: Instant,
    exporter: &SharedExporter,
) {
    let now_offset = anchor.elapsed();
    let mut guard = lock(exporter);
    for &index in open.iter().rev() {
        let plan = &plans[index];
        let end = now_offset.max(plan.start);
        let span = Span {
            trace_id: trace_hex.to_string(),
            span_id: span_id(trace_seed, plan.index),
            parent_span_id: plan.parent.map(|p| span_id(trace_seed, p)),
            service: plan.service.clone(),
            name: plan.operation.clone(),
            kind: plan.kind,
            start_time_ns: base_epoch_ns.saturating_add(duration_ns(plan.start)),
            end_time_ns: base_epoch_ns.saturating_add(duration_ns(end)),
            status: SpanStatus::error(CANCELLED),
            attributes: plan.start_attrs.clone(),
        };
        guard.export(span);
    }
}
