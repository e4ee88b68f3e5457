//! Prometheus metrics registry: counters, histograms, and gauges for
//! every stage of the pipeline, exposed as text exposition at
//! `GET /metrics` when observability is enabled.

use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, Opts, Registry, TextEncoder,
};

/// Process-wide metric instruments plus the registry they're bound to.
/// Constructed once at startup and shared behind an `Arc` with every
/// component that records a measurement.
pub struct Metrics {
    registry: Registry,
    pub frames_processed_total: CounterVec,
    pub frames_dropped_total: CounterVec,
    pub segments_created_total: CounterVec,
    pub stt_requests_total: CounterVec,
    pub tts_requests_total: CounterVec,
    pub llm_requests_total: CounterVec,
    pub agent_invocations_total: CounterVec,
    pub guardrail_blocks_total: CounterVec,
    pub tool_invocations_total: CounterVec,
    pub barge_ins_total: CounterVec,
    pub panics_total: CounterVec,
    pub stage_latency_seconds: HistogramVec,
    pub jitter_depth_frames: GaugeVec,
    pub active_sessions: Gauge,
    pub health_status: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let frames_processed_total = CounterVec::new(
            Opts::new("frames_processed_total", "Canonical frames processed"),
            &["session_id"],
        )
        .expect("valid metric");
        let frames_dropped_total = CounterVec::new(
            Opts::new("frames_dropped_total", "Canonical frames dropped"),
            &["reason"],
        )
        .expect("valid metric");
        let segments_created_total = CounterVec::new(
            Opts::new("segments_created_total", "VAD-delimited speech segments created"),
            &["session_id"],
        )
        .expect("valid metric");
        let stt_requests_total = CounterVec::new(
            Opts::new("stt_requests_total", "STT transcription requests"),
            &["status"],
        )
        .expect("valid metric");
        let tts_requests_total = CounterVec::new(
            Opts::new("tts_requests_total", "TTS synthesis requests"),
            &["status"],
        )
        .expect("valid metric");
        let llm_requests_total = CounterVec::new(
            Opts::new("llm_requests_total", "LLM completion requests"),
            &["status"],
        )
        .expect("valid metric");
        let agent_invocations_total = CounterVec::new(
            Opts::new("agent_invocations_total", "Agent dispatches by selected agent name"),
            &["name"],
        )
        .expect("valid metric");
        let guardrail_blocks_total = CounterVec::new(
            Opts::new("guardrail_blocks_total", "Guardrail-blocked requests"),
            &["reason"],
        )
        .expect("valid metric");
        let tool_invocations_total = CounterVec::new(
            Opts::new("tool_invocations_total", "Tool registry invocations"),
            &["name", "status"],
        )
        .expect("valid metric");
        let barge_ins_total = CounterVec::new(
            Opts::new("barge_ins_total", "User barge-ins during playback"),
            &["session_id"],
        )
        .expect("valid metric");
        let panics_total = CounterVec::new(
            Opts::new("panics_total", "Uncaught panics captured at worker boundaries"),
            &["component"],
        )
        .expect("valid metric");
        let stage_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("stage_latency_seconds", "Per-stage processing latency"),
            &["stage"],
        )
        .expect("valid metric");
        let jitter_depth_frames = GaugeVec::new(
            Opts::new("jitter_depth_frames", "Current jitter buffer depth"),
            &["session_id"],
        )
        .expect("valid metric");
        let active_sessions = Gauge::new("active_sessions", "Currently resident sessions").expect("valid metric");
        let health_status = Gauge::new("health_status", "1 = healthy, 0.5 = degraded, 0 = unhealthy").expect("valid metric");

        for collector in [
            Box::new(frames_processed_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(frames_dropped_total.clone()),
            Box::new(segments_created_total.clone()),
            Box::new(stt_requests_total.clone()),
            Box::new(tts_requests_total.clone()),
            Box::new(llm_requests_total.clone()),
            Box::new(agent_invocations_total.clone()),
            Box::new(guardrail_blocks_total.clone()),
            Box::new(tool_invocations_total.clone()),
            Box::new(barge_ins_total.clone()),
            Box::new(panics_total.clone()),
            Box::new(stage_latency_seconds.clone()),
            Box::new(jitter_depth_frames.clone()),
            Box::new(active_sessions.clone()),
            Box::new(health_status.clone()),
        ] {
            registry.register(collector).expect("metric names are unique");
        }

        Self {
            registry,
            frames_processed_total,
            frames_dropped_total,
            segments_created_total,
            stt_requests_total,
            tts_requests_total,
            llm_requests_total,
            agent_invocations_total,
            guardrail_blocks_total,
            tool_invocations_total,
            barge_ins_total,
            panics_total,
            stage_latency_seconds,
            jitter_depth_frames,
            active_sessions,
            health_status,
        }
    }

    /// Renders the registry as Prometheus text exposition format for
    /// `GET /metrics`.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer).expect("encoding a gathered metric family never fails");
        String::from_utf8(buffer).expect("prometheus text exposition is always valid utf8")
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_metric_names() {
        let metrics = Metrics::new();
        metrics.frames_processed_total.with_label_values(&["s1"]).inc();
        metrics.active_sessions.set(3.0);
        let text = metrics.render();
        assert!(text.contains("frames_processed_total"));
        assert!(text.contains("active_sessions"));
    }
}
