//! Orchestrator (C14): wires sessions, guardrails, agents, tools, and the
//! STT/TTS boundary together. Two entry points exist — `process_transcript`,
//! the text-in/text-out pipeline shared by the HTTP ingress handlers, and
//! `run_audio_session`, the full-duplex loop wired as four cooperating
//! tasks over bounded channels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_stream::stream;
use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::adapters::{FrameStream, InputAdapter, OutputAdapter};
use crate::agents::AgentRegistry;
use crate::audio::constants::CANONICAL_FRAME_MS;
use crate::audio::{CanonicalFrame, ProcessingStatus};
use crate::clients::{GuardrailClient, LlmClient, SttClient, TtsClient};
use crate::config::AppConfig;
use crate::control::Metrics;
use crate::error::{GuardrailReason, SwitchboardError};
use crate::jitter_buffer::JitterBuffer;
use crate::session::SessionStore;
use crate::tools::{ToolInvocationResult, ToolRegistry};
use crate::vad::segmenter::SegmenterEvent;
use crate::vad::{VADFactory, VadSegmenter};

const GUARDRAIL_APOLOGY: &str = "I'm sorry, I can't help with that request.";
const AGENT_FALLBACK_APOLOGY: &str = "Sorry, I'm having trouble responding right now. Please try again.";
const DEFAULT_VOICE_ID: &str = "default";

/// Outcome of routing one transcript through the text pipeline: the shape
/// returned by `POST /api/v1/transcripts`.
#[derive(Debug, Clone)]
pub struct TranscriptOutcome {
    pub session_id: Uuid,
    pub agent: String,
    pub response_text: String,
    pub actions: Vec<ToolInvocationResult>,
    pub correlation_id: Uuid,
}

/// Shared resources every entry point into the pipeline needs, constructed
/// once in the composition root and handed around behind an `Arc`.
pub struct Orchestrator {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<dyn SessionStore>,
    pub agents: Arc<AgentRegistry>,
    pub tools: Arc<ToolRegistry>,
    pub guardrail: Arc<GuardrailClient>,
    pub stt: Arc<SttClient>,
    pub tts: Arc<TtsClient>,
    pub llm: Arc<LlmClient>,
    pub metrics: Arc<Metrics>,
}

struct ActiveSessionGuard(Arc<Metrics>);

impl ActiveSessionGuard {
    fn new(metrics: Arc<Metrics>) -> Self {
        metrics.active_sessions.inc();
        Self(metrics)
    }
}

impl Drop for ActiveSessionGuard {
    fn drop(&mut self) {
        self.0.active_sessions.dec();
    }
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<AppConfig>,
        sessions: Arc<dyn SessionStore>,
        agents: Arc<AgentRegistry>,
        tools: Arc<ToolRegistry>,
        guardrail: Arc<GuardrailClient>,
        stt: Arc<SttClient>,
        tts: Arc<TtsClient>,
        llm: Arc<LlmClient>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            sessions,
            agents,
            tools,
            guardrail,
            stt,
            tts,
            llm,
            metrics,
        }
    }

    /// Text-in/text-out pipeline backing `POST /api/v1/transcripts` and
    /// `POST /api/v1/notifications/transcript`: guardrail the input,
    /// route to an agent, dispatch any resulting tool actions, guardrail
    /// the output, and persist the turn.
    pub async fn process_transcript(
        &self,
        session_id: Uuid,
        owner: &str,
        channel: &str,
        transcript: &str,
        correlation_id: Uuid,
    ) -> Result<TranscriptOutcome, SwitchboardError> {
        let started = Instant::now();
        self.sessions.get_or_create_session(session_id, owner, channel).await?;
        let ctx = self.sessions.get_context(session_id).await?;

        let input_verdict = self.guardrail.validate_input(transcript);
        if !input_verdict.safe {
            let reason = input_verdict.reason.unwrap_or(GuardrailReason::PolicyViolation);
            self.metrics.guardrail_blocks_total.with_label_values(&[reason.as_str()]).inc();
            self.sessions
                .log_execution(session_id, "guardrail", transcript, GUARDRAIL_APOLOGY, started.elapsed().as_millis() as u64)
                .await?;
            return Ok(TranscriptOutcome {
                session_id,
                agent: "guardrail".to_string(),
                response_text: GUARDRAIL_APOLOGY.to_string(),
                actions: Vec::new(),
                correlation_id,
            });
        }

        let (agent_name, response) = match self.agents.route(&ctx, &input_verdict.sanitized).await {
            Ok(pair) => pair,
            Err(SwitchboardError::AgentTimeout(_)) => {
                warn!(session_id = %session_id, correlation_id = %correlation_id, "agent exceeded its time budget");
                self.metrics.agent_invocations_total.with_label_values(&["timeout"]).inc();
                self.sessions
                    .log_execution(session_id, "timeout", transcript, AGENT_FALLBACK_APOLOGY, started.elapsed().as_millis() as u64)
                    .await?;
                return Ok(TranscriptOutcome {
                    session_id,
                    agent: "timeout".to_string(),
                    response_text: AGENT_FALLBACK_APOLOGY.to_string(),
                    actions: Vec::new(),
                    correlation_id,
                });
            }
            Err(e) => return Err(e),
        };
        self.metrics.agent_invocations_total.with_label_values(&[agent_name.as_str()]).inc();

        let mut action_results = Vec::with_capacity(response.actions.len());
        for action in &response.actions {
            match self.tools.invoke(action).await {
                Ok(result) => {
                    self.metrics.tool_invocations_total.with_label_values(&[&action.tool_name, "ok"]).inc();
                    action_results.push(result);
                }
                Err(e) => {
                    self.metrics.tool_invocations_total.with_label_values(&[&action.tool_name, "error"]).inc();
                    warn!(tool = %action.tool_name, correlation_id = %correlation_id, error = %e, "tool invocation failed");
                    action_results.push(ToolInvocationResult {
                        ok: false,
                        data: serde_json::json!({ "error": e.to_string() }),
                        elapsed_ms: 0,
                    });
                }
            }
        }

        let raw_text = response.text.unwrap_or_default();
        let output_verdict = self.guardrail.validate_output(&raw_text).await;
        let response_text = if !output_verdict.safe {
            let reason = output_verdict.reason.unwrap_or(GuardrailReason::PolicyViolation);
            self.metrics.guardrail_blocks_total.with_label_values(&[reason.as_str()]).inc();
            GUARDRAIL_APOLOGY.to_string()
        } else {
            if output_verdict.reason.is_some() {
                self.metrics.guardrail_blocks_total.with_label_values(&[GuardrailReason::PiiLeak.as_str()]).inc();
            }
            output_verdict.filtered
        };

        self.sessions
            .log_execution(session_id, &agent_name, transcript, &response_text, started.elapsed().as_millis() as u64)
            .await?;

        Ok(TranscriptOutcome {
            session_id,
            agent: agent_name,
            response_text,
            actions: action_results,
            correlation_id,
        })
    }

    /// Runs a full-duplex audio session until the input adapter closes or
    /// `cancellation` fires: an adapter-input consumer feeds a jitter
    /// buffer, a fixed-cadence ticker drains it through the VAD segmenter,
    /// a transcription/routing/synthesis task turns each completed segment
    /// into audio, and a dedicated playback task plays it — kept separate
    /// from synthesis so a segment arriving mid-playback can genuinely
    /// observe, and interrupt, output in flight.
    ///
    /// Agent-produced audio (`AgentResponse::audio`) is not consumed here —
    /// the spoken reply always round-trips through TTS from
    /// `response_text`, since splicing a second audio source into the
    /// barge-in-aware playback stream needs a sample-rate/timing contract
    /// this core doesn't define yet. See DESIGN.md.
    pub async fn run_audio_session(
        self: Arc<Self>,
        session_id: Uuid,
        owner: String,
        channel: String,
        mut input: Box<dyn InputAdapter>,
        mut output: Box<dyn OutputAdapter>,
        cancellation: CancellationToken,
    ) -> Result<(), SwitchboardError> {
        let _active_guard = ActiveSessionGuard::new(self.metrics.clone());
        let session_correlation_id = Uuid::new_v4();
        self.sessions.get_or_create_session(session_id, &owner, &channel).await?;

        input.start().await?;
        let mut raw_frames = input.stream();

        let jitter = Arc::new(parking_lot::Mutex::new(JitterBuffer::new(self.config.audio.jitter_max_frames)));
        let (segment_tx, mut segment_rx) = mpsc::channel(4);
        let (playback_tx, mut playback_rx) = mpsc::channel::<Vec<CanonicalFrame>>(2);
        let (pause_tx, pause_rx) = watch::channel(false);
        let playback_active = Arc::new(AtomicBool::new(false));

        let input_task = {
            let jitter = jitter.clone();
            let cancellation = cancellation.clone();
            let metrics = self.metrics.clone();
            let session_label = session_id.to_string();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancellation.cancelled() => break,
                        frame = raw_frames.next() => {
                            match frame {
                                Some(frame) => {
                                    metrics.frames_processed_total.with_label_values(&[&session_label]).inc();
                                    jitter.lock().push(frame);
                                }
                                None => break,
                            }
                        }
                    }
                }
            })
        };

        let tick_task = {
            let jitter = jitter.clone();
            let cancellation = cancellation.clone();
            let metrics = self.metrics.clone();
            let session_label = session_id.to_string();
            let vad = VADFactory::best_available_with_aggressiveness(self.config.audio.vad_aggressiveness);
            let max_segment_ms = self.config.audio.vad_max_segment_ms;
            tokio::spawn(async move {
                let mut segmenter = VadSegmenter::with_max_segment_ms(vad, session_id, session_correlation_id, max_segment_ms);
                let mut ticker = tokio::time::interval(Duration::from_millis(CANONICAL_FRAME_MS));
                loop {
                    tokio::select! {
                        _ = cancellation.cancelled() => break,
                        _ = ticker.tick() => {
                            let frame = jitter.lock().pop();
                            metrics.jitter_depth_frames.with_label_values(&[&session_label]).set(jitter.lock().depth() as f64);
                            match segmenter.push(frame) {
                                Ok(SegmenterEvent::SegmentReady(segment)) => {
                                    metrics.segments_created_total.with_label_values(&[&session_label]).inc();
                                    if segment_tx.send(segment).await.is_err() {
                                        break;
                                    }
                                }
                                Ok(_) => {}
                                Err(e) => warn!(session_id = %session_label, error = %e, "vad error"),
                            }
                        }
                    }
                }
                if let Ok(Some(segment)) = segmenter.flush() {
                    let _ = segment_tx.send(segment).await;
                }
            })
        };

        // Owns `output` and runs concurrently with `process_task`, so a
        // segment arriving while a reply is playing genuinely observes
        // `playback_active == true` and can signal a pause in flight.
        let playback_task = {
            let cancellation = cancellation.clone();
            let session_label = session_id.to_string();
            let playback_active = playback_active.clone();
            tokio::spawn(async move {
                loop {
                    let frames = tokio::select! {
                        _ = cancellation.cancelled() => break,
                        frames = playback_rx.recv() => match frames {
                            Some(frames) => frames,
                            None => break,
                        },
                    };
                    playback_active.store(true, Ordering::Relaxed);
                    let frame_stream = with_barge_in(frames, pause_rx.clone());
                    if let Err(e) = output.play(frame_stream).await {
                        warn!(session_id = %session_label, error = %e, "playback failure");
                    }
                    playback_active.store(false, Ordering::Relaxed);
                }
                let _ = output.stop().await;
            })
        };

        let process_task = {
            let orchestrator = self.clone();
            let cancellation = cancellation.clone();
            let metrics = self.metrics.clone();
            let session_label = session_id.to_string();
            let playback_active = playback_active.clone();
            tokio::spawn(async move {
                loop {
                    let segment = tokio::select! {
                        _ = cancellation.cancelled() => break,
                        segment = segment_rx.recv() => match segment {
                            Some(segment) => segment,
                            None => break,
                        },
                    };

                    if playback_active.load(Ordering::Relaxed) {
                        metrics.barge_ins_total.with_label_values(&[&session_label]).inc();
                        let _ = pause_tx.send(true);
                    }

                    let processed = match orchestrator.stt.transcribe(&segment).await {
                        Ok(processed) => processed,
                        Err(e) => {
                            metrics.stt_requests_total.with_label_values(&["failed"]).inc();
                            warn!(session_id = %session_label, error = %e, "stt failure");
                            continue;
                        }
                    };
                    match processed.status {
                        ProcessingStatus::Ok => metrics.stt_requests_total.with_label_values(&["ok"]).inc(),
                        ProcessingStatus::Empty => {
                            metrics.stt_requests_total.with_label_values(&["empty"]).inc();
                            continue;
                        }
                        ProcessingStatus::Failed => {
                            metrics.stt_requests_total.with_label_values(&["failed"]).inc();
                            continue;
                        }
                    };

                    let turn_correlation_id = Uuid::new_v4();
                    let outcome = match orchestrator
                        .process_transcript(session_id, &owner, &channel, &processed.transcript, turn_correlation_id)
                        .await
                    {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            warn!(session_id = %session_label, error = %e, "pipeline failure");
                            continue;
                        }
                    };

                    let frames = match orchestrator.tts.synthesize(&outcome.response_text, DEFAULT_VOICE_ID).await {
                        Ok(frames) => {
                            metrics.tts_requests_total.with_label_values(&["ok"]).inc();
                            frames
                        }
                        Err(e) => {
                            metrics.tts_requests_total.with_label_values(&["error"]).inc();
                            warn!(session_id = %session_label, error = %e, "tts failure");
                            continue;
                        }
                    };

                    let _ = pause_tx.send(false);
                    if playback_tx.send(frames).await.is_err() {
                        break;
                    }
                }
            })
        };

        let (input_res, tick_res, playback_res, process_res) = tokio::join!(input_task, tick_task, playback_task, process_task);
        for (component, is_panic) in [
            ("input", input_res.as_ref().err().map(|e| e.is_panic()).unwrap_or(false)),
            ("tick", tick_res.as_ref().err().map(|e| e.is_panic()).unwrap_or(false)),
            ("playback", playback_res.as_ref().err().map(|e| e.is_panic()).unwrap_or(false)),
            ("process", process_res.as_ref().err().map(|e| e.is_panic()).unwrap_or(false)),
        ] {
            if is_panic {
                self.metrics.panics_total.with_label_values(&[component]).inc();
                warn!(session_id = %session_id, component, "worker task panicked; session terminated");
            }
        }
        Ok(())
    }
}

/// Wraps a finished set of frames so playback stops early once `pause`
/// flips true, checked at every 20ms frame boundary — well inside the
/// bound a responsive barge-in requires.
fn with_barge_in(frames: Vec<CanonicalFrame>, pause: watch::Receiver<bool>) -> FrameStream {
    Box::pin(stream! {
        for frame in frames {
            if *pause.borrow() {
                break;
            }
            yield frame;
        }
    })
}
