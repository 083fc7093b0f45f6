//! Synthesis dispatcher.
//!
//! Takes requests off the intake one at a time and reserves their sequence id
//! right away. Synthesis then runs in the background (one task per request, one
//! subtask per phrase), so slow requests never hold up the ones behind them;
//! the ordering buffer puts the finished bundles back in order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::intake::Intake;
use super::normalize::TextNormalizer;
use super::registry::{VoiceId, VoiceRegistry};
use super::request::{Bundle, Lane, Phrase, PhraseAudio, SpeechRequest, split_phrases};
use crate::config::ReaderConfig;
use crate::tts::{PhraseSynthesizer, SynthesisError, synthesize_with_timeout};

/// Next sequence id of each lane.
#[derive(Debug, Default)]
struct Sequencer {
    priority: u64,
    normal: u64,
}

impl Sequencer {
    fn reserve(&mut self, lane: Lane) -> u64 {
        let next = match lane {
            Lane::Priority => &mut self.priority,
            Lane::Normal => &mut self.normal,
        };
        let id = *next;
        *next += 1;
        id
    }
}

/// Shared pieces every synthesis task needs.
#[derive(Clone)]
struct Renderer {
    synthesizer: Arc<dyn PhraseSynthesizer>,
    limiter: Arc<Semaphore>,
    timeout: Duration,
    sample_rate: u32,
}

/// A request with its sequence id and voice resolved.
struct Job {
    sequence_id: u64,
    priority: bool,
    voice: VoiceId,
    phrases: Vec<Phrase>,
}

pub struct Dispatcher {
    intake: Intake,
    registry: Arc<VoiceRegistry>,
    normalizer: Arc<dyn TextNormalizer>,
    renderer: Renderer,
    sequencer: Sequencer,
}

impl Dispatcher {
    pub fn new(
        intake: Intake,
        registry: Arc<VoiceRegistry>,
        synthesizer: Arc<dyn PhraseSynthesizer>,
        normalizer: Arc<dyn TextNormalizer>,
        config: &ReaderConfig,
    ) -> Self {
        let renderer = Renderer {
            synthesizer,
            limiter: Arc::new(Semaphore::new(config.max_concurrent_synthesis.max(1))),
            timeout: config.synthesis_timeout,
            sample_rate: config.output_sample_rate,
        };
        Self { intake, registry, normalizer, renderer, sequencer: Sequencer::default() }
    }

    /// Dispatch requests until the intake is closed and drained, then wait for
    /// in-flight synthesis. `cancel` aborts everything still running.
    pub async fn run(mut self, bundles: mpsc::UnboundedSender<Bundle>, cancel: CancellationToken) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(result) = tasks.join_next(), if !tasks.is_empty() => log_task_result(result),
                request = self.intake.next() => match request {
                    Some(request) => {
                        let job = self.prepare(request);
                        let renderer = self.renderer.clone();
                        let bundles = bundles.clone();
                        tasks.spawn(async move {
                            let bundle = renderer.assemble(job).await;
                            if bundles.send(bundle).is_err() {
                                debug!("Playback has stopped, discarding bundle");
                            }
                        });
                    }
                    None => break,
                },
            }
        }

        if !tasks.is_empty() {
            debug!("Waiting for {} synthesis task(s)", tasks.len());
        }
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Cancelling {} synthesis task(s)", tasks.len());
                    tasks.shutdown().await;
                    break;
                }
                result = tasks.join_next() => match result {
                    Some(result) => log_task_result(result),
                    None => break,
                },
            }
        }
        debug!("Dispatcher finished");
    }

    /// Resolve voice and phrases, and reserve the sequence id.
    fn prepare(&mut self, request: SpeechRequest) -> Job {
        let voice = if request.priority {
            self.registry.system_voice().clone()
        } else {
            self.registry.assign(&request.speaker_id)
        };
        let text = self.normalizer.normalize(&request.text);
        let phrases = split_phrases(&text);
        let sequence_id = self.sequencer.reserve(request.lane());

        debug!(
            "Dispatching {:?} #{} from {} ({} phrase(s), voice {})",
            request.lane(),
            sequence_id,
            request.speaker_id,
            phrases.len(),
            voice
        );
        Job { sequence_id, priority: request.priority, voice, phrases }
    }
}

fn log_task_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result
        && !e.is_cancelled()
    {
        warn!("Synthesis task failed: {}", e);
    }
}

impl Renderer {
    /// Synthesize all phrases of a job concurrently and collect them in phrase order.
    async fn assemble(self, job: Job) -> Bundle {
        let Job { sequence_id, priority, voice, phrases } = job;
        let total = phrases.len();

        let mut set = JoinSet::new();
        for phrase in phrases {
            let renderer = self.clone();
            let voice = voice.clone();
            set.spawn(async move {
                let index = phrase.index;
                renderer.render(phrase, &voice).await.map_err(|e| (index, e))
            });
        }

        let mut rendered = Vec::with_capacity(total);
        while let Some(result) = set.join_next().await {
            match result {
                Ok(Ok(phrase)) => rendered.push(phrase),
                Ok(Err((index, e))) => warn!("Phrase {} of #{} dropped: {}", index + 1, sequence_id, e),
                Err(e) => warn!("Phrase task of #{} failed: {}", sequence_id, e),
            }
        }
        rendered.sort_by_key(|phrase| phrase.index);

        if rendered.len() < total {
            warn!("Bundle #{}: {} of {} phrase(s) synthesized", sequence_id, rendered.len(), total);
        }
        Bundle { sequence_id, priority, phrases: rendered }
    }

    /// One phrase: synthesize, expand to stereo and match the output rate.
    async fn render(&self, phrase: Phrase, voice: &VoiceId) -> Result<PhraseAudio, SynthesisError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| SynthesisError::Backend("synthesis limiter closed".to_string()))?;

        let clip = synthesize_with_timeout(self.synthesizer.as_ref(), &phrase.text, voice, self.timeout).await?;
        let clip = clip.into_stereo();

        let audio = if clip.sample_rate == self.sample_rate {
            clip
        } else {
            let to_rate = self.sample_rate;
            tokio::task::spawn_blocking(move || clip.resampled(to_rate))
                .await
                .map_err(|e| SynthesisError::Backend(format!("resampling task failed: {}", e)))?
                .map_err(|e| SynthesisError::Backend(format!("resampling failed: {}", e)))?
        };

        Ok(PhraseAudio { index: phrase.index, audio })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::audio::PlaybackSink;
    use crate::speech::normalize::UrlAbbreviator;
    use crate::speech::scheduler::{PlaybackScheduler, PlaybackSummary};
    use crate::speech::testing::{FixedPermutation, RecordingSink, ScriptedSynthesizer, TEST_SAMPLE_RATE};

    const PLAY_TIME: Duration = Duration::from_millis(500);

    fn config() -> ReaderConfig {
        ReaderConfig {
            synthesis_timeout: Duration::from_secs(5),
            output_sample_rate: TEST_SAMPLE_RATE,
            ..ReaderConfig::new(vec!["a".into(), "b".into(), "c".into()], "sys")
        }
    }

    /// Run the whole pipeline over `requests` and return what the sink played.
    async fn run_pipeline(synth: Arc<ScriptedSynthesizer>, requests: Vec<SpeechRequest>) -> (RecordingSink, PlaybackSummary) {
        let config = config();
        let sink = RecordingSink::new(PLAY_TIME);
        let intake = Intake::new();
        for request in requests {
            intake.enqueue(request).unwrap();
        }
        intake.close();

        let registry = Arc::new(VoiceRegistry::with_shuffle(&config, Box::new(FixedPermutation(vec![0, 1, 2]))));
        let dispatcher = Dispatcher::new(intake, registry, synth, Arc::new(UrlAbbreviator::default()), &config);
        let playback_sink: Arc<dyn PlaybackSink> = Arc::new(sink.clone());
        let scheduler = PlaybackScheduler::new(playback_sink, &config);

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let dispatching = tokio::spawn(dispatcher.run(tx, cancel.clone()));
        let summary = scheduler.run(rx, cancel).await;
        dispatching.await.unwrap();
        (sink, summary)
    }

    #[test]
    fn test_sequence_ids_per_lane() {
        let mut sequencer = Sequencer::default();
        assert_eq!(sequencer.reserve(Lane::Normal), 0);
        assert_eq!(sequencer.reserve(Lane::Normal), 1);
        assert_eq!(sequencer.reserve(Lane::Priority), 0);
        assert_eq!(sequencer.reserve(Lane::Normal), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_first_request_still_plays_first() {
        let synth = ScriptedSynthesizer::new();
        synth.delay("A", Duration::from_secs(2));
        synth.delay("B", Duration::from_millis(100));

        let (sink, summary) =
            run_pipeline(synth, vec![SpeechRequest::chat("alice", "A"), SpeechRequest::chat("bob", "B")]).await;

        assert_eq!(sink.played(), vec!["A", "B"]);
        assert_eq!(summary.played, 2);
        let started = sink.started();
        assert!(started[1].1 - started[0].1 >= PLAY_TIME);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_phrase_is_skipped() {
        let synth = ScriptedSynthesizer::new();
        synth.fail("two.");
        synth.delay("one.", Duration::from_millis(300));

        let (sink, summary) = run_pipeline(
            synth,
            vec![SpeechRequest::chat("alice", "one. two. three."), SpeechRequest::chat("alice", "next")],
        )
        .await;

        assert_eq!(sink.played(), vec!["one.", "three.", "next"]);
        assert_eq!(summary.played, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_without_audio_keeps_its_slot() {
        let synth = ScriptedSynthesizer::new();
        synth.fail("broken");
        synth.delay("broken", Duration::from_secs(1));

        let (sink, summary) =
            run_pipeline(synth, vec![SpeechRequest::chat("alice", "broken"), SpeechRequest::chat("bob", "fine")]).await;

        assert_eq!(sink.played(), vec!["fine"]);
        assert_eq!(summary, PlaybackSummary { played: 1, silent: 1, ..Default::default() });
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthesis_timeout_drops_phrase() {
        let synth = ScriptedSynthesizer::new();
        synth.delay("stuck", Duration::from_secs(60));

        let (sink, summary) =
            run_pipeline(synth, vec![SpeechRequest::chat("alice", "stuck"), SpeechRequest::chat("alice", "quick")]).await;

        assert_eq!(sink.played(), vec!["quick"]);
        assert_eq!(summary.silent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_announcement_overtakes_queued_chat() {
        let synth = ScriptedSynthesizer::new();
        synth.delay("first", Duration::from_secs(1));
        synth.delay("second", Duration::from_secs(1));
        let (sink, _) = run_pipeline(
            synth,
            vec![
                SpeechRequest::chat("alice", "first"),
                SpeechRequest::chat("bob", "second"),
                SpeechRequest::system("bob joined"),
            ],
        )
        .await;

        assert_eq!(sink.played(), vec!["bob joined", "first", "second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_voices_follow_speakers() {
        let synth = ScriptedSynthesizer::new();
        let (_, _) = run_pipeline(
            synth.clone(),
            vec![
                SpeechRequest::chat("alice", "hi from alice"),
                SpeechRequest::chat("bob", "hi from bob"),
                SpeechRequest::chat("alice", "alice again"),
                SpeechRequest::system("announcement"),
            ],
        )
        .await;

        assert_eq!(synth.voice_for("hi from alice"), Some(VoiceId::from("a")));
        assert_eq!(synth.voice_for("hi from bob"), Some(VoiceId::from("b")));
        assert_eq!(synth.voice_for("alice again"), Some(VoiceId::from("a")));
        assert_eq!(synth.voice_for("announcement"), Some(VoiceId::from("sys")));
        assert_eq!(synth.calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_urls_are_normalized_before_synthesis() {
        let synth = ScriptedSynthesizer::new();
        let (sink, _) = run_pipeline(synth.clone(), vec![SpeechRequest::chat("alice", "see https://example.com/x")]).await;

        assert_eq!(sink.played(), vec!["see URL"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_inflight_synthesis() {
        let config = config();
        let synth = ScriptedSynthesizer::new();
        synth.delay("forever", Duration::from_secs(3600));

        let intake = Intake::new();
        intake.enqueue(SpeechRequest::chat("alice", "forever")).unwrap();
        let registry = Arc::new(VoiceRegistry::new(&config));
        let dispatcher = Dispatcher::new(intake.clone(), registry, synth, Arc::new(UrlAbbreviator::default()), &config);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(dispatcher.run(tx, cancel.clone()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert!(rx.recv().await.is_none());
    }
}
