//! GenerationController - the Idle / Loading / Success / Error state machine
//! around a video job.
//!
//! While Loading, two timers run: an elapsed-seconds counter and a rotating
//! status message. Both are locals of the `generate` future, so they stop on
//! every path out of Loading. If the future is dropped mid-flight, a guard
//! cancels the job and returns the controller to Idle.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::genai::{GenerationRequest, VideoGenerator};
use crate::handle::VideoHandle;

/// Status messages shown while a video is being generated, in display order.
pub const LOADING_MESSAGES: [&str; 10] = [
    "Warming up the digital director...",
    "Gathering the creative pixels...",
    "Storyboarding your vision...",
    "Setting up the virtual cameras...",
    "This can take a few minutes",
    "Compositing the scene...",
    "Applying special effects...",
    "Rendering the final cut...",
    "Patience is the quality of enduring delay...",
    "Almost there, the premiere is about to start!",
];

/// Period of the elapsed-time counter.
pub const ELAPSED_TICK: Duration = Duration::from_secs(1);

/// Period of the status message rotation.
pub const MESSAGE_ROTATION: Duration = Duration::from_secs(5);

/// Phase of the generation workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// Everything a presentation layer needs to render the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSnapshot {
    pub state: LifecycleState,
    pub elapsed_secs: u64,
    pub status_message: &'static str,
    pub error: Option<String>,
    pub video_locator: Option<String>,
}

impl Default for LifecycleSnapshot {
    fn default() -> Self {
        Self {
            state: LifecycleState::Idle,
            elapsed_secs: 0,
            status_message: LOADING_MESSAGES[0],
            error: None,
            video_locator: None,
        }
    }
}

/// Reasons `generate` did not run to a Success/Error outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    #[error("Prompt must not be empty")]
    EmptyPrompt,

    #[error("A video is already being generated")]
    Busy,

    #[error("Generation was cancelled")]
    Cancelled,
}

#[derive(Debug, Default)]
struct Inner {
    state: LifecycleState,
    elapsed_secs: u64,
    message_index: usize,
    error: Option<String>,
    video: Option<VideoHandle>,
    /// Bumped by every generate and reset; stale generations compare against it.
    epoch: u64,
    cancel: Option<CancellationToken>,
}

impl Inner {
    fn snapshot(&self) -> LifecycleSnapshot {
        LifecycleSnapshot {
            state: self.state,
            elapsed_secs: self.elapsed_secs,
            status_message: LOADING_MESSAGES[self.message_index],
            error: self.error.clone(),
            video_locator: self.video.as_ref().map(|v| v.locator().to_string()),
        }
    }

    /// Clear result, error and timers, releasing any held video.
    fn clear(&mut self) {
        if let Some(video) = self.video.take() {
            video.dispose();
        }
        self.error = None;
        self.elapsed_secs = 0;
        self.message_index = 0;
    }
}

/// Returns an abandoned generation to Idle when dropped while still armed.
struct LoadingGuard<'a> {
    inner: &'a Mutex<Inner>,
    updates: &'a watch::Sender<LifecycleSnapshot>,
    epoch: u64,
    armed: bool,
}

impl LoadingGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if inner.epoch != self.epoch || inner.state != LifecycleState::Loading {
            return;
        }
        log::warn!("Generation {} dropped while loading; cancelling job", self.epoch);
        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
        }
        inner.clear();
        inner.state = LifecycleState::Idle;
        inner.epoch += 1;
        self.updates.send_replace(inner.snapshot());
    }
}

/// Drives one video generation at a time and tracks its lifecycle.
pub struct GenerationController<G> {
    generator: G,
    inner: Mutex<Inner>,
    updates: watch::Sender<LifecycleSnapshot>,
}

impl<G: VideoGenerator> GenerationController<G> {
    pub fn new(generator: G) -> Self {
        let (updates, _) = watch::channel(LifecycleSnapshot::default());
        Self {
            generator,
            inner: Mutex::new(Inner::default()),
            updates,
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    fn publish(&self, inner: &Inner) {
        self.updates.send_replace(inner.snapshot());
    }

    /// Apply a timer update, unless a reset or newer generation took over.
    fn tick(&self, epoch: u64, update: impl FnOnce(&mut Inner)) {
        let mut inner = self.lock();
        if inner.epoch == epoch && inner.state == LifecycleState::Loading {
            update(&mut inner);
            self.publish(&inner);
        }
    }

    /// Generate a video for `request`.
    ///
    /// Moves to Loading, runs the job, and ends in Success (video held) or
    /// Error (message held). Returns the state reached.
    ///
    /// # Errors
    ///
    /// - `EmptyPrompt` if the prompt is blank (state unchanged)
    /// - `Busy` if a generation is already in flight (state unchanged)
    /// - `Cancelled` if `reset` was called before the job finished
    pub async fn generate(&self, request: GenerationRequest) -> Result<LifecycleState, ControllerError> {
        if request.prompt.trim().is_empty() {
            return Err(ControllerError::EmptyPrompt);
        }

        let (epoch, cancel) = {
            let mut inner = self.lock();
            if inner.state == LifecycleState::Loading {
                log::warn!("Ignoring generate request: already loading");
                return Err(ControllerError::Busy);
            }
            inner.clear();
            inner.state = LifecycleState::Loading;
            inner.epoch += 1;
            let cancel = CancellationToken::new();
            inner.cancel = Some(cancel.clone());
            self.publish(&inner);
            (inner.epoch, cancel)
        };
        log::info!("Generation {} started", epoch);
        let mut guard = LoadingGuard {
            inner: &self.inner,
            updates: &self.updates,
            epoch,
            armed: true,
        };

        let outcome = {
            let started = Instant::now();
            let mut clock = time::interval_at(started + ELAPSED_TICK, ELAPSED_TICK);
            let mut rotation = time::interval_at(started + MESSAGE_ROTATION, MESSAGE_ROTATION);
            clock.set_missed_tick_behavior(MissedTickBehavior::Skip);
            rotation.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let job = self.generator.submit_and_await(&request, cancel.clone());
            tokio::pin!(job);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break None,
                    result = &mut job => break Some(result),
                    _ = clock.tick() => self.tick(epoch, |inner| {
                        inner.elapsed_secs = started.elapsed().as_secs();
                    }),
                    _ = rotation.tick() => self.tick(epoch, |inner| {
                        inner.message_index = (inner.message_index + 1) % LOADING_MESSAGES.len();
                    }),
                }
            }
        };

        guard.disarm();
        let Some(result) = outcome else {
            log::info!("Generation {} cancelled", epoch);
            return Err(ControllerError::Cancelled);
        };

        let mut inner = self.lock();
        if inner.epoch != epoch {
            log::info!("Generation {} superseded, discarding its outcome", epoch);
            if let Ok(video) = result {
                video.dispose();
            }
            return Err(ControllerError::Cancelled);
        }

        inner.cancel = None;
        match result {
            Ok(video) => {
                log::info!("Generation {} succeeded: {}", epoch, video.locator());
                inner.video = Some(video);
                inner.state = LifecycleState::Success;
            }
            Err(e) => {
                log::error!("Generation {} failed: {}", epoch, e);
                inner.error = Some(e.to_string());
                inner.state = LifecycleState::Error;
            }
        }
        self.publish(&inner);
        Ok(inner.state)
    }

    /// Return to Idle, releasing any held video and cancelling an in-flight job.
    pub fn reset(&self) {
        let mut inner = self.lock();
        if let Some(cancel) = inner.cancel.take() {
            log::info!("Reset while loading; cancelling job");
            cancel.cancel();
        }
        inner.clear();
        inner.state = LifecycleState::Idle;
        inner.epoch += 1;
        self.publish(&inner);
    }
}

impl<G> GenerationController<G> {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        self.lock().snapshot()
    }

    /// Receive a snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleSnapshot> {
        self.updates.subscribe()
    }

    pub fn state(&self) -> LifecycleState {
        self.lock().state
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.lock().elapsed_secs
    }

    pub fn status_message(&self) -> &'static str {
        LOADING_MESSAGES[self.lock().message_index]
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    /// Run `f` against the held video, if any.
    pub fn with_video<R>(&self, f: impl FnOnce(&VideoHandle) -> R) -> Option<R> {
        self.lock().video.as_ref().map(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genai::{GenerationError, VideoJobError};
    use crate::handle::HandleTracker;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    enum Outcome {
        Video(&'static [u8]),
        MissingResult,
    }

    /// Generator that sleeps for a fixed time and then succeeds or fails.
    struct FakeGenerator {
        delay: Duration,
        outcome: Outcome,
        tracker: Arc<HandleTracker>,
        calls: AtomicUsize,
    }

    impl FakeGenerator {
        fn new(delay: Duration, outcome: Outcome) -> Self {
            Self {
                delay,
                outcome,
                tracker: HandleTracker::new(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl VideoGenerator for FakeGenerator {
        async fn submit_and_await(
            &self,
            _request: &GenerationRequest,
            _cancel: CancellationToken,
        ) -> Result<VideoHandle, VideoJobError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match self.outcome {
                Outcome::Video(bytes) => Ok(self.tracker.register(bytes.to_vec(), "video/mp4")),
                Outcome::MissingResult => Err(GenerationError::MissingResult.into()),
            }
        }
    }

    fn controller(delay_secs: u64, outcome: Outcome) -> Arc<GenerationController<FakeGenerator>> {
        Arc::new(GenerationController::new(FakeGenerator::new(
            Duration::from_secs(delay_secs),
            outcome,
        )))
    }

    fn spawn_generate(
        controller: &Arc<GenerationController<FakeGenerator>>,
        prompt: &str,
    ) -> tokio::task::JoinHandle<Result<LifecycleState, ControllerError>> {
        let controller = Arc::clone(controller);
        let request = GenerationRequest::new(prompt);
        tokio::spawn(async move { controller.generate(request).await })
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[test]
    fn test_initial_snapshot_is_idle() {
        let controller = GenerationController::new(FakeGenerator::new(
            Duration::ZERO,
            Outcome::Video(b"x"),
        ));
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, LifecycleState::Idle);
        assert_eq!(snapshot.elapsed_secs, 0);
        assert_eq!(snapshot.status_message, LOADING_MESSAGES[0]);
        assert!(snapshot.error.is_none());
        assert!(snapshot.video_locator.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_success_passes_through_loading() {
        let controller = controller(3, Outcome::Video(b"video bytes"));
        let mut updates = controller.subscribe();

        let task = spawn_generate(&controller, "a cat driving a sports car");
        updates.changed().await.unwrap();
        assert_eq!(updates.borrow_and_update().state, LifecycleState::Loading);

        let state = task.await.unwrap().unwrap();
        assert_eq!(state, LifecycleState::Success);
        assert_eq!(controller.state(), LifecycleState::Success);
        assert!(controller.error().is_none());
        assert_eq!(
            controller.with_video(|v| v.bytes().to_vec()),
            Some(b"video bytes".to_vec())
        );
        assert!(controller.snapshot().video_locator.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_failure_stores_message() {
        let controller = controller(2, Outcome::MissingResult);

        let state = controller
            .generate(GenerationRequest::new("prompt"))
            .await
            .unwrap();

        assert_eq!(state, LifecycleState::Error);
        assert_eq!(
            controller.error().as_deref(),
            Some("Video generation completed, but no download link was found.")
        );
        assert!(controller.with_video(|_| ()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_time_counts_seconds_while_loading() {
        let controller = controller(30, Outcome::Video(b"v"));
        let task = spawn_generate(&controller, "prompt");

        sleep_ms(500).await;
        assert_eq!(controller.state(), LifecycleState::Loading);
        assert_eq!(controller.elapsed_secs(), 0);

        sleep_ms(1000).await;
        assert_eq!(controller.elapsed_secs(), 1);

        sleep_ms(2000).await;
        assert_eq!(controller.elapsed_secs(), 3);

        task.await.unwrap().unwrap();
        let final_elapsed = controller.elapsed_secs();
        assert!(final_elapsed <= 30);

        // Stopped: no further ticks after leaving Loading
        sleep_ms(10_000).await;
        assert_eq!(controller.elapsed_secs(), final_elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_message_rotates_every_five_seconds_and_wraps() {
        let controller = controller(120, Outcome::Video(b"v"));
        let task = spawn_generate(&controller, "prompt");

        sleep_ms(100).await;
        assert_eq!(controller.status_message(), LOADING_MESSAGES[0]);

        for index in 1..LOADING_MESSAGES.len() {
            sleep_ms(5000).await;
            assert_eq!(controller.status_message(), LOADING_MESSAGES[index]);
        }

        // 10th rotation wraps to the first message
        sleep_ms(5000).await;
        assert_eq!(controller.status_message(), LOADING_MESSAGES[0]);

        controller.reset();
        assert!(matches!(task.await.unwrap(), Err(ControllerError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_generate_restarts_elapsed_and_message() {
        let controller = controller(12, Outcome::MissingResult);

        controller
            .generate(GenerationRequest::new("first"))
            .await
            .unwrap();
        assert_eq!(controller.state(), LifecycleState::Error);
        assert!(controller.elapsed_secs() >= 11);

        let task = spawn_generate(&controller, "second");
        sleep_ms(100).await;
        assert_eq!(controller.state(), LifecycleState::Loading);
        assert_eq!(controller.elapsed_secs(), 0);
        assert_eq!(controller.status_message(), LOADING_MESSAGES[0]);
        assert!(controller.error().is_none());

        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_guard_rejects_second_generate() {
        let controller = controller(10, Outcome::Video(b"v"));
        let task = spawn_generate(&controller, "first");
        sleep_ms(100).await;

        let second = controller.generate(GenerationRequest::new("second")).await;
        assert_eq!(second, Err(ControllerError::Busy));
        assert_eq!(controller.state(), LifecycleState::Loading);

        assert_eq!(task.await.unwrap(), Ok(LifecycleState::Success));
        assert_eq!(controller.generator().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected_without_transition() {
        let controller = controller(0, Outcome::Video(b"v"));
        let result = controller.generate(GenerationRequest::new("   ")).await;

        assert_eq!(result, Err(ControllerError::EmptyPrompt));
        assert_eq!(controller.state(), LifecycleState::Idle);
        assert_eq!(controller.generator().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_releases_video_exactly_once() {
        let controller = controller(1, Outcome::Video(b"v"));
        controller
            .generate(GenerationRequest::new("prompt"))
            .await
            .unwrap();
        let tracker = Arc::clone(&controller.generator().tracker);
        assert_eq!(tracker.live(), 1);

        controller.reset();
        assert_eq!(tracker.live(), 0);
        assert_eq!(tracker.released(), 1);

        controller.reset();
        assert_eq!(tracker.released(), 1);

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, LifecycleState::Idle);
        assert!(snapshot.error.is_none());
        assert!(snapshot.video_locator.is_none());
        assert_eq!(snapshot.elapsed_secs, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_generate_returns_to_idle() {
        let controller = controller(60, Outcome::Video(b"v"));

        let timed_out = tokio::time::timeout(
            Duration::from_secs(3),
            controller.generate(GenerationRequest::new("slow")),
        )
        .await;
        assert!(timed_out.is_err());

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, LifecycleState::Idle);
        assert_eq!(snapshot.elapsed_secs, 0);
        assert!(snapshot.error.is_none());

        sleep_ms(120_000).await;
        assert_eq!(controller.state(), LifecycleState::Idle);

        let next = controller.generate(GenerationRequest::new("again")).await;
        assert_eq!(next, Ok(LifecycleState::Success));
        assert_eq!(controller.generator().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_generate_task_returns_to_idle() {
        let controller = controller(60, Outcome::Video(b"v"));
        let task = spawn_generate(&controller, "prompt");
        sleep_ms(1500).await;
        assert_eq!(controller.state(), LifecycleState::Loading);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert_eq!(controller.state(), LifecycleState::Idle);
        let next = controller.generate(GenerationRequest::new("again")).await;
        assert_ne!(next, Err(ControllerError::Busy));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_generate_releases_previous_video() {
        let controller = controller(1, Outcome::Video(b"v"));
        let tracker = Arc::clone(&controller.generator().tracker);

        controller.generate(GenerationRequest::new("one")).await.unwrap();
        controller.generate(GenerationRequest::new("two")).await.unwrap();

        assert_eq!(tracker.live(), 1);
        assert_eq!(tracker.released(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_error() {
        let controller = controller(1, Outcome::MissingResult);
        controller.generate(GenerationRequest::new("p")).await.unwrap();
        assert!(controller.error().is_some());

        controller.reset();
        assert_eq!(controller.state(), LifecycleState::Idle);
        assert!(controller.error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_while_loading_cancels_and_stops_timers() {
        let controller = controller(60, Outcome::Video(b"v"));
        let tracker = Arc::clone(&controller.generator().tracker);
        let task = spawn_generate(&controller, "prompt");

        sleep_ms(2500).await;
        assert_eq!(controller.elapsed_secs(), 2);

        controller.reset();
        assert_eq!(controller.state(), LifecycleState::Idle);
        assert_eq!(controller.elapsed_secs(), 0);
        assert_eq!(task.await.unwrap(), Err(ControllerError::Cancelled));

        sleep_ms(10_000).await;
        assert_eq!(controller.state(), LifecycleState::Idle);
        assert_eq!(controller.elapsed_secs(), 0);
        assert_eq!(controller.status_message(), LOADING_MESSAGES[0]);
        assert_eq!(tracker.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_after_reset_supersedes_old_request() {
        let controller = controller(5, Outcome::Video(b"v"));
        let first = spawn_generate(&controller, "first");
        sleep_ms(1500).await;

        controller.reset();
        let second = spawn_generate(&controller, "second");

        assert_eq!(first.await.unwrap(), Err(ControllerError::Cancelled));
        assert_eq!(second.await.unwrap(), Ok(LifecycleState::Success));
        assert_eq!(controller.generator().calls.load(Ordering::SeqCst), 2);
        assert_eq!(controller.generator().tracker.live(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_each_transition() {
        let controller = controller(2, Outcome::Video(b"v"));
        let mut updates = controller.subscribe();
        let task = spawn_generate(&controller, "prompt");

        let mut seen = Vec::new();
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().state;
            if seen.last() != Some(&state) {
                seen.push(state);
            }
            if state == LifecycleState::Success {
                break;
            }
        }
        task.await.unwrap().unwrap();

        assert_eq!(seen, vec![LifecycleState::Loading, LifecycleState::Success]);
    }
}
