//! The generation pipeline: one user prompt in, one playable project out.
//!
//! Stages run in a fixed order (concept, design, mechanics, UI, level,
//! code, packaging). A stage that exhausts its retries is replaced by its
//! deterministic fallback and the run continues; only transport-level or
//! fatal errors abort, and even those are answered with a full template
//! build in recovery mode before the error is allowed to escape.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::codegen::{
    CodegenRequest, ExportTarget, GameCodeGenerator, GeneratedArtifact, TemplateGenerator,
};
use crate::concept::{fallback_concept, generate_concept};
use crate::config::{LevelRules, MechanicsLimits, PipelineConfig};
use crate::design::{
    fallback_design, generate_design, generate_ui, GameDesign, UiDesign,
};
use crate::error::{GenerationError, Result};
use crate::genres::GenreRegistry;
use crate::level::{fallback_level_design, generate_level_design, LevelDesign};
use crate::mechanics::{fallback_mechanics, generate_mechanics, GameMechanics};
use crate::model::ModelClient;
use crate::storage::{
    LocalDirStorage, PersistenceSink, ProgressSink, ProgressUpdate, ResponseCache, StorageClient,
};

/// Cooperative cancellation checked between stages.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(GenerationError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Everything a caller needs about a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub project_id: String,
    pub design: GameDesign,
    pub mechanics: GameMechanics,
    pub level: LevelDesign,
    pub artifact_url: Option<String>,
    pub duration_ms: u64,
    pub recovery_mode: bool,
    pub validation_warnings: Vec<String>,
}

/// No-op persistence for hosts that don't record runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPersistence;

impl PersistenceSink for NullPersistence {
    async fn log_step(&self, _project_id: &str, _step: &str, _detail: &str) -> Result<()> {
        Ok(())
    }

    async fn update_project(&self, _project_id: &str, _status: &str) -> Result<()> {
        Ok(())
    }
}

pub struct Orchestrator<M, S, P = NullPersistence, G = TemplateGenerator> {
    client: M,
    config: PipelineConfig,
    registry: GenreRegistry,
    generator: G,
    storage: Option<S>,
    persistence: Option<P>,
    progress: Option<Box<dyn ProgressSink>>,
    cache: ResponseCache,
    cancellation: CancellationFlag,
    target: ExportTarget,
}

impl<M, G> Orchestrator<M, LocalDirStorage, NullPersistence, G> {
    /// Builds an orchestrator with no storage or persistence attached; the
    /// concrete return type keeps construction inference-friendly, and the
    /// `with_*` builders rebind the parameters as collaborators are added.
    pub fn new(client: M, config: PipelineConfig, generator: G) -> Self {
        let cache = ResponseCache::new(Duration::from_secs(config.cache_ttl_secs));
        Self {
            client,
            config,
            registry: GenreRegistry::new(),
            generator,
            storage: None,
            persistence: None,
            progress: None,
            cache,
            cancellation: CancellationFlag::new(),
            target: ExportTarget::Web,
        }
    }
}

impl<M, S, P, G> Orchestrator<M, S, P, G>
where
    M: ModelClient + Sync,
    S: StorageClient,
    P: PersistenceSink,
    G: GameCodeGenerator + Sync,
{
    pub fn with_storage<S2: StorageClient>(self, storage: S2) -> Orchestrator<M, S2, P, G> {
        Orchestrator {
            client: self.client,
            config: self.config,
            registry: self.registry,
            generator: self.generator,
            storage: Some(storage),
            persistence: self.persistence,
            progress: self.progress,
            cache: self.cache,
            cancellation: self.cancellation,
            target: self.target,
        }
    }

    pub fn with_persistence<P2: PersistenceSink>(
        self,
        persistence: P2,
    ) -> Orchestrator<M, S, P2, G> {
        Orchestrator {
            client: self.client,
            config: self.config,
            registry: self.registry,
            generator: self.generator,
            storage: self.storage,
            persistence: Some(persistence),
            progress: self.progress,
            cache: self.cache,
            cancellation: self.cancellation,
            target: self.target,
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_export_target(mut self, target: ExportTarget) -> Self {
        self.target = target;
        self
    }

    /// A handle callers can use to cancel a running generation.
    pub fn cancellation_handle(&self) -> CancellationFlag {
        self.cancellation.clone()
    }

    /// Last reported stage for a project, if still cached.
    pub async fn generation_status(&self, project_id: &str) -> Option<String> {
        self.cache.get(&status_key(project_id)).await
    }

    /// [`Self::generate_game`] with a fresh project id.
    pub async fn generate(&self, user_prompt: &str) -> Result<GenerationOutcome> {
        let project_id = uuid::Uuid::new_v4().to_string();
        self.generate_game(&project_id, user_prompt).await
    }

    /// Runs the full pipeline. On fatal errors the run is retried once in
    /// recovery mode with a complete fallback content set; the original
    /// error propagates only if that build fails too.
    pub async fn generate_game(
        &self,
        project_id: &str,
        user_prompt: &str,
    ) -> Result<GenerationOutcome> {
        let started = Instant::now();
        match self.run_pipeline(project_id, user_prompt, started).await {
            Ok(outcome) => Ok(outcome),
            Err(GenerationError::Cancelled) => {
                self.update_status(project_id, "cancelled", "generation cancelled").await;
                Err(GenerationError::Cancelled)
            }
            Err(err) => {
                warn!(project_id, error = %err, "pipeline failed, entering recovery mode");
                self.update_status(project_id, "recovering", "building fallback game").await;
                self.recovery_build(project_id, user_prompt, started, &err).await
            }
        }
    }

    async fn run_pipeline(
        &self,
        project_id: &str,
        user_prompt: &str,
        started: Instant,
    ) -> Result<GenerationOutcome> {
        let mut warnings = Vec::new();
        let policy = &self.config.retry;

        self.update_status(project_id, "analyzing_prompt", "understanding the game idea").await;
        let concept = match generate_concept(&self.client, policy, &self.registry, user_prompt).await
        {
            Ok(concept) => concept,
            Err(GenerationError::Exhausted { .. }) => {
                warnings.push(stage_fallback_warning("concept"));
                fallback_concept(user_prompt, &self.registry)
            }
            Err(err) => return Err(err),
        };
        self.cancellation.check()?;

        self.update_status(project_id, "generating_design", "designing the game").await;
        let design =
            match generate_design(&self.client, policy, &self.registry, &concept, user_prompt)
                .await
            {
                Ok(design) => design,
                Err(GenerationError::Exhausted { .. }) => {
                    warnings.push(stage_fallback_warning("design"));
                    fallback_design(&concept, user_prompt)
                }
                Err(err) => return Err(err),
            };
        self.cancellation.check()?;

        self.update_status(project_id, "generating_mechanics", "tuning game mechanics").await;
        let mechanics =
            match generate_mechanics(&self.client, policy, &self.config.limits, &design).await {
                Ok(mechanics) => mechanics,
                Err(GenerationError::Exhausted { .. }) => {
                    warnings.push(stage_fallback_warning("mechanics"));
                    fallback_mechanics(&design.concept.genre, &self.config.limits)
                }
                Err(err) => return Err(err),
            };
        let mechanics = mechanics.clamped(&self.config.limits);
        self.cancellation.check()?;

        self.update_status(project_id, "designing_ui", "designing the interface").await;
        let ui = match generate_ui(&self.client, policy, &design).await {
            Ok(ui) => ui,
            Err(GenerationError::Exhausted { .. }) => {
                warnings.push(stage_fallback_warning("ui"));
                UiDesign::default()
            }
            Err(err) => return Err(err),
        };
        self.cancellation.check()?;

        self.update_status(project_id, "generating_levels", "laying out levels").await;
        let level = match generate_level_design(
            &self.client,
            policy,
            &self.config.levels,
            &design,
            &mechanics,
        )
        .await
        {
            Ok(level) => level,
            Err(GenerationError::Exhausted { .. }) => {
                warnings.push(stage_fallback_warning("level"));
                fallback_level_design(
                    &design.concept.genre,
                    &design.concept.dimension,
                    &self.config.levels,
                )
            }
            Err(err) => return Err(err),
        };
        self.cancellation.check()?;

        warnings.extend(validate_game_content(
            &design,
            &mechanics,
            &level,
            &self.config.limits,
            &self.config.levels,
        ));

        self.update_status(project_id, "generating_code", "writing game code").await;
        let request = CodegenRequest {
            design: &design,
            mechanics: &mechanics,
            ui: &ui,
            level: &level,
            target: self.target,
        };
        let artifact = if self.config.use_ai_codegen {
            match self.generator.generate(&self.client, policy, &request).await {
                Ok(artifact) => artifact,
                Err(err) => {
                    warn!(error = %err, "code generation failed, using template build");
                    warnings.push(format!("code generation failed ({err}); used template build"));
                    TemplateGenerator.build(&request)
                }
            }
        } else {
            TemplateGenerator.build(&request)
        };
        self.cancellation.check()?;

        let artifact_url = self.publish(project_id, &artifact, &mut warnings).await;

        self.update_status(project_id, "completed", "game ready").await;
        info!(
            project_id,
            files = artifact.file_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generation complete"
        );
        Ok(GenerationOutcome {
            project_id: project_id.to_string(),
            design,
            mechanics,
            level,
            artifact_url,
            duration_ms: started.elapsed().as_millis() as u64,
            recovery_mode: false,
            validation_warnings: warnings,
        })
    }

    /// Full fallback content set plus a template build. Never calls the
    /// model.
    async fn recovery_build(
        &self,
        project_id: &str,
        user_prompt: &str,
        started: Instant,
        cause: &GenerationError,
    ) -> Result<GenerationOutcome> {
        let concept = fallback_concept(user_prompt, &self.registry);
        let design = fallback_design(&concept, user_prompt);
        let mechanics =
            fallback_mechanics(&design.concept.genre, &self.config.limits).clamped(&self.config.limits);
        let ui = UiDesign::default();
        let level = fallback_level_design(
            &design.concept.genre,
            &design.concept.dimension,
            &self.config.levels,
        );

        let request = CodegenRequest {
            design: &design,
            mechanics: &mechanics,
            ui: &ui,
            level: &level,
            target: self.target,
        };
        let artifact = TemplateGenerator.build(&request);

        let mut warnings = vec![format!("recovered from fatal error: {cause}")];
        let artifact_url = self.publish(project_id, &artifact, &mut warnings).await;

        self.update_status(project_id, "completed", "fallback game ready").await;
        Ok(GenerationOutcome {
            project_id: project_id.to_string(),
            design,
            mechanics,
            level,
            artifact_url,
            duration_ms: started.elapsed().as_millis() as u64,
            recovery_mode: true,
            validation_warnings: warnings,
        })
    }

    /// Packages and uploads the artifact. Upload problems degrade to a
    /// warning so a built game is never discarded over storage trouble.
    async fn publish(
        &self,
        project_id: &str,
        artifact: &GeneratedArtifact,
        warnings: &mut Vec<String>,
    ) -> Option<String> {
        let storage = self.storage.as_ref()?;
        self.update_status(project_id, "uploading", "publishing the game").await;

        let bytes = match artifact.package_zip() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "artifact packaging failed");
                warnings.push(format!("artifact packaging failed: {err}"));
                return None;
            }
        };
        let key = format!("games/{project_id}/game.zip");
        match storage.upload(&key, &bytes, "application/zip", true).await {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(error = %err, "artifact upload failed");
                warnings.push(format!("artifact upload failed: {err}"));
                None
            }
        }
    }

    async fn update_status(&self, project_id: &str, status: &str, message: &str) {
        self.cache.put(status_key(project_id), status).await;
        if let Some(progress) = &self.progress {
            progress.notify(project_id, &ProgressUpdate::new(status, message));
        }
        if let Some(persistence) = &self.persistence {
            if let Err(err) = persistence.log_step(project_id, status, message).await {
                warn!(project_id, status, error = %err, "persistence log_step failed");
            }
            if let Err(err) = persistence.update_project(project_id, status).await {
                warn!(project_id, status, error = %err, "persistence update failed");
            }
        }
    }
}

fn status_key(project_id: &str) -> String {
    format!("status:{project_id}")
}

fn stage_fallback_warning(stage: &str) -> String {
    format!("{stage} generation exhausted retries; used deterministic fallback")
}

/// Post-validation sweep over the assembled content. Problems here are
/// warnings, not failures; the clamps upstream should have prevented most.
/// Thresholds come from the same config the clamps use.
pub fn validate_game_content(
    design: &GameDesign,
    mechanics: &GameMechanics,
    level: &LevelDesign,
    limits: &MechanicsLimits,
    rules: &LevelRules,
) -> Vec<String> {
    let mut warnings = Vec::new();
    if design.title.trim().is_empty() {
        warnings.push("design has no title".to_string());
    }
    if design.concept.genre.trim().is_empty() {
        warnings.push("design has no genre".to_string());
    }
    if design.concept.dimension != "2D" && design.concept.dimension != "3D" {
        warnings.push(format!("invalid dimension: {}", design.concept.dimension));
    }
    let speed = mechanics.player_movement.speed;
    if !(limits.speed_min..=limits.speed_max).contains(&speed) {
        warnings.push(format!("player speed out of range: {speed}"));
    }
    if mechanics.player_movement.jump_force >= 0.0 {
        warnings.push("jump force is not negative".to_string());
    }
    if let LevelDesign::Levels { levels } = level {
        if levels.len() != rules.level_count {
            warnings.push(format!(
                "expected {} levels, found {}",
                rules.level_count,
                levels.len()
            ));
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChatMessage, ModelResponse};
    use std::sync::Mutex;

    struct FailingClient;

    impl ModelClient for FailingClient {
        async fn generate(
            &self,
            _messages: &[ChatMessage],
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<ModelResponse> {
            Err(GenerationError::Fatal("model offline".to_string()))
        }
    }

    /// Always returns unparseable output, so every stage exhausts retries.
    struct GarbageClient;

    impl ModelClient for GarbageClient {
        async fn generate(
            &self,
            _messages: &[ChatMessage],
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<ModelResponse> {
            Ok(ModelResponse {
                content: "I cannot produce JSON today.".to_string(),
                tokens_used: 10,
            })
        }
    }

    struct RecordingProgress {
        statuses: Arc<Mutex<Vec<String>>>,
    }

    impl ProgressSink for RecordingProgress {
        fn notify(&self, _project_id: &str, update: &ProgressUpdate) {
            self.statuses.lock().unwrap().push(update.status.clone());
        }
    }

    fn orchestrator<M: ModelClient + Sync>(
        client: M,
    ) -> Orchestrator<M, LocalDirStorage, NullPersistence, TemplateGenerator> {
        Orchestrator::new(client, PipelineConfig::default(), TemplateGenerator)
    }

    #[test]
    fn test_cancellation_flag_roundtrip() {
        let flag = CancellationFlag::new();
        assert!(!flag.is_cancelled());
        assert!(flag.check().is_ok());
        let handle = flag.clone();
        handle.cancel();
        assert!(flag.is_cancelled());
        assert!(matches!(flag.check(), Err(GenerationError::Cancelled)));
    }

    #[test]
    fn test_validate_game_content_flags_problems() {
        let registry = GenreRegistry::new();
        let concept = fallback_concept("a 2D platformer", &registry);
        let mut design = fallback_design(&concept, "a 2D platformer");
        let mut mechanics = fallback_mechanics("platformer", &MechanicsLimits::default());
        let limits = MechanicsLimits::default();
        let rules = LevelRules::default();
        let level = fallback_level_design("platformer", "2D", &rules);

        assert!(validate_game_content(&design, &mechanics, &level, &limits, &rules).is_empty());

        design.title = "  ".to_string();
        mechanics.player_movement.speed = 5000.0;
        mechanics.player_movement.jump_force = 300.0;
        let warnings = validate_game_content(&design, &mechanics, &level, &limits, &rules);
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn test_validate_game_content_tracks_configured_thresholds() {
        let registry = GenreRegistry::new();
        let concept = fallback_concept("a 2D platformer", &registry);
        let design = fallback_design(&concept, "a 2D platformer");
        let limits = MechanicsLimits::default();
        let rules = LevelRules::default();
        let mechanics = fallback_mechanics("platformer", &limits);
        let level = fallback_level_design("platformer", "2D", &rules);

        // The warning thresholds follow the config, not baked-in literals.
        let mut tight_limits = limits.clone();
        tight_limits.speed_max = mechanics.player_movement.speed - 1.0;
        let warnings = validate_game_content(&design, &mechanics, &level, &tight_limits, &rules);
        assert!(warnings.iter().any(|w| w.contains("speed out of range")));

        let mut tall_rules = rules.clone();
        tall_rules.level_count = 3;
        let warnings = validate_game_content(&design, &mechanics, &level, &limits, &tall_rules);
        assert!(warnings.iter().any(|w| w.contains("expected 3 levels")));
    }

    #[tokio::test]
    async fn test_fatal_error_triggers_recovery_mode() {
        let orchestrator = orchestrator(FailingClient);
        let outcome = orchestrator
            .generate_game("proj-1", "a 2D platformer about a ninja")
            .await
            .unwrap();
        assert!(outcome.recovery_mode);
        assert!(outcome.artifact_url.is_none());
        assert_eq!(outcome.design.concept.genre, "platformer");
        assert!(outcome
            .validation_warnings
            .iter()
            .any(|w| w.contains("recovered from fatal error")));
    }

    #[tokio::test]
    async fn test_exhausted_stages_fall_back_and_complete() {
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let orchestrator = orchestrator(GarbageClient)
            .with_progress(Box::new(RecordingProgress {
                statuses: statuses.clone(),
            }));
        let outcome = orchestrator
            .generate_game("proj-2", "subway surfers clone")
            .await
            .unwrap();
        // Every stage fell back but the run still completed normally.
        assert!(!outcome.recovery_mode);
        assert_eq!(outcome.design.concept.dimension, "3D");
        assert!(outcome
            .validation_warnings
            .iter()
            .any(|w| w.contains("concept generation exhausted")));
        let recorded = statuses.lock().unwrap();
        assert_eq!(recorded.first().map(String::as_str), Some("analyzing_prompt"));
        assert_eq!(recorded.last().map(String::as_str), Some("completed"));
    }

    #[tokio::test]
    async fn test_cancelled_run_reports_cancellation() {
        let orchestrator = orchestrator(GarbageClient);
        orchestrator.cancellation_handle().cancel();
        let err = orchestrator.generate_game("proj-3", "a puzzle game").await;
        assert!(matches!(err, Err(GenerationError::Cancelled)));
        assert_eq!(
            orchestrator.generation_status("proj-3").await.as_deref(),
            Some("cancelled")
        );
    }

    #[tokio::test]
    async fn test_publish_uploads_zip_when_storage_present() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(GarbageClient).with_storage(LocalDirStorage::new(dir.path()));
        let outcome = orchestrator
            .generate_game("proj-4", "a 2D platformer")
            .await
            .unwrap();
        let url = outcome.artifact_url.expect("artifact should be uploaded");
        assert!(url.ends_with("game.zip"));
        assert!(dir.path().join("games/proj-4/game.zip").exists());
    }
}
