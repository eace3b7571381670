//! End-to-end runs of the generation pipeline against a scripted model.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use gamesmith::codegen::AiGenerator;
use gamesmith::level::LevelDesign;
use gamesmith::model::{ChatMessage, ModelClient, ModelResponse};
use gamesmith::pipeline::Orchestrator;
use gamesmith::storage::{LocalDirStorage, StorageClient};
use gamesmith::{PipelineConfig, Result, TemplateGenerator};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

struct ScriptedClient {
    responses: Mutex<Vec<String>>,
    calls: Arc<Mutex<u32>>,
}

impl ScriptedClient {
    fn new(responses: Vec<String>) -> Self {
        let mut responses = responses;
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            calls: Arc::new(Mutex::new(0)),
        }
    }
}

impl ModelClient for ScriptedClient {
    async fn generate(
        &self,
        _messages: &[ChatMessage],
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<ModelResponse> {
        *self.calls.lock().unwrap() += 1;
        let content = self.responses.lock().unwrap().pop().unwrap_or_default();
        Ok(ModelResponse {
            content,
            tokens_used: 100,
        })
    }
}

fn concept_response() -> String {
    r#"{"genre": "platformer", "dimension": "2D", "theme": "ninja",
        "target_audience": "everyone", "core_mechanic": "precise jumping",
        "difficulty": "medium", "game_style": "pixel art",
        "key_features": ["coins", "wall jumps"]}"#
        .to_string()
}

fn design_response() -> String {
    r##"{"title": "Ninja Coin Rush", "description": "Dash and leap through moonlit rooftops.",
        "art_style": "pixel art", "color_scheme": {"primary": "#1B2A41", "secondary": "#FFD700"},
        "player_description": "A nimble ninja", "enemy_description": "Lantern guards",
        "environment_description": "Rooftops at night", "win_condition": "Reach the shrine",
        "lose_condition": "Lose all health", "gameplay_loop": "Run, jump, collect coins",
        "visual_effects": ["dust particles"]}"##
        .to_string()
}

fn mechanics_response() -> String {
    r#"{"player_movement": {"speed": 350, "jump_force": -450, "acceleration": 1800,
        "friction": 1100, "max_fall_speed": 700},
        "physics": {"gravity": 1.2},
        "player_abilities": ["jump", "wall_jump"],
        "enemy_behaviors": ["patrol"],
        "collectibles": [{"type": "coin", "value": 10, "spawn_rate": 0.2}],
        "obstacles": ["spike"],
        "scoring": {"points_per_collectible": 10, "points_per_enemy": 50},
        "camera_behavior": "smooth_follow", "spawn_system": "static_placement"}"#
        .to_string()
}

fn ui_response() -> String {
    r#"{"menu_style": "retro", "font_size": 20, "button_style": "rounded",
        "hud_layout": {"score_position": "top_left", "health_position": "top_right",
        "health_display": "bar"}}"#
        .to_string()
}

fn level_response() -> String {
    // One coordinate deliberately outside the canvas; validation must clamp it.
    r#"{"levels": [
        {"name": "Rooftop Run", "difficulty": "easy",
         "platforms": [[0, 500, 300, 40], [5000, 400, 200, 40]],
         "enemies": [[450, 460]], "collectibles": [[150, 450], [500, 360]],
         "spawn_point": [50, 450], "goal": [1100, 350]},
        {"name": "Shrine Ascent", "difficulty": "medium",
         "platforms": [[0, 600, 250, 40], [400, 480, 200, 40]],
         "enemies": [[500, 440]], "collectibles": [[450, 430]],
         "spawn_point": [40, 550], "goal": [900, 150]}
    ]}"#
    .to_string()
}

#[tokio::test]
async fn test_platformer_prompt_end_to_end() {
    init_tracing();
    let client = ScriptedClient::new(vec![
        concept_response(),
        design_response(),
        mechanics_response(),
        ui_response(),
        level_response(),
    ]);
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(client, PipelineConfig::default(), TemplateGenerator)
        .with_storage(LocalDirStorage::new(dir.path()));

    let outcome = orchestrator
        .generate_game("ninja-1", "a 2D platformer about a ninja collecting coins")
        .await
        .unwrap();

    assert!(!outcome.recovery_mode);
    assert!(outcome.validation_warnings.is_empty());
    assert_eq!(outcome.design.title, "Ninja Coin Rush");
    assert_eq!(outcome.design.concept.genre, "platformer");
    assert_eq!(outcome.design.concept.dimension, "2D");

    let movement = &outcome.mechanics.player_movement;
    assert_eq!(movement.speed, 350.0);
    assert_eq!(movement.jump_force, -450.0);
    assert!((100.0..=1000.0).contains(&movement.speed));
    assert!(movement.jump_force < 0.0);
    assert_eq!(outcome.mechanics.physics.gravity, 1.2);

    let LevelDesign::Levels { levels } = &outcome.level else {
        panic!("platformer should get discrete levels");
    };
    assert_eq!(levels.len(), 2);
    for level in levels {
        assert!(!level.platforms.is_empty());
        for platform in &level.platforms {
            assert!((0.0..=1200.0).contains(&platform[0]), "x: {}", platform[0]);
            assert!((0.0..=800.0).contains(&platform[1]), "y: {}", platform[1]);
        }
        for point in level.enemies.iter().chain(&level.collectibles) {
            assert!((0.0..=1200.0).contains(&point[0]));
            assert!((0.0..=800.0).contains(&point[1]));
        }
    }

    // One model call per stage, no retries needed.
    assert_eq!(orchestrator.generation_status("ninja-1").await.as_deref(), Some("completed"));
    let url = outcome.artifact_url.expect("artifact uploaded");
    assert!(url.ends_with("game.zip"));
    assert!(dir.path().join("games/ninja-1/game.zip").exists());
}

#[tokio::test]
async fn test_runner_prompt_falls_back_to_endless_3d() {
    init_tracing();
    // A model that never produces JSON: every stage exhausts and falls back.
    let client = ScriptedClient::new(vec![]);
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalDirStorage::new(dir.path());
    let orchestrator = Orchestrator::new(client, PipelineConfig::default(), TemplateGenerator)
        .with_storage(storage.clone());

    let outcome = orchestrator
        .generate_game("runner-1", "subway surfers clone")
        .await
        .unwrap();

    assert!(!outcome.recovery_mode);
    assert_eq!(outcome.design.concept.dimension, "3D");
    assert!(outcome.design.concept.genre.contains("runner"));
    assert!(matches!(outcome.level, LevelDesign::Endless(_)));
    assert!(!outcome.validation_warnings.is_empty());

    // The published zip holds a single three.js document.
    let bytes = storage.download("games/runner-1/game.zip").await.unwrap();
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    assert_eq!(archive.len(), 1);
    let mut doc = String::new();
    std::io::Read::read_to_string(&mut archive.by_index(0).unwrap(), &mut doc).unwrap();
    assert!(doc.contains("THREE.Scene"));
}

#[tokio::test]
async fn test_ai_code_generation_end_to_end() {
    init_tracing();
    let html = r#"<!DOCTYPE html><html><head>
<script src="https://cdnjs.cloudflare.com/ajax/libs/matter-js/0.19.0/matter.min.js"></script>
</head><body><canvas id="gameCanvas"></canvas><script>
const engine = Matter.Engine.create();
const ctx = document.getElementById('gameCanvas').getContext('2d');
function loop() { Matter.Engine.update(engine, 16.6); requestAnimationFrame(loop); }
loop();
</script></body></html>"#;
    let client = ScriptedClient::new(vec![
        concept_response(),
        design_response(),
        mechanics_response(),
        ui_response(),
        level_response(),
        format!("```html\n{html}\n```"),
    ]);
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalDirStorage::new(dir.path());
    let orchestrator = Orchestrator::new(client, PipelineConfig::default(), AiGenerator)
        .with_storage(storage.clone());

    let outcome = orchestrator
        .generate_game("ai-1", "a 2D platformer about a ninja collecting coins")
        .await
        .unwrap();

    assert!(outcome.validation_warnings.is_empty());
    let bytes = storage.download("games/ai-1/game.zip").await.unwrap();
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut doc = String::new();
    std::io::Read::read_to_string(&mut archive.by_name("index.html").unwrap(), &mut doc).unwrap();
    assert!(doc.starts_with("<!DOCTYPE html>"));
    assert!(doc.contains("Engine.create"));
}

#[tokio::test]
async fn test_scripted_call_count_is_one_per_stage() {
    init_tracing();
    let client = ScriptedClient::new(vec![
        concept_response(),
        design_response(),
        mechanics_response(),
        ui_response(),
        level_response(),
    ]);
    let calls = client.calls.clone();
    let orchestrator = Orchestrator::new(client, PipelineConfig::default(), TemplateGenerator);
    // No storage attached; the outcome carries no artifact URL.
    let outcome = orchestrator
        .generate_game("count-1", "a 2D platformer about a ninja collecting coins")
        .await
        .unwrap();
    assert!(outcome.artifact_url.is_none());

    // Five stages, each parsed on the first attempt: no retry or meta calls.
    assert_eq!(*calls.lock().unwrap(), 5);
}
