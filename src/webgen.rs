//! AI-mode single-document web game generation.
//!
//! One large prompt asks the model for a complete self-contained HTML
//! document (Canvas + Matter.js for 2D, three.js for 3D), then a bounded
//! validate/fix loop runs: structural failures retry immediately with a
//! malformed-output notice, semantic issues build a fix prompt carrying the
//! broken code and an explicit issue list. The final attempt returns best
//! effort rather than failing the pipeline.

use tracing::{debug, info, warn};

use crate::code_validator::{semantic_issues, structural_issues, WebRuntime};
use crate::config::RetryPolicy;
use crate::design::GameDesign;
use crate::error::Result;
use crate::json_repair::extract_code_block;
use crate::level::LevelDesign;
use crate::mechanics::GameMechanics;
use crate::model::{ChatMessage, ModelClient};

pub struct WebGameRequest<'a> {
    pub design: &'a GameDesign,
    pub mechanics: &'a GameMechanics,
    pub level: &'a LevelDesign,
}

pub fn runtime_for(design: &GameDesign) -> WebRuntime {
    if design.concept.is_3d() {
        WebRuntime::ThreeJs
    } else {
        WebRuntime::Canvas2d
    }
}

/// Generates a complete web game document, validating and fixing across
/// bounded attempts. Returns the last candidate even when issues remain.
pub async fn generate_web_game<M: ModelClient>(
    client: &M,
    policy: &RetryPolicy,
    request: &WebGameRequest<'_>,
) -> Result<String> {
    let runtime = runtime_for(request.design);
    let initial_prompt = match runtime {
        WebRuntime::Canvas2d => build_canvas_prompt(request),
        WebRuntime::ThreeJs => build_threejs_prompt(request),
    };
    let mut prompt = initial_prompt.clone();
    let mut last_candidate = String::new();

    for attempt in 1..=policy.max_attempts {
        debug!(attempt, ?runtime, "web code generation attempt");
        let response = client
            .generate(
                &[ChatMessage::user(prompt.clone())],
                policy.code_temperature,
                policy.code_max_tokens,
            )
            .await?;
        let code = extract_code_block(&response.content);

        let structural = structural_issues(&code);
        if !structural.is_empty() {
            warn!(attempt, issues = ?structural, "structural validation failed");
            last_candidate = code;
            prompt = format!(
                "{initial_prompt}\n\nIMPORTANT: Your previous attempt was empty or \
                 structurally malformed ({problems}). Return one complete HTML \
                 document and nothing else.",
                problems = structural.join("; "),
            );
            continue;
        }

        let semantic = semantic_issues(&code, runtime);
        if semantic.is_empty() {
            info!(attempt, "web code passed validation");
            return Ok(code);
        }
        warn!(attempt, issues = ?semantic, "semantic issues detected");
        last_candidate = code;
        if attempt < policy.max_attempts {
            prompt = build_fix_prompt(&initial_prompt, &last_candidate, &semantic);
        }
    }

    info!("returning best-effort web code after exhausting attempts");
    Ok(last_candidate)
}

fn build_fix_prompt(original: &str, broken_code: &str, issues: &[String]) -> String {
    let bullets: String = issues.iter().map(|i| format!("- {i}\n")).collect();
    format!(
        "{original}\n\n\
         Your previous attempt had these problems:\n{bullets}\n\
         Here is the broken code to fix:\n```html\n{broken_code}\n```\n\n\
         Fix every listed problem and return the complete corrected HTML document."
    )
}

fn level_summary(level: &LevelDesign) -> String {
    serde_json::to_string(level).unwrap_or_else(|_| "{}".to_string())
}

fn build_canvas_prompt(request: &WebGameRequest<'_>) -> String {
    let design = request.design;
    let movement = &request.mechanics.player_movement;
    let physics = &request.mechanics.physics;
    format!(
        "You are an expert HTML5 Canvas game developer. Generate a COMPLETE, \
         POLISHED, self-contained HTML5 Canvas game in a single document.\n\n\
         GAME SPECIFICATIONS:\n\
         Title: {title}\n\
         Genre: {genre}\n\
         Description: {description}\n\
         Art style: {art_style}\n\
         Gameplay loop: {gameplay}\n\
         Level design: {level}\n\n\
         CRITICAL VALUES - USE THESE EXACT NUMBERS:\n\
         - Player speed: {speed} pixels/second\n\
         - Jump force: {jump} (NEGATIVE = upward)\n\
         - Gravity: {gravity} pixels/frame^2\n\
         - Acceleration: {accel}\n\
         - Friction: {friction}\n\
         - FPS: {fps}\n\n\
         CRITICAL REQUIREMENTS:\n\
         1. Start with <!DOCTYPE html>, include complete <html>, <head>, <body>.\n\
         2. Include this exact line in <head>:\n\
         <script src=\"https://cdnjs.cloudflare.com/ajax/libs/matter-js/0.19.0/matter.min.js\"></script>\n\
         3. Create the physics engine with Engine.create() and step it every \
         frame with Engine.update(engine, delta).\n\
         4. Create <canvas id=\"gameCanvas\"></canvas> and acquire a 2d context \
         with getContext('2d').\n\
         5. Use a requestAnimationFrame game loop. Cap deltaTime with \
         Math.min((currentTime - lastTime) / 1000, 0.1) and skip frames where \
         deltaTime <= 0 or !isFinite(deltaTime).\n\
         6. NEVER divide by a value without checking it is nonzero first.\n\
         7. Keyboard input: WASD, arrow keys and space.\n\
         8. HUD overlay showing score and health.\n\n\
         Return ONLY the HTML document.",
        title = design.title,
        genre = design.concept.genre,
        description = design.description,
        art_style = design.art_style,
        gameplay = design.gameplay_loop,
        level = level_summary(request.level),
        speed = movement.speed,
        jump = movement.jump_force,
        gravity = physics.gravity,
        accel = movement.acceleration,
        friction = movement.friction,
        fps = request.mechanics.game_loop.fps,
    )
}

fn build_threejs_prompt(request: &WebGameRequest<'_>) -> String {
    let design = request.design;
    let movement = &request.mechanics.player_movement;
    let lanes = request.mechanics.lane_system.unwrap_or(3);
    format!(
        "You are an expert three.js game developer. Generate a COMPLETE, \
         POLISHED, self-contained 3D web game in a single HTML document.\n\n\
         GAME SPECIFICATIONS:\n\
         Title: {title}\n\
         Genre: {genre}\n\
         Description: {description}\n\
         Art style: {art_style}\n\
         Gameplay loop: {gameplay}\n\
         Spawn design: {level}\n\n\
         CRITICAL VALUES - USE THESE EXACT NUMBERS:\n\
         - Forward speed: {speed}\n\
         - Jump force: {jump} (NEGATIVE = upward)\n\
         - Lane count: {lanes}\n\n\
         CRITICAL REQUIREMENTS:\n\
         1. Start with <!DOCTYPE html>, include complete <html>, <head>, <body>.\n\
         2. Load three.js from a CDN script tag in <head>.\n\
         3. Create a THREE.Scene, a THREE.PerspectiveCamera and a \
         THREE.WebGLRenderer sized to the window.\n\
         4. Use a requestAnimationFrame render loop.\n\
         5. Lane-switching controls: left/right arrows or A/D switch between \
         {lanes} lanes, up/W or space jumps.\n\
         6. Obstacles spawn ahead of the player and move toward the camera; \
         collision ends the run.\n\
         7. NEVER divide by a value without checking it is nonzero first.\n\
         8. HUD overlay showing score and distance.\n\n\
         Return ONLY the HTML document.",
        title = design.title,
        genre = design.concept.genre,
        description = design.description,
        art_style = design.art_style,
        gameplay = design.gameplay_loop,
        level = level_summary(request.level),
        speed = movement.speed,
        jump = movement.jump_force,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concept::fallback_concept;
    use crate::config::{LevelRules, MechanicsLimits};
    use crate::design::fallback_design;
    use crate::error::Result;
    use crate::genres::GenreRegistry;
    use crate::level::fallback_level_design;
    use crate::mechanics::fallback_mechanics;
    use crate::model::ModelResponse;
    use std::sync::Mutex;

    struct ScriptedClient {
        responses: Mutex<Vec<String>>,
        call_count: Mutex<u32>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<String>) -> Self {
            let mut responses = responses;
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                call_count: Mutex::new(0),
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
            *self.call_count.lock().unwrap() += 1;
            let content = self.responses.lock().unwrap().pop().unwrap_or_default();
            Ok(ModelResponse {
                content,
                tokens_used: 100,
            })
        }
    }

    fn request_parts() -> (GameDesign, GameMechanics, LevelDesign) {
        let registry = GenreRegistry::new();
        let concept = fallback_concept("a 2D platformer about a ninja", &registry);
        let design = fallback_design(&concept, "a 2D platformer about a ninja");
        let mechanics = fallback_mechanics("platformer", &MechanicsLimits::default());
        let level = fallback_level_design("platformer", "2D", &LevelRules::default());
        (design, mechanics, level)
    }

    fn good_doc() -> String {
        r#"<!DOCTYPE html><html><head>
<script src="https://cdnjs.cloudflare.com/ajax/libs/matter-js/0.19.0/matter.min.js"></script>
</head><body><canvas id="gameCanvas"></canvas><script>
const engine = Matter.Engine.create();
const ctx = document.getElementById('gameCanvas').getContext('2d');
function loop() { Matter.Engine.update(engine, 16.6); requestAnimationFrame(loop); }
loop();
</script></body></html>"#
            .to_string()
    }

    #[tokio::test]
    async fn test_valid_first_attempt_returns_immediately() {
        let (design, mechanics, level) = request_parts();
        let client = ScriptedClient::new(vec![format!("```html\n{}\n```", good_doc())]);
        let request = WebGameRequest {
            design: &design,
            mechanics: &mechanics,
            level: &level,
        };
        let code = generate_web_game(&client, &RetryPolicy::default(), &request)
            .await
            .unwrap();
        assert!(code.starts_with("<!DOCTYPE html>"));
        assert_eq!(*client.call_count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_structural_failure_then_success() {
        let (design, mechanics, level) = request_parts();
        let client = ScriptedClient::new(vec!["not html at all".to_string(), good_doc()]);
        let request = WebGameRequest {
            design: &design,
            mechanics: &mechanics,
            level: &level,
        };
        let code = generate_web_game(&client, &RetryPolicy::default(), &request)
            .await
            .unwrap();
        assert!(code.contains("Engine.update"));
        assert_eq!(*client.call_count.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_return_best_effort() {
        let (design, mechanics, level) = request_parts();
        // Structurally fine but always missing the physics step.
        let incomplete = good_doc().replace("Matter.Engine.update(engine, 16.6);", "");
        let client = ScriptedClient::new(vec![
            incomplete.clone(),
            incomplete.clone(),
            incomplete.clone(),
        ]);
        let request = WebGameRequest {
            design: &design,
            mechanics: &mechanics,
            level: &level,
        };
        let code = generate_web_game(&client, &RetryPolicy::default(), &request)
            .await
            .unwrap();
        assert!(code.contains("<!DOCTYPE html>"));
        assert_eq!(*client.call_count.lock().unwrap(), 3);
    }

    #[test]
    fn test_runtime_selection() {
        let registry = GenreRegistry::new();
        let concept_2d = fallback_concept("pixel platformer", &registry);
        let design_2d = fallback_design(&concept_2d, "p");
        assert_eq!(runtime_for(&design_2d), WebRuntime::Canvas2d);

        let concept_3d = fallback_concept("subway surfers clone", &registry);
        let design_3d = fallback_design(&concept_3d, "p");
        assert_eq!(runtime_for(&design_3d), WebRuntime::ThreeJs);
    }

    #[test]
    fn test_prompt_interpolates_clamped_values() {
        let (design, mechanics, level) = request_parts();
        let request = WebGameRequest {
            design: &design,
            mechanics: &mechanics,
            level: &level,
        };
        let prompt = build_canvas_prompt(&request);
        assert!(prompt.contains("Player speed: 300"));
        assert!(prompt.contains("Jump force: -400"));
    }
}
