//! Code generation strategies and artifact assembly.
//!
//! The pipeline picks one [`GameCodeGenerator`] at construction. The AI
//! strategy asks the model for code and repairs what comes back; the
//! template strategy synthesizes everything deterministically from the
//! validated design data. Both produce a [`GeneratedArtifact`] that can be
//! written to disk or packaged as a deployment zip.

use std::collections::BTreeMap;
use std::future::Future;
use std::io::{Cursor, Write};
use std::path::Path;

use tokio::fs;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::config::RetryPolicy;
use crate::design::{GameDesign, UiDesign};
use crate::error::Result;
use crate::json_repair::{self, extract_code_block};
use crate::level::LevelDesign;
use crate::mechanics::GameMechanics;
use crate::model::ModelClient;
use crate::retry::{run_with_retry, Conversation};
use crate::templates;
use crate::webgen::{generate_web_game, WebGameRequest};

/// What kind of project the artifact should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportTarget {
    /// Single self-contained HTML document.
    #[default]
    Web,
    /// Godot 4 project tree.
    Godot,
}

pub struct CodegenRequest<'a> {
    pub design: &'a GameDesign,
    pub mechanics: &'a GameMechanics,
    pub ui: &'a UiDesign,
    pub level: &'a LevelDesign,
    pub target: ExportTarget,
}

/// A fully assembled game project, path-keyed sources or one document.
#[derive(Debug, Clone)]
pub enum GeneratedArtifact {
    GodotProject(BTreeMap<String, String>),
    WebPage(String),
}

impl GeneratedArtifact {
    pub fn file_count(&self) -> usize {
        match self {
            Self::GodotProject(files) => files.len(),
            Self::WebPage(_) => 1,
        }
    }

    /// Writes the artifact into `dir`, creating subdirectories as needed.
    pub async fn write_to(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).await?;
        match self {
            Self::WebPage(document) => {
                fs::write(dir.join("index.html"), document).await?;
            }
            Self::GodotProject(files) => {
                for (path, source) in files {
                    let target = dir.join(path);
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent).await?;
                    }
                    fs::write(target, source).await?;
                }
            }
        }
        Ok(())
    }

    /// Packages the artifact as an in-memory deployment zip.
    pub fn package_zip(&self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        match self {
            Self::WebPage(document) => {
                writer.start_file("index.html", options)?;
                writer.write_all(document.as_bytes())?;
            }
            Self::GodotProject(files) => {
                for (path, source) in files {
                    writer.start_file(path.as_str(), options)?;
                    writer.write_all(source.as_bytes())?;
                }
            }
        }
        Ok(writer.finish()?.into_inner())
    }
}

/// Strategy seam between AI-backed and deterministic code generation.
pub trait GameCodeGenerator {
    fn generate<M: ModelClient + Sync>(
        &self,
        client: &M,
        policy: &RetryPolicy,
        request: &CodegenRequest<'_>,
    ) -> impl Future<Output = Result<GeneratedArtifact>> + Send;
}

// ============================================================================
// AI strategy
// ============================================================================

/// Generates code with the model: web targets through the validated
/// single-document loop, Godot targets through a JSON-of-scripts prompt with
/// per-script repair and template back-fill.
#[derive(Debug, Clone, Copy, Default)]
pub struct AiGenerator;

impl GameCodeGenerator for AiGenerator {
    async fn generate<M: ModelClient + Sync>(
        &self,
        client: &M,
        policy: &RetryPolicy,
        request: &CodegenRequest<'_>,
    ) -> Result<GeneratedArtifact> {
        match request.target {
            ExportTarget::Web => {
                let web_request = WebGameRequest {
                    design: request.design,
                    mechanics: request.mechanics,
                    level: request.level,
                };
                let document = generate_web_game(client, policy, &web_request).await?;
                Ok(GeneratedArtifact::WebPage(document))
            }
            ExportTarget::Godot => {
                let scripts = generate_godot_scripts(client, policy, request).await?;
                Ok(GeneratedArtifact::GodotProject(assemble_godot_project(
                    request, scripts,
                )))
            }
        }
    }
}

fn required_scripts(is_3d: bool) -> &'static [&'static str] {
    if is_3d {
        &["player", "enemy", "collectible", "game_manager", "hud", "camera", "spawner"]
    } else {
        &["player", "enemy", "collectible", "game_manager", "hud", "camera"]
    }
}

fn build_godot_prompt(request: &CodegenRequest<'_>) -> String {
    let design = request.design;
    let movement = &request.mechanics.player_movement;
    let names = required_scripts(design.concept.is_3d()).join(", ");
    format!(
        "You are an expert Godot 4 GDScript developer. Write the scripts for \
         this game.\n\n\
         Title: {title}\n\
         Genre: {genre} ({dimension})\n\
         Player speed: {speed}, jump force: {jump}, gravity scale: {gravity}\n\
         Player abilities: {abilities}\n\
         Enemy behaviors: {behaviors}\n\n\
         Return JSON mapping script names to complete GDScript source. \
         Required keys: {names}.\n\
         Rules:\n\
         - Every script starts with an `extends` line for the correct node type\n\
         - Use static typing and Godot 4 syntax (move_and_slide without arguments)\n\
         - The player emits health_changed, score_changed and player_died signals\n\
         - No placeholder comments; every function body is complete",
        title = design.title,
        genre = design.concept.genre,
        dimension = design.concept.dimension,
        speed = movement.speed,
        jump = movement.jump_force,
        gravity = request.mechanics.physics.gravity,
        abilities = request.mechanics.player_abilities.join(", "),
        behaviors = request.mechanics.enemy_behaviors.join(", "),
    )
}

async fn generate_godot_scripts<M: ModelClient>(
    client: &M,
    policy: &RetryPolicy,
    request: &CodegenRequest<'_>,
) -> Result<BTreeMap<String, String>> {
    let is_3d = request.design.concept.is_3d();
    let conversation = Conversation::from_user_prompt(build_godot_prompt(request));
    let raw = run_with_retry(
        client,
        conversation,
        |content| {
            let map = json_repair::extract_and_repair(content);
            let scripts: BTreeMap<String, String> = map
                .iter()
                .filter_map(|(name, value)| {
                    value.as_str().map(|code| (name.clone(), code.to_string()))
                })
                .filter(|(_, code)| !code.trim().is_empty())
                .collect();
            // A response without a player script is not worth repairing.
            if scripts.contains_key("player") {
                Some(scripts)
            } else {
                None
            }
        },
        policy,
        "godot_scripts",
    )
    .await?;

    let mut scripts = BTreeMap::new();
    for (name, code) in raw {
        scripts.insert(name.clone(), repair_script(&name, &code, is_3d));
    }
    for name in required_scripts(is_3d) {
        if !scripts.contains_key(*name) {
            warn!(script = name, "model omitted script, back-filling from template");
            scripts.insert(name.to_string(), template_script(name, request));
        }
    }
    Ok(scripts)
}

/// Strips fences and patches a missing `extends` header with the node type
/// the script name implies.
fn repair_script(name: &str, code: &str, is_3d: bool) -> String {
    let code = extract_code_block(code);
    if code.lines().any(|line| line.trim_start().starts_with("extends ")) {
        return code;
    }
    debug!(script = name, "patching missing extends header");
    format!("extends {}\n\n{code}", node_type_for(name, is_3d))
}

fn node_type_for(name: &str, is_3d: bool) -> &'static str {
    match name {
        "player" | "enemy" => {
            if is_3d {
                "CharacterBody3D"
            } else {
                "CharacterBody2D"
            }
        }
        "collectible" => {
            if is_3d {
                "Area3D"
            } else {
                "Area2D"
            }
        }
        "hud" => "CanvasLayer",
        "camera" => {
            if is_3d {
                "Camera3D"
            } else {
                "Camera2D"
            }
        }
        "spawner" => "Node3D",
        _ => "Node",
    }
}

fn template_script(name: &str, request: &CodegenRequest<'_>) -> String {
    let is_3d = request.design.concept.is_3d();
    match name {
        "player" if is_3d => templates::player_script_3d(request.mechanics),
        "player" => templates::player_script_2d(request.mechanics),
        "enemy" => templates::enemy_script(request.mechanics),
        "collectible" => templates::collectible_script(request.mechanics),
        "game_manager" => templates::game_manager_script(request.design, request.mechanics),
        "hud" => templates::hud_script(request.ui),
        "camera" if is_3d => templates::camera_script_3d(request.mechanics),
        "camera" => templates::CAMERA_SCRIPT_2D.to_string(),
        "spawner" => templates::spawner_script(request.mechanics),
        other => format!("extends Node\n\n# {other}\n"),
    }
}

// ============================================================================
// Template strategy
// ============================================================================

/// Deterministic generation from the validated design data alone. Used when
/// AI code generation is disabled, and as the last-resort fallback when the
/// AI strategy fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

impl GameCodeGenerator for TemplateGenerator {
    async fn generate<M: ModelClient + Sync>(
        &self,
        _client: &M,
        _policy: &RetryPolicy,
        request: &CodegenRequest<'_>,
    ) -> Result<GeneratedArtifact> {
        Ok(self.build(request))
    }
}

impl TemplateGenerator {
    /// Synchronous build, usable outside the strategy seam for the recovery
    /// path.
    pub fn build(&self, request: &CodegenRequest<'_>) -> GeneratedArtifact {
        match request.target {
            ExportTarget::Web => {
                let document = if request.design.concept.is_3d() {
                    templates::fallback_threejs(request.design, request.mechanics)
                } else {
                    templates::fallback_html5(request.design, request.mechanics)
                };
                GeneratedArtifact::WebPage(document)
            }
            ExportTarget::Godot => {
                let is_3d = request.design.concept.is_3d();
                let scripts = required_scripts(is_3d)
                    .iter()
                    .map(|name| (name.to_string(), template_script(name, request)))
                    .collect();
                GeneratedArtifact::GodotProject(assemble_godot_project(request, scripts))
            }
        }
    }
}

// ============================================================================
// Godot project assembly
// ============================================================================

fn actor_scene(name: &str, node_type: &str, script: &str) -> String {
    format!(
        "[gd_scene load_steps=2 format=3]\n\n\
         [ext_resource type=\"Script\" path=\"res://scripts/{script}.gd\" id=\"1\"]\n\n\
         [node name=\"{name}\" type=\"{node_type}\"]\n\
         script = ExtResource(\"1\")\n"
    )
}

fn assemble_godot_project(
    request: &CodegenRequest<'_>,
    scripts: BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let design = request.design;
    let is_3d = design.concept.is_3d();
    let mut files = BTreeMap::new();

    files.insert(
        "project.godot".to_string(),
        templates::project_godot(&design.title, &design.concept.dimension),
    );
    for (name, source) in scripts {
        files.insert(format!("scripts/{name}.gd"), source);
    }
    let endless = matches!(request.level, LevelDesign::Endless(_));
    files.insert(
        "scenes/main.tscn".to_string(),
        templates::main_scene(&design.concept.dimension, endless),
    );

    if is_3d {
        files.insert("scenes/runner.tscn".to_string(), templates::runner_scene_3d());
    } else {
        files.insert(
            "scenes/enemy.tscn".to_string(),
            actor_scene("Enemy", "CharacterBody2D", "enemy"),
        );
        files.insert(
            "scenes/collectible.tscn".to_string(),
            actor_scene("Collectible", "Area2D", "collectible"),
        );
        match request.level {
            LevelDesign::Levels { levels } => {
                for (index, level) in levels.iter().enumerate() {
                    files.insert(
                        format!("scenes/level_{}.tscn", index + 1),
                        templates::level_scene_2d(level, index),
                    );
                }
            }
            LevelDesign::Endless(_) => {
                files.insert("scenes/endless.tscn".to_string(), templates::endless_scene_2d());
            }
        }
    }
    files
}
