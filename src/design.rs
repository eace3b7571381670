//! Game design generation: concept to [`GameDesign`], plus the UI design
//! pass that feeds HUD layout into the templates.
//!
//! AI output is merged over the concept: concept fields act as defaults and
//! the design's own fields win on collision.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::concept::{normalize_dimension, GameConcept};
use crate::config::RetryPolicy;
use crate::error::Result;
use crate::genres::GenreRegistry;
use crate::json_repair::{self, JsonMap};
use crate::model::ModelClient;
use crate::retry::{run_with_retry, Conversation};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameDesign {
    pub concept: GameConcept,
    pub title: String,
    pub description: String,
    pub art_style: String,
    pub color_scheme: BTreeMap<String, String>,
    pub player_description: String,
    pub enemy_description: String,
    pub environment_description: String,
    pub win_condition: String,
    pub lose_condition: String,
    pub gameplay_loop: String,
    pub visual_effects: Vec<String>,
}

/// HUD and menu styling consumed by the template generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiDesign {
    pub menu_style: String,
    pub font_size: u32,
    pub button_style: String,
    pub score_position: String,
    pub health_position: String,
    pub health_display: String,
}

impl Default for UiDesign {
    fn default() -> Self {
        Self {
            menu_style: "modern".to_string(),
            font_size: 24,
            button_style: "rounded".to_string(),
            score_position: "top_left".to_string(),
            health_position: "top_right".to_string(),
            health_display: "number".to_string(),
        }
    }
}

pub fn build_design_prompt(concept: &GameConcept, user_prompt: &str) -> String {
    let style_guidance = match &concept.referenced_game {
        Some(game) => format!(
            "CRITICAL: The user wants a game like \"{game}\". The design must match \
             its visual style, color palette, gameplay mechanics and feel.\n\
             Key features to include: {}\n",
            if concept.key_features.is_empty() {
                "match the referenced game style".to_string()
            } else {
                concept.key_features.join(", ")
            }
        ),
        None => String::new(),
    };
    let concept_json = serde_json::to_string(concept).unwrap_or_default();
    format!(
        "You are a professional game designer specializing in polished games \
         that match popular game styles.\n\n\
         Game concept: {concept_json}\n\n\
         Original prompt: {user_prompt}\n\n\
         {style_guidance}\n\
         Return JSON with:\n\
         - title: Catchy game title\n\
         - description: 2-3 sentence description of the gameplay feel\n\
         - genre: Game genre\n\
         - dimension: \"2D\" or \"3D\"\n\
         - art_style: Visual style description\n\
         - color_scheme: Color palette as named hex codes\n\
         - player_description: What the player character looks like\n\
         - enemy_description: What enemies/obstacles look like\n\
         - environment_description: Game world description\n\
         - win_condition: How to win\n\
         - lose_condition: How to lose\n\
         - gameplay_loop: Core gameplay loop description\n\
         - visual_effects: List of visual effects to include"
    )
}

/// Merges AI design output over the concept. Missing fields fall back to
/// concept-derived defaults; genre and dimension re-normalize when the
/// design tries to override them.
pub fn design_from_map(
    map: &JsonMap,
    concept: &GameConcept,
    registry: &GenreRegistry,
    user_prompt: &str,
) -> Option<GameDesign> {
    if map.is_empty() {
        return None;
    }
    let mut concept = concept.clone();
    if let Some(genre) = json_repair::str_field(map, "genre") {
        concept.genre = registry.normalize(&genre);
    }
    if let Some(dimension) = json_repair::str_field(map, "dimension") {
        concept.dimension = normalize_dimension(&dimension);
    }

    let color_scheme = json_repair::obj_field(map, "color_scheme")
        .map(|colors| {
            colors
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_else(default_color_scheme);

    let fallback = fallback_design(&concept, user_prompt);
    Some(GameDesign {
        title: json_repair::str_field(map, "title").unwrap_or(fallback.title),
        description: json_repair::str_field(map, "description").unwrap_or(fallback.description),
        art_style: json_repair::str_field(map, "art_style").unwrap_or(fallback.art_style),
        color_scheme,
        player_description: json_repair::str_field(map, "player_description")
            .unwrap_or(fallback.player_description),
        enemy_description: json_repair::str_field(map, "enemy_description")
            .unwrap_or(fallback.enemy_description),
        environment_description: json_repair::str_field(map, "environment_description")
            .unwrap_or(fallback.environment_description),
        win_condition: json_repair::str_field(map, "win_condition")
            .unwrap_or(fallback.win_condition),
        lose_condition: json_repair::str_field(map, "lose_condition")
            .unwrap_or(fallback.lose_condition),
        gameplay_loop: json_repair::str_field(map, "gameplay_loop")
            .unwrap_or(fallback.gameplay_loop),
        visual_effects: {
            let effects = json_repair::str_list(map, "visual_effects");
            if effects.is_empty() {
                fallback.visual_effects
            } else {
                effects
            }
        },
        concept,
    })
}

fn default_color_scheme() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("primary".to_string(), "#4A90E2".to_string()),
        ("secondary".to_string(), "#50C878".to_string()),
    ])
}

pub fn fallback_design(concept: &GameConcept, user_prompt: &str) -> GameDesign {
    let description: String = user_prompt.chars().take(200).collect();
    let (win, lose, loop_desc) = if concept.genre == "endless_runner" {
        (
            "Run as far as possible and beat your high score",
            "Hit an obstacle",
            "Run forward, dodge obstacles, collect coins",
        )
    } else {
        (
            "Reach the goal of every level",
            "Lose all health to enemies or falls",
            "Jump between platforms, collect items, avoid enemies",
        )
    };
    GameDesign {
        concept: concept.clone(),
        title: "Untitled Adventure".to_string(),
        description,
        art_style: "pixel art".to_string(),
        color_scheme: default_color_scheme(),
        player_description: "A heroic character".to_string(),
        enemy_description: "Simple patrolling enemies".to_string(),
        environment_description: "A colorful game world".to_string(),
        win_condition: win.to_string(),
        lose_condition: lose.to_string(),
        gameplay_loop: loop_desc.to_string(),
        visual_effects: vec!["particles".to_string(), "screen shake".to_string()],
    }
}

pub async fn generate_design<M: ModelClient>(
    client: &M,
    policy: &RetryPolicy,
    registry: &GenreRegistry,
    concept: &GameConcept,
    user_prompt: &str,
) -> Result<GameDesign> {
    let conversation = Conversation::from_user_prompt(build_design_prompt(concept, user_prompt));
    run_with_retry(
        client,
        conversation,
        |content| {
            let map = json_repair::extract_and_repair(content);
            design_from_map(&map, concept, registry, user_prompt)
        },
        policy,
        "design",
    )
    .await
}

pub fn build_ui_prompt(design: &GameDesign) -> String {
    format!(
        "You are a UI/UX designer for games. Design a polished interface for \
         this game.\n\n\
         Title: {title}\n\
         Genre: {genre}\n\
         Art style: {art}\n\n\
         Return JSON with:\n\
         - menu_style: e.g. \"modern\", \"retro\", \"minimalist\"\n\
         - font_size: base font size as a number\n\
         - button_style: e.g. \"rounded\", \"sharp\", \"outlined\"\n\
         - hud_layout: {{score_position, health_position, health_display}} where \
         positions are top_left/top_right/top_center and health_display is \
         bar/number/icons",
        title = design.title,
        genre = design.concept.genre,
        art = design.art_style,
    )
}

pub fn ui_from_map(map: &JsonMap) -> Option<UiDesign> {
    if map.is_empty() {
        return None;
    }
    let defaults = UiDesign::default();
    let hud = json_repair::obj_field(map, "hud_layout");
    let hud_str = |key: &str, fallback: &str| -> String {
        hud.and_then(|h| json_repair::str_field(h, key))
            .unwrap_or_else(|| fallback.to_string())
    };
    Some(UiDesign {
        menu_style: json_repair::str_field(map, "menu_style").unwrap_or(defaults.menu_style),
        font_size: json_repair::num_field(map, "font_size")
            .map(|n| n.max(8.0) as u32)
            .unwrap_or(defaults.font_size),
        button_style: json_repair::str_field(map, "button_style").unwrap_or(defaults.button_style),
        score_position: hud_str("score_position", &defaults.score_position),
        health_position: hud_str("health_position", &defaults.health_position),
        health_display: hud_str("health_display", &defaults.health_display),
    })
}

pub async fn generate_ui<M: ModelClient>(
    client: &M,
    policy: &RetryPolicy,
    design: &GameDesign,
) -> Result<UiDesign> {
    let conversation = Conversation::from_user_prompt(build_ui_prompt(design));
    run_with_retry(
        client,
        conversation,
        |content| {
            let map = json_repair::extract_and_repair(content);
            ui_from_map(&map)
        },
        policy,
        "ui_design",
    )
    .await
}
