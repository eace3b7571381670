//! Level design generation and validation.
//!
//! Discrete-level genres get an ordered list of levels with platform, enemy
//! and collectible coordinates; endless/lane genres get spawn patterns. The
//! validator clamps every coordinate into the canvas and forces the level
//! count to the configured starter size, synthesizing defaults when short.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{LevelRules, RetryPolicy};
use crate::design::GameDesign;
use crate::error::Result;
use crate::json_repair::{self, JsonMap};
use crate::mechanics::GameMechanics;
use crate::model::ModelClient;
use crate::retry::{run_with_retry, Conversation};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Level {
    pub name: String,
    pub difficulty: String,
    /// `[x, y, width, height]` per platform.
    pub platforms: Vec<[f32; 4]>,
    pub enemies: Vec<[f32; 2]>,
    pub collectibles: Vec<[f32; 2]>,
    pub spawn_point: [f32; 2],
    pub goal: [f32; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnPattern {
    pub obstacle_type: String,
    pub spawn_rate: f32,
    pub lane: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndlessDesign {
    pub spawn_patterns: Vec<SpawnPattern>,
    pub lane_configuration: u32,
    pub difficulty_curve: String,
    pub obstacle_combinations: Vec<String>,
    pub collectible_placement: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LevelDesign {
    Levels { levels: Vec<Level> },
    Endless(EndlessDesign),
}

/// Endless-family games get spawn patterns instead of static layouts:
/// runner genres and every 3D game.
pub fn is_endless_family(genre: &str, dimension: &str) -> bool {
    genre.contains("runner") || dimension == "3D"
}

pub fn build_level_prompt(design: &GameDesign, mechanics: &GameMechanics, rules: &LevelRules) -> String {
    if is_endless_family(&design.concept.genre, &design.concept.dimension) {
        format!(
            "Design spawn patterns for an endless runner game.\n\n\
             Game: {title}\n\
             Gameplay: {gameplay}\n\
             Obstacles: {obstacles}\n\n\
             Return JSON with:\n\
             - spawn_patterns: list of {{obstacle_type, spawn_rate, lane}} patterns that repeat\n\
             - lane_configuration: number of lanes (usually {lanes})\n\
             - difficulty_curve: how spawn rate increases over time\n\
             - obstacle_combinations: common obstacle combinations\n\
             - collectible_placement: where collectibles typically spawn\n\n\
             Create patterns that feel polished and balanced.",
            title = design.title,
            gameplay = design.gameplay_loop,
            obstacles = mechanics.obstacles.join(", "),
            lanes = rules.lane_count,
        )
    } else {
        format!(
            "Design level layouts for a platformer game. This is a starter game, \
             not a full-scale game.\n\n\
             Game: {title}\n\
             Genre: {genre}\n\
             Player speed: {speed}, jump force: {jump}\n\n\
             Return JSON with:\n\
             - levels: array of EXACTLY {count} level objects, each with:\n\
               - name: level name\n\
               - difficulty: easy/medium (first easy, second medium)\n\
               - platforms: array of [x, y, width, height]\n\
               - enemies: array of [x, y]\n\
               - collectibles: array of [x, y]\n\
               - spawn_point: [x, y] for player start\n\
               - goal: [x, y] for level end\n\n\
             All coordinates must fit a {w}x{h} canvas. Generate EXACTLY {count} \
             levels.",
            title = design.title,
            genre = design.concept.genre,
            speed = mechanics.player_movement.speed,
            jump = mechanics.player_movement.jump_force,
            count = rules.level_count,
            w = rules.canvas_width,
            h = rules.canvas_height,
        )
    }
}

/// Parses a repaired map into a level design for the given family. Returns
/// `None` when the expected top-level key is missing.
pub fn level_design_from_map(map: &JsonMap, endless: bool, rules: &LevelRules) -> Option<LevelDesign> {
    if endless {
        let patterns = json_repair::arr_field(map, "spawn_patterns")?;
        let spawn_patterns: Vec<SpawnPattern> = patterns
            .iter()
            .filter_map(|p| {
                let obj = p.as_object()?;
                Some(SpawnPattern {
                    obstacle_type: json_repair::str_field(obj, "obstacle_type")
                        .or_else(|| json_repair::str_field(obj, "type"))
                        .unwrap_or_else(|| "barrier".to_string()),
                    spawn_rate: json_repair::num_field(obj, "spawn_rate").unwrap_or(0.3) as f32,
                    lane: json_repair::str_field(obj, "lane")
                        .unwrap_or_else(|| "random".to_string()),
                })
            })
            .collect();
        if spawn_patterns.is_empty() {
            return None;
        }
        Some(LevelDesign::Endless(EndlessDesign {
            spawn_patterns,
            lane_configuration: json_repair::num_field(map, "lane_configuration")
                .map(|n| n.max(1.0) as u32)
                .unwrap_or(rules.lane_count),
            difficulty_curve: json_repair::str_field(map, "difficulty_curve")
                .unwrap_or_else(|| "gradual".to_string()),
            obstacle_combinations: json_repair::str_list(map, "obstacle_combinations"),
            collectible_placement: json_repair::str_field(map, "collectible_placement")
                .unwrap_or_else(|| "scattered".to_string()),
        }))
    } else {
        let raw_levels = json_repair::arr_field(map, "levels")?;
        let levels: Vec<Level> = raw_levels
            .iter()
            .filter_map(|entry| level_from_value(entry.as_object()?))
            .collect();
        Some(LevelDesign::Levels { levels })
    }
}

fn level_from_value(obj: &JsonMap) -> Option<Level> {
    Some(Level {
        name: json_repair::str_field(obj, "name").unwrap_or_else(|| "Level".to_string()),
        difficulty: json_repair::str_field(obj, "difficulty").unwrap_or_else(|| "easy".to_string()),
        platforms: quads(obj, "platforms"),
        enemies: pairs(obj, "enemies"),
        collectibles: pairs(obj, "collectibles"),
        spawn_point: pair_field(obj, "spawn_point").unwrap_or([100.0, 400.0]),
        goal: pair_field(obj, "goal").unwrap_or([800.0, 200.0]),
    })
}

fn number_list(value: &serde_json::Value) -> Vec<f32> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect())
        .unwrap_or_default()
}

/// Accepts both `[x, y, w, h]` arrays and `{position: [x, y], size: [w, h]}`
/// objects, which models alternate between.
fn quads(obj: &JsonMap, key: &str) -> Vec<[f32; 4]> {
    json_repair::arr_field(obj, key)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    if let Some(entry) = item.as_object() {
                        let pos = entry.get("position").map(number_list)?;
                        let size = entry.get("size").map(number_list)?;
                        if pos.len() >= 2 && size.len() >= 2 {
                            return Some([pos[0], pos[1], size[0], size[1]]);
                        }
                        return None;
                    }
                    let nums = number_list(item);
                    if nums.len() >= 4 {
                        Some([nums[0], nums[1], nums[2], nums[3]])
                    } else {
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

fn pairs(obj: &JsonMap, key: &str) -> Vec<[f32; 2]> {
    json_repair::arr_field(obj, key)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    if let Some(entry) = item.as_object() {
                        let pos = entry.get("position").map(number_list)?;
                        if pos.len() >= 2 {
                            return Some([pos[0], pos[1]]);
                        }
                        return None;
                    }
                    let nums = number_list(item);
                    if nums.len() >= 2 {
                        Some([nums[0], nums[1]])
                    } else {
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

fn pair_field(obj: &JsonMap, key: &str) -> Option<[f32; 2]> {
    let nums = obj.get(key).map(number_list)?;
    if nums.len() >= 2 {
        Some([nums[0], nums[1]])
    } else {
        None
    }
}

/// Clamps all coordinates into the canvas and forces the level count for
/// discrete designs. Auto-corrects, never rejects.
pub fn validate_level_design(design: LevelDesign, rules: &LevelRules) -> LevelDesign {
    match design {
        LevelDesign::Endless(mut endless) => {
            endless.lane_configuration = endless.lane_configuration.max(1);
            for pattern in &mut endless.spawn_patterns {
                pattern.spawn_rate = pattern.spawn_rate.clamp(0.0, 1.0);
            }
            LevelDesign::Endless(endless)
        }
        LevelDesign::Levels { mut levels } => {
            if levels.len() > rules.level_count {
                warn!(
                    produced = levels.len(),
                    cap = rules.level_count,
                    "too many levels, truncating"
                );
                levels.truncate(rules.level_count);
            }
            while levels.len() < rules.level_count {
                let index = levels.len();
                warn!(index, "level missing, synthesizing a default");
                levels.push(default_level(index));
            }
            for level in &mut levels {
                clamp_level(level, rules);
            }
            LevelDesign::Levels { levels }
        }
    }
}

fn clamp_level(level: &mut Level, rules: &LevelRules) {
    let w = rules.canvas_width;
    let h = rules.canvas_height;
    for platform in &mut level.platforms {
        platform[0] = platform[0].clamp(0.0, w);
        platform[1] = platform[1].clamp(0.0, h);
        platform[2] = platform[2].clamp(0.0, w);
        platform[3] = platform[3].clamp(0.0, h);
    }
    for point in level
        .enemies
        .iter_mut()
        .chain(level.collectibles.iter_mut())
    {
        point[0] = point[0].clamp(0.0, w);
        point[1] = point[1].clamp(0.0, h);
    }
    level.spawn_point[0] = level.spawn_point[0].clamp(0.0, w);
    level.spawn_point[1] = level.spawn_point[1].clamp(0.0, h);
    level.goal[0] = level.goal[0].clamp(0.0, w);
    level.goal[1] = level.goal[1].clamp(0.0, h);
}

fn default_level(index: usize) -> Level {
    if index == 0 {
        Level {
            name: "Level 1".to_string(),
            difficulty: "easy".to_string(),
            platforms: vec![
                [0.0, 500.0, 200.0, 64.0],
                [300.0, 400.0, 200.0, 64.0],
                [600.0, 300.0, 200.0, 64.0],
            ],
            enemies: vec![[400.0, 350.0]],
            collectibles: vec![[150.0, 450.0], [350.0, 350.0], [650.0, 250.0]],
            spawn_point: [100.0, 400.0],
            goal: [800.0, 200.0],
        }
    } else {
        Level {
            name: format!("Level {}", index + 1),
            difficulty: "medium".to_string(),
            platforms: vec![
                [0.0, 500.0, 200.0, 64.0],
                [250.0, 400.0, 200.0, 64.0],
                [500.0, 300.0, 200.0, 64.0],
                [750.0, 200.0, 200.0, 64.0],
            ],
            enemies: vec![[350.0, 350.0], [600.0, 250.0]],
            collectibles: vec![
                [100.0, 450.0],
                [300.0, 350.0],
                [550.0, 250.0],
                [800.0, 150.0],
            ],
            spawn_point: [100.0, 400.0],
            goal: [900.0, 150.0],
        }
    }
}

/// Deterministic designs for total generation failure.
pub fn fallback_level_design(genre: &str, dimension: &str, rules: &LevelRules) -> LevelDesign {
    if is_endless_family(genre, dimension) {
        LevelDesign::Endless(EndlessDesign {
            spawn_patterns: vec![
                SpawnPattern {
                    obstacle_type: "barrier".to_string(),
                    spawn_rate: 0.3,
                    lane: "random".to_string(),
                },
                SpawnPattern {
                    obstacle_type: "hole".to_string(),
                    spawn_rate: 0.2,
                    lane: "random".to_string(),
                },
            ],
            lane_configuration: rules.lane_count,
            difficulty_curve: "gradual".to_string(),
            obstacle_combinations: vec!["barrier + coin line".to_string()],
            collectible_placement: "scattered".to_string(),
        })
    } else {
        validate_level_design(LevelDesign::Levels { levels: Vec::new() }, rules)
    }
}

pub async fn generate_level_design<M: ModelClient>(
    client: &M,
    policy: &RetryPolicy,
    rules: &LevelRules,
    design: &GameDesign,
    mechanics: &GameMechanics,
) -> Result<LevelDesign> {
    let endless = is_endless_family(&design.concept.genre, &design.concept.dimension);
    let conversation =
        Conversation::from_user_prompt(build_level_prompt(design, mechanics, rules));
    let parsed = run_with_retry(
        client,
        conversation,
        |content| {
            let map = json_repair::extract_and_repair(content);
            level_design_from_map(&map, endless, rules)
        },
        policy,
        "level_design",
    )
    .await?;
    Ok(validate_level_design(parsed, rules))
}
