//! Game mechanics generation and the physics validator.
//!
//! [`validate_and_clamp`] is pure and total: whatever shape the model
//! produced, the result is a structurally complete [`GameMechanics`] whose
//! numbers sit inside the configured safe ranges. Violations are corrected
//! and logged, never rejected. The clamped values are interpolated verbatim
//! into code-generation prompts so generated code and templates agree on
//! constants.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{MechanicsLimits, RetryPolicy};
use crate::design::GameDesign;
use crate::error::Result;
use crate::json_repair::{self, JsonMap};
use crate::model::ModelClient;
use crate::retry::{run_with_retry, Conversation};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerMovement {
    pub speed: f32,
    /// Negative is upward in the engine convention.
    pub jump_force: f32,
    pub acceleration: f32,
    pub friction: f32,
    pub max_fall_speed: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicsConfig {
    pub gravity: f32,
    pub friction: f32,
    pub air_resistance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collectible {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: i64,
    pub spawn_rate: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameLoopConfig {
    pub fps: u32,
    pub use_request_animation_frame: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub points_per_collectible: i64,
    pub points_per_enemy: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollisionConfig {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameMechanics {
    pub player_movement: PlayerMovement,
    pub physics: PhysicsConfig,
    pub player_abilities: Vec<String>,
    pub enemy_behaviors: Vec<String>,
    pub collectibles: Vec<Collectible>,
    pub obstacles: Vec<String>,
    pub scoring: ScoringConfig,
    pub game_loop: GameLoopConfig,
    pub collision: CollisionConfig,
    pub camera_behavior: String,
    pub lane_system: Option<u32>,
    pub spawn_system: String,
}

/// Builds a complete mechanics struct from an arbitrary repaired map and
/// clamps every number into range. Total: the empty map yields the
/// platformer defaults.
pub fn validate_and_clamp(raw: &JsonMap, limits: &MechanicsLimits) -> GameMechanics {
    let movement = json_repair::obj_field(raw, "player_movement");
    let physics = json_repair::obj_field(raw, "physics");

    let speed = clamp_speed(
        movement.and_then(|m| json_repair::num_field(m, "speed")).unwrap_or(0.0) as f32,
        limits,
    );
    let jump_force = clamp_jump_force(
        movement
            .and_then(|m| json_repair::num_field(m, "jump_force"))
            .unwrap_or(0.0) as f32,
        limits,
    );
    let gravity = clamp_gravity(
        physics.and_then(|p| json_repair::num_field(p, "gravity")).unwrap_or(0.0) as f32,
        limits,
    );

    let player_movement = PlayerMovement {
        speed,
        jump_force,
        acceleration: movement
            .and_then(|m| json_repair::num_field(m, "acceleration"))
            .map(|a| a as f32)
            .filter(|a| *a > 0.0)
            .unwrap_or(limits.acceleration_default),
        friction: movement
            .and_then(|m| json_repair::num_field(m, "friction"))
            .map(|f| f as f32)
            .filter(|f| *f > 0.0)
            .unwrap_or(limits.friction_default),
        max_fall_speed: movement
            .and_then(|m| json_repair::num_field(m, "max_fall_speed"))
            .map(|f| f as f32)
            .filter(|f| *f > 0.0)
            .unwrap_or(limits.max_fall_speed_default),
    };

    let physics = PhysicsConfig {
        gravity,
        friction: physics
            .and_then(|p| json_repair::num_field(p, "friction"))
            .map(|f| f as f32)
            .unwrap_or(0.1),
        air_resistance: physics
            .and_then(|p| json_repair::num_field(p, "air_resistance"))
            .map(|f| f as f32)
            .unwrap_or(0.01),
    };

    let collectibles = json_repair::arr_field(raw, "collectibles")
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let obj = item.as_object()?;
                    Some(Collectible {
                        kind: json_repair::str_field(obj, "type")
                            .unwrap_or_else(|| "coin".to_string()),
                        value: json_repair::num_field(obj, "value").unwrap_or(10.0) as i64,
                        spawn_rate: json_repair::num_field(obj, "spawn_rate").unwrap_or(0.2)
                            as f32,
                    })
                })
                .collect::<Vec<_>>()
        })
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| {
            vec![Collectible {
                kind: "coin".to_string(),
                value: 10,
                spawn_rate: 0.2,
            }]
        });

    let scoring = json_repair::obj_field(raw, "scoring")
        .map(|s| ScoringConfig {
            points_per_collectible: json_repair::num_field(s, "points_per_collectible")
                .unwrap_or(10.0) as i64,
            points_per_enemy: json_repair::num_field(s, "points_per_enemy").unwrap_or(50.0)
                as i64,
        })
        .unwrap_or(ScoringConfig {
            points_per_collectible: 10,
            points_per_enemy: 50,
        });

    let game_loop = json_repair::obj_field(raw, "game_loop")
        .map(|g| GameLoopConfig {
            fps: json_repair::num_field(g, "fps").map(|f| f as u32).filter(|f| *f > 0).unwrap_or(60),
            use_request_animation_frame: json_repair::bool_field(g, "use_request_animation_frame")
                .unwrap_or(true),
        })
        .unwrap_or(GameLoopConfig {
            fps: 60,
            use_request_animation_frame: true,
        });

    let collision = json_repair::obj_field(raw, "collision")
        .map(|c| CollisionConfig {
            enabled: json_repair::bool_field(c, "enabled").unwrap_or(true),
            kind: json_repair::str_field(c, "type").unwrap_or_else(|| "aabb".to_string()),
        })
        .unwrap_or(CollisionConfig {
            enabled: true,
            kind: "aabb".to_string(),
        });

    GameMechanics {
        player_movement,
        physics,
        player_abilities: non_empty_or(json_repair::str_list(raw, "player_abilities"), &["jump", "move"]),
        enemy_behaviors: non_empty_or(json_repair::str_list(raw, "enemy_behaviors"), &["patrol"]),
        collectibles,
        obstacles: non_empty_or(json_repair::str_list(raw, "obstacles"), &["spike"]),
        scoring,
        game_loop,
        collision,
        camera_behavior: json_repair::str_field(raw, "camera_behavior")
            .unwrap_or_else(|| "smooth_follow".to_string()),
        lane_system: json_repair::num_field(raw, "lane_system").map(|n| n.max(1.0) as u32),
        spawn_system: json_repair::str_field(raw, "spawn_system")
            .unwrap_or_else(|| "static_placement".to_string()),
    }
}

fn non_empty_or(list: Vec<String>, fallback: &[&str]) -> Vec<String> {
    if list.is_empty() {
        fallback.iter().map(|s| s.to_string()).collect()
    } else {
        list
    }
}

fn clamp_speed(speed: f32, limits: &MechanicsLimits) -> f32 {
    if speed <= 0.0 || !speed.is_finite() {
        limits.speed_default
    } else if speed < limits.speed_min {
        warn!(speed, "player speed below minimum, clamping");
        limits.speed_min
    } else if speed > limits.speed_max {
        warn!(speed, "player speed above maximum, clamping");
        limits.speed_max
    } else {
        speed
    }
}

fn clamp_jump_force(jump_force: f32, limits: &MechanicsLimits) -> f32 {
    let signed = if jump_force == 0.0 || !jump_force.is_finite() {
        limits.jump_force_default
    } else if jump_force > 0.0 {
        // Sign error: upward is negative.
        warn!(jump_force, "positive jump force, flipping sign");
        -jump_force.abs()
    } else {
        jump_force
    };
    signed.clamp(limits.jump_force_min, limits.jump_force_max)
}

fn clamp_gravity(gravity: f32, limits: &MechanicsLimits) -> f32 {
    if gravity <= 0.0 || !gravity.is_finite() {
        limits.gravity_default
    } else if gravity > limits.gravity_hard_max {
        warn!(gravity, "gravity above hard maximum, clamping");
        limits.gravity_max
    } else {
        gravity
    }
}

impl GameMechanics {
    /// Re-applies the numeric clamps to an already-built struct. Used before
    /// prompt interpolation so downstream code never sees raw numbers.
    pub fn clamped(mut self, limits: &MechanicsLimits) -> Self {
        self.player_movement.speed = clamp_speed(self.player_movement.speed, limits);
        self.player_movement.jump_force =
            clamp_jump_force(self.player_movement.jump_force, limits);
        self.physics.gravity = clamp_gravity(self.physics.gravity, limits);
        self
    }
}

fn mechanics_guidance(genre: &str) -> &'static str {
    if genre.contains("runner") {
        "For endless runner games (like Subway Surfers, Temple Run):\n\
         - player_movement: speed 400-600 (fast forward movement), jump_force around -500, acceleration 2000+\n\
         - obstacles spawn dynamically and move toward the player\n\
         - collectibles spawn in lanes\n\
         - camera follows the player and moves forward automatically\n\
         - lane_system: 3"
    } else if genre.contains("platformer") {
        "For platformer games (like Super Mario, Sonic):\n\
         - player_movement: speed 300-400, jump_force -400 to -500, smooth acceleration/friction\n\
         - obstacles: static platforms, moving platforms, spikes\n\
         - collectibles: coins and gems scattered on platforms\n\
         - progression: level-based, increasing difficulty"
    } else {
        ""
    }
}

pub fn build_mechanics_prompt(design: &GameDesign) -> String {
    format!(
        "You are a game mechanics designer. Create refined, polished game \
         mechanics that match the style and feel of popular games.\n\n\
         Game: {title}\n\
         Genre: {genre}\n\
         Description: {description}\n\
         Gameplay loop: {gameplay_loop}\n\n\
         {guidance}\n\n\
         Return JSON with:\n\
         - player_movement: {{speed: float (300-600), jump_force: float (-400 to -600, \
         negative = upward), acceleration: float (1500-2500), friction: float \
         (1000-1500), max_fall_speed: float}}\n\
         - physics: {{gravity: float (0.5-2.0), friction: float, air_resistance: float}}\n\
         - player_abilities: list of abilities\n\
         - enemy_behaviors: list of enemy patterns\n\
         - collectibles: list of {{type, value, spawn_rate}}\n\
         - obstacles: list of obstacle names\n\
         - scoring: {{points_per_collectible, points_per_enemy}}\n\
         - camera_behavior: \"forward_follow\" for runners, \"smooth_follow\" for platformers\n\
         - lane_system: number of lanes for runners (usually 3)\n\
         - spawn_system: \"continuous_forward\" for runners, \"static_placement\" for platformers",
        title = design.title,
        genre = design.concept.genre,
        description = design.description,
        gameplay_loop = design.gameplay_loop,
        guidance = mechanics_guidance(&design.concept.genre),
    )
}

/// Deterministic per-genre mechanics for when generation is exhausted.
pub fn fallback_mechanics(genre: &str, limits: &MechanicsLimits) -> GameMechanics {
    if genre.contains("runner") {
        GameMechanics {
            player_movement: PlayerMovement {
                speed: 400.0,
                jump_force: -500.0,
                acceleration: 2000.0,
                friction: 1500.0,
                max_fall_speed: 800.0,
            },
            physics: PhysicsConfig {
                gravity: limits.gravity_default,
                friction: 0.1,
                air_resistance: 0.01,
            },
            player_abilities: vec![
                "jump".to_string(),
                "move".to_string(),
                "slide".to_string(),
                "lane_switch".to_string(),
            ],
            enemy_behaviors: vec!["static_obstacle".to_string(), "moving_obstacle".to_string()],
            collectibles: vec![Collectible {
                kind: "coin".to_string(),
                value: 10,
                spawn_rate: 0.3,
            }],
            obstacles: vec!["barrier".to_string(), "hole".to_string()],
            scoring: ScoringConfig {
                points_per_collectible: 10,
                points_per_enemy: 0,
            },
            game_loop: GameLoopConfig {
                fps: 60,
                use_request_animation_frame: true,
            },
            collision: CollisionConfig {
                enabled: true,
                kind: "aabb".to_string(),
            },
            camera_behavior: "forward_follow".to_string(),
            lane_system: Some(3),
            spawn_system: "continuous_forward".to_string(),
        }
    } else {
        GameMechanics {
            player_movement: PlayerMovement {
                speed: limits.speed_default,
                jump_force: limits.jump_force_default,
                acceleration: limits.acceleration_default,
                friction: limits.friction_default,
                max_fall_speed: limits.max_fall_speed_default,
            },
            physics: PhysicsConfig {
                gravity: limits.gravity_default,
                friction: 0.1,
                air_resistance: 0.01,
            },
            player_abilities: vec!["jump".to_string(), "move".to_string()],
            enemy_behaviors: vec!["patrol".to_string(), "chase".to_string()],
            collectibles: vec![Collectible {
                kind: "coin".to_string(),
                value: 10,
                spawn_rate: 0.2,
            }],
            obstacles: vec!["spike".to_string(), "platform".to_string()],
            scoring: ScoringConfig {
                points_per_collectible: 10,
                points_per_enemy: 50,
            },
            game_loop: GameLoopConfig {
                fps: 60,
                use_request_animation_frame: true,
            },
            collision: CollisionConfig {
                enabled: true,
                kind: "aabb".to_string(),
            },
            camera_behavior: "smooth_follow".to_string(),
            lane_system: None,
            spawn_system: "static_placement".to_string(),
        }
    }
}

pub async fn generate_mechanics<M: ModelClient>(
    client: &M,
    policy: &RetryPolicy,
    limits: &MechanicsLimits,
    design: &GameDesign,
) -> Result<GameMechanics> {
    let conversation = Conversation::from_user_prompt(build_mechanics_prompt(design));
    run_with_retry(
        client,
        conversation,
        |content| {
            let map = json_repair::extract_and_repair(content);
            if map.is_empty() {
                None
            } else {
                Some(validate_and_clamp(&map, limits))
            }
        },
        policy,
        "mechanics",
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> MechanicsLimits {
        MechanicsLimits::default()
    }

    fn clamp_map(raw: &str) -> GameMechanics {
        validate_and_clamp(&json_repair::extract_and_repair(raw), &limits())
    }

    #[test]
    fn test_empty_input_yields_complete_defaults() {
        let m = validate_and_clamp(&JsonMap::new(), &limits());
        assert_eq!(m.player_movement.speed, 300.0);
        assert_eq!(m.player_movement.jump_force, -400.0);
        assert_eq!(m.physics.gravity, 0.8);
        assert_eq!(m.game_loop.fps, 60);
        assert!(m.collision.enabled);
        assert_eq!(m.scoring.points_per_collectible, 10);
    }

    #[test]
    fn test_speed_clamp_invariant() {
        for raw_speed in [-50.0, 0.0, 1.0, 99.0, 300.0, 650.0, 5000.0] {
            let m = clamp_map(&format!(r#"{{"player_movement": {{"speed": {raw_speed}}}}}"#));
            let speed = m.player_movement.speed;
            assert!((100.0..=1000.0).contains(&speed), "speed {raw_speed} -> {speed}");
        }
    }

    #[test]
    fn test_speed_clamp_specifics() {
        assert_eq!(clamp_map(r#"{"player_movement": {"speed": -5}}"#).player_movement.speed, 300.0);
        assert_eq!(clamp_map(r#"{"player_movement": {"speed": 50}}"#).player_movement.speed, 100.0);
        assert_eq!(clamp_map(r#"{"player_movement": {"speed": 900}}"#).player_movement.speed, 600.0);
        assert_eq!(clamp_map(r#"{"player_movement": {"speed": 450}}"#).player_movement.speed, 450.0);
    }

    #[test]
    fn test_jump_force_invariant() {
        for raw in [-10000.0, -650.0, -400.0, -150.0, -1.0, 0.0, 300.0, 700.0] {
            let m = clamp_map(&format!(r#"{{"player_movement": {{"jump_force": {raw}}}}}"#));
            let jf = m.player_movement.jump_force;
            assert!(jf < 0.0, "jump {raw} -> {jf}");
            assert!((-600.0..=-100.0).contains(&jf), "jump {raw} -> {jf}");
        }
    }

    #[test]
    fn test_jump_force_sign_flip() {
        let m = clamp_map(r#"{"player_movement": {"jump_force": 450}}"#);
        assert_eq!(m.player_movement.jump_force, -450.0);
    }

    #[test]
    fn test_gravity_invariant() {
        for raw in [-3.0, 0.0, 0.5, 1.6, 3.0, 9.8, 100.0] {
            let m = clamp_map(&format!(r#"{{"physics": {{"gravity": {raw}}}}}"#));
            let g = m.physics.gravity;
            assert!(g > 0.0 && g <= 5.0, "gravity {raw} -> {g}");
        }
        assert_eq!(clamp_map(r#"{"physics": {"gravity": 9.8}}"#).physics.gravity, 2.0);
        assert_eq!(clamp_map(r#"{"physics": {"gravity": 0}}"#).physics.gravity, 0.8);
        assert_eq!(clamp_map(r#"{"physics": {"gravity": 3.0}}"#).physics.gravity, 3.0);
    }

    #[test]
    fn test_missing_nested_objects_populated() {
        let m = clamp_map(r#"{"player_movement": {"speed": 350, "jump_force": -450}}"#);
        assert_eq!(m.player_movement.acceleration, 1500.0);
        assert_eq!(m.player_movement.friction, 1200.0);
        assert_eq!(m.game_loop.fps, 60);
        assert!(m.game_loop.use_request_animation_frame);
        assert_eq!(m.collision.kind, "aabb");
        assert_eq!(m.scoring.points_per_enemy, 50);
    }

    #[test]
    fn test_string_numbers_accepted() {
        let m = clamp_map(r#"{"player_movement": {"speed": "420", "jump_force": "-350"}}"#);
        assert_eq!(m.player_movement.speed, 420.0);
        assert_eq!(m.player_movement.jump_force, -350.0);
    }

    #[test]
    fn test_collectibles_parsed_and_defaulted() {
        let m = clamp_map(
            r#"{"collectibles": [{"type": "gem", "value": 25, "spawn_rate": 0.1}, "junk"]}"#,
        );
        assert_eq!(m.collectibles.len(), 1);
        assert_eq!(m.collectibles[0].kind, "gem");
        assert_eq!(m.collectibles[0].value, 25);

        let defaulted = validate_and_clamp(&JsonMap::new(), &limits());
        assert_eq!(defaulted.collectibles[0].kind, "coin");
    }

    #[test]
    fn test_fallback_mechanics_per_genre() {
        let runner = fallback_mechanics("endless_runner", &limits());
        assert_eq!(runner.player_movement.speed, 400.0);
        assert_eq!(runner.lane_system, Some(3));
        assert_eq!(runner.camera_behavior, "forward_follow");

        let platformer = fallback_mechanics("platformer", &limits());
        assert_eq!(platformer.player_movement.speed, 300.0);
        assert!(platformer.lane_system.is_none());
        assert_eq!(platformer.spawn_system, "static_placement");
    }

    #[test]
    fn test_clamped_is_idempotent() {
        let m = fallback_mechanics("platformer", &limits());
        let once = m.clone().clamped(&limits());
        let twice = once.clone().clamped(&limits());
        assert_eq!(once.player_movement.speed, twice.player_movement.speed);
        assert_eq!(once.player_movement.jump_force, twice.player_movement.jump_force);
        assert_eq!(once.physics.gravity, twice.physics.gravity);
    }
}
