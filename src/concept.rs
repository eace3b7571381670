//! Intent analysis: user prompt to [`GameConcept`].
//!
//! The first pipeline stage. Free-text output is repaired into JSON, then
//! normalized: dimension coerced to exactly "2D" or "3D", genre resolved
//! through the registry. A deterministic keyword fallback covers total
//! generation failure.

use serde::{Deserialize, Serialize};

use crate::config::RetryPolicy;
use crate::error::Result;
use crate::genres::GenreRegistry;
use crate::json_repair::{self, JsonMap};
use crate::model::ModelClient;
use crate::retry::{run_with_retry, Conversation};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConcept {
    pub genre: String,
    pub dimension: String,
    pub theme: String,
    pub target_audience: String,
    pub core_mechanic: String,
    pub difficulty: String,
    pub referenced_game: Option<String>,
    pub game_style: String,
    pub key_features: Vec<String>,
}

impl GameConcept {
    pub fn is_3d(&self) -> bool {
        self.dimension == "3D"
    }
}

/// Keywords that mark a prompt as 3D: explicit mentions plus well-known 3D
/// game references.
const THREE_D_KEYWORDS: &[&str] = &[
    "3d",
    "3-d",
    "three-dimensional",
    "three dimensional",
    "isometric",
    "perspective",
    "depth",
    "z-axis",
    "webgl",
    "three.js",
    "first person",
    "first-person",
    "third person",
    "open world",
    "subway",
    "temple run",
];

const TWO_D_KEYWORDS: &[&str] = &[
    "2d",
    "2-d",
    "two-dimensional",
    "two dimensional",
    "side-scrolling",
    "side scrolling",
    "side-scroller",
    "platformer",
    "pixel art",
    "pixel",
    "sprite",
    "canvas",
    "flat",
    "retro",
    "arcade",
];

/// Coerces any dimension string to exactly "2D" or "3D".
///
/// Digits 4 through 9 (and "4D"/"5D") collapse to "3D" since only two
/// dimensions are supported; anything unrecognized defaults to "2D".
pub fn normalize_dimension(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    if upper.is_empty() {
        return "2D".to_string();
    }
    let squashed = upper.replace([' ', '-', '_'], "");
    if matches!(squashed.as_str(), "2" | "2D" | "TWO" | "TWOD" | "TWODIMENSIONAL") {
        return "2D".to_string();
    }
    if matches!(
        squashed.as_str(),
        "3" | "3D" | "THREE" | "THREED" | "THREEDIMENSIONAL"
    ) {
        return "3D".to_string();
    }
    if upper.contains('4')
        || upper.contains('5')
        || matches!(squashed.as_str(), "6" | "7" | "8" | "9" | "6D" | "7D" | "8D" | "9D")
    {
        return "3D".to_string();
    }
    "2D".to_string()
}

/// Scores dimension keywords in the raw prompt. An explicit `2d`/`3d` token
/// dominates; ties go to 2D as the simpler target.
pub fn detect_dimension(prompt: &str) -> String {
    let lower = prompt.to_lowercase();
    let mut three_d = 0u32;
    let mut two_d = 0u32;

    for keyword in THREE_D_KEYWORDS {
        if lower.contains(keyword) {
            three_d += 2;
        }
    }
    for keyword in TWO_D_KEYWORDS {
        if lower.contains(keyword) {
            two_d += 2;
        }
    }
    if has_token(&lower, "3d") || has_token(&lower, "3-d") {
        three_d += 5;
    }
    if has_token(&lower, "2d") || has_token(&lower, "2-d") {
        two_d += 5;
    }

    if three_d > two_d {
        "3D".to_string()
    } else {
        "2D".to_string()
    }
}

fn has_token(haystack: &str, token: &str) -> bool {
    haystack.match_indices(token).any(|(idx, _)| {
        let before_ok = idx == 0
            || !haystack[..idx]
                .chars()
                .next_back()
                .map(|c| c.is_alphanumeric())
                .unwrap_or(false);
        let after = idx + token.len();
        let after_ok = after >= haystack.len()
            || !haystack[after..]
                .chars()
                .next()
                .map(|c| c.is_alphanumeric())
                .unwrap_or(false);
        before_ok && after_ok
    })
}

const GAME_REFERENCES: &str = "\
Popular Game References:
- Subway Surfers: Endless runner, swipe controls, collect coins, avoid obstacles, colorful 3D style, fast-paced
- Temple Run: Endless runner, tilt/swipe controls, collect coins, power-ups, jungle theme, dynamic camera
- Flappy Bird: Simple tap-to-jump, avoid pipes, pixel art, high score challenge
- Candy Crush: Match-3 puzzle, colorful candies, level-based progression, power-ups
- Angry Birds: Physics-based slingshot, destroy structures, colorful cartoon style
- Super Mario: Platformer, jump and run, collect coins, defeat enemies, power-ups
- Sonic: Fast platformer, speed-based, collect rings, colorful
- Pac-Man: Maze game, collect dots, avoid ghosts, power pellets
- Tetris: Falling blocks puzzle, line clearing, increasing speed
- Crossy Road: Endless hopper, tap to move forward, avoid traffic, pixel art style";

pub fn build_concept_prompt(user_prompt: &str) -> String {
    format!(
        "You are a game design expert with deep knowledge of popular games. \
         Analyze the user's game idea and extract key concepts.\n\n\
         {GAME_REFERENCES}\n\n\
         User's game request: {user_prompt}\n\n\
         IMPORTANT: If the user references a popular game, extract the core \
         mechanics, visual style, and gameplay feel of that game.\n\n\
         Return a JSON object with:\n\
         - genre: Game genre (platformer, puzzle, rpg, shooter, endless_runner, etc.)\n\
         - dimension: \"2D\" or \"3D\". Mentions of \"2D\", \"pixel art\", \
         \"side-scrolling\" mean 2D; \"3D\" or references to 3D games like \
         Subway Surfers mean 3D; \"4D\"/\"5D\" or higher collapse to 3D; \
         default to 2D when unclear\n\
         - theme: Visual/story theme\n\
         - target_audience: Who this is for\n\
         - core_mechanic: Main gameplay mechanic, be specific\n\
         - referenced_game: Name of popular game if mentioned (null if none)\n\
         - game_style: Visual style to match\n\
         - difficulty: easy, medium, hard\n\
         - key_features: List of 3-5 key features"
    )
}

/// Builds a concept from a repaired model-output map. Returns `None` when
/// the map is empty, which counts as a failed parse attempt upstream.
pub fn concept_from_map(map: &JsonMap, registry: &GenreRegistry, prompt: &str) -> Option<GameConcept> {
    if map.is_empty() {
        return None;
    }
    let genre_raw = json_repair::str_field(map, "genre").unwrap_or_default();
    let genre = if genre_raw.is_empty() {
        registry.normalize(prompt)
    } else {
        registry.normalize(&genre_raw)
    };
    let dimension = match json_repair::str_field(map, "dimension") {
        Some(d) => normalize_dimension(&d),
        None => detect_dimension(prompt),
    };
    Some(GameConcept {
        genre,
        dimension,
        theme: json_repair::str_field(map, "theme").unwrap_or_else(|| "adventure".to_string()),
        target_audience: json_repair::str_field(map, "target_audience")
            .unwrap_or_else(|| "casual gamers".to_string()),
        core_mechanic: json_repair::str_field(map, "core_mechanic")
            .unwrap_or_else(|| "jump and collect".to_string()),
        difficulty: json_repair::str_field(map, "difficulty")
            .unwrap_or_else(|| "medium".to_string()),
        referenced_game: json_repair::str_field(map, "referenced_game")
            .filter(|v| v.to_lowercase() != "null" && v.to_lowercase() != "none"),
        game_style: json_repair::str_field(map, "game_style")
            .unwrap_or_else(|| "colorful and fun".to_string()),
        key_features: json_repair::str_list(map, "key_features"),
    })
}

/// Deterministic concept from keyword sniffing, used when generation is
/// exhausted.
pub fn fallback_concept(prompt: &str, registry: &GenreRegistry) -> GameConcept {
    let lower = prompt.to_lowercase();
    let genre = if lower.contains("runner") {
        "endless_runner".to_string()
    } else if lower.contains("puzzle") {
        "puzzle".to_string()
    } else if lower.contains("shoot") {
        "shooter".to_string()
    } else {
        registry.normalize(&lower)
    };
    let core_mechanic = if genre == "endless_runner" {
        "run and avoid"
    } else {
        "jump and collect"
    };
    GameConcept {
        genre,
        dimension: detect_dimension(prompt),
        theme: "adventure".to_string(),
        target_audience: "casual gamers".to_string(),
        core_mechanic: core_mechanic.to_string(),
        difficulty: "medium".to_string(),
        referenced_game: None,
        game_style: "colorful and fun".to_string(),
        key_features: vec![
            "smooth controls".to_string(),
            "collectibles".to_string(),
            "progressive difficulty".to_string(),
        ],
    }
}

pub async fn generate_concept<M: ModelClient>(
    client: &M,
    policy: &RetryPolicy,
    registry: &GenreRegistry,
    user_prompt: &str,
) -> Result<GameConcept> {
    let conversation = Conversation::from_user_prompt(build_concept_prompt(user_prompt));
    run_with_retry(
        client,
        conversation,
        |content| {
            let map = json_repair::extract_and_repair(content);
            concept_from_map(&map, registry, user_prompt)
        },
        policy,
        "concept",
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_dimension_table() {
        for input in ["4d", "5D", "6", "three dimensional", "3", "3-D", "THREE-D"] {
            assert_eq!(normalize_dimension(input), "3D", "input: {input}");
        }
        for input in ["2", "two dimensional", "pixel", "2D", "flat-world", ""] {
            assert_eq!(normalize_dimension(input), "2D", "input: {input}");
        }
    }

    #[test]
    fn test_detect_dimension_explicit_token_dominates() {
        assert_eq!(detect_dimension("a 2D platformer with 3d-ish depth"), "2D");
        assert_eq!(detect_dimension("3d racing game"), "3D");
    }

    #[test]
    fn test_detect_dimension_referenced_game() {
        assert_eq!(detect_dimension("subway surfers clone"), "3D");
        assert_eq!(detect_dimension("like temple run but in space"), "3D");
    }

    #[test]
    fn test_detect_dimension_defaults_to_2d() {
        assert_eq!(detect_dimension("a game about gardening"), "2D");
        assert_eq!(detect_dimension(""), "2D");
    }

    #[test]
    fn test_token_matching_avoids_substrings() {
        // "23d" should not count as an explicit 3d token.
        assert!(!has_token("a 23d thing", "3d"));
        assert!(has_token("make it 3d please", "3d"));
    }

    #[test]
    fn test_concept_from_map_normalizes() {
        let registry = GenreRegistry::new();
        let map = json_repair::extract_and_repair(
            r#"{"genre": "Platform", "dimension": "4D", "theme": "ninja"}"#,
        );
        let concept = concept_from_map(&map, &registry, "ninja game").unwrap();
        assert_eq!(concept.genre, "platformer");
        assert_eq!(concept.dimension, "3D");
        assert_eq!(concept.theme, "ninja");
        assert_eq!(concept.difficulty, "medium");
    }

    #[test]
    fn test_concept_from_empty_map_fails() {
        let registry = GenreRegistry::new();
        assert!(concept_from_map(&JsonMap::new(), &registry, "x").is_none());
    }

    #[test]
    fn test_fallback_concept_keywords() {
        let registry = GenreRegistry::new();
        let runner = fallback_concept("an endless runner in the desert", &registry);
        assert_eq!(runner.genre, "endless_runner");
        assert_eq!(runner.core_mechanic, "run and avoid");

        let platformer = fallback_concept("a 2D platformer about a ninja collecting coins", &registry);
        assert_eq!(platformer.genre, "platformer");
        assert_eq!(platformer.dimension, "2D");
    }

    #[test]
    fn test_referenced_game_null_string_dropped() {
        let registry = GenreRegistry::new();
        let map = json_repair::extract_and_repair(
            r#"{"genre": "puzzle", "dimension": "2D", "referenced_game": "null"}"#,
        );
        let concept = concept_from_map(&map, &registry, "p").unwrap();
        assert!(concept.referenced_game.is_none());
    }
}
