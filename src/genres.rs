//! Genre registry and fuzzy normalization.
//!
//! The registry is immutable data built at construction and injected where
//! needed, so normalization scoring is unit-testable without ambient state.
//! Free-text genre input resolves through exact key match, then a synonym
//! table, then a weighted fuzzy score over names, example titles, mechanics
//! and features.

use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct GenreInfo {
    pub key: &'static str,
    pub name: &'static str,
    pub category: &'static str,
    pub dimensions: &'static [&'static str],
    pub core_mechanics: &'static [&'static str],
    pub common_features: &'static [&'static str],
    pub examples: &'static [&'static str],
}

macro_rules! genre {
    ($key:literal, $name:literal, $cat:literal, $dims:expr, $mech:expr, $feat:expr, $ex:expr) => {
        GenreInfo {
            key: $key,
            name: $name,
            category: $cat,
            dimensions: $dims,
            core_mechanics: $mech,
            common_features: $feat,
            examples: $ex,
        }
    };
}

const CATALOG: &[GenreInfo] = &[
    genre!("action", "Action", "action", &["2D", "3D"],
        &["combat", "movement", "reflexes"],
        &["enemies", "weapons", "health", "power-ups"],
        &["Devil May Cry", "Bayonetta", "God of War"]),
    genre!("platformer", "Platformer", "action", &["2D", "3D"],
        &["jump", "run", "collect", "avoid"],
        &["platforms", "collectibles", "enemies", "power-ups"],
        &["Super Mario", "Sonic", "Celeste", "Hollow Knight"]),
    genre!("endless_runner", "Endless Runner", "action", &["2D", "3D"],
        &["run", "jump", "slide", "dodge", "collect"],
        &["obstacles", "collectibles", "power-ups", "score"],
        &["Subway Surfers", "Temple Run", "Canabalt", "Jetpack Joyride"]),
    genre!("fighting", "Fighting", "action", &["2D", "3D"],
        &["combat", "special_moves", "block"],
        &["characters", "health", "rounds", "combos"],
        &["Street Fighter", "Tekken", "Mortal Kombat"]),
    genre!("stealth", "Stealth", "action", &["2D", "3D"],
        &["hide", "sneak", "avoid", "assassinate"],
        &["visibility", "noise", "enemies", "tools"],
        &["Metal Gear Solid", "Dishonored", "Hitman"]),
    genre!("survival", "Survival", "action", &["2D", "3D"],
        &["survive", "craft", "gather", "build"],
        &["health", "hunger", "thirst", "crafting"],
        &["Minecraft", "Don't Starve", "The Forest"]),
    genre!("shooter", "Shooter", "shooter", &["2D", "3D"],
        &["aim", "shoot", "reload", "cover"],
        &["weapons", "ammo", "enemies", "health"],
        &["Call of Duty", "Counter-Strike", "Doom"]),
    genre!("fps", "First-Person Shooter", "shooter", &["3D"],
        &["aim", "shoot", "reload", "cover", "movement"],
        &["weapons", "ammo", "enemies", "health", "crosshair"],
        &["Call of Duty", "Doom", "Half-Life", "Halo"]),
    genre!("tps", "Third-Person Shooter", "shooter", &["3D"],
        &["aim", "shoot", "cover", "movement"],
        &["weapons", "ammo", "enemies", "health", "camera"],
        &["Gears of War", "The Division", "Tomb Raider"]),
    genre!("bullet_hell", "Bullet Hell", "shooter", &["2D"],
        &["dodge", "shoot", "pattern_recognition"],
        &["bullets", "power-ups", "bosses", "score"],
        &["Touhou", "Ikaruga", "Enter the Gungeon"]),
    genre!("puzzle", "Puzzle", "puzzle", &["2D", "3D"],
        &["solve", "think", "pattern"],
        &["puzzles", "levels", "hints", "score"],
        &["Tetris", "Portal", "The Witness", "Baba Is You"]),
    genre!("match_3", "Match-3", "puzzle", &["2D"],
        &["match", "swap", "combo", "clear"],
        &["grid", "pieces", "power-ups", "levels"],
        &["Candy Crush", "Bejeweled", "Puzzle Quest"]),
    genre!("tetris_like", "Tetris-like", "puzzle", &["2D"],
        &["rotate", "place", "clear_lines"],
        &["falling_blocks", "grid", "score", "speed"],
        &["Tetris", "Puyo Puyo", "Dr. Mario"]),
    genre!("physics_puzzle", "Physics Puzzle", "puzzle", &["2D", "3D"],
        &["physics", "solve", "manipulate"],
        &["objects", "gravity", "constraints", "goals"],
        &["Angry Birds", "Cut the Rope", "World of Goo"]),
    genre!("maze", "Maze", "puzzle", &["2D", "3D"],
        &["navigate", "explore", "solve", "find"],
        &["walls", "path", "goal", "collectibles"],
        &["Pac-Man", "Labyrinth", "Maze Runner"]),
    genre!("strategy", "Strategy", "strategy", &["2D", "3D"],
        &["plan", "manage", "execute"],
        &["resources", "units", "buildings", "objectives"],
        &["Civilization", "Age of Empires", "StarCraft"]),
    genre!("rts", "Real-Time Strategy", "strategy", &["2D", "3D"],
        &["build", "manage", "command", "expand"],
        &["resources", "units", "buildings", "map"],
        &["StarCraft", "Age of Empires", "Command & Conquer"]),
    genre!("tbs", "Turn-Based Strategy", "strategy", &["2D", "3D"],
        &["plan", "execute", "wait"],
        &["turns", "units", "resources", "map"],
        &["Civilization", "XCOM", "Fire Emblem"]),
    genre!("tower_defense", "Tower Defense", "strategy", &["2D", "3D"],
        &["place", "upgrade", "defend"],
        &["towers", "waves", "enemies", "resources"],
        &["Plants vs Zombies", "Kingdom Rush", "Bloons TD"]),
    genre!("card_game", "Card Game", "strategy", &["2D"],
        &["draw", "play", "strategy", "deck"],
        &["cards", "deck", "hand", "mana"],
        &["Hearthstone", "Magic: The Gathering", "Slay the Spire"]),
    genre!("board_game", "Board Game", "strategy", &["2D", "3D"],
        &["turn", "strategy", "luck", "rules"],
        &["pieces", "board", "turns", "rules"],
        &["Chess", "Monopoly", "Catan"]),
    genre!("rpg", "RPG", "rpg", &["2D", "3D"],
        &["level", "equip", "quest", "explore"],
        &["stats", "inventory", "quests", "npcs"],
        &["Final Fantasy", "The Elder Scrolls", "The Witcher"]),
    genre!("action_rpg", "Action RPG", "rpg", &["2D", "3D"],
        &["combat", "level", "loot", "explore"],
        &["stats", "inventory", "skills", "enemies"],
        &["Diablo", "Dark Souls", "The Witcher"]),
    genre!("roguelike", "Roguelike", "rpg", &["2D", "3D"],
        &["permadeath", "procedural", "explore", "loot"],
        &["dungeons", "items", "enemies", "random"],
        &["The Binding of Isaac", "Spelunky", "Hades"]),
    genre!("adventure", "Adventure", "adventure", &["2D", "3D"],
        &["explore", "solve", "story", "interact"],
        &["npcs", "items", "puzzles", "story"],
        &["The Legend of Zelda", "Tomb Raider", "Uncharted"]),
    genre!("point_and_click", "Point and Click", "adventure", &["2D"],
        &["click", "explore", "solve", "collect"],
        &["items", "npcs", "puzzles", "inventory"],
        &["Monkey Island", "Grim Fandango", "Broken Age"]),
    genre!("metroidvania", "Metroidvania", "adventure", &["2D"],
        &["explore", "backtrack", "unlock", "upgrade"],
        &["map", "abilities", "secrets", "bosses"],
        &["Metroid", "Castlevania", "Hollow Knight", "Ori"]),
    genre!("simulation", "Simulation", "simulation", &["2D", "3D"],
        &["simulate", "manage", "control"],
        &["systems", "resources", "time", "realism"],
        &["The Sims", "Flight Simulator", "Euro Truck Simulator"]),
    genre!("racing", "Racing", "simulation", &["2D", "3D"],
        &["drive", "race", "compete", "upgrade"],
        &["vehicles", "tracks", "lap", "time"],
        &["Mario Kart", "Forza", "Gran Turismo"]),
    genre!("sports", "Sports", "simulation", &["2D", "3D"],
        &["play", "compete", "control", "strategy"],
        &["teams", "rules", "field", "score"],
        &["FIFA", "NBA 2K", "Rocket League"]),
    genre!("arcade", "Arcade", "arcade", &["2D", "3D"],
        &["score", "survive", "quick_reflexes"],
        &["high_score", "lives", "power-ups", "waves"],
        &["Pac-Man", "Space Invaders", "Galaga"]),
    genre!("horror", "Horror", "horror", &["2D", "3D"],
        &["survive", "hide", "explore", "fear"],
        &["enemies", "atmosphere", "resources", "scares"],
        &["Resident Evil", "Silent Hill", "Amnesia"]),
    genre!("idle", "Idle/Incremental", "casual", &["2D"],
        &["wait", "upgrade", "progress", "automate"],
        &["currency", "upgrades", "prestige", "time"],
        &["Cookie Clicker", "Adventure Capitalist", "Idle Miner"]),
    genre!("rhythm", "Rhythm", "music", &["2D", "3D"],
        &["tap", "timing", "rhythm", "combo"],
        &["music", "notes", "score", "combo"],
        &["Guitar Hero", "Dance Dance Revolution", "Beat Saber"]),
    genre!("sandbox", "Sandbox", "creative", &["2D", "3D"],
        &["create", "build", "explore", "experiment"],
        &["tools", "materials", "world", "creativity"],
        &["Minecraft", "Terraria", "Garry's Mod"]),
    genre!("casual", "Casual", "casual", &["2D"],
        &["simple", "quick", "relaxing"],
        &["easy", "short", "accessible", "fun"],
        &["Angry Birds", "Candy Crush", "Flappy Bird"]),
];

const SYNONYMS: &[(&str, &str)] = &[
    ("platform", "platformer"),
    ("platforming", "platformer"),
    ("jump and run", "platformer"),
    ("runner", "endless_runner"),
    ("endless run", "endless_runner"),
    ("infinite runner", "endless_runner"),
    ("first person shooter", "fps"),
    ("third person shooter", "tps"),
    ("shmup", "bullet_hell"),
    ("shoot em up", "bullet_hell"),
    ("match three", "match_3"),
    ("match-3", "match_3"),
    ("match 3", "match_3"),
    ("real time strategy", "rts"),
    ("turn based strategy", "tbs"),
    ("role playing game", "rpg"),
    ("action role playing", "action_rpg"),
    ("action rpg", "action_rpg"),
    ("rogue like", "roguelike"),
    ("card", "card_game"),
    ("board", "board_game"),
    ("stealth game", "stealth"),
    ("survival game", "survival"),
    ("casual game", "casual"),
];

/// Fallback key when nothing scores above zero.
pub const DEFAULT_GENRE: &str = "platformer";

#[derive(Debug, Clone)]
pub struct GenreRegistry {
    genres: &'static [GenreInfo],
    synonyms: &'static [(&'static str, &'static str)],
}

impl Default for GenreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl GenreRegistry {
    pub fn new() -> Self {
        Self {
            genres: CATALOG,
            synonyms: SYNONYMS,
        }
    }

    pub fn get(&self, key: &str) -> Option<&GenreInfo> {
        let key = key.to_lowercase();
        self.genres.iter().find(|g| g.key == key)
    }

    /// Genre metadata, defaulting to the platformer entry for unknown keys.
    pub fn info_or_default(&self, key: &str) -> &GenreInfo {
        self.get(key)
            .or_else(|| self.get(DEFAULT_GENRE))
            .unwrap_or(&self.genres[0])
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.genres.iter().map(|g| g.key)
    }

    pub fn by_category(&self, category: &str) -> Vec<&'static str> {
        let category = category.to_lowercase();
        self.genres
            .iter()
            .filter(|g| g.category == category)
            .map(|g| g.key)
            .collect()
    }

    /// Resolves free-text genre input to a registry key.
    pub fn normalize(&self, input: &str) -> String {
        let lower = input.to_lowercase();
        let lower = lower.trim();
        if lower.is_empty() {
            return DEFAULT_GENRE.to_string();
        }

        if self.genres.iter().any(|g| g.key == lower) {
            return lower.to_string();
        }
        if let Some((_, key)) = self.synonyms.iter().find(|(syn, _)| *syn == lower) {
            return key.to_string();
        }

        let mut best: Option<&GenreInfo> = None;
        let mut best_score = 0u32;
        for info in self.genres {
            let score = self.score(info, lower);
            if score > best_score {
                best_score = score;
                best = Some(info);
            }
        }

        match best {
            Some(info) if best_score > 0 => {
                debug!(input, matched = info.key, score = best_score, "fuzzy genre match");
                info.key.to_string()
            }
            _ => {
                warn!(input, "no genre match, defaulting to {DEFAULT_GENRE}");
                DEFAULT_GENRE.to_string()
            }
        }
    }

    fn score(&self, info: &GenreInfo, input: &str) -> u32 {
        let mut score = 0;

        if input.contains(info.key) || info.key.contains(input) {
            score += 10;
        }

        let name = info.name.to_lowercase();
        if input.contains(&name) {
            score += 8;
        } else if name.split_whitespace().any(|word| input.contains(word)) {
            score += 5;
        }

        // Example-title overlap catches prompts like "subway surfers clone".
        for example in info.examples {
            let example = example.to_lowercase();
            if example
                .split_whitespace()
                .any(|word| word.len() > 3 && input.contains(word))
            {
                score += 3;
            }
        }

        for mechanic in info.core_mechanics {
            if input.contains(mechanic) {
                score += 2;
            }
        }
        for feature in info.common_features {
            if input.contains(feature) {
                score += 1;
            }
        }

        score
    }
}
