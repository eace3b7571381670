//! Deterministic code templates for the non-AI generation path.
//!
//! Every builder takes already-validated design data and interpolates its
//! numbers into GDScript, Godot scene text, or a self-contained HTML
//! document. The web fallbacks are written to pass the static checks in
//! [`crate::code_validator`] so the template path never re-enters the fix
//! loop.

use crate::design::{GameDesign, UiDesign};
use crate::level::Level;
use crate::mechanics::GameMechanics;

// ============================================================================
// Godot project configuration
// ============================================================================

pub fn project_godot(title: &str, dimension: &str) -> String {
    let renderer = if dimension == "3D" {
        "forward_plus"
    } else {
        "gl_compatibility"
    };
    format!(
        r#"; Engine configuration file.
config_version=5

[application]

config/name="{title}"
run/main_scene="res://scenes/main.tscn"
config/features=PackedStringArray("4.3")

[display]

window/size/viewport_width=1200
window/size/viewport_height=800
window/stretch/mode="canvas_items"

[input]

move_left={{"deadzone": 0.5, "events": []}}
move_right={{"deadzone": 0.5, "events": []}}
jump={{"deadzone": 0.5, "events": []}}

[rendering]

renderer/rendering_method="{renderer}"
"#
    )
}

// ============================================================================
// Player controllers
// ============================================================================

/// 2D platformer controller with coyote time, jump buffering and variable
/// jump height. Movement constants come from the validated mechanics.
pub fn player_script_2d(mechanics: &GameMechanics) -> String {
    let movement = &mechanics.player_movement;
    let speed = movement.speed.clamp(100.0, 600.0);
    let jump = movement.jump_force.clamp(-600.0, -200.0);
    let acceleration = movement.acceleration.clamp(1000.0, 3000.0);
    let friction = movement.friction.clamp(800.0, 2000.0);
    format!(
        r#"extends CharacterBody2D

signal health_changed(current, maximum)
signal score_changed(score)
signal player_died
signal jumped
signal landed

const SPEED: float = {speed:.1}
const JUMP_VELOCITY: float = {jump:.1}
const ACCELERATION: float = {acceleration:.1}
const FRICTION: float = {friction:.1}
const GRAVITY: float = 980.0
const MAX_FALL_SPEED: float = 1000.0
const COYOTE_TIME: float = 0.15
const JUMP_BUFFER_TIME: float = 0.1
const AIR_CONTROL: float = 0.6
const VARIABLE_JUMP_MULTIPLIER: float = 0.5

var max_health: int = 100
var health: int = 100
var score: int = 0
var coyote_timer: float = 0.0
var jump_buffer_timer: float = 0.0
var invulnerable: bool = false

func _physics_process(delta: float) -> void:
	if not is_on_floor():
		velocity.y = min(velocity.y + GRAVITY * delta, MAX_FALL_SPEED)
		coyote_timer = max(coyote_timer - delta, 0.0)
	else:
		if coyote_timer <= 0.0 and velocity.y >= 0.0:
			landed.emit()
		coyote_timer = COYOTE_TIME

	jump_buffer_timer = max(jump_buffer_timer - delta, 0.0)
	if _jump_pressed():
		jump_buffer_timer = JUMP_BUFFER_TIME

	if jump_buffer_timer > 0.0 and coyote_timer > 0.0:
		velocity.y = JUMP_VELOCITY
		jump_buffer_timer = 0.0
		coyote_timer = 0.0
		jumped.emit()

	if _jump_released() and velocity.y < 0.0:
		velocity.y *= VARIABLE_JUMP_MULTIPLIER

	var direction := _move_axis()
	var control := 1.0 if is_on_floor() else AIR_CONTROL
	if direction != 0.0:
		velocity.x = move_toward(velocity.x, direction * SPEED, ACCELERATION * control * delta)
	else:
		velocity.x = move_toward(velocity.x, 0.0, FRICTION * control * delta)

	move_and_slide()

func _move_axis() -> float:
	var axis := Input.get_axis("move_left", "move_right")
	if axis == 0.0:
		if Input.is_key_pressed(KEY_A) or Input.is_key_pressed(KEY_LEFT):
			axis = -1.0
		elif Input.is_key_pressed(KEY_D) or Input.is_key_pressed(KEY_RIGHT):
			axis = 1.0
	return axis

func _jump_pressed() -> bool:
	return Input.is_action_just_pressed("jump") \
		or Input.is_key_pressed(KEY_SPACE) or Input.is_key_pressed(KEY_W)

func _jump_released() -> bool:
	return Input.is_action_just_released("jump")

func take_damage(amount: int) -> void:
	if invulnerable:
		return
	health = max(health - amount, 0)
	health_changed.emit(health, max_health)
	if health <= 0:
		die()
		return
	invulnerable = true
	var tween := create_tween()
	tween.tween_property(self, "modulate:a", 0.3, 0.1)
	tween.tween_property(self, "modulate:a", 1.0, 0.1)
	tween.set_loops(5)
	tween.finished.connect(func() -> void: invulnerable = false)

func collect_item(item_type: String, value: int) -> void:
	match item_type:
		"health":
			health = min(health + value, max_health)
			health_changed.emit(health, max_health)
		_:
			score += value
			score_changed.emit(score)

func die() -> void:
	player_died.emit()
	set_physics_process(false)
"#
    )
}

/// 3D lane-runner controller: automatic forward motion, discrete lane
/// switching, jump.
pub fn player_script_3d(mechanics: &GameMechanics) -> String {
    let movement = &mechanics.player_movement;
    let forward_speed = movement.speed.clamp(100.0, 600.0) / 40.0;
    let jump = movement.jump_force.abs().clamp(200.0, 600.0) / 60.0;
    let lanes = mechanics.lane_system.unwrap_or(3).max(1);
    format!(
        r#"extends CharacterBody3D

signal health_changed(current, maximum)
signal score_changed(score)
signal player_died
signal lane_changed(lane)

const FORWARD_SPEED: float = {forward_speed:.2}
const JUMP_VELOCITY: float = {jump:.2}
const GRAVITY: float = 24.0
const LANE_COUNT: int = {lanes}
const LANE_WIDTH: float = 2.5
const LANE_SWITCH_SPEED: float = 12.0

var max_health: int = 100
var health: int = 100
var score: int = 0
var current_lane: int = LANE_COUNT / 2

func _physics_process(delta: float) -> void:
	velocity.z = -FORWARD_SPEED

	if not is_on_floor():
		velocity.y -= GRAVITY * delta
	elif Input.is_action_just_pressed("jump") or Input.is_key_pressed(KEY_SPACE):
		velocity.y = JUMP_VELOCITY

	if Input.is_action_just_pressed("move_left") or Input.is_key_pressed(KEY_A):
		_switch_lane(-1)
	elif Input.is_action_just_pressed("move_right") or Input.is_key_pressed(KEY_D):
		_switch_lane(1)

	var target_x := (current_lane - LANE_COUNT / 2) * LANE_WIDTH
	position.x = move_toward(position.x, target_x, LANE_SWITCH_SPEED * delta)

	move_and_slide()

func _switch_lane(direction: int) -> void:
	var next := clampi(current_lane + direction, 0, LANE_COUNT - 1)
	if next != current_lane:
		current_lane = next
		lane_changed.emit(current_lane)

func take_damage(amount: int) -> void:
	health = max(health - amount, 0)
	health_changed.emit(health, max_health)
	if health <= 0:
		die()

func collect_item(_item_type: String, value: int) -> void:
	score += value
	score_changed.emit(score)

func die() -> void:
	player_died.emit()
	set_physics_process(false)
"#
    )
}

// ============================================================================
// Enemies and collectibles
// ============================================================================

pub fn enemy_script(mechanics: &GameMechanics) -> String {
    let chases = mechanics
        .enemy_behaviors
        .iter()
        .any(|b| b.contains("chase"));
    let patrol_speed = (mechanics.player_movement.speed * 0.4).clamp(40.0, 240.0);
    let chase_block = if chases {
        r#"	var player := get_tree().get_first_node_in_group("player")
	if player != null and global_position.distance_to(player.global_position) < CHASE_RANGE:
		direction = sign(player.global_position.x - global_position.x)
"#
    } else {
        ""
    };
    format!(
        r#"extends CharacterBody2D

const PATROL_SPEED: float = {patrol_speed:.1}
const CHASE_RANGE: float = 220.0
const GRAVITY: float = 980.0
const DAMAGE: int = 20

var direction: float = -1.0

func _physics_process(delta: float) -> void:
	if not is_on_floor():
		velocity.y += GRAVITY * delta

	if is_on_wall():
		direction = -direction
{chase_block}
	velocity.x = direction * PATROL_SPEED
	move_and_slide()

func _on_hitbox_body_entered(body: Node) -> void:
	if body.is_in_group("player") and body.has_method("take_damage"):
		body.take_damage(DAMAGE)
"#
    )
}

pub fn collectible_script(mechanics: &GameMechanics) -> String {
    let (kind, value) = mechanics
        .collectibles
        .first()
        .map(|c| (c.kind.clone(), c.value))
        .unwrap_or_else(|| ("coin".to_string(), 10));
    format!(
        r#"extends Area2D

const ITEM_TYPE: String = "{kind}"
const VALUE: int = {value}

func _ready() -> void:
	body_entered.connect(_on_body_entered)

func _on_body_entered(body: Node) -> void:
	if body.is_in_group("player") and body.has_method("collect_item"):
		body.collect_item(ITEM_TYPE, VALUE)
		queue_free()
"#
    )
}

// ============================================================================
// Game manager and HUD
// ============================================================================

pub fn game_manager_script(design: &GameDesign, mechanics: &GameMechanics) -> String {
    let title = sanitize_gd_string(&design.title);
    let win = sanitize_gd_string(&design.win_condition);
    let lose = sanitize_gd_string(&design.lose_condition);
    format!(
        r#"extends Node

# {title}
# Win: {win}
# Lose: {lose}

signal game_over(won)

const POINTS_PER_COLLECTIBLE: int = {collect_points}
const POINTS_PER_ENEMY: int = {enemy_points}

var score: int = 0
var level_index: int = 0

func _ready() -> void:
	var player := get_tree().get_first_node_in_group("player")
	if player != null:
		player.score_changed.connect(_on_score_changed)
		player.player_died.connect(_on_player_died)

func _on_score_changed(new_score: int) -> void:
	score = new_score

func _on_player_died() -> void:
	game_over.emit(false)

func reach_goal() -> void:
	level_index += 1
	if level_index >= 2:
		game_over.emit(true)
	else:
		get_tree().reload_current_scene()
"#,
        collect_points = mechanics.scoring.points_per_collectible,
        enemy_points = mechanics.scoring.points_per_enemy,
    )
}

fn hud_anchor(position: &str) -> (&'static str, &'static str) {
    match position {
        "top_right" => ("1.0", "Vector2(-180, 20)"),
        "top_center" => ("0.5", "Vector2(-80, 20)"),
        _ => ("0.0", "Vector2(20, 20)"),
    }
}

pub fn hud_script(ui: &UiDesign) -> String {
    let (score_anchor, score_offset) = hud_anchor(&ui.score_position);
    let (health_anchor, health_offset) = hud_anchor(&ui.health_position);
    let health_update = if ui.health_display == "bar" {
        "health_bar.value = current * 100 / maximum"
    } else {
        "health_label.text = \"Health: %d\" % current"
    };
    format!(
        r#"extends CanvasLayer

const FONT_SIZE: int = {font_size}

@onready var score_label: Label = $ScoreLabel
@onready var health_label: Label = $HealthLabel
@onready var health_bar: ProgressBar = $HealthBar

func _ready() -> void:
	score_label.anchor_left = {score_anchor}
	score_label.anchor_right = {score_anchor}
	score_label.position = {score_offset}
	health_label.anchor_left = {health_anchor}
	health_label.anchor_right = {health_anchor}
	health_label.position = {health_offset}
	health_bar.visible = {bar_visible}
	health_label.visible = not {bar_visible}
	var player := get_tree().get_first_node_in_group("player")
	if player != null:
		player.score_changed.connect(_on_score_changed)
		player.health_changed.connect(_on_health_changed)

func _on_score_changed(score: int) -> void:
	score_label.text = "Score: %d" % score

func _on_health_changed(current: int, maximum: int) -> void:
	{health_update}
"#,
        font_size = ui.font_size,
        bar_visible = ui.health_display == "bar",
    )
}

// ============================================================================
// Cameras
// ============================================================================

pub const CAMERA_SCRIPT_2D: &str = r#"extends Camera2D

const FOLLOW_SPEED: float = 5.0

@export var target_path: NodePath

func _process(delta: float) -> void:
	var target := get_node_or_null(target_path)
	if target != null:
		global_position = global_position.lerp(target.global_position, FOLLOW_SPEED * delta)
"#;

pub fn camera_script_3d(mechanics: &GameMechanics) -> String {
    let forward = mechanics.camera_behavior == "forward_follow";
    format!(
        r#"extends Camera3D

const FOLLOW_DISTANCE: float = 8.0
const FOLLOW_HEIGHT: float = 4.0
const FOLLOW_LATERAL: bool = {lateral}

@export var target_path: NodePath

func _process(_delta: float) -> void:
	var target := get_node_or_null(target_path)
	if target == null:
		return
	var pos: Vector3 = target.global_position
	position.z = pos.z + FOLLOW_DISTANCE
	position.y = pos.y + FOLLOW_HEIGHT
	if FOLLOW_LATERAL:
		position.x = lerp(position.x, pos.x, 0.1)
	look_at(pos, Vector3.UP)
"#,
        lateral = !forward,
    )
}

// ============================================================================
// Scenes
// ============================================================================

pub fn main_scene(dimension: &str, endless: bool) -> String {
    let level = if dimension == "3D" {
        "res://scenes/runner.tscn"
    } else if endless {
        "res://scenes/endless.tscn"
    } else {
        "res://scenes/level_1.tscn"
    };
    format!(
        r#"[gd_scene load_steps=3 format=3]

[ext_resource type="PackedScene" path="{level}" id="1"]
[ext_resource type="Script" path="res://scripts/game_manager.gd" id="2"]

[node name="Main" type="Node"]
script = ExtResource("2")

[node name="Level" parent="." instance=ExtResource("1")]
"#
    )
}

/// Builds a level scene from validated layout coordinates. Platforms become
/// static bodies, enemies and collectibles become instanced scenes.
pub fn level_scene_2d(level: &Level, index: usize) -> String {
    let mut scene = format!(
        "[gd_scene load_steps={steps} format=3]\n\n\
         [ext_resource type=\"Script\" path=\"res://scripts/player.gd\" id=\"1\"]\n\
         [ext_resource type=\"PackedScene\" path=\"res://scenes/enemy.tscn\" id=\"2\"]\n\
         [ext_resource type=\"PackedScene\" path=\"res://scenes/collectible.tscn\" id=\"3\"]\n\
         [ext_resource type=\"Script\" path=\"res://scripts/camera.gd\" id=\"4\"]\n",
        steps = 5 + level.platforms.len(),
    );

    for (i, platform) in level.platforms.iter().enumerate() {
        let [_, _, w, h] = *platform;
        scene.push_str(&format!(
            "\n[sub_resource type=\"RectangleShape2D\" id=\"RectangleShape2D_{n}\"]\nsize = Vector2({w:.0}, {h:.0})\n",
            n = i + 1,
        ));
    }

    scene.push_str(&format!(
        "\n[node name=\"Level{number}\" type=\"Node2D\"]\n\n\
         [node name=\"Player\" type=\"CharacterBody2D\" parent=\".\" groups=[\"player\"]]\n\
         position = Vector2({spawn_x:.0}, {spawn_y:.0})\n\
         script = ExtResource(\"1\")\n\n\
         [node name=\"Camera\" type=\"Camera2D\" parent=\"Player\"]\n\
         script = ExtResource(\"4\")\n\
         target_path = NodePath(\"..\")\n",
        number = index + 1,
        spawn_x = level.spawn_point[0],
        spawn_y = level.spawn_point[1],
    ));

    for (i, platform) in level.platforms.iter().enumerate() {
        let [x, y, w, h] = *platform;
        scene.push_str(&format!(
            "\n[node name=\"Platform{n}\" type=\"StaticBody2D\" parent=\".\"]\n\
             position = Vector2({cx:.0}, {cy:.0})\n\n\
             [node name=\"Shape\" type=\"CollisionShape2D\" parent=\"Platform{n}\"]\n\
             shape = SubResource(\"RectangleShape2D_{n}\")\n",
            n = i + 1,
            cx = x + w / 2.0,
            cy = y + h / 2.0,
        ));
    }

    for (i, enemy) in level.enemies.iter().enumerate() {
        scene.push_str(&format!(
            "\n[node name=\"Enemy{n}\" parent=\".\" instance=ExtResource(\"2\")]\nposition = Vector2({x:.0}, {y:.0})\n",
            n = i + 1,
            x = enemy[0],
            y = enemy[1],
        ));
    }
    for (i, item) in level.collectibles.iter().enumerate() {
        scene.push_str(&format!(
            "\n[node name=\"Collectible{n}\" parent=\".\" instance=ExtResource(\"3\")]\nposition = Vector2({x:.0}, {y:.0})\n",
            n = i + 1,
            x = item[0],
            y = item[1],
        ));
    }

    scene.push_str(&format!(
        "\n[node name=\"Goal\" type=\"Area2D\" parent=\".\"]\nposition = Vector2({x:.0}, {y:.0})\n",
        x = level.goal[0],
        y = level.goal[1],
    ));
    scene
}

/// Side-scrolling endless layout: one long ground strip, the player with a
/// trailing camera, and a starter row of obstacle instances.
pub fn endless_scene_2d() -> String {
    r#"[gd_scene load_steps=6 format=3]

[ext_resource type="Script" path="res://scripts/player.gd" id="1"]
[ext_resource type="PackedScene" path="res://scenes/enemy.tscn" id="2"]
[ext_resource type="PackedScene" path="res://scenes/collectible.tscn" id="3"]
[ext_resource type="Script" path="res://scripts/camera.gd" id="4"]

[sub_resource type="RectangleShape2D" id="RectangleShape2D_1"]
size = Vector2(100000, 40)

[node name="Endless" type="Node2D"]

[node name="Player" type="CharacterBody2D" parent="." groups=["player"]]
position = Vector2(100, 500)
script = ExtResource("1")

[node name="Camera" type="Camera2D" parent="Player"]
script = ExtResource("4")
target_path = NodePath("..")

[node name="Ground" type="StaticBody2D" parent="."]
position = Vector2(50000, 580)

[node name="Shape" type="CollisionShape2D" parent="Ground"]
shape = SubResource("RectangleShape2D_1")

[node name="Enemy1" parent="." instance=ExtResource("2")]
position = Vector2(700, 520)

[node name="Collectible1" parent="." instance=ExtResource("3")]
position = Vector2(500, 500)
"#
    .to_string()
}

pub fn runner_scene_3d() -> String {
    r#"[gd_scene load_steps=4 format=3]

[ext_resource type="Script" path="res://scripts/player.gd" id="1"]
[ext_resource type="Script" path="res://scripts/camera.gd" id="2"]
[ext_resource type="Script" path="res://scripts/spawner.gd" id="3"]

[node name="Runner" type="Node3D"]

[node name="Player" type="CharacterBody3D" parent="." groups=["player"]]
script = ExtResource("1")

[node name="Camera" type="Camera3D" parent="."]
script = ExtResource("2")
target_path = NodePath("../Player")

[node name="Spawner" type="Node3D" parent="."]
script = ExtResource("3")

[node name="Ground" type="StaticBody3D" parent="."]

[node name="Sun" type="DirectionalLight3D" parent="."]
"#
    .to_string()
}

/// Obstacle spawner for the endless family: spawns ahead of the player and
/// despawns behind.
pub fn spawner_script(mechanics: &GameMechanics) -> String {
    let spawn_rate = mechanics
        .collectibles
        .first()
        .map(|c| c.spawn_rate)
        .unwrap_or(0.3)
        .clamp(0.05, 1.0);
    let lanes = mechanics.lane_system.unwrap_or(3).max(1);
    format!(
        r#"extends Node3D

const SPAWN_INTERVAL: float = {interval:.2}
const SPAWN_AHEAD: float = 60.0
const DESPAWN_BEHIND: float = 15.0
const LANE_COUNT: int = {lanes}
const LANE_WIDTH: float = 2.5

var timer: float = 0.0

func _process(delta: float) -> void:
	timer += delta
	if timer >= SPAWN_INTERVAL:
		timer = 0.0
		_spawn_row()
	_despawn_passed()

func _spawn_row() -> void:
	var player := get_tree().get_first_node_in_group("player")
	if player == null:
		return
	var lane := randi_range(0, LANE_COUNT - 1)
	var obstacle := _make_obstacle()
	obstacle.position = Vector3(
		(lane - LANE_COUNT / 2) * LANE_WIDTH,
		0.5,
		player.global_position.z - SPAWN_AHEAD)
	add_child(obstacle)

func _make_obstacle() -> StaticBody3D:
	var body := StaticBody3D.new()
	var shape := CollisionShape3D.new()
	shape.shape = BoxShape3D.new()
	body.add_child(shape)
	return body

func _despawn_passed() -> void:
	var player := get_tree().get_first_node_in_group("player")
	if player == null:
		return
	for child in get_children():
		if child.position.z > player.global_position.z + DESPAWN_BEHIND:
			child.queue_free()
"#,
        interval = (1.0 / spawn_rate.max(0.05)).clamp(0.5, 5.0),
    )
}

// ============================================================================
// Web fallbacks
// ============================================================================

const FALLBACK_HTML5_DOC: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<style>
* { margin: 0; padding: 0; box-sizing: border-box; }
body { overflow: hidden; background: #1a1a2e; font-family: Arial, sans-serif; }
#gameCanvas { display: block; width: 100vw; height: 100vh; }
#ui { position: absolute; top: 20px; left: 20px; color: white; font-size: 24px; z-index: 100; }
</style>
</head>
<body>
<div id="ui"><div>Score: <span id="score">0</span></div></div>
<canvas id="gameCanvas"></canvas>
<script src="https://cdnjs.cloudflare.com/ajax/libs/matter-js/0.19.0/matter.min.js"></script>
<script>
const { Engine, World, Bodies, Body } = Matter;

const canvas = document.getElementById('gameCanvas');
const ctx = canvas.getContext('2d');
canvas.width = window.innerWidth;
canvas.height = window.innerHeight;

const engine = Engine.create();
const world = engine.world;

const PLAYER_SPEED = {player_speed};
const JUMP_VELOCITY = {jump_velocity};

let score = 0;
const keys = {};

const player = Bodies.rectangle(100, 300, 50, 50, {
    frictionAir: 0.01,
    render: { fillStyle: '{primary_color}' }
});
World.add(world, player);

const ground = Bodies.rectangle(canvas.width / 2, canvas.height - 25, canvas.width, 50, {
    isStatic: true,
    render: { fillStyle: '#8B4513' }
});
World.add(world, ground);

window.addEventListener('keydown', (e) => { keys[e.key.toLowerCase()] = true; });
window.addEventListener('keyup', (e) => { keys[e.key.toLowerCase()] = false; });

function gameLoop() {
    Engine.update(engine, 1000 / 60);

    if (keys['a'] || keys['arrowleft']) {
        Body.setVelocity(player, { x: -PLAYER_SPEED, y: player.velocity.y });
    }
    if (keys['d'] || keys['arrowright']) {
        Body.setVelocity(player, { x: PLAYER_SPEED, y: player.velocity.y });
    }
    if ((keys['w'] || keys[' '] || keys['arrowup']) && player.position.y > canvas.height - 110) {
        Body.setVelocity(player, { x: player.velocity.x, y: JUMP_VELOCITY });
    }

    ctx.fillStyle = '#1a1a2e';
    ctx.fillRect(0, 0, canvas.width, canvas.height);

    world.bodies.forEach(body => {
        const w = body.bounds.max.x - body.bounds.min.x;
        const h = body.bounds.max.y - body.bounds.min.y;
        ctx.fillStyle = body.render.fillStyle || '#fff';
        ctx.fillRect(body.bounds.min.x, body.bounds.min.y, w, h);
    });

    document.getElementById('score').textContent = score;
    requestAnimationFrame(gameLoop);
}

window.addEventListener('resize', () => {
    canvas.width = window.innerWidth;
    canvas.height = window.innerHeight;
});

gameLoop();
</script>
</body>
</html>
"#;

const FALLBACK_THREEJS_DOC: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<style>
* { margin: 0; padding: 0; box-sizing: border-box; }
body { overflow: hidden; background: #000; font-family: Arial, sans-serif; }
#ui { position: absolute; top: 20px; left: 20px; color: white; font-size: 24px; z-index: 100; }
</style>
</head>
<body>
<div id="ui"><div>Score: <span id="score">0</span></div></div>
<script src="https://cdnjs.cloudflare.com/ajax/libs/three.js/r128/three.min.js"></script>
<script>
const scene = new THREE.Scene();
scene.background = new THREE.Color(0x1a1a2e);

const camera = new THREE.PerspectiveCamera(75, window.innerWidth / window.innerHeight, 0.1, 1000);
camera.position.set(0, 5, 10);
camera.lookAt(0, 0, 0);

const renderer = new THREE.WebGLRenderer({ antialias: true });
renderer.setSize(window.innerWidth, window.innerHeight);
document.body.appendChild(renderer.domElement);

const ambientLight = new THREE.AmbientLight(0xffffff, 0.5);
scene.add(ambientLight);
const directionalLight = new THREE.DirectionalLight(0xffffff, 0.8);
directionalLight.position.set(5, 10, 5);
scene.add(directionalLight);

const player = new THREE.Mesh(
    new THREE.BoxGeometry(1, 1, 1),
    new THREE.MeshStandardMaterial({ color: 0x4A90E2 })
);
player.position.set(0, 1, 0);
scene.add(player);

const ground = new THREE.Mesh(
    new THREE.PlaneGeometry(20, 200),
    new THREE.MeshStandardMaterial({ color: 0x8B4513 })
);
ground.rotation.x = -Math.PI / 2;
scene.add(ground);

const MOVE_SPEED = {move_speed};
const LANE_WIDTH = 2.5;
const LANE_COUNT = {lane_count};

let score = 0;
const keys = {};
const clock = new THREE.Clock();

window.addEventListener('keydown', (e) => { keys[e.key.toLowerCase()] = true; });
window.addEventListener('keyup', (e) => { keys[e.key.toLowerCase()] = false; });

function animate() {
    requestAnimationFrame(animate);

    const deltaTime = Math.min(clock.getDelta(), 0.1);
    if (deltaTime <= 0 || !isFinite(deltaTime)) {
        return;
    }

    player.position.z -= MOVE_SPEED * deltaTime;

    if (keys['a'] || keys['arrowleft']) {
        player.position.x = Math.max(player.position.x - MOVE_SPEED * deltaTime, -LANE_WIDTH * (LANE_COUNT - 1) * 0.5);
    }
    if (keys['d'] || keys['arrowright']) {
        player.position.x = Math.min(player.position.x + MOVE_SPEED * deltaTime, LANE_WIDTH * (LANE_COUNT - 1) * 0.5);
    }

    score += Math.round(MOVE_SPEED * deltaTime);
    document.getElementById('score').textContent = score;

    camera.position.x = player.position.x;
    camera.position.z = player.position.z + 10;
    camera.lookAt(player.position);

    renderer.render(scene, camera);
}

window.addEventListener('resize', () => {
    camera.aspect = window.innerWidth / window.innerHeight;
    camera.updateProjectionMatrix();
    renderer.setSize(window.innerWidth, window.innerHeight);
});

animate();
</script>
</body>
</html>
"#;

/// Self-contained Matter.js document used when the AI web path is disabled
/// or exhausted.
pub fn fallback_html5(design: &GameDesign, mechanics: &GameMechanics) -> String {
    let primary = design
        .color_scheme
        .get("primary")
        .cloned()
        .unwrap_or_else(|| "#4A90E2".to_string());
    FALLBACK_HTML5_DOC
        .replace("{title}", &sanitize_html(&design.title))
        .replace(
            "{player_speed}",
            &format!("{:.1}", mechanics.player_movement.speed / 60.0),
        )
        .replace(
            "{jump_velocity}",
            &format!("{:.1}", mechanics.player_movement.jump_force / 30.0),
        )
        .replace("{primary_color}", &primary)
}

/// Self-contained three.js document for 3D games on the template path.
pub fn fallback_threejs(design: &GameDesign, mechanics: &GameMechanics) -> String {
    FALLBACK_THREEJS_DOC
        .replace("{title}", &sanitize_html(&design.title))
        .replace(
            "{move_speed}",
            &format!("{:.1}", mechanics.player_movement.speed / 40.0),
        )
        .replace(
            "{lane_count}",
            &mechanics.lane_system.unwrap_or(3).max(1).to_string(),
        )
}

fn sanitize_html(text: &str) -> String {
    text.replace('<', "&lt;").replace('>', "&gt;")
}

fn sanitize_gd_string(text: &str) -> String {
    text.replace(['\n', '\r'], " ").replace('"', "'")
}
