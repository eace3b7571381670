//! Heuristic static checks on generated game code.
//!
//! These are substring and regex scans, not a parser: a heuristic pre-filter
//! feeding the fix-prompt loop, not a correctness guarantee. False negatives
//! are expected and acceptable; the retry loop's self-correction absorbs
//! most real failures.

use std::sync::OnceLock;

use regex::Regex;

/// Which runtime a generated web document targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebRuntime {
    /// 2D canvas with the Matter.js physics engine.
    Canvas2d,
    /// 3D scene rendered through three.js.
    ThreeJs,
}

/// Critical structural defects that make a document unusable and trigger an
/// immediate regeneration.
pub fn structural_issues(code: &str) -> Vec<String> {
    let mut issues = Vec::new();
    let lower = code.to_lowercase();

    if code.trim().is_empty() {
        issues.push("document is empty".to_string());
        return issues;
    }
    if !lower.contains("<!doctype html>") && !lower.contains("<html") {
        issues.push("missing HTML document structure".to_string());
    }
    let open = code.matches("<script").count();
    let close = code.matches("</script>").count();
    if open != close {
        issues.push(format!("unbalanced script tags: {open} open, {close} close"));
    }
    issues
}

/// Checklist of semantic defects for the fix-prompt loop: required library
/// bootstrap, per-frame loop, render-surface setup, delimiter balance and
/// division hazards.
pub fn semantic_issues(code: &str, runtime: WebRuntime) -> Vec<String> {
    let mut issues = Vec::new();
    let lower = code.to_lowercase();

    match runtime {
        WebRuntime::Canvas2d => {
            if !lower.contains("matter") {
                issues.push("Matter.js physics library is not referenced".to_string());
            } else {
                if !code.contains("Engine.create") {
                    issues.push("physics engine is never created (Engine.create missing)".to_string());
                }
                if !code.contains("Engine.update") && !code.contains("Runner.run") {
                    issues.push(
                        "physics engine is never stepped per frame (Engine.update missing)"
                            .to_string(),
                    );
                }
            }
            if !lower.contains("<canvas") {
                issues.push("no canvas element".to_string());
            }
            if !code.contains("getContext") {
                issues.push("canvas rendering context is never acquired".to_string());
            }
        }
        WebRuntime::ThreeJs => {
            if !lower.contains("three") {
                issues.push("three.js library is not referenced".to_string());
            }
            if !code.contains("THREE.Scene") {
                issues.push("no THREE.Scene created".to_string());
            }
            if !code.contains("PerspectiveCamera") && !code.contains("OrthographicCamera") {
                issues.push("no camera created".to_string());
            }
            if !code.contains("WebGLRenderer") {
                issues.push("no WebGLRenderer created".to_string());
            }
        }
    }

    if !code.contains("requestAnimationFrame") {
        issues.push("no requestAnimationFrame game loop".to_string());
    }

    for (open, close, name) in [("{", "}", "braces"), ("(", ")", "parentheses"), ("[", "]", "brackets")] {
        let opens = code.matches(open).count();
        let closes = code.matches(close).count();
        if opens != closes {
            issues.push(format!("unbalanced {name}: {opens} open, {closes} close"));
        }
    }

    issues.extend(division_hazards(code));
    issues
}

fn division_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // A denominator of zero, a frame delta, or a magnitude variable, with an
    // expression character before the slash so URLs like "matter-js/0.19.0"
    // don't match.
    RE.get_or_init(|| {
        Regex::new(
            r"[\w\)\]]\s*/\s*(0(?:[^\d.\w]|$)|deltaTime\b|dt\b|speed\b|width\b|height\b|distance\b)",
        )
        .expect("static regex")
    })
}

/// How far back to look for a guard before flagging a division.
const GUARD_WINDOW: usize = 80;

/// Flags divisions by zero literals, frame deltas, or magnitude variables
/// that have no guard idiom in the preceding window.
pub fn division_hazards(code: &str) -> Vec<String> {
    let mut issues = Vec::new();
    for m in division_re().find_iter(code) {
        let denominator = m
            .as_str()
            .split('/')
            .nth(1)
            .unwrap_or("")
            .trim()
            .trim_end_matches([';', ',', ')', ' '])
            .to_string();
        let window_start = m.start().saturating_sub(GUARD_WINDOW);
        let mut start = window_start;
        while !code.is_char_boundary(start) {
            start -= 1;
        }
        let window = &code[start..m.start()];
        if !has_guard(window, &denominator) {
            issues.push(format!(
                "possible division by zero: '/ {denominator}' without a preceding guard"
            ));
        }
    }
    issues.dedup();
    issues
}

fn has_guard(window: &str, denominator: &str) -> bool {
    let var = denominator.trim_end_matches(|c: char| !c.is_alphanumeric());
    if var.is_empty() || var == "0" {
        return false;
    }
    let guards = [
        format!("if ({var}"),
        format!("if({var}"),
        format!("{var} > 0"),
        format!("{var}>0"),
        format!("{var} !== 0"),
        format!("{var} != 0"),
        format!("{var} || 1"),
        format!("{var} ?"),
        format!("({var} &&"),
        format!("isFinite({var}"),
    ];
    guards.iter().any(|g| window.contains(g.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_CANVAS_DOC: &str = r#"<!DOCTYPE html>
<html>
<head>
<script src="https://cdnjs.cloudflare.com/ajax/libs/matter-js/0.19.0/matter.min.js"></script>
</head>
<body>
<canvas id="gameCanvas"></canvas>
<script>
const { Engine, World, Bodies } = Matter;
const engine = Engine.create();
const canvas = document.getElementById('gameCanvas');
const ctx = canvas.getContext('2d');
let lastTime = 0;
function gameLoop(currentTime) {
    const deltaTime = Math.min((currentTime - lastTime) / 1000, 0.1);
    lastTime = currentTime;
    Engine.update(engine, 16.6);
    requestAnimationFrame(gameLoop);
}
gameLoop(performance.now());
</script>
</body>
</html>"#;

    #[test]
    fn test_good_document_has_zero_issues() {
        assert!(structural_issues(GOOD_CANVAS_DOC).is_empty());
        let issues = semantic_issues(GOOD_CANVAS_DOC, WebRuntime::Canvas2d);
        assert!(issues.is_empty(), "unexpected issues: {issues:?}");
    }

    #[test]
    fn test_missing_engine_update_flagged() {
        let doc = GOOD_CANVAS_DOC.replace("Engine.update(engine, 16.6);", "");
        let issues = semantic_issues(&doc, WebRuntime::Canvas2d);
        assert!(issues.iter().any(|i| i.contains("Engine.update")), "{issues:?}");
    }

    #[test]
    fn test_missing_doctype_flagged() {
        let issues = structural_issues("<script>let x = 1;</script>");
        assert!(issues.iter().any(|i| i.contains("HTML document")));
    }

    #[test]
    fn test_unbalanced_script_tags_flagged() {
        let issues = structural_issues("<!DOCTYPE html><html><script>let x;</html>");
        assert!(issues.iter().any(|i| i.contains("script tags")));
    }

    #[test]
    fn test_unbalanced_braces_flagged() {
        let doc = GOOD_CANVAS_DOC.replace("gameLoop(performance.now());", "if (true) {");
        let issues = semantic_issues(&doc, WebRuntime::Canvas2d);
        assert!(issues.iter().any(|i| i.contains("unbalanced braces")), "{issues:?}");
    }

    #[test]
    fn test_threejs_checklist() {
        let doc = r#"<!DOCTYPE html><html><script src="three.min.js"></script><script>
const scene = new THREE.Scene();
const camera = new THREE.PerspectiveCamera(75, 2, 0.1, 1000);
const renderer = new THREE.WebGLRenderer();
function animate() { requestAnimationFrame(animate); renderer.render(scene, camera); }
animate();
</script></html>"#;
        let issues = semantic_issues(doc, WebRuntime::ThreeJs);
        assert!(issues.is_empty(), "{issues:?}");

        let broken = doc.replace("new THREE.WebGLRenderer()", "null");
        let issues = semantic_issues(&broken, WebRuntime::ThreeJs);
        assert!(issues.iter().any(|i| i.contains("WebGLRenderer")));
    }

    #[test]
    fn test_unguarded_division_by_delta_flagged() {
        let hazards = division_hazards("const v = x / deltaTime;");
        assert_eq!(hazards.len(), 1);
        assert!(hazards[0].contains("deltaTime"));
    }

    #[test]
    fn test_guarded_division_not_flagged() {
        let code = "if (deltaTime > 0) { const v = x / deltaTime; }";
        assert!(division_hazards(code).is_empty());
    }

    #[test]
    fn test_division_by_zero_literal_flagged() {
        assert!(!division_hazards("const v = x / 0;").is_empty());
    }

    #[test]
    fn test_cdn_url_not_flagged_as_division() {
        let code = r#"<script src="https://cdnjs.cloudflare.com/ajax/libs/matter-js/0.19.0/matter.min.js"></script>"#;
        assert!(division_hazards(code).is_empty());
    }

    #[test]
    fn test_division_by_plain_number_not_flagged() {
        assert!(division_hazards("const half = canvas.width / 2;").is_empty());
    }
}
