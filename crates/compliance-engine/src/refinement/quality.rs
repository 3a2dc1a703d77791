// Deterministic brevity rules applied after the quality assurance pass

pub const MAX_KEY_POINTS: usize = 3;
pub const MAX_POINT_CHARS: usize = 200;

/// Phrases that mark a point as boilerplate rather than a concrete finding
const GENERIC_PHRASES: &[&str] = &[
    "ensure compliance",
    "ensure that all",
    "consider reviewing",
    "it is important to",
    "as appropriate",
    "where applicable",
    "best practice",
    "in general",
    "consult a professional",
    "seek legal advice",
];

/// Drop generic and repeated points, truncate the rest and keep at most
/// `MAX_KEY_POINTS`
pub fn enforce_brevity(points: Vec<String>) -> Vec<String> {
    let mut kept: Vec<String> = Vec::new();

    for point in points {
        let point = point.trim();
        if point.is_empty() || is_generic(point) {
            continue;
        }
        let point = truncate(point);
        if kept.iter().any(|k| k.eq_ignore_ascii_case(&point)) {
            continue;
        }
        kept.push(point);
        if kept.len() == MAX_KEY_POINTS {
            break;
        }
    }
    kept
}

fn is_generic(point: &str) -> bool {
    let lower = point.to_lowercase();
    GENERIC_PHRASES.iter().any(|p| lower.contains(p))
}

fn truncate(point: &str) -> String {
    if point.chars().count() <= MAX_POINT_CHARS {
        return point.to_string();
    }
    let mut out: String = point.chars().take(MAX_POINT_CHARS - 3).collect();
    out.push_str("...");
    out
}
