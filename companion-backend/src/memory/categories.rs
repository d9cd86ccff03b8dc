//! Canonical fact categories and the synonym map that keeps extraction from
//! drifting into near-duplicate labels.

use once_cell::sync::Lazy;
use std::collections::HashMap;

pub const IDENTITY: &str = "identity";
pub const APPEARANCE: &str = "appearance";
pub const CURRENT_STATE: &str = "current_state";
pub const MOMENTS: &str = "moments";
pub const INTIMACY: &str = "intimacy";
pub const INTIMATE_HISTORY: &str = "intimate_history";

/// Every canonical category, in the order facts are rendered.
pub const ALL: &[&str] = &[
    IDENTITY,
    APPEARANCE,
    "life",
    "work_study",
    "family",
    "routine",
    "health",
    "relationships",
    "personality",
    "interests",
    "goals",
    "dreams",
    CURRENT_STATE,
    MOMENTS,
    INTIMACY,
    INTIMATE_HISTORY,
];

/// Never persisted.
pub const EPHEMERAL: &[&str] = &[CURRENT_STATE];

/// Categories shown as reference facts in the context block
pub const REFERENCE_ORDER: &[&str] = &[
    IDENTITY,
    APPEARANCE,
    "life",
    "work_study",
    "family",
    "relationships",
    "routine",
    "health",
    "personality",
    "interests",
    "goals",
    "dreams",
    INTIMACY,
    INTIMATE_HISTORY,
];

/// Facts that feed the intimacy score
pub const INTIMATE: &[&str] = &[INTIMACY, INTIMATE_HISTORY];

/// Kept out of the continuation path in companion mode: the user said nothing new.
pub const CONTINUATION_EXCLUDED: &[&str] = &[APPEARANCE, CURRENT_STATE, MOMENTS];

static SYNONYMS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let pairs: &[(&str, &str)] = &[
        ("identidad", IDENTITY),
        ("usuario", IDENTITY),
        ("user", IDENTITY),
        ("fisico", APPEARANCE),
        ("fisica", APPEARANCE),
        ("aspecto", APPEARANCE),
        ("apariencia", APPEARANCE),
        ("physical", APPEARANCE),
        ("vida", "life"),
        ("trabajo", "work_study"),
        ("estudio", "work_study"),
        ("estudios", "work_study"),
        ("trabajo_estudio", "work_study"),
        ("work", "work_study"),
        ("study", "work_study"),
        ("familia", "family"),
        ("rutina", "routine"),
        ("salud", "health"),
        ("relaciones", "relationships"),
        ("personalidad", "personality"),
        ("caracter", "personality"),
        ("character", "personality"),
        ("intereses", "interests"),
        ("preferencias", "interests"),
        ("gustos", "interests"),
        ("hobbies", "interests"),
        ("preferences", "interests"),
        ("metas", "goals"),
        ("objetivos", "goals"),
        ("suenos", "dreams"),
        ("sueños", "dreams"),
        ("estado_animo", CURRENT_STATE),
        ("estado", CURRENT_STATE),
        ("estado_actual", CURRENT_STATE),
        ("emocion", CURRENT_STATE),
        ("emotion", CURRENT_STATE),
        ("sentimientos", CURRENT_STATE),
        ("mood", CURRENT_STATE),
        ("momentos", MOMENTS),
        ("momento", MOMENTS),
        ("moment", MOMENTS),
        ("moments_rel", MOMENTS),
        ("relacion", MOMENTS),
        ("vinculo", MOMENTS),
        ("intimo", INTIMACY),
        ("intima", INTIMACY),
        ("intimate", INTIMACY),
        ("intimidad", INTIMACY),
        ("historial_intim", INTIMATE_HISTORY),
        ("historial_intimo", INTIMATE_HISTORY),
    ];
    pairs.iter().copied().collect()
});

/// Map a model-produced label onto a canonical category. Unknown labels are
/// normalised (lowercase, spaces to underscores) and passed through.
pub fn canonicalize(raw: &str) -> String {
    let normalized = raw.trim().to_lowercase().replace([' ', '-'], "_");
    if ALL.contains(&normalized.as_str()) {
        return normalized;
    }
    match SYNONYMS.get(normalized.as_str()) {
        Some(canonical) => canonical.to_string(),
        None => normalized,
    }
}

pub fn is_ephemeral(category: &str) -> bool {
    EPHEMERAL.contains(&category)
}

/// How many facts of `category` the context block shows
pub fn reference_limit(category: &str) -> usize {
    if INTIMATE.contains(&category) { 10 } else { 5 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_synonyms() {
        assert_eq!(canonicalize("Momentos"), "moments");
        assert_eq!(canonicalize("vinculo"), "moments");
        assert_eq!(canonicalize("estado animo"), "current_state");
        assert_eq!(canonicalize("hobbies"), "interests");
        assert_eq!(canonicalize("historial_intimo"), "intimate_history");
        assert_eq!(canonicalize("work-study"), "work_study");
    }

    #[test]
    fn test_canonical_and_unknown_pass_through() {
        assert_eq!(canonicalize("identity"), "identity");
        assert_eq!(canonicalize("Pets"), "pets");
    }

    #[test]
    fn test_reference_limits() {
        assert_eq!(reference_limit("intimacy"), 10);
        assert_eq!(reference_limit("family"), 5);
        assert!(is_ephemeral("current_state"));
        assert!(!REFERENCE_ORDER.contains(&CURRENT_STATE));
    }
}
