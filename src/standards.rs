use regex::Regex;
use std::sync::OnceLock;

/// Standard-domain abbreviations: reading literature, reading informational,
/// reading foundations, speaking & listening, writing, language.
pub const STANDARD_DOMAINS: [&str; 6] = ["RL", "RI", "RF", "SL", "W", "L"];

fn shorthand_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = format!(r"^({})(\d)(\d+)([A-Z])?$", STANDARD_DOMAINS.join("|"));
        Regex::new(&pattern).ok()
    })
    .as_ref()
}

/// Expands shorthand like `rl21` or `rf13a` to `RL.2.1` / `RF.1.3a`.
///
/// Codes that already contain a dot are returned as-is (trimmed), and
/// anything unrecognised is passed through untouched, so the function is
/// idempotent and never fails.
pub fn normalize_standard(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains('.') {
        return trimmed.to_string();
    }
    let upper = trimmed.to_ascii_uppercase();
    let Some(re) = shorthand_re() else {
        return raw.to_string();
    };
    let Some(caps) = re.captures(&upper) else {
        return raw.to_string();
    };

    let domain = &caps[1];
    let grade = &caps[2];
    let standard = &caps[3];
    let suffix = caps
        .get(4)
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_default();
    format!("{domain}.{grade}.{standard}{suffix}")
}
