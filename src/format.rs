/// Render fractional minutes as `"1h 25m 30s"`. Minutes are shown whenever
/// hours are, seconds always; negative input renders as `"0s"`.
pub fn format_elapsed(total_minutes: f64) -> String {
    if total_minutes.is_nan() || total_minutes <= 0.0 {
        return "0s".to_string();
    }

    let total_seconds = (total_minutes * 60.0).floor() as u64;
    let h = total_seconds / 3600;
    let m = (total_seconds % 3600) / 60;
    let s = total_seconds % 60;

    let mut parts = Vec::with_capacity(3);
    if h > 0 {
        parts.push(format!("{h}h"));
    }
    if m > 0 || h > 0 {
        parts.push(format!("{m}m"));
    }
    parts.push(format!("{s}s"));

    parts.join(" ")
}

/// Shorter form for budgets: `"1h 30m"`, `"45m"`.
pub fn format_budget(total_minutes: f64) -> String {
    let minutes = total_minutes.max(0.0).round() as u64;
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    }
}
