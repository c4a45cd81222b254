pub struct WarnEvent<'a> {
    pub code: &'a str,
    pub stage: &'a str,
    pub action: &'a str,
    pub folder: &'a str,
    pub reason: &'a str,
    pub err: &'a str,
}

const MAX_VALUE_CHARS: usize = 160;

/// One `key=value` token: separators and `=` collapse to `_`, so folder names
/// with spaces still parse, and long io errors are clipped.
fn warn_value(value: &str) -> String {
    let mut out = String::new();
    for ch in value.chars() {
        if out.chars().count() >= MAX_VALUE_CHARS {
            break;
        }
        let keep = !ch.is_whitespace() && !ch.is_control() && ch != '=';
        if keep {
            out.push(ch);
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    match out.trim_end_matches('_') {
        "" => "-".to_string(),
        trimmed => trimmed.to_string(),
    }
}

fn render(event: &WarnEvent<'_>) -> String {
    format!(
        "HDCS_WARN code={} stage={} action={} folder={} reason={} err={}",
        warn_value(event.code),
        warn_value(event.stage),
        warn_value(event.action),
        warn_value(event.folder),
        warn_value(event.reason),
        warn_value(event.err),
    )
}

pub fn emit(event: WarnEvent<'_>) {
    tracing::warn!("{}", render(&event));
}
