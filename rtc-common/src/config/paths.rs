//! Share path templates.

/// Values substituted into `{placeholder}`s of a path template.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathVars<'a> {
    pub host: Option<&'a str>,
    pub module: Option<&'a str>,
    pub version: Option<&'a str>,
    pub date: Option<&'a str>,
    pub category: Option<&'a str>,
}

impl<'a> PathVars<'a> {
    pub fn host(host: &'a str) -> Self {
        Self {
            host: Some(host),
            ..Self::default()
        }
    }
}

/// Substitute known placeholders; unknown or unset ones are left as-is.
pub fn render(template: &str, vars: &PathVars<'_>) -> String {
    let mut out = template.to_string();
    for (key, value) in [
        ("{host}", vars.host),
        ("{module}", vars.module),
        ("{version}", vars.version),
        ("{date}", vars.date),
        ("{category}", vars.category),
    ] {
        if let Some(value) = value {
            out = out.replace(key, value);
        }
    }
    out
}

/// Join a segment onto a share path, reusing the base's separator.
pub fn join(base: &str, segment: &str) -> String {
    let sep = if base.contains('\\') { '\\' } else { '/' };
    let segment = segment.trim_start_matches(['\\', '/']);
    if base.is_empty() {
        segment.to_string()
    } else if base.ends_with(['\\', '/']) {
        format!("{base}{segment}")
    } else {
        format!("{base}{sep}{segment}")
    }
}
