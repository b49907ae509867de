// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! Stylesheet stringification.
//!
//! Linked and constructed stylesheets are inlined into the snapshot as css
//! text read from their `cssRules`. Two browser quirks are papered over
//! here: Chrome drops `-webkit-background-clip` from `cssText`, and Safari
//! escapes colons in selectors that the replayer would then fail to match.

use wasm_bindgen::JsCast;

use crate::error::SnapshotError;

/// Marker joining css chunks that were split to stay aligned with the text
/// children of a `<style>` element.
pub const SPLIT_MARKER: &str = "/* rr_split */";

/// Reads a stylesheet's rules into one css string.
///
/// Returns `Err` when the sheet refuses access (cross-origin without CORS);
/// the caller skips inlining for that sheet.
pub fn stringify_stylesheet(sheet: &web_sys::CssStyleSheet) -> Result<String, SnapshotError> {
    let rules = sheet.css_rules().map_err(|e| SnapshotError::AccessDenied {
        what: "cssRules",
        message: wasm_bindgen::JsValue::as_string(&e).unwrap_or_default(),
    })?;
    let href = sheet.href().ok().flatten();
    let mut out = String::new();
    for i in 0..rules.length() {
        let Some(rule) = rules.item(i) else {
            continue;
        };
        out.push_str(&stringify_rule(&rule, href.as_deref()));
    }
    Ok(fix_safari_colons(&out))
}

/// One rule's css text; `@import` rules are recursed into so the imported
/// sheet's content lands inline, with its relative urls rewritten against
/// the importing sheet's href.
fn stringify_rule(rule: &web_sys::CssRule, sheet_href: Option<&str>) -> String {
    // `styleSheet`/`href` are read reflectively: `CSSImportRule.styleSheet`
    // went nullable mid-spec and the typed binding lags behind browsers.
    if rule.dyn_ref::<web_sys::CssImportRule>().is_some() {
        let imported = js_sys::Reflect::get(rule, &"styleSheet".into())
            .ok()
            .and_then(|s| s.dyn_into::<web_sys::CssStyleSheet>().ok());
        if let Some(imported) = imported {
            if let Ok(inner) = stringify_stylesheet(&imported) {
                let base = imported.href().ok().flatten();
                return absolutify_import_urls(&inner, base.as_deref().or(sheet_href));
            }
        }
        return rule.css_text();
    }
    let text = rule.css_text();
    fix_background_clip(rule, &text)
}

/// Chrome omits `-webkit-background-clip` when serializing a style rule;
/// re-insert it when the declaration block carried one.
fn fix_background_clip(rule: &web_sys::CssRule, text: &str) -> String {
    let Some(style_rule) = rule.dyn_ref::<web_sys::CssStyleRule>() else {
        return text.to_owned();
    };
    let style = style_rule.style();
    let clip = style
        .get_property_value("-webkit-background-clip")
        .unwrap_or_default();
    if clip.is_empty() || text.contains("-webkit-background-clip") {
        return text.to_owned();
    }
    match text.rfind('}') {
        Some(idx) => format!(
            "{}-webkit-background-clip: {clip}; {}",
            &text[..idx],
            &text[idx..]
        ),
        None => text.to_owned(),
    }
}

/// Safari serializes selectors like `.a:hover` as `.a\:hover` in `cssText`;
/// undo the escape so the replayer's selector engine matches again.
fn fix_safari_colons(css: &str) -> String {
    if !css.contains("\\:") {
        return css.to_owned();
    }
    css.replace("\\:", ":")
}

/// Rewrites `url(...)` occurrences relative to `base` so imported css keeps
/// resolving once it is inlined into the importer.
pub fn absolutify_import_urls(css: &str, base: Option<&str>) -> String {
    let Some(base) = base else {
        return css.to_owned();
    };
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(pos) = rest.find("url(") {
        let (before, after) = rest.split_at(pos + 4);
        out.push_str(before);
        let Some(close) = after.find(')') else {
            rest = after;
            break;
        };
        let raw = &after[..close];
        let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'');
        if trimmed.is_empty()
            || trimmed.starts_with("data:")
            || trimmed.contains("://")
            || trimmed.starts_with("//")
        {
            out.push_str(raw);
        } else {
            out.push('"');
            out.push_str(&resolve_relative(base, trimmed));
            out.push('"');
        }
        rest = &after[close..];
    }
    out.push_str(rest);
    out
}

/// Minimal url resolution: absolute paths replace the base's path, relative
/// paths append to the base's directory.
fn resolve_relative(base: &str, relative: &str) -> String {
    if let Some(path) = relative.strip_prefix('/') {
        let origin_end = base
            .find("://")
            .and_then(|i| base[i + 3..].find('/').map(|j| i + 3 + j))
            .unwrap_or(base.len());
        return format!("{}/{}", &base[..origin_end], path);
    }
    match base.rfind('/') {
        Some(idx) if base.contains("://") && idx > base.find("://").unwrap_or(0) + 2 => {
            format!("{}/{}", &base[..idx], relative)
        }
        _ => format!("{base}/{relative}"),
    }
}

/// Splits `css` into `chunks` pieces aligned with the lengths of a
/// `<style>` element's text children, joined back with [`SPLIT_MARKER`]
/// so the replayer can redistribute them.
pub fn split_css_text(css: &str, chunk_lengths: &[usize]) -> String {
    if chunk_lengths.len() < 2 {
        return css.to_owned();
    }
    let total: usize = chunk_lengths.iter().sum();
    if total == 0 {
        return css.to_owned();
    }
    let mut pieces = Vec::with_capacity(chunk_lengths.len());
    let mut offset = 0usize;
    let chars: Vec<char> = css.chars().collect();
    for (i, len) in chunk_lengths.iter().enumerate() {
        if i + 1 == chunk_lengths.len() {
            pieces.push(chars[offset.min(chars.len())..].iter().collect::<String>());
            break;
        }
        // Scale each cut point by the chunk's share of the original text.
        let cut = (chars.len() * (offset + len) + total / 2) / total;
        let cut = cut.clamp(offset, chars.len());
        pieces.push(chars[offset..cut].iter().collect::<String>());
        offset = cut;
    }
    pieces.join(SPLIT_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_marker_appears_between_chunks() {
        let css = "a{color:red}b{color:blue}";
        let out = split_css_text(css, &[12, 13]);
        assert_eq!(out.matches(SPLIT_MARKER).count(), 1);
        assert_eq!(out.replace(SPLIT_MARKER, ""), css);
    }

    #[test]
    fn single_chunk_left_untouched() {
        let css = "a{color:red}";
        assert_eq!(split_css_text(css, &[12]), css);
    }

    #[test]
    fn absolutify_rewrites_relative_urls() {
        let css = r#"@font-face { src: url("font.woff2"); }"#;
        let out = absolutify_import_urls(css, Some("https://example.com/css/theme.css"));
        assert!(out.contains(r#"url("https://example.com/css/font.woff2")"#), "{out}");
    }

    #[test]
    fn absolutify_rewrites_root_relative_urls() {
        let css = "body { background: url('/bg.png'); }";
        let out = absolutify_import_urls(css, Some("https://example.com/css/theme.css"));
        assert!(out.contains(r#"url("https://example.com/bg.png")"#), "{out}");
    }

    #[test]
    fn absolute_and_data_urls_kept() {
        let css = "a { background: url(data:image/png;base64,xyz); b: url(https://cdn.example.com/i.png); }";
        let out = absolutify_import_urls(css, Some("https://example.com/css/theme.css"));
        assert_eq!(out, css);
    }

    #[test]
    fn safari_colon_unescape() {
        assert_eq!(fix_safari_colons(r".a\:hover { }"), ".a:hover { }");
        assert_eq!(fix_safari_colons(".plain { }"), ".plain { }");
    }
}
