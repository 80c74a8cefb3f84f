//! In-page ad detection.

use adrate_engine::ads::{AdElement, AdKind, AdPosition, AdReport};
use adrate_engine::backend::BackendError;
use serde::Deserialize;
use serde_json::Value;

/// Selectors that commonly mark ad containers.
pub const AD_SELECTOR: &str =
    "[class*='ad'], [id*='ad'], [class*='advertisement'], iframe[src*='ad']";

/// Returns one `{x, y, kind, text_length}` record per matching element.
/// Elements that throw while being inspected are skipped.
pub fn detection_script() -> String {
    format!(
        r#"
        const found = [];
        for (const el of document.querySelectorAll("{AD_SELECTOR}")) {{
            try {{
                const rect = el.getBoundingClientRect();
                let kind = 'text';
                if (el.tagName === 'IFRAME') {{
                    kind = 'iframe';
                }} else if (el.querySelector('video')) {{
                    kind = 'video';
                }} else if (el.querySelector('img')) {{
                    kind = 'image';
                }}
                found.push({{
                    x: rect.left + window.scrollX,
                    y: rect.top + window.scrollY,
                    kind: kind,
                    text_length: (el.innerText || '').length
                }});
            }} catch (e) {{}}
        }}
        return found;
        "#
    )
}

#[derive(Deserialize)]
struct RawAd {
    x: f64,
    y: f64,
    kind: AdKind,
    #[serde(default)]
    text_length: usize,
}

/// Parse the detection script's result.
pub fn parse_ad_report(value: Value) -> Result<AdReport, BackendError> {
    let raw: Vec<RawAd> = serde_json::from_value(value)
        .map_err(|e| BackendError::AdDetection(format!("unexpected script result: {e}")))?;

    Ok(AdReport {
        ads: raw
            .into_iter()
            .map(|ad| AdElement {
                position: AdPosition { x: ad.x, y: ad.y },
                kind: ad.kind,
                text_length: ad.text_length,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_report() {
        let report = parse_ad_report(json!([
            {"x": 10, "y": 300.5, "kind": "iframe", "text_length": 0},
            {"x": 0, "y": 900, "kind": "video"}
        ]))
        .unwrap();

        assert_eq!(report.count(), 2);
        assert_eq!(report.ads[0].position.y, 300.5);
        assert_eq!(report.kinds(), vec![AdKind::Iframe, AdKind::Video]);
        assert_eq!(report.ads[1].text_length, 0);
    }

    #[test]
    fn test_parse_empty_report() {
        assert!(parse_ad_report(json!([])).unwrap().is_empty());
    }

    #[test]
    fn test_parse_garbage_is_detection_failure() {
        let err = parse_ad_report(json!(null)).unwrap_err();
        assert!(matches!(err, BackendError::AdDetection(_)));
        let err = parse_ad_report(json!([{"x": 1, "y": 2, "kind": "popup"}])).unwrap_err();
        assert!(matches!(err, BackendError::AdDetection(_)));
    }

    #[test]
    fn test_script_embeds_selector() {
        assert!(detection_script().contains("iframe[src*='ad']"));
    }
}
