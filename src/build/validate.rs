// src/build/validate.rs
//! Structural contract for generated artifacts. First failure wins: the
//! repair loop fixes exactly one issue per iteration, so validation names
//! exactly one missing requirement at a time.

use once_cell::sync::Lazy;
use regex::Regex;

pub const POLICY_SECTIONS: &[&str] = &["privacy", "terms", "disclaimer", "about", "contact"];
pub const SPONSOR_MARKER: &str = "AFF_SLOT";
pub const RELATED_HOOK: &str = "window.__RELATED__";
pub const LANG_SWITCHER: &str = r#"id="langSel""#;

static RE_I18N: Lazy<Regex> = Lazy::new(|| Regex::new(r#"data-i18n\s*="#).unwrap());

/// What the validator needs to know about this deployment.
#[derive(Debug, Clone)]
pub struct Contract {
    pub hub_url: String,
    pub min_i18n_bindings: usize,
}

/// `Ok(())` or the single reason the artifact is invalid.
pub fn validate(artifact: &str, contract: &Contract) -> Result<(), String> {
    let lowered = artifact.to_lowercase();

    let trimmed = lowered.trim();
    if !trimmed.starts_with("<!doctype html") || !trimmed.ends_with("</html>") {
        return Err("missing document wrapper".to_string());
    }

    let missing: Vec<&str> = POLICY_SECTIONS
        .iter()
        .filter(|s| !lowered.contains(&format!("{s}.html")))
        .copied()
        .collect();
    if !missing.is_empty() {
        let quoted: Vec<String> = missing.iter().map(|s| format!("'{s}'")).collect();
        return Err(format!("missing policy sections: [{}]", quoted.join(", ")));
    }

    if !artifact.contains(LANG_SWITCHER) {
        return Err("missing language switcher".to_string());
    }

    let bindings = RE_I18N.find_iter(artifact).count();
    if bindings < contract.min_i18n_bindings {
        return Err(format!(
            "too few localizable bindings: {} < {}",
            bindings, contract.min_i18n_bindings
        ));
    }

    if !artifact.contains(&contract.hub_url) {
        return Err("missing hub back-link".to_string());
    }

    if !artifact.contains(SPONSOR_MARKER) {
        return Err("missing sponsor placeholder marker".to_string());
    }

    if !artifact.contains(RELATED_HOOK) {
        return Err("missing related-links hook".to_string());
    }

    Ok(())
}

#[cfg(test)]
pub fn minimal_valid_artifact(hub_url: &str) -> String {
    let bindings = (0..8)
        .map(|i| format!(r#"<span data-i18n="k{i}">t</span>"#))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "<!doctype html>\n<html>\n<head><title>t</title></head>\n<body>\n\
         <main>\n{bindings}\n\
         <select id=\"langSel\"></select>\n\
         <a href=\"{hub_url}\">All tools</a>\n\
         <!-- AFF_SLOT -->\n\
         <script>window.__RELATED__ = []</script>\n\
         </main>\n\
         <footer>\n\
         <a href=\"/policies/privacy.html\">p</a>\n\
         <a href=\"/policies/terms.html\">t</a>\n\
         <a href=\"/policies/disclaimer.html\">d</a>\n\
         <a href=\"/policies/about.html\">a</a>\n\
         <a href=\"/policies/contact.html\">c</a>\n\
         </footer>\n</body>\n</html>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract() -> Contract {
        Contract {
            hub_url: "https://s.test/hub/".to_string(),
            min_i18n_bindings: 8,
        }
    }

    #[test]
    fn minimal_artifact_passes() {
        let html = minimal_valid_artifact("https://s.test/hub/");
        assert_eq!(validate(&html, &contract()), Ok(()));
    }

    #[test]
    fn missing_wrapper_is_first_failure() {
        let html = minimal_valid_artifact("https://s.test/hub/").replace("<!doctype html>", "");
        assert_eq!(
            validate(&html, &contract()),
            Err("missing document wrapper".to_string())
        );
    }

    #[test]
    fn missing_policy_section_names_it() {
        let html =
            minimal_valid_artifact("https://s.test/hub/").replace("disclaimer.html", "nothing");
        assert_eq!(
            validate(&html, &contract()),
            Err("missing policy sections: ['disclaimer']".to_string())
        );
    }

    #[test]
    fn binding_count_is_enforced() {
        let html = minimal_valid_artifact("https://s.test/hub/")
            .replace(r#"<span data-i18n="k7">t</span>"#, "");
        let err = validate(&html, &contract()).unwrap_err();
        assert_eq!(err, "too few localizable bindings: 7 < 8");
    }

    #[test]
    fn sponsor_marker_and_related_hook_are_required() {
        let base = minimal_valid_artifact("https://s.test/hub/");
        let no_slot = base.replace("<!-- AFF_SLOT -->", "");
        assert_eq!(
            validate(&no_slot, &contract()),
            Err("missing sponsor placeholder marker".to_string())
        );
        let no_hook = base.replace("window.__RELATED__ = []", "");
        assert_eq!(
            validate(&no_hook, &contract()),
            Err("missing related-links hook".to_string())
        );
    }
}
