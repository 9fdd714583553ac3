//! SSML markup for a single synthesized sentence.

use edu_avatar_core::config::ProsodyConfig;

/// Escape the characters that would break the SSML document.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Wrap `text` in a `<speak>` document for `voice` with fixed prosody.
pub fn build_ssml(language: &str, voice: &str, prosody: &ProsodyConfig, text: &str) -> String {
    format!(
        concat!(
            r#"<speak version="1.0" xmlns="http://www.w3.org/2001/10/synthesis" xml:lang="{lang}">"#,
            r#"<voice name="{voice}">"#,
            r#"<prosody rate="{rate}" pitch="{pitch}">{text}</prosody>"#,
            "</voice></speak>"
        ),
        lang = escape_xml(language),
        voice = escape_xml(voice),
        rate = escape_xml(&prosody.rate),
        pitch = escape_xml(&prosody.pitch),
        text = escape_xml(text),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssml_structure() {
        let ssml = build_ssml(
            "en-US",
            "en-US-JennyNeural",
            &ProsodyConfig::default(),
            "Hello there.",
        );
        assert!(ssml.starts_with(r#"<speak version="1.0""#));
        assert!(ssml.contains(r#"xml:lang="en-US""#));
        assert!(ssml.contains(r#"<voice name="en-US-JennyNeural">"#));
        assert!(ssml.contains(r#"<prosody rate="-8%" pitch="-10%">Hello there.</prosody>"#));
        assert!(ssml.ends_with("</voice></speak>"));
    }

    #[test]
    fn test_text_is_escaped() {
        let ssml = build_ssml(
            "en-US",
            "en-US-GuyNeural",
            &ProsodyConfig::default(),
            "Use <b> & \"quotes\".",
        );
        assert!(ssml.contains("Use &lt;b&gt; &amp; &quot;quotes&quot;."));
        assert!(!ssml.contains("<b>"));
    }
}
