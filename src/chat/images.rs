//! Diagram tags embedded in tutor replies: `[GENERAR_IMAGEN: <prompt>]`.

const TAG_OPEN: &str = "[GENERAR_IMAGEN:";

/// A piece of a reply, in reading order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    /// `index` counts image tags from 0 in order of appearance.
    Image { index: usize, prompt: &'a str },
}

/// Next complete tag at or after `from`: (start, end, prompt).
/// A tag must close on the same line; anything else is plain text.
fn next_tag(text: &str, from: usize) -> Option<(usize, usize, &str)> {
    let mut search = from;
    while let Some(offset) = text[search..].find(TAG_OPEN) {
        let start = search + offset;
        let body = start + TAG_OPEN.len();
        let rest = &text[body..];
        match rest.find([']', '\n']) {
            Some(close) if rest.as_bytes()[close] == b']' => {
                return Some((start, body + close + 1, rest[..close].trim()));
            }
            _ => search = body,
        }
    }
    None
}

/// Split a reply into text runs and image slots.
#[must_use]
pub fn segments(text: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut cursor = 0;
    let mut index = 0;

    while let Some((start, end, prompt)) = next_tag(text, cursor) {
        if start > cursor {
            out.push(Segment::Text(&text[cursor..start]));
        }
        out.push(Segment::Image { index, prompt });
        index += 1;
        cursor = end;
    }
    if cursor < text.len() {
        out.push(Segment::Text(&text[cursor..]));
    }
    out
}

#[must_use]
pub fn extract_prompts(text: &str) -> Vec<String> {
    segments(text)
        .into_iter()
        .filter_map(|s| match s {
            Segment::Image { prompt, .. } => Some(prompt.to_string()),
            Segment::Text(_) => None,
        })
        .collect()
}

/// The reply with every complete tag removed.
#[must_use]
pub fn strip_tags(text: &str) -> String {
    segments(text)
        .into_iter()
        .filter_map(|s| match s {
            Segment::Text(t) => Some(t),
            Segment::Image { .. } => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = "Primero el trigger...\n[GENERAR_IMAGEN: Google Sheets trigger]\nLuego el router...\n[GENERAR_IMAGEN: router with two paths]";

    #[test]
    fn prompts_in_order() {
        assert_eq!(
            extract_prompts(REPLY),
            vec!["Google Sheets trigger", "router with two paths"]
        );
    }

    #[test]
    fn segments_interleave_text_and_slots() {
        assert_eq!(
            segments(REPLY),
            vec![
                Segment::Text("Primero el trigger...\n"),
                Segment::Image {
                    index: 0,
                    prompt: "Google Sheets trigger"
                },
                Segment::Text("\nLuego el router...\n"),
                Segment::Image {
                    index: 1,
                    prompt: "router with two paths"
                },
            ]
        );
    }

    #[test]
    fn strip_leaves_surrounding_text() {
        assert_eq!(
            strip_tags("antes [GENERAR_IMAGEN: x] después"),
            "antes  después"
        );
    }

    #[test]
    fn unterminated_tag_is_text() {
        let text = "mira [GENERAR_IMAGEN: sin cierre";
        assert!(extract_prompts(text).is_empty());
        assert_eq!(strip_tags(text), text);
    }

    #[test]
    fn tag_broken_across_lines_is_text() {
        let text = "[GENERAR_IMAGEN: a\nb] [GENERAR_IMAGEN: c]";
        assert_eq!(extract_prompts(text), vec!["c"]);
        assert_eq!(strip_tags(text), "[GENERAR_IMAGEN: a\nb] ");
    }

    #[test]
    fn plain_text_is_one_segment() {
        assert_eq!(segments("hola"), vec![Segment::Text("hola")]);
        assert!(segments("").is_empty());
    }

    #[test]
    fn non_ascii_prompt_survives() {
        assert_eq!(
            extract_prompts("[GENERAR_IMAGEN: módulo HTTP – configuración]"),
            vec!["módulo HTTP – configuración"]
        );
    }
}
