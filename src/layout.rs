//! Width-constrained text wrapping for region previews. Wrapping is
//! per-character rather than per-word: the target scripts are largely
//! logographic, where any character is a valid break point.

/// Wrap `text` to `max_width` using `measure` to width a candidate line.
/// Explicit `\n` breaks are honored first and empty lines survive; within a
/// paragraph, characters are appended greedily while the running line still
/// fits, and the character that overflows starts the next line. Pure:
/// output depends only on the inputs.
pub fn wrap<F>(text: &str, max_width: f32, measure: F) -> Vec<String>
where
    F: Fn(&str) -> f32,
{
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        for ch in paragraph.chars() {
            let mut candidate = line.clone();
            candidate.push(ch);
            if !line.is_empty() && measure(&candidate) > max_width {
                lines.push(std::mem::take(&mut line));
                line.push(ch);
            } else {
                line = candidate;
            }
        }
        lines.push(line);
    }
    lines
}
