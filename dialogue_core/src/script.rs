//! Transcript formatting for multi-speaker generation.
//!
//! The model expects every line tagged `Speaker N: ...`. Lines that already
//! carry a tag pass through unchanged; bare lines are assigned to speakers
//! in rotation, 1-indexed.

/// Replace typographic quotes the model's tokenizer trips over.
pub fn clean_script(script: &str) -> String {
    script.replace('\u{2019}', "'").replace('\u{2018}', "'")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedScript {
    pub text: String,
    pub turns: usize,
}

/// Normalize a raw script into tagged speaker turns.
pub fn format_script(script: &str, num_speakers: usize) -> FormattedScript {
    let mut lines: Vec<String> = Vec::new();

    for line in script.trim().lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("Speaker ") && line.contains(':') {
            lines.push(line.to_string());
        } else {
            let speaker_id = (lines.len() % num_speakers) + 1;
            lines.push(format!("Speaker {speaker_id}: {line}"));
        }
    }

    FormattedScript {
        turns: lines.len(),
        text: lines.join("\n"),
    }
}
