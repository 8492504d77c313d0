//! Output truncation for captured task output.
//!
//! Scheduled commands can print without bound (`find /`, chatty build tools).
//! Both the head (what started) and the tail (how it ended) matter when a
//! task fails, so the middle is what gets dropped.

/// Default per-stream budget in characters.
pub const DEFAULT_MAX_CHARS: usize = 16_000;

/// Keep at most `max_chars` characters of `output`, omitting the middle.
///
/// The marker line is not counted against the budget. Splits happen on
/// `char` boundaries so multi-byte sequences are never cut.
pub fn truncate_output(output: &str, max_chars: usize) -> String {
    // Byte length bounds char count from above, so this is the cheap exit.
    if output.len() <= max_chars {
        return output.to_owned();
    }
    let total = output.chars().count();
    if total <= max_chars {
        return output.to_owned();
    }

    let head_chars = max_chars / 2;
    let tail_chars = max_chars - head_chars;
    let head_end = byte_offset(output, head_chars);
    let tail_start = byte_offset(output, total - tail_chars);
    let omitted = total - head_chars - tail_chars;

    format!(
        "{}\n[... {omitted} chars omitted ...]\n{}",
        &output[..head_end],
        &output[tail_start..]
    )
}

fn byte_offset(s: &str, char_index: usize) -> usize {
    s.char_indices()
        .nth(char_index)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}
