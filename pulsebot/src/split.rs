/// Telegram rejects messages longer than this many characters
pub const TELEGRAM_MAX_LEN: usize = 4096;

/// Split long messages at line boundaries to respect platform limits.
/// Lengths are counted in characters.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.lines() {
        let line_len = line.chars().count();
        // a chunk boundary already separates paragraphs
        if line.is_empty() && current.is_empty() {
            continue;
        }
        if current_len + line_len + 1 > max_len {
            if !current.is_empty() {
                push_chunk(&mut chunks, std::mem::take(&mut current));
                current_len = 0;
            }
            if line.is_empty() {
                continue;
            }
            // Handle single lines longer than max_len
            if line_len > max_len {
                let chars: Vec<char> = line.chars().collect();
                for piece in chars.chunks(max_len) {
                    chunks.push(piece.iter().collect());
                }
                continue;
            }
        }
        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        push_chunk(&mut chunks, current);
    }

    chunks
}

fn push_chunk(chunks: &mut Vec<String>, mut chunk: String) {
    let trimmed = chunk.trim_end_matches('\n').len();
    chunk.truncate(trimmed);
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
}
