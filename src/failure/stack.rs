//! Call-stack parsing and triage ordering.
//!
//! # Responsibilities
//! - Pair function lines with the source-location line that follows them
//! - Skip anything that does not form such a pair
//! - Float frames belonging to the caller's own module to the top
//!
//! # Accepted shapes
//! ```text
//! foo.Handler(a)                          call-style signature
//! /app/handler.go:10 +0x1d                absolute location
//!
//!   12: request_relay::http::server::run  numbered backtrace symbol
//!              at ./src/http/server.rs:40:5
//! ```
//! Workspace-relative `./` locations are accepted alongside absolute ones,
//! since that is how local crates appear in `std::backtrace` output.

use crate::failure::body::StackFrame;

/// Parse a raw stack dump into frames, own-module frames first.
///
/// Within each partition frames are ordered by ascending file string.
/// Input without any qualifying pair yields an empty list.
pub fn parse_and_sort(raw: &str, module_name: &str) -> Vec<StackFrame> {
    let mut frames = parse_frames(raw);
    sort_frames(&mut frames, module_name);
    frames
}

/// Collect frames in their original order.
pub fn parse_frames(raw: &str) -> Vec<StackFrame> {
    let lines: Vec<&str> = raw.lines().map(str::trim).collect();
    let mut frames = Vec::new();

    let mut i = 0;
    while i + 1 < lines.len() {
        match (function_name(lines[i]), location(lines[i + 1])) {
            (Some(func_name), Some(file)) => {
                frames.push(StackFrame {
                    file: file.to_string(),
                    func_name: func_name.to_string(),
                });
                i += 2;
            }
            _ => i += 1,
        }
    }

    frames
}

/// Stable sort: frames whose function contains `module_name` first,
/// then ascending by file within each partition.
pub fn sort_frames(frames: &mut [StackFrame], module_name: &str) {
    frames.sort_by(|a, b| {
        let a_foreign = !a.func_name.contains(module_name);
        let b_foreign = !b.func_name.contains(module_name);
        a_foreign.cmp(&b_foreign).then_with(|| a.file.cmp(&b.file))
    });
}

fn function_name(line: &str) -> Option<&str> {
    if let Some(symbol) = numbered_symbol(line) {
        return Some(symbol);
    }

    // name(args)
    let open = line.find('(')?;
    if open > 0 && line.ends_with(')') {
        Some(line)
    } else {
        None
    }
}

pub(crate) fn numbered_symbol(line: &str) -> Option<&str> {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let symbol = line[digits..].strip_prefix(':')?.trim();
    if symbol.is_empty() {
        None
    } else {
        Some(symbol)
    }
}

fn location(line: &str) -> Option<&str> {
    let line = line.strip_prefix("at ").unwrap_or(line);
    let path_start = if line.starts_with('/') {
        1
    } else if line.starts_with("./") {
        2
    } else {
        return None;
    };

    // `:<digits>` somewhere past the leading slash
    let rest = &line[path_start..];
    let has_line_number = rest.match_indices(':').any(|(idx, _)| {
        rest[idx + 1..]
            .bytes()
            .next()
            .is_some_and(|b| b.is_ascii_digit())
    });

    has_line_number.then_some(line)
}
