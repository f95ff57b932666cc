//! Bounded, line-oriented console buffer with ANSI SGR interpretation.
//!
//! Each `append` is parsed on its own: an escape sequence split across two
//! calls is not reassembled, and the running style starts from the default
//! at the beginning of every call.

use std::{collections::VecDeque, sync::LazyLock};

use regex::Regex;

use crate::settings::DEFAULT_LOG_BUFFER_SIZE;

static SGR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("\x1b\\[([0-9;]*)m").expect("SGR pattern is valid")
});

/// Palette index 0..=15; 8..=15 are the bright variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnsiColor(pub u8);

impl AnsiColor {
    pub const BLACK: AnsiColor = AnsiColor(0);
    pub const RED: AnsiColor = AnsiColor(1);
    pub const GREEN: AnsiColor = AnsiColor(2);
    pub const YELLOW: AnsiColor = AnsiColor(3);
    pub const BLUE: AnsiColor = AnsiColor(4);
    pub const MAGENTA: AnsiColor = AnsiColor(5);
    pub const CYAN: AnsiColor = AnsiColor(6);
    pub const WHITE: AnsiColor = AnsiColor(7);

    pub fn is_bright(self) -> bool {
        self.0 >= 8
    }
}

/// `None` colours mean "the view's default".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Style {
    pub fg: Option<AnsiColor>,
    pub bg: Option<AnsiColor>,
    pub bold: bool,
}

impl Style {
    fn apply_code(&mut self, code: u32) {
        match code {
            0 => *self = Style::default(),
            1 => self.bold = true,
            30..=37 => self.fg = Some(AnsiColor((code - 30) as u8)),
            40..=47 => self.bg = Some(AnsiColor((code - 40) as u8)),
            90..=97 => self.fg = Some(AnsiColor((code - 90 + 8) as u8)),
            100..=107 => self.bg = Some(AnsiColor((code - 100 + 8) as u8)),
            _ => {}
        }
    }

    /// Re-encode as an SGR prefix for terminal output. Empty for the default style.
    pub fn to_sgr(self) -> String {
        let mut codes = Vec::<String>::new();
        if self.bold {
            codes.push("1".to_string());
        }
        if let Some(c) = self.fg {
            let base = if c.is_bright() { 90 + c.0 - 8 } else { 30 + c.0 };
            codes.push(base.to_string());
        }
        if let Some(c) = self.bg {
            let base = if c.is_bright() { 100 + c.0 - 8 } else { 40 + c.0 };
            codes.push(base.to_string());
        }
        if codes.is_empty() {
            String::new()
        } else {
            format!("\x1b[{}m", codes.join(";"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledRun {
    pub text: String,
    pub style: Style,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub seq: u64,
    pub runs: Vec<StyledRun>,
}

impl LogLine {
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    /// Terminal rendering with colours re-applied and reset at the end.
    pub fn to_ansi(&self) -> String {
        let mut out = String::new();
        for run in &self.runs {
            let sgr = run.style.to_sgr();
            if sgr.is_empty() {
                out.push_str(&run.text);
            } else {
                out.push_str(&sgr);
                out.push_str(&run.text);
                out.push_str("\x1b[0m");
            }
        }
        out
    }

    fn push_run(&mut self, text: &str, style: Style) {
        if text.is_empty() {
            return;
        }
        match self.runs.last_mut() {
            Some(last) if last.style == style => last.text.push_str(text),
            _ => self.runs.push(StyledRun {
                text: text.to_string(),
                style,
            }),
        }
    }
}

/// Split `raw` into styled segments, escape sequences removed.
pub fn parse_ansi(raw: &str) -> Vec<StyledRun> {
    let mut out = Vec::new();
    let mut style = Style::default();
    let mut last_end = 0;

    let mut push = |text: &str, style: Style| {
        if !text.is_empty() {
            out.push(StyledRun {
                text: text.to_string(),
                style,
            });
        }
    };

    for caps in SGR.captures_iter(raw) {
        let Some(whole) = caps.get(0) else { continue };
        push(&raw[last_end..whole.start()], style);

        let params = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        for code in params.split(';') {
            if code.is_empty() {
                continue;
            }
            if let Ok(v) = code.parse::<u32>() {
                style.apply_code(v);
            }
        }
        last_end = whole.end();
    }
    push(&raw[last_end..], style);
    out
}

#[derive(Debug)]
pub struct LogStreamBuffer {
    next_seq: u64,
    max_lines: usize,
    lines: VecDeque<LogLine>,
    // Unterminated last line; later appends continue it.
    pending: Option<LogLine>,
}

impl Default for LogStreamBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_BUFFER_SIZE)
    }
}

impl LogStreamBuffer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            next_seq: 1,
            max_lines: max_lines.max(1),
            lines: VecDeque::new(),
            pending: None,
        }
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    /// Completed plus pending lines.
    pub fn line_count(&self) -> usize {
        self.lines.len() + usize::from(self.pending.is_some())
    }

    pub fn append(&mut self, raw: &str) {
        for run in parse_ansi(raw) {
            let mut pieces = run.text.split('\n').peekable();
            while let Some(piece) = pieces.next() {
                let terminated = pieces.peek().is_some();
                let seq = &mut self.next_seq;
                let line = self.pending.get_or_insert_with(|| {
                    let s = *seq;
                    *seq = seq.saturating_add(1);
                    LogLine {
                        seq: s,
                        runs: Vec::new(),
                    }
                });
                line.push_run(piece, run.style);
                if terminated && let Some(done) = self.pending.take() {
                    self.lines.push_back(done);
                }
            }
        }
        // A line opened by an empty trailing piece carries no text yet.
        if self.pending.as_ref().is_some_and(|l| l.runs.is_empty()) {
            self.pending = None;
            self.next_seq = self.next_seq.saturating_sub(1);
        }
        self.trim();
    }

    pub fn set_max_lines(&mut self, n: usize) {
        self.max_lines = n.max(1);
        self.trim();
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.pending = None;
    }

    fn trim(&mut self) {
        while self.line_count() > self.max_lines {
            if self.lines.pop_front().is_none() {
                self.pending = None;
            }
        }
    }

    /// All retained text, escape sequences removed.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.text());
            out.push('\n');
        }
        if let Some(p) = &self.pending {
            out.push_str(&p.text());
        }
        out
    }

    pub fn lines(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }

    pub fn pending(&self) -> Option<&LogLine> {
        self.pending.as_ref()
    }

    /// Completed lines after `cursor`, at most `limit`; returns the new cursor.
    /// A zero cursor yields the most recent `limit` lines.
    pub fn tail_after(&self, cursor: u64, limit: usize) -> (Vec<LogLine>, u64) {
        if cursor == 0 {
            let start = self.lines.len().saturating_sub(limit);
            let out: Vec<LogLine> = self.lines.iter().skip(start).cloned().collect();
            let last = out.last().map(|l| l.seq).unwrap_or(0);
            return (out, last);
        }

        let mut out = Vec::new();
        let mut last = cursor;
        for line in self.lines.iter().filter(|l| l.seq > cursor) {
            out.push(line.clone());
            last = line.seq;
            if out.len() >= limit {
                break;
            }
        }
        (out, last)
    }
}
