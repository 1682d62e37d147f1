use std::collections::VecDeque;

/// Text received over a data channel, bounded to `limit` bytes.
///
/// Oldest lines are dropped first; a single line longer than the limit keeps
/// only its tail.
#[derive(Debug)]
pub struct DataLog {
    limit: usize,
    lines: VecDeque<String>,
    bytes: usize,
}

impl DataLog {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            lines: VecDeque::new(),
            bytes: 0,
        }
    }

    pub fn push(&mut self, text: &str) {
        if self.limit == 0 {
            return;
        }
        let mut start = text.len().saturating_sub(self.limit);
        while !text.is_char_boundary(start) {
            start += 1;
        }
        if start > 0 {
            tracing::debug!(
                dropped = start,
                "Data channel message exceeds log limit, keep its tail"
            );
        }
        let line = text[start..].to_owned();
        self.bytes += line.len();
        self.lines.push_back(line);

        while self.bytes > self.limit {
            match self.lines.pop_front() {
                Some(old) => self.bytes -= old.len(),
                None => break,
            }
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Retained text, one message per line.
    pub fn text(&self) -> String {
        self.lines().collect::<Vec<_>>().join("\n")
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }
}
